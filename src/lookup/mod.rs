//! 检索能力：为应对策略提供可信来源的参考片段
//!
//! search(query) 返回按相关度排序的文本片段；查询通过 `site:<域名>` 约定限定来源
//! （约定而非强制，调用方可以不加）。检索失败只会降低生成质量，不会中断一轮。

pub mod web;

use std::collections::HashSet;

use async_trait::async_trait;
use thiserror::Error;

pub use web::WebLookup;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    #[error("Domain not in allowlist: {0}")]
    DomainNotAllowed(String),

    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Request failed: {0}")]
    Request(String),

    #[error("HTTP {0}")]
    Status(u16),

    #[error("Lookup timed out")]
    Timeout,
}

/// 检索能力
#[async_trait]
pub trait Lookup: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<String>, LookupError>;
}

/// 未启用检索时使用：总是返回空结果
#[derive(Debug, Clone, Default)]
pub struct NoopLookup;

#[async_trait]
impl Lookup for NoopLookup {
    async fn search(&self, _query: &str) -> Result<Vec<String>, LookupError> {
        Ok(Vec::new())
    }
}

/// 固定片段（离线 / 测试），按与查询的词重叠排序
#[derive(Debug, Clone, Default)]
pub struct StaticLookup {
    snippets: Vec<String>,
}

impl StaticLookup {
    pub fn new(snippets: Vec<String>) -> Self {
        Self { snippets }
    }
}

#[async_trait]
impl Lookup for StaticLookup {
    async fn search(&self, query: &str) -> Result<Vec<String>, LookupError> {
        Ok(rank_snippets(self.snippets.clone(), query, self.snippets.len()))
    }
}

/// 话题关键词（按优先级），用于从用户消息推导检索话题
const TOPICS: &[(&str, &str)] = &[
    ("panic", "panic attack"),
    ("anxi", "anxiety"),
    ("overwhelm", "overwhelm OR stress"),
    ("exam", "academic stress"),
    ("lonely", "loneliness"),
    ("alone", "loneliness"),
    ("grief", "grief"),
    ("sleep", "insomnia"),
    ("angry", "anger management"),
    ("depress", "depression self-help"),
    ("sad", "depression self-help"),
    ("stress", "stress"),
];

/// 从消息推导话题；无匹配时用 stress
pub fn topic_for(message: &str) -> &'static str {
    let lower = message.to_lowercase();
    TOPICS
        .iter()
        .find(|(needle, _)| lower.contains(needle))
        .map(|(_, topic)| *topic)
        .unwrap_or("stress")
}

/// 应对策略检索查询：限定在可信域名
pub fn coping_query(trusted_domain: &str, message: &str) -> String {
    format!(
        "site:{} {} coping strategies OR self-help OR tips",
        trusted_domain,
        topic_for(message)
    )
}

/// 将文本切分为小写词集合，用于简单相似度（词重叠数）
fn tokenize_lower(s: &str) -> HashSet<String> {
    s.split(|c: char| !c.is_alphanumeric())
        .map(|w| w.to_lowercase())
        .filter(|w| w.len() > 2 && w != "site" && w != "org")
        .collect()
}

/// 按与查询的词重叠数降序排列（稳定排序，同分保持原顺序），取前 k 条
pub fn rank_snippets(snippets: Vec<String>, query: &str, k: usize) -> Vec<String> {
    let terms = tokenize_lower(query);
    let mut scored: Vec<(usize, String)> = snippets
        .into_iter()
        .map(|s| (tokenize_lower(&s).intersection(&terms).count(), s))
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0));
    scored.into_iter().take(k).map(|(_, s)| s).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_is_restricted_to_domain() {
        let q = coping_query("helpguide.org", "I keep having panic attacks at work");
        assert_eq!(q, "site:helpguide.org panic attack coping strategies OR self-help OR tips");
        assert!(coping_query("helpguide.org", "meh").contains(" stress "));
    }

    #[test]
    fn test_rank_prefers_overlap() {
        let ranked = rank_snippets(
            vec![
                "Cooking recipes for the weekend".to_string(),
                "Breathing exercises help with panic attack symptoms".to_string(),
                "Grounding can ease panic".to_string(),
            ],
            "site:helpguide.org panic attack coping",
            2,
        );
        assert_eq!(ranked[0], "Breathing exercises help with panic attack symptoms");
        assert_eq!(ranked[1], "Grounding can ease panic");
    }

    #[tokio::test]
    async fn test_noop_returns_nothing() {
        assert!(NoopLookup.search("anything").await.unwrap().is_empty());
    }
}
