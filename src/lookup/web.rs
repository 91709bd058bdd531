//! Web 检索：端点域名白名单、超时、结果大小限制
//!
//! 向配置的 HTML 搜索端点发 GET（查询放在 query_param 里），带超时与 User-Agent；
//! 响应用 html2text 提取可读文本，超过 max_result_chars 时截断，再切成片段按相关度排序。

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use html2text::from_read;
use reqwest::Client;

use crate::config::LookupSection;
use crate::lookup::{rank_snippets, Lookup, LookupError};

/// 片段最短字符数，过滤导航、按钮等碎片
const MIN_SNIPPET_CHARS: usize = 40;

/// 简易去除 HTML 标签（html2text 失败时的回退）
fn strip_html_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => {
                in_tag = false;
                out.push('\n');
            }
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

/// 从 URL 中提取 host（不含端口与路径）
fn extract_domain(url: &str) -> Option<String> {
    let url = url.trim();
    let url = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))?;
    let host = url.split('/').next()?;
    let host = host.split(':').next()?;
    if host.is_empty() {
        return None;
    }
    Some(host.to_lowercase())
}

/// 把可读文本切成片段：按空行 / 换行分段，合并空白，丢弃过短的
fn split_snippets(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| line.chars().count() >= MIN_SNIPPET_CHARS)
        .collect()
}

/// Web 检索：仅允许白名单中的端点域名
pub struct WebLookup {
    client: Client,
    endpoint: String,
    query_param: String,
    allowed_domains: HashSet<String>,
    max_snippets: usize,
    max_result_chars: usize,
}

impl WebLookup {
    pub fn new(cfg: &LookupSection) -> Self {
        const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint: cfg.endpoint.clone(),
            query_param: cfg.query_param.clone(),
            allowed_domains: cfg
                .allowed_domains
                .iter()
                .map(|d| d.to_lowercase())
                .collect(),
            max_snippets: cfg.max_snippets,
            max_result_chars: cfg.max_result_chars,
        }
    }

    fn check_endpoint(&self) -> Result<(), LookupError> {
        let domain = extract_domain(&self.endpoint)
            .ok_or_else(|| LookupError::InvalidEndpoint(self.endpoint.clone()))?;
        if self.allowed_domains.contains(&domain) {
            Ok(())
        } else {
            Err(LookupError::DomainNotAllowed(domain))
        }
    }

    /// 将 HTML 转为可读文本（去除 script/style 等）
    fn html_to_text(&self, html: &str) -> String {
        match from_read(html.as_bytes(), 120) {
            Ok(text) if !text.trim().is_empty() => text,
            _ => strip_html_tags(html),
        }
    }

    fn truncate(&self, text: String) -> String {
        if text.chars().count() > self.max_result_chars {
            text.chars().take(self.max_result_chars).collect()
        } else {
            text
        }
    }
}

#[async_trait]
impl Lookup for WebLookup {
    async fn search(&self, query: &str) -> Result<Vec<String>, LookupError> {
        self.check_endpoint()?;
        tracing::info!(query = %query, "lookup search");

        let resp = self
            .client
            .get(&self.endpoint)
            .query(&[(self.query_param.as_str(), query)])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LookupError::Timeout
                } else {
                    LookupError::Request(e.to_string())
                }
            })?;
        if !resp.status().is_success() {
            return Err(LookupError::Status(resp.status().as_u16()));
        }
        let body = resp
            .text()
            .await
            .map_err(|e| LookupError::Request(e.to_string()))?;
        let body = body.trim_start_matches('\u{FEFF}');

        let text = self.truncate(self.html_to_text(body));
        Ok(rank_snippets(split_snippets(&text), query, self.max_snippets))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_domain() {
        assert_eq!(
            extract_domain("https://html.duckduckgo.com/html/").as_deref(),
            Some("html.duckduckgo.com")
        );
        assert_eq!(extract_domain("http://Example.com:8080/x").as_deref(), Some("example.com"));
        assert_eq!(extract_domain("ftp://x"), None);
    }

    #[test]
    fn test_endpoint_must_be_allowlisted() {
        let cfg = LookupSection {
            endpoint: "https://evil.example.com/search".to_string(),
            ..LookupSection::default()
        };
        let lookup = WebLookup::new(&cfg);
        assert_eq!(
            lookup.check_endpoint(),
            Err(LookupError::DomainNotAllowed("evil.example.com".to_string()))
        );
        assert!(WebLookup::new(&LookupSection::default()).check_endpoint().is_ok());
    }

    #[test]
    fn test_split_snippets_drops_fragments() {
        let text = "Home\nAbout\nDeep breathing slows your heart rate and calms the nervous system.\n";
        let snippets = split_snippets(text);
        assert_eq!(snippets.len(), 1);
        assert!(snippets[0].starts_with("Deep breathing"));
    }

    #[test]
    fn test_strip_tags_fallback() {
        let text = strip_html_tags("<p>Grounding</p><p>helps</p>");
        assert!(text.contains("Grounding"));
        assert!(!text.contains('<'));
    }
}
