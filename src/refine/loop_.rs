//! 精炼循环
//!
//! Generate -> Check -> (Feedback -> Refine -> Check)*，在审查通过或达到轮数上限时结束。
//! 达到上限时沿用最后一个候选；不回退到更早的候选。检索只在循环开始前做一次，
//! 生成与精炼任务共用同一批参考片段。

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use crate::core::TaskFailure;
use crate::lookup::{coping_query, Lookup, LookupError};
use crate::refine::{CheckVerdict, QualityChecker};
use crate::tasks::{TaskContext, TaskExecutor, TaskKind};

/// 默认检查轮数上限
pub const DEFAULT_MAX_ITERATIONS: usize = 3;

/// 精炼结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefineOutcome {
    /// 最终采用的策略（非空）
    pub strategy: String,
    /// 实际执行的检查轮数
    pub iterations: usize,
    /// 是否经审查通过（false 表示达到上限或审查/精炼中途失败）
    pub approved: bool,
}

pub struct RefinementLoop {
    executor: Arc<TaskExecutor>,
    checker: QualityChecker,
    lookup: Arc<dyn Lookup>,
    trusted_domain: String,
    max_iterations: usize,
    lookup_timeout: Duration,
}

impl RefinementLoop {
    pub fn new(executor: Arc<TaskExecutor>, lookup: Arc<dyn Lookup>) -> Self {
        Self {
            checker: QualityChecker::new(Arc::clone(&executor)),
            executor,
            lookup,
            trusted_domain: "helpguide.org".to_string(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            lookup_timeout: Duration::from_secs(15),
        }
    }

    /// 上限至少为 1
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    pub fn with_trusted_domain(mut self, domain: impl Into<String>) -> Self {
        self.trusted_domain = domain.into();
        self
    }

    pub fn with_lookup_timeout(mut self, lookup_timeout: Duration) -> Self {
        self.lookup_timeout = lookup_timeout;
        self
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    /// 检索参考片段；失败时返回空列表（降级，不中断）
    async fn ground(&self, message: &str) -> Vec<String> {
        let query = coping_query(&self.trusted_domain, message);
        let result = match timeout(self.lookup_timeout, self.lookup.search(&query)).await {
            Ok(r) => r,
            Err(_) => Err(LookupError::Timeout),
        };
        match result {
            Ok(snippets) => {
                tracing::info!(query = %query, snippets = snippets.len(), "grounding fetched");
                snippets
            }
            Err(e) => {
                tracing::warn!(query = %query, error = %e, "lookup failed, generating without grounding");
                Vec::new()
            }
        }
    }

    /// 产出一条应对策略；只有初始生成失败时返回错误
    pub async fn refine(&self, ctx: &TaskContext) -> Result<RefineOutcome, TaskFailure> {
        let grounding = self.ground(&ctx.message).await;
        let ctx = ctx.clone().with_grounding(grounding);

        let mut candidate = self.executor.generate(TaskKind::CopingGenerate, &ctx).await?;

        for iteration in 1..=self.max_iterations {
            let feedback = match self.checker.evaluate(&ctx, &candidate).await {
                Ok(CheckVerdict::Approved) => {
                    tracing::info!(iteration, "coping strategy approved");
                    return Ok(RefineOutcome {
                        strategy: candidate,
                        iterations: iteration,
                        approved: true,
                    });
                }
                Ok(CheckVerdict::Feedback(feedback)) => feedback,
                Err(e) => {
                    tracing::warn!(iteration, error = %e, "quality check failed, keeping current candidate");
                    return Ok(RefineOutcome {
                        strategy: candidate,
                        iterations: iteration,
                        approved: false,
                    });
                }
            };

            if iteration == self.max_iterations {
                break;
            }

            let refine_ctx = ctx.clone().with_candidate(&candidate).with_feedback(feedback);
            match self.executor.generate(TaskKind::CopingRefine, &refine_ctx).await {
                Ok(revised) => candidate = revised,
                Err(e) => {
                    tracing::warn!(iteration, error = %e, "refinement failed, keeping current candidate");
                    return Ok(RefineOutcome {
                        strategy: candidate,
                        iterations: iteration,
                        approved: false,
                    });
                }
            }
        }

        tracing::warn!(
            max_iterations = self.max_iterations,
            "refinement cap reached without approval, using last candidate"
        );
        Ok(RefineOutcome {
            strategy: candidate,
            iterations: self.max_iterations,
            approved: false,
        })
    }
}
