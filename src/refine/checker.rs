//! QualityChecker：按固定标准审查应对策略候选
//!
//! 输出以 APPROVED 开头（或为空）即视为通过；其余内容作为给精炼任务的反馈。

use std::sync::Arc;

use crate::core::TaskFailure;
use crate::tasks::{TaskContext, TaskExecutor, TaskKind};

/// 审查结果：通过或需修改
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckVerdict {
    Approved,
    Feedback(String),
}

/// 解析审查输出
pub fn parse_verdict(output: &str) -> CheckVerdict {
    let trimmed = output.trim();
    let upper = trimmed.to_uppercase();
    if trimmed.is_empty()
        || upper.starts_with("APPROVED")
        || upper.contains("COPING STRATEGY APPROVED")
    {
        CheckVerdict::Approved
    } else {
        CheckVerdict::Feedback(trimmed.to_string())
    }
}

pub struct QualityChecker {
    executor: Arc<TaskExecutor>,
}

impl QualityChecker {
    pub fn new(executor: Arc<TaskExecutor>) -> Self {
        Self { executor }
    }

    pub async fn evaluate(
        &self,
        ctx: &TaskContext,
        candidate: &str,
    ) -> Result<CheckVerdict, TaskFailure> {
        let ctx = ctx.clone().with_candidate(candidate);
        let output = self.executor.run(TaskKind::CopingCheck, &ctx).await?;
        Ok(parse_verdict(&output))
    }
}
