//! 错误类型
//!
//! TaskFailure 只在轮次内部流转，由编排器就地降级（兜底文案 / 省略片段 / 情绪视为缺失）；
//! 只有会话存储失败会以 EchoError 的形式（包在 FailedTurn 里，带上已确定的危机片段）离开 try_process_turn。

use std::time::Duration;

use thiserror::Error;

use crate::llm::LlmError;
use crate::store::StoreError;

/// 单个任务失败的原因
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskFailure {
    #[error("Generation failed: {0}")]
    Generation(#[from] LlmError),

    #[error("Generation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Unparseable output: {0}")]
    Parse(String),

    #[error("Empty output")]
    EmptyOutput,
}

impl TaskFailure {
    /// 审计日志里的 outcome 字段
    pub fn outcome(&self) -> &'static str {
        match self {
            TaskFailure::Generation(_) => "error",
            TaskFailure::Timeout(_) => "timeout",
            TaskFailure::Parse(_) => "parse_failure",
            TaskFailure::EmptyOutput => "empty",
        }
    }
}

/// 一轮无法完成时的错误
#[derive(Error, Debug)]
pub enum EchoError {
    #[error("Session store failure: {0}")]
    Store(#[from] StoreError),

    #[error("Config error: {0}")]
    Config(String),
}

impl From<config::ConfigError> for EchoError {
    fn from(e: config::ConfigError) -> Self {
        EchoError::Config(e.to_string())
    }
}
