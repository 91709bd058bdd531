//! Echo - 非临床陪伴对话的轮次编排
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 会话状态、按用户串行、轮次编排器（危机优先 / 低情绪应对 / 周报）与构建器
//! - **llm**: 生成能力抽象与实现（OpenAI 兼容 / DeepSeek / Mock / Scripted）
//! - **lookup**: 检索能力（Web / Noop / Static）与可信来源查询构造
//! - **memory**: 最近对话
//! - **observability**: 日志初始化
//! - **refine**: 应对策略的 Generate -> Check -> Refine 循环
//! - **store**: 会话存储（内存 / SQLite）
//! - **tasks**: 任务种类、提示词模板与任务执行器

pub mod config;
pub mod core;
pub mod llm;
pub mod lookup;
pub mod memory;
pub mod observability;
pub mod refine;
pub mod store;
pub mod tasks;

pub use core::{EchoBuilder, Fragment, SessionState, TurnOrchestrator, TurnResult};
