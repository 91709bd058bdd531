//! 核心编排层：错误、会话状态、按用户串行、轮次编排器、构建器与优雅关闭

pub mod builder;
pub mod error;
pub mod orchestrator;
pub mod session_supervisor;
pub mod shutdown;
pub mod state;

pub use builder::{create_llm_from_config, create_lookup_from_config, EchoBuilder};
pub use error::{EchoError, TaskFailure};
pub use orchestrator::{CrisisPolicy, FailedTurn, OrchestratorSettings, TurnOrchestrator};
pub use session_supervisor::SessionSupervisor;
pub use shutdown::{ShutdownManager, ShutdownReason};
pub use state::{Fragment, MoodHistory, ReportCadence, SessionState, TurnResult, MOOD_HISTORY_CAP};
