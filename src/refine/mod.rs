//! 应对策略精炼：QualityChecker 与有上限的 Generate -> Check -> Refine 循环

pub mod checker;
pub mod loop_;

pub use checker::{parse_verdict, CheckVerdict, QualityChecker};
pub use loop_::{RefineOutcome, RefinementLoop, DEFAULT_MAX_ITERATIONS};
