//! Build orchestration: rule graph construction, incremental scheduling
//! and plan emission.

pub mod driver;
pub mod graph;
pub mod plan;
pub mod scheduler;

pub use driver::Builder;
pub use graph::{Rule, RuleId, RuleSet, RuleState, Target, TargetId};
pub use plan::{BuildPlan, PlannedRule};
