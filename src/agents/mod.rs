//! 三个角色：Planner（规划）、Worker（执行）、Explainer（解释），以及计划解析与过程事件

pub mod events;
pub mod explainer;
pub mod plan;
pub mod planner;
pub mod prompts;
pub mod worker;

pub use events::AgentEvent;
pub use explainer::{render_log_summary, render_plan_summary, Explainer};
pub use plan::{fallback_plan, parse_plan, plan_schema_json, Plan, PlanStep, FALLBACK_DESCRIPTION};
pub use planner::Planner;
pub use worker::{truncate_chars, ContextLogEntry, StepOutcome, Worker, MAX_RESULT_CHARS, REASONING_RESULT};
