//! 核心编排层：错误、运行状态、线性状态机、组装缓存与事件流适配

pub mod error;
pub mod factory;
pub mod orchestrator;
pub mod state;
pub mod stream;

pub use error::AgentError;
pub use factory::{build_orchestrator, build_tool_registry, create_llm, normalize_provider, OrchestratorCache};
pub use orchestrator::Orchestrator;
pub use state::{OrchestrationState, RunPhase};
pub use stream::{failed_stream, stream_run, EventStreamAdapter, WireEvent};
