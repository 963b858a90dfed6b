//! 编排错误类型
//!
//! 只有运行级错误（LLM 不可达 / 超时 / 取消）会从 Orchestrator 向外传播；
//! 计划解析失败与工具失败分别在 Planner、Worker 内部被吸收，不会出现在这里之外。

use thiserror::Error;

/// 一次编排运行中可能出现的错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AgentError {
    /// 完成服务返回的原始错误信息（原样保留，供 `error` 事件与同步接口透传）
    #[error("{0}")]
    LlmError(String),

    #[error("{stage} completion timed out after {secs}s")]
    LlmTimeout { stage: &'static str, secs: u64 },

    #[error("Tool execution failed: {0}")]
    ToolExecutionFailed(String),

    #[error("Tool timeout: {0}")]
    ToolTimeout(String),

    /// 调用方断开或主动取消
    #[error("Run cancelled")]
    Cancelled,

    #[error("Config error: {0}")]
    ConfigError(String),

    /// 后台运行任务异常退出（panic 等）
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AgentError {
    /// 是否为运行级致命错误（需要转为 FAILED 并发出 `error` 事件）
    pub fn is_run_level(&self) -> bool {
        !matches!(
            self,
            AgentError::ToolExecutionFailed(_) | AgentError::ToolTimeout(_)
        )
    }
}
