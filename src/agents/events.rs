//! 编排过程事件：Orchestrator 在阶段切换、工具调用、Token 到达时推入通道，
//! 由 core::stream 的适配器转成对外的 WireEvent。

use serde_json::Value;

use crate::agents::{ContextLogEntry, Plan};
use crate::core::RunPhase;

/// 单次运行内部产生的事件（按发生顺序推入通道）
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    /// 状态机进入新阶段
    PhaseChanged(RunPhase),
    /// 计划已解析完成（每次运行恰好一次）
    PlanReady { plan: Plan },
    /// 开始处理某一步；action 与写入日志的 action 一致
    StepStarted { step: u64, action: String },
    /// 工具调用开始
    ToolStarted { name: String, input: Value },
    /// 工具调用结束（失败时 output 为 "Error: ..." 字符串）
    ToolFinished { name: String, output: Value },
    /// Worker 完成后的完整执行日志
    ContextLog { log: Vec<ContextLogEntry> },
    /// Explainer 输出的一段文本
    Token { text: String },
}
