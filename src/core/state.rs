//! 运行状态：单次编排运行的结构化记录与阶段
//!
//! 每个请求新建一份 OrchestrationState；各阶段原地修改（Planner 设置计划并清空日志，
//! Worker 追加日志，Explainer 写入最终回复），运行结束即丢弃，不跨运行持久化。

use serde::Serialize;
use uuid::Uuid;

use crate::agents::{ContextLogEntry, Plan};
use crate::memory::Message;

/// 状态机阶段：PLANNING → WORKING → EXPLAINING → DONE，任意阶段可进入 FAILED
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunPhase {
    Planning,
    Working,
    Explaining,
    Done,
    Failed,
}

impl RunPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunPhase::Done | RunPhase::Failed)
    }

    /// 线性流转中的下一阶段；终态没有下一阶段
    pub fn next(self) -> Option<RunPhase> {
        match self {
            RunPhase::Planning => Some(RunPhase::Working),
            RunPhase::Working => Some(RunPhase::Explaining),
            RunPhase::Explaining => Some(RunPhase::Done),
            RunPhase::Done | RunPhase::Failed => None,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct OrchestrationState {
    /// 单次运行的标识（仅用于日志关联）
    pub run_id: String,
    pub messages: Vec<Message>,
    /// PLANNING 完成前为 None
    pub plan: Option<Plan>,
    /// 保留字段：不参与执行控制
    pub current_step: usize,
    pub context_log: Vec<ContextLogEntry>,
    pub final_answer: Option<String>,
    pub phase: RunPhase,
}

impl OrchestrationState {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            messages,
            plan: None,
            current_step: 0,
            context_log: Vec::new(),
            final_answer: None,
            phase: RunPhase::Planning,
        }
    }
}
