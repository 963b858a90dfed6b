//! 事件流适配器：把 Orchestrator 推入通道的 AgentEvent 转成对外的 WireEvent
//!
//! 保证：恰好一个 `start` 在最前；恰好一个终止事件（`end` / `error`）在最后；
//! `token` 按 Explainer 产出顺序原样转发；`plan` 至多一次；`tool_start` / `tool_end` 成对有序。
//! `plan` / `step` / `context_log` 只在 debug 模式下发出。

use std::sync::Arc;

use futures_util::stream::{self, BoxStream, StreamExt};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::agents::{AgentEvent, ContextLogEntry, Plan};
use crate::core::{AgentError, OrchestrationState, Orchestrator};
use crate::memory::Message;

/// 对外事件（JSON，`type` 为判别字段）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireEvent {
    Start,
    Plan { plan: Plan },
    Step { step: u64, action: String },
    Token { content: String },
    ToolStart { name: String, input: Value },
    ToolEnd { name: String, output: Value },
    ContextLog { log: Vec<ContextLogEntry> },
    End,
    Error { message: String },
}

impl WireEvent {
    /// 类型名（与 JSON 中的 `type` 一致）
    pub fn kind(&self) -> &'static str {
        match self {
            WireEvent::Start => "start",
            WireEvent::Plan { .. } => "plan",
            WireEvent::Step { .. } => "step",
            WireEvent::Token { .. } => "token",
            WireEvent::ToolStart { .. } => "tool_start",
            WireEvent::ToolEnd { .. } => "tool_end",
            WireEvent::ContextLog { .. } => "context_log",
            WireEvent::End => "end",
            WireEvent::Error { .. } => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, WireEvent::End | WireEvent::Error { .. })
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(r#"{{"type":"error","message":"event serialization failed: {}"}}"#, e)
        })
    }

    /// SSE 帧：`data: <json>\n\n`
    pub fn to_sse(&self) -> String {
        format!("data: {}\n\n", self.to_json())
    }
}

/// 单次运行的事件翻译器
#[derive(Debug, Default)]
pub struct EventStreamAdapter {
    debug: bool,
    plan_sent: bool,
}

impl EventStreamAdapter {
    pub fn new(debug: bool) -> Self {
        Self {
            debug,
            plan_sent: false,
        }
    }

    pub fn start(&self) -> WireEvent {
        WireEvent::Start
    }

    /// 翻译一个内部事件；不对外暴露的事件返回 None
    pub fn translate(&mut self, event: AgentEvent) -> Option<WireEvent> {
        match event {
            AgentEvent::PhaseChanged(phase) => {
                tracing::debug!(?phase, "phase changed");
                None
            }
            AgentEvent::PlanReady { plan } => {
                if !self.debug || self.plan_sent {
                    return None;
                }
                self.plan_sent = true;
                Some(WireEvent::Plan { plan })
            }
            AgentEvent::StepStarted { step, action } => self.debug.then_some(WireEvent::Step { step, action }),
            AgentEvent::ToolStarted { name, input } => Some(WireEvent::ToolStart { name, input }),
            AgentEvent::ToolFinished { name, output } => Some(WireEvent::ToolEnd { name, output }),
            AgentEvent::ContextLog { log } => self.debug.then_some(WireEvent::ContextLog { log }),
            AgentEvent::Token { text } => Some(WireEvent::Token { content: text }),
        }
    }

    /// 终止事件
    pub fn finish(&self, result: Result<(), AgentError>) -> WireEvent {
        match result {
            Ok(()) => WireEvent::End,
            Err(e) => WireEvent::Error { message: e.to_string() },
        }
    }
}

/// 编排器构建失败等场景：只有 `start` 与 `error`
pub fn failed_stream(err: AgentError) -> BoxStream<'static, WireEvent> {
    let adapter = EventStreamAdapter::default();
    stream::iter([adapter.start(), adapter.finish(Err(err))]).boxed()
}

enum Stage {
    Start,
    Draining,
    Finished,
}

struct RunStream {
    stage: Stage,
    adapter: EventStreamAdapter,
    rx: mpsc::UnboundedReceiver<AgentEvent>,
    handle: Option<JoinHandle<Result<(), AgentError>>>,
    // 流被丢弃（客户端断开）时取消运行
    _guard: DropGuard,
}

/// 在后台任务中运行一次编排，返回有序的 WireEvent 流
///
/// 通道在运行任务结束时关闭，因此终止事件一定排在所有转发事件之后。
pub fn stream_run(
    orchestrator: Arc<Orchestrator>,
    messages: Vec<Message>,
    debug: bool,
    cancel: CancellationToken,
) -> BoxStream<'static, WireEvent> {
    let (tx, rx) = mpsc::unbounded_channel();
    let run_cancel = cancel.clone();
    let handle = tokio::spawn(async move {
        let mut state = OrchestrationState::new(messages);
        orchestrator.run(&mut state, Some(&tx), run_cancel).await
    });

    let init = RunStream {
        stage: Stage::Start,
        adapter: EventStreamAdapter::new(debug),
        rx,
        handle: Some(handle),
        _guard: cancel.drop_guard(),
    };

    stream::unfold(init, |mut s| async move {
        loop {
            match s.stage {
                Stage::Start => {
                    s.stage = Stage::Draining;
                    let ev = s.adapter.start();
                    return Some((ev, s));
                }
                Stage::Draining => match s.rx.recv().await {
                    Some(event) => {
                        if let Some(ev) = s.adapter.translate(event) {
                            return Some((ev, s));
                        }
                    }
                    None => {
                        let result = match s.handle.take() {
                            Some(handle) => match handle.await {
                                Ok(result) => result,
                                Err(e) => Err(AgentError::Internal(e.to_string())),
                            },
                            None => Ok(()),
                        };
                        s.stage = Stage::Finished;
                        let ev = s.adapter.finish(result);
                        return Some((ev, s));
                    }
                },
                Stage::Finished => return None,
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::agents::PlanStep;

    #[test]
    fn test_wire_shapes() {
        assert_eq!(WireEvent::Start.to_json(), r#"{"type":"start"}"#);
        assert_eq!(
            WireEvent::Token { content: "Hi".into() }.to_json(),
            r#"{"type":"token","content":"Hi"}"#
        );
        assert_eq!(
            WireEvent::Error { message: "boom".into() }.to_sse(),
            "data: {\"type\":\"error\",\"message\":\"boom\"}\n\n"
        );
        let step = serde_json::to_value(WireEvent::Step { step: 2, action: "x".into() }).unwrap();
        assert_eq!(step, json!({"type": "step", "step": 2, "action": "x"}));
    }

    #[test]
    fn test_debug_only_events_hidden() {
        let mut adapter = EventStreamAdapter::new(false);
        assert!(adapter.translate(AgentEvent::PlanReady { plan: vec![] }).is_none());
        assert!(adapter
            .translate(AgentEvent::StepStarted { step: 1, action: "a".into() })
            .is_none());
        assert!(adapter.translate(AgentEvent::ContextLog { log: vec![] }).is_none());
        assert_eq!(
            adapter.translate(AgentEvent::Token { text: "t".into() }),
            Some(WireEvent::Token { content: "t".into() })
        );
        assert!(adapter
            .translate(AgentEvent::ToolStarted { name: "get_weather".into(), input: json!({}) })
            .is_some());
    }

    #[test]
    fn test_plan_sent_at_most_once() {
        let mut adapter = EventStreamAdapter::new(true);
        let plan = vec![PlanStep::reasoning(1, "a")];
        assert!(adapter.translate(AgentEvent::PlanReady { plan: plan.clone() }).is_some());
        assert!(adapter.translate(AgentEvent::PlanReady { plan }).is_none());
    }

    #[test]
    fn test_finish_maps_result() {
        let adapter = EventStreamAdapter::new(true);
        assert_eq!(adapter.finish(Ok(())), WireEvent::End);
        assert_eq!(
            adapter.finish(Err(AgentError::LlmError("quota exceeded".into()))),
            WireEvent::Error { message: "quota exceeded".into() }
        );
    }

    #[tokio::test]
    async fn test_failed_stream_is_start_then_error() {
        let events: Vec<WireEvent> = failed_stream(AgentError::ConfigError("Unknown provider: x".into()))
            .collect()
            .await;
        let kinds: Vec<&str> = events.iter().map(WireEvent::kind).collect();
        assert_eq!(kinds, vec!["start", "error"]);
    }
}
