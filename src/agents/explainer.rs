//! Explainer：根据原始请求、计划摘要与执行日志摘要生成最终回复
//!
//! 有事件通道时走流式完成，逐块转发 Token 事件（不缓冲、不重排）；否则走一次非流式完成。
//! 超时覆盖整个流，而不仅是建立连接。

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::agents::worker::emit;
use crate::agents::{prompts, AgentEvent, ContextLogEntry, PlanStep};
use crate::core::AgentError;
use crate::llm::LlmClient;
use crate::memory::{latest_user_content, Message};

/// 计划摘要：每步一行 `- Step n: desc (tool: x)`
pub fn render_plan_summary(plan: &[PlanStep]) -> String {
    plan.iter()
        .map(|s| match &s.tool {
            Some(tool) => format!("- Step {}: {} (tool: {})", s.step, s.description, tool),
            None => format!("- Step {}: {}", s.step, s.description),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// 日志摘要：每条两行，动作与结果
pub fn render_log_summary(log: &[ContextLogEntry]) -> String {
    log.iter()
        .map(|c| format!("- Step {}: {}\n  Result: {}", c.step, c.action, c.result))
        .collect::<Vec<_>>()
        .join("\n")
}

/// 交给 Explainer 的用户消息
pub fn render_explainer_prompt(request: &str, plan: &[PlanStep], log: &[ContextLogEntry]) -> String {
    format!(
        "User request: {}\n\nExecution plan:\n{}\n\nResults from execution:\n{}\n\nNow provide a helpful, natural response to the user based on the above information.",
        request,
        render_plan_summary(plan),
        render_log_summary(log)
    )
}

pub struct Explainer {
    llm: Arc<dyn LlmClient>,
    timeout: Duration,
}

impl Explainer {
    pub fn new(llm: Arc<dyn LlmClient>, timeout: Duration) -> Self {
        Self { llm, timeout }
    }

    pub fn build_messages(&self, history: &[Message], plan: &[PlanStep], log: &[ContextLogEntry]) -> Vec<Message> {
        let request = latest_user_content(history).unwrap_or("No request");
        vec![
            Message::system(prompts::EXPLAINER_SYSTEM_PROMPT),
            Message::user(render_explainer_prompt(request, plan, log)),
        ]
    }

    /// 生成最终回复文本
    pub async fn explain(
        &self,
        history: &[Message],
        plan: &[PlanStep],
        log: &[ContextLogEntry],
        events: Option<&mpsc::UnboundedSender<AgentEvent>>,
        cancel: &CancellationToken,
    ) -> Result<String, AgentError> {
        let messages = self.build_messages(history, plan, log);
        let elapsed_out = || AgentError::LlmTimeout {
            stage: "explainer",
            secs: self.timeout.as_secs(),
        };

        let answer = match events {
            None => timeout(self.timeout, self.llm.complete(&messages))
                .await
                .map_err(|_| elapsed_out())?
                .map_err(AgentError::LlmError)?,
            Some(tx) => timeout(self.timeout, self.drain_stream(&messages, tx, cancel))
                .await
                .map_err(|_| elapsed_out())??,
        };
        tracing::info!(chars = answer.chars().count(), "Explainer response generated");
        Ok(answer)
    }

    async fn drain_stream(
        &self,
        messages: &[Message],
        tx: &mpsc::UnboundedSender<AgentEvent>,
        cancel: &CancellationToken,
    ) -> Result<String, AgentError> {
        let mut stream = self
            .llm
            .complete_stream(messages)
            .await
            .map_err(AgentError::LlmError)?;
        let mut answer = String::new();
        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => return Err(AgentError::Cancelled),
                next = stream.next() => next,
            };
            let Some(chunk) = next else { break };
            let text = chunk.map_err(AgentError::LlmError)?;
            if text.is_empty() {
                continue;
            }
            answer.push_str(&text);
            emit(Some(tx), AgentEvent::Token { text });
        }
        Ok(answer)
    }
}
