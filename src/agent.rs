//! 对话调用入口（供 HTTP 层与终端 REPL 使用）
//!
//! - chat_sync：跑完整个状态机，返回最终回复；debug 时附带 plan 与 context_log
//! - chat_stream：返回有序 WireEvent 流；编排器构建失败时流为 `start` + `error`

use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::agents::{ContextLogEntry, Plan};
use crate::config::default_provider;
use crate::core::{failed_stream, stream_run, AgentError, OrchestrationState, OrchestratorCache, WireEvent};
use crate::memory::{Message, Role};

/// 对话请求体
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub debug: bool,
}

impl ChatRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            provider: default_provider(),
            debug: false,
        }
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}

/// 同步模式的响应体
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatResponse {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<Plan>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_log: Option<Vec<ContextLogEntry>>,
}

/// 转成运行用的对话历史：丢弃 system 消息（各阶段自带 system prompt），其余保持顺序
pub fn conversation_from(messages: &[Message]) -> Vec<Message> {
    messages
        .iter()
        .filter(|m| m.role != Role::System)
        .cloned()
        .collect()
}

/// 同步对话：失败时错误信息原样来自出错的完成服务
pub async fn chat_sync(cache: &OrchestratorCache, request: ChatRequest) -> Result<ChatResponse, AgentError> {
    let orchestrator = cache.get(&request.provider).await?;
    let mut state = OrchestrationState::new(conversation_from(&request.messages));
    orchestrator.run(&mut state, None, CancellationToken::new()).await?;

    let (plan, context_log) = if request.debug {
        (Some(state.plan.unwrap_or_default()), Some(state.context_log))
    } else {
        (None, None)
    };
    Ok(ChatResponse {
        role: Role::Assistant,
        content: state.final_answer.unwrap_or_default(),
        plan,
        context_log,
    })
}

/// 流式对话：丢弃返回的流即取消运行
pub async fn chat_stream(
    cache: &OrchestratorCache,
    request: ChatRequest,
    cancel: CancellationToken,
) -> BoxStream<'static, WireEvent> {
    let messages = conversation_from(&request.messages);
    match cache.get(&request.provider).await {
        Ok(orchestrator) => stream_run(orchestrator, messages, request.debug, cancel),
        Err(e) => {
            tracing::error!(provider = %request.provider, "Cannot create orchestrator: {}", e);
            failed_stream(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_defaults() {
        let req: ChatRequest = serde_json::from_str(r#"{"messages":[{"role":"user","content":"hi"}]}"#).unwrap();
        assert_eq!(req.provider, "openai");
        assert!(!req.debug);
    }

    #[test]
    fn test_system_messages_dropped() {
        let converted = conversation_from(&[
            Message::system("you are a bot"),
            Message::user("hi"),
            Message::assistant("hello"),
            Message::user("bye"),
        ]);
        assert_eq!(
            converted,
            vec![Message::user("hi"), Message::assistant("hello"), Message::user("bye")]
        );
    }

    #[test]
    fn test_response_omits_debug_fields() {
        let resp = ChatResponse {
            role: Role::Assistant,
            content: "ok".into(),
            plan: None,
            context_log: None,
        };
        assert_eq!(
            serde_json::to_string(&resp).unwrap(),
            r#"{"role":"assistant","content":"ok"}"#
        );
    }
}
