//! Mock LLM 客户端（用于测试与无 API Key 的本地运行）
//!
//! 默认回显最后一条 User 消息；规划阶段收到非 JSON 文本后会走回退计划，整条流程仍能跑通。
//! 测试中可用 with_reply / with_chunks / failing 固定输出。

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream;

use crate::llm::{LlmClient, TokenStream};
use crate::memory::{latest_user_content, Message};

/// Mock 客户端：固定回复 / 分块回复 / 固定失败 / 回显
#[derive(Debug, Default)]
pub struct MockLlmClient {
    reply: Option<String>,
    chunks: Option<Vec<String>>,
    failure: Option<String>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    seen: Arc<Mutex<Vec<Vec<Message>>>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 固定完整回复（流式时作为单个 chunk）
    pub fn with_reply(reply: impl Into<String>) -> Self {
        Self {
            reply: Some(reply.into()),
            ..Self::default()
        }
    }

    /// 流式时按给定顺序逐块输出；非流式时拼接返回
    pub fn with_chunks<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            chunks: Some(chunks.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    /// 每次调用都返回给定错误（模拟服务不可达）
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::default()
        }
    }

    /// 每次调用前等待（用于超时测试）
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// 累计调用次数
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// 每次调用收到的消息列表
    pub fn seen_messages(&self) -> Vec<Vec<Message>> {
        self.seen.lock().map(|s| s.clone()).unwrap_or_default()
    }

    async fn record(&self, messages: &[Message]) -> Result<(), String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(messages.to_vec());
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.failure {
            Some(msg) => Err(msg.clone()),
            None => Ok(()),
        }
    }

    fn output_chunks(&self, messages: &[Message]) -> Vec<String> {
        if let Some(chunks) = &self.chunks {
            return chunks.clone();
        }
        if let Some(reply) = &self.reply {
            return vec![reply.clone()];
        }
        let last_user = latest_user_content(messages).unwrap_or("(no input)");
        vec![format!("Echo from Mock: {}", last_user)]
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, String> {
        self.record(messages).await?;
        Ok(self.output_chunks(messages).concat())
    }

    async fn complete_stream(&self, messages: &[Message]) -> Result<TokenStream, String> {
        self.record(messages).await?;
        let chunks = self.output_chunks(messages);
        Ok(Box::pin(stream::iter(chunks.into_iter().map(Ok))))
    }

    fn backend(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn test_echo_by_default() {
        let llm = MockLlmClient::new();
        let out = llm.complete(&[Message::user("hello")]).await.unwrap();
        assert_eq!(out, "Echo from Mock: hello");
        assert_eq!(llm.calls(), 1);
    }

    #[tokio::test]
    async fn test_chunks_preserve_order() {
        let llm = MockLlmClient::with_chunks(["a", "b", "c"]);
        let stream = llm.complete_stream(&[Message::user("x")]).await.unwrap();
        let tokens: Vec<String> = stream.map(|t| t.unwrap()).collect().await;
        assert_eq!(tokens, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_failing_client() {
        let llm = MockLlmClient::failing("unreachable");
        assert_eq!(llm.complete(&[]).await.unwrap_err(), "unreachable");
        assert!(llm.complete_stream(&[]).await.is_err());
        assert_eq!(llm.calls(), 2);
    }
}
