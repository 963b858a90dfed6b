//! Planner：把最新的用户请求交给规划模型，得到规范化的计划
//!
//! 规划调用是非流式的，带独立超时；超时或调用失败属于运行级错误，解析失败则回退（见 plan.rs）。

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use crate::agents::{parse_plan, plan_schema_json, prompts, Plan};
use crate::core::AgentError;
use crate::llm::LlmClient;
use crate::memory::{latest_user_content, Message};
use crate::tools::ToolRegistry;

/// Planner：持有规划模型、渲染好的 system prompt 与超时
pub struct Planner {
    llm: Arc<dyn LlmClient>,
    system_prompt: String,
    timeout: Duration,
}

impl Planner {
    pub fn new(llm: Arc<dyn LlmClient>, system_prompt: impl Into<String>, timeout: Duration) -> Self {
        Self {
            llm,
            system_prompt: system_prompt.into(),
            timeout,
        }
    }

    /// 用注册表中的工具清单与计划 Schema 生成 system prompt
    pub fn for_registry(llm: Arc<dyn LlmClient>, registry: &ToolRegistry, timeout: Duration) -> Self {
        let prompt = prompts::render_planner_prompt(&registry.render_for_prompt(), &plan_schema_json());
        Self::new(llm, prompt, timeout)
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// 规划调用的消息：system + 「User request: ...」
    pub fn build_messages(&self, history: &[Message]) -> Vec<Message> {
        let request = latest_user_content(history).unwrap_or("No message");
        vec![
            Message::system(self.system_prompt.clone()),
            Message::user(format!("User request: {}", request)),
        ]
    }

    /// 调用规划模型并解析计划
    pub async fn plan(&self, history: &[Message]) -> Result<Plan, AgentError> {
        let messages = self.build_messages(history);
        let raw = timeout(self.timeout, self.llm.complete(&messages))
            .await
            .map_err(|_| AgentError::LlmTimeout {
                stage: "planner",
                secs: self.timeout.as_secs(),
            })?
            .map_err(AgentError::LlmError)?;
        tracing::info!(backend = %self.llm.backend(), "Planner raw response: {}", raw);

        let plan = parse_plan(&raw);
        tracing::info!(steps = plan.len(), "Parsed plan");
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;

    #[tokio::test]
    async fn test_prompt_uses_latest_user_message() {
        let llm = Arc::new(MockLlmClient::with_reply(r#"{"plan": []}"#));
        let planner = Planner::new(llm.clone(), "sys", Duration::from_secs(5));
        let history = vec![
            Message::user("old question"),
            Message::assistant("old answer"),
            Message::user("What's the weather in Paris?"),
        ];
        let plan = planner.plan(&history).await.unwrap();
        assert!(plan.is_empty());

        let seen = llm.seen_messages();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0][0], Message::system("sys"));
        assert_eq!(seen[0][1].content, "User request: What's the weather in Paris?");
    }

    #[tokio::test]
    async fn test_completion_failure_is_run_level() {
        let planner = Planner::new(
            Arc::new(MockLlmClient::failing("connection refused")),
            "sys",
            Duration::from_secs(5),
        );
        let err = planner.plan(&[Message::user("hi")]).await.unwrap_err();
        assert_eq!(err, AgentError::LlmError("connection refused".to_string()));
    }

    #[tokio::test]
    async fn test_completion_timeout() {
        let llm = MockLlmClient::with_reply("{}").with_delay(Duration::from_millis(200));
        let planner = Planner::new(Arc::new(llm), "sys", Duration::from_millis(10));
        let err = planner.plan(&[Message::user("hi")]).await.unwrap_err();
        assert!(matches!(err, AgentError::LlmTimeout { stage: "planner", .. }));
    }

    #[test]
    fn test_registry_prompt_lists_tools_and_schema() {
        let registry = ToolRegistry::new();
        let planner = Planner::for_registry(Arc::new(MockLlmClient::new()), &registry, Duration::from_secs(1));
        assert!(planner.system_prompt().contains("(no tools available)"));
        assert!(planner.system_prompt().contains("tool_input"));
        assert!(!planner.system_prompt().contains("{tools}"));
    }
}
