//! Worker：按计划声明的顺序逐步执行，每步恰好追加一条执行日志
//!
//! - 工具已注册：调用，成功记录序列化结果，失败记录 "Error: ..."，继续下一步
//! - 工具未注册或没有工具：记为推理 / 汇总步骤
//!
//! 执行严格串行，不按 step 号重排；结果按字符截断到 max_result_chars。

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::agents::{AgentEvent, PlanStep};
use crate::core::AgentError;
use crate::tools::ToolExecutor;

/// 单条结果的默认最大字符数
pub const MAX_RESULT_CHARS: usize = 1000;

/// 无工具 / 未知工具步骤的固定结果
pub const REASONING_RESULT: &str = "Reasoning/synthesis step completed";

/// 执行日志条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextLogEntry {
    pub step: u64,
    pub action: String,
    pub result: String,
}

/// 单步执行结果
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Succeeded { tool: String, output: Value },
    Failed { tool: String, reason: String },
    /// 无工具，或工具名未注册
    Reasoning,
}

/// 按字符截断（非字节），保证 UTF-8 边界
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// 工具结果转文本：字符串原样，其余为紧凑 JSON
pub fn render_output(output: &Value) -> String {
    match output {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// 工具步骤的 action 文本：`tool(<serialized input>)`
pub fn tool_action(tool: &str, input: &Map<String, Value>) -> String {
    format!("{}({})", tool, Value::Object(input.clone()))
}

/// Worker：持有工具执行器与截断长度
pub struct Worker {
    executor: ToolExecutor,
    max_result_chars: usize,
}

impl Worker {
    pub fn new(executor: ToolExecutor) -> Self {
        Self {
            executor,
            max_result_chars: MAX_RESULT_CHARS,
        }
    }

    pub fn with_max_result_chars(mut self, max_result_chars: usize) -> Self {
        self.max_result_chars = max_result_chars;
        self
    }

    /// 该步实际要调用的工具（已注册才算）
    fn resolve<'a>(&self, step: &'a PlanStep) -> Option<&'a str> {
        step.tool
            .as_deref()
            .filter(|name| self.executor.contains(name))
    }

    /// 执行一步；工具失败转为 StepOutcome::Failed，从不向上抛
    pub async fn run_step(&self, step: &PlanStep, events: Option<&mpsc::UnboundedSender<AgentEvent>>) -> StepOutcome {
        let Some(tool) = self.resolve(step) else {
            if let Some(name) = &step.tool {
                tracing::warn!(step = step.step, tool = %name, "unknown tool, treating step as reasoning");
            }
            return StepOutcome::Reasoning;
        };
        let input = step.tool_input.clone().unwrap_or_default();

        emit(
            events,
            AgentEvent::ToolStarted {
                name: tool.to_string(),
                input: Value::Object(input.clone()),
            },
        );
        let outcome = match self.executor.execute(tool, input).await {
            Ok(output) => StepOutcome::Succeeded {
                tool: tool.to_string(),
                output,
            },
            Err(e) => {
                if e.is_run_level() {
                    tracing::error!(step = step.step, tool = %tool, "Unexpected error from tool: {}", e);
                } else {
                    tracing::warn!(step = step.step, tool = %tool, "Tool failed: {}", e);
                }
                StepOutcome::Failed {
                    tool: tool.to_string(),
                    reason: tool_error_message(&e),
                }
            }
        };
        let finished = match &outcome {
            StepOutcome::Succeeded { output, .. } => output.clone(),
            StepOutcome::Failed { reason, .. } => Value::String(format!("Error: {}", reason)),
            StepOutcome::Reasoning => Value::Null,
        };
        emit(
            events,
            AgentEvent::ToolFinished {
                name: tool.to_string(),
                output: finished,
            },
        );
        outcome
    }

    /// 把单步结果变成日志条目
    fn log_entry(&self, step: &PlanStep, outcome: &StepOutcome) -> ContextLogEntry {
        let input = step.tool_input.clone().unwrap_or_default();
        let (action, result) = match outcome {
            StepOutcome::Succeeded { tool, output } => {
                let rendered = render_output(output);
                tracing::info!(
                    "Tool {} returned: {}...",
                    tool,
                    truncate_chars(&rendered, 200)
                );
                (tool_action(tool, &input), rendered)
            }
            StepOutcome::Failed { tool, reason } => {
                (tool_action(tool, &input), format!("Error: {}", reason))
            }
            StepOutcome::Reasoning => (step.description.clone(), REASONING_RESULT.to_string()),
        };
        ContextLogEntry {
            step: step.step,
            action,
            result: truncate_chars(&result, self.max_result_chars),
        }
    }

    /// 执行整份计划，把每步结果追加到 log 并返回
    ///
    /// 只有取消会返回 Err；正常返回时新增条目数等于计划长度，顺序与计划一致。
    pub async fn execute(
        &self,
        plan: &[PlanStep],
        mut log: Vec<ContextLogEntry>,
        events: Option<&mpsc::UnboundedSender<AgentEvent>>,
        cancel: &CancellationToken,
    ) -> Result<Vec<ContextLogEntry>, AgentError> {
        for step in plan {
            if cancel.is_cancelled() {
                return Err(AgentError::Cancelled);
            }
            tracing::info!("Executing step {}: {}", step.step, step.description);

            let action = match self.resolve(step) {
                Some(tool) => tool_action(tool, &step.tool_input.clone().unwrap_or_default()),
                None => step.description.clone(),
            };
            emit(
                events,
                AgentEvent::StepStarted {
                    step: step.step,
                    action,
                },
            );

            let outcome = self.run_step(step, events).await;
            log.push(self.log_entry(step, &outcome));
        }
        tracing::info!("Worker completed {} steps", plan.len());
        Ok(log)
    }
}

/// 工具错误在日志中的文本（不带 AgentError 的前缀）
fn tool_error_message(err: &AgentError) -> String {
    match err {
        AgentError::ToolExecutionFailed(msg) => msg.clone(),
        AgentError::ToolTimeout(msg) => format!("timeout: {}", msg),
        other => other.to_string(),
    }
}

/// 推送事件；接收端已关闭时忽略
pub(crate) fn emit(events: Option<&mpsc::UnboundedSender<AgentEvent>>, event: AgentEvent) {
    if let Some(tx) = events {
        let _ = tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::json;

    use crate::tools::{Tool, ToolRegistry};

    struct FailingTool;

    #[async_trait]
    impl Tool for FailingTool {
        fn name(&self) -> &str {
            "flaky"
        }

        fn description(&self) -> &str {
            "Always raises"
        }

        async fn execute(&self, _args: Map<String, Value>) -> Result<Value, String> {
            Err("service unavailable".to_string())
        }
    }

    struct BigTool;

    #[async_trait]
    impl Tool for BigTool {
        fn name(&self) -> &str {
            "big"
        }

        fn description(&self) -> &str {
            "Returns a very long string"
        }

        async fn execute(&self, _args: Map<String, Value>) -> Result<Value, String> {
            Ok(Value::String("é".repeat(2500)))
        }
    }

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }

        fn description(&self) -> &str {
            "Never answers in time"
        }

        async fn execute(&self, _args: Map<String, Value>) -> Result<Value, String> {
            tokio::time::sleep(std::time::Duration::from_secs(30)).await;
            Ok(Value::Null)
        }
    }

    struct WeatherStub;

    #[async_trait]
    impl Tool for WeatherStub {
        fn name(&self) -> &str {
            "get_weather"
        }

        fn description(&self) -> &str {
            "Fake weather"
        }

        async fn execute(&self, args: Map<String, Value>) -> Result<Value, String> {
            Ok(json!({"city": args.get("city").cloned().unwrap_or(Value::Null), "temp": "61°F"}))
        }
    }

    fn worker() -> Worker {
        let mut registry = ToolRegistry::new();
        registry.register(FailingTool);
        registry.register(BigTool);
        registry.register(WeatherStub);
        Worker::new(ToolExecutor::new(Arc::new(registry), 5))
    }

    async fn run(plan: &[PlanStep]) -> Vec<ContextLogEntry> {
        worker()
            .execute(plan, Vec::new(), None, &CancellationToken::new())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_failure_is_recorded_and_execution_continues() {
        let plan = vec![
            PlanStep::tool(1, "call flaky service", "flaky", json!({})),
            PlanStep::reasoning(2, "summarize"),
        ];
        let log = run(&plan).await;
        assert_eq!(log.len(), 2);
        assert!(log[0].result.starts_with("Error: "));
        assert_eq!(log[0].action, "flaky({})");
        assert_eq!(log[1].result, REASONING_RESULT);
        assert_eq!(log[1].action, "summarize");
    }

    #[tokio::test]
    async fn test_tool_timeout_is_a_step_failure() {
        let mut registry = ToolRegistry::new();
        registry.register(SlowTool);
        let executor = ToolExecutor::with_timeout(Arc::new(registry), std::time::Duration::from_millis(20));
        let plan = vec![
            PlanStep::tool(1, "slow lookup", "slow", json!({})),
            PlanStep::reasoning(2, "wrap up"),
        ];
        let log = Worker::new(executor)
            .execute(&plan, Vec::new(), None, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(log.len(), 2);
        assert!(log[0].result.starts_with("Error: "));
        assert!(log[0].result.contains("timeout"));
        assert_eq!(log[1].result, REASONING_RESULT);
    }

    #[tokio::test]
    async fn test_long_results_truncated_to_exact_char_count() {
        let log = run(&[PlanStep::tool(1, "big", "big", json!({}))]).await;
        assert_eq!(log[0].result.chars().count(), 1000);
    }

    #[tokio::test]
    async fn test_unknown_tool_degrades_to_reasoning() {
        let plan = vec![PlanStep::tool(1, "do magic", "nonexistent_tool", json!({"x": 1}))];
        let log = run(&plan).await;
        assert_eq!(
            log,
            vec![ContextLogEntry {
                step: 1,
                action: "do magic".to_string(),
                result: REASONING_RESULT.to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_log_follows_declared_order_not_step_numbers() {
        let plan = vec![
            PlanStep::reasoning(5, "five"),
            PlanStep::tool(2, "weather", "get_weather", json!({"city": "Paris"})),
            PlanStep::reasoning(9, "nine"),
        ];
        let existing = vec![ContextLogEntry {
            step: 0,
            action: "seed".into(),
            result: "kept".into(),
        }];
        let log = worker()
            .execute(&plan, existing, None, &CancellationToken::new())
            .await
            .unwrap();
        let steps: Vec<u64> = log.iter().map(|e| e.step).collect();
        assert_eq!(steps, vec![0, 5, 2, 9]);
        assert_eq!(log[2].action, r#"get_weather({"city":"Paris"})"#);
        assert_eq!(log[2].result, r#"{"city":"Paris","temp":"61°F"}"#);
    }

    #[tokio::test]
    async fn test_tool_events_are_paired_in_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let plan = vec![
            PlanStep::tool(1, "weather", "get_weather", json!({"city": "Oslo"})),
            PlanStep::tool(2, "flaky", "flaky", json!({})),
            PlanStep::tool(3, "ghost", "nonexistent_tool", json!({})),
        ];
        worker()
            .execute(&plan, Vec::new(), Some(&tx), &CancellationToken::new())
            .await
            .unwrap();
        drop(tx);

        let mut tool_events = Vec::new();
        while let Some(ev) = rx.recv().await {
            match ev {
                AgentEvent::ToolStarted { name, .. } => tool_events.push(format!("start:{name}")),
                AgentEvent::ToolFinished { name, output } => {
                    if name == "flaky" {
                        assert_eq!(output, json!("Error: service unavailable"));
                    }
                    tool_events.push(format!("end:{name}"));
                }
                _ => {}
            }
        }
        assert_eq!(
            tool_events,
            vec!["start:get_weather", "end:get_weather", "start:flaky", "end:flaky"]
        );
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = worker()
            .execute(&[PlanStep::reasoning(1, "x")], Vec::new(), None, &cancel)
            .await
            .unwrap_err();
        assert_eq!(err, AgentError::Cancelled);
    }

    #[test]
    fn test_truncate_chars_boundaries() {
        assert_eq!(truncate_chars("abc", 5), "abc");
        assert_eq!(truncate_chars("abcdef", 3), "abc");
        assert_eq!(truncate_chars("日本語テキスト", 3), "日本語");
    }
}
