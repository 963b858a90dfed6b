//! 计划解析：把 Planner 的原始文本变成规范化的步骤序列
//!
//! 纯函数、无 I/O、结果只由输入文本决定。解析不了的输出（非 JSON、结构不对、缺 `plan` 字段）
//! 一律回退为单步「直接回复」计划，从不让一次运行因此失败。

use std::collections::HashMap;

use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 回退计划唯一步骤的描述
pub const FALLBACK_DESCRIPTION: &str = "Respond directly to user";

/// 计划中的一步；tool 为 None 表示纯推理 / 汇总步骤
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub step: u64,
    pub description: String,
    pub tool: Option<String>,
    pub tool_input: Option<Map<String, Value>>,
}

impl PlanStep {
    pub fn reasoning(step: u64, description: impl Into<String>) -> Self {
        Self {
            step,
            description: description.into(),
            tool: None,
            tool_input: None,
        }
    }

    pub fn tool(step: u64, description: impl Into<String>, tool: impl Into<String>, input: Value) -> Self {
        Self {
            step,
            description: description.into(),
            tool: Some(tool.into()),
            tool_input: input.as_object().cloned(),
        }
    }
}

/// 有序步骤序列，可为空；创建后只读
pub type Plan = Vec<PlanStep>;

/// 解析失败时使用的单步计划
pub fn fallback_plan() -> Plan {
    vec![PlanStep::reasoning(1, FALLBACK_DESCRIPTION)]
}

/// 去掉包裹整段回复的 ``` 代码块标记（首行整行丢弃，末行为 ``` 时也丢弃）
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    if !trimmed.starts_with("```") {
        return trimmed;
    }
    let body = match trimmed.find('\n') {
        Some(idx) => &trimmed[idx + 1..],
        None => return "",
    };
    let body = body.trim_end();
    match body.rfind('\n') {
        Some(idx) if body[idx + 1..].trim() == "```" => &body[..idx],
        None if body.trim() == "```" => "",
        _ => body,
    }
}

/// 正整数步骤号；支持数字字符串
fn step_number(value: Option<&Value>) -> Option<u64> {
    match value? {
        Value::Number(n) => n.as_u64().filter(|n| *n > 0),
        Value::String(s) => s.trim().parse::<u64>().ok().filter(|n| *n > 0),
        _ => None,
    }
}

/// 规范化单个条目：缺失的 step 取位置（1 起），缺失的 description 为空串，tool / tool_input 缺失即 None
fn normalize_step(position: usize, entry: &Map<String, Value>) -> PlanStep {
    let step = step_number(entry.get("step")).unwrap_or(position as u64 + 1);
    let description = entry
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let tool = entry
        .get("tool")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string);
    let tool_input = entry.get("tool_input").and_then(Value::as_object).cloned();
    PlanStep {
        step,
        description,
        tool,
        tool_input,
    }
}

fn try_parse(raw: &str) -> Result<Plan, String> {
    let body = strip_code_fence(raw);
    let doc: Value = serde_json::from_str(body).map_err(|e| format!("invalid JSON: {e}"))?;
    let entries = doc
        .get("plan")
        .ok_or("missing `plan` field")?
        .as_array()
        .ok_or("`plan` is not an array")?;
    entries
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            entry
                .as_object()
                .map(|obj| normalize_step(i, obj))
                .ok_or_else(|| format!("plan entry {} is not an object", i + 1))
        })
        .collect()
}

/// 解析 Planner 输出；任何错误都回退为 fallback_plan()
pub fn parse_plan(raw: &str) -> Plan {
    match try_parse(raw) {
        Ok(plan) => plan,
        Err(reason) => {
            tracing::warn!("Failed to parse plan ({}), falling back to direct response", reason);
            fallback_plan()
        }
    }
}

/// 计划格式（仅用于 Schema 生成，注入 Planner 的 system prompt）
#[allow(dead_code)]
#[derive(JsonSchema)]
struct PlanFormat {
    /// 按执行顺序排列的步骤
    pub plan: Vec<PlanStepFormat>,
}

#[allow(dead_code)]
#[derive(JsonSchema)]
struct PlanStepFormat {
    /// 步骤号，从 1 开始
    pub step: u64,
    /// 这一步要做什么
    pub description: String,
    /// 工具名；纯推理 / 汇总步骤为 null
    pub tool: Option<String>,
    /// 工具参数；无工具时为 null
    pub tool_input: Option<HashMap<String, Value>>,
}

/// 返回计划格式的 JSON Schema 字符串
pub fn plan_schema_json() -> String {
    let schema = schema_for!(PlanFormat);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_not_json_falls_back() {
        assert_eq!(parse_plan("not json"), fallback_plan());
        assert_eq!(parse_plan(""), fallback_plan());
        assert_eq!(parse_plan("{\"plan\": [1, 2]}"), fallback_plan());
        assert_eq!(parse_plan("{\"steps\": []}"), fallback_plan());
        assert_eq!(parse_plan("[]"), fallback_plan());
    }

    #[test]
    fn test_fallback_shape() {
        let plan = fallback_plan();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].step, 1);
        assert_eq!(plan[0].description, "Respond directly to user");
        assert!(plan[0].tool.is_none());
        assert!(plan[0].tool_input.is_none());
    }

    #[test]
    fn test_fenced_json_is_unwrapped() {
        let raw = "```json\n{\"plan\": [{\"step\": 1, \"description\": \"Check weather\", \"tool\": \"get_weather\", \"tool_input\": {\"city\": \"Paris\"}}]}\n```";
        let plan = parse_plan(raw);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].tool.as_deref(), Some("get_weather"));
        assert_eq!(plan[0].tool_input.as_ref().unwrap()["city"], json!("Paris"));
    }

    #[test]
    fn test_fence_without_closing_marker() {
        let raw = "```\n{\"plan\": []}";
        assert_eq!(parse_plan(raw), Vec::<PlanStep>::new());
    }

    #[test]
    fn test_missing_fields_are_filled_without_reordering() {
        let raw = r#"{"plan": [
            {"step": 7, "description": "late number first"},
            {"description": "no number", "tool": null},
            {"tool": "add_task", "tool_input": {"task": "buy milk"}},
            {"step": 2, "tool": "", "tool_input": "oops"}
        ]}"#;
        let plan = parse_plan(raw);
        let steps: Vec<u64> = plan.iter().map(|s| s.step).collect();
        assert_eq!(steps, vec![7, 2, 3, 2]);
        assert_eq!(plan[1].description, "no number");
        assert_eq!(plan[2].description, "");
        assert_eq!(plan[2].tool.as_deref(), Some("add_task"));
        assert!(plan[3].tool.is_none());
        assert!(plan[3].tool_input.is_none());
    }

    #[test]
    fn test_empty_plan_is_valid() {
        assert!(parse_plan(r#"{"plan": []}"#).is_empty());
    }

    #[test]
    fn test_parse_is_deterministic() {
        let raw = r#"{"plan": [{"description": "a"}, {"step": "3", "tool": "search_notes", "tool_input": {"query": "pasta"}}]}"#;
        let first = parse_plan(raw);
        for _ in 0..5 {
            assert_eq!(parse_plan(raw), first);
        }
        assert_eq!(first[1].step, 3);
    }

    #[test]
    fn test_schema_mentions_fields() {
        let schema = plan_schema_json();
        assert!(schema.contains("tool_input"));
        assert!(schema.contains("description"));
    }
}
