//! 工具注册表
//!
//! 所有能力实现 Tool trait（name / description / input_schema / execute），由 ToolRegistry 按名注册与查找。
//! 注册表在启动时建好，之后在多次运行之间只读共享；ToolExecutor 在调用时加超时并统一转 AgentError。

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

/// 单个参数的声明：类型、是否必填、描述
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParamSpec {
    #[serde(rename = "type")]
    pub kind: String,
    pub required: bool,
    pub description: String,
}

impl ParamSpec {
    pub fn required(kind: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            required: true,
            description: description.into(),
        }
    }

    pub fn optional(kind: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            required: false,
            description: description.into(),
        }
    }
}

/// 能力描述：注册后不可变
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: BTreeMap<String, ParamSpec>,
}

impl ToolDescriptor {
    /// 渲染为 prompt 中的一行，如 `- get_weather(city: string): Get weather ...`
    pub fn signature_line(&self) -> String {
        let params = self
            .input_schema
            .iter()
            .map(|(name, spec)| {
                if spec.required {
                    format!("{}: {}", name, spec.kind)
                } else {
                    format!("{}?: {}", name, spec.kind)
                }
            })
            .collect::<Vec<_>>()
            .join(", ");
        format!("- {}({}): {}", self.name, params, self.description)
    }
}

/// 工具 trait：名称、描述（供 LLM 理解）、参数声明、异步执行（args 为 JSON 对象）
///
/// 成功返回任意可 JSON 序列化的值；失败返回能力自身的错误信息。
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（对应计划步骤中的 "tool" 字段）
    fn name(&self) -> &str;

    /// 工具描述（供 LLM 理解功能）
    fn description(&self) -> &str;

    /// 参数声明；默认无参数
    fn input_schema(&self) -> BTreeMap<String, ParamSpec> {
        BTreeMap::new()
    }

    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
        }
    }

    /// 执行工具
    async fn execute(&self, args: Map<String, Value>) -> Result<Value, String>;
}

/// 工具注册表：按名称存储 Arc<dyn Tool>，支持 register / get / execute / descriptors
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.register_arc(Arc::new(tool));
    }

    /// 同名注册会覆盖旧工具
    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            tracing::warn!(tool = %name, "tool re-registered, previous capability replaced");
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// 调用工具；值为 null 的参数在分发前被过滤掉
    pub async fn execute(&self, name: &str, args: Map<String, Value>) -> Result<Value, String> {
        let tool = self.tools.get(name).ok_or_else(|| format!("Unknown tool: {name}"))?;
        tool.execute(strip_null_args(args)).await
    }

    /// 按名称排序，保证 prompt 渲染稳定
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        let mut descriptors: Vec<ToolDescriptor> =
            self.tools.values().map(|tool| tool.descriptor()).collect();
        descriptors.sort_by(|a, b| a.name.cmp(&b.name));
        descriptors
    }

    /// 生成 Planner prompt 中的 Available tools 段落
    pub fn render_for_prompt(&self) -> String {
        let lines: Vec<String> = self
            .descriptors()
            .iter()
            .map(ToolDescriptor::signature_line)
            .collect();
        if lines.is_empty() {
            "(no tools available)".to_string()
        } else {
            lines.join("\n")
        }
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// 去掉值为 null 的参数
pub fn strip_null_args(args: Map<String, Value>) -> Map<String, Value> {
    args.into_iter().filter(|(_, v)| !v.is_null()).collect()
}
