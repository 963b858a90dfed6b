//! 外部插件工具：由配置 [[tools.plugins]] 注册，运行「程序 + 参数模板」扩展能力集
//!
//! 参数模板中 {{key}} 从（已过滤 null 的）调用参数中取值，未提供的占位符替换为空串；
//! 执行时无 shell，直接 exec program + substituted args。stdout 能解析为 JSON 时按 JSON 返回。

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::process::Command;

use crate::config::PluginEntry;
use crate::tools::{ParamSpec, Tool};

/// 从配置项构建的插件工具
pub struct PluginTool {
    name: String,
    description: String,
    program: String,
    args_template: Vec<String>,
    params: BTreeMap<String, ParamSpec>,
    env: HashMap<String, String>,
}

impl PluginTool {
    pub fn new(entry: &PluginEntry) -> Self {
        let params = entry
            .params
            .iter()
            .map(|p| {
                let spec = ParamSpec {
                    kind: p.kind.clone(),
                    required: p.required,
                    description: p.description.clone(),
                };
                (p.name.clone(), spec)
            })
            .collect();
        Self {
            name: entry.name.clone(),
            description: entry.description.clone(),
            program: entry.program.clone(),
            args_template: entry.args.clone(),
            params,
            env: entry.env.clone(),
        }
    }

    /// 替换模板中的 {{key}}；单遍扫描，参数值里的 {{...}} 不会再被展开
    fn substitute(&self, args: &Map<String, Value>) -> Vec<String> {
        self.args_template
            .iter()
            .map(|tpl| self.expand(tpl, args))
            .collect()
    }

    fn expand(&self, tpl: &str, args: &Map<String, Value>) -> String {
        let mut out = String::with_capacity(tpl.len());
        let mut rest = tpl;
        while let Some(open) = rest.find("{{") {
            let Some(close) = rest[open + 2..].find("}}") else {
                break;
            };
            out.push_str(&rest[..open]);
            let key = &rest[open + 2..open + 2 + close];
            match args.get(key) {
                Some(Value::String(s)) => out.push_str(s),
                Some(v) => out.push_str(&v.to_string()),
                // 已声明但未提供的参数置空；其它原样保留
                None if self.params.contains_key(key) => {}
                None => out.push_str(&rest[open..open + 4 + close]),
            }
            rest = &rest[open + 4 + close..];
        }
        out.push_str(rest);
        out
    }

    fn missing_required(&self, args: &Map<String, Value>) -> Option<&str> {
        self.params
            .iter()
            .find(|(name, spec)| spec.required && !args.contains_key(name.as_str()))
            .map(|(name, _)| name.as_str())
    }
}

#[async_trait]
impl Tool for PluginTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn input_schema(&self) -> BTreeMap<String, ParamSpec> {
        self.params.clone()
    }

    async fn execute(&self, args: Map<String, Value>) -> Result<Value, String> {
        if let Some(name) = self.missing_required(&args) {
            return Err(format!("missing required argument: {}", name));
        }
        let args_vec = self.substitute(&args);
        tracing::info!(tool = %self.name, program = %self.program, "plugin tool invoke");
        let output = Command::new(&self.program)
            .args(&args_vec)
            .envs(&self.env)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| format!("plugin spawn failed: {}", e))?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            return Err(format!(
                "exit {:?}: stderr {}",
                output.status.code(),
                stderr.trim()
            ));
        }
        let text = stdout.trim();
        Ok(serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string())))
    }
}
