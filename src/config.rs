//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `LIFEHUB__*` 覆盖（双下划线表示嵌套，如 `LIFEHUB__LLM__PROVIDER=ollama`）。

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub tools: ToolsSection,
    pub web: WebSection,
}

/// [app] 段
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSection {
    pub name: Option<String>,
}

/// [llm] 段：后端选择、采样温度与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 默认后端：openai / ollama / mock；请求中的 provider 字段优先
    pub provider: String,
    /// 覆盖当前后端的模型名
    pub model: Option<String>,
    /// 覆盖 OpenAI 后端的 base_url（自建代理等）
    pub base_url: Option<String>,
    pub planner_temperature: f32,
    pub explainer_temperature: f32,
    pub openai: LlmOpenAiSection,
    pub ollama: LlmOllamaSection,
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            base_url: None,
            planner_temperature: 0.3,
            explainer_temperature: 0.7,
            openai: LlmOpenAiSection::default(),
            ollama: LlmOllamaSection::default(),
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

pub fn default_provider() -> String {
    "openai".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmOpenAiSection {
    pub model: String,
}

impl Default for LlmOpenAiSection {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
        }
    }
}

/// [llm.ollama] 段：Ollama 的 OpenAI 兼容端点
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmOllamaSection {
    pub model: String,
    pub base_url: String,
}

impl Default for LlmOllamaSection {
    fn default() -> Self {
        Self {
            model: "llama3.2".to_string(),
            base_url: "http://localhost:11434/v1".to_string(),
        }
    }
}

/// [llm.timeouts] 段（秒）：request 用于规划（非流式），stream 用于解释（整段流式输出）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmTimeoutsSection {
    pub request: u64,
    pub stream: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            request: 60,
            stream: 120,
        }
    }
}

/// [tools] 段：工具超时、日志截断长度、任务文件、天气、笔记、插件
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    pub tool_timeout_secs: u64,
    /// 执行日志中单条结果的最大字符数
    pub max_result_chars: usize,
    pub tasks_file: PathBuf,
    pub weather: WeatherSection,
    pub notes: NotesSection,
    pub plugins: Vec<PluginEntry>,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: 30,
            max_result_chars: 1000,
            tasks_file: PathBuf::from("state/tasks.json"),
            weather: WeatherSection::default(),
            notes: NotesSection::default(),
            plugins: Vec::new(),
        }
    }
}

/// [tools.weather] 段：Open-Meteo 端点
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WeatherSection {
    pub geocoding_url: String,
    pub forecast_url: String,
    pub timeout_secs: u64,
}

impl Default for WeatherSection {
    fn default() -> Self {
        Self {
            geocoding_url: "https://geocoding-api.open-meteo.com/v1/search".to_string(),
            forecast_url: "https://api.open-meteo.com/v1/forecast".to_string(),
            timeout_secs: 10,
        }
    }
}

/// [tools.notes] 段：笔记目录、分块与检索参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotesSection {
    pub dir: PathBuf,
    pub top_k: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// 设置后使用 embeddings 打分；未设置时按关键词重合度打分
    pub embedding_model: Option<String>,
}

impl Default for NotesSection {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data/notes"),
            top_k: 5,
            chunk_size: 500,
            chunk_overlap: 50,
            embedding_model: None,
        }
    }
}

/// [[tools.plugins]] 项：外部命令能力
#[derive(Debug, Clone, Deserialize)]
pub struct PluginEntry {
    pub name: String,
    pub description: String,
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub params: Vec<PluginParam>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PluginParam {
    pub name: String,
    #[serde(rename = "type", default = "default_param_kind")]
    pub kind: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub description: String,
}

fn default_param_kind() -> String {
    "string".to_string()
}

/// [web] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WebSection {
    pub port: u16,
}

impl Default for WebSection {
    fn default() -> Self {
        Self { port: 8000 }
    }
}

/// 从 config 目录加载配置，环境变量 LIFEHUB__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 LIFEHUB__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("LIFEHUB")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

/// 加载失败时记录警告并使用默认配置
pub fn load_config_or_default(config_path: Option<PathBuf>) -> AppConfig {
    load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    })
}
