//! 组装与缓存：按 provider 构建 LLM、工具注册表与 Orchestrator
//!
//! OrchestratorCache 由组合根（main / web）创建一次并以句柄传入请求处理；
//! 每个 provider 首次请求时惰性构建，之后复用同一个 Orchestrator。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::agents::{Explainer, Planner, Worker};
use crate::config::AppConfig;
use crate::core::{AgentError, Orchestrator};
use crate::llm::{create_embedder_from_config, LlmClient, MockLlmClient, OpenAiClient};
use crate::memory::{ChunkingConfig, InMemoryNotesIndex, NotesIndex};
use crate::tools::{AddTaskTool, PluginTool, SearchNotesTool, TaskStore, ToolExecutor, ToolRegistry, WeatherTool};

/// 规范化 provider 名（去空白、小写；空串视为配置中的默认值）
pub fn normalize_provider(provider: &str, cfg: &AppConfig) -> String {
    let p = provider.trim().to_lowercase();
    if p.is_empty() {
        cfg.llm.provider.trim().to_lowercase()
    } else {
        p
    }
}

/// 按 provider 创建 LLM 客户端
///
/// - openai：OpenAI 兼容端点；没有 OPENAI_API_KEY 时退回 Mock 并告警
/// - ollama：Ollama 的 /v1 兼容层
/// - mock：本地回显
pub fn create_llm(cfg: &AppConfig, provider: &str, temperature: f32) -> Result<Arc<dyn LlmClient>, AgentError> {
    match provider {
        "openai" => {
            let key = std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty());
            let Some(key) = key else {
                tracing::warn!("OPENAI_API_KEY not set, using Mock LLM");
                return Ok(Arc::new(MockLlmClient::new()));
            };
            let model = cfg.llm.model.clone().unwrap_or_else(|| cfg.llm.openai.model.clone());
            tracing::info!("Using OpenAI LLM ({})", model);
            Ok(Arc::new(
                OpenAiClient::new(cfg.llm.base_url.as_deref(), &model, Some(&key)).with_temperature(temperature),
            ))
        }
        "ollama" => {
            let model = cfg.llm.model.clone().unwrap_or_else(|| cfg.llm.ollama.model.clone());
            tracing::info!("Using Ollama LLM ({}) at {}", model, cfg.llm.ollama.base_url);
            Ok(Arc::new(
                OpenAiClient::new(Some(&cfg.llm.ollama.base_url), &model, Some("ollama"))
                    .with_temperature(temperature),
            ))
        }
        "mock" => Ok(Arc::new(MockLlmClient::new())),
        other => Err(AgentError::ConfigError(format!("Unknown provider: {}", other))),
    }
}

/// 构建进程级共享的工具注册表：天气、任务、笔记检索，以及配置中的插件
pub async fn build_tool_registry(cfg: &AppConfig) -> ToolRegistry {
    let mut tools = ToolRegistry::new();
    tools.register(WeatherTool::new(&cfg.tools.weather));
    tools.register(AddTaskTool::new(Arc::new(TaskStore::new(&cfg.tools.tasks_file))));

    let notes = &cfg.tools.notes;
    let chunking = ChunkingConfig {
        chunk_size: notes.chunk_size,
        chunk_overlap: notes.chunk_overlap,
        ..ChunkingConfig::default()
    };
    let embedder = create_embedder_from_config(cfg.llm.base_url.as_deref(), notes.embedding_model.as_deref(), None);
    let index = match InMemoryNotesIndex::load_dir(&notes.dir, &chunking, embedder.clone()).await {
        Ok(index) => index,
        Err(e) => {
            tracing::warn!("Notes index load failed ({}), starting empty", e);
            InMemoryNotesIndex::new(embedder)
        }
    };
    let index: Arc<dyn NotesIndex> = Arc::new(index);
    tools.register(SearchNotesTool::new(index, notes.top_k));

    for entry in &cfg.tools.plugins {
        if tools.contains(&entry.name) {
            tracing::warn!(plugin = %entry.name, "plugin name clashes with a registered tool, skipped");
            continue;
        }
        tools.register(PluginTool::new(entry));
    }
    tracing::info!(tools = ?tools.tool_names(), "tool registry built");
    tools
}

/// 用给定 provider 组装一个 Orchestrator（Planner 与 Explainer 各用一个客户端，温度不同）
pub fn build_orchestrator(
    cfg: &AppConfig,
    provider: &str,
    registry: Arc<ToolRegistry>,
) -> Result<Orchestrator, AgentError> {
    let planner_llm = create_llm(cfg, provider, cfg.llm.planner_temperature)?;
    let explainer_llm = create_llm(cfg, provider, cfg.llm.explainer_temperature)?;
    let planner = Planner::for_registry(
        planner_llm,
        &registry,
        Duration::from_secs(cfg.llm.timeouts.request),
    );
    let worker = Worker::new(ToolExecutor::new(registry, cfg.tools.tool_timeout_secs))
        .with_max_result_chars(cfg.tools.max_result_chars);
    let explainer = Explainer::new(explainer_llm, Duration::from_secs(cfg.llm.timeouts.stream));
    Ok(Orchestrator::new(planner, worker, explainer))
}

/// provider → Orchestrator 的惰性缓存
pub struct OrchestratorCache {
    cfg: AppConfig,
    registry: Arc<ToolRegistry>,
    entries: Mutex<HashMap<String, Arc<Orchestrator>>>,
}

impl OrchestratorCache {
    pub fn new(cfg: AppConfig, registry: Arc<ToolRegistry>) -> Self {
        Self {
            cfg,
            registry,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.cfg
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// 取缓存的 Orchestrator，不存在则构建并缓存；构建失败不写入缓存
    pub async fn get(&self, provider: &str) -> Result<Arc<Orchestrator>, AgentError> {
        let key = normalize_provider(provider, &self.cfg);
        let mut entries = self.entries.lock().await;
        if let Some(orch) = entries.get(&key) {
            return Ok(orch.clone());
        }
        tracing::info!(provider = %key, "building orchestrator");
        let orch = build_orchestrator(&self.cfg, &key, self.registry.clone())?.into_shared();
        entries.insert(key, orch.clone());
        Ok(orch)
    }

    /// 预置某个 provider 的 Orchestrator（测试或自定义客户端）
    pub async fn insert(&self, provider: &str, orchestrator: Arc<Orchestrator>) {
        let key = normalize_provider(provider, &self.cfg);
        self.entries.lock().await.insert(key, orchestrator);
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}
