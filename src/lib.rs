//! LifeHub - 多智能体编排（Planner → Worker → Explainer）
//!
//! 模块划分：
//! - **agent**: 对话调用入口（同步 / 流式）
//! - **agents**: 规划、执行、解释三个角色，计划解析与过程事件
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误、运行状态、状态机、组装缓存、事件流适配
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Ollama / Mock）与嵌入
//! - **memory**: 对话消息与笔记索引
//! - **observability**: tracing 初始化
//! - **tools**: 工具注册表、执行器与内置能力

pub mod agent;
pub mod agents;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod tools;
