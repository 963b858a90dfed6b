//! 任务工具：把任务追加到本地 JSON 文件
//!
//! 文件不存在或无法解析时视为空列表；写入由进程内的异步锁串行化，多个并发运行不会互相覆盖。

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::sync::Mutex;

use crate::tools::{ParamSpec, Tool};

/// 单条任务
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskItem {
    pub id: u64,
    pub task: String,
    pub completed: bool,
}

/// JSON 文件任务存储
pub struct TaskStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl TaskStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// 读取全部任务；文件缺失或损坏时返回空列表
    pub async fn load(&self) -> Vec<TaskItem> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(_) => return Vec::new(),
        };
        serde_json::from_str(&raw).unwrap_or_else(|e| {
            tracing::warn!(path = %self.path.display(), "tasks file unreadable, treating as empty: {}", e);
            Vec::new()
        })
    }

    async fn save(&self, tasks: &[TaskItem]) -> Result<(), String> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| format!("cannot create {}: {}", parent.display(), e))?;
            }
        }
        let body = serde_json::to_string_pretty(tasks).map_err(|e| e.to_string())?;
        tokio::fs::write(&self.path, body)
            .await
            .map_err(|e| format!("cannot write {}: {}", self.path.display(), e))
    }

    /// 追加任务，返回新任务与追加后的总数
    pub async fn add(&self, task: &str) -> Result<(TaskItem, usize), String> {
        let _guard = self.lock.lock().await;
        let mut tasks = self.load().await;
        let item = TaskItem {
            id: tasks.len() as u64 + 1,
            task: task.to_string(),
            completed: false,
        };
        tasks.push(item.clone());
        self.save(&tasks).await?;
        Ok((item, tasks.len()))
    }
}

/// add_task(task) 工具
pub struct AddTaskTool {
    store: Arc<TaskStore>,
}

impl AddTaskTool {
    pub fn new(store: Arc<TaskStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for AddTaskTool {
    fn name(&self) -> &str {
        "add_task"
    }

    fn description(&self) -> &str {
        "Add a task or reminder to the user's task list"
    }

    fn input_schema(&self) -> BTreeMap<String, ParamSpec> {
        BTreeMap::from([(
            "task".to_string(),
            ParamSpec::required("string", "The task description to add"),
        )])
    }

    async fn execute(&self, args: Map<String, Value>) -> Result<Value, String> {
        let task = args
            .get("task")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| "missing required argument: task".to_string())?;

        let (item, total) = self.store.add(task).await?;
        tracing::info!(id = item.id, total, "task added");
        Ok(json!({
            "status": "success",
            "message": "Task added successfully",
            "task": item,
            "total_tasks": total,
        }))
    }
}
