//! 工具箱：Tool 接口与注册表、带超时的执行器，以及内置能力（天气、任务、笔记检索）与命令行插件

pub mod executor;
pub mod notes;
pub mod plugin;
pub mod registry;
pub mod tasks;
pub mod weather;

pub use executor::ToolExecutor;
pub use notes::{search_notes, SearchNotesTool};
pub use plugin::PluginTool;
pub use registry::{strip_null_args, ParamSpec, Tool, ToolDescriptor, ToolRegistry};
pub use tasks::{AddTaskTool, TaskItem, TaskStore};
pub use weather::WeatherTool;
