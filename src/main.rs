//! LifeHub 终端对话
//!
//! 逐行读取输入，流式打印回复；对话历史在进程内保留。
//! 参数：`--debug` 打印计划 / 步骤 / 执行日志，`--provider <openai|ollama|mock>`，`--config <path>`。

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use futures_util::StreamExt;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use lifehub::agent::{chat_stream, ChatRequest};
use lifehub::config::load_config_or_default;
use lifehub::core::{build_tool_registry, OrchestratorCache, WireEvent};
use lifehub::memory::Message;

struct CliArgs {
    debug: bool,
    provider: Option<String>,
    config: Option<PathBuf>,
}

fn parse_args() -> anyhow::Result<CliArgs> {
    let mut args = CliArgs {
        debug: false,
        provider: None,
        config: None,
    };
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--debug" => args.debug = true,
            "--provider" => args.provider = Some(it.next().context("--provider needs a value")?),
            "--config" => args.config = Some(PathBuf::from(it.next().context("--config needs a value")?)),
            other => anyhow::bail!("unknown argument: {}", other),
        }
    }
    Ok(args)
}

/// 打印一个事件；返回 token 文本以便追加到历史
fn render(event: &WireEvent, out: &mut impl Write) -> std::io::Result<Option<String>> {
    match event {
        WireEvent::Token { content } => {
            write!(out, "{}", content)?;
            out.flush()?;
            return Ok(Some(content.clone()));
        }
        WireEvent::ToolStart { name, input } => writeln!(out, "[tool] {} {}", name, input)?,
        WireEvent::ToolEnd { name, .. } => writeln!(out, "[tool] {} done", name)?,
        WireEvent::Plan { plan } => {
            writeln!(out, "[plan]")?;
            for step in plan {
                writeln!(
                    out,
                    "  {}. {} {}",
                    step.step,
                    step.description,
                    step.tool.as_deref().map(|t| format!("({})", t)).unwrap_or_default()
                )?;
            }
        }
        WireEvent::Step { step, action } => writeln!(out, "[step {}] {}", step, action)?,
        WireEvent::ContextLog { log } => {
            for entry in log {
                writeln!(out, "[log {}] {} -> {}", entry.step, entry.action, entry.result)?;
            }
        }
        WireEvent::Error { message } => writeln!(out, "\n[error] {}", message)?,
        WireEvent::Start | WireEvent::End => {}
    }
    Ok(None)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    lifehub::observability::init();
    let args = parse_args()?;

    let cfg = load_config_or_default(args.config.clone());
    let provider = args.provider.clone().unwrap_or_else(|| cfg.llm.provider.clone());
    let registry = Arc::new(build_tool_registry(&cfg).await);
    let cache = OrchestratorCache::new(cfg, registry);

    println!("LifeHub ({}). Type a message, empty line or Ctrl-D to quit.", provider);
    let mut history: Vec<Message> = Vec::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = std::io::stdout();

    loop {
        print!("> ");
        stdout.flush().context("flush stdout")?;
        let Some(line) = lines.next_line().await.context("read stdin")? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        history.push(Message::user(line));

        let request = ChatRequest::new(history.clone())
            .with_provider(provider.clone())
            .with_debug(args.debug);
        let mut events = chat_stream(&cache, request, CancellationToken::new()).await;
        let mut answer = String::new();
        let mut failed = false;
        while let Some(event) = events.next().await {
            if matches!(event, WireEvent::Error { .. }) {
                failed = true;
            }
            if let Some(token) = render(&event, &mut stdout).context("write stdout")? {
                answer.push_str(&token);
            }
        }
        println!();
        if failed {
            // 失败的回合不进入历史
            history.pop();
        } else {
            history.push(Message::assistant(answer));
        }
    }
    Ok(())
}
