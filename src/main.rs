//! askdb 命令行
//!
//! `askdb [--config PATH] [--conversation ID] [QUERY...]`：给出问题则回答一次，
//! 否则从 stdin 逐行读取问题（同一会话 id）。

use std::path::PathBuf;

use anyhow::Context;
use askdb::{config::load_config, observability, OrchestrationEvent, OrchestratorBuilder, RunOptions};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(name = "askdb", version, about = "Ask questions about a SQL database in natural language")]
struct Cli {
    /// 配置文件（叠加在 config/default.toml 之上）
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 会话 id；缺省时生成 UUID
    #[arg(long)]
    conversation: Option<String>,

    /// 打印每一轮的编排事件（JSON，写 stderr）
    #[arg(long)]
    events: bool,

    /// 问题；为空时进入交互模式
    query: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();
    let cli = Cli::parse();

    let cfg = load_config(cli.config.clone()).context("Failed to load config")?;
    let orchestrator = OrchestratorBuilder::new(cfg)
        .build()
        .await
        .context("Failed to build orchestrator")?;

    let conversation_id = cli
        .conversation
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    tracing::info!(conversation_id = %conversation_id, "askdb ready");

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    let options = || {
        let mut opts = RunOptions::default().with_cancel_token(cancel.clone());
        if cli.events {
            let (tx, mut rx) = mpsc::unbounded_channel::<OrchestrationEvent>();
            tokio::spawn(async move {
                while let Some(ev) = rx.recv().await {
                    if let Ok(line) = serde_json::to_string(&ev) {
                        eprintln!("{}", line);
                    }
                }
            });
            opts = opts.with_event_tx(tx);
        }
        opts
    };

    if !cli.query.is_empty() {
        let query = cli.query.join(" ");
        let answer = orchestrator.run_with(&query, &conversation_id, options()).await;
        println!("{}", answer);
        return Ok(());
    }

    eprintln!("askdb (conversation {}). Empty line or Ctrl-D to quit.", conversation_id);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let query = line.trim();
        if query.is_empty() || cancel.is_cancelled() {
            break;
        }
        let answer = orchestrator.run_with(query, &conversation_id, options()).await;
        println!("{}", answer);
    }
    Ok(())
}
