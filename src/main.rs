//! Echo - 陪伴对话 CLI
//!
//! 入口：初始化日志、加载配置、装配编排器，然后逐行读取标准输入作为用户消息，
//! 每轮把有序片段输出到标准输出。Ctrl+C / SIGTERM 时在当前轮写入存储后退出。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use echo::core::{EchoBuilder, ShutdownManager, ShutdownReason};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    echo::observability::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let builder = EchoBuilder::from_config(config_path).context("Failed to load config")?;
    let user_id = builder.config().app.default_user.clone();

    let orchestrator = builder.build().context("Failed to build orchestrator")?;

    let shutdown = Arc::new(ShutdownManager::new());
    shutdown.install_signal_handlers();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read stdin")?,
            _ = shutdown.wait_for_shutdown() => break,
        };
        let Some(line) = line else {
            shutdown.shutdown(ShutdownReason::UserInitiated);
            break;
        };
        let message = line.trim();
        if message.is_empty() {
            continue;
        }

        let result = orchestrator.process_turn(&user_id, message).await;
        stdout.write_all(result.render().as_bytes()).await?;
        stdout.write_all(b"\n\n").await?;
        stdout.flush().await?;

        // 信号在处理本轮期间到达：本轮已写入存储，直接退出
        if shutdown.is_shutdown() {
            break;
        }
    }

    let (prompt, completion, total) = orchestrator.token_usage();
    tracing::info!(prompt, completion, total, "echo stopped");
    Ok(())
}
