//! Run a single Notion task from the command line and print each message.
//!
//! Usage: `notion-task [task...]`

use std::sync::Arc;

use notion_mcp_agent::{config::Config, runner::NotionTaskRunner};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_TASK: &str = "Create a new page titled 'PageFromMCPNotion'";

fn rule() -> String {
    "-".repeat(100)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "notion_mcp_agent=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let task = if args.is_empty() {
        DEFAULT_TASK.to_string()
    } else {
        args.join(" ")
    };

    let config = Arc::new(Config::from_env()?);
    let runner = NotionTaskRunner::new(config);

    let result = runner
        .run_stream(&task, |message| {
            println!("{}", rule());
            println!("{}", message);
            println!("{}", rule());
        })
        .await?;

    println!("Stop reason: {}", result.stop_reason);
    Ok(())
}
