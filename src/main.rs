use std::io::Read;
use std::path::PathBuf;

use clap::Parser;
use nestql::{config::CONFIG_FILE_NAME, Config, Nestql};
use nestql_core::Operation;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "nestql")]
#[command(about = "NestQL - resolve nested declarative queries against a model catalog", long_about = None)]
struct Args {
    /// Configuration file with the model catalog
    #[arg(short, long, default_value = CONFIG_FILE_NAME)]
    config: PathBuf,

    /// Operation to run (query, create, update, delete, count)
    #[arg(short, long, default_value = "query")]
    op: Operation,

    /// Request as JSON, or `-` to read it from stdin
    input: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Logs go to stderr so stdout carries only the result
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "nestql=info,nestql_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Config::load(&args.config)?;
    tracing::info!(
        "Loaded {} models from {}",
        config.models.len(),
        args.config.display()
    );
    let nestql = Nestql::from_config(&config)?;

    let raw = if args.input == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        args.input
    };
    let input: serde_json::Value = serde_json::from_str(&raw)?;

    let output = nestql.run(args.op, &input).await;
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}
