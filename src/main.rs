use anyhow::Result;
use clap::Parser;
use stagepool::cli::{execute_pipeline, execute_pool, Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match cli.command {
        Commands::Pool(args) => execute_pool(args, cli.quiet).await,
        Commands::Pipeline(args) => execute_pipeline(args, cli.quiet).await,
    }
}

/// RUST_LOGが未設定の場合は-vの回数でログレベルを決める
fn setup_logging(verbose: u8) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        match verbose {
            0 => tracing_subscriber::EnvFilter::new("warn"),
            1 => tracing_subscriber::EnvFilter::new("stagepool=info,warn"),
            2 => tracing_subscriber::EnvFilter::new("stagepool=debug,info"),
            _ => tracing_subscriber::EnvFilter::new("trace"),
        }
    });

    // 標準出力は結果のJSON専用
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
