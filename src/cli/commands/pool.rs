use super::{failure, load_config, run_token, synthetic_items, SyntheticWork};
use crate::cli::PoolArgs;
use crate::core::{CancellationToken, ConcurrentResult, ConcurrentStatus, RunError};
use crate::engine::WorkerPool;
use crate::services::{spawn_status_monitor, ConsoleProgressReporter};
use anyhow::Result;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// 合成アイテムをワーカープールで処理し、結果をJSONで出力
pub async fn execute_pool(args: PoolArgs, quiet: bool) -> Result<()> {
    let mut config = load_config(&args.run)?;
    if let Some(workers) = args.workers {
        config.worker_pool = config.worker_pool.with_worker_count(workers);
    }
    config.validate()?;

    let work = SyntheticWork {
        delay: Duration::from_millis(args.delay_ms),
        fail_every: args.fail_every,
    };
    let pool = Arc::new(WorkerPool::with_config(work, &config.worker_pool));
    info!(
        items = args.items,
        workers = config.worker_pool.worker_count,
        "starting worker pool run"
    );

    let token = run_token(&args.run);
    let reporter = Arc::new(if quiet {
        ConsoleProgressReporter::quiet()
    } else {
        ConsoleProgressReporter::new()
    });
    let monitor_token = CancellationToken::new();
    let monitor = spawn_status_monitor(
        reporter,
        {
            let pool = Arc::clone(&pool);
            move || pool.status()
        },
        Duration::from_millis(200),
        monitor_token.clone(),
    );

    let outcome = pool.process(&token, synthetic_items(args.items)).await;
    monitor_token.cancel();
    monitor.await?;

    let status = pool.status();
    match outcome {
        Ok(result) => {
            println!("{}", serde_json::to_string_pretty(&summary(&result, &status, false))?);
            Ok(())
        }
        Err(RunError::Interrupted { partial, error }) => {
            println!("{}", serde_json::to_string_pretty(&summary(&partial, &status, true))?);
            Err(failure(error))
        }
        Err(RunError::Rejected(error)) => Err(failure(error)),
    }
}

fn summary<D, O>(result: &ConcurrentResult<D, O>, status: &ConcurrentStatus, cancelled: bool) -> Value {
    json!({
        "cancelled": cancelled,
        "total_items": result.total_items,
        "successful_items": result.successful_items,
        "failed_items": result.failed_items,
        "success_rate": result.success_rate(),
        "worker_count": result.worker_count,
        "duration_ms": result.duration.as_millis() as u64,
        "average_item_ms": result.average_item_time.as_secs_f64() * 1000.0,
        "errors": result.errors,
        "statistics": result.statistics,
        "status": status,
    })
}
