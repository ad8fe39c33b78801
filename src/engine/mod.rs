// エンジン層 - 並列処理とオーケストレーション
// WorkerPool（Producer → Consumers → Collector）とPipeline（ステージ逐次実行）を提供

pub mod api;
mod collector;
mod consumer;
mod pipeline;
mod producer;
mod progress;
pub mod stages;
mod status;
mod worker_pool;

// 公開API - 主要エンジンクラス
pub use api::{build_pipeline, process_items, run_pipeline};
pub use pipeline::Pipeline;
pub use stages::{FnStage, WorkerPoolStage};
pub use worker_pool::WorkerPool;
