// 並列データ処理エンジン
// core: 共有型・トレイト・エラー / engine: WorkerPoolとPipeline / services: 設定と進捗監視 / cli: デモ用コマンド

pub mod cli;
pub mod core;
pub mod engine;
pub mod services;

// よく使う型を再エクスポート
pub use crate::core::{
    CancellationToken, ConcurrentResult, ConcurrentStatus, EngineResult, ErrorCode,
    ItemProcessor, PipelineProgress, PipelineResult, PipelineStage, ProcessingError,
    ProcessingInput, ProcessingItem, ProcessingResult, ProcessingState, RunError, StageResult,
    StageState, TaskResult,
};
pub use crate::engine::{FnStage, Pipeline, WorkerPool, WorkerPoolStage};
pub use crate::services::{EngineConfig, PipelineConfig, WorkerPoolConfig};
