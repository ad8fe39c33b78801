// サービス層 - 機能別の補助機能
// 設定の読み込みと進捗監視を提供し、エンジン層から利用される

pub mod config;
pub mod monitoring;

// 公開API - 各サービスの主要機能を明示的にエクスポート
pub use config::{EngineConfig, PipelineConfig, WorkerPoolConfig};
pub use monitoring::{
    progress_callback, spawn_status_monitor, ConsoleProgressReporter, TracingProgressReporter,
};
