// 進捗監視機能
// パイプライン進捗・ワーカープール状態の報告

pub mod implementations;

// 公開API
pub use implementations::{
    progress_callback, spawn_status_monitor, ConsoleProgressReporter, TracingProgressReporter,
};
