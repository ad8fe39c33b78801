// 設定管理機能
// ワーカープール・パイプラインの設定とJSONからの読み込み

pub mod implementations;

// 公開API
pub use implementations::{EngineConfig, PipelineConfig, WorkerPoolConfig};
