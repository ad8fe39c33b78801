// CLI層 - コマンドライン引数の定義と処理
// 合成ワークロードでエンジンを動かすデモ用インターフェース

pub mod args;
pub mod commands;

// 公開API
pub use args::*;
pub use commands::{execute_pipeline, execute_pool};
