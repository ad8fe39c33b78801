// 統合テスト
// 公開APIのみを使用してエンジン全体の振る舞いを検証する

mod fixtures;
mod test_config;
mod test_pipeline;
mod test_worker_pool;
