// エンジンの拡張ポイントとなるトレイト定義

use super::cancellation::CancellationToken;
use super::types::{
    ConcurrentStatus, PipelineProgress, ProcessingInput, ProcessingItem, ProcessingResult,
};
use async_trait::async_trait;
use mockall::automock;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// ワーカープールが各アイテムに適用する処理
///
/// `Fn(CancellationToken, Arc<ProcessingItem<D>>) -> impl Future<Output = anyhow::Result<O>>`
/// を満たすクロージャはそのまま処理として使用できる。
#[async_trait]
pub trait ItemProcessor<D, O>: Send + Sync
where
    D: Send + Sync + 'static,
    O: Send + 'static,
{
    async fn process(&self, token: CancellationToken, item: Arc<ProcessingItem<D>>) -> anyhow::Result<O>;
}

#[async_trait]
impl<D, O, F, Fut> ItemProcessor<D, O> for F
where
    D: Send + Sync + 'static,
    O: Send + 'static,
    F: Fn(CancellationToken, Arc<ProcessingItem<D>>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<O>> + Send + 'static,
{
    async fn process(&self, token: CancellationToken, item: Arc<ProcessingItem<D>>) -> anyhow::Result<O> {
        (self)(token, item).await
    }
}

/// パイプラインを構成する名前付きステージ
///
/// 設定以外の状態を持たない。パイプラインは追加順にステージを所有し、並べ替えない。
#[automock]
#[async_trait]
pub trait PipelineStage<D: Send + Sync + 'static>: Send + Sync {
    /// パイプライン内で一意なステージ名
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// 残り時間見積もりに使用する想定所要時間
    fn estimated_duration(&self) -> Duration;

    /// 入力に対してこのステージを省略できるか
    fn can_skip(&self, input: &ProcessingInput<D>) -> bool;

    /// ステージ本体
    ///
    /// 失敗はパイプラインが`StageResult`へ記録し、設定に従ってリトライする。
    async fn execute(
        &self,
        token: &CancellationToken,
        input: &ProcessingInput<D>,
        output: &mut ProcessingResult,
    ) -> anyhow::Result<()>;
}

/// 進捗更新ごとに非同期で呼び出されるコールバック（ベストエフォート）
pub type ProgressCallback = Arc<dyn Fn(PipelineProgress) + Send + Sync>;

/// 進捗報告の抽象化トレイト
#[automock]
pub trait ProgressReporter: Send + Sync {
    /// パイプライン進捗の報告
    fn report_pipeline(&self, progress: &PipelineProgress);

    /// ワーカープール状態の報告
    fn report_pool(&self, status: &ConcurrentStatus);
}
