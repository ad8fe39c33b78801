// 組み込みステージ実装
// クロージャによるステージと、ワーカープールへ処理を委譲するステージ

use super::worker_pool::WorkerPool;
use crate::core::{
    CancellationToken, ConcurrentResult, ItemProcessor, PipelineStage, ProcessingInput,
    ProcessingResult, RunError,
};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

type StageFuture = Pin<Box<dyn Future<Output = anyhow::Result<Value>> + Send>>;
type SkipPredicate<D> = Box<dyn Fn(&ProcessingInput<D>) -> bool + Send + Sync>;

/// クロージャで処理を定義するステージ
///
/// クロージャが`Value::Null`以外を返した場合、`outputs[<ステージ名>]`に書き込む。
pub struct FnStage<D> {
    name: String,
    description: String,
    estimated_duration: Duration,
    run: Box<dyn Fn(CancellationToken) -> StageFuture + Send + Sync>,
    skip_when: Option<SkipPredicate<D>>,
}

impl<D> FnStage<D> {
    pub fn new<F, Fut>(name: impl Into<String>, run: F) -> Self
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: String::new(),
            estimated_duration: Duration::ZERO,
            run: Box::new(move |token| Box::pin(run(token))),
            skip_when: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_estimated_duration(mut self, estimated_duration: Duration) -> Self {
        self.estimated_duration = estimated_duration;
        self
    }

    /// 入力が条件を満たす場合にステージを省略する
    pub fn skip_when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&ProcessingInput<D>) -> bool + Send + Sync + 'static,
    {
        self.skip_when = Some(Box::new(predicate));
        self
    }
}

#[async_trait]
impl<D> PipelineStage<D> for FnStage<D>
where
    D: Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn estimated_duration(&self) -> Duration {
        self.estimated_duration
    }

    fn can_skip(&self, input: &ProcessingInput<D>) -> bool {
        self.skip_when.as_ref().is_some_and(|predicate| predicate(input))
    }

    async fn execute(
        &self,
        token: &CancellationToken,
        _input: &ProcessingInput<D>,
        output: &mut ProcessingResult,
    ) -> anyhow::Result<()> {
        let value = (self.run)(token.clone()).await?;
        if !value.is_null() {
            output.set_output(self.name.clone(), value);
        }
        Ok(())
    }
}

/// 入力アイテムをワーカープールで並列処理するステージ
///
/// 実行ごとにプールの集計値を統計へ加算し、`outputs[<ステージ名>]`へ要約を書き込む。
/// 1件でも失敗した場合はステージ失敗となる（`tolerate_failures`で無効化可能）。
pub struct WorkerPoolStage<P, D, O> {
    name: String,
    description: String,
    estimated_duration: Duration,
    pool: Arc<WorkerPool<P, D, O>>,
    tolerate_failures: bool,
}

impl<P, D, O> WorkerPoolStage<P, D, O>
where
    P: ItemProcessor<D, O> + 'static,
    D: Clone + Send + Sync + 'static,
    O: Send + 'static,
{
    pub fn new(name: impl Into<String>, pool: Arc<WorkerPool<P, D, O>>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            estimated_duration: Duration::ZERO,
            pool,
            tolerate_failures: false,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_estimated_duration(mut self, estimated_duration: Duration) -> Self {
        self.estimated_duration = estimated_duration;
        self
    }

    pub fn tolerate_failures(mut self, tolerate_failures: bool) -> Self {
        self.tolerate_failures = tolerate_failures;
        self
    }

    pub fn pool(&self) -> &Arc<WorkerPool<P, D, O>> {
        &self.pool
    }

    fn record(&self, summary: &ConcurrentResult<D, O>, output: &mut ProcessingResult) {
        output.items_processed += summary.successful_items;
        output.increment("total_items", summary.total_items as u64);
        output.increment("successful_items", summary.successful_items as u64);
        output.increment("failed_items", summary.failed_items as u64);
        output.set_output(
            self.name.clone(),
            json!({
                "total_items": summary.total_items,
                "successful_items": summary.successful_items,
                "failed_items": summary.failed_items,
                "worker_count": summary.worker_count,
                "duration_ms": summary.duration.as_millis() as u64,
                "average_item_ms": summary.average_item_time.as_secs_f64() * 1000.0,
                "errors": summary.errors,
            }),
        );
    }
}

#[async_trait]
impl<P, D, O> PipelineStage<D> for WorkerPoolStage<P, D, O>
where
    P: ItemProcessor<D, O> + 'static,
    D: Clone + Send + Sync + 'static,
    O: Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn estimated_duration(&self) -> Duration {
        self.estimated_duration
    }

    fn can_skip(&self, input: &ProcessingInput<D>) -> bool {
        input.items.is_empty()
    }

    async fn execute(
        &self,
        token: &CancellationToken,
        input: &ProcessingInput<D>,
        output: &mut ProcessingResult,
    ) -> anyhow::Result<()> {
        let summary = match self.pool.process(token, input.items.clone()).await {
            Ok(summary) => summary,
            Err(RunError::Interrupted { partial, error }) => {
                self.record(&partial, output);
                return Err(error.into());
            }
            Err(RunError::Rejected(error)) => return Err(error.into()),
        };

        self.record(&summary, output);
        anyhow::ensure!(
            self.tolerate_failures || summary.failed_items == 0,
            "{}件中{}件のアイテム処理に失敗しました",
            summary.total_items,
            summary.failed_items
        );
        Ok(())
    }
}
