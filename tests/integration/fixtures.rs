// テスト用のアイテム生成と処理関数

use serde_json::{json, Value};
use stagepool::{CancellationToken, ItemProcessor, ProcessingItem};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub fn string_items(count: usize) -> Vec<ProcessingItem<String>> {
    (0..count)
        .map(|i| ProcessingItem::new(format!("item-{i}"), format!("data-{i}")))
        .collect()
}

/// 一定時間待機してアイテムをそのまま返す処理
pub fn echo_processor(delay: Duration) -> impl ItemProcessor<String, Value> {
    move |token: CancellationToken, item: Arc<ProcessingItem<String>>| async move {
        anyhow::ensure!(token.sleep(delay).await, "キャンセルされました: {}", item.id);
        Ok(json!({ "processed": item.id, "data": item.data }))
    }
}

/// 同時実行数の最大値を記録する処理
#[derive(Clone, Default)]
pub struct ConcurrencyGauge {
    pub current: Arc<AtomicUsize>,
    pub peak: Arc<AtomicUsize>,
}

impl ConcurrencyGauge {
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ItemProcessor<String, usize> for ConcurrencyGauge {
    async fn process(
        &self,
        _token: CancellationToken,
        _item: Arc<ProcessingItem<String>>,
    ) -> anyhow::Result<usize> {
        let running = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(5)).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        Ok(running)
    }
}
