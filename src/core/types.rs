// 処理エンジンで共有されるデータ型定義
// 集計・状態型は実行ごとに新規作成され、呼び出し完了後は不変

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// 処理対象の単一アイテム
///
/// 投入後は不変。`priority`は予約フィールドであり、どちらのエンジンも
/// スケジューリング順序には使用しない。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingItem<D> {
    /// 呼び出し元で一意な識別子
    pub id: String,
    pub data: D,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub priority: Option<i32>,
}

impl<D> ProcessingItem<D> {
    pub fn new(id: impl Into<String>, data: D) -> Self {
        Self {
            id: id.into(),
            data,
            metadata: HashMap::new(),
            priority: None,
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }
}

/// アイテム1件の処理結果（受理されたアイテムごとに必ず1件）
#[derive(Debug)]
pub struct TaskResult<D, O> {
    pub item: Arc<ProcessingItem<D>>,
    pub success: bool,
    /// 失敗時のエラーメッセージ（成功時はNone）
    pub error: Option<String>,
    pub duration: Duration,
    pub output: Option<O>,
    pub worker_id: usize,
    pub timestamp: DateTime<Utc>,
}

impl<D, O> TaskResult<D, O> {
    pub fn succeeded(
        item: Arc<ProcessingItem<D>>,
        output: O,
        duration: Duration,
        worker_id: usize,
    ) -> Self {
        Self {
            item,
            success: true,
            error: None,
            duration,
            output: Some(output),
            worker_id,
            timestamp: Utc::now(),
        }
    }

    pub fn failed(
        item: Arc<ProcessingItem<D>>,
        error: impl Into<String>,
        duration: Duration,
        worker_id: usize,
    ) -> Self {
        Self {
            item,
            success: false,
            error: Some(error.into()),
            duration,
            output: None,
            worker_id,
            timestamp: Utc::now(),
        }
    }
}

/// ワーカープール1回分の集計結果
#[derive(Debug)]
pub struct ConcurrentResult<D, O> {
    /// キューに投入され結果が得られたアイテム数
    pub total_items: usize,
    pub successful_items: usize,
    pub failed_items: usize,
    pub duration: Duration,
    pub worker_count: usize,
    /// 結果ごとの処理時間の算術平均（結果なしの場合はゼロ）
    pub average_item_time: Duration,
    /// 完了順の結果一覧
    pub results: Vec<TaskResult<D, O>>,
    /// `"<item id>: <message>"`形式のエラー一覧
    pub errors: Vec<String>,
    pub statistics: HashMap<String, u64>,
}

impl<D, O> ConcurrentResult<D, O> {
    /// 結果一覧から集計値を構築
    pub fn from_results(results: Vec<TaskResult<D, O>>, duration: Duration, worker_count: usize) -> Self {
        let successful_items = results.iter().filter(|result| result.success).count();
        let errors = results
            .iter()
            .filter_map(|result| {
                result
                    .error
                    .as_ref()
                    .map(|error| format!("{}: {error}", result.item.id))
            })
            .collect();

        Self {
            total_items: results.len(),
            successful_items,
            failed_items: results.len() - successful_items,
            duration,
            worker_count,
            average_item_time: average_duration(results.iter().map(|result| result.duration)),
            results,
            errors,
            statistics: HashMap::new(),
        }
    }

    /// 成功率（0.0〜1.0、アイテムなしの場合は0.0）
    pub fn success_rate(&self) -> f64 {
        ratio(self.successful_items, self.total_items)
    }
}

/// ワーカープールの実行状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingState {
    #[default]
    Idle,
    Running,
    Completed,
    Cancelled,
}

/// ワーカープールの実行中スナップショット
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ConcurrentStatus {
    pub state: ProcessingState,
    pub total_items: usize,
    pub processed_items: usize,
    pub successful_items: usize,
    pub failed_items: usize,
    pub active_workers: usize,
    pub queued_items: usize,
    /// processed_items / total_items
    pub progress: f64,
    pub elapsed_time: Duration,
    /// 経過時間と進捗から線形外挿した残り時間
    pub estimated_time: Duration,
}

/// パイプラインへの入力
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingInput<D> {
    pub id: String,
    #[serde(default = "Vec::new")]
    pub items: Vec<ProcessingItem<D>>,
    #[serde(default)]
    pub options: HashMap<String, String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl<D> ProcessingInput<D> {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            items: Vec::new(),
            options: HashMap::new(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_items(mut self, items: Vec<ProcessingItem<D>>) -> Self {
        self.items = items;
        self
    }

    pub fn with_item(mut self, item: ProcessingItem<D>) -> Self {
        self.items.push(item);
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn option(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }
}

/// ステージ間で共有される出力兼集計結果
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ProcessingResult {
    pub success: bool,
    pub items_processed: usize,
    /// ステージが書き込む任意の出力（キーは通常ステージ名）
    pub outputs: HashMap<String, serde_json::Value>,
    pub errors: Vec<String>,
    pub statistics: HashMap<String, u64>,
    pub duration: Duration,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ProcessingResult {
    pub fn set_output(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.outputs.insert(key.into(), value);
    }

    pub fn add_error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
    }

    /// 統計カウンタを加算
    pub fn increment(&mut self, key: impl Into<String>, by: u64) {
        *self.statistics.entry(key.into()).or_insert(0) += by;
    }

    pub fn statistic(&self, key: &str) -> u64 {
        self.statistics.get(key).copied().unwrap_or(0)
    }
}

/// パイプライン実行中のステージ状態
///
/// `Pending → (Skipped | Executing) → (Succeeded | Retrying → Executing | Failed | Cancelled)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageState {
    #[default]
    Pending,
    Skipped,
    Executing,
    Retrying,
    Succeeded,
    Failed,
    Cancelled,
}

impl StageState {
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Skipped | Self::Succeeded | Self::Failed | Self::Cancelled
        )
    }
}

/// ステージ1件の実行記録
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageResult {
    pub name: String,
    pub state: StageState,
    pub success: bool,
    pub skipped: bool,
    pub error: Option<String>,
    pub attempts: u32,
    /// 初回試行開始から最終試行終了まで（リトライ待機を含む）
    pub duration: Duration,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl StageResult {
    /// スキップされたステージの記録
    pub fn skipped(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            state: StageState::Skipped,
            success: true,
            skipped: true,
            error: None,
            attempts: 0,
            duration: Duration::ZERO,
            started_at: now,
            completed_at: now,
        }
    }
}

/// パイプライン実行中の進捗スナップショット
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineProgress {
    pub total_stages: usize,
    pub completed_stages: usize,
    pub current_stage: Option<String>,
    /// completed_stages / total_stages
    pub overall_progress: f64,
    pub elapsed_time: Duration,
    pub remaining_time: Duration,
    pub last_update: DateTime<Utc>,
}

impl Default for PipelineProgress {
    fn default() -> Self {
        Self {
            total_stages: 0,
            completed_stages: 0,
            current_stage: None,
            overall_progress: 0.0,
            elapsed_time: Duration::ZERO,
            remaining_time: Duration::ZERO,
            last_update: Utc::now(),
        }
    }
}

/// パイプライン1回分の集計結果
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct PipelineResult {
    pub result: ProcessingResult,
    /// 記録された全ステージ（名前をキーとする）
    pub stage_results: HashMap<String, StageResult>,
    /// スキップされたステージ（実行順）
    pub skipped_stages: Vec<String>,
    /// 最初に失敗したステージ名
    pub failed_stage: Option<String>,
    pub pipeline_duration: Duration,
}

impl PipelineResult {
    pub fn stage(&self, name: &str) -> Option<&StageResult> {
        self.stage_results.get(name)
    }
}

/// 処理時間の算術平均（空の場合はゼロ）
pub fn average_duration(durations: impl Iterator<Item = Duration>) -> Duration {
    let (total, count) = durations.fold((Duration::ZERO, 0u64), |(total, count), duration| {
        (total + duration, count + 1)
    });
    if count == 0 {
        Duration::ZERO
    } else {
        Duration::from_nanos((total.as_nanos() / u128::from(count)) as u64)
    }
}

/// 経過時間と進捗率から残り時間を線形外挿
pub fn estimate_remaining(elapsed: Duration, progress: f64) -> Duration {
    if progress <= 0.0 || !progress.is_finite() {
        return Duration::ZERO;
    }
    if progress >= 1.0 {
        return Duration::ZERO;
    }
    let estimated_total = elapsed.as_secs_f64() / progress;
    Duration::from_secs_f64((estimated_total - elapsed.as_secs_f64()).max(0.0))
}

pub(crate) fn ratio(done: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        done as f64 / total as f64
    }
}
