// 設定管理の具象実装

use crate::core::{EngineResult, ProcessingError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// ワーカープール設定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerPoolConfig {
    /// 同時に動作するワーカー数
    pub worker_count: usize,
    /// 結果集計のまとまり（集計値には影響しない）
    pub batch_size: usize,
}

impl WorkerPoolConfig {
    pub fn new(worker_count: usize) -> Self {
        Self {
            worker_count,
            ..Self::default()
        }
    }

    pub fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// タスク・結果キューの容量（ワーカー数の2倍）
    pub fn queue_capacity(&self) -> usize {
        self.worker_count.max(1) * 2
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.worker_count == 0 {
            return Err(ProcessingError::configuration(
                "worker_pool",
                "ワーカー数は1以上である必要があります",
            ));
        }
        if self.batch_size == 0 {
            return Err(ProcessingError::configuration(
                "worker_pool",
                "バッチサイズは1以上である必要があります",
            ));
        }
        Ok(())
    }
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            worker_count: num_cpus::get().max(1),
            batch_size: 50,
        }
    }
}

/// パイプライン設定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// ステージ失敗時に以降のステージを打ち切るか
    pub stop_on_error: bool,
    /// 初回試行に加えて行う最大リトライ回数
    pub max_stage_retries: u32,
    /// リトライ間の固定待機時間（JSONではミリ秒、小数でサブミリ秒を表す）
    #[serde(rename = "retry_delay_ms", with = "duration_millis")]
    pub retry_delay: Duration,
}

impl PipelineConfig {
    pub fn with_stop_on_error(mut self, stop_on_error: bool) -> Self {
        self.stop_on_error = stop_on_error;
        self
    }

    pub fn with_max_stage_retries(mut self, max_stage_retries: u32) -> Self {
        self.max_stage_retries = max_stage_retries;
        self
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    /// 1ステージあたりの最大試行回数
    pub fn max_attempts(&self) -> u32 {
        self.max_stage_retries.saturating_add(1)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stop_on_error: true,
            max_stage_retries: 3,
            retry_delay: Duration::from_secs(1),
        }
    }
}

/// `Duration`とミリ秒数値の相互変換
mod duration_millis {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    const NANOS_PER_MILLI: u32 = 1_000_000;

    pub(super) fn serialize<S: Serializer>(delay: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        if delay.subsec_nanos() % NANOS_PER_MILLI == 0 {
            serializer.serialize_u64(u64::try_from(delay.as_millis()).unwrap_or(u64::MAX))
        } else {
            serializer.serialize_f64(delay.as_nanos() as f64 / f64::from(NANOS_PER_MILLI))
        }
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let millis = f64::deserialize(deserializer)?;
        if !millis.is_finite() || millis < 0.0 {
            return Err(D::Error::custom(format!(
                "retry_delay_msは0以上の有限値である必要があります: {millis}"
            )));
        }
        if millis.fract() == 0.0 && millis <= u64::MAX as f64 {
            Ok(Duration::from_millis(millis as u64))
        } else {
            Ok(Duration::from_nanos((millis * f64::from(NANOS_PER_MILLI)).round() as u64))
        }
    }
}

/// エンジン全体の設定
///
/// JSONで省略されたフィールドはデフォルト値で補われる。
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub worker_pool: WorkerPoolConfig,
    pub pipeline: PipelineConfig,
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> EngineResult<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| {
            ProcessingError::configuration("config.parse", format!("設定JSONの解析に失敗しました: {e}"))
                .with_source(e)
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            ProcessingError::configuration(
                "config.read",
                format!("設定ファイルを読み込めません: {} - {e}", path.display()),
            )
            .with_source(e)
        })?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> EngineResult<()> {
        self.worker_pool.validate()
    }
}
