// エンジン共通のエラー型定義
// 呼び出し元へ伝播するのは設定エラーとキャンセルのみ。
// アイテム・ステージ単位の失敗は結果データ内の文字列として記録される

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::error::Error as StdError;
use std::fmt;
use thiserror::Error;

/// エラー分類コード
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    Configuration,
    Validation,
    Cancelled,
    Task,
}

impl ErrorCode {
    /// コードの文字列表現を取得
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Configuration => "CONFIGURATION",
            Self::Validation => "VALIDATION",
            Self::Cancelled => "CANCELLED",
            Self::Task => "TASK",
        }
    }

    const fn label(&self) -> &'static str {
        match self {
            Self::Configuration => "設定エラー",
            Self::Validation => "バリデーションエラー",
            Self::Cancelled => "キャンセル",
            Self::Task => "タスクエラー",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 処理エンジンのドメインエラー
#[derive(Error, Debug)]
#[error("{}: {} - {}", .code.label(), .operation, .message)]
pub struct ProcessingError {
    /// エラー分類
    pub code: ErrorCode,
    /// 実行していた操作
    pub operation: String,
    /// 詳細メッセージ
    pub message: String,
    /// 関連するアイテムID（あれば）
    pub item: Option<String>,
    /// 発生時刻
    pub timestamp: DateTime<Utc>,
    /// 再試行で回復し得るかどうか
    pub recoverable: bool,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
}

impl ProcessingError {
    /// 任意のコードでエラーを作成
    pub fn new(
        code: ErrorCode,
        operation: impl Into<String>,
        message: impl Into<String>,
        recoverable: bool,
    ) -> Self {
        Self {
            code,
            operation: operation.into(),
            message: message.into(),
            item: None,
            timestamp: Utc::now(),
            recoverable,
            source: None,
        }
    }

    /// 設定エラーの作成
    pub fn configuration(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Configuration, operation, message, false)
    }

    /// バリデーションエラーの作成
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        let field = field.into();
        let reason = reason.into();
        Self::new(
            ErrorCode::Validation,
            "validate",
            format!("{field}: {reason}"),
            false,
        )
    }

    /// キャンセルエラーの作成
    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::Cancelled,
            operation,
            "呼び出し元により処理がキャンセルされました",
            true,
        )
    }

    /// タスクエラーの作成
    pub fn task(source: tokio::task::JoinError) -> Self {
        Self::new(ErrorCode::Task, "join", source.to_string(), true).with_source(source)
    }

    /// 関連アイテムを設定
    pub fn with_item(mut self, item: impl Into<String>) -> Self {
        self.item = Some(item.into());
        self
    }

    /// 原因エラーを連結
    pub fn with_source(mut self, source: impl Into<Box<dyn StdError + Send + Sync + 'static>>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.code == ErrorCode::Cancelled
    }

    pub fn is_recoverable(&self) -> bool {
        self.recoverable
    }

    /// エラーの重要度を取得
    pub fn severity(&self) -> ErrorSeverity {
        match self.code {
            ErrorCode::Validation => ErrorSeverity::Critical,
            ErrorCode::Configuration => ErrorSeverity::High,
            ErrorCode::Task => ErrorSeverity::Medium,
            ErrorCode::Cancelled => ErrorSeverity::Low,
        }
    }
}

/// エラーの重要度レベル
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// 低重要度 - ログ出力程度
    Low,
    /// 中重要度 - 警告レベル
    Medium,
    /// 高重要度 - 要対応
    High,
    /// 致命的 - 処理開始不可
    Critical,
}

impl ErrorSeverity {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }
}

/// トップレベル実行（`process` / `execute`）の失敗
///
/// `Rejected`は処理開始前の設定エラー、`Interrupted`はキャンセルによる中断で、
/// 中断時点までに集計された部分結果を保持する。
#[derive(Debug)]
pub enum RunError<T> {
    Rejected(ProcessingError),
    Interrupted {
        partial: Box<T>,
        error: ProcessingError,
    },
}

impl<T> RunError<T> {
    pub fn interrupted(partial: T, error: ProcessingError) -> Self {
        Self::Interrupted {
            partial: Box::new(partial),
            error,
        }
    }

    /// 原因となったドメインエラー
    pub fn error(&self) -> &ProcessingError {
        match self {
            Self::Rejected(error) | Self::Interrupted { error, .. } => error,
        }
    }

    /// 中断時の部分結果（設定エラー時はNone）
    pub fn partial(&self) -> Option<&T> {
        match self {
            Self::Rejected(_) => None,
            Self::Interrupted { partial, .. } => Some(partial),
        }
    }

    pub fn into_partial(self) -> Option<T> {
        match self {
            Self::Rejected(_) => None,
            Self::Interrupted { partial, .. } => Some(*partial),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.error().is_cancelled()
    }
}

impl<T> From<ProcessingError> for RunError<T> {
    fn from(error: ProcessingError) -> Self {
        Self::Rejected(error)
    }
}

impl<T> fmt::Display for RunError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.error(), f)
    }
}

impl<T: fmt::Debug> StdError for RunError<T> {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(self.error())
    }
}

/// エンジン操作の結果型
pub type EngineResult<T> = std::result::Result<T, ProcessingError>;
