// コアレイヤー - 基盤となるトレイト、型、エラー定義
// 両エンジンから参照される基本的な抽象化を提供

pub mod cancellation;
pub mod error;
pub mod traits;
pub mod types;

// 公開API - 明示的にエクスポートして曖昧性を回避
pub use cancellation::CancellationToken;
pub use error::{EngineResult, ErrorCode, ErrorSeverity, ProcessingError, RunError};
pub use traits::{
    ItemProcessor, MockPipelineStage, MockProgressReporter, PipelineStage, ProgressCallback,
    ProgressReporter,
};
pub use types::{
    ConcurrentResult, ConcurrentStatus, PipelineProgress, PipelineResult, ProcessingInput,
    ProcessingItem, ProcessingResult, ProcessingState, StageResult, StageState, TaskResult,
};
