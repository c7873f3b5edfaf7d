//! 协议错误类型
//!
//! 只有协议违规（缺失/未知决策、未知会话、步数超限）会中止会话；
//! 业务层失败（SQL 无效、执行出错、审查不通过）写入 SessionState，由路由消化。

use thiserror::Error;

/// 会话级致命错误，与写入状态字段的业务失败严格区分
#[derive(Error, Debug)]
pub enum AgentError {
    /// resume 未携带决策；代理绝不默认 accept
    #[error("Missing resume decision")]
    MissingDecision,

    #[error("Unsupported decision: {0}")]
    UnsupportedDecision(String),

    #[error("Unknown session: {0}")]
    UnknownSession(String),

    /// 同一会话的并发 resume 被拒绝，由调用方负责串行化
    #[error("Session busy: {0}")]
    SessionBusy(String),

    #[error("Step limit exceeded after {steps} steps")]
    StepLimitExceeded { steps: u32 },

    /// 对未挂起的会话调用 resume
    #[error("Session is not suspended: {0}")]
    NotSuspended(String),

    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("Graph configuration error: {0}")]
    Graph(String),
}

/// 检查点存取错误；NotFound 单列，引擎据此区分「未知会话」
#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("Checkpoint not found: {0}")]
    NotFound(String),

    #[error("Checkpoint IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Checkpoint serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}
