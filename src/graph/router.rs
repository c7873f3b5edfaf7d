//! 路由与重试预算
//!
//! 双层重试策略：软阈值触发「重新理解问题」（清空意图从头再来），
//! 硬上限触发「强制走向收尾」（带着现有上下文优雅降级，不抛错）。
//! 路由函数都是状态的纯函数，不做 IO、不改状态；升级副作用由引擎施加。

use serde::{Deserialize, Serialize};

use crate::core::SessionState;
use crate::graph::node::NodeId;

/// 重试预算（应用可调；两处比较都是 >=）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// 生成重试硬上限：达到后不再重试
    pub max_retries: u32,
    /// 升级软阈值：达到后清空意图、回到意图分析
    pub escalation_threshold: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            escalation_threshold: 2,
        }
    }
}

/// 路由决策；escalate 为真时引擎清空 understood_intent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub next: NodeId,
    pub escalate: bool,
}

impl Route {
    pub fn to(next: NodeId) -> Self {
        Self {
            next,
            escalate: false,
        }
    }

    pub fn escalate_to(next: NodeId) -> Self {
        Self {
            next,
            escalate: true,
        }
    }
}

/// 校验后：有效则执行；重试耗尽则直接收尾（优雅降级）；否则重新生成
pub fn after_validation(state: &SessionState, policy: &RetryPolicy) -> Route {
    if state.is_valid {
        return Route::to(NodeId::ExecuteQuery);
    }
    if state.retry_count >= policy.max_retries {
        return Route::to(NodeId::RefineAnswer);
    }
    Route::to(NodeId::GenerateQuery)
}

/// 执行后：无错则审查；耗尽仍审查（让失败解释到达用户）；
/// 过软阈值则重新理解问题；否则重新生成
pub fn after_execution(state: &SessionState, policy: &RetryPolicy) -> Route {
    if state.execution_error().is_none() {
        return Route::to(NodeId::ReviewResult);
    }
    if state.retry_count >= policy.max_retries {
        return Route::to(NodeId::ReviewResult);
    }
    if state.retry_count >= policy.escalation_threshold {
        return Route::escalate_to(NodeId::AnalyzeIntent);
    }
    Route::to(NodeId::GenerateQuery)
}

/// 审查后：通过则收尾；否则与执行后相同的上限/阈值阶梯
pub fn after_review(state: &SessionState, policy: &RetryPolicy) -> Route {
    if state.review_passed == Some(true) {
        return Route::to(NodeId::RefineAnswer);
    }
    if state.retry_count >= policy.max_retries {
        return Route::to(NodeId::RefineAnswer);
    }
    if state.retry_count >= policy.escalation_threshold {
        return Route::escalate_to(NodeId::AnalyzeIntent);
    }
    Route::to(NodeId::GenerateQuery)
}
