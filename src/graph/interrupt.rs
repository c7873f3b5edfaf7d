//! 人在回路中断代理
//!
//! 包装唯一的敏感操作（SQL 执行）：执行前发出动作请求并挂起，
//! 等外部 accept / edit / respond 决策落定后再继续或短路。

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::core::AgentError;
use crate::datasource::QueryExecutor;

/// 外部决策的封闭集合
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Accept,
    Edit,
    Respond,
}

impl Decision {
    /// 解析线格式的动作名；未知值交由调用方按协议违规处理
    pub fn parse(action: &str) -> Option<Decision> {
        match action {
            "accept" => Some(Decision::Accept),
            "edit" => Some(Decision::Edit),
            "respond" => Some(Decision::Respond),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Accept => "accept",
            Decision::Edit => "edit",
            Decision::Respond => "respond",
        }
    }
}

/// 发往外部的动作请求；挂起期间同一份数据作为待决动作留在状态里
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    pub action_name: String,
    pub proposed_params: serde_json::Value,
    pub allowed_decisions: Vec<Decision>,
    pub description: String,
}

/// 外部回传的恢复命令（线格式）
///
/// action 保持字符串：未知值必须能够到达代理并被判为 UnsupportedDecision，
/// 而不是在反序列化阶段被吞掉。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumeCommand {
    pub action: String,
    #[serde(default)]
    pub params: Option<serde_json::Value>,
    #[serde(default)]
    pub feedback: Option<String>,
}

impl ResumeCommand {
    pub fn accept() -> Self {
        Self {
            action: "accept".to_string(),
            params: None,
            feedback: None,
        }
    }

    pub fn edit(params: serde_json::Value) -> Self {
        Self {
            action: "edit".to_string(),
            params: Some(params),
            feedback: None,
        }
    }

    pub fn respond(feedback: impl Into<String>) -> Self {
        Self {
            action: "respond".to_string(),
            params: None,
            feedback: Some(feedback.into()),
        }
    }
}

/// 决策落定后的走向
#[derive(Debug, Clone, PartialEq)]
pub enum Settlement {
    /// 以该参数调用底层操作；edited 标记参数是否被外部替换过
    Execute {
        params: serde_json::Value,
        edited: bool,
    },
    /// 不调用底层操作，以反馈文本作为事实结果
    Feedback(String),
}

/// 中断代理：持有执行网关，负责构建动作请求与裁决恢复命令
pub struct InterruptBroker {
    executor: Arc<dyn QueryExecutor>,
}

impl InterruptBroker {
    pub fn new(executor: Arc<dyn QueryExecutor>) -> Self {
        Self { executor }
    }

    pub fn executor(&self) -> &Arc<dyn QueryExecutor> {
        &self.executor
    }

    /// 为候选 SQL 构建动作请求（挂起前调用）
    pub fn request_for(&self, query: &str) -> ActionRequest {
        ActionRequest {
            action_name: "execute_sql".to_string(),
            proposed_params: json!({ "query": query }),
            allowed_decisions: vec![Decision::Accept, Decision::Edit, Decision::Respond],
            description: "SQL execution requires your confirmation. \
                          Please review the SQL before proceeding."
                .to_string(),
        }
    }

    /// 裁决恢复命令
    ///
    /// - 无命令：MissingDecision，绝不默认 accept
    /// - accept：按挂起时捕获的拟执行参数原样执行
    /// - edit：外部参数整体替换拟执行参数，绝不静默合并；未提供参数时退回原参数
    /// - respond：不触碰执行网关，反馈文本即结果
    /// - 其余动作或不在 allowed_decisions 内：UnsupportedDecision
    pub fn settle(
        &self,
        pending: &ActionRequest,
        command: Option<&ResumeCommand>,
    ) -> Result<Settlement, AgentError> {
        let command = command.ok_or(AgentError::MissingDecision)?;
        let decision = Decision::parse(&command.action)
            .ok_or_else(|| AgentError::UnsupportedDecision(command.action.clone()))?;
        if !pending.allowed_decisions.contains(&decision) {
            return Err(AgentError::UnsupportedDecision(command.action.clone()));
        }

        match decision {
            Decision::Accept => Ok(Settlement::Execute {
                params: pending.proposed_params.clone(),
                edited: false,
            }),
            Decision::Edit => {
                let edited = command.params.is_some();
                let params = command
                    .params
                    .clone()
                    .unwrap_or_else(|| pending.proposed_params.clone());
                Ok(Settlement::Execute { params, edited })
            }
            Decision::Respond => Ok(Settlement::Feedback(
                command
                    .feedback
                    .clone()
                    .unwrap_or_else(|| "User provided feedback".to_string()),
            )),
        }
    }
}
