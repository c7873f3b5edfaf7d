//! SQL 校验节点
//!
//! 三道关：非空、危险关键词黑名单（只允许只读 SELECT）、LLM 语法校验。
//! 任何一道不过都只写状态，由校验后路由决定重试还是降级。

use async_trait::async_trait;

use crate::core::{AgentError, SessionState};
use crate::graph::{Node, NodeContext, NodeFlow, NodeId};
use crate::llm::Message;

/// 危险操作关键词黑名单
const FORBIDDEN_KEYWORDS: [&str; 10] = [
    "delete", "drop", "insert", "update", "replace", "alter", "create", "truncate", "exec(",
    "grant",
];

pub struct ValidateQueryNode;

#[async_trait]
impl Node for ValidateQueryNode {
    fn id(&self) -> NodeId {
        NodeId::ValidateQuery
    }

    async fn run(
        &self,
        ctx: &mut NodeContext<'_>,
        state: &mut SessionState,
    ) -> Result<NodeFlow, AgentError> {
        let sql = state.candidate_query.clone().unwrap_or_default();

        if sql.trim().is_empty() {
            state.is_valid = false;
            state.last_error = Some("Validation failed: SQL query cannot be empty".to_string());
            return Ok(NodeFlow::Continue);
        }

        let lowered = sql.to_lowercase();
        for keyword in FORBIDDEN_KEYWORDS {
            if lowered.contains(keyword) {
                state.is_valid = false;
                state.last_error = Some(format!(
                    "Validation failed: contains forbidden keyword '{keyword}'. \
                     Please use read-only SELECT syntax only."
                ));
                return Ok(NodeFlow::Continue);
            }
        }

        let schema = state.context_payload.clone().unwrap_or_default();
        let dialect_rules = ctx.services.datasource.dialect_rules();
        let prompt = format!(
            "你是 SQL 校验助手。请校验下面的 SQL 是否符合表结构与方言规则。\n\n\
             ## 表结构\n{schema}\n\n\
             ## 方言规则\n{dialect_rules}\n\n\
             ## 待校验 SQL\n{sql}\n\n\
             要求：语法错误/字段错误/非 SELECT 语法 => INVALID；仅返回 VALID 或 INVALID + 原因。"
        );

        match ctx.services.llm.complete(&[Message::user(prompt)]).await {
            Ok(verdict) => {
                if verdict.to_uppercase().contains("INVALID") {
                    state.is_valid = false;
                    state.last_error =
                        Some(format!("Validation failed: {}", verdict.trim()));
                } else {
                    state.is_valid = true;
                    state.last_error = None;
                }
            }
            Err(e) => {
                tracing::warn!(session = %state.session_id, "SQL validation LLM failed: {e}");
                state.is_valid = false;
                state.last_error = Some(format!("Validation failed: {e}"));
            }
        }

        Ok(NodeFlow::Continue)
    }
}
