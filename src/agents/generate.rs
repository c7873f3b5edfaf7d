//! SQL 生成节点
//!
//! 以表结构上下文 + 意图 + 业务/方言规则 + 上一轮错误为素材生成只读 SELECT；
//! retry_count 只在这里递增，每次生成尝试恰好加一。

use async_trait::async_trait;

use crate::agents::strip_code_fences;
use crate::core::{AgentError, SessionState};
use crate::graph::{Node, NodeContext, NodeFlow, NodeId};
use crate::llm::Message;

pub struct GenerateQueryNode;

#[async_trait]
impl Node for GenerateQueryNode {
    fn id(&self) -> NodeId {
        NodeId::GenerateQuery
    }

    async fn run(
        &self,
        ctx: &mut NodeContext<'_>,
        state: &mut SessionState,
    ) -> Result<NodeFlow, AgentError> {
        let schema = state.context_payload.clone().unwrap_or_default();
        let intent = state
            .understood_intent
            .as_ref()
            .and_then(|i| serde_json::to_string(i).ok())
            .unwrap_or_default();

        let skill = ctx.services.skill.as_ref();
        let business_rules = skill.map(|s| s.business_rules.as_str()).unwrap_or("");
        let mut dialect_rules = ctx.services.datasource.dialect_rules();
        if let Some(extra) = skill.map(|s| s.dialect_rules.as_str()) {
            if !extra.is_empty() {
                dialect_rules.push('\n');
                dialect_rules.push_str(extra);
            }
        }

        let error_context = match &state.last_error {
            Some(err) => format!("上一次尝试失败，错误信息：{err}。请根据错误修正 SQL。"),
            None => String::new(),
        };

        let prompt = format!(
            "你是 SQL 生成助手。根据数据库上下文与用户意图，仅输出一条只读 SELECT 语句，不要任何解释。\n\n\
             ## 数据库上下文\n{schema}\n\n\
             ## 业务规则\n{business_rules}\n\n\
             ## 方言规则\n{dialect_rules}\n\n\
             ## 用户意图\n{intent}\n\n\
             ## 用户问题\n{query}\n\n{error_context}",
            query = state.query_text,
        );

        match ctx.services.llm.complete(&[Message::user(prompt)]).await {
            Ok(content) => {
                let sql = strip_code_fences(&content);
                state.candidate_query = Some(sql);
            }
            Err(e) => {
                tracing::warn!(session = %state.session_id, "SQL generation failed: {e}");
                state.last_error = Some(format!("SQL generation failed: {e}"));
                state.candidate_query = None;
            }
        }

        state.retry_count += 1;
        Ok(NodeFlow::Continue)
    }
}
