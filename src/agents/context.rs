//! 上下文加载节点
//!
//! 先让 LLM 从问题里识别要查的表，识别不出时退回技能的默认表名，
//! 再向数据源网关取表结构上下文。

use async_trait::async_trait;

use crate::agents::strip_code_fences;
use crate::core::{AgentError, SessionState};
use crate::graph::{Node, NodeContext, NodeFlow, NodeId};
use crate::llm::Message;

#[derive(Debug, serde::Deserialize)]
struct TableHint {
    table_name: String,
}

pub struct LoadContextNode;

#[async_trait]
impl Node for LoadContextNode {
    fn id(&self) -> NodeId {
        NodeId::LoadContext
    }

    async fn run(
        &self,
        ctx: &mut NodeContext<'_>,
        state: &mut SessionState,
    ) -> Result<NodeFlow, AgentError> {
        let skill_hint = ctx
            .services
            .skill
            .as_ref()
            .map(|s| s.business_rules.clone())
            .unwrap_or_default();

        let prompt = format!(
            "你是一个数据上下文加载助手。请根据用户问题与技能上下文识别需要加载的表名。\n\n\
             要求：仅返回 JSON 数组，每个元素包含 table_name 与 fields(字段名列表)。\n\n\
             用户问题:\n{}\n\n技能上下文:\n{}",
            state.query_text, skill_hint
        );

        let mut table_names: Vec<String> = Vec::new();
        match ctx.services.llm.complete(&[Message::user(prompt)]).await {
            Ok(content) => {
                let cleaned = strip_code_fences(&content);
                match serde_json::from_str::<Vec<TableHint>>(&cleaned) {
                    Ok(hints) => {
                        table_names = hints.into_iter().map(|h| h.table_name).collect();
                    }
                    Err(e) => {
                        state.last_error = Some(format!("Failed to parse table hints: {e}"));
                    }
                }
            }
            Err(e) => {
                state.last_error = Some(format!("Context load failed: {e}"));
            }
        }

        // 识别不出时用技能的默认表名兜底
        if table_names.is_empty() {
            if let Some(skill) = &ctx.services.skill {
                table_names = skill.meta.default_table_names.clone();
            }
        }
        state.table_names = table_names;

        if !ctx.services.datasource.is_available() {
            state.last_error = Some("Data source unavailable".to_string());
            state.context_payload = None;
            return Ok(NodeFlow::Continue);
        }

        match ctx.services.datasource.get_context(&state.table_names).await {
            Ok(schema_text) => {
                state.context_payload = Some(schema_text);
            }
            Err(e) => {
                tracing::warn!(session = %state.session_id, "context load failed: {e}");
                state.last_error = Some(format!("Context load failed: {e}"));
                state.context_payload = None;
            }
        }

        Ok(NodeFlow::Continue)
    }
}
