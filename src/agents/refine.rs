//! 答案精炼节点（收尾）
//!
//! 把查询结果转成面向用户的回答；结果带错误时只解释失败原因，
//! 禁止编造数据。LLM 不可用时给出确定性的失败说明——收尾节点
//! 必须设置 final_answer，否则会话无法终止。

use async_trait::async_trait;

use crate::core::{AgentError, SessionState};
use crate::graph::{Node, NodeContext, NodeFlow, NodeId};
use crate::llm::Message;

pub struct RefineAnswerNode;

#[async_trait]
impl Node for RefineAnswerNode {
    fn id(&self) -> NodeId {
        NodeId::RefineAnswer
    }

    async fn run(
        &self,
        ctx: &mut NodeContext<'_>,
        state: &mut SessionState,
    ) -> Result<NodeFlow, AgentError> {
        let sql = state
            .candidate_query
            .clone()
            .unwrap_or_else(|| "未生成 SQL".to_string());
        let result_text = state
            .execution_result()
            .map(str::to_string)
            .or_else(|| state.decision_feedback.clone())
            .or_else(|| state.execution_error().map(str::to_string))
            .or_else(|| state.last_error.clone())
            .unwrap_or_else(|| "无结果".to_string());

        let mut prompt = format!(
            "你是回答助手。请根据 SQL 执行结果回答用户问题，总结关键信息。\n\n\
             ## 用户问题\n{}\n\n\
             ## SQL\n{sql}\n\n\
             ## 执行结果\n{result_text}",
            state.query_text
        );

        let has_error = state.execution_error().is_some()
            || result_text.to_lowercase().contains("error")
            || result_text.to_lowercase().contains("exception");
        if has_error {
            prompt.push_str(
                "\n\nSYSTEM WARNING: 检测到执行结果包含错误信息。\
                 **绝对禁止**输出任何数据表格或数值，请仅解释错误原因。",
            );
        }

        match ctx.services.llm.complete(&[Message::user(prompt)]).await {
            Ok(answer) => {
                state.final_answer = Some(answer.trim().to_string());
            }
            Err(e) => {
                tracing::warn!(session = %state.session_id, "answer refinement LLM failed: {e}");
                state.final_answer = Some(format!(
                    "查询未能完成：{result_text}（回答生成失败：{e}）"
                ));
            }
        }

        Ok(NodeFlow::Continue)
    }
}
