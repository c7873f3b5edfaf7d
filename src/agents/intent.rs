//! 意图分析节点
//!
//! 判断用户问题是否为数据查询类；LLM 输出不可解析或调用失败时
//! 退回关键词启发式，不让会话因此中断。

use async_trait::async_trait;

use crate::agents::strip_code_fences;
use crate::core::{AgentError, IntentAnalysis, SessionState};
use crate::graph::{Node, NodeContext, NodeFlow, NodeId};
use crate::llm::Message;

const DATA_KEYWORDS: [&str; 9] = [
    "查询", "统计", "报表", "数据", "sql", "select", "趋势", "对比", "分析",
];

pub struct AnalyzeIntentNode;

impl AnalyzeIntentNode {
    fn heuristic(query: &str) -> IntentAnalysis {
        let lowered = query.to_lowercase();
        let is_data = DATA_KEYWORDS.iter().any(|key| lowered.contains(key));
        IntentAnalysis {
            is_data_query: is_data,
            reason: "heuristic".to_string(),
        }
    }
}

#[async_trait]
impl Node for AnalyzeIntentNode {
    fn id(&self) -> NodeId {
        NodeId::AnalyzeIntent
    }

    async fn run(
        &self,
        ctx: &mut NodeContext<'_>,
        state: &mut SessionState,
    ) -> Result<NodeFlow, AgentError> {
        let prompt = format!(
            "你是一个问题分类器。请判断用户问题是否与数据查询/数据分析相关。\n\n\
             ## 用户问题\n{}\n\n\
             ## 输出要求\n仅返回 JSON：{{\"is_data_query\": true|false, \"reason\": \"简短原因\"}}",
            state.query_text
        );

        match ctx.services.llm.complete(&[Message::user(prompt)]).await {
            Ok(content) => {
                let cleaned = strip_code_fences(&content);
                match serde_json::from_str::<IntentAnalysis>(&cleaned) {
                    Ok(parsed) => state.understood_intent = Some(parsed),
                    Err(_) => {
                        // 解析失败退回启发式
                        state.understood_intent = Some(Self::heuristic(&state.query_text));
                    }
                }
            }
            Err(e) => {
                tracing::warn!(session = %state.session_id, "intent analysis LLM failed: {e}");
                state.last_error = Some(format!("Intent analysis failed: {e}"));
                state.understood_intent = Some(Self::heuristic(&state.query_text));
            }
        }

        Ok(NodeFlow::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heuristic_matches_data_keywords() {
        assert!(AnalyzeIntentNode::heuristic("请统计各部门成本").is_data_query);
        assert!(AnalyzeIntentNode::heuristic("帮我写个 SELECT").is_data_query);
        assert!(!AnalyzeIntentNode::heuristic("今天天气怎么样").is_data_query);
    }
}
