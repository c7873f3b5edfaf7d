//! 结果审查节点
//!
//! 判断执行结果（或 respond 决策给出的反馈文本）是否足以回答用户问题。
//! LLM 输出按宽松顺序解析：JSON -> 正则提取 JSON -> PASS/RETRY 前缀；
//! 全都解析不了按不通过处理并留下重试上下文。

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;

use crate::agents::strip_code_fences;
use crate::core::{AgentError, SessionState};
use crate::graph::{Node, NodeContext, NodeFlow, NodeId};
use crate::llm::Message;

static JSON_RE: OnceLock<Regex> = OnceLock::new();

#[derive(Debug, serde::Deserialize)]
struct ReviewVerdict {
    passed: bool,
    #[serde(default)]
    refined_answer: String,
}

pub struct ReviewResultNode;

impl ReviewResultNode {
    fn apply_verdict(state: &mut SessionState, passed: bool, message: String) {
        state.review_passed = Some(passed);
        if passed {
            state.review_feedback = if message.is_empty() {
                None
            } else {
                Some(message)
            };
            state.last_error = None;
        } else {
            state.last_error = Some(message.clone());
            state.review_feedback = Some(message);
        }
    }

    fn parse_verdict(state: &mut SessionState, decision: &str) {
        let cleaned = strip_code_fences(decision);

        if let Ok(verdict) = serde_json::from_str::<ReviewVerdict>(&cleaned) {
            Self::apply_verdict(state, verdict.passed, verdict.refined_answer);
            return;
        }

        // JSON 混在其它文字里时正则提取再试一次
        let json_re = JSON_RE.get_or_init(|| Regex::new(r"(?s)\{.*\}").unwrap());
        if let Some(m) = json_re.find(&cleaned) {
            if let Ok(verdict) = serde_json::from_str::<ReviewVerdict>(m.as_str()) {
                Self::apply_verdict(state, verdict.passed, verdict.refined_answer);
                return;
            }
        }

        let upper = decision.trim().to_uppercase();
        if upper.starts_with("PASS") {
            Self::apply_verdict(state, true, String::new());
            return;
        }
        if upper.starts_with("RETRY") {
            Self::apply_verdict(state, false, decision.trim().to_string());
            return;
        }

        Self::apply_verdict(
            state,
            false,
            format!("RETRY: 无法解析审查结果: {}", decision.trim()),
        );
    }
}

#[async_trait]
impl Node for ReviewResultNode {
    fn id(&self) -> NodeId {
        NodeId::ReviewResult
    }

    async fn run(
        &self,
        ctx: &mut NodeContext<'_>,
        state: &mut SessionState,
    ) -> Result<NodeFlow, AgentError> {
        // 事实结果：执行结果，或 respond 反馈，或（耗尽后强制审查时的）执行错误
        let result_text = state
            .execution_result()
            .map(str::to_string)
            .or_else(|| state.decision_feedback.clone())
            .or_else(|| {
                state
                    .execution_error()
                    .map(|e| format!("Execution error: {e}"))
            })
            .unwrap_or_default();

        let sql = state.candidate_query.clone().unwrap_or_default();
        let prompt = format!(
            "你是结果审查助手。请判断下面的执行结果是否足以回答用户问题。\n\n\
             ## 用户问题\n{}\n\n\
             ## SQL\n{sql}\n\n\
             ## 执行结果\n{result_text}\n\n\
             仅返回 JSON：{{\"passed\": true|false, \"refined_answer\": \"简短说明\"}}",
            state.query_text
        );

        match ctx.services.llm.complete(&[Message::user(prompt)]).await {
            Ok(decision) => Self::parse_verdict(state, &decision),
            Err(e) => {
                tracing::warn!(session = %state.session_id, "result review LLM failed: {e}");
                Self::apply_verdict(state, false, format!("RETRY: 审查节点异常: {e}"));
            }
        }

        Ok(NodeFlow::Continue)
    }
}
