//! SQL 执行节点（受中断代理守护）
//!
//! 首次进入：构建动作请求、登记待决动作并挂起——这是整条管线唯一的挂起点。
//! resume 再次进入：取走待决动作与外部决策，交中断代理裁决后
//! 执行（accept/edit）或短路（respond）。

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;

use crate::core::{AgentError, SessionState};
use crate::datasource::Dialect;
use crate::graph::{Node, NodeContext, NodeFlow, NodeId, Settlement};

static LIMIT_RE: OnceLock<Regex> = OnceLock::new();
static SELECT_RE: OnceLock<Regex> = OnceLock::new();

/// 去掉围栏、反引号与裸 "sql" 前缀
fn clean_sql(query: &str) -> String {
    let mut cleaned = query.trim().to_string();
    if cleaned.to_lowercase().starts_with("sql") {
        cleaned = cleaned[3..].trim_start().to_string();
    }
    if cleaned.starts_with("```") {
        cleaned = cleaned.trim_matches('`').trim().to_string();
    }
    cleaned
}

/// SQL Server 方言下把尾部 LIMIT N 改写为 SELECT TOP N
fn convert_limit_to_top(query: &str, dialect: Dialect) -> String {
    if dialect != Dialect::Sqlserver {
        return query.to_string();
    }
    let limit_re =
        LIMIT_RE.get_or_init(|| Regex::new(r"(?i)\blimit\s+(\d+)\s*;?\s*$").unwrap());
    let select_re = SELECT_RE.get_or_init(|| Regex::new(r"(?i)^\s*select\s+").unwrap());

    let lowered = query.to_lowercase();
    if let Some(caps) = limit_re.captures(query) {
        if !lowered.contains("top") {
            let limit_n = &caps[1];
            let rewritten = select_re
                .replace(query, format!("SELECT TOP {limit_n} "))
                .to_string();
            return limit_re.replace(&rewritten, "").trim().to_string();
        }
    }
    query.to_string()
}

pub struct ExecuteQueryNode;

impl ExecuteQueryNode {
    async fn execute(&self, ctx: &NodeContext<'_>, state: &mut SessionState, query: &str) {
        let cleaned = clean_sql(query);
        let cleaned = convert_limit_to_top(&cleaned, ctx.services.datasource.dialect());

        match ctx.services.broker.executor().execute(&cleaned).await {
            Ok(table) => {
                tracing::info!(session = %state.session_id, rows = table.rows.len(), "query executed");
                state.set_execution_result(table.render());
                state.last_error = None;
            }
            Err(e) => {
                tracing::warn!(session = %state.session_id, "query execution failed: {e}");
                state.set_execution_error(e.to_string());
                state.last_error = Some(e.to_string());
            }
        }
    }
}

#[async_trait]
impl Node for ExecuteQueryNode {
    fn id(&self) -> NodeId {
        NodeId::ExecuteQuery
    }

    async fn run(
        &self,
        ctx: &mut NodeContext<'_>,
        state: &mut SessionState,
    ) -> Result<NodeFlow, AgentError> {
        // resume 路径：检查点里有待决动作，上下文里有外部决策
        if let Some(pending) = state.pending_action.take() {
            let command = ctx.decision.take();
            let settlement = ctx.services.broker.settle(&pending, command.as_ref())?;

            match settlement {
                Settlement::Execute { params, edited } => {
                    let query = params
                        .get("query")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string();
                    if edited {
                        // 外部替换了参数，后续阶段必须看到实际执行的 SQL
                        state.candidate_query = Some(query.clone());
                    }
                    self.execute(ctx, state, &query).await;
                }
                Settlement::Feedback(text) => {
                    // 不触碰执行网关；反馈文本作为事实结果交给审查
                    tracing::info!(session = %state.session_id, "execution bypassed by respond decision");
                    state.clear_execution_outcome();
                    state.decision_feedback = Some(text);
                }
            }
            return Ok(NodeFlow::Continue);
        }

        // 首次进入：构建动作请求并挂起
        let query = state.candidate_query.clone().unwrap_or_default();
        let request = ctx.services.broker.request_for(&query);
        state.pending_action = Some(request.clone());
        Ok(NodeFlow::Suspend(request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_sql_strips_fences_and_prefix() {
        assert_eq!(clean_sql("```\nSELECT 1\n```"), "SELECT 1");
        assert_eq!(clean_sql("sql SELECT 1"), "SELECT 1");
        assert_eq!(clean_sql("  SELECT 1  "), "SELECT 1");
    }

    #[test]
    fn test_limit_to_top_only_for_sqlserver() {
        let sql = "SELECT dept FROM cost_items LIMIT 10";
        assert_eq!(
            convert_limit_to_top(sql, Dialect::Sqlserver),
            "SELECT TOP 10 dept FROM cost_items"
        );
        assert_eq!(convert_limit_to_top(sql, Dialect::Postgresql), sql);
    }

    #[test]
    fn test_limit_to_top_skips_existing_top() {
        let sql = "SELECT TOP 5 dept FROM cost_items LIMIT 5";
        assert_eq!(convert_limit_to_top(sql, Dialect::Sqlserver), sql);
    }
}
