//! Mock LLM 客户端（用于测试，无需 API）
//!
//! 按提示词中的节点标记返回可解析的固定响应，便于无 API 跑通整个管线。

use async_trait::async_trait;

use crate::llm::{LlmClient, LlmError, Message, Role};

/// Mock 客户端：根据最后一条 User 消息判断所处节点并返回对应响应
#[derive(Debug, Default)]
pub struct MockLlmClient;

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        let prompt = messages
            .iter()
            .rev()
            .find(|m| matches!(m.role, Role::User))
            .map(|m| m.content.as_str())
            .unwrap_or("");

        let response = if prompt.contains("问题分类器") {
            r#"{"is_data_query": true, "reason": "mock"}"#.to_string()
        } else if prompt.contains("识别需要加载的表") {
            r#"[{"table_name": "cost_items", "fields": []}]"#.to_string()
        } else if prompt.contains("SQL 生成助手") {
            "SELECT * FROM cost_items LIMIT 10".to_string()
        } else if prompt.contains("SQL 校验助手") {
            "VALID".to_string()
        } else if prompt.contains("结果审查助手") {
            r#"{"passed": true, "refined_answer": "查询结果可以回答用户问题"}"#.to_string()
        } else {
            "（Mock 回答）已根据查询结果生成回答。".to_string()
        };

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_returns_parseable_intent() {
        let mock = MockLlmClient;
        let out = mock
            .complete(&[Message::user("你是一个问题分类器。…")])
            .await
            .unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["is_data_query"], true);
    }
}
