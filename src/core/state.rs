//! 会话状态
//!
//! 每个会话一份 SessionState，由引擎独占持有、各节点就地修改；
//! 可序列化，挂起时整体写入检查点，resume 时恢复。

use serde::{Deserialize, Serialize};

use crate::graph::{ActionRequest, NodeId};

/// 意图分析结果（意图节点的 LLM 输出）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentAnalysis {
    pub is_data_query: bool,
    #[serde(default)]
    pub reason: String,
}

/// 一次查询会话的全部可变状态
///
/// 会话只处于三种状态之一：运行中、挂起（检查点里 pending_action 非空）、
/// 完成（final_answer 非空），不会同时处于两种。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    /// 关联标识；创建时生成，之后不变，resume 时必须匹配
    pub session_id: String,
    /// 用户原始自然语言问题；创建后不变
    pub query_text: String,

    /// 意图分析结果；升级（escalation）时被清空以重新理解问题
    pub understood_intent: Option<IntentAnalysis>,
    /// 上下文加载节点装配的表结构/业务上下文
    pub context_payload: Option<String>,
    /// 识别出的待查询表名
    pub table_names: Vec<String>,

    /// 生成的候选 SQL；每次重试被覆盖
    pub candidate_query: Option<String>,
    /// 校验结论
    pub is_valid: bool,

    execution_result: Option<String>,
    execution_error: Option<String>,

    pub review_passed: Option<bool>,
    pub review_feedback: Option<String>,
    /// respond 决策给出的反馈文本；审查把它当作事实结果，执行字段保持为空
    pub decision_feedback: Option<String>,

    /// 生成尝试计数；只由生成节点递增，单调不减
    pub retry_count: u32,
    /// 最近一次可恢复错误，作为纠错上下文拼入下一次生成提示词
    pub last_error: Option<String>,

    /// 挂起期间的待决动作；resume 时取走并清空
    pub pending_action: Option<ActionRequest>,
    /// 最终回答；仅收尾节点写入，非空即会话完成
    pub final_answer: Option<String>,

    /// 引擎簿记：当前节点与累计步数，随检查点持久化，跨进程续跑
    pub current_node: NodeId,
    pub steps: u32,
    pub created_at: i64,
}

impl SessionState {
    pub fn new(query_text: impl Into<String>) -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            query_text: query_text.into(),
            understood_intent: None,
            context_payload: None,
            table_names: Vec::new(),
            candidate_query: None,
            is_valid: false,
            execution_result: None,
            execution_error: None,
            review_passed: None,
            review_feedback: None,
            decision_feedback: None,
            retry_count: 0,
            last_error: None,
            pending_action: None,
            final_answer: None,
            current_node: NodeId::AnalyzeIntent,
            steps: 0,
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// 记录执行成功；与 execution_error 互斥
    pub fn set_execution_result(&mut self, result: impl Into<String>) {
        self.execution_result = Some(result.into());
        self.execution_error = None;
    }

    /// 记录执行失败；与 execution_result 互斥
    pub fn set_execution_error(&mut self, error: impl Into<String>) {
        self.execution_error = Some(error.into());
        self.execution_result = None;
    }

    /// 清空执行结果与错误（respond 短路时两者都必须为空）
    pub fn clear_execution_outcome(&mut self) {
        self.execution_result = None;
        self.execution_error = None;
    }

    pub fn execution_result(&self) -> Option<&str> {
        self.execution_result.as_deref()
    }

    pub fn execution_error(&self) -> Option<&str> {
        self.execution_error.as_deref()
    }

    pub fn is_complete(&self) -> bool {
        self.final_answer.is_some()
    }

    pub fn is_suspended(&self) -> bool {
        self.pending_action.is_some()
    }
}
