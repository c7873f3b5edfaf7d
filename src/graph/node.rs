//! 节点契约
//!
//! 封闭的 NodeId 集合 + 类型化 Node trait：节点在图构建期注册解析，
//! 运行期不做字符串名字查找；协作者经 NodeContext 显式注入，不走全局单例。

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::{AgentError, SessionState};
use crate::datasource::ContextProvider;
use crate::graph::interrupt::{ActionRequest, InterruptBroker, ResumeCommand};
use crate::llm::LlmClient;
use crate::skills::Skill;

/// 管线节点标识（含终点 End）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeId {
    AnalyzeIntent,
    LoadContext,
    GenerateQuery,
    ValidateQuery,
    ExecuteQuery,
    ReviewResult,
    RefineAnswer,
    End,
}

impl NodeId {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeId::AnalyzeIntent => "analyze_intent",
            NodeId::LoadContext => "load_context",
            NodeId::GenerateQuery => "generate_query",
            NodeId::ValidateQuery => "validate_query",
            NodeId::ExecuteQuery => "execute_query",
            NodeId::ReviewResult => "review_result",
            NodeId::RefineAnswer => "refine_answer",
            NodeId::End => "end",
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 节点执行结果：继续交给路由，或携带动作请求挂起
#[derive(Debug)]
pub enum NodeFlow {
    Continue,
    Suspend(ActionRequest),
}

/// 注入节点的协作者集合；引擎构造时装配，不存在任何全局查找
pub struct Services {
    pub llm: Arc<dyn LlmClient>,
    pub datasource: Arc<dyn ContextProvider>,
    pub broker: InterruptBroker,
    pub skill: Option<Skill>,
}

/// 每一步的节点上下文
///
/// decision 仅在 resume 的第一步非空，由被中断的节点取走。
pub struct NodeContext<'a> {
    pub services: &'a Services,
    pub decision: Option<ResumeCommand>,
}

/// 图中的一个节点
///
/// 业务失败（SQL 无效、执行出错、LLM 输出不可解析）写入状态字段，
/// 由路由消化；Err 只用于协议违规，会中止整个会话。
#[async_trait]
pub trait Node: Send + Sync {
    fn id(&self) -> NodeId;

    async fn run(
        &self,
        ctx: &mut NodeContext<'_>,
        state: &mut SessionState,
    ) -> Result<NodeFlow, AgentError>;
}
