//! 管线图构建器
//!
//! 构建期注册全部节点与边并校验（静态边的目标必须已注册），
//! 产出不可变的 PipelineGraph；条件边的目标由路由函数在运行期给出，
//! 引擎查不到目标节点时同样按图配置错误中止。

use std::collections::HashMap;
use std::sync::Arc;

use crate::core::{AgentError, SessionState};
use crate::graph::node::{Node, NodeId};
use crate::graph::router::{Route, RetryPolicy};

/// 条件路由函数：状态的纯函数，图构建期绑定
pub type RouterFn = fn(&SessionState, &RetryPolicy) -> Route;

/// 节点出边：固定后继或条件路由
pub enum Edge {
    Static(NodeId),
    Conditional(RouterFn),
}

/// 编译后的管线图
pub struct PipelineGraph {
    entry: NodeId,
    nodes: HashMap<NodeId, Arc<dyn Node>>,
    edges: HashMap<NodeId, Edge>,
}

impl std::fmt::Debug for PipelineGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineGraph")
            .field("entry", &self.entry)
            .field("nodes", &self.nodes.keys().collect::<Vec<_>>())
            .field("edges", &self.edges.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl PipelineGraph {
    pub fn entry(&self) -> NodeId {
        self.entry
    }

    pub fn node(&self, id: NodeId) -> Option<&Arc<dyn Node>> {
        self.nodes.get(&id)
    }

    pub fn edge(&self, id: NodeId) -> Option<&Edge> {
        self.edges.get(&id)
    }
}

/// 图构建器
#[derive(Default)]
pub struct GraphBuilder {
    entry: Option<NodeId>,
    nodes: HashMap<NodeId, Arc<dyn Node>>,
    edges: HashMap<NodeId, Edge>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册节点；标识取自节点自身
    pub fn node(mut self, node: Arc<dyn Node>) -> Self {
        self.nodes.insert(node.id(), node);
        self
    }

    pub fn entry(mut self, id: NodeId) -> Self {
        self.entry = Some(id);
        self
    }

    /// 固定边
    pub fn edge(mut self, from: NodeId, to: NodeId) -> Self {
        self.edges.insert(from, Edge::Static(to));
        self
    }

    /// 条件边
    pub fn conditional(mut self, from: NodeId, router: RouterFn) -> Self {
        self.edges.insert(from, Edge::Conditional(router));
        self
    }

    pub fn build(self) -> Result<PipelineGraph, AgentError> {
        let entry = self
            .entry
            .ok_or_else(|| AgentError::Graph("entry node not set".to_string()))?;
        if !self.nodes.contains_key(&entry) {
            return Err(AgentError::Graph(format!(
                "entry node {entry} not registered"
            )));
        }

        for (from, edge) in &self.edges {
            if !self.nodes.contains_key(from) {
                return Err(AgentError::Graph(format!(
                    "edge source {from} not registered"
                )));
            }
            if let Edge::Static(to) = edge {
                if *to != NodeId::End && !self.nodes.contains_key(to) {
                    return Err(AgentError::Graph(format!(
                        "edge target {to} not registered"
                    )));
                }
            }
        }

        Ok(PipelineGraph {
            entry,
            nodes: self.nodes,
            edges: self.edges,
        })
    }
}

/// 默认管线：意图分析 -> 上下文加载 -> 生成 -> 校验，
/// 三处条件路由（校验后/执行后/审查后），答案精炼 -> 终点
pub fn default_graph() -> Result<PipelineGraph, AgentError> {
    use crate::agents::{
        AnalyzeIntentNode, ExecuteQueryNode, GenerateQueryNode, LoadContextNode, RefineAnswerNode,
        ReviewResultNode, ValidateQueryNode,
    };
    use crate::graph::router;

    GraphBuilder::new()
        .node(Arc::new(AnalyzeIntentNode))
        .node(Arc::new(LoadContextNode))
        .node(Arc::new(GenerateQueryNode))
        .node(Arc::new(ValidateQueryNode))
        .node(Arc::new(ExecuteQueryNode))
        .node(Arc::new(ReviewResultNode))
        .node(Arc::new(RefineAnswerNode))
        .entry(NodeId::AnalyzeIntent)
        .edge(NodeId::AnalyzeIntent, NodeId::LoadContext)
        .edge(NodeId::LoadContext, NodeId::GenerateQuery)
        .edge(NodeId::GenerateQuery, NodeId::ValidateQuery)
        .conditional(NodeId::ValidateQuery, router::after_validation)
        .conditional(NodeId::ExecuteQuery, router::after_execution)
        .conditional(NodeId::ReviewResult, router::after_review)
        .edge(NodeId::RefineAnswer, NodeId::End)
        .build()
}
