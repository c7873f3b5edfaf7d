//! 执行引擎
//!
//! 驱动「节点 -> 路由」循环直至终点或挂起。挂起是真正的暂停：
//! 状态落盘后控制权交还调用方，进程可以退出；resume 是一次独立调用，
//! 从检查点重建会话并从被中断的节点继续，跨挂起边界不保留任何内存态。

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use crate::core::{AgentError, CheckpointError, SessionState};
use crate::graph::builder::{Edge, PipelineGraph};
use crate::graph::checkpoint::CheckpointStore;
use crate::graph::interrupt::{ActionRequest, ResumeCommand};
use crate::graph::node::{NodeContext, NodeFlow, NodeId, Services};
use crate::graph::router::{RetryPolicy, Route};

/// 全局步数上限；致命保护，不随业务调参
pub const STEP_LIMIT: u32 = 50;

/// 一次 run/resume 的结果
#[derive(Debug)]
pub enum RunOutcome {
    Completed(Box<SessionState>),
    /// 会话已挂起：动作请求发往外部，状态在检查点里等待决策
    Suspended {
        session_id: String,
        request: ActionRequest,
    },
}

/// 管线引擎：一个实例可服务多个互不共享状态的会话
pub struct Engine {
    graph: PipelineGraph,
    services: Arc<Services>,
    checkpoints: Arc<dyn CheckpointStore>,
    policy: RetryPolicy,
    /// 正在 resume 的会话集合；同一会话的并发 resume 直接拒绝
    in_flight: Mutex<HashSet<String>>,
}

impl Engine {
    pub fn new(
        graph: PipelineGraph,
        services: Arc<Services>,
        checkpoints: Arc<dyn CheckpointStore>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            graph,
            services,
            checkpoints,
            policy,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// 从入口节点驱动一个新会话
    pub async fn run(&self, mut state: SessionState) -> Result<RunOutcome, AgentError> {
        state.current_node = self.graph.entry();
        tracing::info!(session = %state.session_id, query = %state.query_text, "session started");
        self.drive(state, None).await
    }

    /// 以外部决策恢复一个挂起的会话
    ///
    /// 命令缺失是 MissingDecision；未知会话、未挂起的会话、
    /// 同一会话的并发 resume 均为协议违规。
    pub async fn resume(
        &self,
        session_id: &str,
        command: Option<ResumeCommand>,
    ) -> Result<RunOutcome, AgentError> {
        let _guard = self.claim(session_id)?;

        let state = self
            .checkpoints
            .load(session_id)
            .await
            .map_err(|e| match e {
                CheckpointError::NotFound(_) => AgentError::UnknownSession(session_id.to_string()),
                other => AgentError::Checkpoint(other),
            })?;

        if !state.is_suspended() {
            return Err(AgentError::NotSuspended(session_id.to_string()));
        }
        if command.is_none() {
            return Err(AgentError::MissingDecision);
        }

        tracing::info!(session = %session_id, "session resumed");
        self.drive(state, command).await
    }

    /// 主循环；staged 是 resume 带入的决策，只会交给恢复后的第一个节点
    async fn drive(
        &self,
        mut state: SessionState,
        mut staged: Option<ResumeCommand>,
    ) -> Result<RunOutcome, AgentError> {
        loop {
            let node_id = state.current_node;
            let node = self
                .graph
                .node(node_id)
                .ok_or_else(|| AgentError::Graph(format!("node {node_id} not registered")))?;

            tracing::debug!(session = %state.session_id, node = %node_id, step = state.steps, "running node");

            let mut ctx = NodeContext {
                services: self.services.as_ref(),
                decision: staged.take(),
            };
            let flow = node.run(&mut ctx, &mut state).await?;

            let route = match flow {
                NodeFlow::Suspend(request) => {
                    self.checkpoints.save(&state.session_id, &state).await?;
                    tracing::info!(
                        session = %state.session_id,
                        action = %request.action_name,
                        "session suspended awaiting decision"
                    );
                    return Ok(RunOutcome::Suspended {
                        session_id: state.session_id.clone(),
                        request,
                    });
                }
                NodeFlow::Continue => match self.graph.edge(node_id) {
                    Some(Edge::Static(next)) => Route::to(*next),
                    Some(Edge::Conditional(router)) => router(&state, &self.policy),
                    None => {
                        return Err(AgentError::Graph(format!("node {node_id} has no edge")));
                    }
                },
            };

            if route.escalate {
                // 升级：丢弃已理解的意图，从头重新理解问题
                state.understood_intent = None;
                tracing::info!(
                    session = %state.session_id,
                    retry_count = state.retry_count,
                    "escalating: restarting intent analysis"
                );
            }

            state.steps += 1;
            if state.steps > STEP_LIMIT {
                tracing::error!(session = %state.session_id, steps = state.steps, "step limit exceeded");
                return Err(AgentError::StepLimitExceeded { steps: state.steps });
            }

            tracing::debug!(session = %state.session_id, prev = %node_id, next = %route.next, "transition");
            state.current_node = route.next;

            if state.current_node == NodeId::End {
                // 会话完成，归档检查点
                let _ = self.checkpoints.remove(&state.session_id).await;
                tracing::info!(session = %state.session_id, steps = state.steps, "session completed");
                return Ok(RunOutcome::Completed(Box::new(state)));
            }
        }
    }

    fn claim(&self, session_id: &str) -> Result<InFlightGuard<'_>, AgentError> {
        let mut in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !in_flight.insert(session_id.to_string()) {
            return Err(AgentError::SessionBusy(session_id.to_string()));
        }
        Ok(InFlightGuard {
            engine: self,
            session_id: session_id.to_string(),
        })
    }
}

/// resume 期间的会话占位；离开作用域即释放
struct InFlightGuard<'a> {
    engine: &'a Engine,
    session_id: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let mut in_flight = self
            .engine
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        in_flight.remove(&self.session_id);
    }
}
