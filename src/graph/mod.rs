//! 图编排引擎
//!
//! - **node**: 封闭节点集合与类型化节点契约
//! - **router**: 纯函数路由与双层重试预算
//! - **interrupt**: 人在回路中断代理（accept / edit / respond）
//! - **checkpoint**: 挂起状态的持久化
//! - **builder**: 构建期校验的图装配
//! - **engine**: 节点 -> 路由主循环与挂起/恢复协议

pub mod builder;
pub mod checkpoint;
pub mod engine;
pub mod interrupt;
pub mod node;
pub mod router;

pub use builder::{default_graph, Edge, GraphBuilder, PipelineGraph, RouterFn};
pub use checkpoint::{CheckpointStore, FileCheckpointStore, MemoryCheckpointStore};
pub use engine::{Engine, RunOutcome, STEP_LIMIT};
pub use interrupt::{ActionRequest, Decision, InterruptBroker, ResumeCommand, Settlement};
pub use node::{Node, NodeContext, NodeFlow, NodeId, Services};
pub use router::{after_execution, after_review, after_validation, RetryPolicy, Route};
