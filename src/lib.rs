//! Nectar - Rust 自然语言数据查询智能体
//!
//! 模块划分：
//! - **agents**: 七个管线节点（意图分析、上下文加载、SQL 生成/校验/执行、结果审查、答案精炼）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 会话状态与错误类型
//! - **datasource**: 数据源网关抽象与内存实现
//! - **graph**: 图编排引擎（节点契约、路由、重试预算、中断代理、检查点）
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）
//! - **skills**: 技能系统（业务规则、方言规则、默认表）

pub mod agents;
pub mod config;
pub mod core;
pub mod datasource;
pub mod graph;
pub mod llm;
pub mod observability;
pub mod skills;
