//! 管线节点：意图分析、上下文加载、SQL 生成/校验/执行、结果审查、答案精炼
//!
//! 每个节点把真正的工作委托给注入的协作者（LLM / 数据源 / 技能），
//! 并把结果写回会话状态；协作者失败写入 last_error，由路由消化。

pub mod context;
pub mod execute;
pub mod generate;
pub mod intent;
pub mod refine;
pub mod review;
pub mod validate;

pub use context::LoadContextNode;
pub use execute::ExecuteQueryNode;
pub use generate::GenerateQueryNode;
pub use intent::AnalyzeIntentNode;
pub use refine::RefineAnswerNode;
pub use review::ReviewResultNode;
pub use validate::ValidateQueryNode;

/// 去掉 LLM 输出里的代码块标记
pub(crate) fn strip_code_fences(content: &str) -> String {
    content
        .replace("```json", "")
        .replace("```sql", "")
        .replace("```", "")
        .trim()
        .to_string()
}
