//! 数据源网关抽象
//!
//! 具体后端（Excel / PostgreSQL / SQL Server）在核心之外实现；
//! 核心只依赖这两个契约：上下文提供（表结构/方言规则）与查询执行。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 数据源方言
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Excel,
    Postgresql,
    Sqlserver,
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Dialect::Excel => "excel",
            Dialect::Postgresql => "postgresql",
            Dialect::Sqlserver => "sqlserver",
        };
        f.write_str(s)
    }
}

/// 数据源错误
#[derive(Error, Debug)]
pub enum DataSourceError {
    #[error("Data source unavailable")]
    Unavailable,

    #[error("Unknown table: {0}")]
    UnknownTable(String),

    #[error("Query execution failed: {0}")]
    Execution(String),
}

/// 表格结果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TabularResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
}

impl TabularResult {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// 渲染为对齐的文本表格（交给 LLM 审查与精炼）
    pub fn render(&self) -> String {
        if self.columns.is_empty() {
            return String::new();
        }

        let cell = |v: &serde_json::Value| -> String {
            match v {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            }
        };

        let mut widths: Vec<usize> = self.columns.iter().map(|c| c.chars().count()).collect();
        for row in &self.rows {
            for (i, v) in row.iter().enumerate() {
                if let Some(w) = widths.get_mut(i) {
                    *w = (*w).max(cell(v).chars().count());
                }
            }
        }

        let mut out = String::new();
        let header: Vec<String> = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{:width$}", c, width = widths[i]))
            .collect();
        out.push_str(header.join("  ").trim_end());
        for row in &self.rows {
            out.push('\n');
            let line: Vec<String> = row
                .iter()
                .enumerate()
                .map(|(i, v)| format!("{:width$}", cell(v), width = widths[i]))
                .collect();
            out.push_str(line.join("  ").trim_end());
        }
        out
    }
}

/// Schema/上下文网关
#[async_trait]
pub trait ContextProvider: Send + Sync {
    /// 装配给定表的结构与示例上下文
    async fn get_context(&self, table_names: &[String]) -> Result<String, DataSourceError>;

    fn is_available(&self) -> bool;

    fn dialect(&self) -> Dialect;

    /// 方言相关的 SQL 书写规则（拼入生成/校验提示词）
    fn dialect_rules(&self) -> String;
}

/// 查询执行网关：被中断代理包装的唯一敏感操作
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(&self, query: &str) -> Result<TabularResult, DataSourceError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_aligns_columns() {
        let result = TabularResult {
            columns: vec!["dept".to_string(), "amount".to_string()],
            rows: vec![
                vec![json!("研发部"), json!(1200)],
                vec![json!("市场"), json!(88)],
            ],
        };
        let text = result.render();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("dept"));
        assert!(lines[1].contains("1200"));
        assert!(lines[2].contains("88"));
    }

    #[test]
    fn test_render_empty() {
        assert_eq!(TabularResult::default().render(), "");
    }
}
