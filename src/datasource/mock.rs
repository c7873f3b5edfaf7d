//! 内存数据源（用于测试与离线演示）
//!
//! 以 HashMap 存表；execute 只识别最朴素的 `FROM <table>`，
//! 返回整张表——足以驱动管线，不做真正的 SQL 求值。

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::json;

use crate::datasource::{ContextProvider, DataSourceError, Dialect, QueryExecutor, TabularResult};

/// 内存数据源：同时实现上下文提供与查询执行
pub struct MemoryDataSource {
    tables: HashMap<String, TabularResult>,
    dialect: Dialect,
}

impl Default for MemoryDataSource {
    fn default() -> Self {
        Self {
            tables: HashMap::new(),
            dialect: Dialect::Excel,
        }
    }
}

impl MemoryDataSource {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            tables: HashMap::new(),
            dialect,
        }
    }

    pub fn with_table(mut self, name: impl Into<String>, table: TabularResult) -> Self {
        self.tables.insert(name.into(), table);
        self
    }

    /// 带一张示例成本表的数据源（离线演示用）
    pub fn with_sample_data() -> Self {
        Self::default().with_table(
            "cost_items",
            TabularResult {
                columns: vec![
                    "dept".to_string(),
                    "item".to_string(),
                    "amount".to_string(),
                ],
                rows: vec![
                    vec![json!("研发部"), json!("云服务"), json!(12800)],
                    vec![json!("研发部"), json!("差旅"), json!(3400)],
                    vec![json!("市场部"), json!("广告投放"), json!(56000)],
                    vec![json!("市场部"), json!("差旅"), json!(2100)],
                ],
            },
        )
    }

    /// 从 SQL 里摘出 FROM 后的表名（小写化、去引号）
    fn table_in_query(query: &str) -> Option<String> {
        let lowered = query.to_lowercase();
        let mut words = lowered.split_whitespace();
        while let Some(w) = words.next() {
            if w == "from" {
                return words
                    .next()
                    .map(|t| t.trim_matches(|c| c == '"' || c == '`' || c == ';').to_string());
            }
        }
        None
    }
}

#[async_trait]
impl ContextProvider for MemoryDataSource {
    async fn get_context(&self, table_names: &[String]) -> Result<String, DataSourceError> {
        let mut sections = Vec::new();
        for name in table_names {
            match self.tables.get(name) {
                Some(table) => {
                    sections.push(format!("表 {}({})", name, table.columns.join(", ")));
                }
                None => return Err(DataSourceError::UnknownTable(name.clone())),
            }
        }
        if sections.is_empty() {
            // 未指定表时给出全部表的概览
            for (name, table) in &self.tables {
                sections.push(format!("表 {}({})", name, table.columns.join(", ")));
            }
        }
        Ok(sections.join("\n"))
    }

    fn is_available(&self) -> bool {
        !self.tables.is_empty()
    }

    fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn dialect_rules(&self) -> String {
        match self.dialect {
            Dialect::Sqlserver => "使用 SELECT TOP N 而不是 LIMIT；字符串用单引号。".to_string(),
            _ => "仅使用标准 SELECT 语法；字符串用单引号。".to_string(),
        }
    }
}

#[async_trait]
impl QueryExecutor for MemoryDataSource {
    async fn execute(&self, query: &str) -> Result<TabularResult, DataSourceError> {
        let table_name = Self::table_in_query(query)
            .ok_or_else(|| DataSourceError::Execution("no FROM clause".to_string()))?;
        self.tables
            .get(&table_name)
            .cloned()
            .ok_or(DataSourceError::UnknownTable(table_name))
    }
}
