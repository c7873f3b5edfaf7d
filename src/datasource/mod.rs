//! 数据源层：网关抽象与内存实现

pub mod mock;
pub mod traits;

pub use mock::MemoryDataSource;
pub use traits::{ContextProvider, DataSourceError, Dialect, QueryExecutor, TabularResult};
