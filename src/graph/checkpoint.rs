//! 检查点存储
//!
//! 挂起时整份 SessionState 落盘，resume 在之后（可能是另一个进程）按会话号恢复。
//! 每会话单写者：仅引擎写入、仅引擎在 resume 时读取；
//! 并发写同一会话属调用方违约，这里不做防御。

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::core::{CheckpointError, SessionState};

/// 检查点存取契约
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn save(&self, session_id: &str, state: &SessionState) -> Result<(), CheckpointError>;

    async fn load(&self, session_id: &str) -> Result<SessionState, CheckpointError>;

    /// 会话完成后归档；不存在时静默成功
    async fn remove(&self, session_id: &str) -> Result<(), CheckpointError>;
}

/// 进程内存储（测试与单进程场景的默认实现）
#[derive(Default)]
pub struct MemoryCheckpointStore {
    inner: RwLock<HashMap<String, SessionState>>,
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn save(&self, session_id: &str, state: &SessionState) -> Result<(), CheckpointError> {
        self.inner
            .write()
            .await
            .insert(session_id.to_string(), state.clone());
        Ok(())
    }

    async fn load(&self, session_id: &str) -> Result<SessionState, CheckpointError> {
        self.inner
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| CheckpointError::NotFound(session_id.to_string()))
    }

    async fn remove(&self, session_id: &str) -> Result<(), CheckpointError> {
        self.inner.write().await.remove(session_id);
        Ok(())
    }
}

/// 文件存储：每会话一个 JSON 文件，父目录自动创建
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn path(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{session_id}.json"))
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn save(&self, session_id: &str, state: &SessionState) -> Result<(), CheckpointError> {
        std::fs::create_dir_all(&self.dir)?;
        let json = serde_json::to_string_pretty(state)?;
        std::fs::write(self.path(session_id), json)?;
        Ok(())
    }

    async fn load(&self, session_id: &str) -> Result<SessionState, CheckpointError> {
        let path = self.path(session_id);
        if !path.exists() {
            return Err(CheckpointError::NotFound(session_id.to_string()));
        }
        let data = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }

    async fn remove(&self, session_id: &str) -> Result<(), CheckpointError> {
        let path = self.path(session_id);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}
