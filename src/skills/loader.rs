//! 技能加载器
//!
//! 从 skills/ 目录加载技能并缓存。一个技能贡献三样东西：
//! 业务规则（拼入生成提示词）、方言规则（补充数据源规则）、默认表名（上下文识别失败时兜底）。

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::RwLock;

/// 技能元数据（skill.toml）
#[derive(Debug, Clone, Deserialize)]
pub struct SkillMeta {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// 上下文识别不出表时使用的默认表名
    #[serde(default)]
    pub default_table_names: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct SkillToml {
    skill: SkillMeta,
}

/// 完整技能数据
#[derive(Debug, Clone)]
pub struct Skill {
    pub meta: SkillMeta,
    /// business_rules.md 内容
    pub business_rules: String,
    /// dialect_rules.md 内容
    pub dialect_rules: String,
    pub dir: PathBuf,
}

impl Skill {
    /// 获取用于列表展示的简短描述
    pub fn summary(&self) -> String {
        format!(
            "[{}] {}: {}",
            self.meta.id, self.meta.name, self.meta.description
        )
    }
}

/// 技能缓存
pub type SkillCache = Arc<RwLock<HashMap<String, Skill>>>;

/// 技能加载器
pub struct SkillLoader {
    skills_dir: PathBuf,
    cache: SkillCache,
}

impl SkillLoader {
    pub fn new(skills_dir: impl AsRef<Path>) -> Self {
        Self {
            skills_dir: skills_dir.as_ref().to_path_buf(),
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// 从默认位置创建
    pub fn from_default() -> Self {
        let dirs = [PathBuf::from("skills"), PathBuf::from("../skills")];
        let skills_dir = dirs
            .into_iter()
            .find(|d| d.exists())
            .unwrap_or_else(|| PathBuf::from("skills"));
        Self::new(skills_dir)
    }

    /// 加载所有技能并缓存
    pub async fn load_all(&self) -> anyhow::Result<Vec<Skill>> {
        let mut skills = Vec::new();

        if !self.skills_dir.exists() {
            return Ok(skills);
        }

        let entries = std::fs::read_dir(&self.skills_dir)?;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                if let Some(skill) = self.load_skill(&path) {
                    skills.push(skill);
                }
            }
        }

        let mut cache = self.cache.write().await;
        for skill in &skills {
            cache.insert(skill.meta.id.clone(), skill.clone());
        }

        tracing::info!("Loaded {} skills", skills.len());
        Ok(skills)
    }

    /// 加载单个技能目录
    fn load_skill(&self, dir: &Path) -> Option<Skill> {
        let skill_toml = dir.join("skill.toml");
        if !skill_toml.exists() {
            return None;
        }

        let toml_content = std::fs::read_to_string(&skill_toml).ok()?;
        let skill_data: SkillToml = toml::from_str(&toml_content).ok()?;

        let business_rules =
            std::fs::read_to_string(dir.join("business_rules.md")).unwrap_or_default();
        let dialect_rules =
            std::fs::read_to_string(dir.join("dialect_rules.md")).unwrap_or_default();

        Some(Skill {
            meta: skill_data.skill,
            business_rules,
            dialect_rules,
            dir: dir.to_path_buf(),
        })
    }

    /// 根据 ID 获取技能
    pub async fn get(&self, id: &str) -> Option<Skill> {
        let cache = self.cache.read().await;
        cache.get(id).cloned()
    }

    /// 获取所有技能的摘要列表
    pub async fn list_summaries(&self) -> Vec<String> {
        let cache = self.cache.read().await;
        cache.values().map(|s| s.summary()).collect()
    }
}
