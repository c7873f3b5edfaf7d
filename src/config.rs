//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `NECTAR__*` 覆盖
//! （双下划线表示嵌套，如 `NECTAR__PIPELINE__MAX_RETRIES=5`）。

use std::path::PathBuf;

use serde::Deserialize;

use crate::graph::RetryPolicy;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub pipeline: PipelineSection,
}

/// [app] 段：应用名、技能目录、检查点目录、默认技能
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSection {
    pub name: Option<String>,
    /// 技能目录，未设置时用 ./skills
    pub skills_dir: Option<PathBuf>,
    /// 挂起会话检查点目录，未设置时用 ./.nectar/checkpoints
    pub checkpoint_dir: Option<PathBuf>,
    /// 默认使用的技能 ID
    pub skill: Option<String>,
}

/// [llm] 段：后端选择
#[derive(Debug, Clone, Deserialize, Default)]
pub struct LlmSection {
    /// 后端：deepseek / openai；优先级由 API Key 与 provider 共同决定
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    #[serde(default)]
    pub deepseek: LlmDeepSeekSection,
    #[serde(default)]
    pub openai: LlmOpenAiSection,
}

fn default_provider() -> String {
    "deepseek".to_string()
}

fn default_model() -> String {
    "deepseek-chat".to_string()
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LlmDeepSeekSection {
    pub model: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LlmOpenAiSection {
    pub model: Option<String>,
}

/// [pipeline] 段：重试预算（硬上限与升级软阈值）
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineSection {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_escalation_threshold")]
    pub escalation_threshold: u32,
}

fn default_max_retries() -> u32 {
    3
}

fn default_escalation_threshold() -> u32 {
    2
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            escalation_threshold: default_escalation_threshold(),
        }
    }
}

impl PipelineSection {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            escalation_threshold: self.escalation_threshold,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app: AppSection::default(),
            llm: LlmSection::default(),
            pipeline: PipelineSection::default(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 NECTAR__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 NECTAR__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("NECTAR")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_retry_policy() {
        let cfg = AppConfig::default();
        let policy = cfg.pipeline.retry_policy();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.escalation_threshold, 2);
    }

    #[test]
    fn test_pipeline_section_from_toml() {
        let cfg: AppConfig = toml::from_str(
            r#"
[pipeline]
max_retries = 5
escalation_threshold = 3
"#,
        )
        .unwrap();
        assert_eq!(cfg.pipeline.max_retries, 5);
        assert_eq!(cfg.pipeline.escalation_threshold, 3);
    }
}
