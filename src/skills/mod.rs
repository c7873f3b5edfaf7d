//! 技能系统：业务规则、方言规则与默认表

pub mod loader;

pub use loader::{Skill, SkillCache, SkillLoader, SkillMeta};
