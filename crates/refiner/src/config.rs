use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use refiner_core::SplitSettings;

pub const CONFIG_FILE: &str = "refiner.toml";

pub const SKILL_BUNDLE: &str = "novel-refiner";
pub const SKILL_MARKER: &str = "SKILL.md";

pub const SCAN_TEMPLATE: &str = "高光扫描提示词.txt";
pub const PLAN_TEMPLATE: &str = "剧情块提示词.txt";
pub const REFINE_TEMPLATE: &str = "小说精炼提示词.txt";
pub const CONTEXT_TEMPLATE: &str = "story_context_template.txt";

#[derive(Debug, Deserialize, Default)]
pub struct ProjectConfig {
    #[serde(default)]
    pub split: SplitConfig,
    #[serde(default)]
    pub plan: PlanConfig,
    #[serde(default)]
    pub exec: ExecConfig,
}

#[derive(Debug, Deserialize)]
pub struct SplitConfig {
    #[serde(default = "default_min_heading_matches")]
    pub min_heading_matches: usize,
    #[serde(default = "default_min_file_bytes")]
    pub min_file_bytes: u64,
}

#[derive(Debug, Deserialize)]
pub struct PlanConfig {
    #[serde(default = "default_count")]
    pub default_count: usize,
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
}

#[derive(Debug, Deserialize)]
pub struct ExecConfig {
    #[serde(default = "default_tool")]
    pub tool: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_min_heading_matches() -> usize {
    5
}

fn default_min_file_bytes() -> u64 {
    50 * 1024
}

fn default_count() -> usize {
    50
}

fn default_max_chars() -> usize {
    100_000
}

fn default_tool() -> String {
    "gemini".to_string()
}

fn default_timeout_secs() -> u64 {
    600
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            min_heading_matches: default_min_heading_matches(),
            min_file_bytes: default_min_file_bytes(),
        }
    }
}

impl Default for PlanConfig {
    fn default() -> Self {
        Self {
            default_count: default_count(),
            max_chars: default_max_chars(),
        }
    }
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            tool: default_tool(),
            args: Vec::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ProjectConfig {
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join(CONFIG_FILE);
        if !path.is_file() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
    }

    pub fn split_settings(&self) -> SplitSettings {
        SplitSettings {
            min_heading_matches: self.split.min_heading_matches,
            min_file_bytes: self.split.min_file_bytes,
        }
    }
}

pub fn skill_candidates(root: &Path) -> Vec<PathBuf> {
    let mut candidates = vec![root.join(".gemini").join("skills").join(SKILL_BUNDLE)];
    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join(".gemini").join("skills").join(SKILL_BUNDLE));
    }
    if let Some(fallback) = install_dir() {
        candidates.push(fallback);
    }
    candidates
}

pub fn resolve_skill_dir(candidates: &[PathBuf], marker: &str) -> Option<PathBuf> {
    candidates.iter().find(|dir| dir.join(marker).is_file()).cloned()
}

pub fn skill_dir(root: &Path) -> PathBuf {
    let candidates = skill_candidates(root);
    match resolve_skill_dir(&candidates, SKILL_MARKER) {
        Some(dir) => dir,
        None => install_dir().unwrap_or_else(|| root.to_path_buf()),
    }
}

pub fn assets_dir(root: &Path) -> PathBuf {
    skill_dir(root).join("assets")
}

fn install_dir() -> Option<PathBuf> {
    let exe = env::current_exe().ok()?;
    Some(exe.parent()?.parent()?.to_path_buf())
}
