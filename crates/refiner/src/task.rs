use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::Serialize;

use refiner_core::{
    merge_chapters, parse_range_from_name, ChapterEntry, ChapterIndex, RefinerError, Workspace,
};

use crate::config::{self, ProjectConfig};
use crate::logging;

const DELEGATE_CATEGORY: &str = "novel-refine";

pub fn highlight_file_name(start: u32, end: u32) -> String {
    format!("第{start}-{end}章_高光.md")
}

pub fn block_plan_file_name(start: u32, end: u32) -> String {
    format!("第{start}-{end}章_剧情块.json")
}

pub fn refined_file_name(start: u32, end: u32) -> String {
    format!("第{start}-{end}章_精炼.md")
}

#[derive(Debug, Serialize)]
pub struct TaskDescriptor {
    pub task_type: String,
    pub description: String,
    pub chapter_range: ChapterRange,
    pub files: TaskFiles,
    pub output: TaskOutput,
    pub delegate_config: DelegateConfig,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ChapterRange {
    pub start: u32,
    pub end: u32,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct TaskFiles {
    pub prompt_template: PathBuf,
    pub content: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub story_context: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub highlights: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_plan: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
pub struct TaskOutput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
    pub format: String,
}

impl TaskOutput {
    fn file(path: PathBuf, format: &str) -> Self {
        Self {
            file: Some(path),
            dir: None,
            format: format.to_string(),
        }
    }

    fn dir(path: PathBuf, format: &str) -> Self {
        Self {
            file: None,
            dir: Some(path),
            format: format.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DelegateConfig {
    pub category: String,
    pub load_skills: Vec<String>,
}

impl Default for DelegateConfig {
    fn default() -> Self {
        Self {
            category: DELEGATE_CATEGORY.to_string(),
            load_skills: vec![config::SKILL_BUNDLE.to_string()],
        }
    }
}

pub fn run_scan(root: &Path, start: u32, count: Option<usize>) -> Result<TaskDescriptor> {
    let workspace = Workspace::open(root)?;
    let config = ProjectConfig::load(workspace.root())?;
    let selection = select_chapters(&workspace, &config, start, count)?;
    let range = range_of(start, &selection);
    let merged = merge_chapters(&workspace.blocks_dir(), &selection, range.start, range.end)?;
    let template = require_asset(workspace.root(), config::SCAN_TEMPLATE)?;
    logging::stage("scan", format!("第{}-{}章, {} chapter(s)", range.start, range.end, range.count));
    Ok(TaskDescriptor {
        task_type: "scan".to_string(),
        description: format!("通读第{}-{}章原文，记录高光场景、伏笔与关键转折", range.start, range.end),
        chapter_range: range,
        files: TaskFiles {
            prompt_template: template,
            content: merged,
            story_context: None,
            highlights: None,
            block_plan: None,
        },
        output: TaskOutput::file(
            workspace.blocks_dir().join(highlight_file_name(range.start, range.end)),
            "markdown",
        ),
        delegate_config: DelegateConfig::default(),
    })
}

pub fn run_plan(
    root: &Path,
    start: u32,
    count: Option<usize>,
    highlights: Option<PathBuf>,
) -> Result<TaskDescriptor> {
    let workspace = Workspace::open(root)?;
    let config = ProjectConfig::load(workspace.root())?;
    let selection = select_chapters(&workspace, &config, start, count)?;
    let range = range_of(start, &selection);
    let merged = merge_chapters(&workspace.blocks_dir(), &selection, range.start, range.end)?;
    let template = require_asset(workspace.root(), config::PLAN_TEMPLATE)?;
    let highlights = match highlights {
        Some(path) => Some(require_file(&path)?),
        None => detect_highlights(&workspace.blocks_dir(), range),
    };
    logging::stage("plan", format!("第{}-{}章, {} chapter(s)", range.start, range.end, range.count));
    Ok(TaskDescriptor {
        task_type: "plan".to_string(),
        description: format!("基于第{}-{}章原文划分剧情块并输出规划", range.start, range.end),
        chapter_range: range,
        files: TaskFiles {
            prompt_template: template,
            content: merged,
            story_context: None,
            highlights,
            block_plan: None,
        },
        output: TaskOutput::file(
            workspace.blocks_dir().join(block_plan_file_name(range.start, range.end)),
            "json",
        ),
        delegate_config: DelegateConfig::default(),
    })
}

pub fn run_refine(root: &Path, block_file: &Path) -> Result<TaskDescriptor> {
    let workspace = Workspace::open(root)?;
    let block_file = require_file(block_file)?;
    let name = block_file
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    let (start, end) = parse_range_from_name(name)?;
    let index = ChapterIndex::scan(&workspace.source_dir())?;
    let selection = index.select_range(start, end);
    if selection.is_empty() {
        return Err(RefinerError::NoMatch(format!(
            "no chapter files for 第{start}-{end}章"
        ))
        .into());
    }
    let range = ChapterRange {
        start,
        end,
        count: selection.len(),
    };
    let merged = merge_chapters(&workspace.blocks_dir(), &selection, start, end)?;
    let template = require_asset(workspace.root(), config::REFINE_TEMPLATE)?;
    let story_context = require_file(&workspace.context_file())?;
    logging::stage("refine", format!("第{start}-{end}章, {} chapter(s)", range.count));
    Ok(TaskDescriptor {
        task_type: "refine".to_string(),
        description: format!("按剧情块规划精炼第{start}-{end}章原文"),
        chapter_range: range,
        files: TaskFiles {
            prompt_template: template,
            content: merged,
            story_context: Some(story_context),
            highlights: None,
            block_plan: Some(block_file),
        },
        output: TaskOutput::dir(workspace.output_dir(), "markdown"),
        delegate_config: DelegateConfig::default(),
    })
}

fn select_chapters(
    workspace: &Workspace,
    config: &ProjectConfig,
    start: u32,
    count: Option<usize>,
) -> Result<Vec<ChapterEntry>> {
    let count = count.unwrap_or(config.plan.default_count);
    let index = ChapterIndex::scan(&workspace.source_dir())?;
    let selection = index.select_budgeted(start, count, config.plan.max_chars);
    if selection.is_empty() {
        return Err(RefinerError::NoMatch(format!(
            "no chapter files starting at 第{start}章"
        ))
        .into());
    }
    Ok(selection)
}

fn range_of(start: u32, selection: &[ChapterEntry]) -> ChapterRange {
    let end = selection.last().map(|e| e.number).unwrap_or(start);
    ChapterRange {
        start,
        end,
        count: selection.len(),
    }
}

fn require_asset(root: &Path, name: &str) -> Result<PathBuf> {
    require_file(&config::assets_dir(root).join(name))
}

fn require_file(path: &Path) -> Result<PathBuf> {
    if !path.is_file() {
        return Err(RefinerError::NotFound(path.to_path_buf()).into());
    }
    Ok(path.canonicalize()?)
}

fn detect_highlights(blocks_dir: &Path, range: ChapterRange) -> Option<PathBuf> {
    let mut paths: Vec<PathBuf> = fs::read_dir(blocks_dir)
        .ok()?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .collect();
    paths.sort();
    for path in paths {
        let Some(name) = path.file_name().and_then(|s| s.to_str()) else {
            continue;
        };
        if !name.contains("高光") {
            continue;
        }
        let Ok((h_start, h_end)) = parse_range_from_name(name) else {
            continue;
        };
        if h_start <= range.start && range.end <= h_end {
            logging::verbose(format!("attached highlight notes {name}"));
            return Some(path);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use refiner_core::{chapter_file_name, SOURCE_DIR};

    fn fixture() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("project");
        let ws = Workspace::create(&root).unwrap();
        ws.ensure_dirs().unwrap();

        let book = root.join(SOURCE_DIR).join("测试书");
        fs::create_dir_all(&book).unwrap();
        for n in 1..=8u32 {
            let name = chapter_file_name(n as usize, &format!("第{n}章 风波"));
            fs::write(book.join(name), format!("第{n}章 风波\n正文第{n}段。")).unwrap();
        }

        let assets = root
            .join(".gemini")
            .join("skills")
            .join(config::SKILL_BUNDLE)
            .join("assets");
        fs::create_dir_all(&assets).unwrap();
        fs::write(assets.parent().unwrap().join(config::SKILL_MARKER), "# skill").unwrap();
        for template in [
            config::SCAN_TEMPLATE,
            config::PLAN_TEMPLATE,
            config::REFINE_TEMPLATE,
        ] {
            fs::write(assets.join(template), "模板正文").unwrap();
        }
        fs::write(root.join("story_context.txt"), "剧情状态").unwrap();
        (dir, root)
    }

    #[test]
    fn scan_builds_complete_descriptor() {
        let (_dir, root) = fixture();
        let descriptor = run_scan(&root, 1, Some(3)).unwrap();
        assert_eq!(descriptor.task_type, "scan");
        assert_eq!(descriptor.chapter_range.start, 1);
        assert_eq!(descriptor.chapter_range.end, 3);
        assert_eq!(descriptor.chapter_range.count, 3);
        assert!(descriptor.files.content.is_file());
        assert!(descriptor
            .files
            .content
            .to_string_lossy()
            .ends_with("第1-3章_合并.txt"));
        assert!(descriptor
            .files
            .prompt_template
            .to_string_lossy()
            .ends_with(config::SCAN_TEMPLATE));
        assert_eq!(
            descriptor.output.file.as_ref().unwrap().file_name().unwrap(),
            "第1-3章_高光.md"
        );
        assert_eq!(descriptor.output.format, "markdown");

        let json = serde_json::to_value(&descriptor).unwrap();
        assert!(json["files"].get("story_context").is_none());
        assert!(json["files"].get("highlights").is_none());
        assert_eq!(json["delegate_config"]["load_skills"][0], "novel-refiner");
    }

    #[test]
    fn scan_defaults_to_configured_count() {
        let (_dir, root) = fixture();
        let descriptor = run_scan(&root, 1, None).unwrap();
        assert_eq!(descriptor.chapter_range.count, 8);
        assert_eq!(descriptor.chapter_range.end, 8);
    }

    #[test]
    fn scan_without_chapters_is_no_match() {
        let (_dir, root) = fixture();
        let err = run_scan(&root, 99, Some(5)).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RefinerError>(),
            Some(RefinerError::NoMatch(_))
        ));
    }

    #[test]
    fn scan_without_template_is_not_found() {
        let (_dir, root) = fixture();
        let assets = config::assets_dir(&root);
        fs::remove_file(assets.join(config::SCAN_TEMPLATE)).unwrap();
        let err = run_scan(&root, 1, Some(3)).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RefinerError>(),
            Some(RefinerError::NotFound(_))
        ));
    }

    #[test]
    fn plan_attaches_covering_highlights() {
        let (_dir, root) = fixture();
        let notes = Workspace::open(&root)
            .unwrap()
            .blocks_dir()
            .join(highlight_file_name(1, 10));
        fs::write(&notes, "高光记录").unwrap();
        let descriptor = run_plan(&root, 2, Some(2), None).unwrap();
        let attached = descriptor.files.highlights.unwrap();
        assert_eq!(attached.file_name().unwrap(), "第1-10章_高光.md");
    }

    #[test]
    fn plan_ignores_non_covering_highlights() {
        let (_dir, root) = fixture();
        let notes = Workspace::open(&root)
            .unwrap()
            .blocks_dir()
            .join(highlight_file_name(1, 2));
        fs::write(&notes, "高光记录").unwrap();
        let descriptor = run_plan(&root, 2, Some(3), None).unwrap();
        assert!(descriptor.files.highlights.is_none());
    }

    #[test]
    fn plan_rejects_missing_explicit_highlights() {
        let (_dir, root) = fixture();
        let err = run_plan(&root, 1, Some(2), Some(root.join("缺失.md"))).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RefinerError>(),
            Some(RefinerError::NotFound(_))
        ));
    }

    #[test]
    fn plan_output_is_block_plan_json() {
        let (_dir, root) = fixture();
        let descriptor = run_plan(&root, 1, Some(4), None).unwrap();
        assert_eq!(descriptor.task_type, "plan");
        assert_eq!(
            descriptor.output.file.as_ref().unwrap().file_name().unwrap(),
            "第1-4章_剧情块.json"
        );
        assert_eq!(descriptor.output.format, "json");
    }

    #[test]
    fn refine_reads_range_from_plan_name() {
        let (_dir, root) = fixture();
        let ws = Workspace::open(&root).unwrap();
        let plan = ws.blocks_dir().join(block_plan_file_name(2, 5));
        fs::write(&plan, r#"{"blocks":[]}"#).unwrap();
        let descriptor = run_refine(&root, &plan).unwrap();
        assert_eq!(descriptor.task_type, "refine");
        assert_eq!(descriptor.chapter_range.start, 2);
        assert_eq!(descriptor.chapter_range.end, 5);
        assert_eq!(descriptor.chapter_range.count, 4);
        assert!(descriptor.files.story_context.is_some());
        assert!(descriptor.files.block_plan.is_some());
        assert_eq!(descriptor.output.dir.as_ref().unwrap().file_name().unwrap(), "精炼成品");
    }

    #[test]
    fn refine_requires_parseable_plan_name() {
        let (_dir, root) = fixture();
        let ws = Workspace::open(&root).unwrap();
        let plan = ws.blocks_dir().join("规划.json");
        fs::write(&plan, r#"{"blocks":[]}"#).unwrap();
        let err = run_refine(&root, &plan).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RefinerError>(),
            Some(RefinerError::ParseRange(_))
        ));
    }

    #[test]
    fn refine_requires_story_context() {
        let (_dir, root) = fixture();
        let ws = Workspace::open(&root).unwrap();
        fs::remove_file(ws.context_file()).unwrap();
        let plan = ws.blocks_dir().join(block_plan_file_name(1, 2));
        fs::write(&plan, r#"{"blocks":[]}"#).unwrap();
        let err = run_refine(&root, &plan).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RefinerError>(),
            Some(RefinerError::NotFound(_))
        ));
    }
}
