use std::env;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use refiner_core::{merge_chapters, read_text, ChapterIndex, RefinerError, Workspace};

use crate::config::{self, ExecConfig, ProjectConfig};
use crate::logging;
use crate::task::refined_file_name;

const POLL_INTERVAL: Duration = Duration::from_millis(200);
const STDERR_TAIL_CHARS: usize = 2000;

#[derive(Debug, Deserialize)]
pub struct BlockPlan {
    #[serde(default)]
    pub blocks: Vec<BlockRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockRecord {
    pub block_id: String,
    #[serde(default)]
    pub title: String,
    pub start_chapter: u32,
    pub end_chapter: u32,
    #[serde(default)]
    pub summary: String,
}

#[derive(Debug, Error)]
pub enum ToolFailure {
    #[error("external tool not found: {0}")]
    Missing(String),
    #[error("external tool timed out after {0}s")]
    Timeout(u64),
    #[error("external tool failed ({status}): {stderr}")]
    Failed { status: ExitStatus, stderr: String },
}

#[derive(Debug)]
struct ToolReport {
    stdout: String,
    stderr: String,
    elapsed: Duration,
}

pub fn run(root: &Path, block_file: &Path, block_id: Option<&str>) -> Result<()> {
    let workspace = Workspace::open(root)?;
    let config = ProjectConfig::load(workspace.root())?;
    let plan = load_block_plan(block_file)?;
    let block = select_block(&plan, block_id)?;
    logging::info(format!(
        "refining block {} (第{}-{}章) with {}",
        block.block_id, block.start_chapter, block.end_chapter, config.exec.tool
    ));

    let index = ChapterIndex::scan(&workspace.source_dir())?;
    let selection = index.select_range(block.start_chapter, block.end_chapter);
    if selection.is_empty() {
        return Err(RefinerError::NoMatch(format!(
            "no chapter files for 第{}-{}章",
            block.start_chapter, block.end_chapter
        ))
        .into());
    }
    let merged = merge_chapters(
        &workspace.blocks_dir(),
        &selection,
        block.start_chapter,
        block.end_chapter,
    )?;

    let template = read_text(&config::assets_dir(workspace.root()).join(config::REFINE_TEMPLATE))?;
    let story_context = read_text(&workspace.context_file())?;
    let chapters = read_text(&merged)?;
    let output_dir = workspace.output_dir();
    fs::create_dir_all(&output_dir)
        .with_context(|| format!("failed to create {}", output_dir.display()))?;
    let output_file = output_dir.join(refined_file_name(block.start_chapter, block.end_chapter));

    let prompt = assemble_prompt(&template, &story_context, block, &chapters, &output_file)?;
    let scratch = scratch_dir()?;
    let prompt_file = scratch.join("prompt.txt");
    fs::write(&prompt_file, &prompt)
        .with_context(|| format!("failed to write {}", prompt_file.display()))?;
    logging::verbose(format!("prompt written to {}", prompt_file.display()));

    let report = run_tool(&config.exec, &prompt_file, &scratch)?;
    logging::stage(
        "exec",
        format!("tool finished in {:.1}s", report.elapsed.as_secs_f64()),
    );
    if !report.stdout.trim().is_empty() {
        logging::verbose(format!("tool stdout:\n{}", report.stdout.trim_end()));
    }
    if !report.stderr.trim().is_empty() {
        logging::verbose(format!("tool stderr:\n{}", report.stderr.trim_end()));
    }
    if output_file.is_file() {
        logging::info(format!("refined block written to {}", output_file.display()));
    } else {
        logging::warn(format!(
            "tool exited cleanly but {} was not written",
            output_file.display()
        ));
    }
    Ok(())
}

fn load_block_plan(path: &Path) -> Result<BlockPlan> {
    let raw = read_text(path)?;
    serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse block plan {}", path.display()))
}

fn select_block<'a>(plan: &'a BlockPlan, wanted: Option<&str>) -> Result<&'a BlockRecord> {
    match wanted {
        Some(id) => plan
            .blocks
            .iter()
            .find(|b| b.block_id == id)
            .ok_or_else(|| anyhow!("block {id} not found in plan")),
        None => plan
            .blocks
            .first()
            .ok_or_else(|| anyhow!("block plan contains no blocks")),
    }
}

fn assemble_prompt(
    template: &str,
    story_context: &str,
    block: &BlockRecord,
    chapters: &str,
    output_file: &Path,
) -> Result<String> {
    let block_json = serde_json::to_string_pretty(block)?;
    Ok(format!(
        "{template}\n\n\
         === 1. 【剧情状态表】 (story_context.txt) ===\n{story_context}\n\n\
         === 2. 【剧情块规划】 ===\n{block_json}\n\n\
         === 3. 【待精炼原文】 (第{}-{}章) ===\n{chapters}\n\n\
         === 4. 【输出要求】 ===\n将精炼成品完整写入: {}\n",
        block.start_chapter,
        block.end_chapter,
        output_file.display(),
    ))
}

fn scratch_dir() -> Result<PathBuf> {
    let dir = env::temp_dir().join("novel-refiner");
    fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", dir.display()))?;
    Ok(dir)
}

fn run_tool(exec: &ExecConfig, prompt_file: &Path, scratch: &Path) -> Result<ToolReport> {
    // capture to files, not pipes, so the poll loop needs no drain threads
    let stdout_path = scratch.join("stdout.log");
    let stderr_path = scratch.join("stderr.log");
    let stdin = File::open(prompt_file)
        .with_context(|| format!("failed to open {}", prompt_file.display()))?;
    let stdout = File::create(&stdout_path)
        .with_context(|| format!("failed to create {}", stdout_path.display()))?;
    let stderr = File::create(&stderr_path)
        .with_context(|| format!("failed to create {}", stderr_path.display()))?;

    let started = Instant::now();
    let mut child = match Command::new(&exec.tool)
        .args(&exec.args)
        .stdin(Stdio::from(stdin))
        .stdout(Stdio::from(stdout))
        .stderr(Stdio::from(stderr))
        .spawn()
    {
        Ok(child) => child,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return Err(ToolFailure::Missing(exec.tool.clone()).into());
        }
        Err(err) => {
            return Err(err).with_context(|| format!("failed to launch {}", exec.tool));
        }
    };

    let deadline = started + Duration::from_secs(exec.timeout_secs);
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if Instant::now() >= deadline {
            child.kill().ok();
            child.wait().ok();
            return Err(ToolFailure::Timeout(exec.timeout_secs).into());
        }
        thread::sleep(POLL_INTERVAL);
    };

    let elapsed = started.elapsed();
    let stdout = fs::read_to_string(&stdout_path).unwrap_or_default();
    let stderr = fs::read_to_string(&stderr_path).unwrap_or_default();
    if !status.success() {
        return Err(ToolFailure::Failed {
            status,
            stderr: tail(&stderr, STDERR_TAIL_CHARS),
        }
        .into());
    }
    Ok(ToolReport {
        stdout,
        stderr,
        elapsed,
    })
}

fn tail(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    let count = trimmed.chars().count();
    if count <= max_chars {
        return trimmed.to_string();
    }
    trimmed.chars().skip(count - max_chars).collect()
}
