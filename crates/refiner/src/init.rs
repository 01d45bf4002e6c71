use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use glob::Pattern;

use refiner_core::{
    is_split_name, split_manuscript, RefinerError, SplitOutcome, SplitSettings, Workspace,
};

use crate::config::{self, ProjectConfig};
use crate::logging;

const MANUSCRIPT_PATTERN: &str = "*.txt";

pub fn run(root: &Path) -> Result<()> {
    run_with(root, |manuscript, source, archive, settings| {
        split_manuscript(manuscript, source, archive, settings)
    })
}

fn run_with<F>(root: &Path, split_fn: F) -> Result<()>
where
    F: Fn(&Path, &Path, &Path, &SplitSettings) -> refiner_core::Result<SplitOutcome>,
{
    let workspace = Workspace::create(root)?;
    let config = ProjectConfig::load(workspace.root())?;
    logging::info(format!(
        "initializing project at {}",
        workspace.root().display()
    ));
    workspace.ensure_dirs()?;

    let settings = config.split_settings();
    let manuscripts = discover_manuscripts(&workspace.source_dir(), settings.min_file_bytes)?;
    if manuscripts.is_empty() {
        logging::info("no oversized manuscripts to split");
    }
    let mut split = 0usize;
    for manuscript in manuscripts {
        match split_fn(
            &manuscript,
            &workspace.source_dir(),
            &workspace.archive_dir(),
            &settings,
        ) {
            Ok(outcome) => {
                logging::stage(
                    "split",
                    format!(
                        "{} -> {} chapter(s) under {}",
                        manuscript.display(),
                        outcome.chapters,
                        outcome.book_dir.display()
                    ),
                );
                split += 1;
            }
            Err(err @ (RefinerError::NoMatch(_) | RefinerError::Decode(_))) => {
                logging::warn(format!("skipping {}: {err}", manuscript.display()));
            }
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to split {}", manuscript.display()));
            }
        }
    }

    seed_context(&workspace)?;
    logging::info(format!("project ready, split {split} manuscript(s)"));
    Ok(())
}

fn discover_manuscripts(source_dir: &Path, min_file_bytes: u64) -> Result<Vec<PathBuf>> {
    let pattern = Pattern::new(MANUSCRIPT_PATTERN).map_err(|e| anyhow!(e.msg))?;
    let mut manuscripts = Vec::new();
    for entry in fs::read_dir(source_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if !pattern.matches(name) || is_split_name(name) {
            continue;
        }
        if entry.metadata()?.len() <= min_file_bytes {
            logging::verbose(format!("leaving small manuscript alone: {name}"));
            continue;
        }
        manuscripts.push(entry.path());
    }
    manuscripts.sort();
    Ok(manuscripts)
}

fn seed_context(workspace: &Workspace) -> Result<()> {
    let context = workspace.context_file();
    if context.is_file() {
        logging::verbose("story context already present");
        return Ok(());
    }
    let template = config::assets_dir(workspace.root()).join(config::CONTEXT_TEMPLATE);
    if template.is_file() {
        fs::copy(&template, &context)
            .with_context(|| format!("failed to copy {}", template.display()))?;
        logging::info("seeded story_context.txt from template");
    } else {
        logging::warn(format!(
            "context template not found at {}, skipping seed",
            template.display()
        ));
    }
    Ok(())
}
