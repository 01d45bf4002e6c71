use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{RefinerError, Result};

pub const SOURCE_DIR: &str = "小说原文";
pub const BLOCKS_DIR: &str = "剧情块";
pub const OUTPUT_DIR: &str = "精炼成品";
pub const ARCHIVE_DIR: &str = "_archive";
pub const CONTEXT_FILE: &str = "story_context.txt";

#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn open(root: &Path) -> Result<Self> {
        if !root.is_dir() {
            return Err(RefinerError::NotFound(root.to_path_buf()));
        }
        let root = root.canonicalize()?;
        Ok(Self { root })
    }

    pub fn create(root: &Path) -> Result<Self> {
        fs::create_dir_all(root)?;
        Self::open(root)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn source_dir(&self) -> PathBuf {
        self.root.join(SOURCE_DIR)
    }

    pub fn blocks_dir(&self) -> PathBuf {
        self.root.join(BLOCKS_DIR)
    }

    pub fn output_dir(&self) -> PathBuf {
        self.root.join(OUTPUT_DIR)
    }

    pub fn archive_dir(&self) -> PathBuf {
        self.root.join(ARCHIVE_DIR)
    }

    pub fn context_file(&self) -> PathBuf {
        self.root.join(CONTEXT_FILE)
    }

    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [
            self.source_dir(),
            self.blocks_dir(),
            self.output_dir(),
            self.archive_dir(),
        ] {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}
