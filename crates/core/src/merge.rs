use std::fs;
use std::path::{Path, PathBuf};

use crate::chapter::ChapterEntry;
use crate::error::Result;
use crate::read::read_text;
use crate::sanitize::sanitize;

pub fn merged_file_name(start: u32, end: u32) -> String {
    format!("第{start}-{end}章_合并.txt")
}

pub fn merge_chapters(
    blocks_dir: &Path,
    selection: &[ChapterEntry],
    start: u32,
    end: u32,
) -> Result<PathBuf> {
    fs::create_dir_all(blocks_dir)?;
    let target = blocks_dir.join(merged_file_name(start, end));
    if is_fresh(&target, selection) {
        tracing::debug!(path = %target.display(), "reusing merged block");
        return Ok(target);
    }

    let mut merged = String::new();
    for entry in selection {
        let stem = entry
            .path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        merged.push_str(&format!("===== {stem} =====\n\n"));
        let text = sanitize(&read_text(&entry.path)?);
        merged.push_str(text.trim_end());
        merged.push_str("\n\n");
    }
    fs::write(&target, &merged)?;
    tracing::debug!(
        path = %target.display(),
        chapters = selection.len(),
        "wrote merged block"
    );
    Ok(target)
}

fn is_fresh(target: &Path, selection: &[ChapterEntry]) -> bool {
    let Ok(target_mtime) = fs::metadata(target).and_then(|m| m.modified()) else {
        return false;
    };
    selection.iter().all(|entry| {
        match fs::metadata(&entry.path).and_then(|m| m.modified()) {
            Ok(mtime) => mtime <= target_mtime,
            Err(_) => false,
        }
    })
}
