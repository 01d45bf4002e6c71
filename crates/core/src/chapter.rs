use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use walkdir::WalkDir;

use crate::error::{RefinerError, Result};
use crate::read::read_text;

const UNNUMBERED: u32 = u32::MAX;

static CHAPTER_FILE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^第(\d+)-").expect("valid regex"));

static NAME_RANGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"第(\d+)-(\d+)章").expect("valid regex"));

#[derive(Debug, Clone)]
pub struct ChapterEntry {
    pub number: u32,
    pub title: String,
    pub path: PathBuf,
}

#[derive(Debug, Default)]
pub struct ChapterIndex {
    entries: Vec<ChapterEntry>,
}

impl ChapterIndex {
    pub fn scan(source_dir: &Path) -> Result<Self> {
        let mut entries = Vec::new();
        for entry in WalkDir::new(source_dir).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str() else {
                continue;
            };
            if !name.ends_with(".txt") {
                continue;
            }
            let Some(caps) = CHAPTER_FILE.captures(name) else {
                continue;
            };
            let number = caps
                .get(1)
                .and_then(|m| m.as_str().parse::<u32>().ok())
                .unwrap_or(UNNUMBERED);
            entries.push(ChapterEntry {
                number,
                title: title_from_name(name),
                path: entry.path().to_path_buf(),
            });
        }
        entries.sort_by(|a, b| a.number.cmp(&b.number).then_with(|| a.path.cmp(&b.path)));
        tracing::debug!(chapters = entries.len(), "scanned chapter files");
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[ChapterEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn select_range(&self, start: u32, end: u32) -> Vec<ChapterEntry> {
        self.entries
            .iter()
            .filter(|e| e.number >= start && e.number <= end)
            .cloned()
            .collect()
    }

    pub fn select_budgeted(&self, start: u32, count: usize, max_chars: usize) -> Vec<ChapterEntry> {
        let mut selected: Vec<ChapterEntry> = Vec::new();
        let mut total_chars = 0usize;
        for entry in self.entries.iter().filter(|e| e.number >= start) {
            if selected.len() >= count {
                break;
            }
            let Ok(text) = read_text(&entry.path) else {
                tracing::warn!(path = %entry.path.display(), "skipping unreadable chapter");
                continue;
            };
            let chars = text.chars().count();
            if total_chars + chars > max_chars && !selected.is_empty() {
                tracing::debug!(
                    kept = selected.len(),
                    "character budget reached, truncating selection"
                );
                break;
            }
            total_chars += chars;
            selected.push(entry.clone());
        }
        selected
    }
}

fn title_from_name(name: &str) -> String {
    let stem = name.strip_suffix(".txt").unwrap_or(name);
    match stem.split_once('-') {
        Some((_, title)) => title.to_string(),
        None => stem.to_string(),
    }
}

pub fn parse_range_from_name(name: &str) -> Result<(u32, u32)> {
    let caps = NAME_RANGE
        .captures(name)
        .ok_or_else(|| RefinerError::ParseRange(name.to_string()))?;
    let start = caps
        .get(1)
        .and_then(|m| m.as_str().parse::<u32>().ok())
        .ok_or_else(|| RefinerError::ParseRange(name.to_string()))?;
    let end = caps
        .get(2)
        .and_then(|m| m.as_str().parse::<u32>().ok())
        .ok_or_else(|| RefinerError::ParseRange(name.to_string()))?;
    Ok((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_chapter(dir: &Path, number: u32, title: &str, body: &str) {
        fs::write(dir.join(format!("第{number:04}-{title}.txt")), body).unwrap();
    }

    #[test]
    fn scan_sorts_by_number_across_books() {
        let dir = tempfile::tempdir().unwrap();
        let book_a = dir.path().join("book_a");
        let book_b = dir.path().join("book_b");
        fs::create_dir_all(&book_a).unwrap();
        fs::create_dir_all(&book_b).unwrap();
        write_chapter(&book_b, 3, "第三章", "c");
        write_chapter(&book_a, 1, "第一章", "a");
        write_chapter(&book_a, 2, "第二章", "b");
        fs::write(book_a.join("notes.md"), "ignored").unwrap();
        fs::write(book_a.join("草稿.txt"), "ignored, no prefix").unwrap();

        let index = ChapterIndex::scan(dir.path()).unwrap();
        let numbers: Vec<u32> = index.entries().iter().map(|e| e.number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(index.entries()[0].title, "第一章");
    }

    #[test]
    fn scan_of_missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let index = ChapterIndex::scan(&dir.path().join("absent")).unwrap();
        assert!(index.is_empty());
    }

    #[test]
    fn select_range_is_inclusive() {
        let dir = tempfile::tempdir().unwrap();
        for n in 1..=9 {
            write_chapter(dir.path(), n, "题", "正文");
        }
        let index = ChapterIndex::scan(dir.path()).unwrap();
        let picked = index.select_range(3, 5);
        let numbers: Vec<u32> = picked.iter().map(|e| e.number).collect();
        assert_eq!(numbers, vec![3, 4, 5]);
    }

    #[test]
    fn select_budgeted_respects_count() {
        let dir = tempfile::tempdir().unwrap();
        for n in 1..=9 {
            write_chapter(dir.path(), n, "题", "正文");
        }
        let index = ChapterIndex::scan(dir.path()).unwrap();
        let picked = index.select_budgeted(4, 3, 100_000);
        let numbers: Vec<u32> = picked.iter().map(|e| e.number).collect();
        assert_eq!(numbers, vec![4, 5, 6]);
    }

    #[test]
    fn select_budgeted_stops_at_char_budget() {
        let dir = tempfile::tempdir().unwrap();
        for n in 1..=5 {
            write_chapter(dir.path(), n, "题", &"字".repeat(40));
        }
        let index = ChapterIndex::scan(dir.path()).unwrap();
        let picked = index.select_budgeted(1, 5, 100);
        assert_eq!(picked.len(), 2);
    }

    #[test]
    fn select_budgeted_always_takes_first_candidate() {
        let dir = tempfile::tempdir().unwrap();
        write_chapter(dir.path(), 1, "题", &"字".repeat(500));
        let index = ChapterIndex::scan(dir.path()).unwrap();
        let picked = index.select_budgeted(1, 5, 100);
        assert_eq!(picked.len(), 1);
    }

    #[test]
    fn select_past_the_end_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        write_chapter(dir.path(), 1, "题", "正文");
        let index = ChapterIndex::scan(dir.path()).unwrap();
        assert!(index.select_budgeted(50, 10, 100_000).is_empty());
        assert!(index.select_range(50, 60).is_empty());
    }

    #[test]
    fn parses_range_from_artifact_names() {
        assert_eq!(parse_range_from_name("第10-24章_剧情块.json").unwrap(), (10, 24));
        assert_eq!(parse_range_from_name("第1-50章_合并.txt").unwrap(), (1, 50));
        let err = parse_range_from_name("规划.json").unwrap_err();
        assert!(matches!(err, RefinerError::ParseRange(_)));
    }
}
