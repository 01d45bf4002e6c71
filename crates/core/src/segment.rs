use std::fs;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{RefinerError, Result};
use crate::read::read_text;
use crate::sanitize::sanitize;

pub const PREFACE_TITLE: &str = "前言/序章";

const UNSAFE_NAME_CHARS: [char; 9] = ['\\', '/', '*', '?', ':', '"', '<', '>', '|'];

const TITLE_MAX_CHARS: usize = 30;

static STRATEGIES: Lazy<[Regex; 3]> = Lazy::new(|| {
    [
        Regex::new(r"(?:^|\n|\s)(第[零一二三四五六七八九十百千万]+章[^\n]*)").expect("valid regex"),
        Regex::new(r"(?:^|\n|\s)(第\d+章[^\n]*)").expect("valid regex"),
        Regex::new(r"(?:^|\n|\s)((?:第[零一二三四五六七八九十百千万]+|第\d+)[章节卷集部][^\n]*)")
            .expect("valid regex"),
    ]
});

static SPLIT_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"第\d+-").expect("valid regex"));

#[derive(Debug, Clone, Copy)]
pub struct SplitSettings {
    pub min_heading_matches: usize,
    pub min_file_bytes: u64,
}

impl Default for SplitSettings {
    fn default() -> Self {
        Self {
            min_heading_matches: 5,
            min_file_bytes: 50 * 1024,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChapterPart {
    pub title: String,
    pub body: String,
}

#[derive(Debug)]
pub struct SplitOutcome {
    pub book_dir: PathBuf,
    pub chapters: usize,
    pub archived: PathBuf,
}

pub fn is_split_name(name: &str) -> bool {
    SPLIT_NAME.is_match(name)
}

pub fn segment_text(content: &str, settings: &SplitSettings) -> Result<Vec<ChapterPart>> {
    for pattern in STRATEGIES.iter() {
        let matches: Vec<(usize, String)> = pattern
            .captures_iter(content)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let title = caps.get(1)?;
                Some((whole.start(), title.as_str().trim().to_string()))
            })
            .collect();
        if matches.len() <= settings.min_heading_matches {
            continue;
        }
        tracing::debug!(
            headings = matches.len(),
            pattern = pattern.as_str(),
            "accepted heading pattern"
        );

        let mut parts = Vec::with_capacity(matches.len() + 1);
        if matches[0].0 > 0 {
            parts.push(ChapterPart {
                title: PREFACE_TITLE.to_string(),
                body: content[..matches[0].0].to_string(),
            });
        }
        for (i, (start, title)) in matches.iter().enumerate() {
            let end = match matches.get(i + 1) {
                Some((next, _)) => *next,
                None => content.len(),
            };
            parts.push(ChapterPart {
                title: title.clone(),
                body: content[*start..end].to_string(),
            });
        }
        return Ok(parts);
    }
    Err(RefinerError::NoMatch(
        "no heading pattern matched often enough to split".to_string(),
    ))
}

pub fn chapter_file_name(seq: usize, title: &str) -> String {
    let clipped: String = title.chars().take(TITLE_MAX_CHARS).collect();
    let safe: String = clipped
        .chars()
        .filter(|c| !UNSAFE_NAME_CHARS.contains(c))
        .collect();
    format!("第{seq:04}-{}.txt", safe.trim())
}

pub fn split_manuscript(
    manuscript: &Path,
    source_dir: &Path,
    archive_dir: &Path,
    settings: &SplitSettings,
) -> Result<SplitOutcome> {
    let raw = read_text(manuscript)?;
    let content = sanitize(&raw);
    let parts = segment_text(&content, settings)?;

    let stem = manuscript
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("book");
    let book_dir = source_dir.join(stem.replace(' ', "_"));
    fs::create_dir_all(&book_dir)?;
    for (idx, part) in parts.iter().enumerate() {
        let path = book_dir.join(chapter_file_name(idx + 1, &part.title));
        fs::write(&path, &part.body)?;
    }

    fs::create_dir_all(archive_dir)?;
    let original_name = manuscript
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("manuscript.txt");
    let archived = archive_dir.join(format!("raw_{original_name}"));
    fs::rename(manuscript, &archived)?;

    tracing::debug!(
        book = %book_dir.display(),
        chapters = parts.len(),
        "split manuscript"
    );
    Ok(SplitOutcome {
        book_dir,
        chapters: parts.len(),
        archived,
    })
}
