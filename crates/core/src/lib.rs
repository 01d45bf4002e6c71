mod chapter;
mod error;
mod merge;
mod read;
mod sanitize;
mod segment;
mod workspace;

pub use chapter::{parse_range_from_name, ChapterEntry, ChapterIndex};
pub use error::{RefinerError, Result};
pub use merge::{merge_chapters, merged_file_name};
pub use read::read_text;
pub use sanitize::sanitize;
pub use segment::{
    chapter_file_name, is_split_name, segment_text, split_manuscript, ChapterPart, SplitOutcome,
    SplitSettings, PREFACE_TITLE,
};
pub use workspace::{
    Workspace, ARCHIVE_DIR, BLOCKS_DIR, CONTEXT_FILE, OUTPUT_DIR, SOURCE_DIR,
};
