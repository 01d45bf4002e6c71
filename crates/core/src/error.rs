use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RefinerError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("not found: {0:?}")]
    NotFound(PathBuf),
    #[error("no supported encoding decodes {0:?}")]
    Decode(PathBuf),
    #[error("no chapter range in name: {0}")]
    ParseRange(String),
    #[error("no match: {0}")]
    NoMatch(String),
}

pub type Result<T> = std::result::Result<T, RefinerError>;
