use std::env;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing_subscriber::EnvFilter;

static VERBOSE: AtomicBool = AtomicBool::new(false);

pub fn init(enabled: bool) {
    VERBOSE.store(enabled, Ordering::Relaxed);
    let fallback = if enabled { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
    if enabled {
        info("verbose logging enabled");
    }
}

pub fn verbose_enabled() -> bool {
    VERBOSE.load(Ordering::Relaxed)
}

pub fn info(message: impl AsRef<str>) {
    eprintln!("[novel-refiner] {}", message.as_ref());
}

pub fn warn(message: impl AsRef<str>) {
    eprintln!("[novel-refiner] warning: {}", message.as_ref());
}

pub fn stage(stage: &str, message: impl AsRef<str>) {
    eprintln!("[novel-refiner::{}] {}", stage, message.as_ref());
}

pub fn verbose(message: impl AsRef<str>) {
    if verbose_enabled() {
        eprintln!("[novel-refiner::verbose] {}", message.as_ref());
    }
}

pub fn env_flag() -> bool {
    env::var("NOVEL_REFINER_VERBOSE")
        .map(|value| parse_bool(value.trim()))
        .unwrap_or(false)
}

fn parse_bool(raw: &str) -> bool {
    matches!(
        raw.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_truthy_flags() {
        for raw in ["1", "true", "YES", " on "] {
            assert!(parse_bool(raw));
        }
        for raw in ["0", "false", "off", ""] {
            assert!(!parse_bool(raw));
        }
    }
}
