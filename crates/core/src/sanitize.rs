use once_cell::sync::Lazy;
use regex::Regex;

const AD_MARKERS: [&str; 2] = ["Fanqie-novel-Downloader", "免费下载器下载"];

static CONTROL_CHARS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[\u{200B}-\u{200F}\u{202A}-\u{202E}\u{2060}-\u{206F}\u{061C}]")
        .expect("valid regex")
});

pub fn sanitize(content: &str) -> String {
    let mut kept: Vec<&str> = Vec::new();
    let mut dropped = 0usize;
    for line in content.lines() {
        if AD_MARKERS.iter().any(|marker| line.contains(marker)) {
            dropped += 1;
            continue;
        }
        kept.push(line);
    }
    if dropped > 0 {
        tracing::info!("dropped {dropped} advertisement line(s)");
    }
    let joined = kept.join("\n");
    CONTROL_CHARS.replace_all(&joined, "").into_owned()
}
