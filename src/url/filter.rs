/// File suffixes that never lead to an importable page
const SKIP_SUFFIXES: &[&str] = &[
    // images
    ".jpg", ".jpeg", ".png", ".gif", ".svg", ".ico", ".webp", ".bmp",
    // documents and archives
    ".pdf", ".zip", ".tar", ".gz", ".rar", ".7z",
    // media
    ".mp4", ".avi", ".mov", ".webm", ".mp3", ".wav",
    // page assets
    ".css", ".js", ".woff", ".woff2", ".ttf", ".eot",
    // binaries
    ".exe", ".dmg",
];

/// Substrings marking internal endpoints or non-navigational links
const SKIP_PATTERNS: &[&str] = &[
    "/api/",
    "/static/",
    "/assets/",
    "mailto:",
    "tel:",
    "javascript:",
];

/// Returns true if the URL must not be crawled or imported
///
/// Pure predicate over the lowercased URL string.
///
/// # Examples
///
/// ```
/// use site_ingest::url::should_skip;
///
/// assert!(should_skip("https://x.com/img.png"));
/// assert!(should_skip("https://x.com/api/v1/x"));
/// assert!(!should_skip("https://x.com/docs/intro"));
/// ```
pub fn should_skip(url: &str) -> bool {
    let lower = url.to_lowercase();

    SKIP_SUFFIXES.iter().any(|ext| lower.ends_with(ext))
        || SKIP_PATTERNS.iter().any(|pattern| lower.contains(pattern))
}
