//! Small helpers shared by the orchestrator and its collaborators

use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Trim a user- or sheet-provided source string
///
/// Strips surrounding whitespace and a UTF-8 byte order mark. Returns `None`
/// for strings that are empty after trimming.
///
/// # Examples
///
/// ```
/// use piu_queue::utils::normalize_source;
///
/// assert_eq!(normalize_source("  https://youtu.be/x \n").as_deref(), Some("https://youtu.be/x"));
/// assert_eq!(normalize_source("   "), None);
/// ```
pub fn normalize_source(raw: &str) -> Option<String> {
    let trimmed = raw.trim_start_matches('\u{feff}').trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Whether `candidate` parses as an absolute http(s) URL with a host
pub fn is_http_url(candidate: &str) -> bool {
    match url::Url::parse(candidate) {
        Ok(parsed) => {
            matches!(parsed.scheme(), "http" | "https") && parsed.host_str().is_some()
        }
        Err(_) => false,
    }
}

/// Sleep for `duration` unless `cancel` fires first
///
/// Returns `true` if the sleep was cut short by cancellation.
pub async fn sleep_or_cancelled(cancel: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => true,
        _ = tokio::time::sleep(duration) => false,
    }
}

/// Keep only the last `max_lines` non-empty lines of tool output
pub fn tail_lines(text: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(max_lines);
    lines[start..].join("\n")
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_bom_and_whitespace() {
        assert_eq!(
            normalize_source("\u{feff}  http://a  ").as_deref(),
            Some("http://a")
        );
        assert_eq!(normalize_source(""), None);
        assert_eq!(normalize_source("\t\n"), None);
    }

    #[test]
    fn http_url_detection() {
        assert!(is_http_url("https://www.youtube.com/watch?v=abc"));
        assert!(is_http_url("http://a"));
        assert!(!is_http_url("ftp://example.com/file"));
        assert!(!is_http_url("not a url"));
        assert!(!is_http_url("title"));
    }

    #[test]
    fn tail_keeps_last_non_empty_lines() {
        let text = "one\n\ntwo\nthree\n\n";
        assert_eq!(tail_lines(text, 2), "two\nthree");
        assert_eq!(tail_lines(text, 10), "one\ntwo\nthree");
        assert_eq!(tail_lines("", 3), "");
    }

    #[tokio::test]
    async fn sleep_returns_early_on_cancel() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let start = std::time::Instant::now();
        assert!(sleep_or_cancelled(&cancel, Duration::from_secs(30)).await);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn sleep_completes_without_cancel() {
        let cancel = CancellationToken::new();
        assert!(!sleep_or_cancelled(&cancel, Duration::from_millis(10)).await);
    }
}
