//! Parser for yt-dlp stdout
//!
//! The downloader asks yt-dlp for two machine-readable line kinds via
//! `--progress-template` and `--print`, each prefixed with a marker so they can
//! be told apart from regular log output.

use regex::Regex;
use std::path::PathBuf;
use std::sync::LazyLock;

/// Prefix of progress lines produced by the progress template
pub(crate) const PROGRESS_MARKER: &str = "piu-progress:";

/// Prefix of the final file path line printed after post-processing
pub(crate) const OUTPUT_MARKER: &str = "piu-output:";

static ANSI_ESCAPE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"\x1b\[[0-9;]*[A-Za-z]").unwrap()
});

static PERCENT: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"^\s*(\d{1,3}(?:\.\d+)?)\s*%").unwrap()
});

/// A classified line of yt-dlp stdout
#[derive(Debug, Clone, PartialEq)]
pub enum OutputLine {
    /// Download progress in percent
    Progress(f32),
    /// Final path of the produced file
    OutputPath(PathBuf),
    /// Anything else (log output, warnings, unknown progress values)
    Other,
}

/// Classify one line of yt-dlp stdout
pub fn parse_line(line: &str) -> OutputLine {
    let cleaned = ANSI_ESCAPE.replace_all(line, "");
    let cleaned = cleaned.trim();

    if let Some(rest) = cleaned.strip_prefix(PROGRESS_MARKER) {
        return PERCENT
            .captures(rest)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<f32>().ok())
            .map(OutputLine::Progress)
            .unwrap_or(OutputLine::Other);
    }

    if let Some(rest) = cleaned.strip_prefix(OUTPUT_MARKER) {
        let path = rest.trim();
        if !path.is_empty() && path != "NA" {
            return OutputLine::OutputPath(PathBuf::from(path));
        }
    }

    OutputLine::Other
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_with_decimal() {
        assert_eq!(parse_line("piu-progress:  45.2%"), OutputLine::Progress(45.2));
    }

    #[test]
    fn progress_integer() {
        assert_eq!(parse_line("piu-progress:100%"), OutputLine::Progress(100.0));
    }

    #[test]
    fn progress_with_color_codes() {
        assert_eq!(
            parse_line("piu-progress:\x1b[0;94m 12.5%\x1b[0m"),
            OutputLine::Progress(12.5)
        );
    }

    #[test]
    fn unknown_progress_is_other() {
        assert_eq!(parse_line("piu-progress:Unknown %"), OutputLine::Other);
        assert_eq!(parse_line("piu-progress:"), OutputLine::Other);
    }

    #[test]
    fn output_path_line() {
        assert_eq!(
            parse_line("piu-output:/downloads/Talk [abc123].mp4\n"),
            OutputLine::OutputPath(PathBuf::from("/downloads/Talk [abc123].mp4"))
        );
    }

    #[test]
    fn missing_output_path_is_other() {
        assert_eq!(parse_line("piu-output:NA"), OutputLine::Other);
        assert_eq!(parse_line("piu-output:   "), OutputLine::Other);
    }

    #[test]
    fn regular_log_lines_are_other() {
        assert_eq!(
            parse_line("[youtube] abc123: Downloading webpage"),
            OutputLine::Other
        );
        assert_eq!(parse_line(""), OutputLine::Other);
    }
}
