//! Spreadsheet CSV export source

use super::traits::SourceProvider;
use crate::config::SheetConfig;
use crate::error::{Error, Result};
use crate::utils::{is_http_url, normalize_source};
use async_trait::async_trait;
use std::collections::HashSet;

/// Reads sources from a spreadsheet published as CSV
///
/// Works with any HTTP endpoint serving CSV, e.g. a Google Sheet exported via
/// `.../export?format=csv` or published with `output=csv`.
pub struct SheetSource {
    http_client: reqwest::Client,
    csv_url: String,
    column: Option<String>,
}

impl SheetSource {
    /// Create a sheet source
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created
    pub fn new(config: SheetConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("piu-queue/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            csv_url: config.csv_url,
            column: config.column,
        })
    }

    /// URL of the CSV export
    pub fn url(&self) -> &str {
        &self.csv_url
    }
}

#[async_trait]
impl SourceProvider for SheetSource {
    async fn fetch(&self) -> Result<Vec<String>> {
        tracing::debug!(url = %self.csv_url, "Fetching sheet export");

        let response = self.http_client.get(&self.csv_url).send().await?;

        // Check HTTP status before trying to parse the response body
        let status = response.status();
        if !status.is_success() {
            return Err(Error::SourceStatus {
                status: status.as_u16(),
                url: self.csv_url.clone(),
            });
        }

        let body = response.text().await?;
        let rows = parse_csv(&body);
        let sources = extract_sources(&rows, self.column.as_deref())?;

        tracing::debug!(
            url = %self.csv_url,
            rows = rows.len(),
            sources = sources.len(),
            "Parsed sheet export"
        );
        Ok(sources)
    }

    fn name(&self) -> &'static str {
        "sheet"
    }
}

/// Split CSV text into rows of fields
///
/// Handles quoted fields, doubled quotes inside quotes, line breaks inside
/// quoted fields and both LF and CRLF row endings. A leading byte order mark is
/// ignored.
pub fn parse_csv(text: &str) -> Vec<Vec<String>> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                _ => field.push(c),
            }
            continue;
        }

        match c {
            '"' => in_quotes = true,
            ',' => row.push(std::mem::take(&mut field)),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' | '\r' => {
                row.push(std::mem::take(&mut field));
                rows.push(std::mem::take(&mut row));
            }
            _ => field.push(c),
        }
    }

    // Last row without trailing newline
    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        rows.push(row);
    }

    rows
}

/// Pick http(s) sources out of parsed rows, de-duplicated in sheet order
///
/// With `column`, the first row is the header and only that column is read
/// (header match is case-insensitive). Without it, every cell is scanned.
fn extract_sources(rows: &[Vec<String>], column: Option<&str>) -> Result<Vec<String>> {
    let cells: Vec<&String> = match column {
        Some(name) => {
            let Some((header, data)) = rows.split_first() else {
                return Ok(Vec::new());
            };
            let wanted = name.trim();
            let index = header
                .iter()
                .position(|cell| cell.trim().eq_ignore_ascii_case(wanted))
                .ok_or_else(|| {
                    Error::Source(format!("column '{}' not found in sheet header", wanted))
                })?;
            data.iter().filter_map(|row| row.get(index)).collect()
        }
        None => rows.iter().flatten().collect(),
    };

    let mut seen = HashSet::new();
    Ok(cells
        .into_iter()
        .filter_map(|cell| normalize_source(cell))
        .filter(|source| is_http_url(source))
        .filter(|source| seen.insert(source.clone()))
        .collect())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::IsRetryable;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SHEET: &str = "Title,URL,Notes\r\n\
        Talk,https://youtu.be/aaa,\"first, with comma\"\r\n\
        Demo,https://youtu.be/bbb,\"multi\nline\"\r\n\
        Dup,https://youtu.be/aaa,\r\n\
        Blank,,\r\n\
        Text,not a url,see https://example.com/ignored\r\n";

    fn sheet_config(url: String, column: Option<&str>) -> SheetConfig {
        SheetConfig {
            csv_url: url,
            column: column.map(str::to_string),
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn parse_csv_handles_quotes_and_line_endings() {
        let rows = parse_csv("a,\"b,c\",\"say \"\"hi\"\"\"\r\n\"x\ny\",z\nlast");
        assert_eq!(
            rows,
            vec![
                vec!["a", "b,c", "say \"hi\""],
                vec!["x\ny", "z"],
                vec!["last"],
            ]
        );
    }

    #[test]
    fn parse_csv_skips_bom_and_keeps_empty_fields() {
        let rows = parse_csv("\u{feff}h1,h2\n,\n");
        assert_eq!(rows, vec![vec!["h1", "h2"], vec!["", ""]]);
        assert!(parse_csv("").is_empty());
    }

    #[test]
    fn extract_from_named_column_is_case_insensitive() {
        let rows = parse_csv(SHEET);
        let sources = extract_sources(&rows, Some(" url ")).unwrap();
        assert_eq!(sources, vec!["https://youtu.be/aaa", "https://youtu.be/bbb"]);
    }

    #[test]
    fn extract_without_column_scans_every_cell() {
        let rows = parse_csv("https://a.example/1,x\nhttps://b.example/2, https://a.example/1 \n");
        let sources = extract_sources(&rows, None).unwrap();
        assert_eq!(sources, vec!["https://a.example/1", "https://b.example/2"]);
    }

    #[test]
    fn missing_column_is_source_error() {
        let rows = parse_csv(SHEET);
        let err = extract_sources(&rows, Some("Link")).unwrap_err();
        assert!(matches!(err, Error::Source(ref msg) if msg.contains("Link")));
        assert!(!err.is_retryable());

        // A column name that reads like a server error is still permanent
        let err = extract_sources(&rows, Some("HTTP 500 mirror")).unwrap_err();
        assert!(matches!(err, Error::Source(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn empty_sheet_with_column_yields_nothing() {
        assert!(extract_sources(&[], Some("URL")).unwrap().is_empty());
    }

    #[tokio::test]
    async fn fetch_reads_sources_from_export() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/export"))
            .respond_with(ResponseTemplate::new(200).set_body_string(SHEET))
            .mount(&mock_server)
            .await;

        let source = SheetSource::new(sheet_config(
            format!("{}/export", mock_server.uri()),
            Some("URL"),
        ))
        .unwrap();

        let sources = source.fetch().await.unwrap();
        assert_eq!(sources, vec!["https://youtu.be/aaa", "https://youtu.be/bbb"]);
    }

    #[tokio::test]
    async fn server_error_is_retryable_status_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/export"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;

        let source =
            SheetSource::new(sheet_config(format!("{}/export", mock_server.uri()), None)).unwrap();

        let err = source.fetch().await.unwrap_err();
        assert!(matches!(err, Error::SourceStatus { status: 503, .. }), "got {:?}", err);
        assert!(err.to_string().contains("HTTP 503"));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn not_found_is_permanent() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/export"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let source =
            SheetSource::new(sheet_config(format!("{}/export", mock_server.uri()), None)).unwrap();

        let err = source.fetch().await.unwrap_err();
        assert!(matches!(err, Error::SourceStatus { status: 404, .. }), "got {:?}", err);
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn unreachable_host_is_network_error() {
        // Port 9 on localhost is the discard service and is almost never listening
        let source =
            SheetSource::new(sheet_config("http://127.0.0.1:9/export".to_string(), None)).unwrap();

        let err = source.fetch().await.unwrap_err();
        assert!(matches!(err, Error::Network(_)), "got {:?}", err);
    }
}
