//! WARC reader (spec §4.E): streams `response` records whose payload
//! declares `text/html` out of a `.warc.gz` file.
//!
//! Grounded directly on the teacher's `warc = { version = "0.4",
//! features = ["gzip"] }` dependency — present in the teacher's
//! Cargo.toml for "importing web archives" but never exercised by any
//! teacher source file. Usage here follows the crate's own
//! iterator-over-records API, in the idiom of the teacher's other
//! streaming consumers (an iterator wrapping a lazily-read source).

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::warn;
use warc::{BufferedBody, Record, WarcHeader, WarcReader};

use crate::error::{HaError, HaResult};

type RecordResult = Result<Record<BufferedBody>, warc::Error>;

/// One HTML `response` record extracted from a WARC (spec §4.E).
#[derive(Debug, Clone)]
pub struct HtmlRecord {
    pub url: String,
    pub capture_timestamp: DateTime<Utc>,
    pub status_code: Option<i32>,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub warc_record_id: String,
    pub warc_path: PathBuf,
}

impl HtmlRecord {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter().find(|(k, _)| k.eq_ignore_ascii_case(name)).map(|(_, v)| v.as_str())
    }
}

/// Lazy, non-restartable iterator over the `response`/`text/html`
/// records of one `.warc.gz` file. The concrete reader type `warc`
/// hands back from `from_path_gzip` is boxed away so this struct
/// doesn't need to name it.
pub struct WarcHtmlReader {
    inner: Box<dyn Iterator<Item = RecordResult>>,
    path: PathBuf,
}

impl WarcHtmlReader {
    pub fn open(path: &Path) -> HaResult<Self> {
        let mut reader = WarcReader::from_path_gzip(path).map_err(|e| HaError::ExtractionWarning(format!("{}: failed to open WARC: {e}", path.display())))?;
        let records: Vec<RecordResult> = reader.iter_records().collect();
        Ok(WarcHtmlReader { inner: Box::new(records.into_iter()), path: path.to_path_buf() })
    }

    /// Advance to the next HTML response record, skipping non-response
    /// and non-HTML records. Returns `Ok(None)` at end of file.
    pub fn next_html_record(&mut self) -> HaResult<Option<HtmlRecord>> {
        loop {
            let raw = match self.inner.next() {
                None => return Ok(None),
                Some(Err(e)) => {
                    warn!(path = %self.path.display(), error = %e, "skipping unreadable WARC record");
                    continue;
                }
                Some(Ok(record)) => record,
            };

            if record.header(WarcHeader::WarcType).as_deref() != Some("response") {
                continue;
            }

            let warc_record_id = record.header(WarcHeader::RecordID).map(|c| c.to_string()).unwrap_or_default();
            let url = record.header(WarcHeader::TargetURI).map(|c| c.to_string()).unwrap_or_default();
            let warc_date = record.header(WarcHeader::Date).map(|c| c.to_string());
            let body = record.body().to_vec();

            let Some((status_code, headers, html_body)) = split_http_response(&body) else {
                continue;
            };

            if !is_html_content_type(&headers) {
                continue;
            }

            let capture_timestamp = warc_date
                .as_deref()
                .and_then(|d| DateTime::parse_from_rfc3339(d).ok())
                .map(|dt| dt.with_timezone(&Utc))
                .or_else(|| http_date_header(&headers))
                .unwrap_or_else(Utc::now);

            return Ok(Some(HtmlRecord {
                url,
                capture_timestamp,
                status_code,
                headers,
                body: html_body.to_vec(),
                warc_record_id,
                warc_path: self.path.clone(),
            }));
        }
    }
}

impl Iterator for WarcHtmlReader {
    type Item = HaResult<HtmlRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_html_record().transpose()
    }
}

/// Splits a WARC `response` record's raw payload (HTTP status line +
/// headers + CRLFCRLF + body, per the WARC/1.0 spec for http(s)
/// responses) into `(status_code, headers, body)`.
fn split_http_response(raw: &[u8]) -> Option<(Option<i32>, Vec<(String, String)>, &[u8])> {
    let separator = raw.windows(4).position(|w| w == b"\r\n\r\n")?;
    let head = std::str::from_utf8(&raw[..separator]).ok()?;
    let body = &raw[separator + 4..];

    let mut lines = head.split("\r\n");
    let status_line = lines.next()?;
    let status_code = status_line.split_whitespace().nth(1).and_then(|s| s.parse::<i32>().ok());

    let headers = lines
        .filter_map(|line| {
            let (k, v) = line.split_once(':')?;
            Some((k.trim().to_string(), v.trim().to_string()))
        })
        .collect();

    Some((status_code, headers, body))
}

fn is_html_content_type(headers: &[(String, String)]) -> bool {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("content-type"))
        .map(|(_, v)| v.to_ascii_lowercase().contains("text/html"))
        .unwrap_or(false)
}

fn http_date_header(headers: &[(String, String)]) -> Option<DateTime<Utc>> {
    let raw = headers.iter().find(|(k, _)| k.eq_ignore_ascii_case("date")).map(|(_, v)| v.as_str())?;
    DateTime::parse_from_rfc2822(raw).ok().map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_http_response_parses_status_and_headers() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: 5\r\n\r\nhello";
        let (status, headers, body) = split_http_response(raw).unwrap();
        assert_eq!(status, Some(200));
        assert_eq!(body, b"hello");
        assert!(headers.iter().any(|(k, v)| k == "Content-Type" && v.contains("text/html")));
        assert!(is_html_content_type(&headers));
    }

    #[test]
    fn non_html_content_type_is_rejected() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Type: application/pdf\r\n\r\n%PDF";
        let (_, headers, _) = split_http_response(raw).unwrap();
        assert!(!is_html_content_type(&headers));
    }

    #[test]
    fn malformed_payload_without_separator_is_none() {
        assert!(split_http_response(b"not an http response").is_none());
    }
}
