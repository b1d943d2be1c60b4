// SPDX-FileCopyrightText: 2025 The surge Contributors
// SPDX-License-Identifier: GPL-3.0-or-later

use reqwest::header::{ACCEPT_RANGES, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_RANGE, RANGE};
use reqwest::{Client, StatusCode};
use tracing::debug;

use crate::errors::DownloadError;

pub const DEFAULT_FILENAME: &str = "download.bin";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeResult {
    /// Total resource size; `None` when the server would not say.
    pub total: Option<u64>,
    pub accepts_ranges: bool,
    /// Server-suggested filename, from `Content-Disposition`.
    pub filename: Option<String>,
}

/// Discovers size, range support and filename. Tries `HEAD` first; servers
/// that reject it get a one-byte ranged `GET`, whose `Content-Range` carries
/// the total and whose 206 proves range support in one shot.
pub async fn probe(client: &Client, url: &str) -> Result<ProbeResult, DownloadError> {
    if let Ok(resp) = client.head(url).send().await {
        if resp.status().is_success() {
            let headers = resp.headers();
            let total = headers
                .get(CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            let accepts_ranges = headers
                .get(ACCEPT_RANGES)
                .and_then(|v| v.to_str().ok())
                .is_some_and(|v| v.eq_ignore_ascii_case("bytes"));
            let filename = headers
                .get(CONTENT_DISPOSITION)
                .and_then(|v| v.to_str().ok())
                .and_then(filename_from_disposition);
            debug!(url, ?total, accepts_ranges, "HEAD probe succeeded");
            return Ok(ProbeResult {
                total,
                accepts_ranges,
                filename,
            });
        }
        debug!(url, status = %resp.status(), "HEAD rejected, falling back to ranged GET");
    }

    // Ranged GET fallback; the body is a single byte we never read.
    let resp = client
        .get(url)
        .header(RANGE, "bytes=0-0")
        .send()
        .await?;
    let status = resp.status();
    if !status.is_success() {
        return Err(DownloadError::HttpStatus(status.as_u16()));
    }

    let headers = resp.headers();
    let filename = headers
        .get(CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
        .and_then(filename_from_disposition);

    if status == StatusCode::PARTIAL_CONTENT {
        let total = headers
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(total_from_content_range);
        debug!(url, ?total, "ranged probe: server honors ranges");
        return Ok(ProbeResult {
            total,
            accepts_ranges: true,
            filename,
        });
    }

    // Plain 200: the server ignored the range and would send everything.
    let total = headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    debug!(url, ?total, "ranged probe: no range support");
    Ok(ProbeResult {
        total,
        accepts_ranges: false,
        filename,
    })
}

/// Pulls the total out of `Content-Range: bytes 0-0/N`. An unknown total
/// (`*`) yields `None`.
pub fn total_from_content_range(value: &str) -> Option<u64> {
    let (_, total) = value.rsplit_once('/')?;
    total.trim().parse().ok()
}

/// Extracts the `filename=` parameter from a `Content-Disposition` value,
/// quoted or bare.
pub fn filename_from_disposition(value: &str) -> Option<String> {
    for part in value.split(';') {
        let part = part.trim();
        let Some(rest) = part
            .strip_prefix("filename=")
            .or_else(|| part.strip_prefix("FILENAME="))
        else {
            continue;
        };
        let name = rest.trim().trim_matches('"').trim();
        if !name.is_empty() {
            return Some(name.to_string());
        }
    }
    None
}

/// Last path segment of the URL, already percent-decoded by the parser.
pub fn filename_from_url(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let name = parsed.path_segments()?.next_back()?.to_string();
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

/// Filename resolution order: server suggestion, then URL path, then a
/// generic fallback.
pub fn resolve_filename(probed: Option<&str>, url: &str) -> String {
    if let Some(name) = probed {
        return name.to_string();
    }
    filename_from_url(url).unwrap_or_else(|| DEFAULT_FILENAME.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_range_total() {
        assert_eq!(total_from_content_range("bytes 0-0/1000000"), Some(1_000_000));
        assert_eq!(total_from_content_range("bytes 0-0/*"), None);
        assert_eq!(total_from_content_range("garbage"), None);
    }

    #[test]
    fn test_disposition_filename_variants() {
        assert_eq!(
            filename_from_disposition(r#"attachment; filename="report.pdf""#),
            Some("report.pdf".to_string())
        );
        assert_eq!(
            filename_from_disposition("attachment; filename=report.pdf"),
            Some("report.pdf".to_string())
        );
        assert_eq!(
            filename_from_disposition("inline; filename=\"a b.txt\"; size=3"),
            Some("a b.txt".to_string())
        );
        assert_eq!(filename_from_disposition("attachment"), None);
        assert_eq!(filename_from_disposition("attachment; filename=\"\""), None);
    }

    #[test]
    fn test_filename_from_url() {
        assert_eq!(
            filename_from_url("https://host/path/to/file.iso?x=1"),
            Some("file.iso".to_string())
        );
        assert_eq!(filename_from_url("https://host/"), None);
    }

    #[test]
    fn test_resolution_order() {
        assert_eq!(
            resolve_filename(Some("served.bin"), "https://host/path/f.iso"),
            "served.bin"
        );
        assert_eq!(resolve_filename(None, "https://host/path/f.iso"), "f.iso");
        assert_eq!(resolve_filename(None, "https://host/"), DEFAULT_FILENAME);
    }
}
