use httpdate::fmt_http_date;
use std::time::SystemTime;

use crate::error::OffloadError;

pub fn status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        206 => "Partial Content",
        301 => "Moved Permanently",
        302 => "Found",
        307 => "Temporary Redirect",
        400 => "Bad Request",
        403 => "Forbidden",
        404 => "Not Found",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

// Duplicates the status in a Status: header for CGI-style downstream
// collaborators.
#[allow(clippy::too_many_arguments)]
pub fn build_response_headers(
    status: u16,
    etag: &str,
    last_modified: &str,
    content_length: u64,
    content_type: &str,
    content_range: Option<(u64, u64, u64)>,
    location: Option<&str>,
) -> String {
    let mut out = format!(
        "HTTP/1.1 {status} {text}\r\n\
         Status: {status} {text}\r\n\
         Date: {date}\r\n\
         Server: modoffload\r\n\
         Connection: close\r\n",
        status = status,
        text = status_text(status),
        date = fmt_http_date(SystemTime::now()),
    );

    if let Some(loc) = location {
        out.push_str(&format!("Location: {loc}\r\n"));
    }
    if !etag.is_empty() {
        out.push_str(&format!("ETag: {etag}\r\n"));
    }
    if !last_modified.is_empty() {
        out.push_str(&format!("Last-Modified: {last_modified}\r\n"));
    }
    out.push_str(&format!("Content-Length: {content_length}\r\n"));
    out.push_str("Accept-Ranges: bytes\r\n");
    if !content_type.is_empty() {
        out.push_str(&format!("Content-Type: {content_type}\r\n"));
    }
    if let Some((start, end, total)) = content_range {
        out.push_str(&format!("Content-Range: bytes {start}-{end}/{total}\r\n"));
    }
    out.push_str("\r\n");
    out
}

// Always a header block plus a short plain-text message, never HTML.
pub fn build_error_response(err: &OffloadError) -> String {
    let status = err.status();
    let body = err.message();
    let location = match err {
        OffloadError::Redirect { location, .. } => location.as_deref(),
        _ => None,
    };

    let mut out = format!(
        "HTTP/1.1 {status} {text}\r\n\
         Status: {status} {text}\r\n\
         Date: {date}\r\n\
         Server: modoffload\r\n\
         Connection: close\r\n\
         Content-Type: text/plain\r\n\
         Content-Length: {len}\r\n",
        status = status,
        text = status_text(status),
        date = fmt_http_date(SystemTime::now()),
        len = body.len(),
    );
    if let Some(loc) = location {
        out.push_str(&format!("Location: {loc}\r\n"));
    }
    out.push_str("\r\n");
    out.push_str(&body);
    out
}

pub const ROBOTS_TXT: &str = "User-agent: *\nDisallow: /";

pub fn build_robots_response() -> String {
    format!(
        "HTTP/1.1 200 OK\r\n\
         Status: 200 OK\r\n\
         Date: {date}\r\n\
         Server: modoffload\r\n\
         Connection: close\r\n\
         Content-Type: text/plain\r\n\
         Content-Length: {len}\r\n\
         \r\n{body}",
        date = fmt_http_date(SystemTime::now()),
        len = ROBOTS_TXT.len(),
        body = ROBOTS_TXT,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_content_includes_content_range() {
        let resp = build_response_headers(206, "\"abc\"", "T", 100, "text/plain", Some((100, 199, 1000)), None);
        assert!(resp.starts_with("HTTP/1.1 206 Partial Content\r\n"));
        assert!(resp.contains("Content-Range: bytes 100-199/1000\r\n"));
        assert!(resp.contains("Content-Length: 100\r\n"));
    }

    #[test]
    fn full_response_has_no_content_range() {
        let resp = build_response_headers(200, "\"abc\"", "T", 1000, "text/plain", None, None);
        assert!(!resp.contains("Content-Range"));
    }

    #[test]
    fn error_response_is_plain_text() {
        let err = OffloadError::Forbidden("protected content");
        let resp = build_error_response(&err);
        assert!(resp.starts_with("HTTP/1.1 403 Forbidden\r\n"));
        assert!(resp.contains("Content-Type: text/plain\r\n"));
        assert!(resp.ends_with("protected content"));
    }
}
