use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;

use crate::error::OffloadError;

#[derive(Debug, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
}

#[derive(Debug)]
pub struct ClientRequest {
    pub method: Method,
    pub uri: String,
    pub range: Option<String>,
    pub if_range_present: bool,
}

// Rejects any method other than GET/HEAD, and any URI carrying a query string.
fn parse_request_line(line: &str) -> Result<(Method, String), OffloadError> {
    let mut parts = line.trim().split_whitespace();
    let method = parts.next().ok_or(OffloadError::BadRequest("malformed request line"))?;
    let uri = parts.next().ok_or(OffloadError::BadRequest("malformed request line"))?;
    let _version = parts.next().ok_or(OffloadError::BadRequest("malformed request line"))?;

    let method = match method.to_ascii_uppercase().as_str() {
        "GET" => Method::Get,
        "HEAD" => Method::Head,
        _ => return Err(OffloadError::Forbidden("method not allowed")),
    };

    if !uri.starts_with('/') {
        return Err(OffloadError::BadRequest("uri must be absolute path"));
    }
    if uri.contains('?') {
        return Err(OffloadError::Forbidden("query strings are not offloaded"));
    }

    Ok((method, uri.to_string()))
}

// Only Range and If-Range are retained; everything else is ignored, since
// this server never forwards request bodies or other client headers to
// the origin.
pub async fn read_request(stream: &mut TcpStream) -> Result<ClientRequest, OffloadError> {
    let mut reader = BufReader::new(stream);

    let mut line = String::new();
    let n = reader
        .read_line(&mut line)
        .await
        .map_err(|_| OffloadError::ServiceUnavailable("client read failed"))?;
    if n == 0 {
        return Err(OffloadError::BadRequest("empty request"));
    }

    let (method, uri) = parse_request_line(&line)?;

    let mut range = None;
    let mut if_range_present = false;

    loop {
        let mut header_line = String::new();
        let n = reader
            .read_line(&mut header_line)
            .await
            .map_err(|_| OffloadError::ServiceUnavailable("client read failed"))?;
        if n == 0 {
            break;
        }
        let trimmed = header_line.trim();
        if trimmed.is_empty() {
            break;
        }
        let Some((name, value)) = trimmed.split_once(':') else {
            continue;
        };
        let name = name.trim();
        let value = value.trim();
        if name.eq_ignore_ascii_case("range") {
            range = Some(value.to_string());
        } else if name.eq_ignore_ascii_case("if-range") {
            if_range_present = true;
        }
    }

    Ok(ClientRequest {
        method,
        uri,
        range,
        if_range_present,
    })
}
