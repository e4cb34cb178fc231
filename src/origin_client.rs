use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};

use crate::error::OffloadError;
use crate::header_map::HeaderMap;

pub struct OriginResponse {
    pub status: u16,
    pub headers: HeaderMap,
}

pub struct OriginGetResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub socket: TcpStream,
}

pub struct OriginClient {
    pub host: String,
    pub port: u16,
    pub timeout: Duration,
}

impl OriginClient {
    pub fn new(host: String, port: u16, timeout: Duration) -> Self {
        OriginClient { host, port, timeout }
    }

    pub async fn head(&self, uri: &str) -> Result<OriginResponse, OffloadError> {
        let mut socket = self.connect().await?;
        self.send_request("HEAD", uri, &mut socket).await?;
        let (status, headers) = self.read_response_head(&mut socket).await?;
        Ok(OriginResponse { status, headers })
    }

    pub async fn get(&self, uri: &str) -> Result<OriginGetResponse, OffloadError> {
        let mut socket = self.connect().await?;
        self.send_request("GET", uri, &mut socket).await?;
        let (status, headers) = self.read_response_head(&mut socket).await?;
        Ok(OriginGetResponse { status, headers, socket })
    }

    async fn connect(&self) -> Result<TcpStream, OffloadError> {
        let addr = format!("{}:{}", self.host, self.port);
        timeout(self.timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| OffloadError::ServiceUnavailable("origin connect timed out"))?
            .map_err(|e| {
                tracing::warn!(error = %e, addr = %addr, "failed to connect to origin");
                OffloadError::ServiceUnavailable("origin unreachable")
            })
    }

    async fn send_request(
        &self,
        method: &str,
        uri: &str,
        socket: &mut TcpStream,
    ) -> Result<(), OffloadError> {
        let request = format!(
            "{method} {uri} HTTP/1.1\r\n\
             Host: {host}\r\n\
             User-Agent: modoffload/{version}\r\n\
             Connection: close\r\n\
             X-Mod-Offload-Bypass: true\r\n\
             \r\n",
            method = method,
            uri = uri,
            host = self.host,
            version = env!("CARGO_PKG_VERSION"),
        );

        timeout(self.timeout, socket.write_all(request.as_bytes()))
            .await
            .map_err(|_| OffloadError::ServiceUnavailable("origin request timed out"))?
            .map_err(|e| {
                tracing::warn!(error = %e, "failed to write origin request");
                OffloadError::ServiceUnavailable("origin write failed")
            })?;

        Ok(())
    }

    // Reads one byte at a time until CRLF CRLF (or LF LF), so body bytes
    // are never consumed.
    async fn read_response_head(
        &self,
        socket: &mut TcpStream,
    ) -> Result<(u16, HeaderMap), OffloadError> {
        let raw = self.read_until_headers_end(socket).await?;
        let text = String::from_utf8_lossy(&raw);
        let mut lines = text.split("\r\n").flat_map(|l| l.split('\n'));

        let status_line = lines
            .find(|l| !l.is_empty())
            .ok_or(OffloadError::ServiceUnavailable("malformed origin response"))?;

        let status: u16 = status_line
            .split_whitespace()
            .nth(1)
            .and_then(|s| s.parse().ok())
            .ok_or(OffloadError::ServiceUnavailable("malformed origin status line"))?;

        let mut headers = HeaderMap::new();
        for line in lines {
            if line.is_empty() {
                continue;
            }
            match line.split_once(':') {
                Some((name, value)) => {
                    headers.insert(name.trim().to_string(), value.trim().to_string());
                }
                None => {
                    return Err(OffloadError::ServiceUnavailable("malformed origin header line"));
                }
            }
        }

        Ok((status, headers))
    }

    async fn read_until_headers_end(&self, socket: &mut TcpStream) -> Result<Vec<u8>, OffloadError> {
        let mut buf = Vec::with_capacity(1024);
        let mut byte = [0u8; 1];
        loop {
            let n = timeout(self.timeout, socket.read(&mut byte))
                .await
                .map_err(|_| OffloadError::ServiceUnavailable("origin response timed out"))?
                .map_err(|e| {
                    tracing::warn!(error = %e, "failed to read origin response");
                    OffloadError::ServiceUnavailable("origin read failed")
                })?;
            if n == 0 {
                return Err(OffloadError::ServiceUnavailable("origin closed connection early"));
            }
            buf.push(byte[0]);
            if buf.ends_with(b"\r\n\r\n") || buf.ends_with(b"\n\n") {
                break;
            }
        }
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt as _;
    use tokio::net::TcpListener;

    async fn spawn_stub(response: &'static str) -> std::net::SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = vec![0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let _ = socket.write_all(response.as_bytes()).await;
            }
        });
        addr
    }

    #[tokio::test]
    async fn head_parses_status_and_headers() {
        let addr = spawn_stub(
            "HTTP/1.1 200 OK\r\nContent-Length: 5\r\nETag: \"abc\"\r\n\r\n",
        )
        .await;
        let client = OriginClient::new(addr.ip().to_string(), addr.port(), Duration::from_secs(5));
        let resp = client.head("/foo.bin").await.unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(resp.headers.get("Content-Length"), Some("5"));
        assert_eq!(resp.headers.get("ETag"), Some("\"abc\""));
    }

    #[tokio::test]
    async fn get_leaves_socket_at_first_body_byte() {
        let addr = spawn_stub("HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello").await;
        let client = OriginClient::new(addr.ip().to_string(), addr.port(), Duration::from_secs(5));
        let mut resp = client.get("/foo.bin").await.unwrap();
        let mut body = Vec::new();
        resp.socket.read_to_end(&mut body).await.unwrap();
        assert_eq!(body, b"hello");
    }

    #[tokio::test]
    async fn malformed_status_line_is_service_unavailable() {
        let addr = spawn_stub("GARBAGE\r\n\r\n").await;
        let client = OriginClient::new(addr.ip().to_string(), addr.port(), Duration::from_secs(5));
        let err = client.head("/x").await.unwrap_err();
        assert_eq!(err.status(), 503);
    }
}
