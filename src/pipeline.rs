// Per-request state machine: parse, validate against a fresh origin HEAD,
// decide cache freshness, serve from cache or start caching, respond with
// headers, stream the body. Any Err short-circuits to the terminal error
// handling in handle_connection.

use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::cache_store::{self, CacheEntryPaths};
use crate::config::Config;
use crate::dupe_registry::DupeRegistry;
use crate::error::OffloadError;
use crate::freshness::{self, Freshness};
use crate::header_map::HeaderMap;
use crate::http_response::{build_error_response, build_response_headers, build_robots_response};
use crate::mutex::CacheMutex;
use crate::origin_client::OriginClient;
use crate::range::{self, RangeOutcome};
use crate::request::{read_request, ClientRequest, Method};
use crate::streaming::{stream_range, StreamOutcome};
use crate::writer;
use crate::cache_key::CacheKey;

pub struct Server {
    pub config: Config,
    pub dupe_registry: Arc<DupeRegistry>,
}

impl Server {
    pub fn new(config: Config) -> Self {
        let dupe_registry = Arc::new(DupeRegistry::new(config.max_dupe_downloads));
        Server { config, dupe_registry }
    }

    pub async fn handle_connection(&self, mut stream: TcpStream, client_ip: String) {
        let request = match read_request(&mut stream).await {
            Ok(r) => r,
            Err(e) => {
                let _ = stream.write_all(build_error_response(&e).as_bytes()).await;
                return;
            }
        };

        if request.uri == "/robots.txt" {
            let _ = stream.write_all(build_robots_response().as_bytes()).await;
            return;
        }

        if let Err(e) = self.process_request(&mut stream, &client_ip, &request).await {
            let _ = stream.write_all(build_error_response(&e).as_bytes()).await;
        }
    }

    async fn process_request(
        &self,
        stream: &mut TcpStream,
        client_ip: &str,
        request: &ClientRequest,
    ) -> Result<(), OffloadError> {
        let origin = OriginClient::new(
            self.config.base_server.clone(),
            self.config.base_server_port,
            self.config.timeout,
        );

        let head = origin.head(&request.uri).await?;

        if head.status == 401 || head.headers.contains("WWW-Authenticate") {
            return Err(OffloadError::Forbidden("protected content"));
        }
        if head.status != 200 {
            return Err(OffloadError::Redirect {
                status: head.status,
                location: head.headers.get("Location").map(str::to_string),
            });
        }
        for required in ["ETag", "Content-Length", "Last-Modified"] {
            if !head.headers.contains(required) {
                return Err(OffloadError::Forbidden("origin response missing required headers"));
            }
        }

        let cache_key = CacheKey::from_etag(head.headers.get("ETag").unwrap())
            .ok_or(OffloadError::Forbidden("unusable origin ETag"))?;

        if request.method == Method::Head {
            let content_length: u64 = head
                .headers
                .get("Content-Length")
                .and_then(|v| v.parse().ok())
                .ok_or(OffloadError::ServiceUnavailable("malformed origin content-length"))?;
            let content_type = head.headers.get("Content-Type").unwrap_or("application/octet-stream");
            let headers = build_response_headers(
                200,
                &cache_key.normalized_etag(),
                head.headers.get("Last-Modified").unwrap_or(""),
                content_length,
                content_type,
                None,
                None,
            );
            stream.write_all(headers.as_bytes()).await?;
            return Ok(());
        }

        self.handle_get(stream, client_ip, request, &origin, &head.headers, &cache_key)
            .await
    }

    async fn handle_get(
        &self,
        stream: &mut TcpStream,
        client_ip: &str,
        request: &ClientRequest,
        origin: &OriginClient,
        head_headers: &HeaderMap,
        cache_key: &CacheKey,
    ) -> Result<(), OffloadError> {
        let digest = DupeRegistry::digest(client_ip, &request.uri);
        let _slot = self
            .dupe_registry
            .try_acquire(digest)
            .ok_or(OffloadError::Forbidden(
                "too many concurrent downloads for this file; please disable download accelerators",
            ))?;

        let paths = CacheEntryPaths::for_key(&self.config.cache_dir, &cache_key.key);
        let existing_metadata = cache_store::load_metadata(&paths.metadata).await;
        let filedata_len = freshness::filedata_len(&paths.filedata);
        let writer_alive = writer::is_writer_alive(&cache_key.key);

        let freshness_result = match &existing_metadata {
            Some(m) if cache_store::metadata_is_structurally_valid(m, &cache_key.key) => {
                freshness::evaluate(m, head_headers, filedata_len, writer_alive)
            }
            Some(_) | None => Freshness::Stale,
        };

        match freshness_result {
            Freshness::Fresh => {}
            Freshness::Abandoned => {
                let mut mutex = CacheMutex::new(self.config.lock_path());
                mutex.acquire().await?;
                cache_store::nuke_cache_entry(&paths).await;
                mutex.release();
                self.start_caching(&paths, cache_key, origin, request, head_headers).await?;
            }
            Freshness::Stale => {
                self.start_caching(&paths, cache_key, origin, request, head_headers).await?;
            }
        }

        let metadata = cache_store::load_metadata(&paths.metadata)
            .await
            .ok_or(OffloadError::Internal("cache entry vanished after caching started"))?;

        self.stream_from_cache(stream, &paths, &metadata, request).await
    }

    // Cache-miss path: under the mutex, unlink stale files, open the origin
    // GET, re-validate its headers against the HEAD we already validated,
    // commit metadata, and spawn the detached caching worker.
    async fn start_caching(
        &self,
        paths: &CacheEntryPaths,
        cache_key: &CacheKey,
        origin: &OriginClient,
        request: &ClientRequest,
        head_headers: &HeaderMap,
    ) -> Result<(), OffloadError> {
        let mut mutex = CacheMutex::new(self.config.lock_path());
        mutex.acquire().await?;

        cache_store::nuke_cache_entry(paths).await;

        let get_response = match origin.get(&request.uri).await {
            Ok(r) => r,
            Err(e) => {
                mutex.release();
                return Err(e);
            }
        };

        if get_response.status != 200 {
            mutex.release();
            return Err(OffloadError::ServiceUnavailable("origin GET did not return 200"));
        }
        if get_response.headers.get("ETag") != head_headers.get("ETag")
            || get_response.headers.get("Content-Length") != head_headers.get("Content-Length")
        {
            mutex.release();
            return Err(OffloadError::ServiceUnavailable(
                "origin object changed between HEAD and GET",
            ));
        }

        let content_length: u64 = match get_response.headers.get("Content-Length").and_then(|v| v.parse().ok()) {
            Some(n) => n,
            None => {
                mutex.release();
                return Err(OffloadError::ServiceUnavailable("malformed origin content-length"));
            }
        };

        let caching_pid = writer::allocate_caching_pid();

        let mut metadata = get_response.headers.clone();
        metadata.insert("ETag", cache_key.normalized_etag());
        if !metadata.contains("Content-Type") {
            metadata.insert("Content-Type", "application/octet-stream");
        }
        metadata.insert("X-Offload-Orig-URL", request.uri.clone());
        metadata.insert("X-Offload-Hostname", self.config.base_server.clone());
        metadata.insert("X-Offload-Orig-ETag", head_headers.get("ETag").unwrap_or("").to_string());
        metadata.insert("X-Offload-Is-Weak", if cache_key.is_weak { "1" } else { "0" }.to_string());
        metadata.insert("X-Offload-Caching-PID", caching_pid.to_string());

        if let Err(e) = cache_store::commit_metadata(&paths.metadata, &metadata).await {
            tracing::error!(error = %e, "failed to commit metadata");
            mutex.release();
            return Err(OffloadError::Internal("failed to commit cache metadata"));
        }

        // Open filedata for writing here, under the mutex, so a reader
        // released after us never races the write handle's creation.
        let filedata = match tokio::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&paths.filedata)
            .await
        {
            Ok(f) => f,
            Err(e) => {
                tracing::error!(error = %e, "failed to open filedata for writing");
                cache_store::nuke_cache_entry(paths).await;
                mutex.release();
                return Err(OffloadError::Internal("failed to open cache filedata"));
            }
        };

        writer::spawn_caching_worker(
            cache_key.key.clone(),
            paths.clone(),
            content_length,
            get_response.socket,
            filedata,
            self.config.timeout,
        );

        mutex.release();
        Ok(())
    }

    async fn stream_from_cache(
        &self,
        stream: &mut TcpStream,
        paths: &CacheEntryPaths,
        metadata: &HeaderMap,
        request: &ClientRequest,
    ) -> Result<(), OffloadError> {
        let content_length: u64 = metadata
            .get("Content-Length")
            .and_then(|v| v.parse().ok())
            .ok_or(OffloadError::Internal("cache metadata missing content-length"))?;
        let etag = metadata.get("ETag").unwrap_or("");
        let last_modified = metadata.get("Last-Modified").unwrap_or("");
        let content_type = metadata.get("Content-Type").unwrap_or("application/octet-stream");

        let range_outcome = match (&request.range, request.if_range_present) {
            (Some(_), true) => RangeOutcome::Full,
            (Some(v), false) => range::parse_range(v, content_length),
            (None, _) => RangeOutcome::Full,
        };

        let (status, start, end, content_range) = match range_outcome {
            RangeOutcome::Full => (200u16, 0u64, content_length.saturating_sub(1), None),
            RangeOutcome::Partial(r) => (206u16, r.start, r.end, Some((r.start, r.end, content_length))),
            RangeOutcome::Invalid => return Err(OffloadError::BadRequest("invalid range")),
        };

        let response_length = if content_length == 0 { 0 } else { end - start + 1 };

        let headers = build_response_headers(status, etag, last_modified, response_length, content_type, content_range, None);
        stream.write_all(headers.as_bytes()).await?;

        if content_length == 0 {
            return Ok(());
        }

        let mut file = tokio::fs::OpenOptions::new()
            .read(true)
            .open(&paths.filedata)
            .await?;

        let outcome = stream_range(&mut file, content_length, start, end, stream, self.config.timeout).await;

        match outcome {
            Ok(StreamOutcome::Completed) | Ok(StreamOutcome::ClientGone) => Ok(()),
            Ok(StreamOutcome::WriterStalled) => {
                tracing::warn!(key = %paths.filedata.display(), "reader gave up waiting for writer progress");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "error streaming cached body");
                Ok(())
            }
        }
    }
}
