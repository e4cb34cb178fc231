// Caching worker: fills a new cache entry from the origin's GET response
// body. Modeled as a named background task keyed by CacheKey, owned by the
// process. tokio::spawn detaches the task from whichever request caused it
// to be spawned, so caching keeps running even if that client disconnects.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::cache_store::CacheEntryPaths;

const CHUNK_SIZE: usize = 32 * 1024;

static ACTIVE_WRITERS: OnceCell<Mutex<HashSet<String>>> = OnceCell::new();
static PID_COUNTER: AtomicU64 = AtomicU64::new(1);

fn active_writers() -> &'static Mutex<HashSet<String>> {
    ACTIVE_WRITERS.get_or_init(|| Mutex::new(HashSet::new()))
}

// Value stored in the X-Offload-Caching-PID metadata field, identifying one
// caching task the way a pid identifies one process.
pub fn allocate_caching_pid() -> u64 {
    PID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

pub fn is_writer_alive(key: &str) -> bool {
    active_writers().lock().contains(key)
}

// filedata must already be open for writing (opened synchronously under
// the cache mutex by the caller) so a reader released from the mutex never
// races the write handle's creation. socket must be positioned at the
// first body byte of the origin's GET response.
pub fn spawn_caching_worker(
    key: String,
    paths: CacheEntryPaths,
    content_length: u64,
    mut socket: TcpStream,
    filedata: File,
    stall_timeout: Duration,
) {
    active_writers().lock().insert(key.clone());

    tokio::spawn(async move {
        let result = run_writer(filedata, content_length, &mut socket, stall_timeout).await;
        active_writers().lock().remove(&key);
        if let Err(reason) = result {
            tracing::warn!(key = %key, reason = %reason, "caching worker failed, nuking cache entry");
            crate::cache_store::nuke_cache_entry(&paths).await;
        } else {
            tracing::info!(key = %key, bytes = content_length, "caching worker completed");
        }
    });
}

async fn run_writer(
    mut file: File,
    content_length: u64,
    socket: &mut TcpStream,
    stall_timeout: Duration,
) -> Result<(), &'static str> {
    let mut written: u64 = 0;
    let mut buf = vec![0u8; CHUNK_SIZE];

    while written < content_length {
        let remaining = (content_length - written) as usize;
        let want = remaining.min(CHUNK_SIZE);
        let n = tokio::time::timeout(stall_timeout, socket.read(&mut buf[..want]))
            .await
            .map_err(|_| "origin read timed out")?
            .map_err(|_| "origin read failed")?;
        if n == 0 {
            return Err("origin closed connection before content-length reached");
        }
        tokio::time::timeout(stall_timeout, file.write_all(&buf[..n]))
            .await
            .map_err(|_| "filedata write timed out")?
            .map_err(|_| "filedata write failed")?;
        tokio::time::timeout(stall_timeout, file.flush())
            .await
            .map_err(|_| "filedata flush timed out")?
            .map_err(|_| "filedata flush failed")?;
        written += n as u64;
    }

    Ok(())
}
