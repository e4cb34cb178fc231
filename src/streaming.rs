// Readers never hold the cache mutex while streaming; they pace themselves
// purely by polling the growing size of filedata on disk. This also works
// when filedata is being grown by a caching worker in a different OS
// process sharing the same cache directory.

use std::time::{Duration, Instant};

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt, SeekFrom};
use tokio::net::TcpStream;

const CHUNK_SIZE: usize = 32 * 1024;
const POLL_INTERVAL: Duration = Duration::from_secs(1);

pub enum StreamOutcome {
    Completed,
    // Client write failed (disconnect); the cache is untouched.
    ClientGone,
    // The writer stalled for longer than the timeout with no growth.
    WriterStalled,
}

pub async fn stream_range(
    file: &mut File,
    content_length: u64,
    start_range: u64,
    end_range: u64,
    client: &mut TcpStream,
    stall_timeout: Duration,
) -> std::io::Result<StreamOutcome> {
    file.seek(SeekFrom::Start(start_range)).await?;

    let mut bytes_read: u64 = start_range;
    let mut last_progress = Instant::now();
    let mut buf = vec![0u8; CHUNK_SIZE];

    while bytes_read <= end_range {
        let cursize = file.metadata().await?.len();

        if cursize < content_length && cursize <= bytes_read {
            if last_progress.elapsed() >= stall_timeout {
                return Ok(StreamOutcome::WriterStalled);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
            continue;
        }

        let available = cursize.saturating_sub(bytes_read);
        let remaining_in_range = end_range + 1 - bytes_read;
        let want = (CHUNK_SIZE as u64).min(available).min(remaining_in_range) as usize;
        if want == 0 {
            break;
        }

        let n = file.read(&mut buf[..want]).await?;
        if n == 0 {
            // Writer caught up to cursize but hasn't flushed yet; treat
            // like no-progress and retry the stall check.
            continue;
        }

        if client.write_all(&buf[..n]).await.is_err() {
            return Ok(StreamOutcome::ClientGone);
        }

        bytes_read += n as u64;
        last_progress = Instant::now();
    }

    Ok(StreamOutcome::Completed)
}
