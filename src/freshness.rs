use std::path::Path;

use crate::cache_key::CacheKey;
use crate::header_map::HeaderMap;

#[derive(Debug, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    Stale,
    // filedata is short and the caching pid is dead: remove under the
    // mutex before a fresh miss path runs.
    Abandoned,
}

// filedata_len is None if the filedata file does not exist. caching_pid_alive
// reports whether the caching task named by X-Offload-Caching-PID is still
// in flight.
pub fn evaluate(
    metadata: &HeaderMap,
    origin_headers: &HeaderMap,
    filedata_len: Option<u64>,
    caching_pid_alive: bool,
) -> Freshness {
    let Some(m_len) = metadata.get("Content-Length") else {
        return Freshness::Stale;
    };
    let Some(m_etag) = metadata.get("ETag") else {
        return Freshness::Stale;
    };
    if metadata.get("Last-Modified").is_none() {
        return Freshness::Stale;
    }

    let Some(h_len) = origin_headers.get("Content-Length") else {
        return Freshness::Stale;
    };
    let Some(h_etag) = origin_headers.get("ETag") else {
        return Freshness::Stale;
    };

    if m_len != h_len {
        return Freshness::Stale;
    }
    // Metadata always stores the normalized (strong-form) key, but a fresh
    // HEAD may still carry a `W/` prefix; compare normalized keys rather
    // than raw header text so weak origin ETags keep matching themselves.
    let m_key = CacheKey::from_etag(m_etag).map(|k| k.key);
    let h_key = CacheKey::from_etag(h_etag).map(|k| k.key);
    if m_key.is_none() || m_key != h_key {
        return Freshness::Stale;
    }

    let is_weak = metadata.get("X-Offload-Is-Weak") == Some("1");
    if !is_weak {
        let m_lm = metadata.get("Last-Modified");
        let h_lm = origin_headers.get("Last-Modified");
        if m_lm != h_lm {
            return Freshness::Stale;
        }
    }

    let content_length: u64 = match m_len.parse() {
        Ok(n) => n,
        Err(_) => return Freshness::Stale,
    };

    match filedata_len {
        Some(len) if len == content_length => Freshness::Fresh,
        Some(_) if caching_pid_alive => Freshness::Fresh,
        Some(_) => Freshness::Abandoned,
        None => Freshness::Stale,
    }
}

pub fn filedata_len(path: &Path) -> Option<u64> {
    std::fs::metadata(path).ok().map(|m| m.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make(content_len: &str, etag: &str, last_modified: &str, weak: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert("Content-Length", content_len);
        h.insert("ETag", etag);
        h.insert("Last-Modified", last_modified);
        h.insert("X-Offload-Is-Weak", weak);
        h
    }

    #[test]
    fn matching_headers_and_complete_file_is_fresh() {
        let m = make("100", "\"abc\"", "T1", "0");
        let h = make("100", "\"abc\"", "T1", "0");
        assert_eq!(evaluate(&m, &h, Some(100), false), Freshness::Fresh);
    }

    #[test]
    fn mismatched_content_length_is_stale() {
        let m = make("100", "\"abc\"", "T1", "0");
        let h = make("200", "\"abc\"", "T1", "0");
        assert_eq!(evaluate(&m, &h, Some(100), false), Freshness::Stale);
    }

    #[test]
    fn mismatched_etag_is_stale() {
        let m = make("100", "\"abc\"", "T1", "0");
        let h = make("100", "\"def\"", "T1", "0");
        assert_eq!(evaluate(&m, &h, Some(100), false), Freshness::Stale);
    }

    #[test]
    fn weak_etag_tolerates_changed_last_modified() {
        let m = make("100", "\"xyz\"", "T1", "1");
        let h = make("100", "\"xyz\"", "T2", "1");
        assert_eq!(evaluate(&m, &h, Some(100), false), Freshness::Fresh);
    }

    #[test]
    fn stored_strong_form_still_matches_a_freshly_weak_origin_etag() {
        // metadata always stores the normalized (stripped-W/) form, but a
        // later HEAD may still report the origin's original weak ETag.
        let m = make("100", "\"xyz\"", "T1", "1");
        let h = make("100", "W/\"xyz\"", "T2", "1");
        assert_eq!(evaluate(&m, &h, Some(100), false), Freshness::Fresh);
    }

    #[test]
    fn strong_etag_rejects_changed_last_modified() {
        let m = make("100", "\"xyz\"", "T1", "0");
        let h = make("100", "\"xyz\"", "T2", "0");
        assert_eq!(evaluate(&m, &h, Some(100), false), Freshness::Stale);
    }

    #[test]
    fn in_progress_caching_with_live_pid_is_fresh() {
        let m = make("100", "\"abc\"", "T1", "0");
        let h = make("100", "\"abc\"", "T1", "0");
        assert_eq!(evaluate(&m, &h, Some(40), true), Freshness::Fresh);
    }

    #[test]
    fn short_file_with_dead_pid_is_abandoned() {
        let m = make("100", "\"abc\"", "T1", "0");
        let h = make("100", "\"abc\"", "T1", "0");
        assert_eq!(evaluate(&m, &h, Some(40), false), Freshness::Abandoned);
    }

    #[test]
    fn missing_file_is_stale() {
        let m = make("100", "\"abc\"", "T1", "0");
        let h = make("100", "\"abc\"", "T1", "0");
        assert_eq!(evaluate(&m, &h, None, false), Freshness::Stale);
    }

    #[test]
    fn missing_required_metadata_key_is_stale() {
        let mut m = HeaderMap::new();
        m.insert("ETag", "\"abc\"");
        let h = make("100", "\"abc\"", "T1", "0");
        assert_eq!(evaluate(&m, &h, Some(100), false), Freshness::Stale);
    }
}
