#[derive(Debug, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

#[derive(Debug, PartialEq, Eq)]
pub enum RangeOutcome {
    // No Range header, or a Range that should be ignored (e.g. If-Range is
    // present): serve the whole entity.
    Full,
    Partial(ByteRange),
    // Syntactically a single byte-range but semantically invalid (negative,
    // inverted, or wholly beyond content_length).
    Invalid,
}

// Accepts only bytes=<a>-<b> with a single range and at least one of a/b
// present. Multiple ranges are Invalid (400 at the pipeline layer).
// end >= content_length is clamped down to content_length - 1 rather than
// rejected.
pub fn parse_range(value: &str, content_length: u64) -> RangeOutcome {
    let Some(spec) = value.strip_prefix("bytes=") else {
        return RangeOutcome::Invalid;
    };

    if spec.contains(',') {
        return RangeOutcome::Invalid;
    }

    let Some((start_str, end_str)) = spec.split_once('-') else {
        return RangeOutcome::Invalid;
    };

    if content_length == 0 {
        return RangeOutcome::Invalid;
    }

    let (start, end) = match (start_str.trim(), end_str.trim()) {
        ("", "") => return RangeOutcome::Invalid,
        ("", suffix_len) => {
            // suffix range: last N bytes
            let Ok(n) = suffix_len.parse::<u64>() else {
                return RangeOutcome::Invalid;
            };
            if n == 0 {
                return RangeOutcome::Invalid;
            }
            let start = content_length.saturating_sub(n);
            (start, content_length - 1)
        }
        (start_str, "") => {
            let Ok(start) = start_str.parse::<u64>() else {
                return RangeOutcome::Invalid;
            };
            (start, content_length - 1)
        }
        (start_str, end_str) => {
            let (Ok(start), Ok(end)) = (start_str.parse::<u64>(), end_str.parse::<u64>()) else {
                return RangeOutcome::Invalid;
            };
            (start, end)
        }
    };

    if start >= content_length {
        return RangeOutcome::Invalid;
    }
    if start > end {
        return RangeOutcome::Invalid;
    }

    let end = end.min(content_length - 1);

    RangeOutcome::Partial(ByteRange { start, end })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_range() {
        assert_eq!(
            parse_range("bytes=100-199", 1000),
            RangeOutcome::Partial(ByteRange { start: 100, end: 199 })
        );
    }

    #[test]
    fn open_ended_range_goes_to_end() {
        assert_eq!(
            parse_range("bytes=900-", 1000),
            RangeOutcome::Partial(ByteRange { start: 900, end: 999 })
        );
    }

    #[test]
    fn suffix_range() {
        assert_eq!(
            parse_range("bytes=-100", 1000),
            RangeOutcome::Partial(ByteRange { start: 900, end: 999 })
        );
    }

    #[test]
    fn end_beyond_content_length_is_clamped() {
        assert_eq!(
            parse_range("bytes=900-5000", 1000),
            RangeOutcome::Partial(ByteRange { start: 900, end: 999 })
        );
    }

    #[test]
    fn multiple_ranges_are_invalid() {
        assert_eq!(parse_range("bytes=0-99,200-299", 1000), RangeOutcome::Invalid);
    }

    #[test]
    fn non_bytes_unit_is_invalid() {
        assert_eq!(parse_range("items=0-1", 1000), RangeOutcome::Invalid);
    }

    #[test]
    fn inverted_range_is_invalid() {
        assert_eq!(parse_range("bytes=500-100", 1000), RangeOutcome::Invalid);
    }

    #[test]
    fn start_beyond_content_length_is_invalid() {
        assert_eq!(parse_range("bytes=2000-3000", 1000), RangeOutcome::Invalid);
    }
}
