// Insertion-ordered header map, used both for origin responses and the
// persisted metadata sidecar.
#[derive(Clone, Debug, Default)]
pub struct HeaderMap {
    // Parallel vectors instead of an IndexMap-alike: insertion order is the
    // vector order, overwrite replaces the value in place.
    names: Vec<String>,
    values: Vec<String>,
}

impl HeaderMap {
    pub fn new() -> Self {
        Self::default()
    }

    // Names compared case-sensitively.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.names.iter().position(|n| n == &name) {
            Some(idx) => self.values[idx] = value,
            None => {
                self.names.push(name);
                self.values.push(value);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|idx| self.values[idx].as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.names
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().map(String::as_str))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    // Alternating key/value lines, newline-terminated, in insertion order.
    pub fn to_metadata_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for (name, value) in self.iter() {
            out.extend_from_slice(name.as_bytes());
            out.push(b'\n');
            out.extend_from_slice(value.as_bytes());
            out.push(b'\n');
        }
        out
    }

    // Pairs are read two lines at a time; an incomplete trailing pair, or
    // an empty key line, terminates parsing.
    pub fn from_metadata_bytes(data: &[u8]) -> Self {
        let mut map = Self::new();
        let text = String::from_utf8_lossy(data);
        let mut lines = text.split('\n');
        loop {
            let Some(key) = lines.next() else { break };
            if key.is_empty() {
                break;
            }
            let Some(value) = lines.next() else { break };
            map.insert(key.to_string(), value.to_string());
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserves_insertion_order() {
        let mut h = HeaderMap::new();
        h.insert("ETag", "\"abc\"");
        h.insert("Content-Length", "100");
        h.insert("Last-Modified", "T");
        let names: Vec<_> = h.iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["ETag", "Content-Length", "Last-Modified"]);
    }

    #[test]
    fn overwrite_replaces_value_not_position() {
        let mut h = HeaderMap::new();
        h.insert("ETag", "W/\"abc\"");
        h.insert("Content-Length", "1");
        // Overwrite ETag with a substring of its old value (the W/ strip case).
        h.insert("ETag", "abc");
        let names: Vec<_> = h.iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["ETag", "Content-Length"]);
        assert_eq!(h.get("ETag"), Some("abc"));
    }

    #[test]
    fn metadata_round_trip() {
        let mut h = HeaderMap::new();
        h.insert("Content-Length", "1048576");
        h.insert("ETag", "abc");
        h.insert("Last-Modified", "Mon, 01 Jan 2024 00:00:00 GMT");
        let bytes = h.to_metadata_bytes();
        let back = HeaderMap::from_metadata_bytes(&bytes);
        assert_eq!(h.iter().collect::<Vec<_>>(), back.iter().collect::<Vec<_>>());
    }

    #[test]
    fn drops_incomplete_trailing_pair() {
        let data = b"Content-Length\n100\nETag\n";
        let h = HeaderMap::from_metadata_bytes(data);
        assert_eq!(h.len(), 1);
        assert_eq!(h.get("Content-Length"), Some("100"));
        assert_eq!(h.get("ETag"), None);
    }
}
