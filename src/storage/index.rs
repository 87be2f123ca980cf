// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Page index strategies: mapping keys to pages and pages to scan ranges.

use super::error::StorageError;
use super::page::PageId;
use super::record::Key;

/// Maps record keys to logical pages.
///
/// An index owns the key normal form: raw keys are left-padded to a fixed
/// width so that lexicographic order matches the logical order and page
/// routing is a pure prefix (or bucket) function. Implementations must be
/// injective over normalized keys.
pub trait PageIndex: Send + Sync {
    /// Fixed width of normalized keys.
    fn key_width(&self) -> usize;

    /// Normalizes a raw key, left-padding to [`key_width`](Self::key_width).
    ///
    /// Fails if the raw key is wider than the declared width (padding could
    /// no longer be undone, breaking injectivity).
    fn normalize(&self, raw: &str) -> Result<Key, StorageError>;

    /// Returns the page id a normalized key routes to.
    fn page_of(&self, key: &Key) -> PageId;

    /// Returns the half-open key range `[start, end)` covered by a page.
    fn page_range(&self, page_id: &PageId) -> (String, String);
}

/// Lexicographic successor of a routing prefix.
///
/// Keys are ASCII (digits and upper-case letters after normalization), so
/// bumping the final byte is enough. An empty prefix routes the whole
/// keyspace to one page; its range is capped by a sentinel above any ASCII
/// key.
fn prefix_successor(prefix: &str) -> String {
    if prefix.is_empty() {
        return "\u{10FFFF}".to_string();
    }
    let mut bytes = prefix.as_bytes().to_vec();
    let last = bytes
        .last_mut()
        .expect("non-empty prefix has a final byte");
    *last += 1;
    String::from_utf8(bytes).expect("ASCII prefix stays valid after bump")
}

fn pad_left(raw: &str, width: usize) -> String {
    if raw.len() >= width {
        raw.to_string()
    } else {
        let mut s = String::with_capacity(width);
        for _ in 0..(width - raw.len()) {
            s.push('0');
        }
        s.push_str(raw);
        s
    }
}

/// Prefix-sharded ordered index for single-column string keys.
///
/// The page id is the leading `key_width - offset_len` characters of the
/// normalized key, where `offset_len` is the smallest suffix length whose
/// decimal capacity holds `page_size` keys. Capacity therefore rounds up to
/// a power of ten: `page_size = 1` dedicates a page to every key, and a
/// `page_size` at or above `10^key_width` routes the whole table to one
/// page.
#[derive(Debug, Clone)]
pub struct PrefixOrderedIndex {
    key_width: usize,
    offset_len: usize,
}

impl PrefixOrderedIndex {
    /// Creates an index over `key_width`-character keys with at most
    /// (rounded up) `page_size` keys per page.
    pub fn new(key_width: usize, page_size: usize) -> Self {
        let mut offset_len = 0;
        let mut capacity: usize = 1;
        while capacity < page_size && offset_len < key_width {
            capacity *= 10;
            offset_len += 1;
        }
        Self {
            key_width,
            offset_len,
        }
    }

    fn prefix_len(&self) -> usize {
        self.key_width - self.offset_len
    }
}

impl PageIndex for PrefixOrderedIndex {
    fn key_width(&self) -> usize {
        self.key_width
    }

    fn normalize(&self, raw: &str) -> Result<Key, StorageError> {
        if raw.len() > self.key_width {
            return Err(StorageError::InvalidKey(format!(
                "key {raw:?} wider than declared width {}",
                self.key_width
            )));
        }
        Ok(Key::new(pad_left(raw, self.key_width)))
    }

    fn page_of(&self, key: &Key) -> PageId {
        PageId::new(key.as_str()[..self.prefix_len()].to_string())
    }

    fn page_range(&self, page_id: &PageId) -> (String, String) {
        (page_id.as_str().to_string(), prefix_successor(page_id.as_str()))
    }
}

/// Composite fixed-width index for multi-column keys.
///
/// Each column is left-padded to its declared width and the columns are
/// concatenated; fixed widths make the encoding injective without a
/// separator. The page id is the encoding of the first `prefix_columns`
/// columns. Column values must not begin with the pad character `'0'`, or
/// [`decode`](Self::decode) cannot recover them.
#[derive(Debug, Clone)]
pub struct CompositeFixedWidthIndex {
    widths: Vec<usize>,
    prefix_columns: usize,
}

impl CompositeFixedWidthIndex {
    /// Creates an index over columns of the given widths, routing pages by
    /// the first `prefix_columns` columns.
    pub fn new(widths: Vec<usize>, prefix_columns: usize) -> Self {
        assert!(!widths.is_empty(), "composite index needs at least one column");
        assert!(
            prefix_columns >= 1 && prefix_columns <= widths.len(),
            "prefix_columns must name a non-empty column prefix"
        );
        Self {
            widths,
            prefix_columns,
        }
    }

    /// Encodes a typed column tuple into a normalized key.
    pub fn encode(&self, columns: &[&str]) -> Result<Key, StorageError> {
        if columns.len() != self.widths.len() {
            return Err(StorageError::InvalidKey(format!(
                "expected {} columns, got {}",
                self.widths.len(),
                columns.len()
            )));
        }
        let mut encoded = String::with_capacity(self.key_width());
        for (column, &width) in columns.iter().zip(&self.widths) {
            if column.len() > width {
                return Err(StorageError::InvalidKey(format!(
                    "column {column:?} wider than declared width {width}"
                )));
            }
            encoded.push_str(&pad_left(column, width));
        }
        Ok(Key::new(encoded))
    }

    /// Decodes a normalized key back into its column values.
    pub fn decode(&self, key: &Key) -> Result<Vec<String>, StorageError> {
        if key.len() != self.key_width() {
            return Err(StorageError::InvalidKey(format!(
                "key {key} has width {}, expected {}",
                key.len(),
                self.key_width()
            )));
        }
        let mut columns = Vec::with_capacity(self.widths.len());
        let mut at = 0;
        for &width in &self.widths {
            let padded = &key.as_str()[at..at + width];
            columns.push(padded.trim_start_matches('0').to_string());
            at += width;
        }
        Ok(columns)
    }

    fn prefix_len(&self) -> usize {
        self.widths[..self.prefix_columns].iter().sum()
    }
}

impl PageIndex for CompositeFixedWidthIndex {
    fn key_width(&self) -> usize {
        self.widths.iter().sum()
    }

    fn normalize(&self, raw: &str) -> Result<Key, StorageError> {
        // Composite keys arrive pre-encoded; only the width is checked.
        if raw.len() != self.key_width() {
            return Err(StorageError::InvalidKey(format!(
                "composite key {raw:?} has width {}, expected {}",
                raw.len(),
                self.key_width()
            )));
        }
        Ok(Key::from(raw))
    }

    fn page_of(&self, key: &Key) -> PageId {
        PageId::new(key.as_str()[..self.prefix_len()].to_string())
    }

    fn page_range(&self, page_id: &PageId) -> (String, String) {
        (page_id.as_str().to_string(), prefix_successor(page_id.as_str()))
    }
}

/// Linear bucket index for integer keys.
///
/// Page id is `key / page_size`, so a page holds exactly `page_size`
/// consecutive keys. Keys are rendered zero-padded so lexicographic and
/// numeric order agree.
#[derive(Debug, Clone)]
pub struct LinearBucketIndex {
    key_width: usize,
    page_size: u64,
}

impl LinearBucketIndex {
    pub fn new(key_width: usize, page_size: u64) -> Self {
        assert!(page_size >= 1, "page_size must be at least 1");
        Self {
            key_width,
            page_size,
        }
    }

    fn parse(&self, key: &str) -> Result<u64, StorageError> {
        key.parse::<u64>()
            .map_err(|_| StorageError::InvalidKey(format!("non-integer key {key:?}")))
    }
}

impl PageIndex for LinearBucketIndex {
    fn key_width(&self) -> usize {
        self.key_width
    }

    fn normalize(&self, raw: &str) -> Result<Key, StorageError> {
        if raw.len() > self.key_width {
            return Err(StorageError::InvalidKey(format!(
                "key {raw:?} wider than declared width {}",
                self.key_width
            )));
        }
        self.parse(raw)?;
        Ok(Key::new(pad_left(raw, self.key_width)))
    }

    fn page_of(&self, key: &Key) -> PageId {
        let n = self
            .parse(key.as_str())
            .expect("normalized linear keys are numeric");
        PageId::new((n / self.page_size).to_string())
    }

    fn page_range(&self, page_id: &PageId) -> (String, String) {
        let bucket: u64 = page_id
            .as_str()
            .parse()
            .expect("linear page ids are bucket numbers");
        let start = bucket * self.page_size;
        let end = start + self.page_size;

        // The top bucket's exclusive bound overflows the key width and
        // would sort before its own keys; cap it with a sentinel above any
        // normalized key instead.
        let end_str = end.to_string();
        let end_key = if end_str.len() > self.key_width {
            "\u{10FFFF}".to_string()
        } else {
            pad_left(&end_str, self.key_width)
        };
        (pad_left(&start.to_string(), self.key_width), end_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_index_normalize_pads() {
        let index = PrefixOrderedIndex::new(4, 10);
        assert_eq!(index.normalize("17").unwrap().as_str(), "0017");
        assert_eq!(index.normalize("0017").unwrap().as_str(), "0017");
        assert!(index.normalize("00017").is_err());
    }

    #[test]
    fn test_prefix_index_page_routing() {
        let index = PrefixOrderedIndex::new(4, 10);
        let key = index.normalize("0017").unwrap();
        assert_eq!(index.page_of(&key).as_str(), "001");

        let (start, end) = index.page_range(&PageId::from("001"));
        assert_eq!(start, "001");
        assert_eq!(end, "002");
        assert!(start.as_str() <= "0017" && "0017" < end.as_str());
    }

    #[test]
    fn test_prefix_index_page_per_key() {
        let index = PrefixOrderedIndex::new(4, 1);
        let a = index.normalize("0017").unwrap();
        let b = index.normalize("0018").unwrap();
        assert_ne!(index.page_of(&a), index.page_of(&b));
        assert_eq!(index.page_of(&a).as_str(), "0017");
    }

    #[test]
    fn test_prefix_index_single_page_table() {
        let index = PrefixOrderedIndex::new(4, 100_000);
        let a = index.normalize("0000").unwrap();
        let b = index.normalize("9999").unwrap();
        assert_eq!(index.page_of(&a), index.page_of(&b));

        let (start, end) = index.page_range(&index.page_of(&a));
        assert!(start.as_str() <= "0000" && "9999" < end.as_str());
    }

    #[test]
    fn test_composite_encode_decode() {
        let index = CompositeFixedWidthIndex::new(vec![16, 8, 8], 1);
        let key = index.encode(&["alice", "FLIGHT", "17"]).unwrap();
        assert_eq!(key.len(), 32);

        let columns = index.decode(&key).unwrap();
        assert_eq!(columns, vec!["alice", "FLIGHT", "17"]);
    }

    #[test]
    fn test_composite_routes_by_leading_columns() {
        let index = CompositeFixedWidthIndex::new(vec![16, 8, 8], 1);
        let a = index.encode(&["alice", "FLIGHT", "17"]).unwrap();
        let b = index.encode(&["alice", "HOTEL", "NYC"]).unwrap();
        let c = index.encode(&["bob", "FLIGHT", "17"]).unwrap();

        assert_eq!(index.page_of(&a), index.page_of(&b));
        assert_ne!(index.page_of(&a), index.page_of(&c));

        let (start, end) = index.page_range(&index.page_of(&a));
        assert!(start.as_str() <= a.as_str() && a.as_str() < end.as_str());
        assert!(!(start.as_str() <= c.as_str() && c.as_str() < end.as_str()));
    }

    #[test]
    fn test_composite_rejects_wide_column() {
        let index = CompositeFixedWidthIndex::new(vec![4, 4], 1);
        assert!(index.encode(&["toolong", "x"]).is_err());
        assert!(index.encode(&["a"]).is_err());
    }

    #[test]
    fn test_linear_bucket_routing() {
        let index = LinearBucketIndex::new(4, 10);
        let key = index.normalize("17").unwrap();
        assert_eq!(key.as_str(), "0017");
        assert_eq!(index.page_of(&key).as_str(), "1");

        let (start, end) = index.page_range(&PageId::from("1"));
        assert_eq!(start, "0010");
        assert_eq!(end, "0020");
    }

    #[test]
    fn test_linear_rejects_non_integer() {
        let index = LinearBucketIndex::new(4, 10);
        assert!(index.normalize("17x").is_err());
    }

    #[test]
    fn test_linear_top_bucket_range_covers_its_keys() {
        let index = LinearBucketIndex::new(2, 10);
        let key = index.normalize("99").unwrap();
        let page = index.page_of(&key);
        assert_eq!(page.as_str(), "9");

        let (start, end) = index.page_range(&page);
        assert_eq!(start, "90");
        assert!(start.as_str() <= key.as_str() && key.as_str() < end.as_str());
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn column() -> impl Strategy<Value = String> {
        "[1-9A-Z][0-9A-Z]{0,7}"
    }

    proptest! {
        #[test]
        fn composite_encoding_is_injective(
            a in (column(), column()),
            b in (column(), column()),
        ) {
            let index = CompositeFixedWidthIndex::new(vec![8, 8], 1);
            let ka = index.encode(&[&a.0, &a.1]).unwrap();
            let kb = index.encode(&[&b.0, &b.1]).unwrap();

            prop_assert_eq!(a == b, ka == kb);
        }

        #[test]
        fn composite_roundtrips(parts in (column(), column(), column())) {
            let index = CompositeFixedWidthIndex::new(vec![8, 8, 8], 2);
            let key = index.encode(&[&parts.0, &parts.1, &parts.2]).unwrap();
            let back = index.decode(&key).unwrap();

            prop_assert_eq!(back, vec![parts.0, parts.1, parts.2]);
        }

        #[test]
        fn prefix_range_contains_exactly_own_keys(raw in "[0-9]{1,4}") {
            let index = PrefixOrderedIndex::new(4, 10);
            let key = index.normalize(&raw).unwrap();
            let page = index.page_of(&key);
            let (start, end) = index.page_range(&page);

            prop_assert!(start.as_str() <= key.as_str() && key.as_str() < end.as_str());
        }
    }
}
