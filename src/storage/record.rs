// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Keys, field values, and versioned records.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A normalized primary key.
///
/// Keys are fixed-width strings; normalization (left-padding to the index's
/// declared width) is performed by the [`PageIndex`](super::PageIndex)
/// before a key enters the storage layer, so two spellings of the same
/// logical key always collide here.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Key(pub String);

impl Key {
    /// Creates a key from an already-normalized string.
    #[inline]
    pub fn new(s: String) -> Self {
        Self(s)
    }

    /// Returns the key as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the length of the key.
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the key is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for Key {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A field value: an integer or a short string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Int(i64),
    Str(String),
}

impl FieldValue {
    /// Returns the integer value, if this is an integer field.
    #[inline]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            Self::Str(_) => None,
        }
    }

    /// Returns the string value, if this is a string field.
    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Int(_) => None,
            Self::Str(s) => Some(s),
        }
    }
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

/// An immutable snapshot of one row.
///
/// `version` increases by one on every successful commit that modifies the
/// key, deletion included. `deleted = true` means the key is invisible to
/// readers but still occupies its version, so a later re-insert continues
/// the sequence instead of restarting it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub fields: BTreeMap<String, FieldValue>,
    pub version: u64,
    pub deleted: bool,
}

impl Record {
    /// Creates a live record at the given version.
    pub fn new(fields: BTreeMap<String, FieldValue>, version: u64) -> Self {
        Self {
            fields,
            version,
            deleted: false,
        }
    }

    /// The committed view of a key that has never been written.
    pub fn absent() -> Self {
        Self {
            fields: BTreeMap::new(),
            version: 0,
            deleted: true,
        }
    }

    /// Creates a tombstone occupying the given version.
    pub fn tombstone(version: u64) -> Self {
        Self {
            fields: BTreeMap::new(),
            version,
            deleted: true,
        }
    }

    /// Returns true if the record is visible to readers.
    #[inline]
    pub fn is_live(&self) -> bool {
        !self.deleted
    }

    /// Returns an integer field by name.
    #[inline]
    pub fn int_field(&self, name: &str) -> Option<i64> {
        self.fields.get(name).and_then(FieldValue::as_int)
    }

    /// Returns a string field by name.
    #[inline]
    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(FieldValue::as_str)
    }

    /// Sets a single field.
    pub fn set_field(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(name.into(), value.into());
    }

    /// Merges a partial update into the field map. Fields present in the
    /// patch replace existing values; fields absent from the patch are kept.
    pub fn merge_patch(&mut self, patch: &BTreeMap<String, FieldValue>) {
        for (name, value) in patch {
            self.fields.insert(name.clone(), value.clone());
        }
    }
}

/// Builds a field map from `(name, value)` pairs.
pub fn fields<I, N, V>(pairs: I) -> BTreeMap<String, FieldValue>
where
    I: IntoIterator<Item = (N, V)>,
    N: Into<String>,
    V: Into<FieldValue>,
{
    pairs
        .into_iter()
        .map(|(n, v)| (n.into(), v.into()))
        .collect()
}
