//! Ordered key-value metadata store.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::cursor::ByteCursor;
use crate::error::{ContainerError, Result};
use crate::value::{Value, ValueType, encode_str};
use crate::{DEFAULT_ALIGNMENT, KEY_ALIGNMENT, KEY_ARCHITECTURE, is_header_key};

/// A single key-value metadata entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataEntry {
    pub key: String,
    pub value: Value,
}

impl MetadataEntry {
    /// Appends `string key || u32 type_tag || payload`.
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        encode_str(&self.key, out);
        out.extend_from_slice(&self.value.value_type().as_u32().to_le_bytes());
        self.value.encode_into(out);
    }

    /// Reads one entry, advancing `cur` past it.
    pub fn decode(cur: &mut ByteCursor<'_>) -> Result<Self> {
        let key = cur.read_string()?;
        let tag_at = cur.position();
        let tag = cur.read_u32()?;
        let ty = ValueType::from_u32(tag)
            .ok_or(ContainerError::UnknownValueType { tag, offset: tag_at as u64 })?;
        let value = Value::decode(cur, ty)?;
        Ok(Self { key, value })
    }
}

/// Insertion-ordered map from unique keys to typed values.
///
/// Iteration order is part of the on-disk contract: entries are written in
/// exactly the order they were inserted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataStore {
    entries: Vec<MetadataEntry>,
    index: HashMap<String, usize>,
}

impl MetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose only entry is `general.architecture`.
    pub(crate) fn with_architecture(architecture: &str) -> Self {
        let mut store = Self::new();
        store.index.insert(KEY_ARCHITECTURE.to_owned(), 0);
        store.entries.push(MetadataEntry { key: KEY_ARCHITECTURE.to_owned(), value: architecture.into() });
        store
    }

    /// Appends an entry. Fails with `DuplicateKey` if the key exists (the
    /// store is left unchanged) and `ReservedKey` for header pseudo-keys.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Result<()> {
        let key = key.into();
        if is_header_key(&key) {
            return Err(ContainerError::ReservedKey(key));
        }
        if self.index.contains_key(&key) {
            return Err(ContainerError::DuplicateKey(key));
        }
        self.index.insert(key.clone(), self.entries.len());
        self.entries.push(MetadataEntry { key, value: value.into() });
        Ok(())
    }

    pub fn get(&self, key: &str) -> Result<&Value> {
        self.index
            .get(key)
            .map(|&i| &self.entries[i].value)
            .ok_or_else(|| ContainerError::KeyNotFound(key.to_owned()))
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Deletes `key` if present and returns its value. Absent keys are a no-op.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let pos = self.index.remove(key)?;
        let entry = self.entries.remove(pos);
        for slot in self.index.values_mut() {
            if *slot > pos {
                *slot -= 1;
            }
        }
        Some(entry.value)
    }

    /// Entries in insertion order. Each call starts a fresh iteration.
    pub fn iter(&self) -> std::slice::Iter<'_, MetadataEntry> {
        self.entries.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.key.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // ---- typed getters ----

    pub fn get_str(&self, key: &str) -> Result<&str> {
        let v = self.get(key)?;
        v.as_str().ok_or_else(|| type_mismatch(key, ValueType::String, v))
    }

    pub fn get_bool(&self, key: &str) -> Result<bool> {
        let v = self.get(key)?;
        v.as_bool().ok_or_else(|| type_mismatch(key, ValueType::Bool, v))
    }

    pub fn get_u64(&self, key: &str) -> Result<u64> {
        let v = self.get(key)?;
        v.as_u64().ok_or_else(|| type_mismatch(key, ValueType::Uint64, v))
    }

    pub fn get_u32(&self, key: &str) -> Result<u32> {
        let v = self.get(key)?;
        v.as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| type_mismatch(key, ValueType::Uint32, v))
    }

    pub fn get_f32(&self, key: &str) -> Result<f32> {
        match self.get(key)? {
            Value::F32(f) => Ok(*f),
            v => Err(type_mismatch(key, ValueType::Float32, v)),
        }
    }

    pub fn get_str_array(&self, key: &str) -> Result<Vec<&str>> {
        let v = self.get(key)?;
        match v.as_array() {
            Some(a) if a.elem_type() == ValueType::String => {
                Ok(a.items().iter().filter_map(Value::as_str).collect())
            }
            _ => Err(type_mismatch(key, ValueType::Array, v)),
        }
    }

    /// The `general.architecture` string.
    pub fn architecture(&self) -> Result<&str> {
        self.get_str(KEY_ARCHITECTURE)
    }

    /// The declared tensor alignment, or the default when no
    /// `general.alignment` entry exists.
    pub fn alignment(&self) -> Result<u64> {
        match self.get(KEY_ALIGNMENT) {
            Ok(v) => {
                let align = v
                    .as_u64()
                    .ok_or_else(|| type_mismatch(KEY_ALIGNMENT, ValueType::Uint32, v))?;
                crate::validate_alignment(align)
            }
            Err(ContainerError::KeyNotFound(_)) => Ok(DEFAULT_ALIGNMENT),
            Err(e) => Err(e),
        }
    }

    /// Reads `count` entries from `cur`. Any failure discards everything
    /// read so far.
    pub fn decode(cur: &mut ByteCursor<'_>, count: u64) -> Result<Self> {
        let mut store = Self::new();
        for _ in 0..count {
            let at = cur.position();
            let entry = MetadataEntry::decode(cur)?;
            tracing::trace!(key = %entry.key, ty = %entry.value.value_type(), offset = at, "metadata entry");
            if is_header_key(&entry.key) {
                return Err(ContainerError::malformed(
                    at,
                    format!("header field `{}` stored as a metadata entry", entry.key),
                ));
            }
            if store.contains_key(&entry.key) {
                return Err(ContainerError::malformed(at, format!("duplicate key `{}`", entry.key)));
            }
            store.insert(entry.key, entry.value)?;
        }
        Ok(store)
    }

    pub fn encode_into(&self, out: &mut Vec<u8>) {
        for entry in &self.entries {
            entry.encode_into(out);
        }
    }
}

impl<'a> IntoIterator for &'a MetadataStore {
    type Item = &'a MetadataEntry;
    type IntoIter = std::slice::Iter<'a, MetadataEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

fn type_mismatch(key: &str, expected: ValueType, actual: &Value) -> ContainerError {
    ContainerError::TypeMismatch {
        key: key.to_owned(),
        expected: expected.name(),
        actual: actual.value_type().name(),
    }
}
