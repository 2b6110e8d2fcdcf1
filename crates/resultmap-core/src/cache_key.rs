//! Row identity keys.
//!
//! A [`CacheKey`] is an ordered accumulation of parts (result map ids,
//! column names, column values, other keys). Two keys are equal iff they were
//! fed equal parts in the same order. The nested mapping pipeline uses them to
//! decide whether a row continues an object seen on an earlier row; the
//! sub-query executor uses them to address its local cache.

use crate::error::{Error, Result};
use crate::value::Value;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

const DEFAULT_MULTIPLIER: i32 = 37;
const DEFAULT_HASHCODE: i32 = 17;

/// One component of a [`CacheKey`].
#[derive(Debug, Clone, PartialEq)]
pub enum KeyPart {
    Text(String),
    Value(Value),
    Key(CacheKey),
}

impl KeyPart {
    fn base_hash(&self) -> i32 {
        match self {
            KeyPart::Value(Value::Null) => 1,
            KeyPart::Value(v) => {
                let mut hasher = DefaultHasher::new();
                v.hash(&mut hasher);
                fold_hash(hasher.finish())
            }
            KeyPart::Text(s) => s
                .chars()
                .fold(0i32, |h, c| h.wrapping_mul(31).wrapping_add(c as i32)),
            KeyPart::Key(k) => k.hashcode,
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn fold_hash(h: u64) -> i32 {
    (h ^ (h >> 32)) as i32
}

impl From<&str> for KeyPart {
    fn from(v: &str) -> Self {
        KeyPart::Text(v.to_string())
    }
}

impl From<String> for KeyPart {
    fn from(v: String) -> Self {
        KeyPart::Text(v)
    }
}

impl From<Value> for KeyPart {
    fn from(v: Value) -> Self {
        KeyPart::Value(v)
    }
}

impl From<&Value> for KeyPart {
    fn from(v: &Value) -> Self {
        KeyPart::Value(v.clone())
    }
}

impl From<CacheKey> for KeyPart {
    fn from(v: CacheKey) -> Self {
        KeyPart::Key(v)
    }
}

/// Ordered, hashable identity key.
///
/// `Clone` is a deep copy: the clone can be updated without affecting the
/// original.
#[derive(Debug, Clone)]
pub struct CacheKey {
    multiplier: i32,
    hashcode: i32,
    checksum: i64,
    count: i32,
    parts: Vec<KeyPart>,
    sealed: bool,
}

impl CacheKey {
    /// The "no identity" sentinel. Rows keyed by it are never merged or
    /// memoized, and it rejects every update.
    pub const NULL: CacheKey = CacheKey {
        multiplier: DEFAULT_MULTIPLIER,
        hashcode: DEFAULT_HASHCODE,
        checksum: 0,
        count: 0,
        parts: Vec::new(),
        sealed: true,
    };

    pub fn new() -> Self {
        Self {
            multiplier: DEFAULT_MULTIPLIER,
            hashcode: DEFAULT_HASHCODE,
            checksum: 0,
            count: 0,
            parts: Vec::new(),
            sealed: false,
        }
    }

    /// Build a key from a sequence of parts.
    pub fn from_parts<I, P>(parts: I) -> Result<Self>
    where
        I: IntoIterator<Item = P>,
        P: Into<KeyPart>,
    {
        let mut key = Self::new();
        key.update_all(parts)?;
        Ok(key)
    }

    /// Append one part.
    pub fn update(&mut self, part: impl Into<KeyPart>) -> Result<()> {
        if self.sealed {
            return Err(Error::InvalidOperation(
                "not allowed to update the null identity key".to_string(),
            ));
        }
        let part = part.into();
        let base = part.base_hash();
        self.count += 1;
        self.checksum = self.checksum.wrapping_add(i64::from(base));
        self.hashcode = self
            .multiplier
            .wrapping_mul(self.hashcode)
            .wrapping_add(base.wrapping_mul(self.count));
        self.parts.push(part);
        Ok(())
    }

    /// Append every part in order.
    pub fn update_all<I, P>(&mut self, parts: I) -> Result<()>
    where
        I: IntoIterator<Item = P>,
        P: Into<KeyPart>,
    {
        for part in parts {
            self.update(part)?;
        }
        Ok(())
    }

    /// Number of parts fed so far.
    pub fn update_count(&self) -> usize {
        self.parts.len()
    }

    /// Is this the "no identity" sentinel?
    pub fn is_null(&self) -> bool {
        self.sealed
    }

    pub fn parts(&self) -> &[KeyPart] {
        &self.parts
    }

    /// Combine a nested row key with its parent's key.
    ///
    /// The result is the sentinel unless both keys carry more than one part,
    /// so a child without identity never merges across parents.
    pub fn combine(row_key: &CacheKey, parent_key: &CacheKey) -> Result<CacheKey> {
        if row_key.update_count() > 1 && parent_key.update_count() > 1 {
            let mut combined = row_key.clone();
            combined.update(parent_key.clone())?;
            Ok(combined)
        } else {
            Ok(CacheKey::NULL)
        }
    }
}

impl Default for CacheKey {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for CacheKey {
    fn eq(&self, other: &Self) -> bool {
        self.hashcode == other.hashcode
            && self.checksum == other.checksum
            && self.count == other.count
            && self.parts == other.parts
    }
}

impl Eq for CacheKey {}

impl Hash for CacheKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.hashcode.hash(state);
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.hashcode, self.checksum)?;
        for part in &self.parts {
            match part {
                KeyPart::Text(s) => write!(f, ":{}", s)?,
                KeyPart::Value(v) => write!(f, ":{}", v.to_display_string())?,
                KeyPart::Key(k) => write!(f, ":[{}]", k)?,
            }
        }
        Ok(())
    }
}
