use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::ops::Deref;

use crate::input::{Data, Value};

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::I32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::I64(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::F32(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::F64(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(v.into())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl Deref for Data {
    type Target = BTreeMap<String, Value>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl FromIterator<(String, Value)> for Data {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Data {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    /// The size of the canonical JSON encoding, measured against
    /// [`MAX_DATA_SIZE`](crate::input::MAX_DATA_SIZE) at ingest.
    pub fn encoded_len(&self) -> Result<usize, serde_json::Error> {
        Ok(serde_json::to_vec(self)?.len())
    }

    /// Merge `sources` in order, later entries overwriting earlier ones
    /// key by key.
    pub fn overwrite_merge(sources: impl IntoIterator<Item = Data>) -> Data {
        let mut result = Data::new();
        for source in sources {
            result.0.extend(source.0);
        }
        result
    }

    /// Merge `sources` in order, collecting every value seen for a key
    /// into the homogeneous array variant of its kind. Scalars and
    /// arrays of the same kind flatten together; a kind mismatch resets
    /// the key to the latest value.
    pub fn array_collect_merge(sources: impl IntoIterator<Item = Data>) -> Data {
        let mut buckets: BTreeMap<String, Bucket> = BTreeMap::new();
        for source in sources {
            for (key, value) in source.0 {
                match buckets.entry(key) {
                    Entry::Occupied(mut entry) => {
                        if let Err(value) = entry.get_mut().push(value) {
                            entry.insert(Bucket::seed(value));
                        }
                    }
                    Entry::Vacant(entry) => {
                        entry.insert(Bucket::seed(value));
                    }
                }
            }
        }
        Data(
            buckets
                .into_iter()
                .map(|(key, bucket)| (key, bucket.into_value()))
                .collect()
        )
    }
}

/// Accumulator for one key during an array-collecting merge.
enum Bucket {
    I32(Vec<i32>),
    I64(Vec<i64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
    Bool(Vec<bool>),
    Str(Vec<String>),
    Bytes(Vec<Vec<u8>>),
}

impl Bucket {
    fn seed(value: Value) -> Self {
        match value {
            Value::I32(v) => Self::I32(vec![v]),
            Value::I64(v) => Self::I64(vec![v]),
            Value::F32(v) => Self::F32(vec![v]),
            Value::F64(v) => Self::F64(vec![v]),
            Value::Bool(v) => Self::Bool(vec![v]),
            Value::Str(v) => Self::Str(vec![v]),
            Value::Bytes(v) => Self::Bytes(vec![v]),
            Value::I32Array(v) => Self::I32(v),
            Value::I64Array(v) => Self::I64(v),
            Value::F32Array(v) => Self::F32(v),
            Value::F64Array(v) => Self::F64(v),
            Value::BoolArray(v) => Self::Bool(v),
            Value::StrArray(v) => Self::Str(v),
            Value::BytesArray(v) => Self::Bytes(v),
        }
    }

    /// Fold `value` into the accumulator; returns the value back when
    /// its kind does not match so the caller can reseed.
    fn push(&mut self, value: Value) -> Result<(), Value> {
        match (self, value) {
            (Self::I32(acc), Value::I32(v)) => acc.push(v),
            (Self::I32(acc), Value::I32Array(v)) => acc.extend(v),
            (Self::I64(acc), Value::I64(v)) => acc.push(v),
            (Self::I64(acc), Value::I64Array(v)) => acc.extend(v),
            (Self::F32(acc), Value::F32(v)) => acc.push(v),
            (Self::F32(acc), Value::F32Array(v)) => acc.extend(v),
            (Self::F64(acc), Value::F64(v)) => acc.push(v),
            (Self::F64(acc), Value::F64Array(v)) => acc.extend(v),
            (Self::Bool(acc), Value::Bool(v)) => acc.push(v),
            (Self::Bool(acc), Value::BoolArray(v)) => acc.extend(v),
            (Self::Str(acc), Value::Str(v)) => acc.push(v),
            (Self::Str(acc), Value::StrArray(v)) => acc.extend(v),
            (Self::Bytes(acc), Value::Bytes(v)) => acc.push(v),
            (Self::Bytes(acc), Value::BytesArray(v)) => acc.extend(v),
            (_, value) => return Err(value),
        }
        Ok(())
    }

    fn into_value(self) -> Value {
        match self {
            Self::I32(v) => Value::I32Array(v),
            Self::I64(v) => Value::I64Array(v),
            Self::F32(v) => Value::F32Array(v),
            Self::F64(v) => Value::F64Array(v),
            Self::Bool(v) => Value::BoolArray(v),
            Self::Str(v) => Value::StrArray(v),
            Self::Bytes(v) => Value::BytesArray(v),
        }
    }
}
