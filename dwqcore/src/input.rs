use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Upper bound on the serialized size of a [`Data`] payload, in bytes.
pub const MAX_DATA_SIZE: usize = 10 * 1024;

/// A single tagged value carried by a [`Data`] payload.
///
/// Values are restricted to primitive scalars and homogeneous arrays of
/// them so that every payload has a stable, canonical JSON encoding.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind", content = "value")]
pub enum Value {
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Bool(bool),
    Str(String),
    Bytes(Vec<u8>),
    I32Array(Vec<i32>),
    I64Array(Vec<i64>),
    F32Array(Vec<f32>),
    F64Array(Vec<f64>),
    BoolArray(Vec<bool>),
    StrArray(Vec<String>),
    BytesArray(Vec<Vec<u8>>),
}

/// The key-value payload attached to work as its input, output or
/// progress. Keys are ordered so the serialized form is canonical.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct Data(BTreeMap<String, Value>);

mod impls;
