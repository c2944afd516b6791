//! RFC 6902 operation lists
//!
//! Parsing, diffing and merging come from the `json-patch` crate. Applying
//! goes through [`apply`], which evaluates `test` operations itself so that
//! numbers compare by value (`1` equals `1.0`) rather than by representation.

use serde_json::Value;
use thiserror::Error;

use crate::error::{CertgateError, Result};

pub use json_patch::{diff, merge, Patch, PatchOperation};

/// Why an operation list could not be applied
#[derive(Debug, Error)]
pub enum PatchFailure {
    #[error("operation {index}: {source}")]
    Operation {
        index: usize,
        #[source]
        source: json_patch::PatchError,
    },

    #[error("operation {index}: path '{path}' does not exist")]
    TestPathMissing { index: usize, path: String },

    #[error("operation {index}: value at '{path}' does not match")]
    TestFailed { index: usize, path: String },
}

/// Parse a request body as an operation list.
pub fn parse(body: &Value) -> Result<Patch> {
    if !body.is_array() {
        return Err(CertgateError::InvalidInput(
            "Invalid patch: expected a list of operations".into(),
        ));
    }
    serde_json::from_value(body.clone())
        .map_err(|e| CertgateError::InvalidInput(format!("Invalid patch: {}", e)))
}

/// Apply every operation to a copy of `doc`.
///
/// All or nothing: on failure the caller's document is untouched.
pub fn apply(patch: &Patch, doc: &Value) -> std::result::Result<Value, PatchFailure> {
    let mut patched = doc.clone();
    for (index, op) in patch.0.iter().enumerate() {
        match op {
            PatchOperation::Test(test) => {
                let path = test.path.to_string();
                let actual = patched
                    .pointer(&path)
                    .ok_or_else(|| PatchFailure::TestPathMissing {
                        index,
                        path: path.clone(),
                    })?;
                if !json_equal(actual, &test.value) {
                    return Err(PatchFailure::TestFailed { index, path });
                }
            }
            _ => json_patch::patch(&mut patched, std::slice::from_ref(op))
                .map_err(|source| PatchFailure::Operation { index, source })?,
        }
    }
    Ok(patched)
}

/// Structural equality where numbers compare by numeric value.
pub fn json_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            if let (Some(x), Some(y)) = (x.as_i64(), y.as_i64()) {
                x == y
            } else if let (Some(x), Some(y)) = (x.as_u64(), y.as_u64()) {
                x == y
            } else {
                x.as_f64() == y.as_f64()
            }
        }
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(x, y)| json_equal(x, y))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(k, v)| y.get(k).is_some_and(|w| json_equal(v, w)))
        }
        _ => a == b,
    }
}
