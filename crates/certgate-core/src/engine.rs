//! Info patch engine
//!
//! Turns a client patch request into a validated RFC 6902 patch plus the
//! resulting info document. Two input modes are accepted:
//!
//! - **JSON Patch** (`application/json-patch+json`): the body is an RFC 6902
//!   operation list and is used as-is.
//! - **Merge patch** (`application/merge-patch+json`): the body is a partial
//!   object in RFC 7386 form. It is merged into a copy of the current
//!   document and the two documents are diffed, so `null` members become
//!   explicit `remove` operations.
//!
//! Either way the operation list is validated against the current document
//! before anything is applied. A patch that fails validation is a server-side
//! failure (500) whose message carries both the patch and the document.

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{CertgateError, Result};
use crate::patch::{self, Patch, PatchFailure};
use crate::record::InfoDocument;

pub const JSON_PATCH_CONTENT_TYPE: &str = "application/json-patch+json";
pub const MERGE_PATCH_CONTENT_TYPE: &str = "application/merge-patch+json";

/// How a patch body is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchMode {
    JsonPatch,
    MergePatch,
}

impl PatchMode {
    /// Select the mode from a `Content-Type` header value.
    ///
    /// Media type parameters (`; charset=utf-8`) are ignored and the
    /// comparison is case-insensitive.
    pub fn from_content_type(header: Option<&str>) -> Result<Self> {
        let header = header
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .ok_or_else(|| {
                CertgateError::InvalidInput(
                    "Missing content-type header specifying patch type".into(),
                )
            })?;

        let media_type = header.split(';').next().unwrap_or_default().trim();
        if media_type.eq_ignore_ascii_case(JSON_PATCH_CONTENT_TYPE) {
            Ok(PatchMode::JsonPatch)
        } else if media_type.eq_ignore_ascii_case(MERGE_PATCH_CONTENT_TYPE) {
            Ok(PatchMode::MergePatch)
        } else {
            Err(CertgateError::InvalidInput(
                "Content-type header value is invalid".into(),
            ))
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            PatchMode::JsonPatch => JSON_PATCH_CONTENT_TYPE,
            PatchMode::MergePatch => MERGE_PATCH_CONTENT_TYPE,
        }
    }
}

/// A validated patch and the document it produces
#[derive(Debug, Clone, PartialEq)]
pub struct PatchOutcome {
    pub patch: Patch,
    pub document: InfoDocument,
}

impl PatchOutcome {
    /// True when applying the patch changes nothing
    pub fn is_noop(&self) -> bool {
        self.patch.0.is_empty()
    }
}

/// Stateless patch computation over info documents
#[derive(Debug, Clone, Copy, Default)]
pub struct InfoPatchEngine;

impl InfoPatchEngine {
    pub fn new() -> Self {
        Self
    }

    /// Derive, validate and apply a patch against `current`.
    ///
    /// `current` is never modified.
    pub fn compute(
        &self,
        mode: PatchMode,
        current: &InfoDocument,
        body: &Value,
    ) -> Result<PatchOutcome> {
        let patch = self.derive(mode, current, body)?;
        let current_value = Value::Object(current.clone());

        let patched = self.validate(&patch, &current_value)?;
        let Value::Object(document) = patched else {
            return Err(CertgateError::InvalidInput(
                "Patched info must remain a JSON object".into(),
            ));
        };

        debug!(mode = ?mode, operations = patch.0.len(), "Computed info patch");
        Ok(PatchOutcome { patch, document })
    }

    /// Turn a request body into RFC 6902 operations.
    pub fn derive(&self, mode: PatchMode, current: &InfoDocument, body: &Value) -> Result<Patch> {
        match mode {
            PatchMode::JsonPatch => {
                let patch = patch::parse(body)?;
                if patch.0.is_empty() {
                    return Err(CertgateError::InvalidInput(
                        "Patch must be a non-empty list of operations".into(),
                    ));
                }
                Ok(patch)
            }
            PatchMode::MergePatch => {
                if !body.is_object() {
                    return Err(CertgateError::InvalidInput(
                        "Merge patch must be a JSON object".into(),
                    ));
                }
                let current = Value::Object(current.clone());
                let mut merged = current.clone();
                patch::merge(&mut merged, body);
                Ok(patch::diff(&current, &merged))
            }
        }
    }

    /// Apply the patch to a copy of `current` and return the result.
    pub fn validate(&self, patch: &Patch, current: &Value) -> Result<Value> {
        patch::apply(patch, current).map_err(|e| validation_failure(patch, current, &e))
    }
}

fn validation_failure(patch: &Patch, current: &Value, cause: &PatchFailure) -> CertgateError {
    warn!(error = %cause, "Patch failed validation");
    let patch = serde_json::to_value(patch).unwrap_or(Value::Null);
    CertgateError::Internal(format!(
        "Failed to validate the patch. Patch set: {} User's info object: {}",
        patch, current
    ))
}
