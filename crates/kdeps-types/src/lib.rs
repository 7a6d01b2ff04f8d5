//! Shared types, errors, and diagnostics for the kdeps workflow validation engine.
//!
//! This crate provides the foundational types used across all other kdeps crates:
//! - `KdepsError`: unified error taxonomy with [`ErrorCode`] tags
//! - `ValidationError` / `MultipleValidationError`: field-level diagnostics
//! - `Workflow`, `Resource`, `RunConfig`: the typed workflow model
//! - `SchemaCheck`: hook the loader calls to validate raw documents

pub mod input;
pub mod resource;
pub mod rules;
pub mod workflow;

pub use input::*;
pub use resource::*;
pub use rules::*;
pub use workflow::*;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Unified error type for all kdeps subsystems.
#[derive(Debug, thiserror::Error)]
pub enum KdepsError {
    // === Parser Errors ===
    #[error("failed to parse {path}: {message}")]
    ParseError { path: String, message: String },

    #[error("failed to parse resource file {path}: {source}")]
    ResourceFile {
        path: String,
        source: Box<KdepsError>,
    },

    // === Schema Errors ===
    #[error("{schema} validation failed:\n{}", .errors.bullet_list())]
    SchemaValidation {
        schema: SchemaType,
        errors: MultipleValidationError,
    },

    #[error("failed to compile {schema} schema: {message}")]
    SchemaCompile { schema: SchemaType, message: String },

    // === Business Rule Errors ===
    #[error("{0}")]
    InvalidWorkflow(String),

    #[error("{0}")]
    InvalidResource(String),

    #[error("invalid resource '{action_id}': {source}")]
    ResourceFailed {
        action_id: String,
        source: Box<KdepsError>,
    },

    // === Expression Errors ===
    #[error(transparent)]
    Validation(#[from] MultipleValidationError),

    #[error("evaluator is required to validate custom rules")]
    MissingEvaluator,

    #[error("expression '{expr}': {message}")]
    Expression { expr: String, message: String },

    // === Generic ===
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

/// Coarse error category, stable across message wording changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ParseError,
    ValidationFailed,
    InvalidWorkflow,
    InvalidResource,
    ExpressionError,
    Internal,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCode::ParseError => "PARSE_ERROR",
            ErrorCode::ValidationFailed => "VALIDATION_FAILED",
            ErrorCode::InvalidWorkflow => "INVALID_WORKFLOW",
            ErrorCode::InvalidResource => "INVALID_RESOURCE",
            ErrorCode::ExpressionError => "EXPRESSION_ERROR",
            ErrorCode::Internal => "INTERNAL",
        };
        f.write_str(s)
    }
}

impl KdepsError {
    pub fn code(&self) -> ErrorCode {
        match self {
            KdepsError::ParseError { .. } | KdepsError::ResourceFile { .. } => {
                ErrorCode::ParseError
            }
            KdepsError::SchemaValidation { .. } => ErrorCode::ValidationFailed,
            KdepsError::InvalidWorkflow(_) => ErrorCode::InvalidWorkflow,
            KdepsError::InvalidResource(_) | KdepsError::ResourceFailed { .. } => {
                ErrorCode::InvalidResource
            }
            KdepsError::Validation(_)
            | KdepsError::MissingEvaluator
            | KdepsError::Expression { .. } => ErrorCode::ExpressionError,
            KdepsError::SchemaCompile { .. }
            | KdepsError::Io(_)
            | KdepsError::Json(_)
            | KdepsError::Other(_) => ErrorCode::Internal,
        }
    }

    /// Returns the field-level diagnostics carried by this error, if any.
    pub fn diagnostics(&self) -> &[ValidationError] {
        match self {
            KdepsError::SchemaValidation { errors, .. } | KdepsError::Validation(errors) => {
                &errors.errors
            }
            KdepsError::ResourceFailed { source, .. } | KdepsError::ResourceFile { source, .. } => {
                source.diagnostics()
            }
            _ => &[],
        }
    }
}

/// A convenience alias for `Result<T, KdepsError>`.
pub type Result<T> = std::result::Result<T, KdepsError>;

// ---------------------------------------------------------------------------
// Schema selection
// ---------------------------------------------------------------------------

/// Which embedded schema a raw document is checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaType {
    Workflow,
    Resource,
}

impl SchemaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaType::Workflow => "workflow",
            SchemaType::Resource => "resource",
        }
    }
}

impl fmt::Display for SchemaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SchemaType {
    type Err = KdepsError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "workflow" => Ok(SchemaType::Workflow),
            "resource" => Ok(SchemaType::Resource),
            other => Err(KdepsError::Other(format!("unknown schema type: {other}"))),
        }
    }
}

/// Validates an untyped document before it is deserialized into the typed model.
pub trait SchemaCheck: Send + Sync {
    fn check(&self, doc: &serde_json::Value, schema: SchemaType) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Diagnostics
// ---------------------------------------------------------------------------

/// What kind of check produced a [`ValidationError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ValidationKind {
    Required,
    Type,
    MinLength,
    MaxLength,
    Pattern,
    Minimum,
    Maximum,
    MinItems,
    MaxItems,
    Enum,
    Schema,
    Expression,
    Custom,
}

impl fmt::Display for ValidationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ValidationKind::Required => "required",
            ValidationKind::Type => "type",
            ValidationKind::MinLength => "minLength",
            ValidationKind::MaxLength => "maxLength",
            ValidationKind::Pattern => "pattern",
            ValidationKind::Minimum => "minimum",
            ValidationKind::Maximum => "maximum",
            ValidationKind::MinItems => "minItems",
            ValidationKind::MaxItems => "maxItems",
            ValidationKind::Enum => "enum",
            ValidationKind::Schema => "schema",
            ValidationKind::Expression => "expression",
            ValidationKind::Custom => "custom",
        };
        f.write_str(s)
    }
}

/// A single field-level diagnostic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationError {
    pub field: String,
    #[serde(rename = "type")]
    pub kind: ValidationKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, kind: ValidationKind, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            kind,
            message: message.into(),
            value: None,
        }
    }

    pub fn with_value(mut self, value: serde_json::Value) -> Self {
        self.value = Some(value);
        self
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.field.is_empty() {
            write!(f, "validation error: {}", self.message)
        } else {
            write!(f, "validation error on field '{}': {}", self.field, self.message)
        }
    }
}

impl std::error::Error for ValidationError {}

/// Every diagnostic found in one collecting pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MultipleValidationError {
    pub errors: Vec<ValidationError>,
}

impl MultipleValidationError {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn extend(&mut self, other: MultipleValidationError) {
        self.errors.extend(other.errors);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ValidationError> {
        self.errors.iter()
    }

    /// `Ok(())` when nothing was collected.
    pub fn into_result(self) -> std::result::Result<(), Self> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }

    /// One `  - field: message` line per diagnostic.
    pub fn bullet_list(&self) -> String {
        let mut out = String::new();
        for err in &self.errors {
            let field = if err.field.is_empty() { "(root)" } else { &err.field };
            out.push_str(&format!("  - {}: {}\n", field, err.message));
        }
        out
    }
}

impl fmt::Display for MultipleValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.errors.as_slice() {
            [] => f.write_str("no validation errors"),
            [only] => only.fmt(f),
            many => write!(f, "{} validation errors occurred", many.len()),
        }
    }
}

impl std::error::Error for MultipleValidationError {}

impl FromIterator<ValidationError> for MultipleValidationError {
    fn from_iter<I: IntoIterator<Item = ValidationError>>(iter: I) -> Self {
        Self {
            errors: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a MultipleValidationError {
    type Item = &'a ValidationError;
    type IntoIter = std::slice::Iter<'a, ValidationError>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.iter()
    }
}
