//! Structural validation of raw documents against the embedded JSON schemas.
//!
//! Unlike the business-rule layer, this layer collects every violation in one pass.
//! Each violation is rendered as a short sentence and then run through
//! [`enhance_error_message`] so the final text names the field, the reason, and a fix.

use jsonschema::error::ValidationErrorKind;
use jsonschema::Validator;
use kdeps_types::{
    KdepsError, MultipleValidationError, Result, SchemaCheck, SchemaType, ValidationError,
    ValidationKind,
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::suggestions::enhance_error_message;

const WORKFLOW_SCHEMA: &str = include_str!("../schemas/workflow.json");
const RESOURCE_SCHEMA: &str = include_str!("../schemas/resource.json");

static EXPECTED_TYPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"is not of types? "?(\w+)"#).expect("type regex should compile"));

/// Compiled workflow and resource schemas. Immutable after construction.
pub struct SchemaValidator {
    workflow: Validator,
    resource: Validator,
}

impl std::fmt::Debug for SchemaValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaValidator").finish_non_exhaustive()
    }
}

impl SchemaValidator {
    pub fn new() -> Result<Self> {
        Ok(Self {
            workflow: compile(SchemaType::Workflow, WORKFLOW_SCHEMA)?,
            resource: compile(SchemaType::Resource, RESOURCE_SCHEMA)?,
        })
    }

    pub fn validate_workflow(&self, doc: &Value) -> Result<()> {
        self.validate(doc, SchemaType::Workflow)
    }

    pub fn validate_resource(&self, doc: &Value) -> Result<()> {
        self.validate(doc, SchemaType::Resource)
    }

    /// Validate `doc` and return every violation as one aggregated error.
    ///
    /// Workflow documents also have each inline `resources[i]` checked against the
    /// resource schema, with field paths prefixed by `resources.<i>`.
    pub fn validate(&self, doc: &Value, schema: SchemaType) -> Result<()> {
        let mut errors = MultipleValidationError::new();
        match schema {
            SchemaType::Workflow => {
                collect(&self.workflow, doc, schema, "", &mut errors);
                if let Some(resources) = doc.get("resources").and_then(Value::as_array) {
                    for (i, resource) in resources.iter().enumerate() {
                        if resource.is_object() {
                            let prefix = format!("resources.{i}");
                            collect(&self.resource, resource, SchemaType::Resource, &prefix, &mut errors);
                        }
                    }
                }
            }
            SchemaType::Resource => collect(&self.resource, doc, schema, "", &mut errors),
        }

        tracing::debug!(schema = %schema, violations = errors.len(), "schema validation finished");
        errors
            .into_result()
            .map_err(|errors| KdepsError::SchemaValidation { schema, errors })
    }
}

impl SchemaCheck for SchemaValidator {
    fn check(&self, doc: &Value, schema: SchemaType) -> Result<()> {
        self.validate(doc, schema)
    }
}

fn compile(schema: SchemaType, text: &str) -> Result<Validator> {
    let value: Value = serde_json::from_str(text)?;
    jsonschema::draft7::new(&value).map_err(|e| KdepsError::SchemaCompile {
        schema,
        message: e.to_string(),
    })
}

fn collect(
    validator: &Validator,
    doc: &Value,
    schema: SchemaType,
    prefix: &str,
    out: &mut MultipleValidationError,
) {
    for err in validator.iter_errors(doc) {
        let violation = describe(&err, prefix);
        let message = enhance_error_message(
            &violation.field,
            violation.error_type,
            &violation.description,
            schema,
        );
        let mut diag = ValidationError::new(violation.field, violation.kind, message);
        if violation.kind != ValidationKind::Required {
            diag = diag.with_value(err.instance.as_ref().clone());
        }
        out.push(diag);
    }
}

// ---------------------------------------------------------------------------
// Violation rendering
// ---------------------------------------------------------------------------

struct Violation {
    field: String,
    error_type: &'static str,
    description: String,
    kind: ValidationKind,
}

fn describe(err: &jsonschema::ValidationError<'_>, prefix: &str) -> Violation {
    let field = join_path(prefix, &pointer_to_path(&err.instance_path.to_string()));
    let leaf = field.rsplit('.').next().filter(|s| !s.is_empty()).unwrap_or("(root)");

    let (error_type, description, kind) = match &err.kind {
        ValidationErrorKind::Type { .. } => {
            let text = err.to_string();
            let expected = EXPECTED_TYPE
                .captures(&text)
                .map(|c| c[1].to_string())
                .unwrap_or_else(|| "unknown".to_string());
            (
                "type",
                format!(
                    "Invalid type. Expected: {expected}, given: {}",
                    json_type_name(&err.instance)
                ),
                ValidationKind::Type,
            )
        }
        ValidationErrorKind::Required { property } => {
            let name = property
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| property.to_string());
            return Violation {
                field: join_path(&field, &name),
                error_type: "required",
                description: format!("{name} is required"),
                kind: ValidationKind::Required,
            };
        }
        ValidationErrorKind::Pattern { pattern } => (
            "pattern",
            format!("Does not match pattern '{pattern}'"),
            ValidationKind::Pattern,
        ),
        ValidationErrorKind::Minimum { limit } => (
            "number_gte",
            format!("Must be greater than or equal to {limit}"),
            ValidationKind::Minimum,
        ),
        ValidationErrorKind::Maximum { limit } => (
            "number_lte",
            format!("Must be less than or equal to {limit}"),
            ValidationKind::Maximum,
        ),
        ValidationErrorKind::Enum { options } => {
            let allowed = options
                .as_array()
                .map(|values| {
                    values
                        .iter()
                        .map(Value::to_string)
                        .collect::<Vec<_>>()
                        .join(", ")
                })
                .unwrap_or_else(|| options.to_string());
            (
                "enum",
                format!("{leaf} must be one of the following: {allowed}"),
                ValidationKind::Enum,
            )
        }
        ValidationErrorKind::AdditionalProperties { unexpected } => (
            "additional_property_not_allowed",
            format!("Additional property {} is not allowed", unexpected.join(", ")),
            ValidationKind::Schema,
        ),
        ValidationErrorKind::MinLength { limit } => (
            "string_gte",
            format!("String length must be greater than or equal to {limit}"),
            ValidationKind::MinLength,
        ),
        ValidationErrorKind::MaxLength { limit } => (
            "string_lte",
            format!("String length must be less than or equal to {limit}"),
            ValidationKind::MaxLength,
        ),
        ValidationErrorKind::MinItems { limit } => (
            "array_min_items",
            format!("Array must have at least {limit} items"),
            ValidationKind::MinItems,
        ),
        ValidationErrorKind::MaxItems { limit } => (
            "array_max_items",
            format!("Array must have at most {limit} items"),
            ValidationKind::MaxItems,
        ),
        _ => ("schema", err.to_string(), ValidationKind::Schema),
    };

    Violation {
        field,
        error_type,
        description,
        kind,
    }
}

/// `/settings/apiServer/routes/0/path` -> `settings.apiServer.routes.0.path`
fn pointer_to_path(pointer: &str) -> String {
    pointer
        .split('/')
        .filter(|seg| !seg.is_empty())
        .map(|seg| seg.replace("~1", "/").replace("~0", "~"))
        .collect::<Vec<_>>()
        .join(".")
}

fn join_path(parent: &str, child: &str) -> String {
    match (parent.is_empty(), child.is_empty()) {
        (true, _) => child.to_string(),
        (false, true) => parent.to_string(),
        (false, false) => format!("{parent}.{child}"),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
