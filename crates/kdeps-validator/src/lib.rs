//! Validation for kdeps workflows and resources.
//!
//! Three layers, usually run in this order:
//!
//! - [`SchemaValidator`]: raw documents against the embedded JSON schemas. Collects
//!   every violation and renders each with a corrective hint.
//! - [`WorkflowValidator`]: business rules over the typed [`kdeps_types::Workflow`]
//!   (metadata, settings, resource graph, per-resource config). Stops at the first failure.
//! - [`ExpressionValidator`] / [`InputValidator`]: request data against a resource's
//!   `validation` block, including user-defined boolean rules. Collects every failure.

pub mod condition;
pub mod expressions;
pub mod field_rules;
pub mod input;
pub mod schema;
pub mod suggestions;
pub mod workflow;

pub use condition::{
    evaluate_condition, parse_condition, Clause, ConditionEvaluator, ConditionExpr,
    DefaultEvaluator, Environment, Operand, Operator,
};
pub use expressions::{ExpressionParser, ExpressionValidator};
pub use field_rules::InputValidator;
pub use schema::SchemaValidator;
pub use suggestions::{
    enhance_error_message, enum_values, field_example, format_options, normalize_field_path,
    pattern_suggestion, range_suggestion, required_suggestion, type_suggestion, EnumValue,
};
pub use workflow::WorkflowValidator;
