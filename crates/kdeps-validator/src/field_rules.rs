//! Request-data validation against a resource's `run.validation` block.
//!
//! Required fields and per-field rules are checked first, then custom rules are
//! evaluated. Like the schema layer, every failure is collected and returned together.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, NaiveDate};
use kdeps_types::{
    FieldRule, FieldType, KdepsError, MultipleValidationError, Result, ValidationError,
    ValidationKind, ValidationRules,
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::condition::Environment;
use crate::expressions::ExpressionValidator;

static EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email regex should compile"));

/// Compiled `pattern` constraints, keyed by source text. Only successful compiles are kept.
static PATTERNS: Lazy<RwLock<HashMap<String, Regex>>> = Lazy::new(|| RwLock::new(HashMap::new()));

fn compiled_pattern(pattern: &str) -> std::result::Result<Regex, regex::Error> {
    if let Some(re) = PATTERNS
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(pattern)
    {
        return Ok(re.clone());
    }
    let re = Regex::new(pattern)?;
    PATTERNS
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(pattern.to_string(), re.clone());
    Ok(re)
}

#[derive(Debug, Clone, Default)]
pub struct InputValidator {
    expressions: ExpressionValidator,
}

impl InputValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `expressions` (and its evaluator) for custom rules.
    pub fn with_expression_validator(expressions: ExpressionValidator) -> Self {
        Self { expressions }
    }

    pub fn validate(&self, data: &Environment, rules: &ValidationRules) -> Result<()> {
        let mut errors = MultipleValidationError::new();

        for field in &rules.required {
            if data.get(field).map_or(true, is_empty) {
                errors.push(ValidationError::new(
                    field.as_str(),
                    ValidationKind::Required,
                    format!("field '{field}' is required"),
                ));
            }
        }

        for rule in &rules.rules {
            // Absent fields are the required check's concern.
            if let Some(value) = data.get(&rule.field) {
                if let Some(err) = validate_field(rule, value) {
                    errors.push(err);
                }
            }
        }

        if let Err(e) =
            self.expressions
                .validate_custom_rules(&rules.custom_rules, None, data)
        {
            match e {
                KdepsError::Validation(custom) => errors.extend(custom),
                other => return Err(other),
            }
        }

        tracing::debug!(
            required = rules.required.len(),
            rules = rules.rules.len(),
            custom = rules.custom_rules.len(),
            failed = errors.len(),
            "input validated"
        );
        errors.into_result().map_err(KdepsError::from)
    }
}

/// Null, `""`, `[]` and `{}` count as missing.
pub fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

/// Check one present field. Returns the first violated constraint.
pub fn validate_field(rule: &FieldRule, value: &Value) -> Option<ValidationError> {
    let fail = |kind: ValidationKind, default: String| {
        let message = rule
            .message
            .clone()
            .filter(|m| !m.is_empty())
            .unwrap_or(default);
        Some(ValidationError::new(rule.field.as_str(), kind, message).with_value(value.clone()))
    };

    if let Some(field_type) = rule.field_type {
        if let Err(reason) = check_type(field_type, value) {
            return fail(ValidationKind::Type, reason);
        }
    }

    match value {
        Value::String(s) => {
            let len = s.chars().count();
            if let Some(min) = rule.min_length.filter(|&min| len < min) {
                return fail(
                    ValidationKind::MinLength,
                    format!("must be at least {min} characters"),
                );
            }
            if let Some(max) = rule.max_length.filter(|&max| len > max) {
                return fail(
                    ValidationKind::MaxLength,
                    format!("must be at most {max} characters"),
                );
            }
            if let Some(pattern) = &rule.pattern {
                let matched = compiled_pattern(pattern).map(|re| re.is_match(s));
                match matched {
                    Ok(true) => {}
                    Ok(false) => {
                        return fail(
                            ValidationKind::Pattern,
                            "does not match required pattern".to_string(),
                        )
                    }
                    Err(e) => {
                        return fail(ValidationKind::Pattern, format!("invalid pattern: {e}"))
                    }
                }
            }
            if !rule.allowed.is_empty() && !rule.allowed.iter().any(|a| enum_matches(a, s)) {
                return fail(
                    ValidationKind::Enum,
                    format!("must be one of: {}", render_allowed(&rule.allowed)),
                );
            }
        }
        Value::Number(n) => {
            let n = n.as_f64().unwrap_or_default();
            if let Some(min) = rule.min.filter(|&min| n < min) {
                return fail(ValidationKind::Minimum, format!("must be at least {min}"));
            }
            if let Some(max) = rule.max.filter(|&max| n > max) {
                return fail(ValidationKind::Maximum, format!("must be at most {max}"));
            }
        }
        Value::Array(items) => {
            if let Some(min) = rule.min_items.filter(|&min| items.len() < min) {
                return fail(
                    ValidationKind::MinItems,
                    format!("must have at least {min} items"),
                );
            }
            if let Some(max) = rule.max_items.filter(|&max| items.len() > max) {
                return fail(
                    ValidationKind::MaxItems,
                    format!("must have at most {max} items"),
                );
            }
        }
        _ => {}
    }
    None
}

fn check_type(field_type: FieldType, value: &Value) -> std::result::Result<(), String> {
    let got = || format!("expected {field_type}, got {}", value_type(value));
    let text = || value.as_str().ok_or_else(got);
    match field_type {
        FieldType::String => text().map(drop),
        FieldType::Integer => match value {
            Value::Number(n) if n.is_i64() || n.is_u64() => Ok(()),
            _ => Err(got()),
        },
        FieldType::Number => value.is_number().then_some(()).ok_or_else(got),
        FieldType::Boolean => value.is_boolean().then_some(()).ok_or_else(got),
        FieldType::Array => value.is_array().then_some(()).ok_or_else(got),
        FieldType::Object => value.is_object().then_some(()).ok_or_else(got),
        FieldType::Email => {
            if EMAIL.is_match(text()?) {
                Ok(())
            } else {
                Err("invalid email format".to_string())
            }
        }
        FieldType::Url => {
            let s = text()?;
            let parsed = url::Url::parse(s).map_err(|_| "invalid URL format".to_string())?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err("URL must start with http:// or https://".to_string());
            }
            if parsed.host_str().map_or(true, str::is_empty) {
                return Err("URL must have a valid host".to_string());
            }
            Ok(())
        }
        FieldType::Uuid => uuid::Uuid::parse_str(text()?)
            .map(drop)
            .map_err(|_| "invalid UUID format".to_string()),
        FieldType::Date => {
            let s = text()?;
            if DateTime::parse_from_rfc3339(s).is_ok()
                || NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
            {
                Ok(())
            } else {
                Err("invalid date format (expected RFC3339 or YYYY-MM-DD)".to_string())
            }
        }
    }
}

fn enum_matches(allowed: &Value, candidate: &str) -> bool {
    match allowed {
        Value::String(s) => s == candidate,
        other => other.to_string() == candidate,
    }
}

fn render_allowed(allowed: &[Value]) -> String {
    let items: Vec<String> = allowed
        .iter()
        .map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect();
    format!("[{}]", items.join(", "))
}

fn value_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::DefaultEvaluator;
    use kdeps_types::CustomRule;
    use serde_json::json;
    use std::sync::Arc;

    fn data(v: Value) -> Environment {
        v.as_object()
            .unwrap()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    fn rule(field: &str, field_type: FieldType) -> FieldRule {
        FieldRule {
            field: field.into(),
            field_type: Some(field_type),
            ..Default::default()
        }
    }

    fn check(rule: &FieldRule, value: Value) -> Option<ValidationError> {
        validate_field(rule, &value)
    }

    #[test]
    fn required_fields_treat_blank_as_missing() {
        let rules = ValidationRules {
            required: vec!["name".into(), "tags".into(), "email".into(), "age".into()],
            ..Default::default()
        };
        let err = InputValidator::new()
            .validate(&data(json!({ "name": "", "tags": [], "age": 0 })), &rules)
            .unwrap_err();
        let fields: Vec<&str> = err.diagnostics().iter().map(|d| d.field.as_str()).collect();
        assert_eq!(fields, vec!["name", "tags", "email"]);
        assert_eq!(err.diagnostics()[0].message, "field 'name' is required");
        assert!(err
            .diagnostics()
            .iter()
            .all(|d| d.kind == ValidationKind::Required));
    }

    #[test]
    fn type_checks() {
        assert!(check(&rule("a", FieldType::String), json!("x")).is_none());
        let e = check(&rule("a", FieldType::String), json!(1)).unwrap();
        assert_eq!(e.kind, ValidationKind::Type);
        assert_eq!(e.message, "expected string, got integer");

        assert!(check(&rule("a", FieldType::Integer), json!(3)).is_none());
        assert!(check(&rule("a", FieldType::Integer), json!(3.5)).is_some());
        assert!(check(&rule("a", FieldType::Number), json!(3.5)).is_none());
        assert!(check(&rule("a", FieldType::Boolean), json!("true")).is_some());
        assert!(check(&rule("a", FieldType::Array), json!([1])).is_none());
        assert!(check(&rule("a", FieldType::Object), json!({"k": 1})).is_none());
    }

    #[test]
    fn format_types() {
        let email = rule("e", FieldType::Email);
        assert!(check(&email, json!("dev@kdeps.io")).is_none());
        assert_eq!(
            check(&email, json!("not-an-email")).unwrap().message,
            "invalid email format"
        );

        let url = rule("u", FieldType::Url);
        assert!(check(&url, json!("https://kdeps.io/docs")).is_none());
        assert_eq!(
            check(&url, json!("ftp://kdeps.io")).unwrap().message,
            "URL must start with http:// or https://"
        );
        assert_eq!(check(&url, json!("::nope")).unwrap().message, "invalid URL format");

        let id = rule("id", FieldType::Uuid);
        assert!(check(&id, json!("67e55044-10b1-426f-9247-bb680e5fe0c8")).is_none());
        assert!(check(&id, json!("1234")).is_some());

        let date = rule("d", FieldType::Date);
        assert!(check(&date, json!("2024-02-29")).is_none());
        assert!(check(&date, json!("2024-02-29T10:00:00Z")).is_none());
        assert!(check(&date, json!("29/02/2024")).is_some());
    }

    #[test]
    fn string_constraints() {
        let mut r = rule("name", FieldType::String);
        r.min_length = Some(2);
        r.max_length = Some(4);
        assert_eq!(
            check(&r, json!("a")).unwrap().message,
            "must be at least 2 characters"
        );
        assert_eq!(check(&r, json!("abcde")).unwrap().kind, ValidationKind::MaxLength);
        assert!(check(&r, json!("äöü")).is_none());

        r.pattern = Some("^[a-z]+$".into());
        assert_eq!(check(&r, json!("AB")).unwrap().kind, ValidationKind::Pattern);

        r.pattern = None;
        r.allowed = vec![json!("red"), json!("blue")];
        let e = check(&r, json!("pink")).unwrap();
        assert_eq!(e.message, "must be one of: [red, blue]");
        assert!(check(&r, json!("blue")).is_none());
    }

    #[test]
    fn numeric_and_array_constraints() {
        let mut age = rule("age", FieldType::Integer);
        age.min = Some(18.0);
        age.max = Some(120.0);
        assert_eq!(check(&age, json!(12)).unwrap().message, "must be at least 18");
        assert_eq!(check(&age, json!(121)).unwrap().kind, ValidationKind::Maximum);
        assert!(check(&age, json!(18)).is_none());

        let mut tags = rule("tags", FieldType::Array);
        tags.min_items = Some(1);
        tags.max_items = Some(2);
        assert_eq!(
            check(&tags, json!([1, 2, 3])).unwrap().message,
            "must have at most 2 items"
        );
        assert!(check(&tags, json!(["a"])).is_none());
    }

    #[test]
    fn pattern_is_compiled_once_and_reused() {
        let mut r = rule("code", FieldType::String);
        r.pattern = Some("^[A-Z]{3}-[0-9]{2}$".into());
        for _ in 0..3 {
            assert!(check(&r, json!("ABC-12")).is_none());
            assert_eq!(check(&r, json!("abc-12")).unwrap().kind, ValidationKind::Pattern);
        }
        let cached = PATTERNS
            .read()
            .unwrap()
            .get("^[A-Z]{3}-[0-9]{2}$")
            .map(|re| re.as_str().to_string());
        assert_eq!(cached.as_deref(), Some("^[A-Z]{3}-[0-9]{2}$"));
    }

    #[test]
    fn invalid_pattern_is_reported_every_time() {
        let mut r = rule("code", FieldType::String);
        r.pattern = Some("([unclosed".into());
        for _ in 0..2 {
            let e = check(&r, json!("x")).unwrap();
            assert_eq!(e.kind, ValidationKind::Pattern);
            assert!(e.message.starts_with("invalid pattern:"), "got: {}", e.message);
        }
        assert!(!PATTERNS.read().unwrap().contains_key("([unclosed"));
    }

    #[test]
    fn required_message_ignores_field_rule_message() {
        let mut age = rule("age", FieldType::Integer);
        age.message = Some("adults only".into());
        let rules = ValidationRules {
            required: vec!["age".into()],
            rules: vec![age],
            ..Default::default()
        };
        let err = InputValidator::new()
            .validate(&data(json!({})), &rules)
            .unwrap_err();
        assert_eq!(err.diagnostics()[0].message, "field 'age' is required");

        let err = InputValidator::new()
            .validate(&data(json!({ "age": "old" })), &rules)
            .unwrap_err();
        assert_eq!(err.diagnostics()[0].message, "adults only");
    }

    #[test]
    fn custom_message_overrides_default() {
        let mut r = rule("age", FieldType::Integer);
        r.min = Some(18.0);
        r.message = Some("adults only".into());
        assert_eq!(check(&r, json!(3)).unwrap().message, "adults only");
    }

    #[test]
    fn custom_rules_merge_with_field_errors() {
        let mut age = rule("age", FieldType::Integer);
        age.min = Some(18.0);
        let rules = ValidationRules {
            required: vec!["password".into()],
            rules: vec![age],
            custom_rules: vec![CustomRule::new(
                "confirmPassword == password",
                "passwords must match",
            )],
        };
        let validator = InputValidator::with_expression_validator(
            ExpressionValidator::with_evaluator(Arc::new(DefaultEvaluator)),
        );
        let err = validator
            .validate(
                &data(json!({ "password": "a", "confirmPassword": "b", "age": 10 })),
                &rules,
            )
            .unwrap_err();
        let kinds: Vec<ValidationKind> = err.diagnostics().iter().map(|d| d.kind).collect();
        assert_eq!(kinds, vec![ValidationKind::Minimum, ValidationKind::Custom]);

        validator
            .validate(
                &data(json!({ "password": "a", "confirmPassword": "a", "age": 30 })),
                &rules,
            )
            .unwrap();
    }

    #[test]
    fn custom_rules_without_evaluator_fail_outright() {
        let rules = ValidationRules {
            custom_rules: vec![CustomRule::new("x == 1", "x must be 1")],
            ..Default::default()
        };
        let err = InputValidator::new()
            .validate(&data(json!({ "x": 1 })), &rules)
            .unwrap_err();
        assert!(matches!(err, KdepsError::MissingEvaluator));
    }
}
