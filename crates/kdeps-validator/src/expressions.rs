//! Custom-rule validation: user-supplied boolean expressions that must hold.
//!
//! Every rule is evaluated even after one fails; failures are returned together.

use std::sync::Arc;

use kdeps_types::{
    CustomRule, KdepsError, MultipleValidationError, Result, ValidationError, ValidationKind,
};
use serde_json::Value;

use crate::condition::{ConditionEvaluator, Environment};

/// Strips `{{ ... }}` interpolation markers from rule expressions.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExpressionParser;

impl ExpressionParser {
    pub fn new() -> Self {
        Self
    }

    /// Replace each `{{ inner }}` with `inner`. Text without markers is returned trimmed.
    pub fn parse(&self, raw: &str) -> Result<String> {
        let mut out = String::with_capacity(raw.len());
        let mut rest = raw.trim();
        while let Some(open) = rest.find("{{") {
            out.push_str(&rest[..open]);
            let after = &rest[open + 2..];
            let close = after.find("}}").ok_or_else(|| KdepsError::Expression {
                expr: raw.to_string(),
                message: "unclosed interpolation: missing }}".to_string(),
            })?;
            out.push_str(after[..close].trim());
            rest = &after[close + 2..];
        }
        out.push_str(rest);
        Ok(out.trim().to_string())
    }
}

#[derive(Clone, Default)]
pub struct ExpressionValidator {
    parser: ExpressionParser,
    evaluator: Option<Arc<dyn ConditionEvaluator>>,
}

impl std::fmt::Debug for ExpressionValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpressionValidator")
            .field("has_evaluator", &self.evaluator.is_some())
            .finish()
    }
}

impl ExpressionValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_evaluator(evaluator: Arc<dyn ConditionEvaluator>) -> Self {
        Self {
            parser: ExpressionParser::new(),
            evaluator: Some(evaluator),
        }
    }

    pub fn set_evaluator(&mut self, evaluator: Arc<dyn ConditionEvaluator>) {
        self.evaluator = Some(evaluator);
    }

    pub fn evaluator(&self) -> Option<&dyn ConditionEvaluator> {
        self.evaluator.as_deref()
    }

    /// Evaluate every rule against `env`.
    ///
    /// `evaluator` overrides the configured one for this call. With no rules this
    /// always succeeds; with rules and no evaluator at all it fails with
    /// [`KdepsError::MissingEvaluator`].
    pub fn validate_custom_rules(
        &self,
        rules: &[CustomRule],
        evaluator: Option<&dyn ConditionEvaluator>,
        env: &Environment,
    ) -> Result<()> {
        if rules.is_empty() {
            return Ok(());
        }
        let evaluator = evaluator
            .or_else(|| self.evaluator())
            .ok_or(KdepsError::MissingEvaluator)?;

        let mut errors = MultipleValidationError::new();
        for rule in rules {
            let outcome = self
                .parser
                .parse(&rule.expr)
                .and_then(|expr| evaluator.evaluate_condition(&expr, env));
            match outcome {
                Ok(true) => {}
                Ok(false) => errors.push(
                    ValidationError::new("", ValidationKind::Custom, rule.message.clone())
                        .with_value(Value::String(rule.expr.clone())),
                ),
                Err(e) => errors.push(
                    ValidationError::new(
                        "",
                        ValidationKind::Expression,
                        format!("expression evaluation failed: {e}"),
                    )
                    .with_value(Value::String(rule.expr.clone())),
                ),
            }
        }

        tracing::debug!(rules = rules.len(), failed = errors.len(), "custom rules evaluated");
        errors.into_result().map_err(KdepsError::from)
    }
}
