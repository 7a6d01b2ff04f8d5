//! Business-rule validation of a deserialized [`Workflow`].
//!
//! Checks run in a fixed order and validation stops at the first failure; later
//! checks assume earlier ones passed (per-resource checks rely on unique action IDs).

use std::collections::HashSet;
use std::sync::Arc;

use kdeps_types::{
    ApiServerConfig, ChatConfig, HttpClientConfig, KdepsError, Resource, Result, SqlConfig,
    Workflow,
};
use serde_json::Value;

use crate::schema::SchemaValidator;
use crate::suggestions::{
    format_options, is_allowed, CHAT_BACKENDS, HTTP_METHODS, ROUTE_PATTERN_HINT, SQL_FORMATS,
};

type Check = fn(&WorkflowValidator, &Workflow) -> Result<()>;

/// Ordered workflow-level checks.
const CHECKS: &[(&str, Check)] = &[
    ("metadata", WorkflowValidator::validate_metadata),
    ("settings", WorkflowValidator::validate_settings),
    ("resources_present", WorkflowValidator::validate_resources_present),
    ("target_action", WorkflowValidator::validate_target_action),
    ("unique_action_ids", WorkflowValidator::validate_unique_action_ids),
    ("dependencies", WorkflowValidator::validate_dependencies),
    ("resources", WorkflowValidator::validate_each_resource),
];

pub(crate) fn invalid_workflow(message: impl Into<String>) -> KdepsError {
    KdepsError::InvalidWorkflow(message.into())
}

pub(crate) fn invalid_resource(message: impl Into<String>) -> KdepsError {
    KdepsError::InvalidResource(message.into())
}

/// Fail-fast validator for typed workflows.
///
/// Holds no per-call state; one instance can be shared across threads.
#[derive(Debug, Clone, Default)]
pub struct WorkflowValidator {
    schema: Option<Arc<SchemaValidator>>,
}

impl WorkflowValidator {
    pub fn new(schema: Option<Arc<SchemaValidator>>) -> Self {
        Self { schema }
    }

    /// The attached schema validator, if any.
    pub fn schema(&self) -> Option<&SchemaValidator> {
        self.schema.as_deref()
    }

    /// Schema-check an untyped document (when a schema validator is attached),
    /// deserialize it, then run [`validate`](Self::validate).
    pub fn validate_document(&self, doc: &Value) -> Result<Workflow> {
        if let Some(schema) = self.schema() {
            schema.validate_workflow(doc)?;
        }
        let workflow: Workflow =
            serde_json::from_value(doc.clone()).map_err(|e| KdepsError::ParseError {
                path: "<document>".to_string(),
                message: e.to_string(),
            })?;
        self.validate(&workflow)?;
        Ok(workflow)
    }

    /// Run every check in order, returning the first failure.
    pub fn validate(&self, workflow: &Workflow) -> Result<()> {
        for (stage, check) in CHECKS {
            tracing::debug!(stage, workflow = %workflow.metadata.name, "running workflow check");
            check(self, workflow)?;
        }
        Ok(())
    }

    pub fn validate_metadata(&self, workflow: &Workflow) -> Result<()> {
        let meta = &workflow.metadata;
        if meta.name.is_empty() {
            return Err(invalid_workflow("workflow name is required"));
        }
        let web_only = workflow.settings.web_server_mode && workflow.resources.is_empty();
        if meta.target_action_id.is_empty() && !web_only {
            return Err(invalid_workflow("workflow targetActionID is required"));
        }
        Ok(())
    }

    pub fn validate_settings(&self, workflow: &Workflow) -> Result<()> {
        let settings = &workflow.settings;
        if settings.api_server_mode {
            let api = settings.api_server.as_ref().ok_or_else(|| {
                invalid_workflow("apiServer settings required when apiServerMode is true")
            })?;
            self.validate_api_server_settings(api)?;
        }
        if let Some(input) = &settings.input {
            self.validate_input_config(input)?;
        }
        Ok(())
    }

    /// Port in `1..=65535`, at least one route, every route path rooted at `/`,
    /// and every route method a known HTTP method.
    pub fn validate_api_server_settings(&self, api: &ApiServerConfig) -> Result<()> {
        if !(1..=65535).contains(&api.port_num) {
            return Err(invalid_workflow("apiServer port must be between 1 and 65535"));
        }
        if api.routes.is_empty() {
            return Err(invalid_workflow("apiServer must have at least one route"));
        }
        for (i, route) in api.routes.iter().enumerate() {
            if route.path.is_empty() {
                return Err(invalid_workflow(format!("route {i}: path is required")));
            }
            if !route.path.starts_with('/') {
                return Err(invalid_workflow(format!(
                    "route {i}: path must start with /. {ROUTE_PATTERN_HINT}"
                )));
            }
            if let Some(method) = route.methods.iter().find(|m| !is_allowed(HTTP_METHODS, m)) {
                return Err(invalid_workflow(format!(
                    "route {i}: invalid HTTP method: {method}. Available options: {}",
                    format_options(HTTP_METHODS)
                )));
            }
        }
        Ok(())
    }

    fn validate_resources_present(&self, workflow: &Workflow) -> Result<()> {
        if workflow.resources.is_empty() && !workflow.settings.web_server_mode {
            return Err(invalid_workflow("workflow must have at least one resource"));
        }
        Ok(())
    }

    /// The target must name a declared resource. Skipped when there are no resources.
    pub fn validate_target_action(&self, workflow: &Workflow) -> Result<()> {
        if workflow.resources.is_empty() {
            return Ok(());
        }
        let target = &workflow.metadata.target_action_id;
        if workflow.resource(target).is_none() {
            return Err(invalid_workflow(format!(
                "target action '{target}' not found in resources"
            )));
        }
        Ok(())
    }

    pub fn validate_unique_action_ids(&self, workflow: &Workflow) -> Result<()> {
        let mut seen = HashSet::new();
        for resource in &workflow.resources {
            let id = resource.metadata.action_id.as_str();
            if !seen.insert(id) {
                return Err(invalid_workflow(format!("duplicate actionID: {id}")));
            }
        }
        Ok(())
    }

    /// Every `requires` entry must name a declared resource. Cycles are not checked.
    pub fn validate_dependencies(&self, workflow: &Workflow) -> Result<()> {
        let ids: HashSet<&str> = workflow
            .resources
            .iter()
            .map(|r| r.metadata.action_id.as_str())
            .collect();
        for resource in &workflow.resources {
            if let Some(missing) = resource
                .metadata
                .requires
                .iter()
                .find(|req| !ids.contains(req.as_str()))
            {
                return Err(invalid_workflow(format!(
                    "resource '{}' depends on unknown resource '{missing}'",
                    resource.metadata.action_id
                )));
            }
        }
        Ok(())
    }

    fn validate_each_resource(&self, workflow: &Workflow) -> Result<()> {
        for resource in &workflow.resources {
            self.validate_resource(resource, Some(workflow))
                .map_err(|e| KdepsError::ResourceFailed {
                    action_id: resource.metadata.action_id.clone(),
                    source: Box::new(e),
                })?;
        }
        Ok(())
    }

    /// Validate one resource. `workflow` supplies the SQL connection table; without
    /// it, connection-name lookups are skipped.
    pub fn validate_resource(&self, resource: &Resource, workflow: Option<&Workflow>) -> Result<()> {
        if resource.metadata.action_id.is_empty() {
            return Err(invalid_resource("resource actionID is required"));
        }
        if resource.metadata.name.is_empty() {
            return Err(invalid_resource("resource name is required"));
        }
        self.validate_run_config(resource, workflow)
    }

    fn validate_run_config(&self, resource: &Resource, workflow: Option<&Workflow>) -> Result<()> {
        let run = &resource.run;
        if run.is_empty() {
            return Err(invalid_resource(
                "resource must specify at least one execution type (chat, httpClient, sql, python, exec, tts, apiResponse)",
            ));
        }
        if let Some(chat) = run.chat() {
            self.validate_chat_config(chat)?;
        }
        if let Some(sql) = run.sql() {
            self.validate_sql_config(sql, workflow)?;
        }
        if let Some(http) = run.http_client() {
            self.validate_http_client_config(http)?;
        }
        Ok(())
    }

    pub fn validate_chat_config(&self, chat: &ChatConfig) -> Result<()> {
        if chat.model.is_empty() {
            return Err(invalid_resource("chat.model is required"));
        }
        if chat.prompt.is_empty() {
            return Err(invalid_resource("chat.prompt is required"));
        }
        if let Some(backend) = chat.backend.as_deref().filter(|b| !b.is_empty()) {
            if !is_allowed(CHAT_BACKENDS, backend) {
                return Err(invalid_resource(format!(
                    "invalid chat backend: {backend}. Available options: {}",
                    format_options(CHAT_BACKENDS)
                )));
            }
        }
        Ok(())
    }

    pub fn validate_sql_config(&self, sql: &SqlConfig, workflow: Option<&Workflow>) -> Result<()> {
        if sql.query.is_empty() && sql.queries.is_empty() {
            return Err(invalid_resource("sql.query or sql.queries is required"));
        }
        if sql.connection.is_empty() && sql.connection_name.is_empty() {
            return Err(invalid_resource(
                "sql.connection or sql.connectionName is required",
            ));
        }
        if let Some(workflow) = workflow.filter(|_| !sql.connection_name.is_empty()) {
            let connections = &workflow.settings.sql_connections;
            if connections.is_empty() {
                return Err(invalid_resource(format!(
                    "sql connection '{}' not found: workflow has no sqlConnections defined",
                    sql.connection_name
                )));
            }
            if !connections.contains_key(&sql.connection_name) {
                return Err(invalid_resource(format!(
                    "sql connection '{}' not found in workflow sqlConnections",
                    sql.connection_name
                )));
            }
        }
        if let Some(format) = sql.format.as_deref().filter(|f| !f.is_empty()) {
            if !is_allowed(SQL_FORMATS, format) {
                return Err(invalid_resource(format!(
                    "invalid SQL format: {format}. Available options: {}",
                    format_options(SQL_FORMATS)
                )));
            }
        }
        Ok(())
    }

    pub fn validate_http_client_config(&self, http: &HttpClientConfig) -> Result<()> {
        if http.url.is_empty() {
            return Err(invalid_resource("httpClient.url is required"));
        }
        if http.method.is_empty() {
            return Err(invalid_resource("httpClient.method is required"));
        }
        if !is_allowed(HTTP_METHODS, &http.method) {
            return Err(invalid_resource(format!(
                "invalid HTTP method: {}. Available options: {}",
                http.method,
                format_options(HTTP_METHODS)
            )));
        }
        Ok(())
    }
}
