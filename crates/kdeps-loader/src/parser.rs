use std::path::Path;

use globset::Glob;
use kdeps_types::{KdepsError, Resource, Result, SchemaCheck, SchemaType, Workflow};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Directory, relative to the workflow file, scanned for extra resource files.
pub const RESOURCE_DIR: &str = "resources";

const INLINE: &str = "<inline>";

/// Parse YAML text into an untyped document.
pub fn parse_document(source: &str, path: &str) -> Result<Value> {
    serde_yaml::from_str::<Value>(source).map_err(|e| KdepsError::ParseError {
        path: path.to_string(),
        message: e.to_string(),
    })
}

/// Parse workflow YAML without touching the filesystem.
pub fn parse_workflow(source: &str, schema: Option<&dyn SchemaCheck>) -> Result<Workflow> {
    parse_typed(source, INLINE, SchemaType::Workflow, schema)
}

/// Parse a single resource's YAML without touching the filesystem.
pub fn parse_resource(source: &str, schema: Option<&dyn SchemaCheck>) -> Result<Resource> {
    parse_typed(source, INLINE, SchemaType::Resource, schema)
}

/// Load a workflow file and merge in `resources/*.yaml|*.yml` from its directory.
pub fn load_workflow(path: &Path, schema: Option<&dyn SchemaCheck>) -> Result<Workflow> {
    let source = read_file(path)?;
    let mut workflow: Workflow = parse_typed(
        &source,
        &path.display().to_string(),
        SchemaType::Workflow,
        schema,
    )?;

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let extra = load_resource_dir(&dir.join(RESOURCE_DIR), schema)?;
    tracing::debug!(
        path = %path.display(),
        inline = workflow.resources.len(),
        from_dir = extra.len(),
        "loaded workflow"
    );
    workflow.resources.extend(extra);
    Ok(workflow)
}

pub fn load_resource(path: &Path, schema: Option<&dyn SchemaCheck>) -> Result<Resource> {
    let source = read_file(path)?;
    parse_typed(
        &source,
        &path.display().to_string(),
        SchemaType::Resource,
        schema,
    )
}

/// Load every `*.yaml`/`*.yml` file directly inside `dir`, sorted by file name.
///
/// A missing directory yields no resources. Subdirectories are not descended into.
pub fn load_resource_dir(dir: &Path, schema: Option<&dyn SchemaCheck>) -> Result<Vec<Resource>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let matcher = Glob::new("*.{yaml,yml}")
        .map_err(|e| KdepsError::Other(format!("invalid resource glob: {e}")))?
        .compile_matcher();

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if matcher.is_match(entry.file_name()) {
            files.push(entry.path());
        } else {
            tracing::debug!(path = %entry.path().display(), "skipping non-YAML file");
        }
    }
    files.sort();

    let mut resources = Vec::with_capacity(files.len());
    for file in files {
        let resource = load_resource(&file, schema).map_err(|e| KdepsError::ResourceFile {
            path: file.display().to_string(),
            source: Box::new(e),
        })?;
        resources.push(resource);
    }
    Ok(resources)
}

fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| KdepsError::ParseError {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

fn parse_typed<T: DeserializeOwned>(
    source: &str,
    path: &str,
    kind: SchemaType,
    schema: Option<&dyn SchemaCheck>,
) -> Result<T> {
    let doc = parse_document(source, path)?;
    if let Some(schema) = schema {
        schema.check(&doc, kind)?;
    }
    serde_json::from_value(doc).map_err(|e| KdepsError::ParseError {
        path: path.to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use kdeps_types::{ErrorCode, MultipleValidationError, ValidationError, ValidationKind};
    use std::sync::Mutex;

    const WORKFLOW: &str = r#"
apiVersion: kdeps.io/v1
kind: Workflow
metadata:
  name: demo
  targetActionId: respond
resources:
  - metadata:
      actionId: inline
      name: Inline
    run:
      apiResponse:
        success: true
"#;

    fn resource_yaml(action_id: &str) -> String {
        format!(
            "metadata:\n  actionId: {action_id}\n  name: {action_id}\nrun:\n  exec:\n    command: echo\n"
        )
    }

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<SchemaType>>,
        reject: Option<SchemaType>,
    }

    impl SchemaCheck for Recorder {
        fn check(&self, _doc: &Value, schema: SchemaType) -> Result<()> {
            self.seen.lock().unwrap().push(schema);
            if self.reject == Some(schema) {
                let mut errors = MultipleValidationError::new();
                errors.push(ValidationError::new(
                    "metadata.name",
                    ValidationKind::Required,
                    "name is required",
                ));
                return Err(KdepsError::SchemaValidation { schema, errors });
            }
            Ok(())
        }
    }

    #[test]
    fn parse_inline_workflow() {
        let wf = parse_workflow(WORKFLOW, None).unwrap();
        assert_eq!(wf.metadata.name, "demo");
        assert_eq!(wf.resources.len(), 1);
        assert!(wf.resources[0].run.api_response.is_some());
    }

    #[test]
    fn yaml_syntax_error_is_parse_error() {
        let err = parse_workflow("metadata: [unclosed", None).unwrap_err();
        assert_eq!(err.code(), ErrorCode::ParseError);
        assert!(err.to_string().contains("<inline>"), "got: {err}");
    }

    #[test]
    fn two_primaries_is_parse_error() {
        let src = "metadata:\n  actionId: a\nrun:\n  chat:\n    model: m\n  sql:\n    query: q\n";
        let err = parse_resource(src, None).unwrap_err();
        assert_eq!(err.code(), ErrorCode::ParseError);
        assert!(err.to_string().contains("one primary execution type"), "got: {err}");
    }

    #[test]
    fn schema_hook_runs_before_deserialize() {
        let recorder = Recorder {
            reject: Some(SchemaType::Workflow),
            ..Default::default()
        };
        let err = parse_workflow(WORKFLOW, Some(&recorder)).unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationFailed);
        assert_eq!(*recorder.seen.lock().unwrap(), vec![SchemaType::Workflow]);
    }

    #[test]
    fn load_workflow_appends_resource_dir_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let wf_path = dir.path().join("workflow.yaml");
        std::fs::write(&wf_path, WORKFLOW).unwrap();

        let res_dir = dir.path().join(RESOURCE_DIR);
        std::fs::create_dir(&res_dir).unwrap();
        std::fs::write(res_dir.join("b_respond.yml"), resource_yaml("respond")).unwrap();
        std::fs::write(res_dir.join("a_fetch.yaml"), resource_yaml("fetch")).unwrap();
        std::fs::write(res_dir.join("notes.txt"), "not yaml").unwrap();
        std::fs::create_dir(res_dir.join("nested.yaml")).unwrap();

        let recorder = Recorder::default();
        let wf = load_workflow(&wf_path, Some(&recorder)).unwrap();
        let ids: Vec<&str> = wf
            .resources
            .iter()
            .map(|r| r.metadata.action_id.as_str())
            .collect();
        assert_eq!(ids, vec!["inline", "fetch", "respond"]);
        assert_eq!(
            *recorder.seen.lock().unwrap(),
            vec![SchemaType::Workflow, SchemaType::Resource, SchemaType::Resource]
        );
    }

    #[test]
    fn missing_resource_dir_is_fine() {
        let dir = tempfile::tempdir().unwrap();
        let wf_path = dir.path().join("workflow.yaml");
        std::fs::write(&wf_path, WORKFLOW).unwrap();
        let wf = load_workflow(&wf_path, None).unwrap();
        assert_eq!(wf.resources.len(), 1);
    }

    #[test]
    fn bad_resource_file_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let wf_path = dir.path().join("workflow.yaml");
        std::fs::write(&wf_path, WORKFLOW).unwrap();
        let res_dir = dir.path().join(RESOURCE_DIR);
        std::fs::create_dir(&res_dir).unwrap();
        std::fs::write(res_dir.join("broken.yaml"), "metadata: [").unwrap();

        let err = load_workflow(&wf_path, None).unwrap_err();
        let text = err.to_string();
        assert!(text.contains("failed to parse resource file"), "got: {text}");
        assert!(text.contains("broken.yaml"), "got: {text}");
        assert_eq!(err.code(), ErrorCode::ParseError);
    }

    #[test]
    fn missing_workflow_file_is_parse_error() {
        let err = load_workflow(Path::new("/definitely/not/here.yaml"), None).unwrap_err();
        assert_eq!(err.code(), ErrorCode::ParseError);
    }
}
