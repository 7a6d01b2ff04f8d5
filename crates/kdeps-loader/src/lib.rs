//! YAML loader for kdeps workflows.
//!
//! Turns workflow and resource files into the typed model from `kdeps-types`:
//! YAML is read into an untyped [`serde_json::Value`], handed to an optional
//! [`SchemaCheck`](kdeps_types::SchemaCheck), then deserialized. Resource files in a
//! `resources/` directory next to the workflow are appended after inline resources.
//!
//! # Example
//! ```
//! let src = "metadata:\n  name: demo\n  targetActionId: respond\n";
//! let workflow = kdeps_loader::parse_workflow(src, None).unwrap();
//! assert_eq!(workflow.metadata.name, "demo");
//! ```

mod parser;

pub use parser::{
    load_resource, load_resource_dir, load_workflow, parse_document, parse_resource,
    parse_workflow, RESOURCE_DIR,
};
