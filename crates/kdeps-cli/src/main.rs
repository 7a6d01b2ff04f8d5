//! CLI binary for validating kdeps workflows and resources.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use kdeps_types::{KdepsError, SchemaCheck, Workflow};
use kdeps_validator::{
    DefaultEvaluator, Environment, ExpressionValidator, InputValidator, SchemaValidator,
    WorkflowValidator,
};
use tokio::task::JoinSet;

#[derive(Parser)]
#[command(name = "kdeps", version, about = "Validate declarative AI workflows before they run")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate one or more workflow files (and their resources/ directories)
    Validate {
        /// Paths to workflow .yaml files
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Skip JSON schema checks and run business rules only
        #[arg(long)]
        no_schema: bool,
    },

    /// Show information about a workflow
    Info {
        /// Path to the workflow .yaml file
        file: PathBuf,
    },

    /// Check request data against a resource's validation rules
    Rules {
        /// Path to the resource .yaml file
        resource: PathBuf,

        /// JSON object with the request data
        #[arg(short, long)]
        input: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Validate { files, no_schema } => {
            cmd_validate(files, no_schema).await?;
        }
        Commands::Info { file } => {
            cmd_info(&file)?;
        }
        Commands::Rules { resource, input } => {
            cmd_rules(&resource, &input)?;
        }
    }

    Ok(())
}

fn load_and_validate(
    path: &Path,
    schema: Option<&SchemaValidator>,
    validator: &WorkflowValidator,
) -> Result<Workflow, KdepsError> {
    let check = schema.map(|s| s as &dyn SchemaCheck);
    let workflow = kdeps_loader::load_workflow(path, check)?;
    validator.validate(&workflow)?;
    Ok(workflow)
}

async fn cmd_validate(files: Vec<PathBuf>, no_schema: bool) -> anyhow::Result<()> {
    let schema = if no_schema {
        None
    } else {
        Some(Arc::new(SchemaValidator::new()?))
    };
    let validator = Arc::new(WorkflowValidator::new(schema.clone()));

    let mut tasks = JoinSet::new();
    for (index, path) in files.into_iter().enumerate() {
        let schema = schema.clone();
        let validator = Arc::clone(&validator);
        tasks.spawn_blocking(move || {
            let result = load_and_validate(&path, schema.as_deref(), &validator);
            (index, path, result)
        });
    }

    let mut results = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        results.push(joined.context("validation task panicked")?);
    }
    results.sort_by_key(|(index, _, _)| *index);

    let mut failed = 0usize;
    for (_, path, result) in &results {
        match result {
            Ok(workflow) => {
                tracing::debug!(path = %path.display(), resources = workflow.resources.len(), "valid");
                println!("{}: valid", path.display());
            }
            Err(err) => {
                failed += 1;
                println!("[ERROR] {} {}: {}", err.code(), path.display(), err);
            }
        }
    }

    if failed > 0 {
        tracing::info!(failed, total = results.len(), "validation failed");
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_info(path: &Path) -> anyhow::Result<()> {
    let workflow = kdeps_loader::load_workflow(path, None)?;
    let meta = &workflow.metadata;

    println!("Workflow: {}", meta.name);
    if !meta.version.is_empty() {
        println!("Version: {}", meta.version);
    }
    if let Some(description) = meta.description.as_deref() {
        println!("Description: {description}");
    }
    println!("Target: {}", meta.target_action_id);
    println!("Resources: {}", workflow.resources.len());

    if let Some(api) = &workflow.settings.api_server {
        println!("API server: {}:{}", api.host_ip, api.port_num);
        for route in &api.routes {
            println!("  {} [{}]", route.path, route.methods.join(", "));
        }
    }

    println!("\nResources:");
    for resource in &workflow.resources {
        let run = &resource.run;
        let mut kinds: Vec<&str> = run.primary.iter().map(|k| k.name()).collect();
        if run.api_response.is_some() {
            kinds.push("apiResponse");
        }
        let requires = if resource.metadata.requires.is_empty() {
            String::new()
        } else {
            format!(" requires={}", resource.metadata.requires.join(","))
        };
        println!(
            "  {} [{}] {}{}",
            resource.metadata.action_id,
            resource.metadata.name,
            kinds.join("+"),
            requires
        );
    }

    Ok(())
}

fn cmd_rules(resource_path: &Path, input_path: &Path) -> anyhow::Result<()> {
    let resource = kdeps_loader::load_resource(resource_path, None)?;
    let Some(rules) = resource.run.options.validation.as_ref() else {
        println!("{}: no validation rules", resource.metadata.action_id);
        return Ok(());
    };

    let raw = std::fs::read_to_string(input_path)
        .with_context(|| format!("failed to read {}", input_path.display()))?;
    let data: serde_json::Map<String, serde_json::Value> = serde_json::from_str(&raw)
        .with_context(|| format!("{} must contain a JSON object", input_path.display()))?;
    let env: Environment = data.into_iter().collect();

    let validator = InputValidator::with_expression_validator(ExpressionValidator::with_evaluator(
        Arc::new(DefaultEvaluator),
    ));
    match validator.validate(&env, rules) {
        Ok(()) => {
            println!("{}: input valid", resource.metadata.action_id);
            Ok(())
        }
        Err(err) => {
            println!("[ERROR] {} {}:", err.code(), resource.metadata.action_id);
            for diag in err.diagnostics() {
                let field = if diag.field.is_empty() { "(rule)" } else { diag.field.as_str() };
                println!("  - {} [{}]: {}", field, diag.kind, diag.message);
            }
            if err.diagnostics().is_empty() {
                println!("  {err}");
            }
            std::process::exit(1);
        }
    }
}
