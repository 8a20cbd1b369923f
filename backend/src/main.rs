//! tablepipe CLI - run declarative pipelines over CSV/TSV/JSON tables
//!
//! # Commands
//!
//! ```bash
//! tablepipe process people.csv --pipeline ops.json      # Run a pipeline, JSON to stdout
//! tablepipe process people.csv -p ops.json -o out.csv   # Write the result as CSV
//! tablepipe validate --pipeline ops.json -i people.csv  # Validate, checking field names
//! tablepipe inspect people.csv --sample 5               # Show detected format and rows
//! tablepipe operations                                  # List available operations
//! tablepipe operations greater_than                     # Show one operation
//! tablepipe serve --port 3000                           # Start the HTTP server
//! ```

use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tablepipe::api::start_server;
use tablepipe::{
    parse_file_auto, render, FileFormat, OperationDescriptor, OperationKind, OperationRegistry, PipelineService,
    RunOptions, Settings,
};

#[derive(Parser)]
#[command(name = "tablepipe")]
#[command(about = "Validate and run declarative table pipelines", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a pipeline on a table
    Process {
        /// Input file (.csv, .tsv, .json, .txt)
        input: PathBuf,

        /// Pipeline JSON: a list of operations, or an object with "operations"
        #[arg(short, long)]
        pipeline: PathBuf,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output format: json, csv, tsv or text (default: from --output, else json)
        #[arg(short, long)]
        format: Option<String>,
    },

    /// Validate a pipeline without running it
    Validate {
        /// Pipeline JSON file
        #[arg(short, long)]
        pipeline: PathBuf,

        /// Check field references against this table's columns
        #[arg(short, long)]
        input: Option<PathBuf>,
    },

    /// Show how a table file is read
    Inspect {
        /// Input file
        input: PathBuf,

        /// Number of records to print
        #[arg(short, long, default_value = "5")]
        sample: usize,
    },

    /// List available operations, or show one in detail
    Operations {
        /// Operation name
        name: Option<String>,
    },

    /// Start HTTP API server
    Serve {
        /// Port (default: TABLEPIPE_PORT or 3000)
        #[arg(short, long)]
        port: Option<u16>,
    },
}

/// Accepted pipeline file layouts.
#[derive(Deserialize)]
#[serde(untagged)]
enum PipelineFile {
    List(Vec<OperationDescriptor>),
    Wrapped { operations: Vec<OperationDescriptor> },
}

impl PipelineFile {
    fn into_operations(self) -> Vec<OperationDescriptor> {
        match self {
            PipelineFile::List(ops) | PipelineFile::Wrapped { operations: ops } => ops,
        }
    }
}

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let settings = Settings::from_env();

    let result = match cli.command {
        Commands::Process { input, pipeline, output, format } => {
            cmd_process(&settings, &input, &pipeline, output.as_deref(), format.as_deref()).await
        }
        Commands::Validate { pipeline, input } => cmd_validate(&settings, &pipeline, input.as_deref()).await,
        Commands::Inspect { input, sample } => cmd_inspect(&input, sample),
        Commands::Operations { name } => cmd_operations(name.as_deref()),
        Commands::Serve { port } => cmd_serve(settings, port).await,
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

fn service(settings: &Settings) -> Result<PipelineService, Box<dyn std::error::Error>> {
    let registry = Arc::new(OperationRegistry::with_builtins()?);
    Ok(PipelineService::new(registry).with_large_value_threshold(settings.large_value_threshold))
}

async fn load_pipeline(path: &Path) -> Result<Vec<OperationDescriptor>, Box<dyn std::error::Error>> {
    let content = tokio::fs::read_to_string(path).await?;
    let file: PipelineFile = serde_json::from_str(&content)?;
    Ok(file.into_operations())
}

async fn cmd_process(
    settings: &Settings,
    input: &Path,
    pipeline_path: &Path,
    output: Option<&Path>,
    format: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Processing: {}", input.display());

    let table = parse_file_auto(input)?;
    eprintln!("   Format: {} ({}), {} records", table.format, table.encoding, table.records.len());

    let operations = load_pipeline(pipeline_path).await?;
    eprintln!("   Pipeline: {} operations from {}", operations.len(), pipeline_path.display());

    let options = RunOptions { known_fields: Some(table.headers.clone()), preview_limit: None };
    let result = service(settings)?.run_with(&table.records, &operations, &options);

    for warning in &result.warnings {
        eprintln!("⚠️  {}", warning);
    }
    if let Some(error) = result.error {
        return Err(error.into());
    }
    let records = result.data.unwrap_or_default();
    eprintln!("✅ {} records in {:.1} ms", records.len(), result.execution_time_ms);
    if result.skipped > 0 {
        eprintln!("⚠️  {} records left unchanged by a transform", result.skipped);
    }

    let format = match (format, output) {
        (Some(f), _) => f.parse::<FileFormat>()?,
        (None, Some(path)) => FileFormat::from_path(path)?,
        (None, None) => FileFormat::Json,
    };
    write_output(&render(&records, format)?, output)?;

    Ok(())
}

async fn cmd_validate(
    settings: &Settings,
    pipeline_path: &Path,
    input: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("🔍 Validating: {}", pipeline_path.display());

    let operations = load_pipeline(pipeline_path).await?;
    let columns = match input {
        Some(path) => {
            let table = parse_file_auto(path)?;
            eprintln!("   Columns from {}: {}", path.display(), table.headers.join(", "));
            Some(table.headers)
        }
        None => None,
    };

    let report = service(settings)?.validate(&operations, columns.as_deref());
    for warning in &report.warnings {
        eprintln!("⚠️  {}", warning);
    }
    if report.valid {
        eprintln!("✅ Valid pipeline ({} operations)", operations.len());
        Ok(())
    } else {
        for error in &report.errors {
            eprintln!("   ❌ {}", error);
        }
        Err(format!("{} validation errors", report.errors.len()).into())
    }
}

fn cmd_inspect(input: &Path, sample: usize) -> Result<(), Box<dyn std::error::Error>> {
    let table = parse_file_auto(input)?;

    eprintln!("📄 {}", input.display());
    eprintln!("   Format: {}", table.format);
    eprintln!("   Encoding: {}", table.encoding);
    if let Some(delimiter) = table.delimiter {
        eprintln!(
            "   Delimiter: '{}'",
            match delimiter {
                '\t' => "\\t".to_string(),
                c => c.to_string(),
            }
        );
    }
    eprintln!("   Columns: {}", table.headers.join(", "));
    eprintln!("   Records: {}", table.records.len());

    let head: Vec<_> = table.records.iter().take(sample).collect();
    println!("{}", serde_json::to_string_pretty(&head)?);
    Ok(())
}

fn cmd_operations(name: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let registry = OperationRegistry::with_builtins()?;

    if let Some(name) = name {
        let definition = registry.get(name).ok_or_else(|| format!("Unknown operation '{}'", name))?;
        println!("{}", serde_json::to_string_pretty(definition)?);
        return Ok(());
    }

    for kind in OperationKind::ALL {
        let definitions: Vec<_> = registry.by_kind(kind).collect();
        if definitions.is_empty() {
            continue;
        }
        println!("\n{} ({})", kind.as_str().to_uppercase(), definitions.len());
        for def in definitions {
            let params: Vec<String> = def
                .parameters
                .iter()
                .map(|p| if p.required { p.name.to_string() } else { format!("{}?", p.name) })
                .collect();
            println!("  {:<24} {:<40} [{}]", def.name, def.description, params.join(", "));
        }
    }
    Ok(())
}

async fn cmd_serve(mut settings: Settings, port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(port) = port {
        settings.port = port;
    }
    let service = service(&settings)?;
    start_server(service, settings).await
}

fn write_output(content: &str, path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    match path {
        Some(p) => {
            if let Some(parent) = p.parent().filter(|d| !d.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            fs::write(p, content)?;
            eprintln!("💾 Output written to: {}", p.display());
        }
        None => {
            print!("{}", content);
            if !content.ends_with('\n') {
                println!();
            }
        }
    }
    Ok(())
}
