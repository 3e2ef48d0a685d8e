//! synapse-schema-gen: Generate a query/mutation schema from model registries
//!
//! Reads one or more registry documents (JSON), merges their models in order
//! and renders the generated surface with the selected backend:
//! - `sdl`: one `schema.graphql` document
//! - `rust`: serde bindings, one module per model
//!
//! Isolated model problems are logged and skipped; naming collisions abort.

use clap::{ArgAction, Parser};
use std::io::Write;
use std::path::PathBuf;
use synapse_schema::backends::{GeneratedFile, get_backend};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod parser;

#[derive(Parser, Debug)]
#[command(name = "synapse-schema-gen")]
#[command(about = "Generate a query/mutation schema from model registry documents")]
struct Args {
    /// Registry document(s), merged in the given order
    #[arg(required = true)]
    input: Vec<PathBuf>,

    /// Output backend (sdl, rust)
    #[arg(short, long, default_value = "sdl")]
    backend: String,

    /// Output directory; generated files go to stdout when omitted
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Relationship hops a filter may traverse (0 disables relation filters)
    #[arg(long = "relation-depth")]
    relation_depth: Option<usize>,

    /// Page size used when a paginated query does not ask for one
    #[arg(long = "default-page-size")]
    default_page_size: Option<usize>,

    /// Upper bound for requested page sizes
    #[arg(long = "max-page-size")]
    max_page_size: Option<usize>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_logging(args.verbose);

    let backend = get_backend(&args.backend)?;
    let mut registry = parser::load_registries(&args.input)?;
    if let Some(depth) = args.relation_depth {
        registry.options.relation_filter_depth = depth;
    }
    if let Some(size) = args.default_page_size {
        registry.options.default_page_size = size;
    }
    if let Some(size) = args.max_page_size {
        registry.options.max_page_size = size;
    }

    // Isolated issues are already logged by `generate`
    let schema = synapse_schema::generate(&registry)?;

    let files = backend.generate(&schema)?;
    match &args.output {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            for file in &files {
                let path = dir.join(&file.name);
                std::fs::write(&path, &file.content)?;
                info!(path = %path.display(), "wrote generated file");
            }
            eprintln!(
                "Generated {} file(s) for {} model(s) in {} ({} model issue(s) skipped)",
                files.len(),
                schema.models.len(),
                dir.display(),
                schema.issues.len()
            );
        }
        None => write_stdout(&files)?,
    }

    Ok(())
}

/// `RUST_LOG` wins over `-v`
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .init();
}

fn write_stdout(files: &[GeneratedFile]) -> std::io::Result<()> {
    let mut out = std::io::stdout().lock();
    for (i, file) in files.iter().enumerate() {
        if files.len() > 1 {
            if i > 0 {
                writeln!(out)?;
            }
            writeln!(out, "// {}", file.name)?;
        }
        out.write_all(file.content.as_bytes())?;
    }
    out.flush()
}
