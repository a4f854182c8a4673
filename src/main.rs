use std::io::Write;
use std::path::PathBuf;

use clap::Parser;
use npubridge::{
    BridgeRegistry, ContextProperties, GraphError, convert_program, load_program_from_path,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Lower framework programs onto an NPU graph", long_about = None)]
struct Cli {
    /// Path to a JSON program (ops, kernel declarations and tensor scope).
    program: PathBuf,
    /// Optional override for the tensor byte length limit.
    #[arg(long)]
    tensor_limit: Option<usize>,
    /// Path to write the emitted graph (stdout if omitted).
    #[arg(long)]
    output: Option<PathBuf>,
    /// Pretty-print the emitted JSON.
    #[arg(long)]
    pretty: bool,
}

fn run() -> Result<(), GraphError> {
    let cli = Cli::parse();
    let program = load_program_from_path(&cli.program)?;
    let mut props = ContextProperties::default();
    if let Some(limit) = cli.tensor_limit {
        props.tensor_byte_length_limit = limit;
    }

    let output = convert_program(&BridgeRegistry::with_defaults(), &program, &props)?;

    eprintln!(
        "Lowered `{}`: {} operators into {} NPU nodes ({:?}).",
        cli.program.display(),
        program.ops.len(),
        output.graph.len(),
        output.hint()
    );
    for (name, hint) in &output.hints {
        eprintln!("  - {name}: {hint:?}");
    }
    if !output.shape_guard.is_empty() {
        eprintln!("Runtime inputs guarded: {}", output.shape_guard.len());
    }

    let converted = output.to_converted(cli.pretty)?;
    match cli.output {
        Some(path) => {
            std::fs::write(&path, &converted.data)
                .map_err(|err| GraphError::export(path.clone(), err))?;
            eprintln!(
                "Wrote `{}` graph to `{}` (type {}).",
                converted.format,
                path.display(),
                converted.content_type
            );
        }
        None => {
            std::io::stdout()
                .write_all(&converted.data)
                .map_err(|err| GraphError::export(PathBuf::from("<stdout>"), err))?;
        }
    }
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
