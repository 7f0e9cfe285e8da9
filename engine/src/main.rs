//! tabconv CLI - Convert tabular files between formats
//!
//! # Main Commands
//!
//! ```bash
//! tabconv convert people.csv --to json            # Convert a file
//! tabconv convert people.csv --to md -t steps.json # With transformations
//! tabconv serve                                  # Start HTTP server (port 3000)
//! ```
//!
//! # Diagnostic Commands
//!
//! ```bash
//! tabconv detect export.txt             # Show the detected format
//! tabconv validate people.csv           # Structural validation report
//! tabconv keys people.csv --style camelCase
//! tabconv inspect people.csv            # Per-column statistics
//! tabconv check-ops people.csv --ops ops.json
//! tabconv formats                       # Registered formats
//! ```

use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use tabconv::api::logs::LOG_BROADCASTER;
use tabconv::{
    column_stats, detect_key_style, find_key_collisions, operations_description,
    validate_operations, ColumnOperation, ConversionOutcome, ConversionRequest, Converter,
    Detection, EngineConfig, Format, KeyStyle, PipelineError, ReadOptions, RecordSet,
    Transformation,
};

type CliResult = Result<(), Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(name = "tabconv")]
#[command(about = "Convert tabular files between CSV, JSON and markdown", long_about = None)]
struct Cli {
    /// Do not echo log lines to stderr
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a file to another format
    Convert {
        /// Input file
        input: PathBuf,

        /// Target format (csv, json, markdown, ...)
        #[arg(long)]
        to: Format,

        /// Output file (default: input with the target extension)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// JSON file holding the transformation list
        #[arg(short, long)]
        transformations: Option<PathBuf>,

        /// Detect by extension only
        #[arg(long)]
        no_sniff: bool,

        /// Source delimiter (auto-detect if not specified)
        #[arg(short, long)]
        delimiter: Option<char>,

        /// Source encoding (auto-detect if not specified)
        #[arg(short, long)]
        encoding: Option<String>,
    },

    /// Detect the format of a file
    Detect {
        input: PathBuf,

        #[arg(long)]
        no_sniff: bool,
    },

    /// Read a file and print its validation report
    Validate { input: PathBuf },

    /// Report the key style of a file's columns
    Keys {
        input: PathBuf,

        /// Check for collisions when converting to this style
        #[arg(short, long)]
        style: Option<KeyStyle>,
    },

    /// Per-column statistics
    Inspect { input: PathBuf },

    /// Check a list of column operations without applying them
    CheckOps {
        input: PathBuf,

        /// JSON file holding the column operations
        #[arg(long)]
        ops: PathBuf,
    },

    /// List registered formats and value operations
    Formats,

    /// Start HTTP server
    Serve {
        /// Port to listen on (default: TABCONV_PORT or 3000)
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    if cli.quiet {
        LOG_BROADCASTER.set_echo(false);
    }
    let config = EngineConfig::from_env();
    let converter = Converter::with_defaults(config);

    let result = match cli.command {
        Commands::Convert {
            input,
            to,
            output,
            transformations,
            no_sniff,
            delimiter,
            encoding,
        } => cmd_convert(
            &converter,
            input,
            to,
            output,
            transformations.as_deref(),
            no_sniff,
            ReadOptions {
                delimiter,
                encoding,
                ..ReadOptions::default()
            },
        ),

        Commands::Detect { input, no_sniff } => cmd_detect(&converter, &input, no_sniff),

        Commands::Validate { input } => cmd_validate(&converter, &input),

        Commands::Keys { input, style } => cmd_keys(&converter, &input, style),

        Commands::Inspect { input } => cmd_inspect(&converter, &input),

        Commands::CheckOps { input, ops } => cmd_check_ops(&converter, &input, &ops),

        Commands::Formats => cmd_formats(&converter),

        Commands::Serve { port } => cmd_serve(converter, port).await,
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

fn cmd_convert(
    converter: &Converter,
    input: PathBuf,
    to: Format,
    output: Option<PathBuf>,
    transformations: Option<&Path>,
    no_sniff: bool,
    read_options: ReadOptions,
) -> CliResult {
    let mut request = ConversionRequest::new(input, to);
    request.output_path = output;
    request.read_options = read_options;
    if no_sniff {
        request.content_sniff = Some(false);
    }

    let outcome = match transformations.map(load_transformations).transpose() {
        Ok(list) => {
            request.transformations = list.unwrap_or_default();
            converter.convert(&request)
        }
        Err(message) => ConversionOutcome::failure(&PipelineError::Request(message), None),
    };

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    if !outcome.success {
        std::process::exit(1);
    }
    Ok(())
}

fn load_transformations(path: &Path) -> Result<Vec<Transformation>, String> {
    let content = fs::read_to_string(path)
        .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
    serde_json::from_str(&content)
        .map_err(|e| format!("bad transformation list in {}: {}", path.display(), e))
}

fn cmd_detect(converter: &Converter, input: &Path, no_sniff: bool) -> CliResult {
    let sniff = !no_sniff && converter.config().content_sniffing;
    let detection = converter.detector().detect(input, sniff)?;
    println!("{}", serde_json::to_string_pretty(&detection)?);
    Ok(())
}

/// Detect and read `input` with its collaborator.
fn load(converter: &Converter, input: &Path) -> Result<(Detection, RecordSet), Box<dyn std::error::Error>> {
    let detection = converter
        .detector()
        .detect(input, converter.config().content_sniffing)?;
    let handler = converter.registry().get(detection.format)?;
    let set = handler.read(input, &ReadOptions::default())?;
    eprintln!(
        "📄 {} read as {}: {} rows, {} columns",
        input.display(),
        detection.format,
        set.metadata.total_rows,
        set.metadata.total_columns
    );
    Ok((detection, set))
}

fn cmd_validate(converter: &Converter, input: &Path) -> CliResult {
    let (detection, set) = load(converter, input)?;
    let handler = converter.registry().get(detection.format)?;
    let report = tabconv::validate(&set).merge(handler.validate(&set));

    println!("{}", serde_json::to_string_pretty(&report)?);
    if !report.is_valid {
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_keys(converter: &Converter, input: &Path, style: Option<KeyStyle>) -> CliResult {
    let (_, set) = load(converter, input)?;
    let columns = set.columns();
    let report = detect_key_style(&columns);
    eprintln!(
        "🔤 Dominant style: {} ({:.0}%)",
        report.style,
        report.confidence * 100.0
    );

    let mut out = serde_json::json!({ "report": report });
    if let Some(style) = style {
        let collisions = find_key_collisions(&columns, style);
        if collisions.is_empty() {
            eprintln!("   ✅ No collisions converting to {}", style);
        } else {
            eprintln!("   ⚠️  {} collision(s) converting to {}", collisions.len(), style);
        }
        out["collisions"] = serde_json::to_value(&collisions)?;
    }
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn cmd_inspect(converter: &Converter, input: &Path) -> CliResult {
    let (_, set) = load(converter, input)?;
    println!("{}", serde_json::to_string_pretty(&column_stats(&set))?);
    Ok(())
}

fn cmd_check_ops(converter: &Converter, input: &Path, ops: &Path) -> CliResult {
    let (_, set) = load(converter, input)?;
    let content = fs::read_to_string(ops)?;
    let operations: Vec<ColumnOperation> = serde_json::from_str(&content)?;

    let report = validate_operations(&set, &operations);
    if report.is_valid {
        eprintln!("✅ {} operation(s) would apply cleanly", operations.len());
    } else {
        eprintln!("❌ {} problem(s) found", report.errors.len());
    }
    println!("{}", serde_json::to_string_pretty(&report)?);
    if !report.is_valid {
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_formats(converter: &Converter) -> CliResult {
    println!("Registered formats:");
    for format in Format::ALL {
        let status = if converter.registry().supports(format) {
            "read/write"
        } else {
            "detected only"
        };
        println!("  {:<10} .{:<5} {}", format.tag(), format.extension(), status);
    }
    println!();
    println!("{}", operations_description());
    Ok(())
}

async fn cmd_serve(converter: Converter, port: Option<u16>) -> CliResult {
    let port = port.unwrap_or(converter.config().port);
    tabconv::server::start_server(converter, port).await?;
    Ok(())
}
