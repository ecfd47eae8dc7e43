use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use tagmerge::{tokenize, Config, DataNode};

/// Fields used when no data file is given.
const SAMPLE_DATA: &str = r#"{
    "FirstName": "User's first name",
    "LastName": "User's last name",
    "Contact": {
        "Email": "User's email address",
        "PhoneNumber": "User's phone number"
    },
    "Address": "User's address",
    "Orders": [
        {
            "OrderID": "Order identifier",
            "ItemName": "Name of the ordered item",
            "OrderDate": "Date of the order"
        }
    ]
}"#;

#[derive(Parser)]
#[command(name = "tagmerge", version, about = "Check and render <<tag>> mail-merge templates")]
struct Cli {
    /// Report every `<<` that is not a known tag.
    #[arg(long, global = true)]
    strict: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a template against the data and print the report.
    Check {
        /// Template file, or `-` for stdin.
        template: PathBuf,
        /// JSON data file; the built-in sample is used when omitted.
        #[arg(long)]
        data: Option<PathBuf>,
    },
    /// Validate, then print the rendered template.
    Render {
        template: PathBuf,
        #[arg(long)]
        data: Option<PathBuf>,
        /// Text printed for null fields.
        #[arg(long, default_value = "")]
        null_text: String,
    },
    /// List every field path available in the data.
    Fields {
        #[arg(long)]
        data: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(2)
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let config = Config::new().strict_tags(cli.strict);
    match cli.command {
        Command::Check { template, data } => {
            let text = read_template(&template)?;
            let data = load_data(data.as_deref())?;
            match tagmerge::validate_with_config(&tokenize(&text), &data, &config) {
                Ok(()) => {
                    println!("No syntax errors found!");
                    println!("All fields are valid and present in the data.");
                    Ok(ExitCode::SUCCESS)
                }
                Err(report) => {
                    print!("{report}");
                    Ok(ExitCode::FAILURE)
                }
            }
        }
        Command::Render { template, data, null_text } => {
            let text = read_template(&template)?;
            let data = load_data(data.as_deref())?;
            let config = config.null_text(null_text);
            match tagmerge::check_and_render(&text, &data, &config) {
                Ok(out) => {
                    print!("{out}");
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) => {
                    eprintln!("{e}");
                    Ok(ExitCode::FAILURE)
                }
            }
        }
        Command::Fields { data } => {
            let data = load_data(data.as_deref())?;
            for path in data.field_paths() {
                println!("{path}");
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn read_template(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut text = String::new();
        std::io::stdin().read_to_string(&mut text).context("reading template from stdin")?;
        return Ok(text);
    }
    std::fs::read_to_string(path).with_context(|| format!("reading template {}", path.display()))
}

fn load_data(path: Option<&Path>) -> Result<DataNode> {
    let Some(path) = path else {
        tracing::info!("no data file given, using the built-in sample");
        return DataNode::from_json_str(SAMPLE_DATA).context("parsing built-in sample data");
    };
    let json = std::fs::read_to_string(path).with_context(|| format!("reading data {}", path.display()))?;
    DataNode::from_json_str(&json).with_context(|| format!("parsing JSON in {}", path.display()))
}
