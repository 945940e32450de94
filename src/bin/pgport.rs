//! pgport: T-SQL to PL/pgSQL tree converter
//!
//! Reads a parsed T-SQL syntax tree, runs the conversion passes and writes
//! the PL/pgSQL tree.
//!
//! # Usage
//!
//! ```bash
//! # Convert a tree in notation form, write the compact rendering
//! pgport proc.tree -o proc.sql
//!
//! # JSON in, JSON out, with before/after dumps
//! pgport proc.json -f json -D
//!
//! # Show the pass order
//! pgport --passes
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use pgport::prelude::*;

#[derive(Parser)]
#[command(name = "pgport")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Rewrites T-SQL syntax trees into PL/pgSQL", long_about = None)]
#[command(after_help = "EXAMPLES:
    pgport proc.tree                   # Convert, write output.sql
    pgport proc.json -f json -o out.json
    pgport proc.tree -D -t before.txt  # Dump trees before and after
    pgport --passes                    # List the pipeline")]
struct Cli {
    /// Input tree: `.json`, or tree notation for any other extension
    #[arg(required_unless_present = "passes")]
    input: Option<PathBuf>,

    /// Output file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum)]
    format: Option<OutputFormat>,

    /// Write tree dumps before and after conversion
    #[arg(short = 'D', long)]
    debug: bool,

    /// Dump of the input tree
    #[arg(short, long)]
    tree: Option<PathBuf>,

    /// Dump of the converted tree
    #[arg(short, long)]
    ptree: Option<PathBuf>,

    /// List the conversion passes in order and exit
    #[arg(long)]
    passes: bool,

    /// Configuration file (default: ./pgport.toml)
    #[arg(long, env = "PGPORT_CONFIG")]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "pgport=debug" } else { "pgport=warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(&cli) {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
    Ok(())
}

fn run(cli: &Cli) -> Result<()> {
    if cli.passes {
        list_passes();
        return Ok(());
    }

    let config = Config::load(cli.config.as_deref())?;
    let Some(input) = cli.input.as_deref() else {
        anyhow::bail!("No input tree given");
    };

    let mut tree = read_tree(input)?;
    let debug = cli.debug || config.debug.enabled;
    let ignore_whitespace = config.debug.ignore_whitespace;

    if debug {
        let path = cli.tree.as_deref().unwrap_or(&config.debug.tree);
        write_file(path, &tree.dump(tree.root(), ignore_whitespace))?;
    }

    let conversion = pgport::convert(&mut tree)?;

    if debug {
        let path = cli.ptree.as_deref().unwrap_or(&config.debug.ptree);
        write_file(path, &tree.dump(tree.root(), ignore_whitespace))?;
    }

    let format = cli.format.unwrap_or(config.format);
    let rendered = match format {
        OutputFormat::Text => {
            let mut text = compact(&tree, tree.root());
            text.push('\n');
            text
        }
        OutputFormat::Json => repr::to_json(&tree)?,
        OutputFormat::Tree => notation::write(&tree, tree.root()),
    };
    let output = cli.output.as_deref().unwrap_or(&config.output);
    write_file(output, &rendered)?;

    println!("{} {}", "✓".green(), output.display());
    if conversion.warnings > 0 {
        println!(
            "{}",
            format!("{} approximate conversion(s)", conversion.warnings).yellow()
        );
    }
    Ok(())
}

fn list_passes() {
    println!("{}", "Conversion passes:".cyan().bold());
    for (i, pass) in Pipeline::standard().passes().iter().enumerate() {
        println!("  {:>2}. {}", i + 1, pass.name);
    }
}

fn read_tree(path: &Path) -> Result<Tree> {
    let content =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let tree = if is_json {
        repr::from_json(&content)?
    } else {
        notation::parse(&content)?
    };
    tracing::debug!("Read {} nodes from {}", tree.len(), path.display());
    Ok(tree)
}

fn write_file(path: &Path, content: &str) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    fs::write(path, content).with_context(|| format!("writing {}", path.display()))
}
