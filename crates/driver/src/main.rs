use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;

use parse::{parse_program, LoadError, SourceLoader};
use trace::Trace;

#[derive(Parser, Debug)]
#[command(
    name = "clike",
    about = "CLIKE, an interpreter for a small C-like language",
    version
)]
struct Cli {
    /// Source file to run (.clike)
    input: PathBuf,
    /// Trace every AST node the interpreter visits
    #[arg(long)]
    debug: bool,
    /// Print each symbol scope as analysis leaves it
    #[arg(long)]
    scope: bool,
    /// Print call-stack snapshots on frame push and pop
    #[arg(long)]
    stack: bool,
}

/// Filesystem loader for `#include`; canonicalization supplies the dedup key.
struct FsLoader;

impl SourceLoader for FsLoader {
    fn read(&self, path: &str, base_dir: &Path) -> Result<(PathBuf, String), LoadError> {
        let not_found = || LoadError::NotFound {
            path: path.to_string(),
        };
        let canonical = fs::canonicalize(base_dir.join(path)).map_err(|_| not_found())?;
        let text = fs::read_to_string(&canonical).map_err(|_| not_found())?;
        Ok((canonical, text))
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let origin = fs::canonicalize(&cli.input)
        .with_context(|| format!("input file not found: {}", cli.input.display()))?;
    let text = fs::read_to_string(&origin)
        .with_context(|| format!("failed to read {}", cli.input.display()))?;

    let program = parse_program(&text, &origin, &FsLoader)?;

    let mut tr = Trace::new(cli.debug, cli.scope, cli.stack);
    sema::analyze(&program, &mut tr)?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    interp::run(&program, &mut tr, &mut out)?;
    out.flush().ok();
    Ok(())
}
