pub mod check;
pub mod fmt;
pub mod set;
pub mod tree;

pub use check::{check, CheckArgs};
pub use fmt::{fmt, FmtArgs};
pub use set::{set, SetArgs};
pub use tree::{tree, TreeArgs};

use crate::config::Config;
use anyhow::Result;
use colored::Colorize;
use hitedit_parser::{parse, BlockNode, ParseError, SchemaCatalog};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use walkdir::WalkDir;

/// Input file extension
pub const INPUT_EXTENSION: &str = "i";

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Input path does not exist: {0}")]
    MissingInput(PathBuf),

    #[error("{0} file(s) failed to parse")]
    ParseFailures(usize),

    #[error("{0} file(s) would be reformatted")]
    NeedsFormatting(usize),
}

/// Config and schema shared by every command
pub struct Workspace {
    pub config: Config,
    pub schema: Arc<SchemaCatalog>,
}

impl Workspace {
    /// Without a schema every block parses untyped
    pub fn load(cwd: &str, schema_override: Option<&Path>) -> Result<Self> {
        let config = Config::load(cwd)?;
        let schema = match config.schema_path(cwd, schema_override) {
            Some(path) => {
                tracing::debug!(path = %path.display(), "Loading schema");
                SchemaCatalog::from_path(&path)?
            }
            None => SchemaCatalog::empty(),
        };

        Ok(Self {
            config,
            schema: Arc::new(schema),
        })
    }

    /// Parse a file, printing a report for malformed input
    pub fn parse_file(&self, path: &Path) -> Result<(String, BlockNode)> {
        let source = std::fs::read_to_string(path)?;
        match parse(&source, &self.schema) {
            Ok(root) => Ok((source, root)),
            Err(err) => {
                eprint!("{}", render_error(&err, path, &source));
                Err(err.into())
            }
        }
    }
}

pub fn render_error(err: &ParseError, path: &Path, source: &str) -> String {
    err.report(&path.display().to_string(), source)
}

/// Print the recoverable warnings of a parsed tree. Returns how many there were.
pub fn print_warnings(root: &BlockNode, path: &Path) -> usize {
    let warnings = root.diagnostics();
    for warning in &warnings {
        println!(
            "  {} {}: {}",
            "warning".yellow().bold(),
            path.display(),
            warning
        );
    }
    warnings.len()
}

/// Expand files and directories into input files
pub fn collect_inputs(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for path in paths {
        if path.is_file() {
            files.push(path.clone());
        } else if path.is_dir() {
            files.extend(find_input_files(path));
        } else {
            return Err(CliError::MissingInput(path.clone()).into());
        }
    }

    Ok(files)
}

fn find_input_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|e| e.into_path())
        .filter(|p| p.is_file() && p.extension().is_some_and(|e| e == INPUT_EXTENSION))
        .collect();
    files.sort();
    files
}
