use super::{collect_inputs, CliError, Workspace};
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use hitedit_parser::{ParseError, Serializer};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Args, Debug)]
pub struct FmtArgs {
    /// Input files or directories (directories are searched for *.i)
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Rewrite files in place
    #[arg(short, long)]
    pub write: bool,

    /// Only report files that are not canonical
    #[arg(long, conflicts_with = "write")]
    pub check: bool,
}

enum Outcome {
    Unchanged(String),
    Changed(String),
}

pub fn fmt(args: FmtArgs, workspace: &Workspace) -> Result<()> {
    let files = collect_inputs(&args.paths)?;
    let mut failed = 0;
    let mut changed = 0;

    for file in &files {
        let outcome = match format_file(file, workspace) {
            Ok(outcome) => outcome,
            Err(err) => {
                // Parse errors were already reported
                if err.downcast_ref::<ParseError>().is_none() {
                    eprintln!("  {} {}: {}", "✗".red(), file.display(), err);
                }
                failed += 1;
                continue;
            }
        };

        match outcome {
            Outcome::Unchanged(_) if args.write || args.check => {
                tracing::debug!(file = %file.display(), "Already canonical");
            }
            Outcome::Changed(text) if args.write => {
                fs::write(file, &text)?;
                changed += 1;
                println!("  {} {}", "✓".green(), file.display());
            }
            Outcome::Changed(_) if args.check => {
                changed += 1;
                println!("  {} {}", "✗".red(), file.display());
            }
            Outcome::Unchanged(text) | Outcome::Changed(text) => print!("{}", text),
        }
    }

    if failed > 0 {
        return Err(CliError::ParseFailures(failed).into());
    }
    if args.check && changed > 0 {
        return Err(CliError::NeedsFormatting(changed).into());
    }
    if args.write {
        println!(
            "✨ {} {} of {} file(s) reformatted",
            "Done".green().bold(),
            changed,
            files.len()
        );
    }
    Ok(())
}

fn format_file(file: &Path, workspace: &Workspace) -> Result<Outcome> {
    let (source, root) = workspace.parse_file(file)?;
    let text = Serializer::with_indent(&workspace.config.indent).serialize(&root);

    if text == source {
        Ok(Outcome::Unchanged(text))
    } else {
        Ok(Outcome::Changed(text))
    }
}
