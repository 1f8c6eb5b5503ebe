use super::{collect_inputs, print_warnings, CliError, Workspace};
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use hitedit_parser::BlockNode;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Input files or directories to check
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Also list missing required parameters
    #[arg(short, long)]
    pub strict: bool,
}

pub fn check(args: CheckArgs, workspace: &Workspace) -> Result<()> {
    println!("🔍 {} hitedit check", "Starting".green().bold());

    let files = collect_inputs(&args.paths)?;
    let mut failed = 0;
    let mut warnings = 0;

    for file in &files {
        let root = match workspace.parse_file(file) {
            Ok((_, root)) => root,
            Err(_) => {
                failed += 1;
                continue;
            }
        };

        warnings += print_warnings(&root, file);
        if args.strict {
            for (path, parameter) in missing_required(&root) {
                println!(
                    "  {} {}: {} is missing required parameter '{}'",
                    "warning".yellow().bold(),
                    file.display(),
                    path,
                    parameter
                );
                warnings += 1;
            }
        }
    }

    println!();
    println!("   Files checked: {}", files.len());
    if warnings > 0 {
        println!("   {} {}", "Warnings:".yellow(), warnings);
    }
    if failed > 0 {
        return Err(CliError::ParseFailures(failed).into());
    }
    if warnings == 0 {
        println!("   {} No issues found!", "✓".green());
    }
    Ok(())
}

/// (block path, parameter) for every required slot without a value
fn missing_required(root: &BlockNode) -> Vec<(String, String)> {
    root.descendants()
        .into_iter()
        .skip(1)
        .flat_map(|node| {
            node.all_parameters()
                .filter(|slot| slot.required && slot.value().is_none())
                .map(|slot| (node.path().to_string(), slot.name.clone()))
                .collect::<Vec<_>>()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use hitedit_parser::{parse, BlockSchema, ParameterSchema, SchemaCatalog};

    #[test]
    fn test_missing_required() {
        let catalog = SchemaCatalog::empty().with_block(
            "/Mesh",
            BlockSchema {
                parameters: vec![
                    ParameterSchema::new("dim", "Integer").required(),
                    ParameterSchema::new("nx", "Integer").required(),
                ],
                ..Default::default()
            },
        );
        let root = parse("[Mesh]\n  dim = 2\n[]\n", &catalog).unwrap();
        assert_eq!(
            missing_required(&root),
            vec![("/Mesh".to_string(), "nx".to_string())]
        );
    }
}
