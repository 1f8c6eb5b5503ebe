use super::{render_error, Workspace};
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use hitedit_editor::{EditorError, Mutation, MutationResult, ReconciliationEngine};
use std::fs;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct SetArgs {
    /// Input file
    pub file: PathBuf,

    /// Block path, e.g. /Mesh or /Kernels/diff
    pub block: String,

    /// Parameter name
    pub parameter: String,

    /// New value, as it would be written in the file
    pub value: String,

    /// Write the result back instead of printing it
    #[arg(short, long)]
    pub write: bool,
}

pub fn set(args: SetArgs, workspace: &Workspace) -> Result<()> {
    let source = fs::read_to_string(&args.file)?;
    let (result, text) = match apply(&args, &source, workspace) {
        Err(EditorError::Parse(err)) => {
            eprint!("{}", render_error(&err, &args.file, &source));
            return Err(err.into());
        }
        other => other?,
    };

    if args.write {
        fs::write(&args.file, &text)?;
        println!(
            "  {} {}/{} = {} (version {})",
            "✓".green(),
            result.path,
            args.parameter,
            args.value,
            result.version
        );
    } else {
        print!("{}", text);
    }
    Ok(())
}

/// Run the edit through a reconciliation engine and return the regenerated text
fn apply(
    args: &SetArgs,
    source: &str,
    workspace: &Workspace,
) -> Result<(MutationResult, String), EditorError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()?;

    runtime.block_on(async {
        let engine = ReconciliationEngine::from_source(
            args.file.clone(),
            source,
            workspace.schema.clone(),
            workspace.config.sync_config(),
        )?;
        let result = engine.apply(Mutation::SetValueText {
            path: args.block.clone(),
            parameter: args.parameter.clone(),
            text: args.value.clone(),
        })?;
        engine.flush();
        Ok((result, engine.text()))
    })
}
