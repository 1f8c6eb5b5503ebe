use super::{render_error, Workspace};
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use hitedit_editor::{Document, EditorError, IdentityMapper};
use hitedit_parser::BlockNode;
use std::fmt::Write as _;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct TreeArgs {
    /// Input file
    pub file: PathBuf,

    /// Also list schema blocks not present in the file
    #[arg(short, long)]
    pub unused: bool,

    /// Print the opaque id of each block
    #[arg(long)]
    pub ids: bool,
}

pub fn tree(args: TreeArgs, workspace: &Workspace) -> Result<()> {
    let source = std::fs::read_to_string(&args.file)?;
    let document = match Document::from_source(args.file.clone(), &source, workspace.schema.clone()) {
        Ok(document) => document,
        Err(EditorError::Parse(err)) => {
            eprint!("{}", render_error(&err, &args.file, &source));
            return Err(err.into());
        }
        Err(err) => return Err(err.into()),
    };

    print!("{}", render(document.root(), document.identity(), &args));
    Ok(())
}

fn render(root: &BlockNode, identity: &IdentityMapper, args: &TreeArgs) -> String {
    let mut out = String::new();
    for child in root.children() {
        render_block(child, identity, args, 0, &mut out);
    }
    if args.unused {
        for child in root.unused_children() {
            render_unused(child, 0, &mut out);
        }
    }
    out
}

fn render_block(
    node: &BlockNode,
    identity: &IdentityMapper,
    args: &TreeArgs,
    depth: usize,
    out: &mut String,
) {
    let indent = "  ".repeat(depth);
    let _ = write!(out, "{}{}", indent, node.name.bold());
    if let Some(subtype) = node.active_subtype() {
        let _ = write!(out, " ({})", subtype.cyan());
    }
    if node.user_added {
        let _ = write!(out, " {}", "+".green());
    }
    if args.ids {
        if let Some(id) = identity.id_for(node.path()) {
            let _ = write!(out, "  {}", id.as_str().dimmed());
        }
    }
    out.push('\n');

    for child in node.children() {
        render_block(child, identity, args, depth + 1, out);
    }
    if args.unused {
        for child in node.unused_children() {
            render_unused(child, depth + 1, out);
        }
    }
}

fn render_unused(node: &BlockNode, depth: usize, out: &mut String) {
    let _ = writeln!(
        out,
        "{}{}",
        "  ".repeat(depth),
        format!("{} (unused)", node.name).dimmed()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use hitedit_parser::{parse, BlockSchema, SchemaCatalog};

    #[test]
    fn test_render_tree() {
        colored::control::set_override(false);

        let catalog = SchemaCatalog::empty()
            .with_block("/Mesh", BlockSchema::default())
            .with_block("/Outputs", BlockSchema::default());
        let root = parse("[Mesh]\n[]\n", &catalog).unwrap();
        let mut identity = IdentityMapper::new();
        identity.register_tree(&root);

        let args = TreeArgs {
            file: PathBuf::from("in.i"),
            unused: true,
            ids: true,
        };
        assert_eq!(
            render(&root, &identity, &args),
            "Mesh  /Mesh::\nOutputs (unused)\n"
        );
    }
}
