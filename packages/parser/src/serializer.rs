use crate::ast::{BlockNode, ParameterSlot, TYPE_PARAM};

/// Serializer converts a block tree back to document text
///
/// Output is canonical: `[name]` headers closed by `[]`, one parameter per
/// line, children indented one level, a blank line between top-level blocks.
/// Only slots that were set, added, or changed are written, with `type`
/// first, then the block's own parameters, then the active subtype's.
pub struct Serializer {
    indent_level: usize,
    indent_string: String,
}

impl Serializer {
    pub fn new() -> Self {
        Self {
            indent_level: 0,
            indent_string: "  ".to_string(),
        }
    }

    pub fn with_indent(indent: &str) -> Self {
        Self {
            indent_level: 0,
            indent_string: indent.to_string(),
        }
    }

    /// Serialize a whole tree starting at its root
    pub fn serialize(&mut self, root: &BlockNode) -> String {
        let mut output = String::new();

        self.serialize_parameters(root, &mut output);
        let has_root_params = !output.is_empty();

        for (i, child) in root.children().enumerate() {
            if i > 0 || has_root_params {
                output.push('\n');
            }
            self.serialize_block(child, &mut output);
        }

        output
    }

    /// Serialize one block and its subtree at the current indent
    pub fn serialize_block(&mut self, block: &BlockNode, output: &mut String) {
        self.write_indent(output);
        output.push('[');
        output.push_str(&block.name);
        output.push(']');
        if !block.comments.is_empty() {
            output.push_str("  # ");
            output.push_str(&block.comments.replace('\n', " "));
        }
        output.push('\n');

        self.indent_level += 1;
        self.serialize_parameters(block, output);
        for child in block.children() {
            self.serialize_block(child, output);
        }
        self.indent_level -= 1;

        self.write_indent(output);
        output.push_str("[]\n");
    }

    fn serialize_parameters(&mut self, block: &BlockNode, output: &mut String) {
        let type_slot = block.parameter(TYPE_PARAM);
        let own = block
            .parameters
            .values()
            .filter(|slot| slot.name != TYPE_PARAM);

        for slot in type_slot
            .into_iter()
            .chain(own)
            .chain(block.subtype_parameters())
            .filter(|slot| slot.should_write())
        {
            self.serialize_parameter(slot, output);
        }
    }

    fn serialize_parameter(&mut self, slot: &ParameterSlot, output: &mut String) {
        let multi_line_comment = slot.comments.contains('\n');
        if multi_line_comment {
            for line in slot.comments.split('\n') {
                self.write_indent(output);
                output.push('#');
                if !line.is_empty() {
                    output.push(' ');
                    output.push_str(line);
                }
                output.push('\n');
            }
        }

        self.write_indent(output);
        output.push_str(&slot.name);
        output.push_str(" =");
        let value = slot.input_file_value();
        if !value.is_empty() {
            output.push(' ');
            output.push_str(&value);
        }
        if !multi_line_comment && !slot.comments.is_empty() {
            output.push_str("  # ");
            output.push_str(&slot.comments);
        }
        output.push('\n');
    }

    fn write_indent(&self, output: &mut String) {
        for _ in 0..self.indent_level {
            output.push_str(&self.indent_string);
        }
    }
}

impl Default for Serializer {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenience function to serialize a tree with two-space indentation
pub fn serialize(root: &BlockNode) -> String {
    let mut serializer = Serializer::new();
    serializer.serialize(root)
}
