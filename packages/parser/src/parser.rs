use crate::ast::{BlockNode, ParameterSlot, TYPE_PARAM};
use crate::error::{ParseError, ParseResult};
use crate::schema::{join_path, SchemaCatalog};
use crate::tokenizer::{tokenize, Token};
use tracing::{debug, warn};

/// `key = value` line before schema binding
#[derive(Debug, Clone)]
struct RawParam {
    key: String,
    value: String,
    comments: String,
}

/// `[name] ... []` section before schema binding
#[derive(Debug, Clone)]
struct RawBlock {
    name: String,
    offset: usize,
    comments: String,
    params: Vec<RawParam>,
    children: Vec<RawBlock>,
}

impl RawBlock {
    fn new(name: impl Into<String>, offset: usize) -> Self {
        Self {
            name: name.into(),
            offset,
            comments: String::new(),
            params: Vec::new(),
            children: Vec::new(),
        }
    }
}

/// Parser for block documents
pub struct Parser<'src> {
    source: &'src str,
    tokens: Vec<(Token<'src>, std::ops::Range<usize>)>,
    pos: usize,
    schema: &'src SchemaCatalog,
}

impl<'src> Parser<'src> {
    pub fn new(source: &'src str, schema: &'src SchemaCatalog) -> ParseResult<Self> {
        let tokens = tokenize(source)?;
        Ok(Self {
            source,
            tokens,
            pos: 0,
            schema,
        })
    }

    /// Parse a complete document into a tree rooted at `/`
    pub fn parse_document(&mut self) -> ParseResult<BlockNode> {
        let raw = self.parse_sections()?;

        let mut root = BlockNode::instantiate_root(self.schema);
        for param in raw.params {
            self.bind_parameter(&mut root, param);
        }
        for child in raw.children {
            self.bind_block(&mut root, child);
        }
        Ok(root)
    }

    // ---- syntax ----

    fn parse_sections(&mut self) -> ParseResult<RawBlock> {
        let mut stack = vec![RawBlock::new("", 0)];
        let mut pending_comments: Vec<String> = Vec::new();
        let mut line_has_content = false;

        while let Some((token, span)) = self.peek().cloned() {
            match token {
                Token::Newline => {
                    if !line_has_content {
                        pending_comments.clear();
                    }
                    line_has_content = false;
                    self.advance();
                }
                Token::Comment(text) => {
                    pending_comments.push(comment_text(text));
                    line_has_content = true;
                    self.advance();
                }
                Token::Header(header) => {
                    self.advance();
                    pending_comments.clear();
                    line_has_content = true;
                    self.parse_header(header, span.start, &mut stack)?;
                }
                Token::Word(key) => {
                    self.advance();
                    line_has_content = true;
                    let comments = std::mem::take(&mut pending_comments);
                    let param = self.parse_parameter(key, span.start, comments)?;

                    let current = stack.last_mut().ok_or_else(|| self.error_at(span.start, "no open block"))?;
                    if current.params.iter().any(|p| p.key == param.key) {
                        return Err(self.error_at(
                            span.start,
                            format!("duplicate parameter '{}'", param.key),
                        ));
                    }
                    current.params.push(param);
                }
                other => {
                    return Err(self.error_at(
                        span.start,
                        format!("expected parameter name or block header, found {}", other),
                    ));
                }
            }
        }

        if stack.len() > 1 {
            let unclosed = stack.pop().map(|b| (b.offset, b.name)).unwrap_or_default();
            return Err(self.error_at(unclosed.0, format!("block [{}] is never closed", unclosed.1)));
        }
        stack
            .pop()
            .ok_or_else(|| self.error_at(self.source.len(), "empty block stack"))
    }

    fn parse_header(
        &mut self,
        header: &'src str,
        offset: usize,
        stack: &mut Vec<RawBlock>,
    ) -> ParseResult<()> {
        let inner = header[1..header.len() - 1].trim();

        if inner.is_empty() || inner == "../" {
            if stack.len() < 2 {
                return Err(self.error_at(offset, "block close without matching open"));
            }
            if let Some(closed) = stack.pop() {
                let parent = stack.last_mut().ok_or_else(|| self.error_at(offset, "no open block"))?;
                parent.children.push(closed);
            }
            if let Some((Token::Comment(_), _)) = self.peek() {
                self.advance();
            }
            return self.expect_end_of_line();
        }

        let name = inner.strip_prefix("./").unwrap_or(inner);
        if name.is_empty() || name.contains('/') || name.chars().any(char::is_whitespace) {
            return Err(self.error_at(offset, format!("invalid block name '{}'", inner)));
        }
        if let Some(parent) = stack.last() {
            if parent.children.iter().any(|c| c.name == name) {
                return Err(self.error_at(offset, format!("duplicate block [{}]", name)));
            }
        }

        let mut block = RawBlock::new(name, offset);
        if let Some((Token::Comment(text), _)) = self.peek().cloned() {
            block.comments = comment_text(text);
            self.advance();
        }
        stack.push(block);
        self.expect_end_of_line()
    }

    fn parse_parameter(
        &mut self,
        key: &'src str,
        offset: usize,
        mut comments: Vec<String>,
    ) -> ParseResult<RawParam> {
        match self.peek() {
            Some((Token::Assign, _)) => {
                self.advance();
            }
            _ => {
                return Err(self.error_at(offset, format!("expected '=' after '{}'", key)));
            }
        }

        let mut parts: Vec<&'src str> = Vec::new();
        while let Some(text) = self.peek().and_then(|(token, _)| token.unquoted()) {
            parts.push(text);
            self.advance();
        }

        if let Some((Token::Comment(text), _)) = self.peek().cloned() {
            comments.push(comment_text(text));
            self.advance();
        }
        self.expect_end_of_line()?;

        Ok(RawParam {
            key: key.to_string(),
            value: parts.join(" "),
            comments: comments.join("\n"),
        })
    }

    fn expect_end_of_line(&mut self) -> ParseResult<()> {
        match self.peek().cloned() {
            None | Some((Token::Newline, _)) => Ok(()),
            Some((token, span)) => Err(self.error_at(
                span.start,
                format!("expected end of line, found {}", token),
            )),
        }
    }

    // ---- schema binding ----

    fn bind_block(&self, parent: &mut BlockNode, raw: RawBlock) {
        let path = join_path(parent.path(), &raw.name);
        let mut node = match parent.take_child(&raw.name) {
            Some(placeholder) => placeholder,
            None => {
                let mut node = BlockNode::instantiate(self.schema, parent.path(), &raw.name);
                // Anything the schema does not declare by name was named by the user
                node.user_added = true;
                node
            }
        };

        if !node.is_schema_known() {
            debug!(path = %path, "Block not in schema, loading as permissive leaf");
        }
        node.comments = raw.comments;

        let mut params = raw.params;
        if let Some(index) = params.iter().position(|p| p.key == TYPE_PARAM) {
            let type_param = params.remove(index);
            self.bind_type(&mut node, type_param);
        }
        for param in params {
            self.bind_parameter(&mut node, param);
        }

        for child in raw.children {
            self.bind_block(&mut node, child);
        }

        debug!(path = %path, subtype = ?node.active_subtype(), "Bound block");
        parent.insert_child(node);
    }

    fn bind_type(&self, node: &mut BlockNode, param: RawParam) {
        let type_name = param.value.trim().to_string();
        let has_subtypes = !node.declared_subtypes().is_empty();

        if has_subtypes && node.switch_subtype(&type_name) {
            if let Some(slot) = node.parameter_mut(TYPE_PARAM) {
                slot.comments = param.comments;
            }
            return;
        }

        if has_subtypes {
            let warning = ParseError::unknown_type(node.path(), &type_name);
            warn!(path = %node.path(), type_name = %type_name, "Unknown block type, no subtype selected");
            node.clear_subtype();
            node.warnings.push(warning);
        }
        self.bind_parameter(node, param);
    }

    fn bind_parameter(&self, node: &mut BlockNode, param: RawParam) {
        let path = node.path().to_string();
        let known = node.is_schema_known();

        let Some(slot) = node.parameter_mut(&param.key) else {
            let mut slot = if known {
                ParameterSlot::user(&param.key, param.value)
            } else {
                ParameterSlot::untyped(&param.key, param.value)
            };
            slot.comments = param.comments;
            node.add_user_parameter(slot);
            return;
        };

        slot.comments = param.comments;
        if let Err(err) = slot.set_text(&param.value) {
            slot.relax_to_text(&param.value);
            warn!(path = %path, parameter = %param.key, %err, "Value does not match declared type");
            node.warnings
                .push(ParseError::invalid_value(&path, &param.key, err.to_string()));
        }
    }

    // ---- token helpers ----

    fn peek(&self) -> Option<&(Token<'src>, std::ops::Range<usize>)> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<&(Token<'src>, std::ops::Range<usize>)> {
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        self.tokens.get(self.pos - 1)
    }

    fn error_at(&self, offset: usize, message: impl Into<String>) -> ParseError {
        ParseError::malformed(self.source, offset, message)
    }
}

/// Comment text without the `#` marker and the one space written after it
fn comment_text(raw: &str) -> String {
    let text = raw.strip_prefix('#').unwrap_or(raw).trim_end_matches('\r');
    text.strip_prefix(' ').unwrap_or(text).to_string()
}

/// Parse a document against a schema catalog
pub fn parse(source: &str, schema: &SchemaCatalog) -> ParseResult<BlockNode> {
    let mut parser = Parser::new(source, schema)?;
    parser.parse_document()
}

/// Parse without a schema: every block is a permissive leaf
pub fn parse_untyped(source: &str) -> ParseResult<BlockNode> {
    parse(source, &SchemaCatalog::empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ParamValue;

    #[test]
    fn test_parse_nested_blocks() {
        let source = r#"
[Mesh]
  dim = 2
  [gen]
    nx = 10
  []
[]

[Outputs]
  exodus = true
[]
"#;
        let root = parse_untyped(source).unwrap();
        assert_eq!(root.paths(), vec!["/Mesh", "/Mesh/gen", "/Outputs"]);
        let gen = root.find("/Mesh/gen").unwrap();
        assert_eq!(gen.parameter("nx").unwrap().value(), Some(&ParamValue::from("10")));
    }

    #[test]
    fn test_legacy_headers() {
        let source = "[Kernels]\n  [./diff]\n    type = Diffusion\n  [../]\n[]\n";
        let root = parse_untyped(source).unwrap();
        assert!(root.find("/Kernels/diff").is_some());
    }

    #[test]
    fn test_unclosed_block_reports_locator() {
        let err = parse_untyped("[Mesh]\n  dim = 2\n  [gen]\n  []\n").unwrap_err();
        match err {
            ParseError::Malformed { line, column, .. } => assert_eq!((line, column), (1, 1)),
            other => panic!("expected malformed, got {:?}", other),
        }
    }

    #[test]
    fn test_unmatched_close() {
        let err = parse_untyped("[A]\n[]\n[]\n").unwrap_err();
        match err {
            ParseError::Malformed { line, message, .. } => {
                assert_eq!(line, 3);
                assert!(message.contains("without matching open"));
            }
            other => panic!("expected malformed, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_assign() {
        let err = parse_untyped("[A]\n  dim 2\n[]").unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("expected '='"));
    }

    #[test]
    fn test_comments_attach_to_parameters() {
        let source = "[A]\n  # leading\n  x = 1 # trailing\n\n  # orphan\n\n  y = 2\n[] # ignored\n";
        let root = parse_untyped(source).unwrap();
        let a = root.find("/A").unwrap();
        assert_eq!(a.parameter("x").unwrap().comments, "leading\ntrailing");
        assert_eq!(a.parameter("y").unwrap().comments, "");
    }

    #[test]
    fn test_comment_keeps_inner_whitespace() {
        let source = "[A]\n  #   indented\n  #\n  x = 1\n  y = 2  #no space \n[]\n";
        let root = parse_untyped(source).unwrap();
        let a = root.find("/A").unwrap();
        assert_eq!(a.parameter("x").unwrap().comments, "  indented\n");
        assert_eq!(a.parameter("y").unwrap().comments, "no space ");
    }

    #[test]
    fn test_unquoted_words_join() {
        let root = parse_untyped("[A]\n  v = 1 2   3\n  s = 'a  b'\n[]").unwrap();
        let a = root.find("/A").unwrap();
        assert_eq!(a.parameter("v").unwrap().value(), Some(&ParamValue::from("1 2 3")));
        assert_eq!(a.parameter("s").unwrap().value(), Some(&ParamValue::from("a  b")));
    }

    #[test]
    fn test_duplicate_parameter_is_malformed() {
        let err = parse_untyped("[A]\n  x = 1\n  x = 2\n[]").unwrap_err();
        assert!(err.to_string().contains("duplicate parameter"));
    }
}
