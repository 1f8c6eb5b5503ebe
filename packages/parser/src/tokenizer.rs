use crate::error::{ParseError, ParseResult};
use logos::Logos;
use std::fmt;

/// Token types for the block document format
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\f]+")]
pub enum Token<'src> {
    // `[name]`, `[./name]`, `[]`, `[../]`
    #[regex(r"\[[^\]\n]*\]", |lex| lex.slice())]
    Header(&'src str),

    #[token("=")]
    Assign,

    #[token("\n")]
    Newline,

    #[regex(r"#[^\n]*", |lex| lex.slice())]
    Comment(&'src str),

    // May span lines
    #[regex(r"'[^']*'", |lex| lex.slice())]
    SingleQuoted(&'src str),

    #[regex(r#""([^"\\\n]|\\.)*""#, |lex| lex.slice())]
    DoubleQuoted(&'src str),

    // Bare word: cannot start with a bracket or `#`, but may contain them
    #[regex(r#"[^\s\[\]=#'"][^\s='"]*"#, |lex| lex.slice())]
    Word(&'src str),
}

impl<'src> Token<'src> {
    /// Value text with surrounding quotes removed
    pub fn unquoted(&self) -> Option<&'src str> {
        match self {
            Token::SingleQuoted(s) | Token::DoubleQuoted(s) => Some(&s[1..s.len() - 1]),
            Token::Word(s) => Some(s),
            _ => None,
        }
    }
}

impl<'src> fmt::Display for Token<'src> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Header(s) => write!(f, "header {}", s),
            Token::Assign => write!(f, "="),
            Token::Newline => write!(f, "end of line"),
            Token::Comment(_) => write!(f, "comment"),
            Token::SingleQuoted(s) | Token::DoubleQuoted(s) => write!(f, "string {}", s),
            Token::Word(s) => write!(f, "'{}'", s),
        }
    }
}

/// Tokenize a source string
pub fn tokenize(source: &str) -> ParseResult<Vec<(Token, std::ops::Range<usize>)>> {
    let lexer = Token::lexer(source);
    lexer
        .spanned()
        .map(|(result, span)| match result {
            Ok(token) => Ok((token, span)),
            Err(()) => {
                let found = &source[span.clone()];
                let message = if found.starts_with('\'') || found.starts_with('"') {
                    "unterminated string".to_string()
                } else {
                    format!("unexpected '{}'", found)
                };
                Err(ParseError::malformed(source, span.start, message))
            }
        })
        .collect()
}
