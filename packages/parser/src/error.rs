use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type ParseResult<T> = Result<T, ParseError>;

#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParseError {
    #[error("Malformed input at {line}:{column}: {message}")]
    Malformed {
        line: usize,
        column: usize,
        /// Byte offset into the source, used for pretty reports
        offset: usize,
        message: String,
    },

    /// Recoverable: the block keeps parsing with no active subtype
    #[error("Unknown type '{type_name}' for block {path}")]
    UnknownType { path: String, type_name: String },

    /// Recoverable: the slot is relaxed to a string type
    #[error("Invalid value for {path}/{parameter}: {message}")]
    InvalidValue {
        path: String,
        parameter: String,
        message: String,
    },
}

impl ParseError {
    pub fn malformed(source: &str, offset: usize, message: impl Into<String>) -> Self {
        let (line, column) = line_col(source, offset);
        Self::Malformed {
            line,
            column,
            offset,
            message: message.into(),
        }
    }

    pub fn unknown_type(path: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self::UnknownType {
            path: path.into(),
            type_name: type_name.into(),
        }
    }

    pub fn invalid_value(
        path: impl Into<String>,
        parameter: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            path: path.into(),
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    /// Whether this error aborts a parse or is only attached to a block
    pub fn is_fatal(&self) -> bool {
        matches!(self, ParseError::Malformed { .. })
    }

    /// Render a report for terminal output
    #[cfg(feature = "pretty-errors")]
    pub fn report(&self, file_name: &str, source: &str) -> String {
        use ariadne::{Color, Label, Report, ReportKind, Source};

        let (offset, message) = match self {
            ParseError::Malformed { offset, message, .. } => (*offset, message.clone()),
            _ => return format!("warning: {}\n", self),
        };
        let end = (offset + 1).min(source.len()).max(offset);

        let mut out = Vec::new();
        let written = Report::build(ReportKind::Error, file_name, offset)
            .with_message(self.to_string())
            .with_label(
                Label::new((file_name, offset..end))
                    .with_color(Color::Red)
                    .with_message(message),
            )
            .finish()
            .write((file_name, Source::from(source)), &mut out);

        match written {
            Ok(()) => String::from_utf8_lossy(&out).into_owned(),
            Err(_) => format!("error: {}\n", self),
        }
    }
}

/// 1-based line and column for a byte offset
pub fn line_col(source: &str, offset: usize) -> (usize, usize) {
    let offset = offset.min(source.len());
    let before = &source[..offset];
    let line = before.matches('\n').count() + 1;
    let column = match before.rfind('\n') {
        Some(nl) => before[nl + 1..].chars().count() + 1,
        None => before.chars().count() + 1,
    };
    (line, column)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_col() {
        let source = "[A]\n  x = 1\n[]";
        assert_eq!(line_col(source, 0), (1, 1));
        assert_eq!(line_col(source, 6), (2, 3));
        assert_eq!(line_col(source, source.len()), (3, 3));
    }

    #[test]
    fn test_only_malformed_is_fatal() {
        assert!(ParseError::malformed("", 0, "boom").is_fatal());
        assert!(!ParseError::unknown_type("/Mesh", "Nope").is_fatal());
        assert!(!ParseError::invalid_value("/Mesh", "dim", "bad").is_fatal());
    }
}
