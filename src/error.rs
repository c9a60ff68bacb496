pub type SqlateResult<T> = std::result::Result<T, SqlateError>;

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash, thiserror::Error)]
pub enum ParseErrorKind {
    #[error("Unterminated comment (expected '*/')")]
    UnterminatedComment,
    #[error("Unterminated string literal (expected \"'\")")]
    UnterminatedString,
    #[error("Unterminated parenthesised value (expected ')')")]
    UnterminatedParen,
    #[error("Invalid identifier starting with '{at_char}'")]
    InvalidIdentifier { at_char: String },
    #[error("Unknown keyword '{keyword}'")]
    UnknownKeyword { keyword: String },
    #[error("Expected {description}")]
    Expected { description: String },
}

impl ParseErrorKind {
    pub fn expected<T: Into<String>>(description: T) -> Self {
        Self::Expected {
            description: description.into(),
        }
    }
}

/// Where in the template source something happened.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Span {
    /// Byte offset into the source.
    pub offset: usize,
    /// 1-indexed line.
    pub line: usize,
    /// 1-indexed column, counted in bytes.
    pub column: usize,
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash, thiserror::Error)]
#[error("Parse error at {span}: {kind}")]
pub struct ParseError {
    pub span: Span,
    #[source]
    pub kind: ParseErrorKind,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash, thiserror::Error)]
pub enum StructuralErrorKind {
    #[error("/*END*/ without an open /*IF*/ or /*BEGIN*/")]
    UnmatchedEnd,
    #[error("/*{directive}*/ outside of an /*IF*/ block")]
    AlternateWithoutIf { directive: String },
    #[error("/*{directive}*/ after /*ELSE*/")]
    AlternateAfterElse { directive: String },
    #[error("unterminated directive /*{directive}*/ (expected /*END*/)")]
    Unterminated { directive: String },
    #[error("directives nested deeper than {limit} levels")]
    TooDeep { limit: usize },
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash, thiserror::Error)]
#[error("Structural error at {span}: {kind}")]
pub struct StructuralError {
    pub span: Span,
    #[source]
    pub kind: StructuralErrorKind,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash, thiserror::Error)]
pub enum SqlateError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Structural(#[from] StructuralError),
    #[error("Condition '{expression}' evaluated to {found}, expected a boolean")]
    EvaluationType { expression: String, found: String },
    #[error("Parameter not found: {name}")]
    MissingParameter { name: String },
    #[error("Could not evaluate '{expression}': {message}")]
    Evaluation { expression: String, message: String },
}

impl SqlateError {
    pub(crate) fn evaluation<E: Into<String>, M: Into<String>>(expression: E, message: M) -> Self {
        Self::Evaluation {
            expression: expression.into(),
            message: message.into(),
        }
    }

    pub(crate) fn missing<N: Into<String>>(name: N) -> Self {
        Self::MissingParameter { name: name.into() }
    }

    /// `true` for errors raised while parsing a template, as opposed to while
    /// transforming it.
    pub const fn is_parse_time(&self) -> bool {
        match self {
            Self::Parse(_) | Self::Structural(_) => true,
            Self::EvaluationType { .. } | Self::MissingParameter { .. } | Self::Evaluation { .. } => {
                false
            }
        }
    }
}
