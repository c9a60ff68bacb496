use std::collections::VecDeque;

use crate::error::{
    ParseError, ParseErrorKind, Span, SqlateError, SqlateResult, StructuralError,
    StructuralErrorKind,
};

type ParseResult<T> = Result<T, ParseError>;

/// What a [`Token`] represents.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// A run of literal text, escapes already processed.
    Text(String),
    /// `/*IF expr*/`
    If(String),
    /// `/*ELIF expr*/` or `/*ELSEIF expr*/`
    ElseIf(String),
    /// `/*ELSE*/`
    Else,
    /// `/*END*/` closing an `IF` chain.
    EndIf,
    /// `/*BEGIN*/`
    Begin,
    /// `/*END*/` closing a `BEGIN` block.
    EndBegin,
    /// `/*name*/dummy` or `:name`. `paren` is set when the dummy value was a
    /// parenthesised list, e.g. `/*ids*/(1, 2)`.
    Bind { name: String, paren: bool },
    /// `/*$name*/` (raw) or `/*#name*/` (quoted).
    Embedded { name: String, quoted: bool },
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Token {
    pub kind: TokenKind,
    /// Where the construct starts in the source.
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpenDirective {
    If { after_else: bool },
    Begin,
}

/// Splits template text into [`Token`]s.
///
/// The scanner is an iterator of `SqlateResult<Token>`; it stops after the
/// first error. Cloning it (or calling [`Scanner::reset`]) restarts from the
/// beginning of the input.
#[derive(Debug, Clone)]
pub struct Scanner<'a> {
    input: &'a str,
    pos: usize,
    /// Current line number (1-indexed)
    line: usize,
    /// The starting location of the current line
    line_start_pos: usize,
    /// Directives opened but not yet closed, innermost last.
    open: Vec<(OpenDirective, Span)>,
    pending: VecDeque<Token>,
    text: String,
    text_span: Span,
    finished: bool,
}

impl<'a> Scanner<'a> {
    pub fn new(input: &'a str) -> Self {
        Scanner {
            input,
            pos: 0,
            line: 1,
            line_start_pos: 0,
            open: Vec::new(),
            pending: VecDeque::new(),
            text: String::new(),
            text_span: Span::default(),
            finished: false,
        }
    }

    /// Rewinds to the start of the input.
    pub fn reset(&mut self) {
        *self = Self::new(self.input);
    }

    #[inline]
    fn span(&self) -> Span {
        Span {
            offset: self.pos,
            line: self.line,
            column: self.pos.saturating_sub(self.line_start_pos).saturating_add(1),
        }
    }

    #[inline]
    fn rest(&self) -> &'a str {
        self.input.get(self.pos..).unwrap_or_default()
    }

    #[inline]
    fn current_char(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn eof(&self) -> bool {
        self.pos >= self.input.len()
    }

    /// Peek if the remaining input starts with `s`
    fn peek(&self, s: &str) -> bool {
        self.rest().starts_with(s)
    }

    /// Advances past `current_char`, keeping line tracking up to date.
    #[inline]
    fn advance_by_char(&mut self, current_char: char) {
        let char_len = current_char.len_utf8();
        if current_char == '\n' {
            self.line += 1;
            self.line_start_pos = self.pos + char_len;
        }
        self.pos += char_len;
    }

    /// Advances to the absolute byte offset `target`, which must lie on a
    /// char boundary at or after the current position.
    fn advance_to(&mut self, target: usize) {
        while self.pos < target {
            match self.current_char() {
                Some(c) => self.advance_by_char(c),
                None => break,
            }
        }
    }

    /// Advances past a fixed delimiter that contains no newlines.
    #[inline]
    fn advance_bytes_no_newline(&mut self, len: usize) {
        self.pos += len;
    }

    fn error(span: Span, kind: ParseErrorKind) -> ParseError {
        ParseError { span, kind }
    }

    fn structural(span: Span, kind: StructuralErrorKind) -> SqlateError {
        SqlateError::Structural(StructuralError { span, kind })
    }

    fn push_text(&mut self, s: &str) {
        if self.text.is_empty() {
            self.text_span = self.span();
        }
        self.text.push_str(s);
    }

    fn push_char(&mut self, c: char) {
        if self.text.is_empty() {
            self.text_span = self.span();
        }
        self.text.push(c);
        self.advance_by_char(c);
    }

    fn flush_text(&mut self) {
        if !self.text.is_empty() {
            let text = std::mem::take(&mut self.text);
            self.pending.push_back(Token {
                kind: TokenKind::Text(text),
                span: self.text_span,
            });
        }
    }

    fn emit(&mut self, kind: TokenKind, span: Span) {
        self.flush_text();
        self.pending.push_back(Token { kind, span });
    }

    /// Consumes a single-quoted SQL string literal (`''` inside is simply two
    /// adjacent literals) and returns it verbatim.
    fn consume_string_literal(&mut self) -> ParseResult<&'a str> {
        let start = self.pos;
        let span = self.span();
        self.advance_bytes_no_newline(1);
        match self.rest().find('\'') {
            Some(end) => {
                self.advance_to(self.pos + end + 1);
                Ok(self.input.get(start..self.pos).unwrap_or_default())
            }
            None => Err(Self::error(span, ParseErrorKind::UnterminatedString)),
        }
    }

    /// Consumes a `--` comment up to and including the newline.
    fn consume_line_comment(&mut self) -> &'a str {
        let start = self.pos;
        let end = self
            .rest()
            .find('\n')
            .map_or(self.input.len(), |i| self.pos + i + 1);
        self.advance_to(end);
        self.input.get(start..self.pos).unwrap_or_default()
    }

    /// Consumes the dummy value written after a variable comment so the raw
    /// template stays runnable SQL: `/*id*/1`, `/*name*/'x'`, `/*ids*/(1, 2)`
    /// or `/*id*/:id`. Returns whether the dummy was parenthesised.
    fn skip_dummy(&mut self) -> ParseResult<bool> {
        if self.peek("'") {
            self.consume_string_literal()?;
            return Ok(false);
        }

        if self.peek("(") {
            let span = self.span();
            let mut depth = 0_usize;
            while let Some(c) = self.current_char() {
                match c {
                    '\'' => {
                        self.consume_string_literal()?;
                        continue;
                    }
                    '(' => depth += 1,
                    ')' => {
                        depth -= 1;
                        if depth == 0 {
                            self.advance_by_char(c);
                            return Ok(true);
                        }
                    }
                    _ => {}
                }
                self.advance_by_char(c);
            }
            return Err(Self::error(span, ParseErrorKind::UnterminatedParen));
        }

        while let Some(c) = self.current_char() {
            if c.is_whitespace()
                || matches!(c, ',' | '(' | ')' | ';' | '\'')
                || self.peek("/*")
                || self.peek("--")
            {
                break;
            }
            self.advance_by_char(c);
        }
        Ok(false)
    }

    /// Consumes an identifier (alphanumeric + '_' + '.') at the current position.
    fn consume_identifier(&mut self) -> &'a str {
        let start = self.pos;
        while let Some(c) = self.current_char() {
            if c.is_ascii_alphanumeric() || c == '_' || c == '.' {
                self.advance_bytes_no_newline(1);
            } else {
                break;
            }
        }
        // A trailing '.' belongs to the surrounding text, e.g. `:name.`
        while self.pos > start && self.input.as_bytes().get(self.pos - 1) == Some(&b'.') {
            self.pos -= 1;
        }
        self.input.get(start..self.pos).unwrap_or_default()
    }

    fn directive(&mut self, content: &'a str, span: Span) -> SqlateResult<()> {
        let trimmed = content.trim_end();

        if let Some(name) = trimmed.strip_prefix('$').or_else(|| trimmed.strip_prefix('#')) {
            let quoted = trimmed.starts_with('#');
            let name = name.trim();
            if !is_valid_name(name) {
                return Err(Self::error(span, ParseErrorKind::InvalidIdentifier {
                    at_char: name.chars().next().map(String::from).unwrap_or_default(),
                })
                .into());
            }
            self.skip_dummy()?;
            self.emit(
                TokenKind::Embedded {
                    name: name.to_owned(),
                    quoted,
                },
                span,
            );
            return Ok(());
        }

        let word_len = trimmed
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '.'))
            .unwrap_or(trimmed.len());
        let (word, rest) = trimmed.split_at(word_len);
        let rest = rest.trim();

        match word {
            "IF" | "ELIF" | "ELSEIF" => {
                if rest.is_empty() {
                    return Err(Self::error(
                        span,
                        ParseErrorKind::expected(format!("an expression after {word}")),
                    )
                    .into());
                }
                if word == "IF" {
                    self.open.push((OpenDirective::If { after_else: false }, span));
                    self.emit(TokenKind::If(rest.to_owned()), span);
                } else {
                    self.check_alternate(word, span)?;
                    self.emit(TokenKind::ElseIf(rest.to_owned()), span);
                }
            }
            "ELSE" | "END" | "BEGIN" => {
                if !rest.is_empty() {
                    return Err(Self::error(
                        span,
                        ParseErrorKind::expected(format!("'*/' after {word}, found '{rest}'")),
                    )
                    .into());
                }
                match word {
                    "ELSE" => {
                        self.check_alternate(word, span)?;
                        if let Some((OpenDirective::If { after_else }, _)) = self.open.last_mut() {
                            *after_else = true;
                        }
                        self.emit(TokenKind::Else, span);
                    }
                    "BEGIN" => {
                        self.open.push((OpenDirective::Begin, span));
                        self.emit(TokenKind::Begin, span);
                    }
                    _ => match self.open.pop() {
                        Some((OpenDirective::If { .. }, _)) => self.emit(TokenKind::EndIf, span),
                        Some((OpenDirective::Begin, _)) => self.emit(TokenKind::EndBegin, span),
                        None => return Err(Self::structural(span, StructuralErrorKind::UnmatchedEnd)),
                    },
                }
            }
            _ if rest.is_empty() => {
                if !is_valid_name(word) {
                    return Err(Self::error(span, ParseErrorKind::InvalidIdentifier {
                        at_char: word.chars().next().map(String::from).unwrap_or_default(),
                    })
                    .into());
                }
                let paren = self.skip_dummy()?;
                self.emit(
                    TokenKind::Bind {
                        name: word.to_owned(),
                        paren,
                    },
                    span,
                );
            }
            _ => {
                return Err(Self::error(span, ParseErrorKind::UnknownKeyword {
                    keyword: word.to_owned(),
                })
                .into());
            }
        }
        Ok(())
    }

    fn check_alternate(&self, directive: &str, span: Span) -> SqlateResult<()> {
        match self.open.last() {
            Some((OpenDirective::If { after_else: false }, _)) => Ok(()),
            Some((OpenDirective::If { after_else: true }, _)) => Err(Self::structural(
                span,
                StructuralErrorKind::AlternateAfterElse {
                    directive: directive.to_owned(),
                },
            )),
            Some((OpenDirective::Begin, _)) | None => Err(Self::structural(
                span,
                StructuralErrorKind::AlternateWithoutIf {
                    directive: directive.to_owned(),
                },
            )),
        }
    }

    /// Scans the next construct, queueing zero or more tokens.
    fn step(&mut self) -> SqlateResult<()> {
        if self.eof() {
            self.flush_text();
            self.finished = true;
            if let Some((directive, span)) = self.open.last() {
                let directive = match directive {
                    OpenDirective::If { .. } => "IF",
                    OpenDirective::Begin => "BEGIN",
                };
                return Err(Self::structural(*span, StructuralErrorKind::Unterminated {
                    directive: directive.to_owned(),
                }));
            }
            return Ok(());
        }

        // Escapes
        for (escape, literal) in [("\\/*", "/*"), ("\\:", ":"), ("\\\\", "\\")] {
            if self.peek(escape) {
                self.push_text(literal);
                self.advance_bytes_no_newline(escape.len());
                return Ok(());
            }
        }

        if self.peek("'") {
            let span = self.span();
            let literal = self.consume_string_literal()?;
            if self.text.is_empty() {
                self.text_span = span;
            }
            self.text.push_str(literal);
            return Ok(());
        }

        if self.peek("--") {
            let span = self.span();
            let comment = self.consume_line_comment();
            if self.text.is_empty() {
                self.text_span = span;
            }
            self.text.push_str(comment);
            return Ok(());
        }

        if self.peek("/*") {
            let span = self.span();
            let Some(end) = self
                .rest()
                .get(2..)
                .and_then(|after| after.find("*/"))
                .map(|i| i + 2)
            else {
                return Err(Self::error(span, ParseErrorKind::UnterminatedComment).into());
            };
            let content = self
                .input
                .get(self.pos + 2..self.pos + end)
                .unwrap_or_default();
            let comment = self.input.get(self.pos..self.pos + end + 2).unwrap_or_default();

            let is_directive = content
                .chars()
                .next()
                .is_some_and(|c| c.is_ascii_alphabetic() || matches!(c, '_' | '#' | '$'));
            if !is_directive {
                // An ordinary comment or an optimiser hint.
                if self.text.is_empty() {
                    self.text_span = span;
                }
                self.text.push_str(comment);
                self.advance_to(self.pos + end + 2);
                return Ok(());
            }

            self.advance_to(self.pos + end + 2);
            return self.directive(content, span);
        }

        if self.peek("::") {
            self.push_text("::");
            self.advance_bytes_no_newline(2);
            return Ok(());
        }

        if self.peek(":")
            && self
                .rest()
                .chars()
                .nth(1)
                .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        {
            let span = self.span();
            self.advance_bytes_no_newline(1);
            let name = self.consume_identifier();
            self.emit(
                TokenKind::Bind {
                    name: name.to_owned(),
                    paren: false,
                },
                span,
            );
            return Ok(());
        }

        if let Some(c) = self.current_char() {
            self.push_char(c);
        }
        Ok(())
    }
}

impl Iterator for Scanner<'_> {
    type Item = SqlateResult<Token>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(token) = self.pending.pop_front() {
                return Some(Ok(token));
            }
            if self.finished {
                return None;
            }
            if let Err(e) = self.step() {
                self.finished = true;
                self.pending.clear();
                return Some(Err(e));
            }
        }
    }
}

impl std::iter::FusedIterator for Scanner<'_> {}

/// `true` for `name` or `dotted.path_1`.
pub(crate) fn is_valid_name(name: &str) -> bool {
    let mut segments = name.split('.');
    let head_ok = segments.next().is_some_and(|head| {
        head.chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
            && head.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    });
    head_ok
        && segments.all(|segment| {
            !segment.is_empty() && segment.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}

/// Scans the whole input into a token list.
pub fn tokenize(input: &str) -> SqlateResult<Vec<Token>> {
    Scanner::new(input).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        tokenize(input)
            .unwrap()
            .into_iter()
            .map(|token| token.kind)
            .collect()
    }

    macro_rules! text {
        ($data:expr) => {
            TokenKind::Text($data.to_string())
        };
    }
    macro_rules! bind {
        ($name:expr) => {
            TokenKind::Bind {
                name: $name.to_string(),
                paren: false,
            }
        };
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_empty_input() {
        assert_eq!(kinds(""), vec![]);
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_plain_text_is_single_run() {
        assert_eq!(
            kinds("SELECT * FROM t WHERE a = 1"),
            vec![text!("SELECT * FROM t WHERE a = 1")]
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_sigil_bind() {
        assert_eq!(
            kinds("id = :id AND name = :user.name."),
            vec![
                text!("id = "),
                bind!("id"),
                text!(" AND name = "),
                bind!("user.name"),
                text!("."),
            ]
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_double_colon_cast_is_text() {
        assert_eq!(kinds("a::text"), vec![text!("a::text")]);
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_comment_bind_skips_dummy() {
        assert_eq!(
            kinds("id = /*id*/1 AND n = /*name*/'x' AND m = /*m*/:m"),
            vec![
                text!("id = "),
                bind!("id"),
                text!(" AND n = "),
                bind!("name"),
                text!(" AND m = "),
                bind!("m"),
            ]
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_dummy_stops_at_line_comment() {
        assert_eq!(
            kinds("id = /*id*/1-- primary key\nAND x = /*x*/-1"),
            vec![
                text!("id = "),
                bind!("id"),
                text!("-- primary key\nAND x = "),
                bind!("x"),
            ]
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_paren_dummy() {
        assert_eq!(
            kinds("id IN /*ids*/('a', 'b)') ORDER BY id"),
            vec![
                text!("id IN "),
                TokenKind::Bind {
                    name: "ids".to_string(),
                    paren: true
                },
                text!(" ORDER BY id"),
            ]
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_embedded_values() {
        assert_eq!(
            kinds("ORDER BY /*$column*/id, /*#label*/'x'"),
            vec![
                text!("ORDER BY "),
                TokenKind::Embedded {
                    name: "column".to_string(),
                    quoted: false
                },
                text!(", "),
                TokenKind::Embedded {
                    name: "label".to_string(),
                    quoted: true
                },
            ]
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_conditional_chain() {
        assert_eq!(
            kinds("/*IF a*/A/*ELIF b*/B/*ELSEIF c*/C/*ELSE*/D/*END*/"),
            vec![
                TokenKind::If("a".to_string()),
                text!("A"),
                TokenKind::ElseIf("b".to_string()),
                text!("B"),
                TokenKind::ElseIf("c".to_string()),
                text!("C"),
                TokenKind::Else,
                text!("D"),
                TokenKind::EndIf,
            ]
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_end_kind_follows_innermost_directive() {
        assert_eq!(
            kinds("/*BEGIN*//*IF x != null*/:x/*END*//*END*/"),
            vec![
                TokenKind::Begin,
                TokenKind::If("x != null".to_string()),
                bind!("x"),
                TokenKind::EndIf,
                TokenKind::EndBegin,
            ]
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_ordinary_comments_and_hints_are_text() {
        assert_eq!(
            kinds("SELECT /*+ INDEX(t) */ * /* note */ FROM t"),
            vec![text!("SELECT /*+ INDEX(t) */ * /* note */ FROM t")]
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_quoted_literals_are_opaque() {
        assert_eq!(
            kinds("WHERE s = ':x /*IF*/' AND t = ''"),
            vec![text!("WHERE s = ':x /*IF*/' AND t = ''")]
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_line_comments_are_opaque() {
        assert_eq!(
            kinds("SELECT 1 -- at :time\nFROM t"),
            vec![text!("SELECT 1 -- at :time\nFROM t")]
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_escapes() {
        assert_eq!(
            kinds("a \\/*IF x*/ b \\:c \\\\"),
            vec![text!("a /*IF x*/ b :c \\")]
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_spans_track_lines() {
        let tokens = tokenize("SELECT *\nFROM t\nWHERE /*IF a*/x/*END*/").unwrap();
        let if_token = tokens
            .iter()
            .find(|t| matches!(t.kind, TokenKind::If(_)))
            .unwrap();
        assert_eq!(if_token.span.line, 3);
        assert_eq!(if_token.span.column, 7);
        assert_eq!(if_token.span.offset, 22);
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_unterminated_comment() {
        let err = tokenize("SELECT 1\n  /*IF a").unwrap_err();
        match err {
            SqlateError::Parse(e) => {
                assert_eq!(e.kind, ParseErrorKind::UnterminatedComment);
                assert_eq!(e.span.offset, 11);
                assert_eq!(e.span.line, 2);
                assert_eq!(e.span.column, 3);
            }
            other => panic!("Expected a parse error, got {other:?}"),
        }
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_unterminated_string() {
        let err = tokenize("WHERE a = 'abc").unwrap_err();
        assert!(matches!(
            err,
            SqlateError::Parse(ParseError {
                kind: ParseErrorKind::UnterminatedString,
                ..
            })
        ));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_unknown_keyword() {
        let err = tokenize("/*WHILE x*/").unwrap_err();
        assert!(
            matches!(err, SqlateError::Parse(ParseError { kind: ParseErrorKind::UnknownKeyword { ref keyword }, .. }) if keyword == "WHILE")
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_if_without_expression() {
        let err = tokenize("/*IF */x/*END*/").unwrap_err();
        assert!(
            matches!(err, SqlateError::Parse(ParseError { kind: ParseErrorKind::Expected { ref description }, .. }) if description.contains("expression"))
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_unmatched_end() {
        let err = tokenize("a /*END*/").unwrap_err();
        assert!(matches!(
            err,
            SqlateError::Structural(StructuralError {
                kind: StructuralErrorKind::UnmatchedEnd,
                ..
            })
        ));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_else_after_else() {
        let err = tokenize("/*IF a*/1/*ELSE*/2/*ELSE*/3/*END*/").unwrap_err();
        assert!(matches!(
            err,
            SqlateError::Structural(StructuralError {
                kind: StructuralErrorKind::AlternateAfterElse { .. },
                ..
            })
        ));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_else_inside_begin() {
        let err = tokenize("/*IF a*//*BEGIN*/x/*ELSE*/y/*END*//*END*/").unwrap_err();
        assert!(matches!(
            err,
            SqlateError::Structural(StructuralError {
                kind: StructuralErrorKind::AlternateWithoutIf { .. },
                ..
            })
        ));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_dangling_open_directive() {
        let err = tokenize("x /*BEGIN*/ y").unwrap_err();
        match err {
            SqlateError::Structural(e) => {
                assert_eq!(
                    e.kind,
                    StructuralErrorKind::Unterminated {
                        directive: "BEGIN".to_string()
                    }
                );
                assert_eq!(e.span.offset, 2);
            }
            other => panic!("Expected a structural error, got {other:?}"),
        }
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_scanner_is_restartable() {
        let mut scanner = Scanner::new("a :b c");
        let first: Vec<_> = scanner.by_ref().collect();
        assert!(scanner.next().is_none());
        scanner.reset();
        let second: Vec<_> = scanner.collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_valid_names() {
        assert!(is_valid_name("a"));
        assert!(is_valid_name("_a.b_1.c"));
        assert!(!is_valid_name("1a"));
        assert!(!is_valid_name("a..b"));
        assert!(!is_valid_name("a."));
        assert!(!is_valid_name(""));
    }
}
