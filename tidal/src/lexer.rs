//! Tokenizer for the statement dialect of the built-in `memory` engine.
//!
//! [`Segmenter`] is public so that front ends can split and highlight input
//! without executing it.

use crate::numeric::Numeric;

#[derive(Debug, thiserror::Error)]
pub enum LexerError {
    #[error("Unknown token {0:?}")]
    UnknownToken(String),

    #[error("Unexpected end of input")]
    UnexpectedEof,
}

type LexerResult<T> = std::result::Result<T, LexerError>;

macro_rules! keywords {
    ($($v:ident)*) => {
        /// Reserved words.
        pub const KEYWORDS: &[&str] = &[$(stringify!($v)),*];

        #[derive(Clone, PartialEq)]
        pub(crate) enum Token {
            $($v,)*
            LeftParen,
            RightParen,
            Asterisk,
            Comma,
            Minus,
            Semicolon,
            Eq,
            IntegerLiteral(i64),
            NumericLiteral(Numeric),
            String(String),
            Identifier(String),
            Parameter,
            Comment(String),
            Whitespace(char),
            Eof,
        }

        impl Token {
            fn keyword(word: &str) -> Option<Self> {
                $(
                    if word.eq_ignore_ascii_case(stringify!($v)) {
                        return Some(Self::$v);
                    }
                )*
                None
            }

            fn keyword_text(&self) -> Option<&'static str> {
                match self {
                    $(Self::$v => Some(stringify!($v)),)*
                    _ => None,
                }
            }
        }
    }
}

keywords! {
    And
    Bigint
    Blob
    Boolean
    Char
    Clob
    Create
    Date
    Decimal
    Delete
    Double
    Drop
    Exists
    False
    Float
    From
    If
    Insert
    Int
    Integer
    Interval
    Into
    Is
    Memo
    Not
    Null
    Numeric
    Precision
    Real
    Select
    Set
    Smallint
    Table
    Text
    Time
    Timestamp
    Tinyint
    True
    Unsigned
    Update
    Values
    Varchar
    Where
}

const PUNCTUATION: &[(char, Token)] = &[
    ('?', Token::Parameter),
    ('(', Token::LeftParen),
    (')', Token::RightParen),
    ('*', Token::Asterisk),
    (',', Token::Comma),
    (';', Token::Semicolon),
    ('=', Token::Eq),
];

impl Token {
    fn segment_kind(&self) -> SegmentKind {
        match self {
            Self::IntegerLiteral(_) | Self::NumericLiteral(_) | Self::String(_) => {
                SegmentKind::Literal
            }
            Self::Comment(_) => SegmentKind::Comment,
            Self::Identifier(_) => SegmentKind::Identifier,
            Self::Parameter => SegmentKind::Parameter,
            Self::Whitespace(_) => SegmentKind::Whitespace,
            token if token.keyword_text().is_some() => SegmentKind::Keyword,
            _ => SegmentKind::Operator,
        }
    }
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(keyword) = self.keyword_text() {
            return f.write_str(&keyword.to_ascii_uppercase());
        }
        if let Some((ch, _)) = PUNCTUATION.iter().find(|(_, token)| token == self) {
            return write!(f, "{ch}");
        }
        match self {
            Self::Minus => f.write_str("-"),
            Self::IntegerLiteral(i) => write!(f, "{i}"),
            Self::NumericLiteral(n) => write!(f, "{n}"),
            Self::String(s) => f.write_str(&quote(s, '\'')),
            Self::Identifier(ident) => f.write_str(ident),
            Self::Comment(text) => write!(f, "--{text}"),
            Self::Whitespace(ch) => write!(f, "{ch:?}"),
            _ => f.write_str("EOF"),
        }
    }
}

/// Token stream with one token of lookahead. Whitespace and comments are
/// skipped.
pub(crate) struct Lexer<'a> {
    cursor: Cursor<'a>,
    lookahead: Option<Token>,
}

impl<'a> Lexer<'a> {
    pub fn new(sql: &'a str) -> Self {
        Self {
            cursor: Cursor::new(sql),
            lookahead: None,
        }
    }

    pub fn consume(&mut self) -> LexerResult<Token> {
        match self.lookahead.take() {
            Some(token) => Ok(token),
            None => self.significant(),
        }
    }

    pub fn peek(&mut self) -> LexerResult<&Token> {
        if self.lookahead.is_none() {
            self.lookahead = Some(self.significant()?);
        }
        Ok(self.lookahead.get_or_insert(Token::Eof))
    }

    /// Consumes the next token if it equals `expected`.
    pub fn consume_if_eq(&mut self, expected: Token) -> LexerResult<bool> {
        let matched = *self.peek()? == expected;
        if matched {
            self.lookahead = None;
        }
        Ok(matched)
    }

    fn significant(&mut self) -> LexerResult<Token> {
        loop {
            let token = self.cursor.token()?;
            if !matches!(token, Token::Comment(_) | Token::Whitespace(_)) {
                return Ok(token);
            }
        }
    }
}

/// Splits SQL into segments, including whitespace and comments.
///
/// After an error the iterator yields the error together with the input that
/// was not segmented, then stops.
pub struct Segmenter<'a> {
    cursor: Cursor<'a>,
    failed: bool,
}

impl<'a> Segmenter<'a> {
    pub fn new(sql: &'a str) -> Self {
        Self {
            cursor: Cursor::new(sql),
            failed: false,
        }
    }
}

impl<'a> Iterator for Segmenter<'a> {
    type Item = Result<Segment<'a>, (LexerError, &'a str)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let start = self.cursor.pos;
        match self.cursor.token() {
            Ok(Token::Eof) => None,
            Ok(token) => Some(Ok(Segment {
                slice: &self.cursor.sql[start..self.cursor.pos],
                kind: token.segment_kind(),
            })),
            Err(e) => {
                self.failed = true;
                Some(Err((e, &self.cursor.sql[start..])))
            }
        }
    }
}

pub struct Segment<'a> {
    slice: &'a str,
    kind: SegmentKind,
}

impl Segment<'_> {
    pub fn slice(&self) -> &str {
        self.slice
    }

    pub fn kind(&self) -> SegmentKind {
        self.kind
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SegmentKind {
    Literal,
    Keyword,
    Comment,
    Identifier,
    Parameter,
    Operator,
    Whitespace,
}

/// Byte position in the input.
struct Cursor<'a> {
    sql: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(sql: &'a str) -> Self {
        Self { sql, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.sql[self.pos..]
    }

    fn first(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.first()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn eat(&mut self, expected: char) -> bool {
        let matched = self.first() == Some(expected);
        if matched {
            self.pos += expected.len_utf8();
        }
        matched
    }

    /// Consumes the longest prefix whose characters satisfy `f`.
    fn eat_while(&mut self, f: impl Fn(char) -> bool) -> &'a str {
        let rest = self.rest();
        let len = rest.find(|ch| !f(ch)).unwrap_or(rest.len());
        self.pos += len;
        &rest[..len]
    }

    fn token(&mut self) -> LexerResult<Token> {
        let Some(ch) = self.first() else {
            return Ok(Token::Eof);
        };
        if ch.is_whitespace() || ch.is_control() {
            self.bump();
            return Ok(Token::Whitespace(ch));
        }
        if ch.is_ascii_digit() {
            return self.number();
        }
        if ch.is_alphabetic() {
            let word = self.eat_while(is_valid_identifier_char);
            return Ok(Token::keyword(word)
                .unwrap_or_else(|| Token::Identifier(word.to_ascii_lowercase())));
        }
        match ch {
            '\'' => self.quoted('\'').map(Token::String),
            '"' => self.quoted('"').map(Token::Identifier),
            '-' => {
                self.bump();
                if self.eat('-') {
                    Ok(Token::Comment(self.eat_while(|ch| ch != '\n').to_owned()))
                } else {
                    Ok(Token::Minus)
                }
            }
            _ => {
                let (_, token) = PUNCTUATION
                    .iter()
                    .find(|(symbol, _)| *symbol == ch)
                    .ok_or_else(|| LexerError::UnknownToken(ch.to_string()))?;
                self.bump();
                Ok(token.clone())
            }
        }
    }

    /// An integer, or a decimal with a fractional part.
    fn number(&mut self) -> LexerResult<Token> {
        let digits = self.eat_while(|ch| ch.is_ascii_digit() || ch == '.');
        if let Ok(i) = digits.parse() {
            return Ok(Token::IntegerLiteral(i));
        }
        digits
            .parse()
            .map(Token::NumericLiteral)
            .map_err(|_| LexerError::UnknownToken(digits.to_owned()))
    }

    /// Text between `quote` characters. A doubled quote stands for itself.
    fn quoted(&mut self, quote: char) -> LexerResult<String> {
        self.bump();
        let mut text = String::new();
        loop {
            text.push_str(self.eat_while(|ch| ch != quote));
            if !self.eat(quote) {
                return Err(LexerError::UnexpectedEof);
            }
            if !self.eat(quote) {
                return Ok(text);
            }
            text.push(quote);
        }
    }
}

pub fn is_valid_identifier_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '$' || ch == '_'
}

/// Quotes `s` with `quote`, doubling embedded quote characters.
pub fn quote(s: &str, quote: char) -> String {
    let doubled: String = [quote, quote].iter().collect();
    format!("{quote}{}{quote}", s.replace(quote, &doubled))
}
