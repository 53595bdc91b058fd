use std::fmt;

use scenescope_core::ScopeError;

use crate::ast::BinaryOp;

/// Width of a tab stop when measuring indentation.
const TAB_WIDTH: usize = 8;

/// Deepest bracket nesting accepted.
pub const MAX_BRACKET_DEPTH: usize = 200;

/// Deepest block indentation accepted.
pub const MAX_INDENT_DEPTH: usize = 100;

/// Keywords that may directly follow a number literal (`1if x else 2`).
const KEYWORDS_AFTER_NUMBER: [&str; 8] = ["and", "else", "for", "if", "in", "is", "not", "or"];

/// Source location for error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub line: usize,
    pub column: usize,
}

impl Span {
    pub fn new(start: usize, end: usize, line: usize, column: usize) -> Self {
        Self {
            start,
            end,
            line,
            column,
        }
    }
}

/// How a string literal's prefix changes its meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrKind {
    Plain,
    Bytes,
    Formatted,
}

/// A decoded string literal. Formatted strings keep their raw body.
#[derive(Debug, Clone, PartialEq)]
pub struct StringLiteral {
    pub value: String,
    pub kind: StrKind,
}

/// Token kinds of the Python source the extractor reads.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Keywords
    False,
    None,
    True,
    And,
    As,
    Assert,
    Async,
    Await,
    Break,
    Class,
    Continue,
    Def,
    Del,
    Elif,
    Else,
    Except,
    Finally,
    For,
    From,
    Global,
    If,
    Import,
    In,
    Is,
    Lambda,
    Nonlocal,
    Not,
    Or,
    Pass,
    Raise,
    Return,
    Try,
    While,
    With,
    Yield,

    // Literals
    Name(String),
    Number(String),
    Str(StringLiteral),

    // Delimiters
    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,
    LeftBrace,
    RightBrace,
    Comma,
    Colon,
    Semicolon,
    Dot,
    Ellipsis,
    At,
    Arrow,
    Equals,
    ColonEquals,
    AugAssign(BinaryOp),

    // Operators
    Plus,
    Minus,
    Star,
    DoubleStar,
    Slash,
    DoubleSlash,
    Percent,
    Tilde,
    Ampersand,
    Pipe,
    Caret,
    LeftShift,
    RightShift,
    Less,
    Greater,
    LessEqual,
    GreaterEqual,
    EqualEqual,
    NotEqual,

    // Layout
    Newline,
    Indent,
    Dedent,
    Eof,
}

impl TokenKind {
    fn keyword(ident: &str) -> Option<TokenKind> {
        let kind = match ident {
            "False" => TokenKind::False,
            "None" => TokenKind::None,
            "True" => TokenKind::True,
            "and" => TokenKind::And,
            "as" => TokenKind::As,
            "assert" => TokenKind::Assert,
            "async" => TokenKind::Async,
            "await" => TokenKind::Await,
            "break" => TokenKind::Break,
            "class" => TokenKind::Class,
            "continue" => TokenKind::Continue,
            "def" => TokenKind::Def,
            "del" => TokenKind::Del,
            "elif" => TokenKind::Elif,
            "else" => TokenKind::Else,
            "except" => TokenKind::Except,
            "finally" => TokenKind::Finally,
            "for" => TokenKind::For,
            "from" => TokenKind::From,
            "global" => TokenKind::Global,
            "if" => TokenKind::If,
            "import" => TokenKind::Import,
            "in" => TokenKind::In,
            "is" => TokenKind::Is,
            "lambda" => TokenKind::Lambda,
            "nonlocal" => TokenKind::Nonlocal,
            "not" => TokenKind::Not,
            "or" => TokenKind::Or,
            "pass" => TokenKind::Pass,
            "raise" => TokenKind::Raise,
            "return" => TokenKind::Return,
            "try" => TokenKind::Try,
            "while" => TokenKind::While,
            "with" => TokenKind::With,
            "yield" => TokenKind::Yield,
            _ => return None,
        };
        Some(kind)
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TokenKind::False => "False",
            TokenKind::None => "None",
            TokenKind::True => "True",
            TokenKind::And => "and",
            TokenKind::As => "as",
            TokenKind::Assert => "assert",
            TokenKind::Async => "async",
            TokenKind::Await => "await",
            TokenKind::Break => "break",
            TokenKind::Class => "class",
            TokenKind::Continue => "continue",
            TokenKind::Def => "def",
            TokenKind::Del => "del",
            TokenKind::Elif => "elif",
            TokenKind::Else => "else",
            TokenKind::Except => "except",
            TokenKind::Finally => "finally",
            TokenKind::For => "for",
            TokenKind::From => "from",
            TokenKind::Global => "global",
            TokenKind::If => "if",
            TokenKind::Import => "import",
            TokenKind::In => "in",
            TokenKind::Is => "is",
            TokenKind::Lambda => "lambda",
            TokenKind::Nonlocal => "nonlocal",
            TokenKind::Not => "not",
            TokenKind::Or => "or",
            TokenKind::Pass => "pass",
            TokenKind::Raise => "raise",
            TokenKind::Return => "return",
            TokenKind::Try => "try",
            TokenKind::While => "while",
            TokenKind::With => "with",
            TokenKind::Yield => "yield",
            TokenKind::Name(s) => return write!(f, "{}", s),
            TokenKind::Number(n) => return write!(f, "{}", n),
            TokenKind::Str(s) => return write!(f, "{:?}", s.value),
            TokenKind::LeftParen => "(",
            TokenKind::RightParen => ")",
            TokenKind::LeftBracket => "[",
            TokenKind::RightBracket => "]",
            TokenKind::LeftBrace => "{",
            TokenKind::RightBrace => "}",
            TokenKind::Comma => ",",
            TokenKind::Colon => ":",
            TokenKind::Semicolon => ";",
            TokenKind::Dot => ".",
            TokenKind::Ellipsis => "...",
            TokenKind::At => "@",
            TokenKind::Arrow => "->",
            TokenKind::Equals => "=",
            TokenKind::ColonEquals => ":=",
            TokenKind::AugAssign(op) => return write!(f, "{}=", op),
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::DoubleStar => "**",
            TokenKind::Slash => "/",
            TokenKind::DoubleSlash => "//",
            TokenKind::Percent => "%",
            TokenKind::Tilde => "~",
            TokenKind::Ampersand => "&",
            TokenKind::Pipe => "|",
            TokenKind::Caret => "^",
            TokenKind::LeftShift => "<<",
            TokenKind::RightShift => ">>",
            TokenKind::Less => "<",
            TokenKind::Greater => ">",
            TokenKind::LessEqual => "<=",
            TokenKind::GreaterEqual => ">=",
            TokenKind::EqualEqual => "==",
            TokenKind::NotEqual => "!=",
            TokenKind::Newline => "newline",
            TokenKind::Indent => "indent",
            TokenKind::Dedent => "dedent",
            TokenKind::Eof => "end of file",
        };
        f.write_str(text)
    }
}

/// A token with its kind and source location.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }
}

enum LineStart {
    Blank,
    Eof,
    Width(usize),
}

/// The Python tokenizer: turns source text into a flat token stream with
/// explicit `Newline`, `Indent` and `Dedent` tokens.
pub struct Lexer {
    source: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
    file: String,
    indents: Vec<usize>,
    /// Open brackets with the position they were opened at.
    brackets: Vec<(char, usize, usize)>,
    at_line_start: bool,
    line_has_tokens: bool,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Self {
            source: source.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
            file: "<input>".to_string(),
            indents: vec![0],
            brackets: Vec::new(),
            at_line_start: true,
            line_has_tokens: false,
        }
    }

    /// Name used for the file in error messages.
    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = file.into();
        self
    }

    /// Tokenize the entire source into a Vec of tokens ending in `Eof`.
    pub fn tokenize(&mut self) -> Result<Vec<Token>, ScopeError> {
        let mut tokens = Vec::new();
        loop {
            if self.at_line_start {
                self.at_line_start = false;
                match self.measure_line_start() {
                    LineStart::Blank => {
                        self.at_line_start = true;
                        continue;
                    }
                    LineStart::Eof => break,
                    LineStart::Width(width) => self.push_indentation(width, &mut tokens)?,
                }
            }

            self.skip_whitespace();
            let ch = match self.peek() {
                Some(ch) => ch,
                None => break,
            };

            match ch {
                '#' => self.skip_comment(),
                '\\' => {
                    let (line, column) = (self.line, self.column);
                    self.advance();
                    if !self.consume_line_break() {
                        return Err(self.error_at(
                            "unexpected character after line continuation character",
                            line,
                            column,
                        ));
                    }
                    if self.peek().is_none() {
                        return Err(self.error_at("unexpected EOF while parsing", line, column));
                    }
                }
                '\n' | '\r' => {
                    let span = self.here();
                    self.consume_line_break();
                    if self.brackets.is_empty() {
                        if self.line_has_tokens {
                            tokens.push(Token::new(TokenKind::Newline, span));
                        }
                        self.line_has_tokens = false;
                        self.at_line_start = true;
                    }
                }
                _ => {
                    let token = self.next_token()?;
                    self.line_has_tokens = true;
                    tokens.push(token);
                }
            }
        }

        if let Some(&(open, line, column)) = self.brackets.last() {
            return Err(self.error_at(format!("'{}' was never closed", open), line, column));
        }

        let end = self.here();
        if self.line_has_tokens {
            tokens.push(Token::new(TokenKind::Newline, end));
        }
        while self.indents.len() > 1 {
            self.indents.pop();
            tokens.push(Token::new(TokenKind::Dedent, end));
        }
        tokens.push(Token::new(TokenKind::Eof, end));
        Ok(tokens)
    }

    fn peek(&self) -> Option<char> {
        self.source.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.source.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.source.get(self.pos).copied()?;
        self.pos += 1;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn here(&self) -> Span {
        Span::new(self.pos, self.pos, self.line, self.column)
    }

    fn error_at(&self, message: impl Into<String>, line: usize, column: usize) -> ScopeError {
        ScopeError::parse(message, &self.file, line, column)
    }

    /// Consume `\n`, `\r\n` or a lone `\r`.
    fn consume_line_break(&mut self) -> bool {
        match self.peek() {
            Some('\n') => {
                self.advance();
                true
            }
            Some('\r') => {
                self.advance();
                if self.peek() == Some('\n') {
                    self.advance();
                } else {
                    self.line += 1;
                    self.column = 1;
                }
                true
            }
            _ => false,
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek() {
            if ch == ' ' || ch == '\t' || ch == '\x0c' {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn skip_comment(&mut self) {
        while let Some(ch) = self.peek() {
            if ch == '\n' || ch == '\r' {
                break;
            }
            self.advance();
        }
    }

    fn measure_line_start(&mut self) -> LineStart {
        let mut width = 0;
        while let Some(ch) = self.peek() {
            match ch {
                ' ' => width += 1,
                '\t' => width = (width / TAB_WIDTH + 1) * TAB_WIDTH,
                '\x0c' => width = 0,
                _ => break,
            }
            self.advance();
        }

        match self.peek() {
            None => LineStart::Eof,
            Some('#') => {
                self.skip_comment();
                if self.consume_line_break() {
                    LineStart::Blank
                } else {
                    LineStart::Eof
                }
            }
            Some('\n') | Some('\r') => {
                self.consume_line_break();
                LineStart::Blank
            }
            Some(_) => LineStart::Width(width),
        }
    }

    fn push_indentation(&mut self, width: usize, tokens: &mut Vec<Token>) -> Result<(), ScopeError> {
        let span = self.here();
        let current = self.indents.last().copied().unwrap_or(0);
        if width > current {
            if self.indents.len() >= MAX_INDENT_DEPTH {
                return Err(self.error_at("too many levels of indentation", span.line, span.column));
            }
            self.indents.push(width);
            tokens.push(Token::new(TokenKind::Indent, span));
            return Ok(());
        }
        while width < self.indents.last().copied().unwrap_or(0) {
            self.indents.pop();
            tokens.push(Token::new(TokenKind::Dedent, span));
        }
        if self.indents.last().copied().unwrap_or(0) != width {
            return Err(self.error_at(
                "unindent does not match any outer indentation level",
                span.line,
                span.column,
            ));
        }
        Ok(())
    }

    fn next_token(&mut self) -> Result<Token, ScopeError> {
        let start = self.pos;
        let line = self.line;
        let column = self.column;

        let ch = match self.peek() {
            Some(ch) => ch,
            None => {
                return Ok(Token::new(
                    TokenKind::Eof,
                    Span::new(start, start, line, column),
                ))
            }
        };

        let kind = match ch {
            '"' | '\'' => self.read_string("", line, column)?,
            c if c.is_ascii_digit() => self.read_number(line, column)?,
            '.' if self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) => {
                self.read_number(line, column)?
            }
            c if c.is_alphabetic() || c == '_' => {
                let ident = self.read_while(|c| c.is_alphanumeric() || c == '_');
                let is_prefix = matches!(
                    ident.to_ascii_lowercase().as_str(),
                    "r" | "u" | "b" | "br" | "rb" | "f" | "fr" | "rf"
                );
                if is_prefix && matches!(self.peek(), Some('"') | Some('\'')) {
                    self.read_string(&ident, line, column)?
                } else {
                    TokenKind::keyword(&ident).unwrap_or(TokenKind::Name(ident))
                }
            }
            '(' | '[' | '{' => {
                if self.brackets.len() >= MAX_BRACKET_DEPTH {
                    return Err(self.error_at("too many nested parentheses", line, column));
                }
                self.advance();
                self.brackets.push((ch, line, column));
                match ch {
                    '(' => TokenKind::LeftParen,
                    '[' => TokenKind::LeftBracket,
                    _ => TokenKind::LeftBrace,
                }
            }
            ')' | ']' | '}' => {
                self.advance();
                let expected = match ch {
                    ')' => '(',
                    ']' => '[',
                    _ => '{',
                };
                match self.brackets.pop() {
                    Some((open, _, _)) if open == expected => {}
                    Some((open, _, _)) => {
                        return Err(self.error_at(
                            format!(
                                "closing parenthesis '{}' does not match opening parenthesis '{}'",
                                ch, open
                            ),
                            line,
                            column,
                        ))
                    }
                    None => {
                        return Err(self.error_at(format!("unmatched '{}'", ch), line, column))
                    }
                }
                match ch {
                    ')' => TokenKind::RightParen,
                    ']' => TokenKind::RightBracket,
                    _ => TokenKind::RightBrace,
                }
            }
            _ => self.read_operator(line, column)?,
        };

        Ok(Token::new(kind, Span::new(start, self.pos, line, column)))
    }

    fn read_operator(&mut self, line: usize, column: usize) -> Result<TokenKind, ScopeError> {
        let ahead: String = (0..3).filter_map(|i| self.peek_at(i)).collect();
        for len in (1..=ahead.chars().count()).rev() {
            let text: String = ahead.chars().take(len).collect();
            if let Some(kind) = Self::operator(&text) {
                for _ in 0..len {
                    self.advance();
                }
                return Ok(kind);
            }
        }

        let ch = self.peek().unwrap_or(' ');
        Err(self.error_at(format!("unexpected character: '{}'", ch), line, column))
    }

    fn operator(text: &str) -> Option<TokenKind> {
        let kind = match text {
            "**=" => TokenKind::AugAssign(BinaryOp::Pow),
            "//=" => TokenKind::AugAssign(BinaryOp::FloorDiv),
            ">>=" => TokenKind::AugAssign(BinaryOp::RShift),
            "<<=" => TokenKind::AugAssign(BinaryOp::LShift),
            "..." => TokenKind::Ellipsis,
            "+=" => TokenKind::AugAssign(BinaryOp::Add),
            "-=" => TokenKind::AugAssign(BinaryOp::Sub),
            "*=" => TokenKind::AugAssign(BinaryOp::Mult),
            "/=" => TokenKind::AugAssign(BinaryOp::Div),
            "%=" => TokenKind::AugAssign(BinaryOp::Mod),
            "@=" => TokenKind::AugAssign(BinaryOp::MatMult),
            "&=" => TokenKind::AugAssign(BinaryOp::BitAnd),
            "|=" => TokenKind::AugAssign(BinaryOp::BitOr),
            "^=" => TokenKind::AugAssign(BinaryOp::BitXor),
            "->" => TokenKind::Arrow,
            ":=" => TokenKind::ColonEquals,
            "**" => TokenKind::DoubleStar,
            "//" => TokenKind::DoubleSlash,
            "<<" => TokenKind::LeftShift,
            ">>" => TokenKind::RightShift,
            "<=" => TokenKind::LessEqual,
            ">=" => TokenKind::GreaterEqual,
            "==" => TokenKind::EqualEqual,
            "!=" => TokenKind::NotEqual,
            "+" => TokenKind::Plus,
            "-" => TokenKind::Minus,
            "*" => TokenKind::Star,
            "/" => TokenKind::Slash,
            "%" => TokenKind::Percent,
            "~" => TokenKind::Tilde,
            "&" => TokenKind::Ampersand,
            "|" => TokenKind::Pipe,
            "^" => TokenKind::Caret,
            "<" => TokenKind::Less,
            ">" => TokenKind::Greater,
            "=" => TokenKind::Equals,
            "," => TokenKind::Comma,
            ":" => TokenKind::Colon,
            ";" => TokenKind::Semicolon,
            "." => TokenKind::Dot,
            "@" => TokenKind::At,
            _ => return None,
        };
        Some(kind)
    }

    fn read_number(&mut self, line: usize, column: usize) -> Result<TokenKind, ScopeError> {
        let mut text = String::new();

        let radix_marker = if self.peek() == Some('0') {
            self.peek_at(1).filter(|c| matches!(c, 'x' | 'X' | 'o' | 'O' | 'b' | 'B'))
        } else {
            None
        };

        if let Some(marker) = radix_marker {
            text.push('0');
            text.push(marker);
            self.advance();
            self.advance();
            let digits = self.read_while(|c| c.is_ascii_hexdigit() || c == '_');
            let body = digits.strip_prefix('_').unwrap_or(&digits);
            let valid = !body.is_empty()
                && well_grouped(body)
                && body.chars().all(|c| match marker {
                    'x' | 'X' => c.is_ascii_hexdigit() || c == '_',
                    'o' | 'O' => ('0'..='7').contains(&c) || c == '_',
                    _ => c == '0' || c == '1' || c == '_',
                });
            text.push_str(&digits);
            if !valid {
                return Err(self.invalid_number(&text, line, column));
            }
        } else {
            let integer = self.read_while(|c| c.is_ascii_digit() || c == '_');
            text.push_str(&integer);
            if !well_grouped(&integer) {
                return Err(self.invalid_number(&text, line, column));
            }
            let mut is_integer = true;

            if self.peek() == Some('.') {
                is_integer = false;
                self.advance();
                text.push('.');
                let fraction = self.read_while(|c| c.is_ascii_digit() || c == '_');
                text.push_str(&fraction);
                if !well_grouped(&fraction) {
                    return Err(self.invalid_number(&text, line, column));
                }
            }

            // `1else` is `1 else`; only a digit (after an optional sign) makes an exponent.
            if matches!(self.peek(), Some('e') | Some('E')) {
                let digit_at = if matches!(self.peek_at(1), Some('+') | Some('-')) { 2 } else { 1 };
                if self.peek_at(digit_at).is_some_and(|c| c.is_ascii_digit()) {
                    is_integer = false;
                    for _ in 0..digit_at {
                        if let Some(c) = self.advance() {
                            text.push(c);
                        }
                    }
                    let exponent = self.read_while(|c| c.is_ascii_digit() || c == '_');
                    text.push_str(&exponent);
                    if !well_grouped(&exponent) {
                        return Err(self.invalid_number(&text, line, column));
                    }
                }
            }

            if matches!(self.peek(), Some('j') | Some('J')) {
                is_integer = false;
                if let Some(c) = self.advance() {
                    text.push(c);
                }
            }

            if is_integer
                && integer.starts_with('0')
                && integer.chars().any(|c| c.is_ascii_digit() && c != '0')
            {
                return Err(self.error_at(
                    "leading zeros in decimal integer literals are not permitted",
                    line,
                    column,
                ));
            }
        }

        if self.peek().is_some_and(|c| c.is_alphanumeric() || c == '_') {
            let word: String = self.source[self.pos..]
                .iter()
                .take_while(|c| c.is_alphanumeric() || **c == '_')
                .collect();
            if !KEYWORDS_AFTER_NUMBER.contains(&word.as_str()) {
                text.push_str(&word);
                return Err(self.invalid_number(&text, line, column));
            }
        }
        Ok(TokenKind::Number(text))
    }

    fn invalid_number(&self, text: &str, line: usize, column: usize) -> ScopeError {
        self.error_at(format!("invalid number literal: {}", text), line, column)
    }

    fn read_string(
        &mut self,
        prefix: &str,
        line: usize,
        column: usize,
    ) -> Result<TokenKind, ScopeError> {
        let prefix = prefix.to_ascii_lowercase();
        let raw = prefix.contains('r');
        let kind = if prefix.contains('b') {
            StrKind::Bytes
        } else if prefix.contains('f') {
            StrKind::Formatted
        } else {
            StrKind::Plain
        };

        let quote = self.advance().unwrap_or('"');
        let triple = self.peek() == Some(quote) && self.peek_at(1) == Some(quote);
        if triple {
            self.advance();
            self.advance();
        }

        let mut value = String::new();
        loop {
            let ch = match self.peek() {
                Some(ch) => ch,
                None => {
                    let what = if triple {
                        "unterminated triple-quoted string literal"
                    } else {
                        "unterminated string literal"
                    };
                    return Err(self.error_at(what, line, column));
                }
            };

            if ch == quote {
                if !triple {
                    self.advance();
                    break;
                }
                if self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote) {
                    self.advance();
                    self.advance();
                    self.advance();
                    break;
                }
                self.advance();
                value.push(ch);
                continue;
            }

            if (ch == '\n' || ch == '\r') && !triple {
                return Err(self.error_at("unterminated string literal", line, column));
            }

            if kind == StrKind::Bytes && !ch.is_ascii() {
                return Err(self.non_ascii_bytes(line, column));
            }

            if ch == '\\' {
                self.advance();
                if raw || kind == StrKind::Formatted {
                    value.push('\\');
                    if let Some(next) = self.advance() {
                        if kind == StrKind::Bytes && !next.is_ascii() {
                            return Err(self.non_ascii_bytes(line, column));
                        }
                        value.push(next);
                    }
                } else {
                    self.read_escape(&mut value, kind, line, column)?;
                }
                continue;
            }

            self.advance();
            value.push(ch);
        }

        if kind == StrKind::Formatted {
            check_replacement_fields(&value).map_err(|message| self.error_at(message, line, column))?;
        }
        Ok(TokenKind::Str(StringLiteral { value, kind }))
    }

    fn non_ascii_bytes(&self, line: usize, column: usize) -> ScopeError {
        self.error_at("bytes can only contain ASCII literal characters", line, column)
    }

    /// Decode one escape sequence; the backslash is already consumed.
    fn read_escape(
        &mut self,
        value: &mut String,
        kind: StrKind,
        line: usize,
        column: usize,
    ) -> Result<(), ScopeError> {
        let ch = match self.peek() {
            Some(ch) => ch,
            None => return Err(self.error_at("unterminated string literal", line, column)),
        };

        match ch {
            '\n' | '\r' => {
                self.consume_line_break();
            }
            '\\' | '\'' | '"' => {
                self.advance();
                value.push(ch);
            }
            'a' | 'b' | 'f' | 'n' | 'r' | 't' | 'v' => {
                self.advance();
                value.push(match ch {
                    'a' => '\x07',
                    'b' => '\x08',
                    'f' => '\x0c',
                    'n' => '\n',
                    'r' => '\r',
                    't' => '\t',
                    _ => '\x0b',
                });
            }
            '0'..='7' => {
                let mut code = 0u32;
                let mut count = 0;
                while count < 3 {
                    match self.peek().and_then(|c| c.to_digit(8)) {
                        Some(d) => {
                            code = code * 8 + d;
                            self.advance();
                            count += 1;
                        }
                        None => break,
                    }
                }
                value.push(char::from_u32(code).unwrap_or('\u{fffd}'));
            }
            'x' => {
                self.advance();
                let code = self.read_hex_escape(2, line, column)?;
                value.push(code);
            }
            'u' | 'U' if kind != StrKind::Bytes => {
                self.advance();
                let digits = if ch == 'u' { 4 } else { 8 };
                let code = self.read_hex_escape(digits, line, column)?;
                value.push(code);
            }
            'N' if kind != StrKind::Bytes && self.peek_at(1) == Some('{') => {
                // Named escapes are kept verbatim; no name table is bundled.
                value.push('\\');
                while let Some(c) = self.advance() {
                    value.push(c);
                    if c == '}' {
                        break;
                    }
                    if c == '\n' {
                        return Err(self.error_at("malformed \\N character escape", line, column));
                    }
                }
            }
            _ => {
                if kind == StrKind::Bytes && !ch.is_ascii() {
                    return Err(self.non_ascii_bytes(line, column));
                }
                self.advance();
                value.push('\\');
                value.push(ch);
            }
        }
        Ok(())
    }

    fn read_hex_escape(
        &mut self,
        digits: usize,
        line: usize,
        column: usize,
    ) -> Result<char, ScopeError> {
        let mut code = 0u32;
        for _ in 0..digits {
            match self.peek().and_then(|c| c.to_digit(16)) {
                Some(d) => {
                    code = code * 16 + d;
                    self.advance();
                }
                None => {
                    return Err(self.error_at("truncated hex escape in string literal", line, column))
                }
            }
        }
        // Lone surrogates are legal in source but have no `char`.
        if (0xD800..=0xDFFF).contains(&code) {
            return Ok(char::REPLACEMENT_CHARACTER);
        }
        char::from_u32(code)
            .ok_or_else(|| self.error_at("illegal Unicode character in string literal", line, column))
    }

    fn read_while(&mut self, predicate: impl Fn(char) -> bool) -> String {
        let mut result = String::new();
        while let Some(ch) = self.peek() {
            if predicate(ch) {
                result.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        result
    }
}

/// Underscores only between digits: no leading, trailing or doubled `_`.
fn well_grouped(digits: &str) -> bool {
    !digits.starts_with('_') && !digits.ends_with('_') && !digits.contains("__")
}

/// Deepest `{...}` nesting inside a format spec.
const MAX_FSTRING_NESTING: usize = 2;

/// Check the replacement fields of a raw f-string body: every `{` closes,
/// no lone `}`, no empty expression.
fn check_replacement_fields(body: &str) -> Result<(), &'static str> {
    let chars: Vec<char> = body.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '{' if chars.get(i + 1) == Some(&'{') => i += 2,
            '}' if chars.get(i + 1) == Some(&'}') => i += 2,
            '{' => i = skip_replacement_field(&chars, i + 1, 0)?,
            '}' => return Err("f-string: single '}' is not allowed"),
            _ => i += 1,
        }
    }
    Ok(())
}

/// Skip a replacement field whose `{` precedes `start`; returns the index
/// just past its closing `}`.
fn skip_replacement_field(chars: &[char], start: usize, nesting: usize) -> Result<usize, &'static str> {
    if nesting > MAX_FSTRING_NESTING {
        return Err("f-string: expressions nested too deeply");
    }
    let mut i = start;
    let mut depth = 0usize;
    let mut has_expression = false;
    let mut quote = None;
    while let Some(&c) = chars.get(i) {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            i += 1;
            continue;
        }
        match c {
            '}' if depth == 0 => {
                return if has_expression {
                    Ok(i + 1)
                } else {
                    Err("f-string: empty expression not allowed")
                };
            }
            '!' | ':' if depth == 0 && !(c == '!' && chars.get(i + 1) == Some(&'=')) => {
                if !has_expression {
                    return Err("f-string: empty expression not allowed");
                }
                return skip_format_spec(chars, i + 1, nesting);
            }
            '\'' | '"' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or("f-string: unmatched closing bracket")?;
            }
            _ => {}
        }
        if !c.is_whitespace() {
            has_expression = true;
        }
        i += 1;
    }
    Err("f-string: expecting '}'")
}

/// Skip a conversion and format spec up to the field's closing `}`.
fn skip_format_spec(chars: &[char], start: usize, nesting: usize) -> Result<usize, &'static str> {
    let mut i = start;
    while let Some(&c) = chars.get(i) {
        match c {
            '{' => i = skip_replacement_field(chars, i + 1, nesting + 1)?,
            '}' => return Ok(i + 1),
            _ => i += 1,
        }
    }
    Err("f-string: expecting '}'")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokenize(src: &str) -> Vec<TokenKind> {
        let mut lexer = Lexer::new(src);
        let tokens = lexer.tokenize().unwrap();
        tokens.into_iter().map(|t| t.kind).collect()
    }

    fn name(s: &str) -> TokenKind {
        TokenKind::Name(s.into())
    }

    fn plain(s: &str) -> TokenKind {
        TokenKind::Str(StringLiteral {
            value: s.into(),
            kind: StrKind::Plain,
        })
    }

    #[test]
    fn test_keywords_and_names() {
        let tokens = tokenize("class Intro(Scene): pass");
        assert_eq!(
            tokens,
            vec![
                TokenKind::Class,
                name("Intro"),
                TokenKind::LeftParen,
                name("Scene"),
                TokenKind::RightParen,
                TokenKind::Colon,
                TokenKind::Pass,
                TokenKind::Newline,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_indent_and_dedent() {
        let src = "if x:\n    y = 1\n    if z:\n        w\nv\n";
        let tokens = tokenize(src);
        let indents = tokens.iter().filter(|t| **t == TokenKind::Indent).count();
        let dedents = tokens.iter().filter(|t| **t == TokenKind::Dedent).count();
        assert_eq!(indents, 2);
        assert_eq!(dedents, 2);
        // Both dedents come right before `v`.
        let v = tokens.iter().position(|t| *t == name("v")).unwrap();
        assert_eq!(tokens[v - 1], TokenKind::Dedent);
        assert_eq!(tokens[v - 2], TokenKind::Dedent);
    }

    #[test]
    fn test_dedents_flushed_at_eof() {
        let tokens = tokenize("def f():\n    return 1");
        let n = tokens.len();
        assert_eq!(tokens[n - 3], TokenKind::Newline);
        assert_eq!(tokens[n - 2], TokenKind::Dedent);
        assert_eq!(tokens[n - 1], TokenKind::Eof);
    }

    #[test]
    fn test_blank_and_comment_lines_ignored() {
        let src = "a = 1\n\n    # indented comment\n\nb = 2\n";
        let tokens = tokenize(src);
        assert!(!tokens.contains(&TokenKind::Indent));
        let newlines = tokens.iter().filter(|t| **t == TokenKind::Newline).count();
        assert_eq!(newlines, 2);
    }

    #[test]
    fn test_brackets_join_lines() {
        let src = "x = Text(\n    \"hi\",\n    font_size=24,\n)\n";
        let tokens = tokenize(src);
        let newlines = tokens.iter().filter(|t| **t == TokenKind::Newline).count();
        assert_eq!(newlines, 1);
        assert!(!tokens.contains(&TokenKind::Indent));
    }

    #[test]
    fn test_backslash_continuation() {
        let tokens = tokenize("x = 1 + \\\n    2\n");
        assert_eq!(tokens.iter().filter(|t| **t == TokenKind::Newline).count(), 1);
        assert!(tokens.contains(&TokenKind::Number("2".into())));
    }

    #[test]
    fn test_inconsistent_dedent_is_error() {
        let mut lexer = Lexer::new("if x:\n        a\n    b\n");
        assert!(lexer.tokenize().is_err());
    }

    #[test]
    fn test_string_literals() {
        let tokens = tokenize(r#"'single' "double" """tri"ple""" r'\d' b'x' f'{a}'"#);
        assert_eq!(tokens[0], plain("single"));
        assert_eq!(tokens[1], plain("double"));
        assert_eq!(tokens[2], plain("tri\"ple"));
        assert_eq!(tokens[3], TokenKind::Str(StringLiteral { value: "\\d".into(), kind: StrKind::Plain }));
        assert_eq!(tokens[4], TokenKind::Str(StringLiteral { value: "x".into(), kind: StrKind::Bytes }));
        assert_eq!(tokens[5], TokenKind::Str(StringLiteral { value: "{a}".into(), kind: StrKind::Formatted }));
    }

    #[test]
    fn test_escape_sequences() {
        let tokens = tokenize(r#""a\nb\t\x41\u00e9\q""#);
        assert_eq!(tokens[0], plain("a\nb\tAé\\q"));
    }

    #[test]
    fn test_multiline_triple_string_keeps_lines() {
        let tokens = tokenize("s = \"\"\"one\ntwo\"\"\"\n");
        assert_eq!(tokens[2], plain("one\ntwo"));
        assert_eq!(tokens[3], TokenKind::Newline);
    }

    #[test]
    fn test_numbers() {
        let tokens = tokenize("42 3.14 .5 1e-3 0xFF 1_000 2j");
        let numbers: Vec<_> = tokens
            .iter()
            .filter_map(|t| match t {
                TokenKind::Number(n) => Some(n.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(numbers, ["42", "3.14", ".5", "1e-3", "0xFF", "1_000", "2j"]);
    }

    #[test]
    fn test_operators_longest_match() {
        let tokens = tokenize("a **= b // c -> d := e != f ... ");
        assert_eq!(tokens[1], TokenKind::AugAssign(BinaryOp::Pow));
        assert_eq!(tokens[3], TokenKind::DoubleSlash);
        assert_eq!(tokens[5], TokenKind::Arrow);
        assert_eq!(tokens[7], TokenKind::ColonEquals);
        assert_eq!(tokens[9], TokenKind::NotEqual);
        assert_eq!(tokens[11], TokenKind::Ellipsis);
    }

    #[test]
    fn test_unterminated_string() {
        let mut lexer = Lexer::new("\"hello\nworld\"");
        assert!(lexer.tokenize().is_err());
    }

    #[test]
    fn test_unbalanced_brackets() {
        assert!(Lexer::new("f(a\n").tokenize().is_err());
        assert!(Lexer::new("f(a]").tokenize().is_err());
        assert!(Lexer::new("a)").tokenize().is_err());
    }

    #[test]
    fn test_invalid_char() {
        let mut lexer = Lexer::new("a = $b").with_file("scene.py");
        let err = lexer.tokenize().unwrap_err();
        assert_eq!(
            err.to_string(),
            "parse error: unexpected character: '$' at scene.py:1:5"
        );
    }

    fn lex_err(src: &str) -> String {
        Lexer::new(src).tokenize().unwrap_err().to_string()
    }

    #[test]
    fn test_number_literal_validation() {
        assert!(lex_err("x = 09\n").contains("leading zeros"));
        assert!(lex_err("x = 0_7\n").contains("leading zeros"));
        assert!(lex_err("x = 1__0\n").contains("invalid number literal"));
        assert!(lex_err("x = 1_\n").contains("invalid number literal"));
        assert!(lex_err("x = 1._5\n").contains("invalid number literal"));
        assert!(lex_err("x = 0x__1\n").contains("invalid number literal"));
        assert!(lex_err("x = 1abc\n").contains("invalid number literal"));

        let tokens = tokenize("00 0_0 09.5 09j 1_0.0_1e1_0 0x_ff 0b1_0");
        let numbers = tokens.iter().filter(|t| matches!(t, TokenKind::Number(_))).count();
        assert_eq!(numbers, 7);
    }

    #[test]
    fn test_keyword_directly_after_number() {
        let tokens = tokenize("1if 1else 2");
        assert_eq!(
            tokens[..5],
            [
                TokenKind::Number("1".into()),
                TokenKind::If,
                TokenKind::Number("1".into()),
                TokenKind::Else,
                TokenKind::Number("2".into()),
            ]
        );
    }

    #[test]
    fn test_fstring_replacement_fields() {
        for ok in [
            "f'{a}'",
            "f'{{literal}}'",
            "f'{x!r:>{width}}'",
            "f\"{d['k']}\"",
            "f'{a != b}'",
            "f'{ {1: 2}[1] }'",
        ] {
            assert!(Lexer::new(ok).tokenize().is_ok(), "{ok}");
        }
        assert!(lex_err("f'{'").contains("expecting '}'"));
        assert!(lex_err("f'}'").contains("single '}'"));
        assert!(lex_err("f'{}'").contains("empty expression"));
        assert!(lex_err("f'{a)}'").contains("f-string"));
        assert!(lex_err("f'{a:{b:{c:{d}}}}'").contains("nested too deeply"));
    }

    #[test]
    fn test_bytes_must_be_ascii() {
        assert!(lex_err("b'\u{e9}'").contains("ASCII"));
        assert!(lex_err("rb'\\\u{e9}'").contains("ASCII"));
        let tokens = tokenize(r"b'\xff'");
        assert_eq!(
            tokens[0],
            TokenKind::Str(StringLiteral { value: "\u{ff}".into(), kind: StrKind::Bytes })
        );
    }

    #[test]
    fn test_lone_surrogate_escape() {
        let tokens = tokenize(r"'\ud800'");
        assert_eq!(tokens[0], plain("\u{fffd}"));
        assert!(lex_err(r"'\U00110000'").contains("illegal Unicode"));
    }

    #[test]
    fn test_continuation_at_end_of_file() {
        assert!(lex_err("\\\n").contains("unexpected EOF"));
        assert!(lex_err("x = 1 + \\\n").contains("unexpected EOF"));
    }

    #[test]
    fn test_bracket_depth_limit() {
        let ok = format!("{}1{}", "(".repeat(MAX_BRACKET_DEPTH), ")".repeat(MAX_BRACKET_DEPTH));
        assert!(Lexer::new(&ok).tokenize().is_ok());

        let deep = MAX_BRACKET_DEPTH + 1;
        let src = format!("{}1{}", "[".repeat(deep), "]".repeat(deep));
        assert!(lex_err(&src).contains("too many nested parentheses"));
    }

    #[test]
    fn test_indentation_depth_limit() {
        let nested = |levels: usize| -> String {
            (0..levels)
                .map(|i| format!("{}if x:\n", " ".repeat(i)))
                .chain(std::iter::once(format!("{}pass\n", " ".repeat(levels))))
                .collect()
        };
        assert!(Lexer::new(&nested(MAX_INDENT_DEPTH - 1)).tokenize().is_ok());
        assert!(lex_err(&nested(MAX_INDENT_DEPTH)).contains("too many levels of indentation"));
    }
}
