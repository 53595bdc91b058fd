//! Python parser: tokens → AST.

use crate::ast::*;
use crate::lexer::{Span, StrKind, Token, TokenKind};
use scenescope_core::ScopeError;

type ParseResult<T> = Result<T, ScopeError>;

/// Deepest expression nesting, and longest chain of binary operators or
/// trailers (`.attr`, `(...)`, `[...]`), the parser accepts.
pub const MAX_NESTING: usize = 1000;

/// Recursive-descent parser for the statement and expression grammar used
/// by generated animation scripts.
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    file: String,
    depth: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>, file: impl Into<String>) -> Self {
        Self {
            tokens,
            pos: 0,
            file: file.into(),
            depth: 0,
        }
    }

    /// Parse the token stream into a Module.
    pub fn parse(&mut self) -> ParseResult<Module> {
        let mut body = Vec::new();
        loop {
            self.skip_newlines();
            if self.check(&TokenKind::Eof) {
                break;
            }
            body.extend(self.parse_statement()?);
        }
        Ok(Module { body })
    }

    // --- Token helpers ---

    fn peek(&self) -> &TokenKind {
        self.peek_nth(0)
    }

    fn peek_nth(&self, n: usize) -> &TokenKind {
        self.tokens
            .get(self.pos + n)
            .map(|t| &t.kind)
            .unwrap_or(&TokenKind::Eof)
    }

    fn current_span(&self) -> Span {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|t| t.span)
            .unwrap_or_default()
    }

    fn advance(&mut self) -> TokenKind {
        let kind = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        kind
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.peek() == kind
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &TokenKind) -> ParseResult<Span> {
        if self.check(expected) {
            let span = self.current_span();
            self.advance();
            Ok(span)
        } else {
            Err(self.error(format!("expected {}, got {}", expected, self.peek())))
        }
    }

    fn expect_name(&mut self) -> ParseResult<String> {
        match self.peek().clone() {
            TokenKind::Name(name) => {
                self.advance();
                Ok(name)
            }
            other => Err(self.error(format!("expected identifier, got {}", other))),
        }
    }

    fn error(&self, message: impl Into<String>) -> ScopeError {
        let span = self.current_span();
        self.error_at(message, span)
    }

    fn error_at(&self, message: impl Into<String>, span: Span) -> ScopeError {
        ScopeError::parse(message, &self.file, span.line, span.column)
    }

    /// Run `parse` one nesting level deeper.
    fn nested<T>(&mut self, parse: impl FnOnce(&mut Self) -> ParseResult<T>) -> ParseResult<T> {
        if self.depth >= MAX_NESTING {
            return Err(self.error("too many nested expressions"));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn check_chain(&self, links: usize) -> ParseResult<()> {
        if links >= MAX_NESTING {
            return Err(self.error("expression chain too long"));
        }
        Ok(())
    }

    fn skip_newlines(&mut self) {
        while self.check(&TokenKind::Newline) {
            self.advance();
        }
    }

    fn at_comprehension(&self) -> bool {
        self.check(&TokenKind::For)
            || (self.check(&TokenKind::Async) && self.peek_nth(1) == &TokenKind::For)
    }

    /// Whether the current token can begin an expression.
    fn starts_expression(&self) -> bool {
        matches!(
            self.peek(),
            TokenKind::Name(_)
                | TokenKind::Number(_)
                | TokenKind::Str(_)
                | TokenKind::LeftParen
                | TokenKind::LeftBracket
                | TokenKind::LeftBrace
                | TokenKind::Minus
                | TokenKind::Plus
                | TokenKind::Tilde
                | TokenKind::Not
                | TokenKind::Lambda
                | TokenKind::Await
                | TokenKind::Star
                | TokenKind::Ellipsis
                | TokenKind::None
                | TokenKind::True
                | TokenKind::False
        )
    }

    // --- Statements ---

    fn parse_statement(&mut self) -> ParseResult<Vec<Stmt>> {
        match self.peek().clone() {
            TokenKind::At
            | TokenKind::Class
            | TokenKind::Def
            | TokenKind::Async
            | TokenKind::If
            | TokenKind::While
            | TokenKind::For
            | TokenKind::Try
            | TokenKind::With => Ok(vec![self.parse_compound_statement()?]),
            TokenKind::Indent => Err(self.error("unexpected indent")),
            TokenKind::Name(name) if name == "match" => match self.try_parse_match()? {
                Some(stmt) => Ok(vec![stmt]),
                None => self.parse_simple_statements(),
            },
            _ => self.parse_simple_statements(),
        }
    }

    /// `simple_stmt (';' simple_stmt)* [';'] NEWLINE`
    fn parse_simple_statements(&mut self) -> ParseResult<Vec<Stmt>> {
        let mut stmts = vec![self.parse_simple_statement()?];
        while self.eat(&TokenKind::Semicolon) {
            if matches!(self.peek(), TokenKind::Newline | TokenKind::Eof) {
                break;
            }
            stmts.push(self.parse_simple_statement()?);
        }
        match self.peek().clone() {
            TokenKind::Newline => {
                self.advance();
                Ok(stmts)
            }
            TokenKind::Eof => Ok(stmts),
            other => Err(self.error(format!("invalid syntax: unexpected {}", other))),
        }
    }

    /// `':' (simple_stmts | NEWLINE INDENT statement+ DEDENT)`
    fn parse_block(&mut self) -> ParseResult<Vec<Stmt>> {
        self.expect(&TokenKind::Colon)?;
        if !self.eat(&TokenKind::Newline) {
            return self.parse_simple_statements();
        }
        if !self.eat(&TokenKind::Indent) {
            return Err(self.error("expected an indented block"));
        }
        let mut body = Vec::new();
        while !self.check(&TokenKind::Dedent) && !self.check(&TokenKind::Eof) {
            body.extend(self.parse_statement()?);
        }
        self.expect(&TokenKind::Dedent)?;
        Ok(body)
    }

    fn parse_compound_statement(&mut self) -> ParseResult<Stmt> {
        let span = self.current_span();
        let kind = match self.peek().clone() {
            TokenKind::At => return self.parse_decorated(),
            TokenKind::Class => self.parse_class(Vec::new())?,
            TokenKind::Def => self.parse_function(Vec::new(), false)?,
            TokenKind::Async => {
                self.advance();
                match self.peek().clone() {
                    TokenKind::Def => self.parse_function(Vec::new(), true)?,
                    TokenKind::For => self.parse_for(true)?,
                    TokenKind::With => self.parse_with(true)?,
                    other => {
                        return Err(self.error(format!(
                            "expected def, for or with after async, got {}",
                            other
                        )))
                    }
                }
            }
            TokenKind::If => self.parse_if()?,
            TokenKind::While => self.parse_while()?,
            TokenKind::For => self.parse_for(false)?,
            TokenKind::Try => self.parse_try()?,
            TokenKind::With => self.parse_with(false)?,
            other => return Err(self.error(format!("invalid syntax: unexpected {}", other))),
        };
        Ok(Stmt { kind, span })
    }

    /// `('@' named_expression NEWLINE)+ (class_def | function_def)`
    fn parse_decorated(&mut self) -> ParseResult<Stmt> {
        let span = self.current_span();
        let mut decorators = Vec::new();
        while self.eat(&TokenKind::At) {
            decorators.push(self.parse_named_expression()?);
            self.expect(&TokenKind::Newline)?;
        }
        let kind = match self.peek().clone() {
            TokenKind::Class => self.parse_class(decorators)?,
            TokenKind::Def => self.parse_function(decorators, false)?,
            TokenKind::Async if self.peek_nth(1) == &TokenKind::Def => {
                self.advance();
                self.parse_function(decorators, true)?
            }
            other => {
                return Err(self.error(format!(
                    "expected class or function after decorator, got {}",
                    other
                )))
            }
        };
        Ok(Stmt { kind, span })
    }

    /// `class NAME ['(' arguments ')'] block`
    fn parse_class(&mut self, decorators: Vec<Expr>) -> ParseResult<StmtKind> {
        self.expect(&TokenKind::Class)?;
        let name = self.expect_name()?;
        let (bases, keywords) = if self.eat(&TokenKind::LeftParen) {
            self.parse_call_arguments()?
        } else {
            (Vec::new(), Vec::new())
        };
        let body = self.parse_block()?;
        Ok(StmtKind::ClassDef {
            name,
            bases,
            keywords,
            body,
            decorators,
        })
    }

    /// `def NAME '(' parameters ')' ['->' expression] block`
    fn parse_function(&mut self, decorators: Vec<Expr>, is_async: bool) -> ParseResult<StmtKind> {
        self.expect(&TokenKind::Def)?;
        let name = self.expect_name()?;
        self.expect(&TokenKind::LeftParen)?;
        let params = self.parse_parameters(&TokenKind::RightParen, true)?;
        self.expect(&TokenKind::RightParen)?;
        let returns = if self.eat(&TokenKind::Arrow) {
            Some(self.parse_test()?)
        } else {
            None
        };
        let body = self.parse_block()?;
        Ok(StmtKind::FunctionDef {
            name,
            params,
            returns,
            body,
            decorators,
            is_async,
        })
    }

    /// Parameter list up to (not including) `closer`.
    fn parse_parameters(
        &mut self,
        closer: &TokenKind,
        annotations: bool,
    ) -> ParseResult<Vec<Parameter>> {
        let mut params: Vec<Parameter> = Vec::new();
        let mut kind = ParameterKind::Regular;
        let mut seen_slash = false;
        let mut seen_default = false;
        let mut bare_star = false;

        while !self.check(closer) {
            let span = self.current_span();
            if params.last().is_some_and(|p| p.kind == ParameterKind::VarKeyword) {
                return Err(self.error("arguments cannot follow var-keyword argument"));
            }
            if self.eat(&TokenKind::Slash) {
                if seen_slash {
                    return Err(self.error_at("/ may appear only once", span));
                }
                if kind == ParameterKind::KeywordOnly {
                    return Err(self.error_at("/ must be ahead of *", span));
                }
                if params.is_empty() {
                    return Err(self.error_at("at least one argument must precede /", span));
                }
                seen_slash = true;
                for param in params.iter_mut() {
                    if param.kind == ParameterKind::Regular {
                        param.kind = ParameterKind::PositionalOnly;
                    }
                }
            } else if self.eat(&TokenKind::Star) {
                if kind == ParameterKind::KeywordOnly {
                    return Err(self.error_at("* argument may appear only once", span));
                }
                bare_star = !matches!(self.peek(), TokenKind::Name(_));
                if matches!(self.peek(), TokenKind::Name(_)) {
                    let name = self.expect_name()?;
                    let annotation = self.parse_annotation(annotations)?;
                    params.push(Parameter {
                        name,
                        kind: ParameterKind::VarPositional,
                        annotation,
                        default: None,
                        span,
                    });
                }
                kind = ParameterKind::KeywordOnly;
            } else if self.eat(&TokenKind::DoubleStar) {
                if bare_star {
                    return Err(self.error_at("named arguments must follow bare *", span));
                }
                let name = self.expect_name()?;
                let annotation = self.parse_annotation(annotations)?;
                params.push(Parameter {
                    name,
                    kind: ParameterKind::VarKeyword,
                    annotation,
                    default: None,
                    span,
                });
            } else {
                let name = self.expect_name()?;
                let annotation = self.parse_annotation(annotations)?;
                let default = if self.eat(&TokenKind::Equals) {
                    Some(self.parse_test()?)
                } else {
                    None
                };
                if kind != ParameterKind::KeywordOnly {
                    if default.is_none() && seen_default {
                        return Err(self.error_at("non-default argument follows default argument", span));
                    }
                    seen_default |= default.is_some();
                }
                bare_star = false;
                params.push(Parameter {
                    name,
                    kind,
                    annotation,
                    default,
                    span,
                });
            }

            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        if bare_star {
            return Err(self.error("named arguments must follow bare *"));
        }
        Ok(params)
    }

    fn parse_annotation(&mut self, allowed: bool) -> ParseResult<Option<Expr>> {
        if allowed && self.eat(&TokenKind::Colon) {
            Ok(Some(self.parse_test()?))
        } else {
            Ok(None)
        }
    }

    /// `if named_expression block (elif ...)* [else block]`; each `elif`
    /// becomes an `If` nested in the previous branch's `orelse`.
    fn parse_if(&mut self) -> ParseResult<StmtKind> {
        self.expect(&TokenKind::If)?;
        let test = self.parse_named_expression()?;
        let body = self.parse_block()?;

        let mut branches = Vec::new();
        while self.check(&TokenKind::Elif) {
            let span = self.current_span();
            self.advance();
            let test = self.parse_named_expression()?;
            let body = self.parse_block()?;
            branches.push((span, test, body));
        }

        let mut orelse = self.parse_else_block()?;
        for (span, test, body) in branches.into_iter().rev() {
            orelse = vec![Stmt {
                kind: StmtKind::If { test, body, orelse },
                span,
            }];
        }
        Ok(StmtKind::If { test, body, orelse })
    }

    fn parse_while(&mut self) -> ParseResult<StmtKind> {
        self.expect(&TokenKind::While)?;
        let test = self.parse_named_expression()?;
        let body = self.parse_block()?;
        let orelse = self.parse_else_block()?;
        Ok(StmtKind::While { test, body, orelse })
    }

    /// `for targets in star_expressions block [else block]`
    fn parse_for(&mut self, is_async: bool) -> ParseResult<StmtKind> {
        self.expect(&TokenKind::For)?;
        let target = self.parse_target_list()?;
        self.check_target(&target)?;
        self.expect(&TokenKind::In)?;
        let iter = self.parse_star_expressions()?;
        let body = self.parse_block()?;
        let orelse = self.parse_else_block()?;
        Ok(StmtKind::For {
            target,
            iter,
            body,
            orelse,
            is_async,
        })
    }

    fn parse_else_block(&mut self) -> ParseResult<Vec<Stmt>> {
        if self.eat(&TokenKind::Else) {
            self.parse_block()
        } else {
            Ok(Vec::new())
        }
    }

    fn parse_try(&mut self) -> ParseResult<StmtKind> {
        self.expect(&TokenKind::Try)?;
        let body = self.parse_block()?;

        let mut handlers = Vec::new();
        while self.check(&TokenKind::Except) {
            let span = self.current_span();
            self.advance();
            self.eat(&TokenKind::Star);
            let (exception, name) = if self.check(&TokenKind::Colon) {
                (None, None)
            } else {
                let exception = self.parse_test()?;
                let name = if self.eat(&TokenKind::As) {
                    Some(self.expect_name()?)
                } else {
                    None
                };
                (Some(exception), name)
            };
            let body = self.parse_block()?;
            handlers.push(ExceptHandler {
                exception,
                name,
                body,
                span,
            });
        }

        let orelse = if !handlers.is_empty() {
            self.parse_else_block()?
        } else {
            Vec::new()
        };
        let finalbody = if self.eat(&TokenKind::Finally) {
            self.parse_block()?
        } else {
            Vec::new()
        };

        if handlers.is_empty() && finalbody.is_empty() {
            return Err(self.error("expected 'except' or 'finally' block"));
        }

        Ok(StmtKind::Try {
            body,
            handlers,
            orelse,
            finalbody,
        })
    }

    /// `match subject ':' NEWLINE INDENT case_block+ DEDENT`.
    ///
    /// `match` is a soft keyword: a line without that shape (`match = 1`,
    /// `match(x)`) is left for the simple-statement parser.
    fn try_parse_match(&mut self) -> ParseResult<Option<Stmt>> {
        let span = self.current_span();
        let saved = self.pos;
        self.advance();
        let subject = match self.parse_star_expressions() {
            Ok(subject)
                if self.check(&TokenKind::Colon) && self.peek_nth(1) == &TokenKind::Newline =>
            {
                subject
            }
            _ => {
                self.pos = saved;
                return Ok(None);
            }
        };
        self.expect(&TokenKind::Colon)?;
        self.expect(&TokenKind::Newline)?;
        if !self.eat(&TokenKind::Indent) {
            return Err(self.error("expected an indented block"));
        }

        let mut cases = Vec::new();
        while !self.check(&TokenKind::Dedent) && !self.check(&TokenKind::Eof) {
            cases.push(self.parse_case()?);
        }
        self.expect(&TokenKind::Dedent)?;
        Ok(Some(Stmt {
            kind: StmtKind::Match { subject, cases },
            span,
        }))
    }

    /// `case pattern ['if' named_expression] block`
    fn parse_case(&mut self) -> ParseResult<MatchCase> {
        let span = self.current_span();
        match self.peek().clone() {
            TokenKind::Name(name) if name == "case" => {
                self.advance();
            }
            other => return Err(self.error(format!("expected 'case', got {}", other))),
        }
        self.skip_pattern()?;
        let guard = if self.eat(&TokenKind::If) {
            Some(self.parse_named_expression()?)
        } else {
            None
        };
        let body = self.parse_block()?;
        Ok(MatchCase { guard, body, span })
    }

    /// Step over a case pattern: the tokens before `if` or `:` outside brackets.
    fn skip_pattern(&mut self) -> ParseResult<()> {
        let start = self.pos;
        let mut depth = 0usize;
        loop {
            match self.peek() {
                TokenKind::LeftParen | TokenKind::LeftBracket | TokenKind::LeftBrace => depth += 1,
                TokenKind::RightParen | TokenKind::RightBracket | TokenKind::RightBrace => {
                    depth = depth.saturating_sub(1)
                }
                TokenKind::Colon | TokenKind::If if depth == 0 => break,
                TokenKind::Newline | TokenKind::Eof => return Err(self.error("expected ':'")),
                _ => {}
            }
            self.advance();
        }
        if self.pos == start {
            return Err(self.error("expected a case pattern"));
        }
        Ok(())
    }

    fn parse_with(&mut self, is_async: bool) -> ParseResult<StmtKind> {
        self.expect(&TokenKind::With)?;

        let items = if self.check(&TokenKind::LeftParen) {
            let saved = self.pos;
            match self.parse_parenthesized_with_items() {
                Ok(items) if self.check(&TokenKind::Colon) => items,
                _ => {
                    self.pos = saved;
                    self.parse_with_items()?
                }
            }
        } else {
            self.parse_with_items()?
        };

        let body = self.parse_block()?;
        Ok(StmtKind::With {
            items,
            body,
            is_async,
        })
    }

    /// `'(' with_item (',' with_item)* [','] ')'`
    fn parse_parenthesized_with_items(&mut self) -> ParseResult<Vec<WithItem>> {
        self.expect(&TokenKind::LeftParen)?;
        let mut items = Vec::new();
        while !self.check(&TokenKind::RightParen) {
            items.push(self.parse_with_item()?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RightParen)?;
        Ok(items)
    }

    fn parse_with_items(&mut self) -> ParseResult<Vec<WithItem>> {
        let mut items = vec![self.parse_with_item()?];
        while self.eat(&TokenKind::Comma) {
            items.push(self.parse_with_item()?);
        }
        Ok(items)
    }

    fn parse_with_item(&mut self) -> ParseResult<WithItem> {
        let context = self.parse_test()?;
        let target = if self.eat(&TokenKind::As) {
            let target = self.parse_star_target()?;
            self.check_target(&target)?;
            Some(target)
        } else {
            None
        };
        Ok(WithItem { context, target })
    }

    fn parse_simple_statement(&mut self) -> ParseResult<Stmt> {
        let span = self.current_span();
        let kind = match self.peek().clone() {
            TokenKind::Pass => {
                self.advance();
                StmtKind::Pass
            }
            TokenKind::Break => {
                self.advance();
                StmtKind::Break
            }
            TokenKind::Continue => {
                self.advance();
                StmtKind::Continue
            }
            TokenKind::Return => {
                self.advance();
                let value = if self.starts_expression() {
                    Some(self.parse_star_expressions()?)
                } else {
                    None
                };
                StmtKind::Return(value)
            }
            TokenKind::Raise => {
                self.advance();
                let (exc, cause) = if self.starts_expression() {
                    let exc = self.parse_test()?;
                    let cause = if self.eat(&TokenKind::From) {
                        Some(self.parse_test()?)
                    } else {
                        None
                    };
                    (Some(exc), cause)
                } else {
                    (None, None)
                };
                StmtKind::Raise { exc, cause }
            }
            TokenKind::Global => {
                self.advance();
                StmtKind::Global(self.parse_name_list()?)
            }
            TokenKind::Nonlocal => {
                self.advance();
                StmtKind::Nonlocal(self.parse_name_list()?)
            }
            TokenKind::Del => {
                self.advance();
                let mut targets = vec![self.parse_bitor()?];
                while self.eat(&TokenKind::Comma) {
                    if !self.starts_expression() {
                        break;
                    }
                    targets.push(self.parse_bitor()?);
                }
                for target in &targets {
                    self.check_target(target)?;
                }
                StmtKind::Delete(targets)
            }
            TokenKind::Assert => {
                self.advance();
                let test = self.parse_test()?;
                let msg = if self.eat(&TokenKind::Comma) {
                    Some(self.parse_test()?)
                } else {
                    None
                };
                StmtKind::Assert { test, msg }
            }
            TokenKind::Import => {
                self.advance();
                let mut names = vec![self.parse_dotted_alias()?];
                while self.eat(&TokenKind::Comma) {
                    names.push(self.parse_dotted_alias()?);
                }
                StmtKind::Import(names)
            }
            TokenKind::From => self.parse_import_from()?,
            _ => self.parse_expression_statement()?,
        };
        Ok(Stmt { kind, span })
    }

    fn parse_name_list(&mut self) -> ParseResult<Vec<String>> {
        let mut names = vec![self.expect_name()?];
        while self.eat(&TokenKind::Comma) {
            names.push(self.expect_name()?);
        }
        Ok(names)
    }

    fn parse_dotted_name(&mut self) -> ParseResult<String> {
        let mut name = self.expect_name()?;
        while self.eat(&TokenKind::Dot) {
            name.push('.');
            name.push_str(&self.expect_name()?);
        }
        Ok(name)
    }

    fn parse_dotted_alias(&mut self) -> ParseResult<Alias> {
        let name = self.parse_dotted_name()?;
        let asname = if self.eat(&TokenKind::As) {
            Some(self.expect_name()?)
        } else {
            None
        };
        Ok(Alias { name, asname })
    }

    /// `from ('.' | '...')* [dotted_name] import ('*' | names | '(' names ')')`
    fn parse_import_from(&mut self) -> ParseResult<StmtKind> {
        self.expect(&TokenKind::From)?;
        let mut level = 0;
        loop {
            if self.eat(&TokenKind::Dot) {
                level += 1;
            } else if self.eat(&TokenKind::Ellipsis) {
                level += 3;
            } else {
                break;
            }
        }
        let module = if matches!(self.peek(), TokenKind::Name(_)) {
            Some(self.parse_dotted_name()?)
        } else {
            None
        };
        if module.is_none() && level == 0 {
            return Err(self.error(format!("expected module name, got {}", self.peek())));
        }
        self.expect(&TokenKind::Import)?;

        let mut names = Vec::new();
        if self.eat(&TokenKind::Star) {
            names.push(Alias {
                name: "*".to_string(),
                asname: None,
            });
        } else {
            let parenthesized = self.eat(&TokenKind::LeftParen);
            loop {
                let name = self.expect_name()?;
                let asname = if self.eat(&TokenKind::As) {
                    Some(self.expect_name()?)
                } else {
                    None
                };
                names.push(Alias { name, asname });
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
                if parenthesized && self.check(&TokenKind::RightParen) {
                    break;
                }
            }
            if parenthesized {
                self.expect(&TokenKind::RightParen)?;
            }
        }

        Ok(StmtKind::ImportFrom {
            module,
            names,
            level,
        })
    }

    /// Expression statements and every form of assignment.
    fn parse_expression_statement(&mut self) -> ParseResult<StmtKind> {
        let first = self.parse_yield_or_star_expressions()?;

        match self.peek().clone() {
            TokenKind::Equals => {
                let mut exprs = vec![first];
                while self.eat(&TokenKind::Equals) {
                    exprs.push(self.parse_yield_or_star_expressions()?);
                }
                let value = exprs.pop().ok_or_else(|| self.error("missing value"))?;
                for target in &exprs {
                    self.check_target(target)?;
                }
                Ok(StmtKind::Assign {
                    targets: exprs,
                    value,
                })
            }
            TokenKind::AugAssign(op) => {
                if !Self::is_single_target(&first) {
                    return Err(self.error_at(
                        "illegal expression for augmented assignment",
                        first.span,
                    ));
                }
                self.advance();
                let value = self.parse_yield_or_star_expressions()?;
                Ok(StmtKind::AugAssign {
                    target: first,
                    op,
                    value,
                })
            }
            TokenKind::Colon => {
                if !Self::is_single_target(&first) {
                    return Err(self.error_at(
                        "only single target (not tuple) can be annotated",
                        first.span,
                    ));
                }
                self.advance();
                let annotation = self.parse_test()?;
                let value = if self.eat(&TokenKind::Equals) {
                    Some(self.parse_yield_or_star_expressions()?)
                } else {
                    None
                };
                Ok(StmtKind::AnnAssign {
                    target: first,
                    annotation,
                    value,
                })
            }
            _ => Ok(StmtKind::Expr(first)),
        }
    }

    fn is_single_target(expr: &Expr) -> bool {
        matches!(
            expr.kind,
            ExprKind::Name(_) | ExprKind::Attribute { .. } | ExprKind::Subscript { .. }
        )
    }

    /// Reject assignment to anything that is not a name, attribute,
    /// subscript, starred target, or a tuple/list of those.
    fn check_target(&self, expr: &Expr) -> ParseResult<()> {
        match &expr.kind {
            ExprKind::Name(_) | ExprKind::Attribute { .. } | ExprKind::Subscript { .. } => Ok(()),
            ExprKind::Tuple(elts) | ExprKind::List(elts) => {
                for elt in elts {
                    self.check_target(elt)?;
                }
                Ok(())
            }
            ExprKind::Starred(inner) => self.check_target(inner),
            _ => Err(self.error_at("cannot assign to expression", expr.span)),
        }
    }

    // --- Expressions ---

    fn parse_yield_or_star_expressions(&mut self) -> ParseResult<Expr> {
        if self.check(&TokenKind::Yield) {
            self.parse_yield()
        } else {
            self.parse_star_expressions()
        }
    }

    /// `yield from expression | yield [star_expressions]`
    fn parse_yield(&mut self) -> ParseResult<Expr> {
        let span = self.expect(&TokenKind::Yield)?;
        if self.eat(&TokenKind::From) {
            let value = self.parse_test()?;
            return Ok(Expr::new(ExprKind::YieldFrom(Box::new(value)), span));
        }
        let value = if self.starts_expression() {
            Some(Box::new(self.parse_star_expressions()?))
        } else {
            None
        };
        Ok(Expr::new(ExprKind::Yield(value), span))
    }

    /// Comma-separated expressions; more than one (or a trailing comma)
    /// makes a tuple.
    fn parse_star_expressions(&mut self) -> ParseResult<Expr> {
        let span = self.current_span();
        let first = self.parse_star_expression()?;
        if !self.check(&TokenKind::Comma) {
            return Ok(first);
        }
        let mut elts = vec![first];
        while self.eat(&TokenKind::Comma) {
            if !self.starts_expression() {
                break;
            }
            elts.push(self.parse_star_expression()?);
        }
        Ok(Expr::new(ExprKind::Tuple(elts), span))
    }

    fn parse_star_expression(&mut self) -> ParseResult<Expr> {
        let span = self.current_span();
        if self.eat(&TokenKind::Star) {
            let value = self.parse_bitor()?;
            return Ok(Expr::new(ExprKind::Starred(Box::new(value)), span));
        }
        self.parse_test()
    }

    fn parse_star_named_expression(&mut self) -> ParseResult<Expr> {
        let span = self.current_span();
        if self.eat(&TokenKind::Star) {
            let value = self.parse_bitor()?;
            return Ok(Expr::new(ExprKind::Starred(Box::new(value)), span));
        }
        self.parse_named_expression()
    }

    /// `NAME ':=' expression | expression`
    fn parse_named_expression(&mut self) -> ParseResult<Expr> {
        if matches!(self.peek(), TokenKind::Name(_)) && self.peek_nth(1) == &TokenKind::ColonEquals
        {
            let span = self.current_span();
            let name = self.expect_name()?;
            self.advance();
            let value = self.parse_test()?;
            return Ok(Expr::new(
                ExprKind::NamedExpr {
                    target: Box::new(Expr::new(ExprKind::Name(name), span)),
                    value: Box::new(value),
                },
                span,
            ));
        }
        self.parse_test()
    }

    /// `lambda | disjunction ['if' disjunction 'else' expression]`
    fn parse_test(&mut self) -> ParseResult<Expr> {
        self.nested(|p| {
            if p.check(&TokenKind::Lambda) {
                return p.parse_lambda();
            }
            let span = p.current_span();
            let body = p.parse_or_test()?;
            if !p.eat(&TokenKind::If) {
                return Ok(body);
            }
            let test = p.parse_or_test()?;
            p.expect(&TokenKind::Else)?;
            let orelse = p.parse_test()?;
            Ok(Expr::new(
                ExprKind::IfExp {
                    test: Box::new(test),
                    body: Box::new(body),
                    orelse: Box::new(orelse),
                },
                span,
            ))
        })
    }

    fn parse_lambda(&mut self) -> ParseResult<Expr> {
        let span = self.expect(&TokenKind::Lambda)?;
        let params = self.parse_parameters(&TokenKind::Colon, false)?;
        self.expect(&TokenKind::Colon)?;
        let body = self.parse_test()?;
        Ok(Expr::new(
            ExprKind::Lambda {
                params,
                body: Box::new(body),
            },
            span,
        ))
    }

    fn parse_or_test(&mut self) -> ParseResult<Expr> {
        let span = self.current_span();
        let first = self.parse_and_test()?;
        if !self.check(&TokenKind::Or) {
            return Ok(first);
        }
        let mut values = vec![first];
        while self.eat(&TokenKind::Or) {
            values.push(self.parse_and_test()?);
        }
        Ok(Expr::new(
            ExprKind::BoolOp {
                op: BoolOp::Or,
                values,
            },
            span,
        ))
    }

    fn parse_and_test(&mut self) -> ParseResult<Expr> {
        let span = self.current_span();
        let first = self.parse_not_test()?;
        if !self.check(&TokenKind::And) {
            return Ok(first);
        }
        let mut values = vec![first];
        while self.eat(&TokenKind::And) {
            values.push(self.parse_not_test()?);
        }
        Ok(Expr::new(
            ExprKind::BoolOp {
                op: BoolOp::And,
                values,
            },
            span,
        ))
    }

    fn parse_not_test(&mut self) -> ParseResult<Expr> {
        let span = self.current_span();
        if !self.eat(&TokenKind::Not) {
            return self.parse_comparison();
        }
        let operand = self.nested(Self::parse_not_test)?;
        Ok(Expr::new(
            ExprKind::UnaryOp {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            },
            span,
        ))
    }

    fn parse_comparison(&mut self) -> ParseResult<Expr> {
        let span = self.current_span();
        let left = self.parse_bitor()?;
        let mut ops = Vec::new();
        let mut comparators = Vec::new();
        while let Some(op) = self.parse_compare_op() {
            ops.push(op);
            comparators.push(self.parse_bitor()?);
        }
        if ops.is_empty() {
            return Ok(left);
        }
        Ok(Expr::new(
            ExprKind::Compare {
                left: Box::new(left),
                ops,
                comparators,
            },
            span,
        ))
    }

    fn parse_compare_op(&mut self) -> Option<CompareOp> {
        let op = match self.peek().clone() {
            TokenKind::EqualEqual => CompareOp::Eq,
            TokenKind::NotEqual => CompareOp::NotEq,
            TokenKind::Less => CompareOp::Lt,
            TokenKind::LessEqual => CompareOp::LtE,
            TokenKind::Greater => CompareOp::Gt,
            TokenKind::GreaterEqual => CompareOp::GtE,
            TokenKind::In => CompareOp::In,
            TokenKind::Not if self.peek_nth(1) == &TokenKind::In => {
                self.advance();
                CompareOp::NotIn
            }
            TokenKind::Is if self.peek_nth(1) == &TokenKind::Not => {
                self.advance();
                CompareOp::IsNot
            }
            TokenKind::Is => CompareOp::Is,
            _ => return None,
        };
        self.advance();
        Some(op)
    }

    /// One left-associative binary precedence level.
    fn parse_binary_level(
        &mut self,
        operand: fn(&mut Self) -> ParseResult<Expr>,
        operator: fn(&TokenKind) -> Option<BinaryOp>,
    ) -> ParseResult<Expr> {
        let span = self.current_span();
        let mut left = operand(self)?;
        let mut links = 0;
        while let Some(op) = operator(self.peek()) {
            self.check_chain(links)?;
            links += 1;
            self.advance();
            let right = operand(self)?;
            left = Expr::new(
                ExprKind::BinOp {
                    left: Box::new(left),
                    op,
                    right: Box::new(right),
                },
                span,
            );
        }
        Ok(left)
    }

    fn parse_bitor(&mut self) -> ParseResult<Expr> {
        self.parse_binary_level(Self::parse_bitxor, |t| match t {
            TokenKind::Pipe => Some(BinaryOp::BitOr),
            _ => None,
        })
    }

    fn parse_bitxor(&mut self) -> ParseResult<Expr> {
        self.parse_binary_level(Self::parse_bitand, |t| match t {
            TokenKind::Caret => Some(BinaryOp::BitXor),
            _ => None,
        })
    }

    fn parse_bitand(&mut self) -> ParseResult<Expr> {
        self.parse_binary_level(Self::parse_shift, |t| match t {
            TokenKind::Ampersand => Some(BinaryOp::BitAnd),
            _ => None,
        })
    }

    fn parse_shift(&mut self) -> ParseResult<Expr> {
        self.parse_binary_level(Self::parse_arith, |t| match t {
            TokenKind::LeftShift => Some(BinaryOp::LShift),
            TokenKind::RightShift => Some(BinaryOp::RShift),
            _ => None,
        })
    }

    fn parse_arith(&mut self) -> ParseResult<Expr> {
        self.parse_binary_level(Self::parse_term, |t| match t {
            TokenKind::Plus => Some(BinaryOp::Add),
            TokenKind::Minus => Some(BinaryOp::Sub),
            _ => None,
        })
    }

    fn parse_term(&mut self) -> ParseResult<Expr> {
        self.parse_binary_level(Self::parse_factor, |t| match t {
            TokenKind::Star => Some(BinaryOp::Mult),
            TokenKind::Slash => Some(BinaryOp::Div),
            TokenKind::DoubleSlash => Some(BinaryOp::FloorDiv),
            TokenKind::Percent => Some(BinaryOp::Mod),
            TokenKind::At => Some(BinaryOp::MatMult),
            _ => None,
        })
    }

    fn parse_factor(&mut self) -> ParseResult<Expr> {
        let span = self.current_span();
        let op = match self.peek().clone() {
            TokenKind::Plus => UnaryOp::Plus,
            TokenKind::Minus => UnaryOp::Minus,
            TokenKind::Tilde => UnaryOp::Invert,
            _ => return self.parse_power(),
        };
        self.advance();
        let operand = self.nested(Self::parse_factor)?;
        Ok(Expr::new(
            ExprKind::UnaryOp {
                op,
                operand: Box::new(operand),
            },
            span,
        ))
    }

    /// `await_primary ['**' factor]`; right-associative through `factor`.
    fn parse_power(&mut self) -> ParseResult<Expr> {
        let span = self.current_span();
        let base = if self.eat(&TokenKind::Await) {
            let value = self.parse_primary()?;
            Expr::new(ExprKind::Await(Box::new(value)), span)
        } else {
            self.parse_primary()?
        };
        if !self.eat(&TokenKind::DoubleStar) {
            return Ok(base);
        }
        let exponent = self.nested(Self::parse_factor)?;
        Ok(Expr::new(
            ExprKind::BinOp {
                left: Box::new(base),
                op: BinaryOp::Pow,
                right: Box::new(exponent),
            },
            span,
        ))
    }

    /// An atom followed by any number of `.name`, `(args)` and `[slices]`.
    fn parse_primary(&mut self) -> ParseResult<Expr> {
        let span = self.current_span();
        let mut expr = self.parse_atom()?;
        let mut links = 0;
        loop {
            if matches!(self.peek(), TokenKind::Dot | TokenKind::LeftParen | TokenKind::LeftBracket) {
                self.check_chain(links)?;
                links += 1;
            }
            match self.peek().clone() {
                TokenKind::Dot => {
                    self.advance();
                    let attr = self.expect_name()?;
                    expr = Expr::new(
                        ExprKind::Attribute {
                            value: Box::new(expr),
                            attr,
                        },
                        span,
                    );
                }
                TokenKind::LeftParen => {
                    self.advance();
                    let (args, keywords) = self.parse_call_arguments()?;
                    expr = Expr::new(
                        ExprKind::Call {
                            func: Box::new(expr),
                            args,
                            keywords,
                        },
                        span,
                    );
                }
                TokenKind::LeftBracket => {
                    self.advance();
                    let slice = self.parse_slices()?;
                    self.expect(&TokenKind::RightBracket)?;
                    expr = Expr::new(
                        ExprKind::Subscript {
                            value: Box::new(expr),
                            slice: Box::new(slice),
                        },
                        span,
                    );
                }
                _ => return Ok(expr),
            }
        }
    }

    /// Arguments after an opening `(`, through the closing `)`.
    fn parse_call_arguments(&mut self) -> ParseResult<(Vec<Expr>, Vec<Keyword>)> {
        let mut args = Vec::new();
        let mut keywords: Vec<Keyword> = Vec::new();

        while !self.check(&TokenKind::RightParen) {
            let span = self.current_span();
            if self.eat(&TokenKind::Star) {
                let value = self.parse_test()?;
                args.push(Expr::new(ExprKind::Starred(Box::new(value)), span));
            } else if self.eat(&TokenKind::DoubleStar) {
                let value = self.parse_test()?;
                keywords.push(Keyword {
                    arg: None,
                    value,
                    span,
                });
            } else if matches!(self.peek(), TokenKind::Name(_))
                && self.peek_nth(1) == &TokenKind::Equals
            {
                let arg = self.expect_name()?;
                self.advance();
                let value = self.parse_test()?;
                keywords.push(Keyword {
                    arg: Some(arg),
                    value,
                    span,
                });
            } else {
                if !keywords.is_empty() {
                    return Err(self.error(if keywords.iter().any(|k| k.arg.is_none()) {
                        "positional argument follows keyword argument unpacking"
                    } else {
                        "positional argument follows keyword argument"
                    }));
                }
                let value = self.parse_named_expression()?;
                if self.at_comprehension() {
                    let generators = self.parse_comprehension_clauses()?;
                    args.push(Expr::new(
                        ExprKind::Comprehension {
                            kind: ComprehensionKind::Generator,
                            element: Box::new(value),
                            value: None,
                            generators,
                        },
                        span,
                    ));
                } else {
                    args.push(value);
                }
            }

            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }

        self.expect(&TokenKind::RightParen)?;
        Ok((args, keywords))
    }

    /// Subscript contents: one slice item, or a tuple of them.
    fn parse_slices(&mut self) -> ParseResult<Expr> {
        let span = self.current_span();
        let first = self.parse_slice_item()?;
        if !self.check(&TokenKind::Comma) {
            return Ok(first);
        }
        let mut elts = vec![first];
        while self.eat(&TokenKind::Comma) {
            if self.check(&TokenKind::RightBracket) {
                break;
            }
            elts.push(self.parse_slice_item()?);
        }
        Ok(Expr::new(ExprKind::Tuple(elts), span))
    }

    fn parse_slice_item(&mut self) -> ParseResult<Expr> {
        let span = self.current_span();
        let lower = if self.check(&TokenKind::Colon) {
            None
        } else {
            let item = self.parse_star_named_expression()?;
            if !self.check(&TokenKind::Colon) {
                return Ok(item);
            }
            Some(Box::new(item))
        };

        self.expect(&TokenKind::Colon)?;
        let upper = if self.starts_expression() {
            Some(Box::new(self.parse_test()?))
        } else {
            None
        };
        let step = if self.eat(&TokenKind::Colon) && self.starts_expression() {
            Some(Box::new(self.parse_test()?))
        } else {
            None
        };
        Ok(Expr::new(ExprKind::Slice { lower, upper, step }, span))
    }

    /// `('async'? 'for' targets 'in' disjunction ('if' disjunction)*)+`
    fn parse_comprehension_clauses(&mut self) -> ParseResult<Vec<Comprehension>> {
        let mut generators = Vec::new();
        while self.at_comprehension() {
            let is_async = self.eat(&TokenKind::Async);
            self.expect(&TokenKind::For)?;
            let target = self.parse_target_list()?;
            self.check_target(&target)?;
            self.expect(&TokenKind::In)?;
            let iter = self.parse_or_test()?;
            let mut ifs = Vec::new();
            while self.eat(&TokenKind::If) {
                ifs.push(self.parse_or_test()?);
            }
            generators.push(Comprehension {
                target,
                iter,
                ifs,
                is_async,
            });
        }
        Ok(generators)
    }

    /// Targets of `for` loops and comprehensions, stopping before `in`.
    fn parse_target_list(&mut self) -> ParseResult<Expr> {
        let span = self.current_span();
        let first = self.parse_star_target()?;
        if !self.check(&TokenKind::Comma) {
            return Ok(first);
        }
        let mut elts = vec![first];
        while self.eat(&TokenKind::Comma) {
            if self.check(&TokenKind::In) || !self.starts_expression() {
                break;
            }
            elts.push(self.parse_star_target()?);
        }
        Ok(Expr::new(ExprKind::Tuple(elts), span))
    }

    fn parse_star_target(&mut self) -> ParseResult<Expr> {
        let span = self.current_span();
        if self.eat(&TokenKind::Star) {
            let value = self.parse_bitor()?;
            return Ok(Expr::new(ExprKind::Starred(Box::new(value)), span));
        }
        self.parse_bitor()
    }

    fn parse_atom(&mut self) -> ParseResult<Expr> {
        let span = self.current_span();
        let kind = match self.peek().clone() {
            TokenKind::Name(name) => {
                self.advance();
                ExprKind::Name(name)
            }
            TokenKind::Number(text) => {
                self.advance();
                ExprKind::Constant(Constant::Number(text))
            }
            TokenKind::Str(_) => return self.parse_strings(),
            TokenKind::None => {
                self.advance();
                ExprKind::Constant(Constant::None)
            }
            TokenKind::True => {
                self.advance();
                ExprKind::Constant(Constant::Bool(true))
            }
            TokenKind::False => {
                self.advance();
                ExprKind::Constant(Constant::Bool(false))
            }
            TokenKind::Ellipsis => {
                self.advance();
                ExprKind::Constant(Constant::Ellipsis)
            }
            TokenKind::LeftParen => return self.parse_paren_atom(),
            TokenKind::LeftBracket => return self.parse_list_atom(),
            TokenKind::LeftBrace => return self.parse_brace_atom(),
            other => return Err(self.error(format!("invalid syntax: unexpected {}", other))),
        };
        Ok(Expr::new(kind, span))
    }

    /// Adjacent string literals concatenate into one constant.
    fn parse_strings(&mut self) -> ParseResult<Expr> {
        let span = self.current_span();
        let mut value = String::new();
        let mut formatted = false;
        let mut bytes = None;

        while let TokenKind::Str(literal) = self.peek().clone() {
            let is_bytes = literal.kind == StrKind::Bytes;
            match bytes {
                Some(prev) if prev != is_bytes => {
                    return Err(self.error("cannot mix bytes and nonbytes literals"));
                }
                _ => bytes = Some(is_bytes),
            }
            formatted |= literal.kind == StrKind::Formatted;
            value.push_str(&literal.value);
            self.advance();
        }

        let kind = if formatted {
            ExprKind::FormattedString(value)
        } else if bytes == Some(true) {
            ExprKind::Constant(Constant::Bytes(value))
        } else {
            ExprKind::Constant(Constant::Str(value))
        };
        Ok(Expr::new(kind, span))
    }

    /// `()`, `(yield)`, `(expr)`, `(a, b)` or a generator expression.
    fn parse_paren_atom(&mut self) -> ParseResult<Expr> {
        let span = self.expect(&TokenKind::LeftParen)?;
        if self.eat(&TokenKind::RightParen) {
            return Ok(Expr::new(ExprKind::Tuple(Vec::new()), span));
        }
        if self.check(&TokenKind::Yield) {
            let expr = self.parse_yield()?;
            self.expect(&TokenKind::RightParen)?;
            return Ok(expr);
        }

        let first = self.parse_star_named_expression()?;
        if self.at_comprehension() {
            let generators = self.parse_comprehension_clauses()?;
            self.expect(&TokenKind::RightParen)?;
            return Ok(Expr::new(
                ExprKind::Comprehension {
                    kind: ComprehensionKind::Generator,
                    element: Box::new(first),
                    value: None,
                    generators,
                },
                span,
            ));
        }
        if self.eat(&TokenKind::RightParen) {
            return Ok(first);
        }

        let mut elts = vec![first];
        while self.eat(&TokenKind::Comma) {
            if self.check(&TokenKind::RightParen) {
                break;
            }
            elts.push(self.parse_star_named_expression()?);
        }
        self.expect(&TokenKind::RightParen)?;
        Ok(Expr::new(ExprKind::Tuple(elts), span))
    }

    fn parse_list_atom(&mut self) -> ParseResult<Expr> {
        let span = self.expect(&TokenKind::LeftBracket)?;
        if self.eat(&TokenKind::RightBracket) {
            return Ok(Expr::new(ExprKind::List(Vec::new()), span));
        }

        let first = self.parse_star_named_expression()?;
        if self.at_comprehension() {
            let generators = self.parse_comprehension_clauses()?;
            self.expect(&TokenKind::RightBracket)?;
            return Ok(Expr::new(
                ExprKind::Comprehension {
                    kind: ComprehensionKind::List,
                    element: Box::new(first),
                    value: None,
                    generators,
                },
                span,
            ));
        }

        let mut elts = vec![first];
        while self.eat(&TokenKind::Comma) {
            if self.check(&TokenKind::RightBracket) {
                break;
            }
            elts.push(self.parse_star_named_expression()?);
        }
        self.expect(&TokenKind::RightBracket)?;
        Ok(Expr::new(ExprKind::List(elts), span))
    }

    /// Dict, set, or their comprehensions.
    fn parse_brace_atom(&mut self) -> ParseResult<Expr> {
        let span = self.expect(&TokenKind::LeftBrace)?;
        if self.eat(&TokenKind::RightBrace) {
            return Ok(Expr::new(ExprKind::Dict(Vec::new()), span));
        }

        let first_is_dict = self.check(&TokenKind::DoubleStar)
            || (!self.check(&TokenKind::Star) && self.brace_is_dict());

        if first_is_dict {
            let first = self.parse_dict_entry()?;
            if first.0.is_some() && self.at_comprehension() {
                let generators = self.parse_comprehension_clauses()?;
                self.expect(&TokenKind::RightBrace)?;
                let (key, value) = first;
                let key = key.ok_or_else(|| self.error("dict comprehension needs a key"))?;
                return Ok(Expr::new(
                    ExprKind::Comprehension {
                        kind: ComprehensionKind::Dict,
                        element: Box::new(key),
                        value: Some(Box::new(value)),
                        generators,
                    },
                    span,
                ));
            }
            let mut entries = vec![first];
            while self.eat(&TokenKind::Comma) {
                if self.check(&TokenKind::RightBrace) {
                    break;
                }
                entries.push(self.parse_dict_entry()?);
            }
            self.expect(&TokenKind::RightBrace)?;
            return Ok(Expr::new(ExprKind::Dict(entries), span));
        }

        let first = self.parse_star_named_expression()?;
        if self.at_comprehension() {
            let generators = self.parse_comprehension_clauses()?;
            self.expect(&TokenKind::RightBrace)?;
            return Ok(Expr::new(
                ExprKind::Comprehension {
                    kind: ComprehensionKind::Set,
                    element: Box::new(first),
                    value: None,
                    generators,
                },
                span,
            ));
        }
        let mut elts = vec![first];
        while self.eat(&TokenKind::Comma) {
            if self.check(&TokenKind::RightBrace) {
                break;
            }
            elts.push(self.parse_star_named_expression()?);
        }
        self.expect(&TokenKind::RightBrace)?;
        Ok(Expr::new(ExprKind::Set(elts), span))
    }

    /// Whether the display after `{` is a dict: a `:` outside brackets
    /// before the first `,`, `for` or closing `}`. A `lambda` claims the next
    /// such `:` for itself.
    fn brace_is_dict(&self) -> bool {
        let mut depth = 0usize;
        let mut lambdas = 0usize;
        for token in self.tokens.iter().skip(self.pos) {
            match token.kind {
                TokenKind::LeftParen | TokenKind::LeftBracket | TokenKind::LeftBrace => depth += 1,
                TokenKind::RightBrace if depth == 0 => return false,
                TokenKind::RightParen | TokenKind::RightBracket | TokenKind::RightBrace => {
                    depth = depth.saturating_sub(1)
                }
                TokenKind::Lambda if depth == 0 => lambdas += 1,
                TokenKind::Colon if depth == 0 => {
                    if lambdas == 0 {
                        return true;
                    }
                    lambdas -= 1;
                }
                TokenKind::Comma | TokenKind::For if depth == 0 => return false,
                TokenKind::Newline | TokenKind::Eof => return false,
                _ => {}
            }
        }
        false
    }

    /// `key ':' value | '**' mapping`
    fn parse_dict_entry(&mut self) -> ParseResult<(Option<Expr>, Expr)> {
        if self.eat(&TokenKind::DoubleStar) {
            let mapping = self.parse_bitor()?;
            return Ok((None, mapping));
        }
        let key = self.parse_test()?;
        self.expect(&TokenKind::Colon)?;
        let value = self.parse_test()?;
        Ok((Some(key), value))
    }
}
