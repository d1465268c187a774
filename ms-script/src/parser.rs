use serde_json::Number;

use crate::ast::{BinaryOp, Expr, LogicalOp, PathSegment, Place, Stmt, UnaryOp};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub line: usize,
    pub message: String,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for ParseError {}

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Ident(String),
    Number(Number),
    String(String),
    True,
    False,
    Null,
    Let,
    If,
    Else,
    While,
    For,
    Break,
    Continue,
    Return,
    Bang,
    BangEqual,
    BangEqualEqual,
    Plus,
    PlusEqual,
    Minus,
    MinusEqual,
    Star,
    Slash,
    Percent,
    AmpersandAmpersand,
    PipePipe,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Question,
    Dot,
    Semicolon,
    Equal,
    EqualEqual,
    EqualEqualEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
struct Token {
    kind: TokenKind,
    line: usize,
}

struct Lexer<'a> {
    chars: std::str::Chars<'a>,
    current: Option<char>,
    line: usize,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        let mut chars = source.chars();
        let current = chars.next();
        Self {
            chars,
            current,
            line: 1,
        }
    }

    fn next_token(&mut self) -> Result<Token, ParseError> {
        self.skip_whitespace_and_comments()?;
        let line = self.line;
        let Some(ch) = self.current else {
            return Ok(Token {
                kind: TokenKind::Eof,
                line,
            });
        };

        let kind = match ch {
            '+' => {
                self.advance();
                if self.current == Some('=') {
                    self.advance();
                    TokenKind::PlusEqual
                } else {
                    TokenKind::Plus
                }
            }
            '-' => {
                self.advance();
                if self.current == Some('=') {
                    self.advance();
                    TokenKind::MinusEqual
                } else {
                    TokenKind::Minus
                }
            }
            '!' => {
                self.advance();
                if self.current == Some('=') {
                    self.advance();
                    if self.current == Some('=') {
                        self.advance();
                        TokenKind::BangEqualEqual
                    } else {
                        TokenKind::BangEqual
                    }
                } else {
                    TokenKind::Bang
                }
            }
            '=' => {
                self.advance();
                if self.current == Some('=') {
                    self.advance();
                    if self.current == Some('=') {
                        self.advance();
                        TokenKind::EqualEqualEqual
                    } else {
                        TokenKind::EqualEqual
                    }
                } else {
                    TokenKind::Equal
                }
            }
            '<' => {
                self.advance();
                if self.current == Some('=') {
                    self.advance();
                    TokenKind::LessEqual
                } else {
                    TokenKind::Less
                }
            }
            '>' => {
                self.advance();
                if self.current == Some('=') {
                    self.advance();
                    TokenKind::GreaterEqual
                } else {
                    TokenKind::Greater
                }
            }
            '&' => {
                self.advance();
                if self.current == Some('&') {
                    self.advance();
                    TokenKind::AmpersandAmpersand
                } else {
                    return Err(ParseError {
                        line,
                        message: "unexpected character '&', did you mean '&&'?".to_string(),
                    });
                }
            }
            '|' => {
                self.advance();
                if self.current == Some('|') {
                    self.advance();
                    TokenKind::PipePipe
                } else {
                    return Err(ParseError {
                        line,
                        message: "unexpected character '|', did you mean '||'?".to_string(),
                    });
                }
            }
            '*' => self.single(TokenKind::Star),
            '/' => self.single(TokenKind::Slash),
            '%' => self.single(TokenKind::Percent),
            '(' => self.single(TokenKind::LParen),
            ')' => self.single(TokenKind::RParen),
            '[' => self.single(TokenKind::LBracket),
            ']' => self.single(TokenKind::RBracket),
            '{' => self.single(TokenKind::LBrace),
            '}' => self.single(TokenKind::RBrace),
            ',' => self.single(TokenKind::Comma),
            ':' => self.single(TokenKind::Colon),
            '?' => self.single(TokenKind::Question),
            '.' => self.single(TokenKind::Dot),
            ';' => self.single(TokenKind::Semicolon),
            '"' | '\'' => TokenKind::String(self.consume_string(ch)?),
            c if c.is_ascii_digit() => TokenKind::Number(self.consume_number()?),
            c if is_ident_start(c) => {
                let ident = self.consume_ident();
                match ident.as_str() {
                    "let" | "const" | "var" => TokenKind::Let,
                    "if" => TokenKind::If,
                    "else" => TokenKind::Else,
                    "while" => TokenKind::While,
                    "for" => TokenKind::For,
                    "break" => TokenKind::Break,
                    "continue" => TokenKind::Continue,
                    "return" => TokenKind::Return,
                    "true" => TokenKind::True,
                    "false" => TokenKind::False,
                    "null" | "undefined" => TokenKind::Null,
                    _ => TokenKind::Ident(ident),
                }
            }
            other => {
                return Err(ParseError {
                    line,
                    message: format!("unexpected character '{other}'"),
                });
            }
        };

        Ok(Token { kind, line })
    }

    fn single(&mut self, kind: TokenKind) -> TokenKind {
        self.advance();
        kind
    }

    fn advance(&mut self) {
        if self.current == Some('\n') {
            self.line += 1;
        }
        self.current = self.chars.next();
    }

    fn peek_next(&self) -> Option<char> {
        self.chars.clone().next()
    }

    fn skip_whitespace_and_comments(&mut self) -> Result<(), ParseError> {
        loop {
            while matches!(self.current, Some(c) if c.is_whitespace()) {
                self.advance();
            }

            if self.current == Some('/') && self.peek_next() == Some('/') {
                while let Some(ch) = self.current {
                    self.advance();
                    if ch == '\n' {
                        break;
                    }
                }
                continue;
            }
            if self.current == Some('/') && self.peek_next() == Some('*') {
                let start_line = self.line;
                self.advance();
                self.advance();
                loop {
                    let Some(ch) = self.current else {
                        return Err(ParseError {
                            line: start_line,
                            message: "unterminated block comment".to_string(),
                        });
                    };
                    if ch == '*' && self.peek_next() == Some('/') {
                        self.advance();
                        self.advance();
                        break;
                    }
                    self.advance();
                }
                continue;
            }
            break;
        }
        Ok(())
    }

    fn consume_number(&mut self) -> Result<Number, ParseError> {
        let line = self.line;
        let mut text = String::new();
        let mut is_float = false;
        while let Some(ch) = self.current {
            if ch.is_ascii_digit() {
                text.push(ch);
                self.advance();
            } else if ch == '.'
                && !is_float
                && matches!(self.peek_next(), Some(next) if next.is_ascii_digit())
            {
                is_float = true;
                text.push(ch);
                self.advance();
            } else if ch == 'e' || ch == 'E' {
                is_float = true;
                text.push(ch);
                self.advance();
                if let Some(sign @ ('+' | '-')) = self.current {
                    text.push(sign);
                    self.advance();
                }
            } else {
                break;
            }
        }

        if !is_float && let Ok(value) = text.parse::<i64>() {
            return Ok(Number::from(value));
        }
        text.parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .ok_or(ParseError {
                line,
                message: format!("invalid number '{text}'"),
            })
    }

    fn consume_string(&mut self, quote: char) -> Result<String, ParseError> {
        let line = self.line;
        self.advance();

        let mut out = String::new();
        loop {
            let Some(ch) = self.current else {
                return Err(ParseError {
                    line,
                    message: "unterminated string literal".to_string(),
                });
            };

            match ch {
                c if c == quote => {
                    self.advance();
                    break;
                }
                '\n' => {
                    return Err(ParseError {
                        line,
                        message: "newline in string literal".to_string(),
                    });
                }
                '\\' => {
                    self.advance();
                    let Some(escaped) = self.current else {
                        return Err(ParseError {
                            line,
                            message: "unterminated string escape".to_string(),
                        });
                    };
                    let mapped = match escaped {
                        'n' => '\n',
                        'r' => '\r',
                        't' => '\t',
                        '0' => '\0',
                        '\\' => '\\',
                        '"' => '"',
                        '\'' => '\'',
                        '/' => '/',
                        'u' => {
                            let mut code = 0u32;
                            for _ in 0..4 {
                                self.advance();
                                let digit = self
                                    .current
                                    .and_then(|c| c.to_digit(16))
                                    .ok_or(ParseError {
                                        line,
                                        message: "invalid unicode escape".to_string(),
                                    })?;
                                code = code * 16 + digit;
                            }
                            char::from_u32(code).ok_or(ParseError {
                                line,
                                message: format!("invalid unicode code point {code:#x}"),
                            })?
                        }
                        other => {
                            return Err(ParseError {
                                line,
                                message: format!("invalid escape '\\{other}'"),
                            });
                        }
                    };
                    out.push(mapped);
                    self.advance();
                }
                other => {
                    out.push(other);
                    self.advance();
                }
            }
        }

        Ok(out)
    }

    fn consume_ident(&mut self) -> String {
        let mut text = String::new();
        while let Some(ch) = self.current {
            if is_ident_continue(ch) {
                text.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        text
    }
}

pub(crate) fn is_ident_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_' || ch == '$'
}

pub(crate) fn is_ident_continue(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_' || ch == '$'
}

pub(crate) fn is_reserved_word(name: &str) -> bool {
    matches!(
        name,
        "let"
            | "const"
            | "var"
            | "if"
            | "else"
            | "while"
            | "for"
            | "break"
            | "continue"
            | "return"
            | "true"
            | "false"
            | "null"
            | "undefined"
    )
}

/// Parses a whole script. `max_depth` bounds expression and block nesting.
pub(crate) fn parse_script(source: &str, max_depth: usize) -> Result<Vec<Stmt>, ParseError> {
    let mut parser = Parser::new(source, max_depth)?;
    parser.parse_program()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    max_depth: usize,
    loop_depth: usize,
}

impl Parser {
    fn new(source: &str, max_depth: usize) -> Result<Self, ParseError> {
        let mut lexer = Lexer::new(source);
        let mut tokens = Vec::new();
        loop {
            let token = lexer.next_token()?;
            let is_eof = matches!(token.kind, TokenKind::Eof);
            tokens.push(token);
            if is_eof {
                break;
            }
        }
        Ok(Self {
            tokens,
            pos: 0,
            depth: 0,
            max_depth,
            loop_depth: 0,
        })
    }

    fn parse_program(&mut self) -> Result<Vec<Stmt>, ParseError> {
        let mut stmts = Vec::new();
        while !self.check(&TokenKind::Eof) {
            stmts.push(self.parse_stmt()?);
        }
        Ok(stmts)
    }

    fn parse_stmt(&mut self) -> Result<Stmt, ParseError> {
        self.enter()?;
        let stmt = self.parse_stmt_inner();
        self.depth -= 1;
        stmt
    }

    fn parse_stmt_inner(&mut self) -> Result<Stmt, ParseError> {
        let line = self.current_line_u32();
        if self.match_kind(&TokenKind::Let) {
            return self.parse_let(line);
        }
        if self.match_kind(&TokenKind::If) {
            return self.parse_if(line);
        }
        if self.match_kind(&TokenKind::While) {
            return self.parse_while(line);
        }
        if self.match_kind(&TokenKind::For) {
            return self.parse_for_of(line);
        }
        if self.match_kind(&TokenKind::Break) {
            return self.parse_loop_control(line, true);
        }
        if self.match_kind(&TokenKind::Continue) {
            return self.parse_loop_control(line, false);
        }
        if self.match_kind(&TokenKind::Return) {
            let value = if self.check(&TokenKind::Semicolon)
                || self.check(&TokenKind::RBrace)
                || self.check(&TokenKind::Eof)
            {
                None
            } else {
                Some(self.parse_expr()?)
            };
            self.consume_terminator();
            return Ok(Stmt::Return { value, line });
        }

        let expr = self.parse_expr()?;
        let compound = if self.match_kind(&TokenKind::Equal) {
            Some(None)
        } else if self.match_kind(&TokenKind::PlusEqual) {
            Some(Some(BinaryOp::Add))
        } else if self.match_kind(&TokenKind::MinusEqual) {
            Some(Some(BinaryOp::Sub))
        } else {
            None
        };

        let Some(op) = compound else {
            self.consume_terminator();
            return Ok(Stmt::Expr { expr, line });
        };

        let rhs = self.parse_expr()?;
        let value = match op {
            Some(op) => Expr::Binary {
                op,
                lhs: Box::new(expr.clone()),
                rhs: Box::new(rhs),
            },
            None => rhs,
        };
        let place = into_place(expr, line as usize)?;
        self.consume_terminator();
        Ok(Stmt::Assign { place, value, line })
    }

    fn parse_let(&mut self, line: u32) -> Result<Stmt, ParseError> {
        let name = self.expect_ident("expected variable name after declaration keyword")?;
        let value = if self.match_kind(&TokenKind::Equal) {
            Some(self.parse_expr()?)
        } else {
            None
        };
        self.consume_terminator();
        Ok(Stmt::Let { name, value, line })
    }

    fn parse_if(&mut self, line: u32) -> Result<Stmt, ParseError> {
        self.expect(&TokenKind::LParen, "expected '(' after 'if'")?;
        let condition = self.parse_expr()?;
        self.expect(&TokenKind::RParen, "expected ')' after if condition")?;
        let then_branch = self.parse_body()?;
        let else_branch = if self.match_kind(&TokenKind::Else) {
            if self.check(&TokenKind::If) {
                let else_line = self.current_line_u32();
                self.pos += 1;
                self.enter()?;
                let nested = self.parse_if(else_line);
                self.depth -= 1;
                Some(vec![nested?])
            } else {
                Some(self.parse_body()?)
            }
        } else {
            None
        };
        Ok(Stmt::If {
            condition,
            then_branch,
            else_branch,
            line,
        })
    }

    fn parse_while(&mut self, line: u32) -> Result<Stmt, ParseError> {
        self.expect(&TokenKind::LParen, "expected '(' after 'while'")?;
        let condition = self.parse_expr()?;
        self.expect(&TokenKind::RParen, "expected ')' after while condition")?;
        self.loop_depth += 1;
        let body = self.parse_body();
        self.loop_depth -= 1;
        Ok(Stmt::While {
            condition,
            body: body?,
            line,
        })
    }

    fn parse_for_of(&mut self, line: u32) -> Result<Stmt, ParseError> {
        self.expect(&TokenKind::LParen, "expected '(' after 'for'")?;
        self.match_kind(&TokenKind::Let);
        let binding = self.expect_ident("expected loop variable name")?;
        match self.peek_kind() {
            Some(TokenKind::Ident(word)) if word == "of" => self.pos += 1,
            _ => {
                return Err(ParseError {
                    line: self.current_line(),
                    message: "expected 'of' in for loop; only 'for (x of items)' is supported"
                        .to_string(),
                });
            }
        }
        let iterable = self.parse_expr()?;
        self.expect(&TokenKind::RParen, "expected ')' after for-of header")?;
        self.loop_depth += 1;
        let body = self.parse_body();
        self.loop_depth -= 1;
        Ok(Stmt::ForOf {
            binding,
            iterable,
            body: body?,
            line,
        })
    }

    fn parse_loop_control(&mut self, line: u32, is_break: bool) -> Result<Stmt, ParseError> {
        if self.loop_depth == 0 {
            return Err(ParseError {
                line: line as usize,
                message: if is_break {
                    "'break' is only allowed inside loops".to_string()
                } else {
                    "'continue' is only allowed inside loops".to_string()
                },
            });
        }
        self.consume_terminator();
        Ok(if is_break {
            Stmt::Break { line }
        } else {
            Stmt::Continue { line }
        })
    }

    fn parse_body(&mut self) -> Result<Vec<Stmt>, ParseError> {
        if !self.match_kind(&TokenKind::LBrace) {
            return Ok(vec![self.parse_stmt()?]);
        }
        let mut stmts = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            if self.check(&TokenKind::Eof) {
                return Err(ParseError {
                    line: self.current_line(),
                    message: "expected '}' to close block".to_string(),
                });
            }
            stmts.push(self.parse_stmt()?);
        }
        self.expect(&TokenKind::RBrace, "expected '}' to close block")?;
        Ok(stmts)
    }

    fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.enter()?;
        let expr = self.parse_conditional();
        self.depth -= 1;
        expr
    }

    fn parse_conditional(&mut self) -> Result<Expr, ParseError> {
        let condition = self.parse_or()?;
        if !self.match_kind(&TokenKind::Question) {
            return Ok(condition);
        }
        let then_value = self.parse_expr()?;
        self.expect(&TokenKind::Colon, "expected ':' in conditional expression")?;
        let else_value = self.parse_expr()?;
        Ok(Expr::Conditional {
            condition: Box::new(condition),
            then_value: Box::new(then_value),
            else_value: Box::new(else_value),
        })
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_and()?;
        while self.match_kind(&TokenKind::PipePipe) {
            let rhs = self.parse_and()?;
            expr = Expr::Logical {
                op: LogicalOp::Or,
                lhs: Box::new(expr),
                rhs: Box::new(rhs),
            };
        }
        Ok(expr)
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_equality()?;
        while self.match_kind(&TokenKind::AmpersandAmpersand) {
            let rhs = self.parse_equality()?;
            expr = Expr::Logical {
                op: LogicalOp::And,
                lhs: Box::new(expr),
                rhs: Box::new(rhs),
            };
        }
        Ok(expr)
    }

    fn parse_equality(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_comparison()?;
        loop {
            let op = if self.match_kind(&TokenKind::EqualEqual)
                || self.match_kind(&TokenKind::EqualEqualEqual)
            {
                BinaryOp::Eq
            } else if self.match_kind(&TokenKind::BangEqual)
                || self.match_kind(&TokenKind::BangEqualEqual)
            {
                BinaryOp::NotEq
            } else {
                break;
            };
            let rhs = self.parse_comparison()?;
            expr = binary(op, expr, rhs);
        }
        Ok(expr)
    }

    fn parse_comparison(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_additive()?;
        loop {
            let op = if self.match_kind(&TokenKind::Less) {
                BinaryOp::Less
            } else if self.match_kind(&TokenKind::LessEqual) {
                BinaryOp::LessEq
            } else if self.match_kind(&TokenKind::Greater) {
                BinaryOp::Greater
            } else if self.match_kind(&TokenKind::GreaterEqual) {
                BinaryOp::GreaterEq
            } else {
                break;
            };
            let rhs = self.parse_additive()?;
            expr = binary(op, expr, rhs);
        }
        Ok(expr)
    }

    fn parse_additive(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_multiplicative()?;
        loop {
            let op = if self.match_kind(&TokenKind::Plus) {
                BinaryOp::Add
            } else if self.match_kind(&TokenKind::Minus) {
                BinaryOp::Sub
            } else {
                break;
            };
            let rhs = self.parse_multiplicative()?;
            expr = binary(op, expr, rhs);
        }
        Ok(expr)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_unary()?;
        loop {
            let op = if self.match_kind(&TokenKind::Star) {
                BinaryOp::Mul
            } else if self.match_kind(&TokenKind::Slash) {
                BinaryOp::Div
            } else if self.match_kind(&TokenKind::Percent) {
                BinaryOp::Rem
            } else {
                break;
            };
            let rhs = self.parse_unary()?;
            expr = binary(op, expr, rhs);
        }
        Ok(expr)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        let op = if self.match_kind(&TokenKind::Bang) {
            UnaryOp::Not
        } else if self.match_kind(&TokenKind::Minus) {
            UnaryOp::Neg
        } else {
            return self.parse_postfix();
        };
        self.enter()?;
        let operand = self.parse_unary();
        self.depth -= 1;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand?),
        })
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.match_kind(&TokenKind::Dot) {
                let property = self.expect_property_name()?;
                expr = Expr::Member {
                    object: Box::new(expr),
                    property,
                };
            } else if self.match_kind(&TokenKind::LBracket) {
                let index = self.parse_expr()?;
                self.expect(&TokenKind::RBracket, "expected ']' after index")?;
                expr = Expr::Index {
                    object: Box::new(expr),
                    index: Box::new(index),
                };
            } else if self.match_kind(&TokenKind::LParen) {
                let args = self.parse_call_args()?;
                expr = Expr::Call {
                    callee: Box::new(expr),
                    args,
                };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let Some(token) = self.tokens.get(self.pos).cloned() else {
            return Err(ParseError {
                line: self.current_line(),
                message: "unexpected end of input".to_string(),
            });
        };
        self.pos += 1;
        match token.kind {
            TokenKind::Number(value) => Ok(Expr::Number(value)),
            TokenKind::String(value) => Ok(Expr::String(value)),
            TokenKind::True => Ok(Expr::Bool(true)),
            TokenKind::False => Ok(Expr::Bool(false)),
            TokenKind::Null => Ok(Expr::Null),
            TokenKind::Ident(name) => Ok(Expr::Ident(name)),
            TokenKind::LParen => {
                let expr = self.parse_expr()?;
                self.expect(&TokenKind::RParen, "expected ')' after expression")?;
                Ok(expr)
            }
            TokenKind::LBracket => self.parse_array_literal(),
            TokenKind::LBrace => self.parse_object_literal(),
            other => Err(ParseError {
                line: token.line,
                message: format!("unexpected token {}", describe(&other)),
            }),
        }
    }

    fn parse_array_literal(&mut self) -> Result<Expr, ParseError> {
        let mut items = Vec::new();
        while !self.check(&TokenKind::RBracket) {
            items.push(self.parse_expr()?);
            if !self.match_kind(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RBracket, "expected ']' after array literal")?;
        Ok(Expr::Array(items))
    }

    fn parse_object_literal(&mut self) -> Result<Expr, ParseError> {
        let mut entries = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            let line = self.current_line();
            let (key, shorthand) = match self.peek_kind().cloned() {
                Some(TokenKind::Ident(name)) => (name, true),
                Some(TokenKind::String(value)) => (value, false),
                Some(TokenKind::Number(value)) => (value.to_string(), false),
                Some(other) if keyword_text(&other).is_some() => {
                    (keyword_text(&other).unwrap_or_default().to_string(), false)
                }
                _ => {
                    return Err(ParseError {
                        line,
                        message: "expected property name in object literal".to_string(),
                    });
                }
            };
            self.pos += 1;

            let value = if self.match_kind(&TokenKind::Colon) {
                self.parse_expr()?
            } else if shorthand {
                Expr::Ident(key.clone())
            } else {
                return Err(ParseError {
                    line,
                    message: format!("expected ':' after property '{key}'"),
                });
            };
            entries.push((key, value));
            if !self.match_kind(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RBrace, "expected '}' after object literal")?;
        Ok(Expr::Object(entries))
    }

    fn parse_call_args(&mut self) -> Result<Vec<Expr>, ParseError> {
        let mut args = Vec::new();
        while !self.check(&TokenKind::RParen) {
            args.push(self.parse_expr()?);
            if !self.match_kind(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RParen, "expected ')' after arguments")?;
        Ok(args)
    }

    fn enter(&mut self) -> Result<(), ParseError> {
        if self.depth >= self.max_depth {
            return Err(ParseError {
                line: self.current_line(),
                message: format!("nesting deeper than {} levels", self.max_depth),
            });
        }
        self.depth += 1;
        Ok(())
    }

    fn consume_terminator(&mut self) {
        while self.match_kind(&TokenKind::Semicolon) {}
    }

    fn expect(&mut self, kind: &TokenKind, message: &str) -> Result<(), ParseError> {
        if self.match_kind(kind) {
            Ok(())
        } else {
            Err(ParseError {
                line: self.current_line(),
                message: message.to_string(),
            })
        }
    }

    fn expect_ident(&mut self, message: &str) -> Result<String, ParseError> {
        match self.peek_kind() {
            Some(TokenKind::Ident(name)) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => Err(ParseError {
                line: self.current_line(),
                message: message.to_string(),
            }),
        }
    }

    fn expect_property_name(&mut self) -> Result<String, ParseError> {
        let name = match self.peek_kind() {
            Some(TokenKind::Ident(name)) => name.clone(),
            Some(other) => match keyword_text(other) {
                Some(text) => text.to_string(),
                None => {
                    return Err(ParseError {
                        line: self.current_line(),
                        message: "expected property name after '.'".to_string(),
                    });
                }
            },
            None => {
                return Err(ParseError {
                    line: self.current_line(),
                    message: "expected property name after '.'".to_string(),
                });
            }
        };
        self.pos += 1;
        Ok(name)
    }

    fn match_kind(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.peek_kind() == Some(kind)
    }

    fn peek_kind(&self) -> Option<&TokenKind> {
        self.tokens.get(self.pos).map(|token| &token.kind)
    }

    fn current_line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|token| token.line)
            .unwrap_or(1)
    }

    fn current_line_u32(&self) -> u32 {
        self.current_line() as u32
    }
}

fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}

fn into_place(expr: Expr, line: usize) -> Result<Place, ParseError> {
    let mut path = Vec::new();
    let mut current = expr;
    loop {
        match current {
            Expr::Ident(root) => {
                path.reverse();
                return Ok(Place { root, path });
            }
            Expr::Member { object, property } => {
                path.push(PathSegment::Key(property));
                current = *object;
            }
            Expr::Index { object, index } => {
                path.push(PathSegment::Index(*index));
                current = *object;
            }
            _ => {
                return Err(ParseError {
                    line,
                    message: "invalid assignment target".to_string(),
                });
            }
        }
    }
}

fn keyword_text(kind: &TokenKind) -> Option<&'static str> {
    Some(match kind {
        TokenKind::Let => "let",
        TokenKind::If => "if",
        TokenKind::Else => "else",
        TokenKind::While => "while",
        TokenKind::For => "for",
        TokenKind::Break => "break",
        TokenKind::Continue => "continue",
        TokenKind::Return => "return",
        TokenKind::True => "true",
        TokenKind::False => "false",
        TokenKind::Null => "null",
        _ => return None,
    })
}

fn describe(kind: &TokenKind) -> String {
    match kind {
        TokenKind::Eof => "end of input".to_string(),
        TokenKind::Ident(name) => format!("identifier '{name}'"),
        other => match keyword_text(other) {
            Some(text) => format!("keyword '{text}'"),
            None => format!("{other:?}"),
        },
    }
}
