//! Recursive-descent parser for the module-script dialect.
//!
//! Builds the tagged AST in [`super::ast`] from the lexer's token
//! stream. The grammar is the ES 2020 subset the compiler recognizes:
//! function declarations (optionally exported), variable declarations,
//! `export { ... }` lists, expression/return/if/while/for statements,
//! and an expression grammar with standard operator precedence,
//! member access, calls, object/array literals, template literals,
//! and function/arrow expressions.

use super::ast::{
    BinaryOp, DeclKind, Declarator, Expr, FuncLit, MemberProp, SourceFile, Span, Stmt, UnaryOp,
};
use super::lexer::{Lexer, Tok, Token};
use super::ParseError;

/// Parse a complete source file.
pub fn parse_source(source: &str) -> Result<SourceFile, ParseError> {
    let tokens = Lexer::new(source).tokenize()?;
    let mut parser = Parser { tokens, pos: 0 };
    let mut body = Vec::new();
    while !parser.at_eof() {
        body.push(parser.parse_stmt()?);
    }
    Ok(SourceFile { body })
}

/// Parse a standalone expression (template interpolations).
fn parse_expr_source(source: &str, span: Span) -> Result<Expr, ParseError> {
    let tokens = Lexer::new(source).tokenize().map_err(|e| ParseError {
        line: span.line,
        col: span.col,
        message: format!("in template interpolation: {}", e.message),
    })?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_assignment()?;
    if !parser.at_eof() {
        return Err(parser.err_here("trailing tokens in template interpolation"));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_at(&self, ahead: usize) -> &Token {
        &self.tokens[(self.pos + ahead).min(self.tokens.len() - 1)]
    }

    fn bump(&mut self) -> Token {
        let tok = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek().tok, Tok::Eof)
    }

    fn span(&self) -> Span {
        self.peek().span
    }

    fn err_here(&self, message: impl Into<String>) -> ParseError {
        let span = self.span();
        ParseError {
            line: span.line,
            col: span.col,
            message: message.into(),
        }
    }

    fn at_punct(&self, p: &str) -> bool {
        matches!(&self.peek().tok, Tok::Punct(q) if *q == p)
    }

    fn eat_punct(&mut self, p: &str) -> bool {
        if self.at_punct(p) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, p: &str) -> Result<(), ParseError> {
        if self.eat_punct(p) {
            Ok(())
        } else {
            Err(self.err_here(format!("expected `{p}`, found {}", describe(&self.peek().tok))))
        }
    }

    fn at_keyword(&self, kw: &str) -> bool {
        matches!(&self.peek().tok, Tok::Ident(name) if name == kw)
    }

    fn eat_keyword(&mut self, kw: &str) -> bool {
        if self.at_keyword(kw) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect_ident(&mut self) -> Result<(String, Span), ParseError> {
        let span = self.span();
        match self.bump().tok {
            Tok::Ident(name) => Ok((name, span)),
            other => Err(ParseError {
                line: span.line,
                col: span.col,
                message: format!("expected identifier, found {}", describe(&other)),
            }),
        }
    }

    // ----- statements ------------------------------------------------

    fn parse_stmt(&mut self) -> Result<Stmt, ParseError> {
        let span = self.span();
        match &self.peek().tok {
            Tok::Punct(";") => {
                self.bump();
                Ok(Stmt::Empty { span })
            }
            Tok::Punct("{") => {
                let body = self.parse_block()?;
                Ok(Stmt::Block { body, span })
            }
            Tok::Ident(name) => match name.as_str() {
                "function" => self.parse_func_decl(false),
                "export" => self.parse_export(),
                "let" | "const" | "var" => self.parse_var_decl(),
                "return" => self.parse_return(),
                "if" => self.parse_if(),
                "while" => self.parse_while(),
                "for" => self.parse_for(),
                "break" => {
                    self.bump();
                    self.eat_punct(";");
                    Ok(Stmt::Break { span })
                }
                "continue" => {
                    self.bump();
                    self.eat_punct(";");
                    Ok(Stmt::Continue { span })
                }
                _ => self.parse_expr_stmt(),
            },
            _ => self.parse_expr_stmt(),
        }
    }

    fn parse_expr_stmt(&mut self) -> Result<Stmt, ParseError> {
        let span = self.span();
        let expr = self.parse_assignment()?;
        self.eat_punct(";");
        Ok(Stmt::Expr { expr, span })
    }

    fn parse_block(&mut self) -> Result<Vec<Stmt>, ParseError> {
        self.expect_punct("{")?;
        let mut body = Vec::new();
        while !self.at_punct("}") {
            if self.at_eof() {
                return Err(self.err_here("unterminated block"));
            }
            body.push(self.parse_stmt()?);
        }
        self.expect_punct("}")?;
        Ok(body)
    }

    fn parse_func_decl(&mut self, exported: bool) -> Result<Stmt, ParseError> {
        let span = self.span();
        self.bump(); // `function`
        let (name, _) = self.expect_ident()?;
        let params = self.parse_params()?;
        let body = self.parse_block()?;
        Ok(Stmt::FuncDecl {
            name,
            func: FuncLit { params, body },
            exported,
            span,
        })
    }

    fn parse_export(&mut self) -> Result<Stmt, ParseError> {
        let span = self.span();
        self.bump(); // `export`
        if self.at_keyword("function") {
            return self.parse_func_decl(true);
        }
        if self.at_punct("{") {
            self.bump();
            let mut names = Vec::new();
            while !self.at_punct("}") {
                let (name, _) = self.expect_ident()?;
                names.push(name);
                if !self.eat_punct(",") {
                    break;
                }
            }
            self.expect_punct("}")?;
            self.eat_punct(";");
            return Ok(Stmt::ExportNamed { names, span });
        }
        Err(self.err_here("unsupported export form"))
    }

    fn parse_var_decl(&mut self) -> Result<Stmt, ParseError> {
        let span = self.span();
        let kind = match self.bump().tok {
            Tok::Ident(k) if k == "const" => DeclKind::Const,
            Tok::Ident(k) if k == "var" => DeclKind::Var,
            _ => DeclKind::Let,
        };
        let mut decls = Vec::new();
        loop {
            if self.at_punct("{") || self.at_punct("[") {
                return Err(self.err_here("destructuring patterns are not supported"));
            }
            let (name, _) = self.expect_ident()?;
            let init = if self.eat_punct("=") {
                Some(self.parse_assignment()?)
            } else {
                None
            };
            decls.push(Declarator { name, init });
            if !self.eat_punct(",") {
                break;
            }
        }
        self.eat_punct(";");
        Ok(Stmt::VarDecl { kind, decls, span })
    }

    fn parse_return(&mut self) -> Result<Stmt, ParseError> {
        let span = self.span();
        self.bump(); // `return`
        let value = if self.at_punct(";") || self.at_punct("}") || self.at_eof() {
            None
        } else {
            Some(self.parse_assignment()?)
        };
        self.eat_punct(";");
        Ok(Stmt::Return { value, span })
    }

    fn parse_if(&mut self) -> Result<Stmt, ParseError> {
        let span = self.span();
        self.bump(); // `if`
        self.expect_punct("(")?;
        let cond = self.parse_assignment()?;
        self.expect_punct(")")?;
        let then = self.parse_stmt_as_block()?;
        let other = if self.eat_keyword("else") {
            Some(self.parse_stmt_as_block()?)
        } else {
            None
        };
        Ok(Stmt::If {
            cond,
            then,
            other,
            span,
        })
    }

    fn parse_while(&mut self) -> Result<Stmt, ParseError> {
        let span = self.span();
        self.bump(); // `while`
        self.expect_punct("(")?;
        let cond = self.parse_assignment()?;
        self.expect_punct(")")?;
        let body = self.parse_stmt_as_block()?;
        Ok(Stmt::While { cond, body, span })
    }

    fn parse_for(&mut self) -> Result<Stmt, ParseError> {
        let span = self.span();
        self.bump(); // `for`
        self.expect_punct("(")?;
        let init = if self.at_punct(";") {
            None
        } else if self.at_keyword("let") || self.at_keyword("const") || self.at_keyword("var") {
            Some(Box::new(self.parse_var_decl()?))
        } else {
            let stmt = self.parse_expr_stmt()?;
            Some(Box::new(stmt))
        };
        // `parse_var_decl`/`parse_expr_stmt` already consumed the `;`
        // when present; tolerate either shape.
        if init.is_none() {
            self.expect_punct(";")?;
        }
        let cond = if self.at_punct(";") {
            None
        } else {
            Some(self.parse_assignment()?)
        };
        self.expect_punct(";")?;
        let update = if self.at_punct(")") {
            None
        } else {
            Some(self.parse_assignment()?)
        };
        self.expect_punct(")")?;
        let body = self.parse_stmt_as_block()?;
        Ok(Stmt::For {
            init,
            cond,
            update,
            body,
            span,
        })
    }

    /// A loop/branch body: a block, or a single statement wrapped in one.
    fn parse_stmt_as_block(&mut self) -> Result<Vec<Stmt>, ParseError> {
        if self.at_punct("{") {
            self.parse_block()
        } else {
            Ok(vec![self.parse_stmt()?])
        }
    }

    fn parse_params(&mut self) -> Result<Vec<String>, ParseError> {
        self.expect_punct("(")?;
        let mut params = Vec::new();
        while !self.at_punct(")") {
            if self.at_punct(".") {
                return Err(self.err_here("rest parameters are not supported"));
            }
            let (name, _) = self.expect_ident()?;
            // Pattern defaults are accepted; the default value is dropped.
            if self.eat_punct("=") {
                self.parse_assignment()?;
            }
            params.push(name);
            if !self.eat_punct(",") {
                break;
            }
        }
        self.expect_punct(")")?;
        Ok(params)
    }

    // ----- expressions -----------------------------------------------

    fn parse_assignment(&mut self) -> Result<Expr, ParseError> {
        if let Some(arrow) = self.try_parse_arrow()? {
            return Ok(arrow);
        }
        let span = self.span();
        let expr = self.parse_conditional()?;
        if self.at_punct("=") {
            self.bump();
            match expr {
                Expr::Ident { .. } | Expr::Member { .. } => {
                    let value = self.parse_assignment()?;
                    return Ok(Expr::Assign {
                        target: Box::new(expr),
                        value: Box::new(value),
                        span,
                    });
                }
                _ => return Err(self.err_here("invalid assignment target")),
            }
        }
        Ok(expr)
    }

    /// Detect `x => ...`, `() => ...`, and `(a, b) => ...` with token
    /// lookahead; returns `None` when the cursor is not at an arrow.
    fn try_parse_arrow(&mut self) -> Result<Option<Expr>, ParseError> {
        let span = self.span();
        let is_arrow = match &self.peek().tok {
            Tok::Ident(name) if !is_reserved(name) => {
                matches!(self.peek_at(1).tok, Tok::Punct("=>"))
            }
            Tok::Punct("(") => {
                let mut depth = 0usize;
                let mut i = 0usize;
                loop {
                    match &self.peek_at(i).tok {
                        Tok::Punct("(") => depth += 1,
                        Tok::Punct(")") => {
                            depth -= 1;
                            if depth == 0 {
                                break matches!(self.peek_at(i + 1).tok, Tok::Punct("=>"));
                            }
                        }
                        Tok::Eof => break false,
                        _ => {}
                    }
                    i += 1;
                }
            }
            _ => false,
        };
        if !is_arrow {
            return Ok(None);
        }
        let params = if self.at_punct("(") {
            self.parse_params()?
        } else {
            vec![self.expect_ident()?.0]
        };
        self.expect_punct("=>")?;
        let body = if self.at_punct("{") {
            self.parse_block()?
        } else {
            // Concise body: the expression is the return value.
            let value = self.parse_assignment()?;
            vec![Stmt::Return {
                value: Some(value),
                span,
            }]
        };
        Ok(Some(Expr::Func {
            func: FuncLit { params, body },
            span,
        }))
    }

    fn parse_conditional(&mut self) -> Result<Expr, ParseError> {
        let span = self.span();
        let cond = self.parse_binary(1)?;
        if self.eat_punct("?") {
            let then = self.parse_assignment()?;
            self.expect_punct(":")?;
            let other = self.parse_assignment()?;
            return Ok(Expr::Cond {
                cond: Box::new(cond),
                then: Box::new(then),
                other: Box::new(other),
                span,
            });
        }
        Ok(cond)
    }

    fn parse_binary(&mut self, min_prec: u8) -> Result<Expr, ParseError> {
        let span = self.span();
        let mut left = self.parse_unary()?;
        loop {
            let Some((op, prec)) = self.peek_binary_op() else {
                return Ok(left);
            };
            if prec < min_prec {
                return Ok(left);
            }
            self.bump();
            let right = self.parse_binary(prec + 1)?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
                span,
            };
        }
    }

    fn peek_binary_op(&self) -> Option<(BinaryOp, u8)> {
        let Tok::Punct(p) = &self.peek().tok else {
            return None;
        };
        Some(match *p {
            "||" => (BinaryOp::LogicalOr, 1),
            "&&" => (BinaryOp::LogicalAnd, 2),
            "|" => (BinaryOp::BitOr, 3),
            "^" => (BinaryOp::BitXor, 4),
            "&" => (BinaryOp::BitAnd, 5),
            "==" => (BinaryOp::Eq, 6),
            "!=" => (BinaryOp::Ne, 6),
            "===" => (BinaryOp::StrictEq, 6),
            "!==" => (BinaryOp::StrictNe, 6),
            "<" => (BinaryOp::Lt, 7),
            "<=" => (BinaryOp::Le, 7),
            ">" => (BinaryOp::Gt, 7),
            ">=" => (BinaryOp::Ge, 7),
            "<<" => (BinaryOp::Shl, 8),
            ">>" => (BinaryOp::Shr, 8),
            ">>>" => (BinaryOp::UShr, 8),
            "+" => (BinaryOp::Add, 9),
            "-" => (BinaryOp::Sub, 9),
            "*" => (BinaryOp::Mul, 10),
            "/" => (BinaryOp::Div, 10),
            "%" => (BinaryOp::Mod, 10),
            _ => return None,
        })
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        let span = self.span();
        let op = match &self.peek().tok {
            Tok::Punct("-") => Some(UnaryOp::Neg),
            Tok::Punct("+") => Some(UnaryOp::Plus),
            Tok::Punct("!") => Some(UnaryOp::Not),
            Tok::Punct("~") => Some(UnaryOp::BitNot),
            _ => None,
        };
        if let Some(op) = op {
            self.bump();
            let expr = self.parse_unary()?;
            return Ok(Expr::Unary {
                op,
                expr: Box::new(expr),
                span,
            });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_primary()?;
        loop {
            let span = self.span();
            if self.eat_punct(".") {
                let (name, _) = self.expect_ident()?;
                expr = Expr::Member {
                    object: Box::new(expr),
                    prop: MemberProp::Dot(name),
                    span,
                };
            } else if self.eat_punct("[") {
                let index = self.parse_assignment()?;
                self.expect_punct("]")?;
                expr = Expr::Member {
                    object: Box::new(expr),
                    prop: MemberProp::Index(Box::new(index)),
                    span,
                };
            } else if self.at_punct("(") {
                let args = self.parse_args()?;
                expr = Expr::Call {
                    callee: Box::new(expr),
                    args,
                    span,
                };
            } else {
                return Ok(expr);
            }
        }
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>, ParseError> {
        self.expect_punct("(")?;
        let mut args = Vec::new();
        while !self.at_punct(")") {
            args.push(self.parse_assignment()?);
            if !self.eat_punct(",") {
                break;
            }
        }
        self.expect_punct(")")?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let span = self.span();
        match self.peek().tok.clone() {
            Tok::Num(value) => {
                self.bump();
                Ok(Expr::Num { value, span })
            }
            Tok::Str(value) => {
                self.bump();
                Ok(Expr::Str { value, span })
            }
            Tok::Template { quasis, exprs } => {
                self.bump();
                let exprs = exprs
                    .iter()
                    .map(|raw| parse_expr_source(raw, span))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Expr::Template { quasis, exprs, span })
            }
            Tok::Ident(name) => match name.as_str() {
                "true" => {
                    self.bump();
                    Ok(Expr::Bool { value: true, span })
                }
                "false" => {
                    self.bump();
                    Ok(Expr::Bool { value: false, span })
                }
                "null" | "undefined" => {
                    self.bump();
                    Ok(Expr::Null { span })
                }
                "function" => {
                    self.bump();
                    // Function expressions may carry a name; it is not
                    // bound anywhere, so it is dropped.
                    if matches!(self.peek().tok, Tok::Ident(_)) && !self.at_punct("(") {
                        self.bump();
                    }
                    let params = self.parse_params()?;
                    let body = self.parse_block()?;
                    Ok(Expr::Func {
                        func: FuncLit { params, body },
                        span,
                    })
                }
                _ => {
                    self.bump();
                    Ok(Expr::Ident { name, span })
                }
            },
            Tok::Punct("(") => {
                self.bump();
                let expr = self.parse_assignment()?;
                self.expect_punct(")")?;
                Ok(expr)
            }
            Tok::Punct("[") => {
                self.bump();
                let mut elems = Vec::new();
                while !self.at_punct("]") {
                    elems.push(self.parse_assignment()?);
                    if !self.eat_punct(",") {
                        break;
                    }
                }
                self.expect_punct("]")?;
                Ok(Expr::Array { elems, span })
            }
            Tok::Punct("{") => {
                self.bump();
                let mut props = Vec::new();
                while !self.at_punct("}") {
                    let key = self.parse_prop_key()?;
                    if self.eat_punct(":") {
                        let value = self.parse_assignment()?;
                        props.push((key, value));
                    } else {
                        // Shorthand `{ name }`.
                        let value = Expr::Ident {
                            name: key.clone(),
                            span,
                        };
                        props.push((key, value));
                    }
                    if !self.eat_punct(",") {
                        break;
                    }
                }
                self.expect_punct("}")?;
                Ok(Expr::Object { props, span })
            }
            other => Err(self.err_here(format!("unexpected {}", describe(&other)))),
        }
    }

    fn parse_prop_key(&mut self) -> Result<String, ParseError> {
        let span = self.span();
        match self.bump().tok {
            Tok::Ident(name) => Ok(name),
            Tok::Str(s) => Ok(s),
            Tok::Num(n) => Ok(format_number(n)),
            other => Err(ParseError {
                line: span.line,
                col: span.col,
                message: format!("invalid object key: {}", describe(&other)),
            }),
        }
    }
}

fn is_reserved(name: &str) -> bool {
    matches!(
        name,
        "function"
            | "return"
            | "let"
            | "const"
            | "var"
            | "if"
            | "else"
            | "while"
            | "for"
            | "break"
            | "continue"
            | "export"
            | "true"
            | "false"
            | "null"
            | "undefined"
    )
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

fn describe(tok: &Tok) -> String {
    match tok {
        Tok::Ident(name) => format!("identifier `{name}`"),
        Tok::Num(n) => format!("number {n}"),
        Tok::Str(_) => "string literal".to_string(),
        Tok::Template { .. } => "template literal".to_string(),
        Tok::Punct(p) => format!("`{p}`"),
        Tok::Eof => "end of input".to_string(),
    }
}
