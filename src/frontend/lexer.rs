//! Lexer for the module-script dialect.
//!
//! Produces a flat token stream with 1-based line/column positions.
//! Template literals are lexed whole: the quasi fragments are cooked
//! here and each `${...}` interpolation is captured as raw source text
//! for the parser to sub-parse.

use super::ast::Span;
use super::ParseError;

/// Token kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    Ident(String),
    Num(f64),
    Str(String),
    Template { quasis: Vec<String>, exprs: Vec<String> },
    Punct(&'static str),
    Eof,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub tok: Tok,
    pub span: Span,
}

/// Multi-character punctuators, longest first so maximal munch wins.
const PUNCTS: [&str; 34] = [
    "===", "!==", ">>>", "=>", "==", "!=", "<=", ">=", "<<", ">>", "&&", "||", "(", ")", "{", "}",
    "[", "]", ",", ";", ":", ".", "?", "=", "!", "<", ">", "+", "-", "*", "/", "%", "&", "|",
];

pub struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: u32,
    col: u32,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            col: 1,
        }
    }

    /// Lex the entire input.
    pub fn tokenize(mut self) -> Result<Vec<Token>, ParseError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_trivia()?;
            let span = Span::new(self.line, self.col);
            let Some(c) = self.peek() else {
                tokens.push(Token { tok: Tok::Eof, span });
                return Ok(tokens);
            };
            let tok = if c.is_ascii_digit() || (c == '.' && self.peek_at(1).is_some_and(|d| d.is_ascii_digit())) {
                self.lex_number(span)?
            } else if c == '"' || c == '\'' {
                self.lex_string(span)?
            } else if c == '`' {
                self.lex_template(span)?
            } else if is_ident_start(c) {
                self.lex_ident()
            } else {
                self.lex_punct(span)?
            };
            tokens.push(Token { tok, span });
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.pos + ahead).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn error(&self, span: Span, message: impl Into<String>) -> ParseError {
        ParseError {
            line: span.line,
            col: span.col,
            message: message.into(),
        }
    }

    fn skip_trivia(&mut self) -> Result<(), ParseError> {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('/') if self.peek_at(1) == Some('/') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                Some('/') if self.peek_at(1) == Some('*') => {
                    let span = Span::new(self.line, self.col);
                    self.bump();
                    self.bump();
                    loop {
                        match self.peek() {
                            Some('*') if self.peek_at(1) == Some('/') => {
                                self.bump();
                                self.bump();
                                break;
                            }
                            Some(_) => {
                                self.bump();
                            }
                            None => return Err(self.error(span, "unterminated block comment")),
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn lex_ident(&mut self) -> Tok {
        let mut name = String::new();
        while let Some(c) = self.peek() {
            if is_ident_continue(c) {
                name.push(c);
                self.bump();
            } else {
                break;
            }
        }
        Tok::Ident(name)
    }

    fn lex_number(&mut self, span: Span) -> Result<Tok, ParseError> {
        let mut text = String::new();
        if self.peek() == Some('0') {
            match self.peek_at(1) {
                Some('x') | Some('X') => return self.lex_radix(span, 16),
                Some('o') | Some('O') => return self.lex_radix(span, 8),
                Some('b') | Some('B') => return self.lex_radix(span, 2),
                _ => {}
            }
        }
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || c == '.' {
                text.push(c);
                self.bump();
            } else if c == 'e' || c == 'E' {
                text.push(c);
                self.bump();
                if let Some(sign @ ('+' | '-')) = self.peek() {
                    text.push(sign);
                    self.bump();
                }
            } else {
                break;
            }
        }
        text.parse::<f64>()
            .map(Tok::Num)
            .map_err(|_| self.error(span, format!("invalid number literal: {text}")))
    }

    fn lex_radix(&mut self, span: Span, radix: u32) -> Result<Tok, ParseError> {
        self.bump();
        self.bump();
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if c.is_digit(radix) {
                text.push(c);
                self.bump();
            } else {
                break;
            }
        }
        u64::from_str_radix(&text, radix)
            .map(|v| Tok::Num(v as f64))
            .map_err(|_| self.error(span, format!("invalid numeric literal with radix {radix}")))
    }

    fn lex_string(&mut self, span: Span) -> Result<Tok, ParseError> {
        let quote = self.bump().unwrap_or('"');
        let mut value = String::new();
        loop {
            match self.bump() {
                Some(c) if c == quote => return Ok(Tok::Str(value)),
                Some('\\') => value.push(self.lex_escape(span)?),
                Some('\n') | None => return Err(self.error(span, "unterminated string literal")),
                Some(c) => value.push(c),
            }
        }
    }

    fn lex_escape(&mut self, span: Span) -> Result<char, ParseError> {
        match self.bump() {
            Some('n') => Ok('\n'),
            Some('t') => Ok('\t'),
            Some('r') => Ok('\r'),
            Some('0') => Ok('\0'),
            Some('x') => {
                let hi = self.bump();
                let lo = self.bump();
                let (Some(hi), Some(lo)) = (hi, lo) else {
                    return Err(self.error(span, "truncated \\x escape"));
                };
                let code = u32::from_str_radix(&format!("{hi}{lo}"), 16)
                    .map_err(|_| self.error(span, "invalid \\x escape"))?;
                char::from_u32(code).ok_or_else(|| self.error(span, "invalid \\x escape"))
            }
            Some('u') => {
                let mut code = String::new();
                if self.peek() == Some('{') {
                    self.bump();
                    while let Some(c) = self.peek() {
                        if c == '}' {
                            self.bump();
                            break;
                        }
                        code.push(c);
                        self.bump();
                    }
                } else {
                    for _ in 0..4 {
                        if let Some(c) = self.bump() {
                            code.push(c);
                        }
                    }
                }
                let code = u32::from_str_radix(&code, 16)
                    .map_err(|_| self.error(span, "invalid \\u escape"))?;
                char::from_u32(code).ok_or_else(|| self.error(span, "invalid \\u escape"))
            }
            Some(c) => Ok(c),
            None => Err(self.error(span, "truncated escape sequence")),
        }
    }

    /// Lex a whole template literal. Interpolation bodies are captured
    /// as raw source text; nested template literals inside an
    /// interpolation are not supported.
    fn lex_template(&mut self, span: Span) -> Result<Tok, ParseError> {
        self.bump(); // opening backtick
        let mut quasis = vec![String::new()];
        let mut exprs = Vec::new();
        loop {
            match self.peek() {
                None => return Err(self.error(span, "unterminated template literal")),
                Some('`') => {
                    self.bump();
                    return Ok(Tok::Template { quasis, exprs });
                }
                Some('\\') => {
                    self.bump();
                    let c = self.lex_escape(span)?;
                    if let Some(q) = quasis.last_mut() {
                        q.push(c);
                    }
                }
                Some('$') if self.peek_at(1) == Some('{') => {
                    self.bump();
                    self.bump();
                    exprs.push(self.lex_interpolation(span)?);
                    quasis.push(String::new());
                }
                Some(c) => {
                    self.bump();
                    if let Some(q) = quasis.last_mut() {
                        q.push(c);
                    }
                }
            }
        }
    }

    /// Capture the raw source of one `${...}` body, honoring nested
    /// braces and skipping over string literals.
    fn lex_interpolation(&mut self, span: Span) -> Result<String, ParseError> {
        let mut depth = 1usize;
        let mut raw = String::new();
        loop {
            match self.peek() {
                None => return Err(self.error(span, "unterminated template interpolation")),
                Some('{') => {
                    depth += 1;
                    raw.push('{');
                    self.bump();
                }
                Some('}') => {
                    depth -= 1;
                    self.bump();
                    if depth == 0 {
                        return Ok(raw);
                    }
                    raw.push('}');
                }
                Some(q @ ('"' | '\'')) => {
                    raw.push(q);
                    self.bump();
                    loop {
                        match self.bump() {
                            Some('\\') => {
                                raw.push('\\');
                                if let Some(c) = self.bump() {
                                    raw.push(c);
                                }
                            }
                            Some(c) => {
                                raw.push(c);
                                if c == q {
                                    break;
                                }
                            }
                            None => {
                                return Err(self.error(span, "unterminated template interpolation"))
                            }
                        }
                    }
                }
                Some(c) => {
                    raw.push(c);
                    self.bump();
                }
            }
        }
    }

    fn lex_punct(&mut self, span: Span) -> Result<Tok, ParseError> {
        for punct in PUNCTS {
            if self.matches(punct) {
                for _ in 0..punct.chars().count() {
                    self.bump();
                }
                return Ok(Tok::Punct(punct));
            }
        }
        // '~' is its own token; kept out of the table to keep it tidy.
        if self.peek() == Some('~') {
            self.bump();
            return Ok(Tok::Punct("~"));
        }
        Err(self.error(
            span,
            format!("unexpected character: {:?}", self.peek().unwrap_or('\0')),
        ))
    }

    fn matches(&self, punct: &str) -> bool {
        punct
            .chars()
            .enumerate()
            .all(|(i, c)| self.peek_at(i) == Some(c))
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(src: &str) -> Vec<Tok> {
        Lexer::new(src)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.tok)
            .collect()
    }

    #[test]
    fn test_lex_idents_and_puncts() {
        let toks = lex("AKM.module({});");
        assert_eq!(
            toks,
            vec![
                Tok::Ident("AKM".into()),
                Tok::Punct("."),
                Tok::Ident("module".into()),
                Tok::Punct("("),
                Tok::Punct("{"),
                Tok::Punct("}"),
                Tok::Punct(")"),
                Tok::Punct(";"),
                Tok::Eof,
            ]
        );
    }

    #[test]
    fn test_lex_numbers() {
        assert_eq!(lex("42")[0], Tok::Num(42.0));
        assert_eq!(lex("3.5")[0], Tok::Num(3.5));
        assert_eq!(lex("0x800")[0], Tok::Num(2048.0));
        assert_eq!(lex("0b101")[0], Tok::Num(5.0));
        assert_eq!(lex("1e3")[0], Tok::Num(1000.0));
    }

    #[test]
    fn test_lex_strings_with_escapes() {
        assert_eq!(lex(r#""a\nb""#)[0], Tok::Str("a\nb".into()));
        assert_eq!(lex(r#"'it\'s'"#)[0], Tok::Str("it's".into()));
    }

    #[test]
    fn test_lex_template_plain() {
        assert_eq!(
            lex("`hello world`")[0],
            Tok::Template {
                quasis: vec!["hello world".into()],
                exprs: vec![]
            }
        );
    }

    #[test]
    fn test_lex_template_interpolated() {
        assert_eq!(
            lex("`v=${x + 1}!`")[0],
            Tok::Template {
                quasis: vec!["v=".into(), "!".into()],
                exprs: vec!["x + 1".into()]
            }
        );
    }

    #[test]
    fn test_lex_comments_skipped() {
        let toks = lex("1 // line\n/* block */ 2");
        assert_eq!(toks, vec![Tok::Num(1.0), Tok::Num(2.0), Tok::Eof]);
    }

    #[test]
    fn test_lex_maximal_munch() {
        assert_eq!(lex("===")[0], Tok::Punct("==="));
        assert_eq!(lex(">>>")[0], Tok::Punct(">>>"));
        assert_eq!(lex("=>")[0], Tok::Punct("=>"));
    }

    #[test]
    fn test_lex_error_position() {
        let err = Lexer::new("let x = @").tokenize().unwrap_err();
        assert_eq!((err.line, err.col), (1, 9));
    }
}
