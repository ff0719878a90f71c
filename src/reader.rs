use logos::{Logos, Span};
use rustc_hash::FxHashMap;

use crate::error::{ReadError, SourceError};
use crate::interner;
use crate::value::Value;

//===----------------------------------------------------------------------===//
// Token
//
// Tokenized with logos; the lexer owns all the character-level decisions so
// the parser below only deals in token shapes.
//===----------------------------------------------------------------------===//

fn unescape_string(s: &str) -> String {
    let mut result = String::new();
    let mut chars = s.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            match chars.next() {
                Some('n') => result.push('\n'),
                Some('t') => result.push('\t'),
                Some('r') => result.push('\r'),
                Some('"') => result.push('"'),
                Some('\\') => result.push('\\'),
                Some(other) => {
                    result.push('\\');
                    result.push(other);
                }
                None => result.push('\\'),
            }
        } else {
            result.push(ch);
        }
    }
    result
}

fn named_char(name: &str) -> Option<char> {
    let mut chars = name.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Some(c),
        _ => match name {
            "space" => Some(' '),
            "newline" => Some('\n'),
            "tab" => Some('\t'),
            _ => None,
        },
    }
}

#[derive(Logos, Debug, PartialEq, Clone)]
pub enum Token {
    // Whitespace and line comments never reach the parser.
    #[regex(r"[ \t\r\n]+", logos::skip)]
    #[regex(r";[^\n]*", logos::skip)]
    #[token("(")]
    LParen,

    #[token(")")]
    RParen,

    #[token("'")]
    Quote,

    #[token("#(")]
    VecOpen,

    #[token(".", priority = 10)]
    Dot,

    #[token("#t")]
    True,

    #[token("#f")]
    False,

    // Character literals: #\a, plus the named forms #\space, #\newline,
    // #\tab.
    #[regex(r"#\\[A-Za-z0-9]+", |lex| named_char(&lex.slice()[2..]))]
    #[regex(r"#\\.", priority = 2, callback = |lex| lex.slice().chars().nth(2))]
    Char(char),

    #[regex(r#""([^"\\]|\\.)*""#, callback = |lex| {
        let slice = lex.slice();
        unescape_string(&slice[1..slice.len() - 1])
    })]
    Str(String),

    // A string that runs to end of input without a closing quote. Kept as
    // its own token so the parser can report it precisely.
    #[regex(r#""([^"\\]|\\.)*"#, priority = 0, callback = |lex| lex.slice().to_owned())]
    UnterminatedStr(String),

    #[regex(r"-?[0-9]+", priority = 5, callback = |lex| lex.slice().parse::<i64>().ok())]
    Int(i64),

    #[regex(r"-?[0-9]+\.[0-9]+", priority = 6, callback = |lex| lex.slice().parse::<f64>().ok())]
    Float(f64),

    #[regex(r"[A-Za-z0-9!$%&*/:<=>?^_~+.@-]+", priority = 3, callback = |lex| lex.slice().to_owned())]
    Symbol(String),
}

//===----------------------------------------------------------------------===//
// Reader
//===----------------------------------------------------------------------===//

/// Parse a whole source string into the expressions it contains.
///
/// Symbols fold to lower case unless `case_sensitive` is set. A symbol whose
/// spelling is registered in `constants` reads as the registered value
/// instead (reader-constant substitution).
pub fn read_all(
    source: &str,
    case_sensitive: bool,
    constants: &FxHashMap<String, Value>,
) -> Result<Vec<Value>, SourceError> {
    let mut tokens = Vec::new();
    let mut lexer = Token::lexer(source);
    while let Some(item) = lexer.next() {
        match item {
            Ok(token) => tokens.push((token, lexer.span())),
            Err(()) => {
                return Err(SourceError {
                    error: ReadError::InvalidToken { text: lexer.slice().to_string() },
                    span: lexer.span(),
                    source: source.to_string(),
                });
            }
        }
    }
    let mut reader = Reader { tokens, pos: 0, source, case_sensitive, constants };
    let mut out = Vec::new();
    while !reader.at_end() {
        out.push(reader.parse_expr()?);
    }
    Ok(out)
}

struct Reader<'a> {
    tokens: Vec<(Token, Span)>,
    pos: usize,
    source: &'a str,
    case_sensitive: bool,
    constants: &'a FxHashMap<String, Value>,
}

impl<'a> Reader<'a> {
    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn next(&mut self) -> Option<(Token, Span)> {
        let item = self.tokens.get(self.pos).cloned();
        if item.is_some() {
            self.pos += 1;
        }
        item
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn eof_span(&self) -> Span {
        self.source.len()..self.source.len()
    }

    fn fail(&self, error: ReadError, span: Span) -> SourceError {
        SourceError { error, span, source: self.source.to_string() }
    }

    fn parse_expr(&mut self) -> Result<Value, SourceError> {
        let Some((token, span)) = self.next() else {
            return Err(self.fail(
                ReadError::UnexpectedEof { expected: "an expression".to_string() },
                self.eof_span(),
            ));
        };
        match token {
            Token::LParen => self.parse_list(span),
            Token::VecOpen => self.parse_vector(span),
            Token::Quote => {
                let quoted = self.parse_expr()?;
                Ok(Value::list(vec![
                    Value::Symbol(interner::intern("quote")),
                    quoted,
                ]))
            }
            Token::True => Ok(Value::Bool(true)),
            Token::False => Ok(Value::Bool(false)),
            Token::Int(n) => Ok(Value::Int(n)),
            Token::Float(x) => Ok(Value::Float(x)),
            Token::Char(c) => Ok(Value::Char(c)),
            Token::Str(s) => Ok(Value::string(&s)),
            Token::UnterminatedStr(_) => {
                Err(self.fail(ReadError::UnterminatedString, span))
            }
            Token::Symbol(text) => {
                if let Some(value) = self.constants.get(&text) {
                    return Ok(value.clone());
                }
                Ok(Value::Symbol(interner::intern_folded(&text, self.case_sensitive)))
            }
            Token::Dot => Err(self.fail(ReadError::StrayDot, span)),
            Token::RParen => Err(self.fail(
                ReadError::UnexpectedToken {
                    found: ")".to_string(),
                    expected: "an expression".to_string(),
                },
                span,
            )),
        }
    }

    fn parse_list(&mut self, open_span: Span) -> Result<Value, SourceError> {
        let mut items = Vec::new();
        loop {
            match self.peek() {
                None => {
                    return Err(self.fail(
                        ReadError::UnexpectedEof { expected: ")".to_string() },
                        open_span,
                    ));
                }
                Some(Token::RParen) => {
                    self.pos += 1;
                    return Ok(Value::list(items));
                }
                Some(Token::Dot) => {
                    let (_, dot_span) = match self.next() {
                        Some(t) => t,
                        None => break,
                    };
                    if items.is_empty() {
                        return Err(self.fail(ReadError::StrayDot, dot_span));
                    }
                    let tail = self.parse_expr()?;
                    match self.next() {
                        Some((Token::RParen, _)) => {
                            return Ok(Value::list_with_tail(items, tail));
                        }
                        Some((other, span)) => {
                            return Err(self.fail(
                                ReadError::UnexpectedToken {
                                    found: format!("{:?}", other),
                                    expected: ")".to_string(),
                                },
                                span,
                            ));
                        }
                        None => {
                            return Err(self.fail(
                                ReadError::UnexpectedEof { expected: ")".to_string() },
                                self.eof_span(),
                            ));
                        }
                    }
                }
                Some(_) => items.push(self.parse_expr()?),
            }
        }
        Err(self.fail(
            ReadError::UnexpectedEof { expected: ")".to_string() },
            self.eof_span(),
        ))
    }

    fn parse_vector(&mut self, open_span: Span) -> Result<Value, SourceError> {
        let mut items = Vec::new();
        loop {
            match self.peek() {
                None => {
                    return Err(self.fail(
                        ReadError::UnexpectedEof { expected: ")".to_string() },
                        open_span,
                    ));
                }
                Some(Token::RParen) => {
                    self.pos += 1;
                    return Ok(Value::Vector(std::rc::Rc::new(
                        std::cell::RefCell::new(items),
                    )));
                }
                Some(_) => items.push(self.parse_expr()?),
            }
        }
    }
}
