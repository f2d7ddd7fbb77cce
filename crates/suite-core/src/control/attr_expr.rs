//! Boolean expressions over test attributes, e.g.
//! `suite:bvt and (subsystem:default or not interval:daily)`

use super::ControlError;
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Expr {
    Attr(String),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

impl Expr {
    fn eval(&self, attributes: &BTreeSet<String>) -> bool {
        match self {
            Expr::Attr(name) => attributes.contains(name),
            Expr::Not(inner) => !inner.eval(attributes),
            Expr::And(a, b) => a.eval(attributes) && b.eval(attributes),
            Expr::Or(a, b) => a.eval(attributes) || b.eval(attributes),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Open,
    Close,
    And,
    Or,
    Not,
    Attr(String),
}

fn tokenize(source: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut word = String::new();
    let flush = |word: &mut String, tokens: &mut Vec<Token>| {
        if word.is_empty() {
            return;
        }
        tokens.push(match word.as_str() {
            "and" => Token::And,
            "or" => Token::Or,
            "not" => Token::Not,
            _ => Token::Attr(word.clone()),
        });
        word.clear();
    };
    for c in source.chars() {
        match c {
            '(' | ')' => {
                flush(&mut word, &mut tokens);
                tokens.push(if c == '(' { Token::Open } else { Token::Close });
            }
            c if c.is_whitespace() => flush(&mut word, &mut tokens),
            c => word.push(c),
        }
    }
    flush(&mut word, &mut tokens);
    tokens
}

/// Parsed attribute expression; `not` binds tighter than `and`, which binds
/// tighter than `or`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeExpression {
    source: String,
    expr: Expr,
}

impl AttributeExpression {
    pub fn parse(source: &str) -> Result<Self, ControlError> {
        let tokens = tokenize(source);
        let mut parser = ExprParser { tokens, pos: 0 };
        let expr = parser.or().map_err(|message| ControlError::InvalidPredicate {
            message: format!("attribute expression '{source}': {message}"),
        })?;
        if parser.pos != parser.tokens.len() {
            return Err(ControlError::InvalidPredicate {
                message: format!("attribute expression '{source}': unexpected trailing tokens"),
            });
        }
        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }

    pub fn matches(&self, attributes: &BTreeSet<String>) -> bool {
        self.expr.eval(attributes)
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl fmt::Display for AttributeExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

struct ExprParser {
    tokens: Vec<Token>,
    pos: usize,
}

impl ExprParser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn or(&mut self) -> Result<Expr, String> {
        let mut left = self.and()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            left = Expr::Or(Box::new(left), Box::new(self.and()?));
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Expr, String> {
        let mut left = self.not()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            left = Expr::And(Box::new(left), Box::new(self.not()?));
        }
        Ok(left)
    }

    fn not(&mut self) -> Result<Expr, String> {
        if self.peek() == Some(&Token::Not) {
            self.pos += 1;
            return Ok(Expr::Not(Box::new(self.not()?)));
        }
        self.atom()
    }

    fn atom(&mut self) -> Result<Expr, String> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        match token {
            Some(Token::Attr(name)) => Ok(Expr::Attr(name)),
            Some(Token::Open) => {
                let inner = self.or()?;
                match self.peek() {
                    Some(Token::Close) => {
                        self.pos += 1;
                        Ok(inner)
                    }
                    _ => Err("missing ')'".to_string()),
                }
            }
            Some(other) => Err(format!("unexpected {other:?}")),
            None => Err("unexpected end of expression".to_string()),
        }
    }
}
