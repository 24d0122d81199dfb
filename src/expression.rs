// src/expression.rs
use crate::parser::{ParseError, Parser};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    Plus,
    TypeOf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Lt,
    Lte,
    Gt,
    Gte,
    Eq,
    Ne,
    StrictEq,
    StrictNe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    Nullish,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ENode {
    Literal(Value),
    Undefined,
    Ident(String),
    Array(Vec<ENode>),
    Member {
        object: Box<ENode>,
        property: String,
        optional: bool,
    },
    Index {
        object: Box<ENode>,
        index: Box<ENode>,
    },
    /// `name(args)` or `receiver.name(args)`; the receiver becomes the first argument.
    Call {
        name: String,
        receiver: Option<Box<ENode>>,
        args: Vec<ENode>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<ENode>,
    },
    Binary {
        op: BinaryOp,
        left: Box<ENode>,
        right: Box<ENode>,
    },
    Logical {
        op: LogicalOp,
        left: Box<ENode>,
        right: Box<ENode>,
    },
    Conditional {
        test: Box<ENode>,
        then: Box<ENode>,
        otherwise: Box<ENode>,
    },
}

pub type EParseErr = ParseError;

pub fn parse_expr(input: &str) -> Result<ENode, EParseErr> {
    let mut p = EParser::new(input);
    let node = p.parse_conditional()?;
    p.skip_ws();
    if !p.eof() {
        return Err(EParseErr::InvalidSyntax(format!(
            "unexpected token '{}'",
            p.parser.rest().chars().take(8).collect::<String>()
        )));
    }
    Ok(node)
}

struct EParser<'a> {
    parser: Parser<'a>,
}

fn binary(op: BinaryOp, left: ENode, right: ENode) -> ENode {
    ENode::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

fn logical(op: LogicalOp, left: ENode, right: ENode) -> ENode {
    ENode::Logical {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

impl<'a> EParser<'a> {
    fn new(s: &'a str) -> Self {
        Self {
            parser: Parser::new(s),
        }
    }

    fn parse_conditional(&mut self) -> Result<ENode, EParseErr> {
        let test = self.parse_or()?;
        self.skip_ws();
        if self.parser.peek_char() == Some('?')
            && !self.parser.peek_str("??")
            && !self.at_optional_chain()
        {
            self.parser.consume_char('?');
            let then = self.parse_conditional()?;
            self.skip_ws();
            self.parser.expect(':')?;
            let otherwise = self.parse_conditional()?;
            return Ok(ENode::Conditional {
                test: Box::new(test),
                then: Box::new(then),
                otherwise: Box::new(otherwise),
            });
        }
        Ok(test)
    }

    fn parse_or(&mut self) -> Result<ENode, EParseErr> {
        let mut left = self.parse_and()?;
        loop {
            self.skip_ws();
            if self.parser.consume_str("||") {
                let right = self.parse_and()?;
                left = logical(LogicalOp::Or, left, right);
            } else if self.parser.consume_str("??") {
                let right = self.parse_and()?;
                left = logical(LogicalOp::Nullish, left, right);
            } else {
                break;
            }
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<ENode, EParseErr> {
        let mut left = self.parse_equality()?;
        loop {
            self.skip_ws();
            if self.parser.consume_str("&&") {
                let right = self.parse_equality()?;
                left = logical(LogicalOp::And, left, right);
            } else {
                break;
            }
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<ENode, EParseErr> {
        let mut left = self.parse_relational()?;
        loop {
            self.skip_ws();
            let op = if self.parser.consume_str("===") {
                BinaryOp::StrictEq
            } else if self.parser.consume_str("!==") {
                BinaryOp::StrictNe
            } else if self.parser.consume_str("==") {
                BinaryOp::Eq
            } else if self.parser.consume_str("!=") {
                BinaryOp::Ne
            } else {
                break;
            };
            let right = self.parse_relational()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_relational(&mut self) -> Result<ENode, EParseErr> {
        let mut left = self.parse_additive()?;
        loop {
            self.skip_ws();
            let op = if self.parser.consume_str("<=") {
                BinaryOp::Lte
            } else if self.parser.consume_str(">=") {
                BinaryOp::Gte
            } else if self.parser.consume_char('<') {
                BinaryOp::Lt
            } else if self.parser.consume_char('>') {
                BinaryOp::Gt
            } else {
                break;
            };
            let right = self.parse_additive()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<ENode, EParseErr> {
        let mut left = self.parse_multiplicative()?;
        loop {
            self.skip_ws();
            let op = if self.parser.consume_char('+') {
                BinaryOp::Add
            } else if self.parser.consume_char('-') {
                BinaryOp::Sub
            } else {
                break;
            };
            let right = self.parse_multiplicative()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<ENode, EParseErr> {
        let mut left = self.parse_unary()?;
        loop {
            self.skip_ws();
            let op = if self.parser.consume_char('*') {
                BinaryOp::Mul
            } else if self.parser.consume_char('/') {
                BinaryOp::Div
            } else if self.parser.consume_char('%') {
                BinaryOp::Rem
            } else {
                break;
            };
            let right = self.parse_unary()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<ENode, EParseErr> {
        self.skip_ws();
        let op = if self.parser.peek_char() == Some('!') && !self.parser.peek_str("!=") {
            self.parser.consume_char('!');
            Some(UnaryOp::Not)
        } else if self.parser.consume_char('-') {
            Some(UnaryOp::Neg)
        } else if self.parser.consume_char('+') {
            Some(UnaryOp::Plus)
        } else if self.at_keyword("typeof") {
            self.parser.consume_str("typeof");
            Some(UnaryOp::TypeOf)
        } else {
            None
        };
        match op {
            Some(op) => {
                let operand = self.parse_unary()?;
                Ok(ENode::Unary {
                    op,
                    operand: Box::new(operand),
                })
            }
            None => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> Result<ENode, EParseErr> {
        let mut node = self.parse_primary()?;
        loop {
            self.skip_ws();
            if self.at_optional_chain() {
                self.parser.consume_str("?.");
                self.skip_ws();
                let property = self.parser.parse_identifier()?;
                node = ENode::Member {
                    object: Box::new(node),
                    property,
                    optional: true,
                };
            } else if self.parser.consume_char('.') {
                self.skip_ws();
                let property = self.parser.parse_identifier()?;
                node = ENode::Member {
                    object: Box::new(node),
                    property,
                    optional: false,
                };
            } else if self.parser.consume_char('[') {
                let index = self.parse_conditional()?;
                self.skip_ws();
                self.parser.expect(']')?;
                node = ENode::Index {
                    object: Box::new(node),
                    index: Box::new(index),
                };
            } else if self.parser.peek_char() == Some('(') {
                self.parser.consume_char('(');
                let args = self.parse_list(')')?;
                node = match node {
                    ENode::Ident(name) => ENode::Call {
                        name,
                        receiver: None,
                        args,
                    },
                    ENode::Member {
                        object, property, ..
                    } => ENode::Call {
                        name: property,
                        receiver: Some(object),
                        args,
                    },
                    _ => {
                        return Err(EParseErr::InvalidSyntax(
                            "only named functions can be called".into(),
                        ))
                    }
                };
            } else {
                break;
            }
        }
        Ok(node)
    }

    fn parse_primary(&mut self) -> Result<ENode, EParseErr> {
        self.skip_ws();
        match self.parser.peek_char() {
            None => Err(EParseErr::InvalidSyntax("unexpected end of input".into())),
            Some('"') | Some('\'') => Ok(ENode::Literal(Value::String(
                self.parser.parse_quoted_string()?,
            ))),
            Some('(') => {
                self.parser.consume_char('(');
                let inner = self.parse_conditional()?;
                self.skip_ws();
                self.parser.expect(')')?;
                Ok(inner)
            }
            Some('[') => {
                self.parser.consume_char('[');
                Ok(ENode::Array(self.parse_list(']')?))
            }
            Some(c) if c.is_ascii_digit() || c == '.' => {
                Ok(ENode::Literal(self.parser.parse_number_literal()?))
            }
            Some(c) if c == '_' || c == '$' || c.is_ascii_alphabetic() => {
                let name = self.parser.parse_identifier()?;
                Ok(match name.as_str() {
                    "true" => ENode::Literal(Value::Bool(true)),
                    "false" => ENode::Literal(Value::Bool(false)),
                    "null" => ENode::Literal(Value::Null),
                    "undefined" => ENode::Undefined,
                    _ => ENode::Ident(name),
                })
            }
            Some(c) => Err(EParseErr::InvalidSyntax(format!("unexpected token '{c}'"))),
        }
    }

    /// Comma-separated expressions up to `close`; the opener is already consumed.
    fn parse_list(&mut self, close: char) -> Result<Vec<ENode>, EParseErr> {
        let mut out = Vec::new();
        self.skip_ws();
        if self.parser.consume_char(close) {
            return Ok(out);
        }
        loop {
            out.push(self.parse_conditional()?);
            self.skip_ws();
            if self.parser.consume_char(',') {
                continue;
            }
            self.parser.expect(close)?;
            break;
        }
        Ok(out)
    }

    /// `?.` that is not the start of `? .5 : x`.
    fn at_optional_chain(&self) -> bool {
        self.parser.peek_str("?.")
            && !self
                .parser
                .peek_nth(2)
                .map(|c| c.is_ascii_digit())
                .unwrap_or(false)
    }

    fn at_keyword(&self, kw: &str) -> bool {
        self.parser.peek_str(kw)
            && !self
                .parser
                .rest()
                .chars()
                .nth(kw.len())
                .map(|c| c == '_' || c == '$' || c.is_ascii_alphanumeric())
                .unwrap_or(false)
    }

    fn skip_ws(&mut self) {
        self.parser.skip_ws();
    }

    fn eof(&self) -> bool {
        self.parser.eof()
    }
}
