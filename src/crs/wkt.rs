//! Well-known-text (WKT1) parser.
//!
//! Produces a plain node tree; interpretation lives in [`super::system`].
//! Both `[...]` and `(...)` delimiters are accepted, keywords are
//! upper-cased.

use crate::core::error::{IngestError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum WktValue {
    Text(String),
    Number(f64),
    /// Bare identifier such as `NORTH` in `AXIS["Lat",NORTH]`.
    Word(String),
    Node(WktNode),
}

#[derive(Debug, Clone, PartialEq)]
pub struct WktNode {
    pub keyword: String,
    pub args: Vec<WktValue>,
}

impl WktNode {
    /// First quoted argument, conventionally the object's name.
    pub fn name(&self) -> Option<&str> {
        self.args.iter().find_map(|a| match a {
            WktValue::Text(t) => Some(t.as_str()),
            _ => None,
        })
    }

    pub fn numbers(&self) -> Vec<f64> {
        self.args
            .iter()
            .filter_map(|a| match a {
                WktValue::Number(n) => Some(*n),
                _ => None,
            })
            .collect()
    }

    pub fn words(&self) -> Vec<&str> {
        self.args
            .iter()
            .filter_map(|a| match a {
                WktValue::Word(w) => Some(w.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn children(&self) -> impl Iterator<Item = &WktNode> {
        self.args.iter().filter_map(|a| match a {
            WktValue::Node(n) => Some(n),
            _ => None,
        })
    }

    pub fn child(&self, keyword: &str) -> Option<&WktNode> {
        self.children().find(|n| n.keyword == keyword)
    }

    pub fn children_named<'a>(&'a self, keyword: &'a str) -> impl Iterator<Item = &'a WktNode> + 'a {
        self.children().filter(move |n| n.keyword == keyword)
    }
}

struct Parser<'a> {
    src: &'a [u8],
    pos: usize,
}

fn error(msg: impl Into<String>) -> IngestError {
    IngestError::TransformUnavailable(format!("WKT: {}", msg.into()))
}

impl<'a> Parser<'a> {
    fn skip_ws(&mut self) {
        while self.pos < self.src.len() && self.src[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<u8> {
        self.skip_ws();
        self.src.get(self.pos).copied()
    }

    fn ident(&mut self) -> String {
        let start = self.pos;
        while self.pos < self.src.len()
            && (self.src[self.pos].is_ascii_alphanumeric() || self.src[self.pos] == b'_')
        {
            self.pos += 1;
        }
        String::from_utf8_lossy(&self.src[start..self.pos]).into_owned()
    }

    fn node(&mut self) -> Result<WktNode> {
        self.skip_ws();
        let keyword = self.ident().to_ascii_uppercase();
        if keyword.is_empty() {
            return Err(error(format!("expected keyword at offset {}", self.pos)));
        }
        let close = match self.peek() {
            Some(b'[') => b']',
            Some(b'(') => b')',
            _ => return Err(error(format!("expected '[' after {}", keyword))),
        };
        self.pos += 1;

        let mut args = Vec::new();
        loop {
            match self.peek() {
                Some(c) if c == close => {
                    self.pos += 1;
                    break;
                }
                Some(b',') if !args.is_empty() => {
                    self.pos += 1;
                }
                Some(_) => args.push(self.value()?),
                None => return Err(error(format!("unterminated {}", keyword))),
            }
        }
        Ok(WktNode { keyword, args })
    }

    fn value(&mut self) -> Result<WktValue> {
        match self.peek() {
            Some(b'"') => {
                self.pos += 1;
                let mut text = Vec::new();
                loop {
                    match self.src.get(self.pos) {
                        // "" is an escaped quote
                        Some(b'"') if self.src.get(self.pos + 1) == Some(&b'"') => {
                            text.push(b'"');
                            self.pos += 2;
                        }
                        Some(b'"') => {
                            self.pos += 1;
                            break;
                        }
                        Some(c) => {
                            text.push(*c);
                            self.pos += 1;
                        }
                        None => return Err(error("unterminated string")),
                    }
                }
                Ok(WktValue::Text(String::from_utf8_lossy(&text).into_owned()))
            }
            Some(c) if c == b'-' || c == b'+' || c == b'.' || c.is_ascii_digit() => {
                let start = self.pos;
                while self.pos < self.src.len()
                    && matches!(self.src[self.pos], b'0'..=b'9' | b'.' | b'-' | b'+' | b'e' | b'E')
                {
                    self.pos += 1;
                }
                let raw = String::from_utf8_lossy(&self.src[start..self.pos]).into_owned();
                raw.parse::<f64>()
                    .map(WktValue::Number)
                    .map_err(|_| error(format!("bad number '{}'", raw)))
            }
            Some(c) if c.is_ascii_alphabetic() => {
                let save = self.pos;
                let word = self.ident();
                match self.peek() {
                    Some(b'[') | Some(b'(') => {
                        self.pos = save;
                        Ok(WktValue::Node(self.node()?))
                    }
                    _ => Ok(WktValue::Word(word.to_ascii_uppercase())),
                }
            }
            Some(c) => Err(error(format!("unexpected '{}' at offset {}", c as char, self.pos))),
            None => Err(error("unexpected end of input")),
        }
    }
}

pub fn parse(text: &str) -> Result<WktNode> {
    let mut parser = Parser {
        src: text.as_bytes(),
        pos: 0,
    };
    let root = parser.node()?;
    if parser.peek().is_some() {
        return Err(error(format!("trailing content at offset {}", parser.pos)));
    }
    Ok(root)
}
