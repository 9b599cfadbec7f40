//! Token scanner for the assembly grammar. Newlines are significant
//! (statement separators), so they are tokens rather than whitespace.

use crate::diag::{DiagSink, Loc};

#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    Ident(String),
    Int(u64),
    Float(f64),
    LParen,
    RParen,
    LBrack,
    RBrack,
    LBrace,
    RBrace,
    Lt,
    Gt,
    Shl,
    Shr,
    Semi,
    Colon,
    Comma,
    Dot,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Tilde,
    Amp,
    Pipe,
    Caret,
    Newline,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub tok: Tok,
    pub loc: Loc,
}

pub fn lex(src: &str, sink: &mut DiagSink) -> Vec<Token> {
    Lexer { src: src.as_bytes(), pos: 0, line: 1, col: 1 }.run(sink)
}

struct Lexer<'a> {
    src: &'a [u8],
    pos: usize,
    line: u32,
    col: u32,
}

impl<'a> Lexer<'a> {
    fn loc(&self) -> Loc {
        Loc::text(self.line, self.col, self.pos as u32)
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn peek2(&self) -> Option<u8> {
        self.src.get(self.pos + 1).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let c = self.peek()?;
        self.pos += 1;
        if c == b'\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn run(mut self, sink: &mut DiagSink) -> Vec<Token> {
        let mut out = Vec::new();
        loop {
            let loc = self.loc();
            let Some(c) = self.peek() else {
                out.push(Token { tok: Tok::Eof, loc });
                return out;
            };
            match c {
                b' ' | b'\t' | b'\r' => {
                    self.bump();
                }
                b'\n' => {
                    self.bump();
                    // collapse runs of blank lines into one separator
                    if !matches!(out.last().map(|t| &t.tok), Some(Tok::Newline) | None) {
                        out.push(Token { tok: Tok::Newline, loc });
                    }
                }
                b'/' if self.peek2() == Some(b'/') => {
                    while let Some(c) = self.peek() {
                        if c == b'\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                b'/' if self.peek2() == Some(b'*') => {
                    self.bump();
                    self.bump();
                    loop {
                        match self.bump() {
                            None => {
                                let _ = sink.error(loc, "unterminated block comment");
                                break;
                            }
                            Some(b'*') if self.peek() == Some(b'/') => {
                                self.bump();
                                break;
                            }
                            _ => {}
                        }
                    }
                }
                b'0'..=b'9' => out.push(Token { tok: self.number(loc, sink), loc }),
                b'a'..=b'z' | b'A'..=b'Z' | b'_' => {
                    let start = self.pos;
                    while let Some(c) = self.peek() {
                        if c.is_ascii_alphanumeric() || c == b'_' {
                            self.bump();
                        } else {
                            break;
                        }
                    }
                    let text = std::str::from_utf8(&self.src[start..self.pos])
                        .expect("ident bytes are ascii")
                        .to_string();
                    out.push(Token { tok: Tok::Ident(text), loc });
                }
                _ => {
                    self.bump();
                    let tok = match c {
                        b'(' => Tok::LParen,
                        b')' => Tok::RParen,
                        b'[' => Tok::LBrack,
                        b']' => Tok::RBrack,
                        b'{' => Tok::LBrace,
                        b'}' => Tok::RBrace,
                        b'<' if self.peek() == Some(b'<') => {
                            self.bump();
                            Tok::Shl
                        }
                        b'>' if self.peek() == Some(b'>') => {
                            self.bump();
                            Tok::Shr
                        }
                        b'<' => Tok::Lt,
                        b'>' => Tok::Gt,
                        b';' => Tok::Semi,
                        b':' => Tok::Colon,
                        b',' => Tok::Comma,
                        b'.' => Tok::Dot,
                        b'+' => Tok::Plus,
                        b'-' => Tok::Minus,
                        b'*' => Tok::Star,
                        b'/' => Tok::Slash,
                        b'%' => Tok::Percent,
                        b'~' => Tok::Tilde,
                        b'&' => Tok::Amp,
                        b'|' => Tok::Pipe,
                        b'^' => Tok::Caret,
                        other => {
                            let _ = sink
                                .error(loc, format!("unexpected character {:?}", other as char));
                            continue;
                        }
                    };
                    out.push(Token { tok, loc });
                }
            }
        }
    }

    /// Integer (decimal or 0x hex) or float (decimal point and/or
    /// exponent). `1.5`, `2e8`, `0x7F800000` all land here.
    fn number(&mut self, loc: Loc, sink: &mut DiagSink) -> Tok {
        let start = self.pos;
        if self.peek() == Some(b'0') && matches!(self.peek2(), Some(b'x') | Some(b'X')) {
            self.bump();
            self.bump();
            let digs = self.pos;
            while let Some(c) = self.peek() {
                if c.is_ascii_hexdigit() {
                    self.bump();
                } else {
                    break;
                }
            }
            let text = std::str::from_utf8(&self.src[digs..self.pos]).expect("hex digits");
            return match u64::from_str_radix(text, 16) {
                Ok(v) if !text.is_empty() => Tok::Int(v),
                _ => {
                    let _ = sink.error(loc, format!("bad hex literal: 0x{}", text));
                    Tok::Int(0)
                }
            };
        }
        let mut is_float = false;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                self.bump();
            } else {
                break;
            }
        }
        // a '.' introduces a fraction only when a digit follows; `r1.0`
        // style subregister dots stay separate tokens
        if self.peek() == Some(b'.') && self.peek2().map(|c| c.is_ascii_digit()).unwrap_or(false) {
            is_float = true;
            self.bump();
            while let Some(c) = self.peek() {
                if c.is_ascii_digit() {
                    self.bump();
                } else {
                    break;
                }
            }
        }
        if matches!(self.peek(), Some(b'e') | Some(b'E')) {
            let mut ahead = self.pos + 1;
            if matches!(self.src.get(ahead), Some(b'+') | Some(b'-')) {
                ahead += 1;
            }
            if self.src.get(ahead).map(|c| c.is_ascii_digit()).unwrap_or(false) {
                is_float = true;
                self.bump();
                if matches!(self.peek(), Some(b'+') | Some(b'-')) {
                    self.bump();
                }
                while let Some(c) = self.peek() {
                    if c.is_ascii_digit() {
                        self.bump();
                    } else {
                        break;
                    }
                }
            }
        }
        let text = std::str::from_utf8(&self.src[start..self.pos]).expect("number bytes");
        if is_float {
            match text.parse::<f64>() {
                Ok(v) => Tok::Float(v),
                Err(_) => {
                    let _ = sink.error(loc, format!("bad float literal: {}", text));
                    Tok::Float(0.0)
                }
            }
        } else {
            match text.parse::<u64>() {
                Ok(v) => Tok::Int(v),
                Err(_) => {
                    let _ = sink.error(loc, format!("integer literal out of range: {}", text));
                    Tok::Int(0)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<Tok> {
        let mut sink = DiagSink::default();
        let toks = lex(src, &mut sink);
        assert!(!sink.has_errors(), "{:?}", sink.diags());
        toks.into_iter().map(|t| t.tok).collect()
    }

    #[test]
    fn instruction_shape() {
        let t = kinds("mov (8|M0) r1.0<1>:f r2.0<8;8,1>:f");
        assert_eq!(
            t,
            vec![
                Tok::Ident("mov".into()),
                Tok::LParen,
                Tok::Int(8),
                Tok::Pipe,
                Tok::Ident("M0".into()),
                Tok::RParen,
                Tok::Ident("r1".into()),
                Tok::Dot,
                Tok::Int(0),
                Tok::Lt,
                Tok::Int(1),
                Tok::Gt,
                Tok::Colon,
                Tok::Ident("f".into()),
                Tok::Ident("r2".into()),
                Tok::Dot,
                Tok::Int(0),
                Tok::Lt,
                Tok::Int(8),
                Tok::Semi,
                Tok::Int(8),
                Tok::Comma,
                Tok::Int(1),
                Tok::Gt,
                Tok::Colon,
                Tok::Ident("f".into()),
                Tok::Eof,
            ]
        );
    }

    #[test]
    fn numbers_and_dots() {
        // `r1.0` keeps the dot separate; `1.5` does not
        assert_eq!(
            kinds("1.5 2e8 0x7F800000"),
            vec![Tok::Float(1.5), Tok::Float(2e8), Tok::Int(0x7F80_0000), Tok::Eof]
        );
    }

    #[test]
    fn comments_and_newlines() {
        let t = kinds("nop // trailing\n\n\nnop /* x\ny */ nop\n");
        assert_eq!(
            t,
            vec![
                Tok::Ident("nop".into()),
                Tok::Newline,
                Tok::Ident("nop".into()),
                Tok::Ident("nop".into()),
                Tok::Newline,
                Tok::Eof,
            ]
        );
    }

    #[test]
    fn shifts_lex_greedily() {
        assert_eq!(
            kinds("1<<2 8>>1"),
            vec![Tok::Int(1), Tok::Shl, Tok::Int(2), Tok::Int(8), Tok::Shr, Tok::Int(1), Tok::Eof]
        );
    }

    #[test]
    fn bad_char_recovers() {
        let mut sink = DiagSink::default();
        let toks = lex("mov ` nop", &mut sink);
        assert!(sink.has_errors());
        assert_eq!(toks.len(), 3); // mov, nop, eof
    }
}
