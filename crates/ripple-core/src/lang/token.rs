//! Lexer for the ripple cell language.
//!
//! Two stages: a logos scanner over the raw source, then a layout pass that
//! collapses physical lines into logical lines and synthesizes
//! `Newline` / `Indent` / `Dedent` tokens from leading whitespace. Newlines
//! inside brackets do not terminate statements.

use logos::Logos;

use crate::error::{Error, Result};

/// Raw tokens produced by the logos scanner.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\f]+")]
#[logos(skip r"#[^\n]*")]
#[logos(skip r"\\\r?\n")]
enum RawTok {
    #[token("\n")]
    Newline,

    // Keywords.
    #[token("def")]
    Def,
    #[token("class")]
    Class,
    #[token("return")]
    Return,
    #[token("if")]
    If,
    #[token("elif")]
    Elif,
    #[token("else")]
    Else,
    #[token("while")]
    While,
    #[token("for")]
    For,
    #[token("in")]
    In,
    #[token("and")]
    And,
    #[token("or")]
    Or,
    #[token("not")]
    Not,
    #[token("lambda")]
    Lambda,
    #[token("global")]
    Global,
    #[token("nonlocal")]
    Nonlocal,
    #[token("import")]
    Import,
    #[token("from")]
    From,
    #[token("as")]
    As,
    #[token("with")]
    With,
    #[token("try")]
    Try,
    #[token("except")]
    Except,
    #[token("finally")]
    Finally,
    #[token("raise")]
    Raise,
    #[token("pass")]
    Pass,
    #[token("break")]
    Break,
    #[token("continue")]
    Continue,
    #[token("True")]
    True,
    #[token("False")]
    False,
    #[token("None")]
    None,

    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),

    #[regex(r"[0-9]+\.[0-9]+([eE][+-]?[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    #[regex(r"[0-9]+[eE][+-]?[0-9]+", |lex| lex.slice().parse::<f64>().ok())]
    Float(f64),

    #[regex(r"[0-9]+", |lex| lex.slice().parse::<i64>().ok())]
    Int(i64),

    #[regex(r#""([^"\\\n]|\\.)*""#, |lex| unescape(lex.slice()))]
    #[regex(r#"'([^'\\\n]|\\.)*'"#, |lex| unescape(lex.slice()))]
    Str(String),

    // Operators, longest first where prefixes overlap.
    #[token("**=")]
    PowAssign,
    #[token("//=")]
    FloorDivAssign,
    #[token("**")]
    Pow,
    #[token("//")]
    FloorDiv,
    #[token("+=")]
    PlusAssign,
    #[token("-=")]
    MinusAssign,
    #[token("*=")]
    StarAssign,
    #[token("/=")]
    SlashAssign,
    #[token("%=")]
    PercentAssign,
    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("<=")]
    LtEq,
    #[token(">=")]
    GtEq,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("=")]
    Assign,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token(",")]
    Comma,
    #[token(":")]
    Colon,
    #[token(".")]
    Dot,
    #[token(";")]
    Semicolon,
}

/// Tokens consumed by the parser, after the layout pass.
#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    Def,
    Class,
    Return,
    If,
    Elif,
    Else,
    While,
    For,
    In,
    And,
    Or,
    Not,
    Lambda,
    Global,
    Nonlocal,
    Import,
    From,
    As,
    With,
    Try,
    Except,
    Finally,
    Raise,
    Pass,
    Break,
    Continue,
    True,
    False,
    None,
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    Pow,
    FloorDiv,
    PowAssign,
    FloorDivAssign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    PercentAssign,
    EqEq,
    NotEq,
    LtEq,
    GtEq,
    Lt,
    Gt,
    Assign,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Dot,
    Semicolon,
    Newline,
    Indent,
    Dedent,
}

/// A token plus the 1-indexed source line it starts on.
pub type SpannedTok = (Tok, usize);

fn unescape(slice: &str) -> String {
    let inner = &slice[1..slice.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('\\') => out.push('\\'),
            Some('\'') => out.push('\''),
            Some('"') => out.push('"'),
            Some('0') => out.push('\0'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            Option::None => out.push('\\'),
        }
    }
    out
}

fn carry(raw: RawTok) -> Tok {
    match raw {
        RawTok::Newline => Tok::Newline,
        RawTok::Def => Tok::Def,
        RawTok::Class => Tok::Class,
        RawTok::Return => Tok::Return,
        RawTok::If => Tok::If,
        RawTok::Elif => Tok::Elif,
        RawTok::Else => Tok::Else,
        RawTok::While => Tok::While,
        RawTok::For => Tok::For,
        RawTok::In => Tok::In,
        RawTok::And => Tok::And,
        RawTok::Or => Tok::Or,
        RawTok::Not => Tok::Not,
        RawTok::Lambda => Tok::Lambda,
        RawTok::Global => Tok::Global,
        RawTok::Nonlocal => Tok::Nonlocal,
        RawTok::Import => Tok::Import,
        RawTok::From => Tok::From,
        RawTok::As => Tok::As,
        RawTok::With => Tok::With,
        RawTok::Try => Tok::Try,
        RawTok::Except => Tok::Except,
        RawTok::Finally => Tok::Finally,
        RawTok::Raise => Tok::Raise,
        RawTok::Pass => Tok::Pass,
        RawTok::Break => Tok::Break,
        RawTok::Continue => Tok::Continue,
        RawTok::True => Tok::True,
        RawTok::False => Tok::False,
        RawTok::None => Tok::None,
        RawTok::Ident(s) => Tok::Ident(s),
        RawTok::Int(n) => Tok::Int(n),
        RawTok::Float(f) => Tok::Float(f),
        RawTok::Str(s) => Tok::Str(s),
        RawTok::Pow => Tok::Pow,
        RawTok::FloorDiv => Tok::FloorDiv,
        RawTok::PowAssign => Tok::PowAssign,
        RawTok::FloorDivAssign => Tok::FloorDivAssign,
        RawTok::PlusAssign => Tok::PlusAssign,
        RawTok::MinusAssign => Tok::MinusAssign,
        RawTok::StarAssign => Tok::StarAssign,
        RawTok::SlashAssign => Tok::SlashAssign,
        RawTok::PercentAssign => Tok::PercentAssign,
        RawTok::EqEq => Tok::EqEq,
        RawTok::NotEq => Tok::NotEq,
        RawTok::LtEq => Tok::LtEq,
        RawTok::GtEq => Tok::GtEq,
        RawTok::Lt => Tok::Lt,
        RawTok::Gt => Tok::Gt,
        RawTok::Assign => Tok::Assign,
        RawTok::Plus => Tok::Plus,
        RawTok::Minus => Tok::Minus,
        RawTok::Star => Tok::Star,
        RawTok::Slash => Tok::Slash,
        RawTok::Percent => Tok::Percent,
        RawTok::LParen => Tok::LParen,
        RawTok::RParen => Tok::RParen,
        RawTok::LBracket => Tok::LBracket,
        RawTok::RBracket => Tok::RBracket,
        RawTok::LBrace => Tok::LBrace,
        RawTok::RBrace => Tok::RBrace,
        RawTok::Comma => Tok::Comma,
        RawTok::Colon => Tok::Colon,
        RawTok::Dot => Tok::Dot,
        RawTok::Semicolon => Tok::Semicolon,
    }
}

/// Lex a source string into layout-processed tokens.
///
/// The returned stream terminates with a trailing `Newline` and balanced
/// `Dedent`s so the parser never has to special-case end of input.
pub fn lex(source: &str) -> Result<Vec<SpannedTok>> {
    // Stage 1: raw scan, keeping byte spans for indentation measurement.
    let mut raw: Vec<(RawTok, std::ops::Range<usize>)> = Vec::new();
    let mut lexer = RawTok::lexer(source);
    while let Some(item) = lexer.next() {
        let span = lexer.span();
        match item {
            Ok(tok) => raw.push((tok, span)),
            Err(()) => {
                let line = line_of(source, span.start);
                let snippet: String = source[span.start..].chars().take(8).collect();
                return Err(Error::Parse(format!(
                    "line {line}: unrecognized token starting at {snippet:?}"
                )));
            }
        }
    }

    // Stage 2: layout.
    let mut out: Vec<SpannedTok> = Vec::new();
    let mut indents: Vec<usize> = vec![0];
    let mut depth: usize = 0;
    let mut i = 0;
    let mut at_line_start = true;

    while i < raw.len() {
        let (tok, span) = &raw[i];
        match tok {
            RawTok::Newline if depth > 0 => {
                // Implicit line joining inside brackets.
                i += 1;
            }
            RawTok::Newline => {
                // Collapse any run of newlines (blank/comment-only lines).
                while i < raw.len() && matches!(raw[i].0, RawTok::Newline) {
                    i += 1;
                }
                if !at_line_start {
                    out.push((Tok::Newline, line_of(source, span.start)));
                }
                if i >= raw.len() {
                    break;
                }
                let next_span = &raw[i].1;
                let line = line_of(source, next_span.start);
                let indent = indent_of(source, next_span.start);
                adjust_indent(&mut out, &mut indents, indent, line)?;
                at_line_start = false;
            }
            other => {
                if at_line_start {
                    let line = line_of(source, span.start);
                    let indent = indent_of(source, span.start);
                    if indent > 0 {
                        return Err(Error::Parse(format!("line {line}: unexpected indent")));
                    }
                    at_line_start = false;
                }
                match other {
                    RawTok::LParen | RawTok::LBracket | RawTok::LBrace => depth += 1,
                    RawTok::RParen | RawTok::RBracket | RawTok::RBrace => {
                        depth = depth.saturating_sub(1)
                    }
                    _ => {}
                }
                out.push((carry(other.clone()), line_of(source, span.start)));
                i += 1;
            }
        }
    }

    let last_line = source.lines().count().max(1);
    if !matches!(out.last(), Some((Tok::Newline, _)) | Some((Tok::Dedent, _)) | Option::None) {
        out.push((Tok::Newline, last_line));
    }
    while indents.len() > 1 {
        indents.pop();
        out.push((Tok::Dedent, last_line));
    }

    Ok(out)
}

fn adjust_indent(
    out: &mut Vec<SpannedTok>,
    indents: &mut Vec<usize>,
    indent: usize,
    line: usize,
) -> Result<()> {
    let current = *indents.last().unwrap_or(&0);
    if indent > current {
        indents.push(indent);
        out.push((Tok::Indent, line));
    } else if indent < current {
        while *indents.last().unwrap_or(&0) > indent {
            indents.pop();
            out.push((Tok::Dedent, line));
        }
        if *indents.last().unwrap_or(&0) != indent {
            return Err(Error::Parse(format!(
                "line {line}: unindent does not match any outer indentation level"
            )));
        }
    }
    Ok(())
}

/// 1-indexed line number of a byte offset.
fn line_of(source: &str, offset: usize) -> usize {
    source[..offset.min(source.len())]
        .bytes()
        .filter(|&b| b == b'\n')
        .count()
        + 1
}

/// Number of whitespace characters between the last newline and `offset`.
fn indent_of(source: &str, offset: usize) -> usize {
    let upto = &source[..offset.min(source.len())];
    let line_start = upto.rfind('\n').map(|p| p + 1).unwrap_or(0);
    upto[line_start..].chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(source: &str) -> Vec<Tok> {
        lex(source).unwrap().into_iter().map(|(t, _)| t).collect()
    }

    #[test]
    fn test_simple_assignment() {
        let t = toks("x = 10");
        assert_eq!(
            t,
            vec![
                Tok::Ident("x".into()),
                Tok::Assign,
                Tok::Int(10),
                Tok::Newline
            ]
        );
    }

    #[test]
    fn test_indent_dedent() {
        let t = toks("if x:\n    y = 1\nz = 2");
        assert!(t.contains(&Tok::Indent));
        assert!(t.contains(&Tok::Dedent));
        // Dedent appears before the z line's tokens.
        let dedent_pos = t.iter().position(|t| *t == Tok::Dedent).unwrap();
        let z_pos = t.iter().position(|t| *t == Tok::Ident("z".into())).unwrap();
        assert!(dedent_pos < z_pos);
    }

    #[test]
    fn test_blank_lines_ignored() {
        let a = toks("x = 1\n\n\ny = 2");
        let b = toks("x = 1\ny = 2");
        assert_eq!(a, b);
    }

    #[test]
    fn test_comment_only_lines_ignored() {
        let a = toks("x = 1\n# comment\ny = 2");
        let b = toks("x = 1\ny = 2");
        assert_eq!(a, b);
    }

    #[test]
    fn test_brackets_join_lines() {
        let t = toks("x = [1,\n     2,\n     3]");
        assert_eq!(t.iter().filter(|t| **t == Tok::Newline).count(), 1);
        assert!(!t.contains(&Tok::Indent));
    }

    #[test]
    fn test_string_escapes() {
        let t = toks(r#"s = "a\nb""#);
        assert!(t.contains(&Tok::Str("a\nb".into())));
    }

    #[test]
    fn test_float_and_int() {
        let t = toks("a = 1.5\nb = 2");
        assert!(t.contains(&Tok::Float(1.5)));
        assert!(t.contains(&Tok::Int(2)));
    }

    #[test]
    fn test_operators_longest_match() {
        let t = toks("x **= 2\ny //= 3");
        assert!(t.contains(&Tok::PowAssign));
        assert!(t.contains(&Tok::FloorDivAssign));
    }

    #[test]
    fn test_unexpected_indent_rejected() {
        assert!(lex("    x = 1").is_err());
    }

    #[test]
    fn test_bad_dedent_rejected() {
        assert!(lex("if x:\n        y = 1\n    z = 2").is_err());
    }

    #[test]
    fn test_trailing_dedents_at_eof() {
        let t = toks("if x:\n    y = 1");
        assert_eq!(t.last(), Some(&Tok::Dedent));
    }

    #[test]
    fn test_line_numbers() {
        let spanned = lex("x = 1\ny = 2").unwrap();
        let y_line = spanned
            .iter()
            .find(|(t, _)| *t == Tok::Ident("y".into()))
            .map(|(_, l)| *l)
            .unwrap();
        assert_eq!(y_line, 2);
    }
}
