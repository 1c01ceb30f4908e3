//! Declaration patterns plus brace matching for C-family languages that have
//! no grammar compiled in.
//!
//! A declaration header arms a pending construct; the next `{` outside strings
//! and comments opens it and the matching `}` closes it. Headers that reach a
//! `;` first, or go [`HEADER_LOOKAHEAD`] lines without a brace, are dropped.

use std::sync::LazyLock;

use regex::Regex;

use super::Construct;
use crate::chunk::ChunkKind;
use crate::error::StructuralError;

const HEADER_LOOKAHEAD: usize = 3;

static CLASS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?:(?:public|private|protected|internal|abstract|final|static|sealed|partial|open|data|inner|export|default|inline|case|readonly)\s+)*(?:class|interface|struct|enum|trait|object|record|namespace|protocol|extension)\s+([A-Za-z_]\w*)",
    )
    .expect("class header regex is valid")
});

static KEYWORD_FN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?:[\w@]+\s+)*(?:fun|func|def|function)\s+(?:<[^>]*>\s*)?(?:[\w.]+\.)?([A-Za-z_]\w*)\s*[(<\[]",
    )
    .expect("keyword function regex is valid")
});

static TYPED_FN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*((?:[\w:<>\[\],.*&?]+\s+)+)[*&]*([A-Za-z_~][\w:~]*)\s*\(")
        .expect("typed function regex is valid")
});

/// Words that make a `type name(` line a statement rather than a declaration.
const STATEMENT_WORDS: &[&str] = &[
    "if", "else", "for", "foreach", "while", "switch", "catch", "return", "new", "throw", "do",
    "try", "using", "lock", "sizeof", "synchronized", "when", "await", "yield", "case", "delete",
    "goto", "typeof", "in", "is", "as",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token {
    Open,
    Close,
    Semicolon,
}

/// Comment and string state carried across lines.
#[derive(Debug, Default)]
struct Scanner {
    block_comment: bool,
}

impl Scanner {
    fn scan(&mut self, line: &str) -> Vec<Token> {
        let mut tokens = Vec::new();
        let mut string: Option<char> = None;
        let mut chars = line.chars().peekable();

        while let Some(c) = chars.next() {
            if self.block_comment {
                if c == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    self.block_comment = false;
                }
                continue;
            }
            if let Some(quote) = string {
                if c == '\\' {
                    chars.next();
                } else if c == quote {
                    string = None;
                }
                continue;
            }
            match c {
                '/' if chars.peek() == Some(&'/') => break,
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    self.block_comment = true;
                }
                '"' | '\'' | '`' => string = Some(c),
                '{' => tokens.push(Token::Open),
                '}' => tokens.push(Token::Close),
                ';' => tokens.push(Token::Semicolon),
                _ => {}
            }
        }
        tokens
    }
}

struct Pending {
    line: usize,
    kind: ChunkKind,
    name: Option<String>,
    lines_left: usize,
}

struct Open {
    construct: Construct,
    /// Brace depth outside the construct's body.
    depth: usize,
}

fn header(line: &str) -> Option<(ChunkKind, String)> {
    let trimmed = line.trim_start();
    if trimmed.is_empty()
        || ["//", "/*", "*", "#", "@"]
            .iter()
            .any(|p| trimmed.starts_with(p))
    {
        return None;
    }

    if let Some(caps) = CLASS_RE.captures(line) {
        return Some((ChunkKind::Class, caps[1].to_owned()));
    }
    if let Some(caps) = KEYWORD_FN_RE.captures(line) {
        return Some((ChunkKind::Function, caps[1].to_owned()));
    }
    let caps = TYPED_FN_RE.captures(line)?;
    let prefix = &caps[1];
    let name = &caps[2];
    let is_statement = prefix
        .split_whitespace()
        .chain(std::iter::once(name))
        .any(|word| STATEMENT_WORDS.contains(&word));
    if is_statement || before_paren_has(line, '=') {
        return None;
    }
    Some((ChunkKind::Function, name.to_owned()))
}

fn before_paren_has(line: &str, needle: char) -> bool {
    line.split('(').next().is_some_and(|head| head.contains(needle))
}

/// Scan `source` for brace-delimited declarations.
pub(super) fn constructs(source: &str) -> Result<Vec<Construct>, StructuralError> {
    let mut roots = Vec::new();
    let mut stack: Vec<Open> = Vec::new();
    let mut pending: Option<Pending> = None;
    let mut scanner = Scanner::default();
    let mut depth = 0usize;

    for (idx, line) in source.split_inclusive('\n').enumerate() {
        if !scanner.block_comment
            && let Some((kind, name)) = header(line)
        {
            pending = Some(Pending {
                line: idx,
                kind,
                name: Some(name),
                lines_left: HEADER_LOOKAHEAD,
            });
        }

        for token in scanner.scan(line) {
            match token {
                Token::Open => {
                    if let Some(p) = pending.take() {
                        stack.push(Open {
                            construct: Construct {
                                start: p.line,
                                end: p.line,
                                kind: p.kind,
                                name: p.name,
                                children: Vec::new(),
                                breakpoints: Vec::new(),
                            },
                            depth,
                        });
                    }
                    depth += 1;
                }
                Token::Close => {
                    depth = depth
                        .checked_sub(1)
                        .ok_or(StructuralError::Unbalanced { line: idx + 1 })?;
                    if let Some(mut open) = stack.pop_if(|open| open.depth == depth) {
                        open.construct.end = idx;
                        match stack.last_mut() {
                            Some(parent) => parent.construct.children.push(open.construct),
                            None => roots.push(open.construct),
                        }
                    }
                }
                Token::Semicolon => pending = None,
            }
        }

        if let Some(open) = stack.last_mut()
            && depth == open.depth + 1
            && idx > open.construct.start
            && !line.trim().is_empty()
        {
            open.construct.breakpoints.push(idx);
        }

        if let Some(p) = pending.as_mut()
            && p.line != idx
        {
            p.lines_left = p.lines_left.saturating_sub(1);
            if p.lines_left == 0 {
                pending = None;
            }
        }
    }

    if let Some(open) = stack.first() {
        return Err(StructuralError::Unbalanced {
            line: open.construct.start + 1,
        });
    }
    if depth != 0 {
        return Err(StructuralError::Unbalanced {
            line: source.split_inclusive('\n').count(),
        });
    }
    Ok(roots)
}
