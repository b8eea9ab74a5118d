//! Lexical deny-list scanner for Python plugin sources.
//!
//! The scanner tokenises each source file well enough to skip strings and
//! comments and to track bracket nesting, then looks for imports of denied
//! modules and calls to denied builtins. Replacement fields of f-strings are
//! code and are tokenised like the rest of the file. It blocks the constructs, not
//! arbitrary behaviour: code reaching the same effect through reflection is
//! not detected. Files that fail to tokenise are rejected as syntax errors.

use std::fmt;

/// Top-level modules a plugin may not import.
pub const DENIED_IMPORTS: &[&str] = &[
    "os",
    "subprocess",
    "shutil",
    "pty",
    "ctypes",
    "socket",
    "multiprocessing",
    "importlib",
    "commands",
    "popen2",
];

/// Callables a plugin may not invoke.
pub const DENIED_CALLS: &[&str] = &[
    "eval",
    "exec",
    "compile",
    "execfile",
    "__import__",
    "import_module",
];

/// Denied callables that are also rejected when reached as an attribute.
const DENIED_ATTRIBUTE_CALLS: &[&str] = &["__import__", "import_module"];

/// A single problem reported by the scanner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    /// File the problem was found in, relative to the plugin root.
    pub file: String,
    /// 1-based line number.
    pub line: usize,
    /// What was found.
    pub problem: Problem,
}

/// Category of a scanner finding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Problem {
    /// Import of a denied module.
    DeniedImport(String),
    /// Call to a denied callable.
    DeniedCall(String),
    /// The file could not be tokenised.
    Syntax(String),
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.problem {
            Problem::DeniedImport(module) => {
                write!(f, "denied import `{module}` in {}:{}", self.file, self.line)
            }
            Problem::DeniedCall(name) => {
                write!(f, "denied call `{name}()` in {}:{}", self.file, self.line)
            }
            Problem::Syntax(reason) => {
                write!(f, "syntax error in {}:{}: {reason}", self.file, self.line)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TokenKind {
    Name(String),
    Punct(char),
    Literal,
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    line: usize,
}

impl Token {
    fn name(&self) -> Option<&str> {
        match &self.kind {
            TokenKind::Name(name) => Some(name),
            _ => None,
        }
    }

    fn is_punct(&self, c: char) -> bool {
        self.kind == TokenKind::Punct(c)
    }
}

struct SyntaxError {
    line: usize,
    reason: String,
}

const STRING_PREFIXES: &[&str] = &["r", "u", "b", "f", "br", "rb", "fr", "rf"];

fn tokenize(source: &str) -> Result<Vec<Token>, SyntaxError> {
    let chars: Vec<char> = source.chars().collect();
    tokenize_chars(&chars, 1)
}

fn tokenize_chars(chars: &[char], first_line: usize) -> Result<Vec<Token>, SyntaxError> {
    let mut tokens = Vec::new();
    let mut brackets: Vec<(char, usize)> = Vec::new();
    let mut line = first_line;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\n' => {
                line += 1;
                i += 1;
            }
            '#' => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '\\' if chars.get(i + 1) == Some(&'\n') => {
                line += 1;
                i += 2;
            }
            '\\' if chars.get(i + 1) == Some(&'\r') && chars.get(i + 2) == Some(&'\n') => {
                line += 1;
                i += 3;
            }
            '\'' | '"' => {
                let start = line;
                i = skip_string(chars, i, &mut line)?;
                tokens.push(Token {
                    kind: TokenKind::Literal,
                    line: start,
                });
            }
            c if c.is_whitespace() => i += 1,
            c if c.is_ascii_digit() => {
                while i < chars.len() && (chars[i].is_alphanumeric() || matches!(chars[i], '_' | '.')) {
                    i += 1;
                }
                tokens.push(Token {
                    kind: TokenKind::Literal,
                    line,
                });
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                let quoted = matches!(chars.get(i), Some('\'' | '"'));
                let prefix = word.to_ascii_lowercase();
                if quoted && prefix.contains('f') && STRING_PREFIXES.contains(&prefix.as_str()) {
                    i = skip_fstring(chars, i, &mut line, &mut tokens)?;
                } else if quoted && STRING_PREFIXES.contains(&prefix.as_str()) {
                    let start_line = line;
                    i = skip_string(chars, i, &mut line)?;
                    tokens.push(Token {
                        kind: TokenKind::Literal,
                        line: start_line,
                    });
                } else {
                    tokens.push(Token {
                        kind: TokenKind::Name(word),
                        line,
                    });
                }
            }
            '(' | '[' | '{' => {
                brackets.push((c, line));
                tokens.push(Token {
                    kind: TokenKind::Punct(c),
                    line,
                });
                i += 1;
            }
            ')' | ']' | '}' => {
                let expected = match c {
                    ')' => '(',
                    ']' => '[',
                    _ => '{',
                };
                match brackets.pop() {
                    Some((open, _)) if open == expected => {}
                    Some((open, open_line)) => {
                        return Err(SyntaxError {
                            line,
                            reason: format!(
                                "closing '{c}' does not match '{open}' opened on line {open_line}"
                            ),
                        });
                    }
                    None => {
                        return Err(SyntaxError {
                            line,
                            reason: format!("unmatched '{c}'"),
                        });
                    }
                }
                tokens.push(Token {
                    kind: TokenKind::Punct(c),
                    line,
                });
                i += 1;
            }
            '$' | '?' | '`' => {
                return Err(SyntaxError {
                    line,
                    reason: format!("invalid character '{c}'"),
                });
            }
            _ => {
                tokens.push(Token {
                    kind: TokenKind::Punct(c),
                    line,
                });
                i += 1;
            }
        }
    }

    if let Some((open, open_line)) = brackets.pop() {
        return Err(SyntaxError {
            line: open_line,
            reason: format!("'{open}' was never closed"),
        });
    }
    Ok(tokens)
}

/// Skips a string literal starting at the opening quote, returning the index
/// just past the closing quote.
fn skip_string(chars: &[char], start: usize, line: &mut usize) -> Result<usize, SyntaxError> {
    let quote = chars[start];
    let triple = chars.get(start + 1) == Some(&quote) && chars.get(start + 2) == Some(&quote);
    let start_line = *line;
    let mut i = if triple { start + 3 } else { start + 1 };

    while i < chars.len() {
        match chars[i] {
            '\\' => {
                if chars.get(i + 1) == Some(&'\n') {
                    *line += 1;
                }
                i += 2;
            }
            '\n' if !triple => break,
            '\n' => {
                *line += 1;
                i += 1;
            }
            c if c == quote => {
                if !triple {
                    return Ok(i + 1);
                }
                if chars.get(i + 1) == Some(&quote) && chars.get(i + 2) == Some(&quote) {
                    return Ok(i + 3);
                }
                i += 1;
            }
            _ => i += 1,
        }
    }

    Err(SyntaxError {
        line: start_line,
        reason: if triple {
            "unterminated triple-quoted string".to_owned()
        } else {
            "unterminated string literal".to_owned()
        },
    })
}

/// Skips an f-string starting at the opening quote, tokenising each
/// replacement field into `tokens`. Returns the index just past the closing
/// quote.
fn skip_fstring(
    chars: &[char],
    start: usize,
    line: &mut usize,
    tokens: &mut Vec<Token>,
) -> Result<usize, SyntaxError> {
    let quote = chars[start];
    let triple = chars.get(start + 1) == Some(&quote) && chars.get(start + 2) == Some(&quote);
    let start_line = *line;
    let mut i = if triple { start + 3 } else { start + 1 };
    tokens.push(Token {
        kind: TokenKind::Literal,
        line: start_line,
    });

    while i < chars.len() {
        match chars[i] {
            '\\' => {
                if chars.get(i + 1) == Some(&'\n') {
                    *line += 1;
                }
                i += 2;
            }
            '{' | '}' if chars.get(i + 1) == Some(&chars[i]) => i += 2,
            '{' => i = replacement_field(chars, i, triple, line, tokens)?,
            '\n' if !triple => break,
            '\n' => {
                *line += 1;
                i += 1;
            }
            c if c == quote => {
                if !triple {
                    return Ok(i + 1);
                }
                if chars.get(i + 1) == Some(&quote) && chars.get(i + 2) == Some(&quote) {
                    return Ok(i + 3);
                }
                i += 1;
            }
            _ => i += 1,
        }
    }

    Err(SyntaxError {
        line: start_line,
        reason: "unterminated f-string".to_owned(),
    })
}

/// Tokenises the replacement field opened at `open`, including fields nested
/// in its format spec. Returns the index just past the closing brace.
fn replacement_field(
    chars: &[char],
    open: usize,
    triple: bool,
    line: &mut usize,
    tokens: &mut Vec<Token>,
) -> Result<usize, SyntaxError> {
    let field_line = *line;
    let mut depth = 0_usize;
    let mut in_spec = false;
    let mut i = open + 1;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\'' | '"' if !in_spec => i = skip_string(chars, i, line)?,
            '(' | '[' | '{' if !in_spec => {
                depth += 1;
                i += 1;
            }
            ')' | ']' if !in_spec => {
                depth = depth.saturating_sub(1);
                i += 1;
            }
            '}' if !in_spec && depth > 0 => {
                depth -= 1;
                i += 1;
            }
            // `!r` conversion or `:spec`; `!=` stays part of the expression.
            '!' | ':' if !in_spec && depth == 0 && !(c == '!' && chars.get(i + 1) == Some(&'=')) => {
                tokens.extend(tokenize_chars(&chars[open + 1..i], field_line)?);
                in_spec = true;
                i += 1;
            }
            '{' => i = replacement_field(chars, i, triple, line, tokens)?,
            '}' => {
                if !in_spec {
                    tokens.extend(tokenize_chars(&chars[open + 1..i], field_line)?);
                }
                tokens.push(Token {
                    kind: TokenKind::Literal,
                    line: *line,
                });
                return Ok(i + 1);
            }
            '\n' if !triple => break,
            '\n' => {
                *line += 1;
                i += 1;
            }
            _ => i += 1,
        }
    }

    Err(SyntaxError {
        line: field_line,
        reason: "unterminated f-string replacement field".to_owned(),
    })
}

/// Reads a dotted name starting at `i`, returning its first segment and the
/// index of the first token after it.
fn dotted_name(tokens: &[Token], mut i: usize) -> Option<(&str, usize)> {
    let root = tokens.get(i)?.name()?;
    i += 1;
    while tokens.get(i).is_some_and(|token| token.is_punct('.'))
        && tokens.get(i + 1).and_then(Token::name).is_some()
    {
        i += 2;
    }
    Some((root, i))
}

fn denied_module(root: &str) -> bool {
    DENIED_IMPORTS.contains(&root)
}

/// Scans one Python source file.
///
/// Returns every finding in source order; an empty list means the file
/// passed. A tokenisation failure yields a single syntax finding.
#[must_use]
pub fn scan_source(file: &str, source: &str) -> Vec<Finding> {
    let tokens = match tokenize(source) {
        Ok(tokens) => tokens,
        Err(err) => {
            return vec![Finding {
                file: file.to_owned(),
                line: err.line,
                problem: Problem::Syntax(err.reason),
            }];
        }
    };

    let mut findings = Vec::new();
    let mut report = |line: usize, problem: Problem| {
        findings.push(Finding {
            file: file.to_owned(),
            line,
            problem,
        });
    };

    let mut i = 0;
    while i < tokens.len() {
        let token = &tokens[i];
        match token.name() {
            Some("from") => {
                // `from a.b import c`; relative imports (`from . import c`) are local.
                if let Some((root, next)) = dotted_name(&tokens, i + 1) {
                    if tokens.get(next).and_then(Token::name) == Some("import") {
                        if denied_module(root) {
                            report(token.line, Problem::DeniedImport(root.to_owned()));
                        }
                        i = next + 1;
                        continue;
                    }
                }
                i += 1;
            }
            Some("import") => {
                let mut cursor = i + 1;
                while let Some((root, next)) = dotted_name(&tokens, cursor) {
                    if denied_module(root) {
                        report(token.line, Problem::DeniedImport(root.to_owned()));
                    }
                    cursor = next;
                    if tokens.get(cursor).and_then(Token::name) == Some("as") {
                        cursor += 2;
                    }
                    if tokens.get(cursor).is_some_and(|t| t.is_punct(',')) {
                        cursor += 1;
                    } else {
                        break;
                    }
                }
                i = cursor.max(i + 1);
            }
            Some(name) if DENIED_CALLS.contains(&name) => {
                let called = tokens.get(i + 1).is_some_and(|t| t.is_punct('('));
                let previous = i.checked_sub(1).map(|p| &tokens[p]);
                let defined = previous.and_then(Token::name) == Some("def");
                let attribute = previous.is_some_and(|t| t.is_punct('.'));
                if called
                    && !defined
                    && (!attribute || DENIED_ATTRIBUTE_CALLS.contains(&name))
                {
                    report(token.line, Problem::DeniedCall(name.to_owned()));
                }
                i += 1;
            }
            _ => i += 1,
        }
    }

    findings
}

#[cfg(test)]
mod tests {
    use super::*;

    fn problems(source: &str) -> Vec<Problem> {
        scan_source("main.py", source)
            .into_iter()
            .map(|finding| finding.problem)
            .collect()
    }

    #[test]
    fn clean_source_passes() {
        let source = r#"
import json
import re
from dataclasses import dataclass
from . import helpers

PATTERN = re.compile(r"\d+")

def run(payload):
    """Returns the weather. Mentions os.system and eval() harmlessly."""
    # import subprocess
    return {"ok": True, "text": "import os"}
"#;
        assert!(problems(source).is_empty());
    }

    #[test]
    fn denied_imports_detected() {
        assert_eq!(
            problems("import os\n"),
            [Problem::DeniedImport("os".into())]
        );
        assert_eq!(
            problems("import json, subprocess as sp\n"),
            [Problem::DeniedImport("subprocess".into())]
        );
        assert_eq!(
            problems("from os.path import join\n"),
            [Problem::DeniedImport("os".into())]
        );
        assert_eq!(
            problems("if True:\n    import ctypes.util\n"),
            [Problem::DeniedImport("ctypes".into())]
        );
        assert!(problems("import osmosis\nfrom socketserver import TCPServer\n").is_empty());
    }

    #[test]
    fn denied_calls_detected() {
        assert_eq!(
            problems("x = eval('1 + 1')\n"),
            [Problem::DeniedCall("eval".into())]
        );
        assert_eq!(
            problems("mod = __import__('json')\n"),
            [Problem::DeniedCall("__import__".into())]
        );
        assert_eq!(
            problems("loader.import_module('x')\n"),
            [Problem::DeniedCall("import_module".into())]
        );
        assert!(problems("def exec(self):\n    pass\n").is_empty());
        assert!(problems("value = rx.compile(text)\nf = eval\n").is_empty());
    }

    #[test]
    fn tokenisation_errors_are_syntax_findings() {
        let findings = scan_source("bad.py", "x = 'unterminated\n");
        assert!(matches!(findings[0].problem, Problem::Syntax(_)));
        assert_eq!(findings[0].line, 1);

        assert!(matches!(
            problems("call(1, 2\n")[0],
            Problem::Syntax(_)
        ));
        assert!(matches!(problems("x = [1, 2)\n")[0], Problem::Syntax(_)));
        assert!(matches!(
            problems("doc = \"\"\"never closed\n")[0],
            Problem::Syntax(_)
        ));
    }

    #[test]
    fn multiline_strings_and_continuations_track_lines() {
        let source = "doc = '''\nimport os\n'''\nvalue = 1 + \\\n    2\nimport shutil\n";
        let findings = scan_source("main.py", source);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].line, 6);
        assert_eq!(
            findings[0].to_string(),
            "denied import `shutil` in main.py:6"
        );
    }

    #[test]
    fn prefixed_strings_are_skipped() {
        assert!(problems("x = rb'import os'\ny = u\"eval('1')\"\n").is_empty());
        assert!(problems("x = f'import os {name!r:>{width}} {{eval(1)}}'\n").is_empty());
        assert!(problems("y = f\"{eval}\"\n").is_empty());
    }

    #[test]
    fn fstring_fields_are_scanned() {
        assert_eq!(
            problems("x = f\"{eval('1+1')}\"\n"),
            [Problem::DeniedCall("eval".into())]
        );
        assert_eq!(
            problems("x = f\"{__import__('os').system('id')}\"\n"),
            [Problem::DeniedCall("__import__".into())]
        );
        assert_eq!(
            problems("x = Rf'{value:{exec(code)}}'\n"),
            [Problem::DeniedCall("exec".into())]
        );
        assert_eq!(
            problems("x = f'{f\"{compile(src)}\"}'\n"),
            [Problem::DeniedCall("compile".into())]
        );

        let findings = scan_source("main.py", "s = f\"\"\"\nok {a != b}\n{eval(x)}\n\"\"\"\n");
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].line, 3);
        assert!(matches!(problems("x = f'{eval(1)'\n")[0], Problem::Syntax(_)));
    }
}
