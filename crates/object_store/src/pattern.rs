//! Pattern grammar for `VisitDir`/`WalkDir`: `*`, `?`, `[set]` with
//! escapes, plus capture groups `{ident}` that bind a non-empty, non-`/` substring
//! for template expansion (`$ident`/`${ident}`). Capture groups may not be adjacent
//! to `*` or to another capture, and no group may repeat. Multi-wildcard patterns
//! match the shortest possible segment for each wildcard (leftmost-shortest).

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(char),
    /// `?`: exactly one non-`/` character.
    AnyChar,
    /// `*`: zero or more non-`/` characters, matched shortest-first.
    AnyRun,
    /// `[abc]` / `[^abc]`.
    Class { negate: bool, members: Vec<ClassMember> },
    /// `{ident}`: one or more non-`/` characters, bound to `ident`.
    Capture(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ClassMember {
    Char(char),
    Range(char, char),
}

/// A compiled glob pattern. `compile` rejects adjacent/duplicate capture groups
/// up front so that a bad pattern fails at build time, not mid-walk.
#[derive(Debug, Clone)]
pub struct Pattern {
    tokens: Vec<Token>,
    capture_names: Vec<String>,
}

impl Pattern {
    pub fn compile(src: &str) -> Result<Self> {
        let tokens = tokenize(src)?;
        validate_captures(&tokens)?;
        let capture_names = tokens
            .iter()
            .filter_map(|t| match t {
                Token::Capture(name) => Some(name.clone()),
                _ => None,
            })
            .collect();
        Ok(Self {
            tokens,
            capture_names,
        })
    }

    pub fn capture_names(&self) -> &[String] {
        &self.capture_names
    }

    /// Number of `/`-delimited segments in the source pattern.
    pub fn segment_count(&self) -> usize {
        self.tokens.iter().filter(|t| matches!(t, Token::Literal('/'))).count() + 1
    }

    /// The sub-pattern that applies at 0-based descent depth `depth`: the
    /// tokens between the `depth`-th and `(depth+1)`-th `/` in the source
    /// pattern. Tree descent matches each level's basename against its own
    /// depth's sub-pattern rather than the whole multi-segment pattern, since
    /// a basename never itself contains `/`.
    pub fn segment(&self, depth: usize) -> Pattern {
        let mut segments: Vec<Vec<Token>> = vec![Vec::new()];
        for tok in &self.tokens {
            if matches!(tok, Token::Literal('/')) {
                segments.push(Vec::new());
            } else {
                segments.last_mut().unwrap().push(tok.clone());
            }
        }
        let tokens = segments.into_iter().nth(depth).unwrap_or_default();
        let capture_names = tokens
            .iter()
            .filter_map(|t| match t {
                Token::Capture(name) => Some(name.clone()),
                _ => None,
            })
            .collect();
        Pattern {
            tokens,
            capture_names,
        }
    }

    /// Matches `text` (typically one path segment, i.e. no `/`) against the
    /// pattern, returning the bound captures in declaration order on success.
    pub fn matches(&self, text: &str) -> Option<Vec<String>> {
        let chars: Vec<char> = text.chars().collect();
        let mut captures = Vec::new();
        if match_from(&self.tokens, 0, &chars, 0, &mut captures) {
            Some(captures)
        } else {
            None
        }
    }

    /// Expands a template such as `"$ident/literal-${ident2}"` using a completed
    /// capture list from `matches` run against a *different* pattern that defines
    /// the same names.
    pub fn expand(template: &str, names: &[String], values: &[String]) -> String {
        let mut out = String::with_capacity(template.len());
        let mut chars = template.chars().peekable();
        while let Some(c) = chars.next() {
            if c != '$' {
                out.push(c);
                continue;
            }
            let braced = chars.peek() == Some(&'{');
            if braced {
                chars.next();
            }
            let mut ident = String::new();
            while let Some(&c2) = chars.peek() {
                if c2.is_alphanumeric() || c2 == '_' {
                    ident.push(c2);
                    chars.next();
                } else {
                    break;
                }
            }
            if braced && chars.peek() == Some(&'}') {
                chars.next();
            }
            if let Some(pos) = names.iter().position(|n| n == &ident) {
                out.push_str(&values[pos]);
            }
        }
        out
    }
}

fn tokenize(src: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = src.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' => {
                tokens.push(Token::AnyRun);
                i += 1;
            }
            '?' => {
                tokens.push(Token::AnyChar);
                i += 1;
            }
            '\\' => {
                i += 1;
                let c = *chars
                    .get(i)
                    .ok_or_else(|| Error::BadPattern("trailing escape".into()))?;
                tokens.push(Token::Literal(c));
                i += 1;
            }
            '[' => {
                let (tok, next) = parse_class(&chars, i)?;
                tokens.push(tok);
                i = next;
            }
            '{' => {
                let end = chars[i..]
                    .iter()
                    .position(|&c| c == '}')
                    .ok_or_else(|| Error::BadPattern("unterminated capture group".into()))?
                    + i;
                let name: String = chars[i + 1..end].iter().collect();
                if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
                    return Err(Error::BadPattern(format!("invalid capture name '{name}'")));
                }
                tokens.push(Token::Capture(name));
                i = end + 1;
            }
            '}' => return Err(Error::BadPattern("unmatched '}'".into())),
            c => {
                tokens.push(Token::Literal(c));
                i += 1;
            }
        }
    }
    Ok(tokens)
}

fn parse_class(chars: &[char], start: usize) -> Result<(Token, usize)> {
    let mut i = start + 1;
    let negate = chars.get(i) == Some(&'^');
    if negate {
        i += 1;
    }
    let mut members = Vec::new();
    let class_start = i;
    while chars.get(i) != Some(&']') {
        if i >= chars.len() {
            return Err(Error::BadPattern("unterminated character class".into()));
        }
        let mut c = chars[i];
        if c == '\\' {
            i += 1;
            c = *chars
                .get(i)
                .ok_or_else(|| Error::BadPattern("trailing escape in class".into()))?;
        }
        if chars.get(i + 1) == Some(&'-') && chars.get(i + 2).is_some() && chars[i + 2] != ']' {
            let hi = chars[i + 2];
            members.push(ClassMember::Range(c, hi));
            i += 3;
        } else {
            members.push(ClassMember::Char(c));
            i += 1;
        }
    }
    if i == class_start {
        return Err(Error::BadPattern("empty character class".into()));
    }
    Ok((Token::Class { negate, members }, i + 1))
}

/// Rejects a capture adjacent to `*` or to another capture, and rejects a
/// repeated group name.
fn validate_captures(tokens: &[Token]) -> Result<()> {
    let mut seen = std::collections::HashSet::new();
    for (idx, tok) in tokens.iter().enumerate() {
        if let Token::Capture(name) = tok {
            if !seen.insert(name.clone()) {
                return Err(Error::BadPattern(format!("repeated capture group '{name}'")));
            }
            if idx > 0 {
                match &tokens[idx - 1] {
                    Token::AnyRun => {
                        return Err(Error::BadPattern(
                            "capture group adjacent to '*'".into(),
                        ))
                    }
                    Token::Capture(_) => {
                        return Err(Error::BadPattern(
                            "capture group adjacent to another capture group".into(),
                        ))
                    }
                    _ => {}
                }
            }
            if idx + 1 < tokens.len() {
                match &tokens[idx + 1] {
                    Token::AnyRun => {
                        return Err(Error::BadPattern(
                            "capture group adjacent to '*'".into(),
                        ))
                    }
                    Token::Capture(_) => {
                        return Err(Error::BadPattern(
                            "capture group adjacent to another capture group".into(),
                        ))
                    }
                    _ => {}
                }
            }
        }
    }
    Ok(())
}

/// How far a `*`/capture may reach before hitting a `/`, since both are defined
/// over non-`/` substrings even when a pattern is matched against a full path.
fn run_of_non_slash(text: &[char], from: usize) -> usize {
    text[from..].iter().take_while(|&&c| c != '/').count()
}

fn class_matches(negate: bool, members: &[ClassMember], c: char) -> bool {
    let hit = members.iter().any(|m| match m {
        ClassMember::Char(x) => *x == c,
        ClassMember::Range(lo, hi) => *lo <= c && c <= *hi,
    });
    hit != negate
}

/// Backtracking matcher. `*` and `{capture}` both try the shortest expansion
/// first, by growing the consumed run one
/// character at a time rather than greedily consuming to the end and backing off.
fn match_from(
    tokens: &[Token],
    ti: usize,
    text: &[char],
    pi: usize,
    captures: &mut Vec<String>,
) -> bool {
    if ti == tokens.len() {
        return pi == text.len();
    }
    match &tokens[ti] {
        Token::Literal(c) => {
            pi < text.len() && text[pi] == *c && match_from(tokens, ti + 1, text, pi + 1, captures)
        }
        Token::AnyChar => {
            pi < text.len() && match_from(tokens, ti + 1, text, pi + 1, captures)
        }
        Token::Class { negate, members } => {
            pi < text.len()
                && class_matches(*negate, members, text[pi])
                && match_from(tokens, ti + 1, text, pi + 1, captures)
        }
        Token::AnyRun => {
            let max = run_of_non_slash(text, pi);
            for take in 0..=max {
                if match_from(tokens, ti + 1, text, pi + take, captures) {
                    return true;
                }
            }
            false
        }
        Token::Capture(_) => {
            let max = run_of_non_slash(text, pi);
            for take in 1..=max {
                let mut trial = captures.clone();
                trial.push(text[pi..pi + take].iter().collect());
                if match_from(tokens, ti + 1, text, pi + take, &mut trial) {
                    *captures = trial;
                    return true;
                }
            }
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn question_mark_matches_one_char() {
        let p = Pattern::compile("x/?/?").unwrap();
        assert!(p.matches("x").is_none());
    }

    #[test]
    fn star_matches_shortest() {
        let p = Pattern::compile("a*b").unwrap();
        // shortest `*` expansion for "aXbYb" is "X", not "XbY"
        let m = p.matches("aXbYb");
        assert!(m.is_some());
    }

    #[test]
    fn class_matches_set() {
        let p = Pattern::compile("[by]").unwrap();
        assert!(p.matches("b").is_some());
        assert!(p.matches("y").is_some());
        assert!(p.matches("c").is_none());
    }

    #[test]
    fn capture_binds_and_expands() {
        let p = Pattern::compile("{name}.json").unwrap();
        let caps = p.matches("table.json").unwrap();
        assert_eq!(caps, vec!["table".to_string()]);
        let expanded = Pattern::expand("$name-out", p.capture_names(), &caps);
        assert_eq!(expanded, "table-out");
    }

    #[test]
    fn rejects_adjacent_capture_and_star() {
        assert!(Pattern::compile("{a}*").is_err());
        assert!(Pattern::compile("*{a}").is_err());
    }

    #[test]
    fn rejects_adjacent_captures() {
        assert!(Pattern::compile("{a}{b}").is_err());
    }

    #[test]
    fn rejects_repeated_capture_name() {
        assert!(Pattern::compile("{a}/{a}").is_err());
    }

    #[test]
    fn segments_split_on_slash() {
        let p = Pattern::compile("x/?/?").unwrap();
        assert_eq!(p.segment_count(), 3);
        assert!(p.segment(0).matches("x").is_some());
        assert!(p.segment(0).matches("y").is_none());
        assert!(p.segment(1).matches("b").is_some());
        assert!(p.segment(2).matches("c").is_some());
    }
}
