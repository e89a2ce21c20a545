//! Glob pattern matching for extension/exclude/folder filters.
//!
//! Supports `*` (zero or more chars), `?` (exactly one char), and `[set]`
//! (character class); everything else is a literal. Matching is
//! case-insensitive and anchored (whole-string match).
//!
//! An unclosed `[` is treated as a literal `[` rather than an error, per the
//! documented failure semantics. Matching uses a classic O(n*m) two-pointer
//! wildcard algorithm rather than a regex engine, which sidesteps
//! regex-style catastrophic backtracking by construction instead of relying
//! on an evaluation timeout.

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::LazyLock;

const MAX_CACHE_ENTRIES: usize = 100;

#[derive(Debug, Clone)]
enum Token {
    Star,
    Question,
    Class { negate: bool, ranges: Vec<(char, char)> },
    Literal(char),
}

#[derive(Debug, Clone)]
struct CompiledPattern {
    tokens: Vec<Token>,
}

static CACHE: LazyLock<Mutex<FxHashMap<String, CompiledPattern>>> =
    LazyLock::new(|| Mutex::new(FxHashMap::default()));

/// `true` iff `pattern` contains any glob metacharacter.
pub fn contains_wildcards(pattern: &str) -> bool {
    pattern.contains(['*', '?', '['])
}

/// Evaluate whether `input` matches `pattern` (case-insensitive, anchored).
pub fn is_match(input: &str, pattern: &str) -> bool {
    if pattern.is_empty() {
        return false;
    }
    let compiled = compiled_pattern(pattern);
    let input_lower: Vec<char> = input.to_ascii_lowercase().chars().collect();
    match_tokens(&compiled.tokens, &input_lower)
}

/// Return the first pattern in `patterns` that matches `input`, if any.
pub fn try_match_any<'a>(input: &str, patterns: &'a [String]) -> Option<&'a str> {
    patterns
        .iter()
        .map(String::as_str)
        .find(|p| is_match(input, p))
}

fn compiled_pattern(pattern: &str) -> CompiledPattern {
    if let Some(hit) = CACHE.lock().get(pattern).cloned() {
        return hit;
    }
    let compiled = compile(pattern);
    let mut cache = CACHE.lock();
    if cache.len() >= MAX_CACHE_ENTRIES {
        cache.clear();
    }
    cache.insert(pattern.to_string(), compiled.clone());
    compiled
}

fn compile(pattern: &str) -> CompiledPattern {
    let lower: Vec<char> = pattern.to_ascii_lowercase().chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < lower.len() {
        match lower[i] {
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '?' => {
                tokens.push(Token::Question);
                i += 1;
            }
            '[' => {
                if let Some((class, next)) = parse_class(&lower, i) {
                    tokens.push(class);
                    i = next;
                } else {
                    // Unclosed class: treat '[' as a literal.
                    tokens.push(Token::Literal('['));
                    i += 1;
                }
            }
            c => {
                tokens.push(Token::Literal(c));
                i += 1;
            }
        }
    }
    CompiledPattern { tokens }
}

/// Parse a `[...]` class starting at `start` (the index of `[`). Returns the
/// token and the index just past the closing `]`, or `None` if unclosed.
fn parse_class(chars: &[char], start: usize) -> Option<(Token, usize)> {
    let mut i = start + 1;
    let negate = matches!(chars.get(i), Some('!') | Some('^'));
    if negate {
        i += 1;
    }
    let body_start = i;
    while i < chars.len() && chars[i] != ']' {
        i += 1;
    }
    if i >= chars.len() || i == body_start {
        return None;
    }

    let body = &chars[body_start..i];
    let mut ranges = Vec::new();
    let mut j = 0;
    while j < body.len() {
        if j + 2 < body.len() && body[j + 1] == '-' {
            ranges.push((body[j], body[j + 2]));
            j += 3;
        } else {
            ranges.push((body[j], body[j]));
            j += 1;
        }
    }

    Some((Token::Class { negate, ranges }, i + 1))
}

fn class_matches(negate: bool, ranges: &[(char, char)], c: char) -> bool {
    let hit = ranges.iter().any(|&(lo, hi)| c >= lo && c <= hi);
    hit != negate
}

/// Classic two-pointer wildcard match with a single backtrack point for the
/// last seen `*`, giving O(n*m) worst case without exponential blowup.
fn match_tokens(tokens: &[Token], input: &[char]) -> bool {
    let (mut ti, mut ii) = (0usize, 0usize);
    let mut star_t: Option<usize> = None;
    let mut star_i = 0usize;

    while ii < input.len() {
        if ti < tokens.len() && token_matches(&tokens[ti], input[ii]) {
            ti += 1;
            ii += 1;
        } else if ti < tokens.len() && matches!(tokens[ti], Token::Star) {
            star_t = Some(ti);
            star_i = ii;
            ti += 1;
        } else if let Some(st) = star_t {
            ti = st + 1;
            star_i += 1;
            ii = star_i;
        } else {
            return false;
        }
    }

    while ti < tokens.len() && matches!(tokens[ti], Token::Star) {
        ti += 1;
    }

    ti == tokens.len()
}

fn token_matches(token: &Token, c: char) -> bool {
    match token {
        Token::Star => true,
        Token::Question => true,
        Token::Literal(l) => *l == c,
        Token::Class { negate, ranges } => class_matches(*negate, ranges, c),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn star_matches_zero_or_more() {
        assert!(is_match("file.txt", "*.txt"));
        assert!(is_match(".txt", "*.txt"));
        assert!(!is_match("file.txt", "*.csv"));
    }

    #[test]
    fn question_matches_exactly_one() {
        assert!(is_match("a.txt", "?.txt"));
        assert!(!is_match("ab.txt", "?.txt"));
        assert!(!is_match(".txt", "?.txt"));
    }

    #[test]
    fn char_class_matches_range() {
        assert!(is_match("file1.txt", "file[0-9].txt"));
        assert!(!is_match("filea.txt", "file[0-9].txt"));
    }

    #[test]
    fn char_class_negation() {
        assert!(is_match("filea.txt", "file[!0-9].txt"));
        assert!(!is_match("file1.txt", "file[!0-9].txt"));
    }

    #[test]
    fn matching_is_case_insensitive() {
        assert!(is_match("FILE.TXT", "*.txt"));
    }

    #[test]
    fn matching_is_anchored() {
        assert!(!is_match("file.txt.bak", "*.txt"));
    }

    #[test]
    fn unclosed_class_is_literal_bracket() {
        assert!(is_match("a[b.txt", "a[b.txt"));
        assert!(!is_match("ab.txt", "a[b.txt"));
    }

    #[test]
    fn empty_pattern_never_matches() {
        assert!(!is_match("", ""));
        assert!(!is_match("anything", ""));
    }

    #[test]
    fn contains_wildcards_detects_metacharacters() {
        assert!(contains_wildcards("*.txt"));
        assert!(contains_wildcards("file?.txt"));
        assert!(contains_wildcards("file[0-9].txt"));
        assert!(!contains_wildcards(".txt"));
    }

    #[test]
    fn try_match_any_returns_first_hit() {
        let patterns = vec!["*.csv".to_string(), "*.txt".to_string()];
        assert_eq!(try_match_any("file.txt", &patterns), Some("*.txt"));
        assert_eq!(try_match_any("file.json", &patterns), None);
    }

    #[test]
    fn cache_eviction_does_not_change_match_results() {
        for i in 0..150 {
            let pattern = format!("file{i}.txt");
            assert!(is_match(&pattern, &pattern));
        }
    }
}
