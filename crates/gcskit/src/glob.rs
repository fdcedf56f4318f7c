//! Wildcard matching for object paths.
//!
//! Patterns support `*`, `?`, `[...]` classes, and `\` escapes. Wildcards
//! never cross a `/`, so `gs://bucket/*/*` matches exactly two path
//! segments. Matching is done by translating the pattern to an anchored
//! regular expression.

use regex::Regex;

/// Characters that make a pattern a wildcard pattern.
pub(crate) const WILDCARDS: [char; 4] = ['*', '?', '[', '\\'];

/// Whether `text` matches the glob `pattern` in full.
pub(crate) fn glob_matches(text: &str, pattern: &str) -> bool {
    match glob_to_regex(pattern) {
        Some(re) => re.is_match(text),
        None => false,
    }
}

fn glob_to_regex(pattern: &str) -> Option<Regex> {
    let mut regex = String::with_capacity(pattern.len() * 2 + 2);
    regex.push('^');
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => regex.push_str("[^/]*"),
            '?' => regex.push_str("[^/]"),
            '\\' => match chars.next() {
                Some(escaped) => regex.push_str(&regex::escape(&escaped.to_string())),
                None => return None,
            },
            '[' => {
                let mut class = String::from("[");
                if chars.peek() == Some(&'!') {
                    chars.next();
                    class.push('^');
                }
                let mut closed = false;
                for inner in chars.by_ref() {
                    if inner == ']' {
                        closed = true;
                        break;
                    }
                    class.push(inner);
                }
                if !closed {
                    return None;
                }
                class.push(']');
                regex.push_str(&class);
            }
            other => regex.push_str(&regex::escape(&other.to_string())),
        }
    }
    regex.push('$');
    Regex::new(&regex).ok()
}
