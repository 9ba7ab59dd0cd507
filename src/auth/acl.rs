//! Hierarchical path access control.
//!
//! A permission list is a set of shell-glob patterns. A path is accessible
//! when any pattern matches the path itself or one of its ancestor
//! directories, so granting `/photos` grants everything below it.
//!
//! Glob syntax:
//! - `*` matches any run of characters except `/`
//! - `?` matches a single character except `/`
//! - `[a-z]`, `[^abc]` character classes
//! - `\` escapes the next character
//!
//! There is no recursive `**`. Malformed patterns never match.

/// Return true if any pattern in `patterns` matches `path` or one of its
/// ancestors, walking up until the parent no longer changes.
pub fn can_access<S: AsRef<str>>(patterns: &[S], path: &str) -> bool {
    let mut current = path.to_string();
    loop {
        if patterns
            .iter()
            .any(|pattern| glob_match(pattern.as_ref(), &current))
        {
            return true;
        }

        let parent = dirname(&current);
        if parent == current {
            return false;
        }
        current = parent;
    }
}

/// Match a single glob pattern against the whole of `name`.
pub fn glob_match(pattern: &str, name: &str) -> bool {
    let Some(tokens) = compile(pattern) else {
        return false;
    };
    let name: Vec<char> = name.chars().collect();
    match_tokens(&tokens, &name)
}

/// Lexically clean a slash-separated path.
///
/// Collapses repeated separators, drops `.` elements and resolves `..`
/// against the preceding element. A rooted path never climbs above `/`.
/// An empty result is `.` (relative) or `/` (rooted).
pub fn clean_path(path: &str) -> String {
    let rooted = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => match parts.last() {
                Some(&last) if last != ".." => {
                    parts.pop();
                }
                _ if rooted => {}
                _ => parts.push(".."),
            },
            other => parts.push(other),
        }
    }

    let joined = parts.join("/");
    if rooted {
        format!("/{joined}")
    } else if joined.is_empty() {
        ".".to_string()
    } else {
        joined
    }
}

/// Everything but the last element of `path`, cleaned.
///
/// `dirname("/a/b") == "/a"`, `dirname("/a") == "/"`,
/// `dirname("a") == "."`, and trailing slashes are dropped first:
/// `dirname("/a/b/") == "/a/b"`.
pub fn dirname(path: &str) -> String {
    match path.rfind('/') {
        Some(idx) => clean_path(&path[..=idx]),
        None => ".".to_string(),
    }
}

// -- Pattern compilation -----------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Literal(char),
    /// `?`
    AnyChar,
    /// `*`
    Star,
    Class {
        negated: bool,
        ranges: Vec<(char, char)>,
    },
}

impl Token {
    fn matches(&self, c: char) -> bool {
        match self {
            Token::Literal(l) => *l == c,
            Token::AnyChar => c != '/',
            Token::Star => false,
            Token::Class { negated, ranges } => {
                let hit = ranges.iter().any(|(lo, hi)| *lo <= c && c <= *hi);
                hit != *negated
            }
        }
    }
}

/// Compile `pattern` into tokens, or `None` if the pattern is malformed.
fn compile(pattern: &str) -> Option<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = pattern.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '*' => {
                if tokens.last() != Some(&Token::Star) {
                    tokens.push(Token::Star);
                }
            }
            '?' => tokens.push(Token::AnyChar),
            '\\' => tokens.push(Token::Literal(chars.next()?)),
            '[' => {
                let negated = chars.next_if_eq(&'^').is_some();
                let mut ranges = Vec::new();
                loop {
                    if !ranges.is_empty() && chars.next_if_eq(&']').is_some() {
                        break;
                    }
                    let lo = class_char(&mut chars)?;
                    let hi = if chars.next_if_eq(&'-').is_some() {
                        class_char(&mut chars)?
                    } else {
                        lo
                    };
                    ranges.push((lo, hi));
                }
                tokens.push(Token::Class { negated, ranges });
            }
            other => tokens.push(Token::Literal(other)),
        }
    }

    Some(tokens)
}

/// Read one (possibly escaped) character inside a class. An unescaped `-`
/// or `]` here, or running off the end, makes the pattern malformed.
fn class_char<I: Iterator<Item = char>>(chars: &mut std::iter::Peekable<I>) -> Option<char> {
    match chars.next()? {
        '-' | ']' => None,
        '\\' => chars.next(),
        c => Some(c),
    }
}

fn match_tokens(tokens: &[Token], name: &[char]) -> bool {
    match tokens.split_first() {
        None => name.is_empty(),
        Some((Token::Star, rest)) => {
            let mut i = 0;
            loop {
                if match_tokens(rest, &name[i..]) {
                    return true;
                }
                if i == name.len() || name[i] == '/' {
                    return false;
                }
                i += 1;
            }
        }
        Some((token, rest)) => match name.split_first() {
            Some((c, tail)) if token.matches(*c) => match_tokens(rest, tail),
            _ => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_can_access_table() {
        let cases: &[(&str, &[&str], &str, bool)] = &[
            ("allows subdirectory", &["/foo", "/bar/baz"], "/foo/yarr/pop", true),
            ("allows self", &["/foo", "/bar/baz"], "/bar/baz", true),
            ("allows trailing slash", &["/foo", "/bar/baz"], "/bar/baz/", true),
            ("blocks unrelated", &["/foo", "/bar/baz"], "gibberish", false),
            ("blocks root", &["/foo", "/bar/baz"], "/", false),
            ("blocks sibling prefix", &["/foo"], "/foobar", false),
            ("root permission allows root", &["/"], "/", true),
            ("root permission allows root file", &["/"], "/bar", true),
            ("root permission allows subdirectory", &["/"], "/bar/baz", true),
            ("empty permission blocks root", &[], "/", false),
            ("empty permission blocks root file", &[], "/bar", false),
            ("empty permission blocks subdirectories", &[], "/bar/baz", false),
            ("wildcard dirname allows", &["/bar/baz", "/users/*/data"], "/users/cat/data", true),
            (
                "wildcard dirname allows subdirectories",
                &["/bar/baz", "/users/*/data"],
                "/users/cat/data/dag/dom",
                true,
            ),
            ("wildcard dirname blocks other leaf", &["/users/*/data"], "/users/cat/other", false),
            ("wildcard does not span segments", &["/users/*/data"], "/users/a/b/data", false),
        ];

        for (description, acl, path, expected) in cases {
            assert_eq!(
                can_access(*acl, path),
                *expected,
                "{description}: {acl:?} against {path}"
            );
        }
    }

    #[test]
    fn test_can_access_is_case_sensitive() {
        assert!(!can_access(&["/Foo"], "/foo/bar"));
        assert!(can_access(&["/Foo"], "/Foo/bar"));
    }

    #[test]
    fn test_can_access_order_independent() {
        let path = "/users/cat/data/file.txt";
        assert!(can_access(&["/nope", "/users/*/data"], path));
        assert!(can_access(&["/users/*/data", "/nope"], path));
    }

    #[test]
    fn test_malformed_pattern_never_matches() {
        assert!(!can_access(&["/foo[", "/bar/["], "/foo["));
        assert!(!can_access(&["/foo\\"], "/foo/bar"));
        // A malformed entry does not poison valid ones.
        assert!(can_access(&["[", "/ok"], "/ok/file"));
    }

    #[test]
    fn test_glob_star_and_question() {
        assert!(glob_match("/a/*.txt", "/a/notes.txt"));
        assert!(glob_match("/a/*", "/a/"));
        assert!(!glob_match("/a/*", "/a/b/c"));
        assert!(glob_match("/a/?", "/a/x"));
        assert!(!glob_match("/a?b", "/a/b"));
        assert!(glob_match("*", "anything"));
        assert!(!glob_match("*", "/rooted"));
    }

    #[test]
    fn test_glob_character_classes() {
        assert!(glob_match("/v[0-9]", "/v7"));
        assert!(!glob_match("/v[0-9]", "/vx"));
        assert!(glob_match("/v[^0-9]", "/vx"));
        assert!(!glob_match("/v[^0-9]", "/v3"));
        assert!(glob_match("/[abc]", "/b"));
        assert!(glob_match("/[\\]]", "/]"));
        assert!(!glob_match("/[]", "/]"));
        assert!(!glob_match("/[-a]", "/-"));
    }

    #[test]
    fn test_glob_escape() {
        assert!(glob_match("/a\\*", "/a*"));
        assert!(!glob_match("/a\\*", "/ab"));
    }

    #[test]
    fn test_dirname() {
        assert_eq!(dirname("/a/b"), "/a");
        assert_eq!(dirname("/a"), "/");
        assert_eq!(dirname("/"), "/");
        assert_eq!(dirname("a"), ".");
        assert_eq!(dirname("."), ".");
        assert_eq!(dirname("/a/b/"), "/a/b");
    }

    #[test]
    fn test_clean_path() {
        assert_eq!(clean_path("/"), "/");
        assert_eq!(clean_path(""), ".");
        assert_eq!(clean_path("/a//b/./c/"), "/a/b/c");
        assert_eq!(clean_path("/a/b/../c"), "/a/c");
        assert_eq!(clean_path("/../../etc/passwd"), "/etc/passwd");
        assert_eq!(clean_path("a/../../b"), "../b");
    }
}
