//! Key segmentation and delete-pattern parsing.

use crate::config::WILDCARD;

/// Split a user key into its path segments.
pub fn segments<'a>(key: &'a str, separator: &str) -> Vec<&'a str> {
    key.split(separator).collect()
}

/// A parsed delete target.
///
/// `a:b:c` is an exact path, `a:b:*` is a wildcard over everything at and
/// below `a:b`. Only a trailing `*` is special; a `*` anywhere else is an
/// ordinary segment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KeyPattern {
    Exact(Vec<String>),
    Wildcard(Vec<String>),
}

impl KeyPattern {
    /// Parse a pattern string using the given separator.
    ///
    /// # Example
    ///
    /// ```
    /// use cachegate::key::KeyPattern;
    ///
    /// let pattern = KeyPattern::parse("themes:tenant-1:*", ":");
    /// assert!(pattern.is_wildcard());
    /// assert_eq!(pattern.path(), ["themes", "tenant-1"]);
    /// ```
    pub fn parse(pattern: &str, separator: &str) -> Self {
        let mut items: Vec<String> = pattern.split(separator).map(str::to_string).collect();
        if items.last().map(String::as_str) == Some(WILDCARD) {
            items.pop();
            KeyPattern::Wildcard(items)
        } else {
            KeyPattern::Exact(items)
        }
    }

    /// Segments addressed by the pattern, without the trailing wildcard.
    pub fn path(&self) -> &[String] {
        match self {
            KeyPattern::Exact(path) | KeyPattern::Wildcard(path) => path,
        }
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self, KeyPattern::Wildcard(_))
    }

    /// Render as a backend glob under a prefix, for stores with native
    /// wildcard matching.
    ///
    /// Glob metacharacters inside segments are escaped so only the trailing
    /// wildcard matches more than one key.
    pub fn to_glob(&self, prefix: &str, separator: &str) -> String {
        let escaped: Vec<String> = self.path().iter().map(|s| escape_glob(s)).collect();
        let mut glob = format!("{}{}{}", escape_glob(prefix), separator, escaped.join(separator));
        if self.is_wildcard() {
            if !escaped.is_empty() {
                glob.push_str(separator);
            }
            glob.push('*');
        }
        glob
    }
}

fn escape_glob(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Match a key against a glob produced by [`KeyPattern::to_glob`].
///
/// Supports `*` (any run), `?` (any char) and backslash escapes, which is the
/// subset the clients generate.
pub fn glob_match(glob: &str, key: &str) -> bool {
    let pattern: Vec<char> = glob.chars().collect();
    let text: Vec<char> = key.chars().collect();
    glob_match_from(&pattern, &text)
}

fn glob_match_from(pattern: &[char], text: &[char]) -> bool {
    match pattern.first() {
        None => text.is_empty(),
        Some('*') => (0..=text.len()).any(|i| glob_match_from(&pattern[1..], &text[i..])),
        Some('?') => !text.is_empty() && glob_match_from(&pattern[1..], &text[1..]),
        Some('\\') if pattern.len() > 1 => {
            text.first() == Some(&pattern[1]) && glob_match_from(&pattern[2..], &text[1..])
        }
        Some(c) => text.first() == Some(c) && glob_match_from(&pattern[1..], &text[1..]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segments() {
        let parts = segments("user:123:profile", ":");
        assert_eq!(parts, vec!["user", "123", "profile"]);
    }

    #[test]
    fn test_parse_exact() {
        let pattern = KeyPattern::parse("a:b:c", ":");
        assert_eq!(
            pattern,
            KeyPattern::Exact(vec!["a".into(), "b".into(), "c".into()])
        );
    }

    #[test]
    fn test_parse_wildcard() {
        let pattern = KeyPattern::parse("a:b:*", ":");
        assert_eq!(pattern, KeyPattern::Wildcard(vec!["a".into(), "b".into()]));

        let everything = KeyPattern::parse("*", ":");
        assert_eq!(everything, KeyPattern::Wildcard(vec![]));
    }

    #[test]
    fn test_inner_star_is_literal() {
        let pattern = KeyPattern::parse("a:*:c", ":");
        assert!(!pattern.is_wildcard());
        assert_eq!(pattern.path(), ["a", "*", "c"]);
    }

    #[test]
    fn test_to_glob() {
        let pattern = KeyPattern::parse("a:b:*", ":");
        assert_eq!(pattern.to_glob("app", ":"), "app:a:b:*");

        let exact = KeyPattern::parse("a:b", ":");
        assert_eq!(exact.to_glob("app", ":"), "app:a:b");

        let everything = KeyPattern::parse("*", ":");
        assert_eq!(everything.to_glob("app", ":"), "app:*");
    }

    #[test]
    fn test_glob_escapes_metacharacters() {
        let pattern = KeyPattern::parse("a?:b:*", ":");
        let glob = pattern.to_glob("app", ":");
        assert_eq!(glob, "app:a\\?:b:*");
        assert!(glob_match(&glob, "app:a?:b:c"));
        assert!(!glob_match(&glob, "app:ax:b:c"));
    }

    #[test]
    fn test_glob_match() {
        assert!(glob_match("app:a:b:*", "app:a:b:c"));
        assert!(glob_match("app:a:b:*", "app:a:b:c:d"));
        assert!(!glob_match("app:a:b:*", "app:a:b"));
        assert!(!glob_match("app:a:b:*", "app:a:x:y"));
        assert!(glob_match("app:a:b", "app:a:b"));
    }
}
