//! Cache key conventions
//!
//! Keys follow `"<domain>:<scope>[:<qualifier>]"`, e.g. `project:42:summary`.
//! `invalidate_project` relies on callers using this shape.

use std::fmt;

/// Domains cleared by a project-wide invalidation
pub const PROJECT_DOMAINS: [&str; 3] = ["project", "analytics", "users"];

/// Builder for conventional cache keys
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    domain: String,
    scope: String,
    qualifier: Option<String>,
}

impl CacheKey {
    pub fn new(domain: impl Into<String>, scope: impl fmt::Display) -> Self {
        Self {
            domain: domain.into(),
            scope: scope.to_string(),
            qualifier: None,
        }
    }

    pub fn with(mut self, qualifier: impl fmt::Display) -> Self {
        self.qualifier = Some(qualifier.to_string());
        self
    }

    /// Pattern matching every key under this domain and scope
    pub fn scope_pattern(&self) -> String {
        format!("{}:{}:*", self.domain, self.scope)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.qualifier {
            Some(qualifier) => write!(f, "{}:{}:{}", self.domain, self.scope, qualifier),
            None => write!(f, "{}:{}", self.domain, self.scope),
        }
    }
}

impl From<CacheKey> for String {
    fn from(key: CacheKey) -> Self {
        key.to_string()
    }
}

/// The three invalidation patterns for a project
pub fn project_prefixes(project_id: impl fmt::Display) -> [String; 3] {
    PROJECT_DOMAINS.map(|domain| CacheKey::new(domain, &project_id).scope_pattern())
}

/// How `delete_pattern` interprets its argument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPattern<'a> {
    /// No wildcard: the single key with this exact name
    Exact(&'a str),
    /// Every key starting with this literal text
    Prefix(&'a str),
}

impl<'a> KeyPattern<'a> {
    /// Everything before the first wildcard (`*`, `?` or `[`) is the
    /// literal prefix; the rest of the pattern is ignored.
    pub fn parse(pattern: &'a str) -> Self {
        match pattern.find(['*', '?', '[']) {
            Some(pos) => Self::Prefix(&pattern[..pos]),
            None => Self::Exact(pattern),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_cache_key_rendering() {
        assert_eq!(CacheKey::new("project", 42).to_string(), "project:42");
        assert_eq!(
            CacheKey::new("project", 42).with("summary").to_string(),
            "project:42:summary"
        );
        assert_eq!(CacheKey::new("users", 7).scope_pattern(), "users:7:*");
    }

    #[test]
    fn test_project_prefixes() {
        assert_eq!(
            project_prefixes(42),
            [
                "project:42:*".to_string(),
                "analytics:42:*".to_string(),
                "users:42:*".to_string()
            ]
        );
    }

    #[test]
    fn test_pattern_parsing() {
        assert_eq!(KeyPattern::parse("project:42:*"), KeyPattern::Prefix("project:42:"));
        assert_eq!(KeyPattern::parse("a?b*"), KeyPattern::Prefix("a"));
        assert_eq!(KeyPattern::parse("*"), KeyPattern::Prefix(""));
        assert_eq!(KeyPattern::parse("project:42"), KeyPattern::Exact("project:42"));
    }

    proptest! {
        #[test]
        fn prefix_is_literal_head_of_pattern(head in "[a-z0-9:_-]{0,24}", tail in "[a-z0-9:*?]{0,8}") {
            let pattern = format!("{head}*{tail}");
            prop_assert_eq!(KeyPattern::parse(&pattern), KeyPattern::Prefix(head.as_str()));
        }

        #[test]
        fn scope_pattern_covers_qualified_keys(scope in 0u64..10_000, qualifier in "[a-z]{1,12}") {
            let key = CacheKey::new("project", scope).with(&qualifier).to_string();
            let pattern = CacheKey::new("project", scope).scope_pattern();
            match KeyPattern::parse(&pattern) {
                KeyPattern::Prefix(prefix) => prop_assert!(key.starts_with(prefix)),
                KeyPattern::Exact(_) => prop_assert!(false, "scope pattern must be a prefix"),
            }
        }
    }
}
