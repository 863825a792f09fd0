//! Bind-parameter placeholder formatting
//!
//! Drivers disagree on placeholder syntax: SQLite and MySQL accept `?` for
//! every parameter while PostgreSQL wants numbered `$1, $2, ...`.

use std::fmt;
use std::sync::Arc;

/// Formats the placeholder for a 1-based parameter position
#[derive(Clone)]
pub struct Placeholder(Arc<dyn Fn(usize) -> String + Send + Sync>);

impl Placeholder {
    /// Same token for every position
    pub fn fixed(token: impl Into<String>) -> Self {
        let token = token.into();
        Self(Arc::new(move |_| token.clone()))
    }

    /// Prefix followed by the position, e.g. `$1`
    pub fn numbered(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        Self(Arc::new(move |n| format!("{}{}", prefix, n)))
    }

    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(usize) -> String + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn format(&self, position: usize) -> String {
        (self.0)(position)
    }
}

impl Default for Placeholder {
    fn default() -> Self {
        Self::fixed("?")
    }
}

impl fmt::Debug for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Placeholder({}, {}, ..)", self.format(1), self.format(2))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed() {
        let p = Placeholder::fixed("?");
        assert_eq!(p.format(1), "?");
        assert_eq!(p.format(42), "?");
    }

    #[test]
    fn test_numbered() {
        let p = Placeholder::numbered("$");
        assert_eq!(p.format(1), "$1");
        assert_eq!(p.format(12), "$12");
    }

    #[test]
    fn test_custom() {
        let p = Placeholder::custom(|n| format!(":p{}", n - 1));
        assert_eq!(p.format(1), ":p0");
    }

    #[test]
    fn test_default_is_question_mark() {
        assert_eq!(Placeholder::default().format(3), "?");
    }
}
