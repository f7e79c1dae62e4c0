//! Qualified names.
//!
//! A [`QName`] is the triple `(namespace, prefix, local)`. The prefix is only
//! a lexical convenience: two names are equal exactly when their namespace
//! URI and local part are equal, whatever prefixes were used to write them.
//! The prefix-free string form (`namespace:local`, or just `local`) and its
//! hash are computed once at construction time.

use core::fmt;
use core::hash::{Hash, Hasher};

use ecow::EcoString;

use crate::format;

#[derive(Clone)]
pub struct QName {
    namespace: Option<EcoString>,
    prefix: Option<EcoString>,
    local: EcoString,
    string: EcoString,
    hash: u64,
}

impl QName {
    pub fn new(
        namespace: Option<impl Into<EcoString>>,
        prefix: Option<impl Into<EcoString>>,
        local: impl Into<EcoString>,
    ) -> Self {
        let namespace = namespace.map(Into::into).filter(|ns| !ns.is_empty());
        let prefix = prefix.map(Into::into).filter(|p| !p.is_empty());
        let local = local.into();
        let string = Self::string_form(namespace.as_deref(), &local);
        let hash = seahash::hash(string.as_bytes());
        Self {
            namespace,
            prefix,
            local,
            string,
            hash,
        }
    }

    /// A name in no namespace.
    pub fn local(local: impl Into<EcoString>) -> Self {
        Self::new(None::<EcoString>, None::<EcoString>, local)
    }

    /// Parse a lexical `prefix:local` (or `local`) name, resolving the prefix
    /// with `resolve`. Returns `None` when the name is malformed (empty
    /// parts, more than one colon) or the prefix is not bound.
    pub fn parse<'a>(
        lexical: &str,
        resolve: impl FnOnce(&str) -> Option<&'a str>,
    ) -> Option<Self> {
        let mut parts = lexical.split(':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(local), None, _) if !local.is_empty() => Some(Self::local(local)),
            (Some(prefix), Some(local), None) if !prefix.is_empty() && !local.is_empty() => {
                let namespace = resolve(prefix)?;
                Some(Self::new(Some(namespace), Some(prefix), local))
            }
            _ => None,
        }
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    pub fn local_part(&self) -> &str {
        &self.local
    }

    /// The prefix-free string form used for equality and hashing.
    pub fn as_str(&self) -> &str {
        &self.string
    }

    /// The name as it was written, `prefix:local` or `local`.
    pub fn lexical(&self) -> EcoString {
        match &self.prefix {
            Some(prefix) => format!("{}:{}", prefix, self.local).into(),
            None => self.local.clone(),
        }
    }

    /// Drop the namespace URI (and prefix), recomputing the cached string
    /// and hash. This is the only mutation a `QName` allows; it is used to
    /// normalize names that must be compared by local part only.
    pub fn clear_namespace(&mut self) {
        self.namespace = None;
        self.prefix = None;
        self.string = self.local.clone();
        self.hash = seahash::hash(self.string.as_bytes());
    }

    fn string_form(namespace: Option<&str>, local: &EcoString) -> EcoString {
        match namespace {
            Some(namespace) => format!("{}:{}", namespace, local).into(),
            None => local.clone(),
        }
    }
}

impl PartialEq for QName {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.string == other.string
    }
}

impl Eq for QName {}

impl Hash for QName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.string)
    }
}

impl fmt::Debug for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "QName({})", self.string)
    }
}

impl From<&str> for QName {
    fn from(local: &str) -> Self {
        QName::local(local)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hashbrown::HashSet;

    const XSL: &str = "http://www.w3.org/1999/XSL/Transform";

    #[test]
    fn test_equality_ignores_prefix() {
        let a = QName::new(Some(XSL), Some("xsl"), "if");
        let b = QName::new(Some(XSL), Some("x"), "if");
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "http://www.w3.org/1999/XSL/Transform:if");
        assert_eq!(a.lexical(), "xsl:if");
        assert_eq!(b.lexical(), "x:if");
    }

    #[test]
    fn test_namespace_distinguishes_names() {
        let a = QName::new(Some(XSL), Some("xsl"), "if");
        let b = QName::local("if");
        assert_ne!(a, b);

        let mut set = HashSet::new();
        set.insert(a.clone());
        assert!(set.contains(&QName::new(Some(XSL), Some("other"), "if")));
        assert!(!set.contains(&b));
    }

    #[test]
    fn test_clear_namespace() {
        let mut a = QName::new(Some(XSL), Some("xsl"), "if");
        a.clear_namespace();
        assert_eq!(a, QName::local("if"));
        assert_eq!(a.as_str(), "if");
        assert_eq!(a.prefix(), None);
    }

    #[test]
    fn test_empty_namespace_is_no_namespace() {
        assert_eq!(QName::new(Some(""), Some(""), "a"), QName::local("a"));
    }

    #[test]
    fn test_parse_resolves_prefix() {
        let name = QName::parse("xsl:template", |p| (p == "xsl").then_some(XSL)).unwrap();
        assert_eq!(name.namespace(), Some(XSL));
        assert_eq!(name.local_part(), "template");

        assert!(QName::parse("nonexistent:elt", |_| None).is_none());
        assert_eq!(QName::parse("plain", |_| None), Some(QName::local("plain")));
    }

    #[test]
    fn test_parse_rejects_malformed_names() {
        let xsl = |p: &str| (p == "xsl").then_some(XSL);
        for lexical in ["xsl:a:b", ":if", "xsl:", "", ":"] {
            assert_eq!(QName::parse(lexical, xsl), None, "{:?}", lexical);
        }
    }

    #[test]
    fn test_cached_hash_is_stable() {
        let a = QName::new(Some(XSL), Some("xsl"), "if");
        let b = QName::new(Some(XSL), Some("x"), "if");
        assert_eq!(a.hash, b.hash);
        assert_eq!(a.hash, seahash::hash(a.as_str().as_bytes()));

        let mut cleared = a.clone();
        cleared.clear_namespace();
        assert_eq!(cleared.hash, QName::local("if").hash);
    }
}
