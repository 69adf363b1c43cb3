//! Qualified names and namespace resolution.
//!
//! A [`QName`] is `(namespaceUri, localName)`; equality is by pair. Session
//! code mostly deals in prefix-qualified JCR text form (`"nt:base"`), which a
//! [`NamespaceResolver`] maps to/from the pair. Strings are interned in a
//! process-wide pool (Design Notes §9: "process-wide state is restricted to
//! type-name interning pools, immutable after registration") so that
//! `QName` equality and hashing are cheap.

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, OnceLock, RwLock},
};

use crate::{Error, Result};

fn intern_pool() -> &'static RwLock<HashMap<String, Arc<str>>> {
    static POOL: OnceLock<RwLock<HashMap<String, Arc<str>>>> = OnceLock::new();
    POOL.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Intern a string, returning a cheaply-clonable, reference-counted handle.
///
/// Once inserted, pool entries are never removed: the pool is immutable
/// after a given string has first been registered.
fn intern(s: &str) -> Arc<str> {
    if let Some(existing) = intern_pool().read().expect("intern pool poisoned").get(s) {
        return existing.clone();
    }
    let mut pool = intern_pool().write().expect("intern pool poisoned");
    pool.entry(s.to_string())
        .or_insert_with(|| Arc::from(s))
        .clone()
}

/// A qualified name: a namespace URI paired with a local part.
///
/// Equality and hashing compare the interned pair, so two `QName`s built
/// from the same strings are cheap to compare regardless of how they were
/// constructed (from prefixed text, from raw parts, from a registry lookup).
#[derive(Debug, Clone, Eq)]
pub struct QName {
    namespace_uri: Arc<str>,
    local_name: Arc<str>,
}

impl QName {
    /// Build a `QName` directly from its raw parts (no prefix resolution).
    #[must_use]
    pub fn new(namespace_uri: &str, local_name: &str) -> Self {
        Self {
            namespace_uri: intern(namespace_uri),
            local_name: intern(local_name),
        }
    }

    /// The empty-namespace `QName` for `local_name` (the common case for
    /// application-defined names with no namespace prefix).
    #[must_use]
    pub fn unprefixed(local_name: &str) -> Self {
        Self::new("", local_name)
    }

    #[must_use]
    pub fn namespace_uri(&self) -> &str {
        &self.namespace_uri
    }

    #[must_use]
    pub fn local_name(&self) -> &str {
        &self.local_name
    }
}

impl PartialEq for QName {
    fn eq(&self, other: &Self) -> bool {
        (Arc::ptr_eq(&self.namespace_uri, &other.namespace_uri)
            || self.namespace_uri == other.namespace_uri)
            && (Arc::ptr_eq(&self.local_name, &other.local_name)
                || self.local_name == other.local_name)
    }
}

impl std::hash::Hash for QName {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.namespace_uri.hash(state);
        self.local_name.hash(state);
    }
}

impl Ord for QName {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.namespace_uri.as_ref(), self.local_name.as_ref())
            .cmp(&(other.namespace_uri.as_ref(), other.local_name.as_ref()))
    }
}

impl PartialOrd for QName {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace_uri.is_empty() {
            write!(f, "{}", self.local_name)
        } else {
            write!(f, "{{{}}}{}", self.namespace_uri, self.local_name)
        }
    }
}

/// The built-in `nt` namespace URI, shared with [`crate::itemmgr::facade`]
/// so it can recognize `nt:version`/`nt:versionHistory` by their resolved
/// [`QName`] rather than by prefixed text (spec §4.3).
pub const NT_NAMESPACE_URI: &str = "https://jcr.example/nt/1.0";

/// Maps namespace prefixes to URIs (and back) for a session's view.
///
/// Sessions remap prefixes locally without mutating the workspace-wide
/// registration (spec §2: "namespace remapping" is a `Session` concern).
#[derive(Debug, Clone, Default)]
pub struct NamespaceResolver {
    prefix_to_uri: HashMap<String, String>,
    uri_to_prefix: HashMap<String, String>,
}

impl NamespaceResolver {
    /// Build a resolver seeded with the built-in `jcr`, `nt`, `mix` prefixes
    /// the spec's own examples rely on (`nt:base`, `jcr:isCheckedOut`).
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut r = Self::default();
        r.register("", "").expect("empty prefix always valid");
        r.register("jcr", "https://jcr.example/1.0")
            .expect("builtin namespace valid");
        r.register("nt", NT_NAMESPACE_URI)
            .expect("builtin namespace valid");
        r.register("mix", "https://jcr.example/mix/1.0")
            .expect("builtin namespace valid");
        r
    }

    /// Register a prefix→URI mapping. Re-registering the same prefix with a
    /// different URI is rejected, matching the backing store's namespace
    /// registry semantics (`registerNamespace`/`unregisterNamespace`, §6).
    pub fn register(&mut self, prefix: &str, uri: &str) -> Result<()> {
        if let Some(existing) = self.prefix_to_uri.get(prefix) {
            if existing != uri {
                return Err(Error::NamespaceError(format!(
                    "prefix '{prefix}' is already mapped to '{existing}'"
                )));
            }
            return Ok(());
        }
        self.prefix_to_uri.insert(prefix.to_string(), uri.to_string());
        self.uri_to_prefix.insert(uri.to_string(), prefix.to_string());
        Ok(())
    }

    pub fn unregister(&mut self, prefix: &str) -> Result<()> {
        let uri = self
            .prefix_to_uri
            .remove(prefix)
            .ok_or_else(|| Error::UnknownPrefix(prefix.to_string()))?;
        self.uri_to_prefix.remove(&uri);
        Ok(())
    }

    /// Parse JCR text form (`"nt:base"` or unprefixed `"foo"`) into a
    /// [`QName`], resolving the prefix via this resolver.
    pub fn parse(&self, text: &str) -> Result<QName> {
        match text.split_once(':') {
            Some((prefix, local)) if !prefix.is_empty() => {
                let uri = self
                    .prefix_to_uri
                    .get(prefix)
                    .ok_or_else(|| Error::UnknownPrefix(prefix.to_string()))?;
                if local.is_empty() {
                    return Err(Error::InvalidName(text.to_string()));
                }
                Ok(QName::new(uri, local))
            }
            _ => {
                if text.is_empty() {
                    return Err(Error::InvalidName(text.to_string()));
                }
                Ok(QName::unprefixed(text))
            }
        }
    }

    /// Render a [`QName`] back to JCR prefixed text form.
    pub fn to_jcr_name(&self, name: &QName) -> Result<String> {
        if name.namespace_uri().is_empty() {
            return Ok(name.local_name().to_string());
        }
        let prefix = self
            .uri_to_prefix
            .get(name.namespace_uri())
            .ok_or_else(|| Error::NamespaceError(format!(
                "no prefix registered for namespace '{}'",
                name.namespace_uri()
            )))?;
        Ok(format!("{prefix}:{}", name.local_name()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qname_equality_is_by_pair() {
        let a = QName::new("http://ns", "foo");
        let b = QName::new("http://ns", "foo");
        assert_eq!(a, b);
        let c = QName::new("http://ns", "bar");
        assert_ne!(a, c);
    }

    #[test]
    fn resolver_roundtrips_prefixed_names() {
        let resolver = NamespaceResolver::with_builtins();
        let name = resolver.parse("nt:base").expect("parses");
        assert_eq!(name.local_name(), "base");
        assert_eq!(resolver.to_jcr_name(&name).expect("renders"), "nt:base");
    }

    #[test]
    fn resolver_rejects_unknown_prefix() {
        let resolver = NamespaceResolver::with_builtins();
        assert!(matches!(
            resolver.parse("bogus:thing"),
            Err(Error::UnknownPrefix(_))
        ));
    }

    #[test]
    fn resolver_rejects_conflicting_reregistration() {
        let mut resolver = NamespaceResolver::with_builtins();
        let err = resolver.register("nt", "http://other").unwrap_err();
        assert!(matches!(err, Error::NamespaceError(_)));
    }

    #[test]
    fn unprefixed_name_has_empty_namespace() {
        let resolver = NamespaceResolver::with_builtins();
        let name = resolver.parse("p").expect("parses");
        assert_eq!(name.namespace_uri(), "");
        assert_eq!(resolver.to_jcr_name(&name).expect("renders"), "p");
    }
}
