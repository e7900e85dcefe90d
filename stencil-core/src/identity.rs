//! Identity types for STENCIL adapters and isolation domains

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::{Arc, Weak};
use uuid::Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// SHA-256 digest used to fingerprint cache keys.
pub type Fingerprint = [u8; 32];

/// Compute SHA-256 digest of content.
pub fn compute_fingerprint(content: &[u8]) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(content);
    let result = hasher.finalize();
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result);
    hash
}

// ============================================================================
// TYPE REFERENCES
// ============================================================================

/// Opaque identifier of a type (the adapted record type, a property type,
/// or a member parameter type).
///
/// Backed by a shared string so cloning into keys and adapters is cheap.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub struct TypeRef(Arc<str>);

impl TypeRef {
    /// Identify a type by an arbitrary name.
    pub fn named(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    /// Identify a Rust type by its compiler-provided name.
    pub fn of<T: ?Sized>() -> Self {
        Self::named(std::any::type_name::<T>())
    }

    /// The type name.
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeRef({})", self.0)
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TypeRef {
    fn from(name: &str) -> Self {
        Self::named(name)
    }
}

impl From<String> for TypeRef {
    fn from(name: String) -> Self {
        Self(Arc::from(name))
    }
}

impl From<TypeRef> for String {
    fn from(ty: TypeRef) -> Self {
        ty.0.to_string()
    }
}

// ============================================================================
// ISOLATION DOMAINS
// ============================================================================

/// Identifier of an isolation domain.
///
/// UUIDv7 so domain ids sort by creation time in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DomainId(Uuid);

impl DomainId {
    /// Generate a new timestamp-sortable domain id.
    pub fn now_v7() -> Self {
        Self(Uuid::now_v7())
    }

    /// Wrap an existing UUID.
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for DomainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug)]
struct DomainInner {
    id: DomainId,
    label: Option<String>,
    created_at: Timestamp,
}

/// A scope partitioning the adapter cache.
///
/// Structurally identical requests made under different domains never share
/// an adapter. The handle is cheap to clone; the cache only keeps a
/// [`DomainToken`] back-reference, so once every handle is dropped the
/// domain's partition can be reclaimed.
#[derive(Debug, Clone)]
pub struct IsolationDomain {
    inner: Arc<DomainInner>,
}

impl IsolationDomain {
    /// Create an anonymous domain.
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Create a domain with a human-readable label for diagnostics.
    pub fn named(label: impl Into<String>) -> Self {
        Self::build(Some(label.into()))
    }

    fn build(label: Option<String>) -> Self {
        Self {
            inner: Arc::new(DomainInner {
                id: DomainId::now_v7(),
                label,
                created_at: chrono::Utc::now(),
            }),
        }
    }

    pub fn id(&self) -> DomainId {
        self.inner.id
    }

    pub fn label(&self) -> Option<&str> {
        self.inner.label.as_deref()
    }

    pub fn created_at(&self) -> Timestamp {
        self.inner.created_at
    }

    /// Weak back-reference used by the cache to detect dropped domains.
    pub fn token(&self) -> DomainToken {
        DomainToken {
            id: self.inner.id,
            inner: Arc::downgrade(&self.inner),
        }
    }
}

impl Default for IsolationDomain {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for IsolationDomain {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for IsolationDomain {}

/// Non-owning reference to an [`IsolationDomain`].
#[derive(Debug, Clone)]
pub struct DomainToken {
    id: DomainId,
    inner: Weak<DomainInner>,
}

impl DomainToken {
    pub fn id(&self) -> DomainId {
        self.id
    }

    /// True while at least one [`IsolationDomain`] handle is alive.
    pub fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_ref_of_uses_type_name() {
        assert_eq!(TypeRef::of::<i64>().name(), "i64");
        assert_eq!(TypeRef::of::<String>(), TypeRef::of::<String>());
        assert_ne!(TypeRef::of::<i32>(), TypeRef::of::<i64>());
    }

    #[test]
    fn test_type_ref_serializes_as_plain_string() {
        let json = serde_json::to_string(&TypeRef::named("int")).unwrap();
        assert_eq!(json, "\"int\"");

        let back: TypeRef = serde_json::from_str(&json).unwrap();
        assert_eq!(back, TypeRef::named("int"));

        let list: Vec<TypeRef> = serde_json::from_str(r#"["Person","str"]"#).unwrap();
        assert_eq!(list, vec![TypeRef::named("Person"), TypeRef::named("str")]);
    }

    #[test]
    fn test_domains_are_distinct() {
        let a = IsolationDomain::new();
        let b = IsolationDomain::new();
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn test_domain_label() {
        let domain = IsolationDomain::named("plugins");
        assert_eq!(domain.label(), Some("plugins"));
        assert_eq!(IsolationDomain::new().label(), None);
    }

    #[test]
    fn test_token_tracks_liveness() {
        let domain = IsolationDomain::new();
        let clone = domain.clone();
        let token = domain.token();
        assert_eq!(token.id(), domain.id());
        assert!(token.is_alive());

        drop(domain);
        assert!(token.is_alive());

        drop(clone);
        assert!(!token.is_alive());
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let a = compute_fingerprint(b"stencil");
        let b = compute_fingerprint(b"stencil");
        assert_eq!(a, b);
        assert_ne!(a, compute_fingerprint(b"stencil!"));
    }
}
