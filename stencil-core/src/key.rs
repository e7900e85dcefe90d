//! Key Factory: canonical, value-equal cache keys
//!
//! Structural descriptions and member lookups are turned into keys that
//! compare and hash by value. Every key owns copies of its inputs, so callers
//! may reuse or mutate their buffers as soon as a key is built.
//!
//! The factory holds no state. Memoization lives in the consumers
//! (the adapter cache and the per-adapter member tables).

use crate::error::ConfigError;
use crate::identity::{compute_fingerprint, Fingerprint, TypeRef};
use std::fmt;
use std::sync::Arc;

/// Name under which constructors are rendered in member keys.
pub const CONSTRUCTOR_NAME: &str = "<init>";

// ============================================================================
// STRUCTURAL DESCRIPTION
// ============================================================================

/// The four-part signature that selects an adapter: target type, ordered
/// getter names, ordered setter names and property types.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StructuralDescription {
    target: TypeRef,
    getters: Vec<String>,
    setters: Vec<String>,
    types: Vec<TypeRef>,
}

impl StructuralDescription {
    pub fn new(
        target: TypeRef,
        getters: Vec<String>,
        setters: Vec<String>,
        types: Vec<TypeRef>,
    ) -> Self {
        Self {
            target,
            getters,
            setters,
            types,
        }
    }

    /// Build a description by copying borrowed sequences.
    pub fn from_parts<G, S>(
        target: &TypeRef,
        getters: &[G],
        setters: &[S],
        types: &[TypeRef],
    ) -> Self
    where
        G: AsRef<str>,
        S: AsRef<str>,
    {
        Self {
            target: target.clone(),
            getters: getters.iter().map(|g| g.as_ref().to_string()).collect(),
            setters: setters.iter().map(|s| s.as_ref().to_string()).collect(),
            types: types.to_vec(),
        }
    }

    pub fn target(&self) -> &TypeRef {
        &self.target
    }

    pub fn getters(&self) -> &[String] {
        &self.getters
    }

    pub fn setters(&self) -> &[String] {
        &self.setters
    }

    pub fn types(&self) -> &[TypeRef] {
        &self.types
    }

    /// Number of properties, valid only after [`validate`](Self::validate).
    pub fn property_count(&self) -> usize {
        self.getters.len()
    }

    /// Check that getters, setters and types line up one-to-one.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_lengths(
            &self.target,
            self.getters.len(),
            self.setters.len(),
            self.types.len(),
        )
    }

    /// Canonical key for this description.
    pub fn key(&self) -> StructuralKey {
        KeyFactory::structural_key(&self.target, &self.getters, &self.setters, &self.types)
    }
}

fn validate_lengths(
    target: &TypeRef,
    getters: usize,
    setters: usize,
    types: usize,
) -> Result<(), ConfigError> {
    if getters != setters || getters != types {
        return Err(ConfigError::StructuralMismatch {
            target: target.clone(),
            getters,
            setters,
            types,
        });
    }
    Ok(())
}

// ============================================================================
// STRUCTURAL KEY
// ============================================================================

/// Value-equal key for a [`StructuralDescription`].
///
/// Two keys are equal iff target, getters, setters and types are all
/// element-wise equal. Cloning shares the underlying storage.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct StructuralKey {
    inner: Arc<StructuralKeyInner>,
}

#[derive(PartialEq, Eq, Hash)]
struct StructuralKeyInner {
    target: TypeRef,
    getters: Box<[String]>,
    setters: Box<[String]>,
    types: Box<[TypeRef]>,
}

impl StructuralKey {
    pub fn target(&self) -> &TypeRef {
        &self.inner.target
    }

    pub fn getters(&self) -> &[String] {
        &self.inner.getters
    }

    pub fn setters(&self) -> &[String] {
        &self.inner.setters
    }

    pub fn types(&self) -> &[TypeRef] {
        &self.inner.types
    }

    /// Same check as [`StructuralDescription::validate`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_lengths(
            &self.inner.target,
            self.inner.getters.len(),
            self.inner.setters.len(),
            self.inner.types.len(),
        )
    }

    /// Number of properties described by a valid key.
    pub fn property_count(&self) -> usize {
        self.inner.getters.len()
    }

    /// Rebuild an owned description from this key.
    pub fn description(&self) -> StructuralDescription {
        StructuralDescription::new(
            self.inner.target.clone(),
            self.inner.getters.to_vec(),
            self.inner.setters.to_vec(),
            self.inner.types.to_vec(),
        )
    }

    /// Stable digest of the key, independent of process and hasher seed.
    ///
    /// Every component is length-prefixed so that `["ab"]` and `["a", "b"]`
    /// never encode the same bytes.
    pub fn fingerprint(&self) -> Fingerprint {
        let mut buf = Vec::new();
        encode_str(&mut buf, self.inner.target.name());
        encode_seq(&mut buf, self.inner.getters.iter().map(String::as_str));
        encode_seq(&mut buf, self.inner.setters.iter().map(String::as_str));
        encode_seq(&mut buf, self.inner.types.iter().map(TypeRef::name));
        compute_fingerprint(&buf)
    }

    /// Short hex form of the fingerprint for log fields.
    pub fn short_id(&self) -> String {
        hex::encode(&self.fingerprint()[..8])
    }
}

impl fmt::Debug for StructuralKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StructuralKey")
            .field("target", &self.inner.target)
            .field("getters", &self.inner.getters)
            .field("setters", &self.inner.setters)
            .field("types", &self.inner.types)
            .finish()
    }
}

fn encode_str(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(&(s.len() as u64).to_le_bytes());
    buf.extend_from_slice(s.as_bytes());
}

fn encode_seq<'a>(buf: &mut Vec<u8>, items: impl ExactSizeIterator<Item = &'a str>) {
    buf.extend_from_slice(&(items.len() as u64).to_le_bytes());
    for item in items {
        encode_str(buf, item);
    }
}

// ============================================================================
// MEMBER KEY
// ============================================================================

/// Name part of a member key.
///
/// Constructors get their own variant so they can never collide with a
/// method, whatever the method is called.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MemberName {
    Constructor,
    Method(Arc<str>),
}

impl MemberName {
    pub fn as_str(&self) -> &str {
        match self {
            MemberName::Constructor => CONSTRUCTOR_NAME,
            MemberName::Method(name) => name,
        }
    }

    pub fn is_constructor(&self) -> bool {
        matches!(self, MemberName::Constructor)
    }
}

impl fmt::Display for MemberName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value-equal key for a member lookup: target type, member name and
/// parameter types.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct MemberKey {
    inner: Arc<MemberKeyInner>,
}

#[derive(PartialEq, Eq, Hash)]
struct MemberKeyInner {
    target: TypeRef,
    name: MemberName,
    params: Box<[TypeRef]>,
}

impl MemberKey {
    pub fn target(&self) -> &TypeRef {
        &self.inner.target
    }

    pub fn name(&self) -> &MemberName {
        &self.inner.name
    }

    pub fn params(&self) -> &[TypeRef] {
        &self.inner.params
    }

    pub fn is_constructor(&self) -> bool {
        self.inner.name.is_constructor()
    }
}

impl fmt::Debug for MemberKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MemberKey({})", self)
    }
}

impl fmt::Display for MemberKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}(", self.inner.target, self.inner.name)?;
        for (i, param) in self.inner.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", param)?;
        }
        f.write_str(")")
    }
}

// ============================================================================
// KEY FACTORY
// ============================================================================

/// Builds [`StructuralKey`]s and [`MemberKey`]s.
pub struct KeyFactory;

impl KeyFactory {
    /// Key for a structural description given as borrowed sequences.
    ///
    /// Does not validate lengths; see [`StructuralDescription::validate`].
    pub fn structural_key<G, S>(
        target: &TypeRef,
        getters: &[G],
        setters: &[S],
        types: &[TypeRef],
    ) -> StructuralKey
    where
        G: AsRef<str>,
        S: AsRef<str>,
    {
        StructuralKey {
            inner: Arc::new(StructuralKeyInner {
                target: target.clone(),
                getters: getters.iter().map(|g| g.as_ref().to_string()).collect(),
                setters: setters.iter().map(|s| s.as_ref().to_string()).collect(),
                types: types.into(),
            }),
        }
    }

    /// Key for a method lookup.
    pub fn member_key(target: &TypeRef, name: &str, params: &[TypeRef]) -> MemberKey {
        Self::build_member(target, MemberName::Method(Arc::from(name)), params)
    }

    /// Key for a constructor lookup.
    pub fn constructor_key(target: &TypeRef, params: &[TypeRef]) -> MemberKey {
        Self::build_member(target, MemberName::Constructor, params)
    }

    fn build_member(target: &TypeRef, name: MemberName, params: &[TypeRef]) -> MemberKey {
        MemberKey {
            inner: Arc::new(MemberKeyInner {
                target: target.clone(),
                name,
                params: params.into(),
            }),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    fn hash_of<T: Hash>(value: &T) -> u64 {
        let mut hasher = DefaultHasher::new();
        value.hash(&mut hasher);
        hasher.finish()
    }

    fn int() -> TypeRef {
        TypeRef::named("int")
    }

    #[test]
    fn test_equal_inputs_equal_keys() {
        let person = TypeRef::named("Person");
        let a = KeyFactory::structural_key(&person, &["a", "b"], &["a", "b"], &[int(), int()]);
        let getters = vec!["a".to_string(), "b".to_string()];
        let b = KeyFactory::structural_key(&person, &getters, &getters, &[int(), int()]);

        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_order_matters() {
        let person = TypeRef::named("Person");
        let a = KeyFactory::structural_key(&person, &["a", "b"], &["a", "b"], &[int(), int()]);
        let b = KeyFactory::structural_key(&person, &["b", "a"], &["a", "b"], &[int(), int()]);
        assert_ne!(a, b);
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_getters_and_setters_not_interchangeable() {
        let person = TypeRef::named("Person");
        let a = KeyFactory::structural_key(&person, &["a"], &["b"], &[int()]);
        let b = KeyFactory::structural_key(&person, &["b"], &["a"], &[int()]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_target_alone_distinguishes_keys() {
        let a = KeyFactory::structural_key(&TypeRef::named("Person"), &["a"], &["a"], &[int()]);
        let b = KeyFactory::structural_key(&TypeRef::named("Animal"), &["a"], &["a"], &[int()]);
        assert_ne!(a, b);
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_types_alone_distinguish_keys() {
        let person = TypeRef::named("Person");
        let a = KeyFactory::structural_key(&person, &["a"], &["a"], &[int()]);
        let b = KeyFactory::structural_key(&person, &["a"], &["a"], &[TypeRef::named("str")]);
        assert_ne!(a, b);
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_fingerprint_length_prefixed() {
        let person = TypeRef::named("Person");
        let a = KeyFactory::structural_key(&person, &["ab"], &["ab"], &[int()]);
        let b = KeyFactory::structural_key(&person, &["a", "b"], &["ab"], &[int()]);
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_key_copies_inputs() {
        let person = TypeRef::named("Person");
        let mut getters = vec!["a".to_string()];
        let key = KeyFactory::structural_key(&person, &getters, &["a"], &[int()]);
        getters[0] = "z".to_string();
        assert_eq!(key.getters(), &["a".to_string()]);
    }

    #[test]
    fn test_description_round_trip() {
        let desc = StructuralDescription::from_parts(
            &TypeRef::named("Person"),
            &["a"],
            &["a"],
            &[int()],
        );
        assert_eq!(desc.key().description(), desc);
    }

    #[test]
    fn test_validate_rejects_mismatch() {
        let desc = StructuralDescription::from_parts(
            &TypeRef::named("Person"),
            &["a", "b"],
            &["a"],
            &[int(), int()],
        );
        let err = desc.validate().unwrap_err();
        assert_eq!(
            err,
            ConfigError::StructuralMismatch {
                target: TypeRef::named("Person"),
                getters: 2,
                setters: 1,
                types: 2,
            }
        );
    }

    #[test]
    fn test_validate_accepts_empty() {
        let empty: [&str; 0] = [];
        let desc = StructuralDescription::from_parts(&TypeRef::named("Unit"), &empty, &empty, &[]);
        assert!(desc.validate().is_ok());
        assert_eq!(desc.property_count(), 0);
    }

    #[test]
    fn test_constructor_key_distinct_from_method_named_init() {
        let person = TypeRef::named("Person");
        let ctor = KeyFactory::constructor_key(&person, &[]);
        let method = KeyFactory::member_key(&person, CONSTRUCTOR_NAME, &[]);
        assert_ne!(ctor, method);
        assert!(ctor.is_constructor());
        assert!(!method.is_constructor());
    }

    #[test]
    fn test_member_key_display() {
        let key =
            KeyFactory::member_key(&TypeRef::named("Person"), "rename", &[TypeRef::named("str")]);
        assert_eq!(key.to_string(), "Person::rename(str)");
        let ctor = KeyFactory::constructor_key(&TypeRef::named("Person"), &[int(), int()]);
        assert_eq!(ctor.to_string(), "Person::<init>(int, int)");
    }

    #[test]
    fn test_member_key_param_sensitivity() {
        let person = TypeRef::named("Person");
        let a = KeyFactory::member_key(&person, "f", &[int()]);
        let b = KeyFactory::member_key(&person, "f", &[int()]);
        let c = KeyFactory::member_key(&person, "f", &[]);
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
        assert_ne!(a, c);
    }
}

// ============================================================================
// PROPERTY-BASED TESTS
// ============================================================================
