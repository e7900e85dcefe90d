//! STENCIL Core - Keys, Identity and Collaborator Traits
//!
//! Shared vocabulary for accessor adapters: type and domain identity, the
//! dynamic [`Value`], the Key Factory, the error taxonomy, cache
//! configuration, and the traits implemented by adapter generators and
//! member introspectors. No caching happens here; see `stencil-cache`.

pub mod config;
pub mod error;
pub mod identity;
pub mod key;
pub mod traits;
pub mod value;

pub use config::CacheConfig;
pub use error::{
    AccessError, ArgumentError, ConfigError, GeneratorError, IntrospectError, InvokeError,
    StencilError, StencilResult,
};
pub use identity::{
    compute_fingerprint, DomainId, DomainToken, Fingerprint, IsolationDomain, Timestamp, TypeRef,
};
pub use key::{
    KeyFactory, MemberKey, MemberName, StructuralDescription, StructuralKey, CONSTRUCTOR_NAME,
};
pub use traits::{
    AdapterGenerator, AdapterShell, ConstructorHandle, Instance, Introspector, MethodHandle,
    NoIntrospection,
};
pub use value::Value;
