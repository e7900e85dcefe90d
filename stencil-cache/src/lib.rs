//! STENCIL Cache - Adapter Cache and Member Resolver
//!
//! Hands out accessor adapters for structural descriptions, generating each
//! one at most once per isolation domain, and memoizes member lookups
//! (including failed ones) per adapter.
//!
//! # Example
//!
//! ```ignore
//! let cache = AdapterCache::with_defaults(generator, introspector)?;
//! let domain = IsolationDomain::new();
//!
//! let adapter = cache.get_adapter(&domain, &target, &["a", "b"], &["a", "b"], &types)?;
//! let mut instance = adapter.new_instance()?;
//! adapter.set_property_values(&mut instance, vec![Value::Int(5), Value::Int(6)])?;
//!
//! // Missing members are remembered; the introspector is asked only once.
//! assert!(adapter.resolve_method("frobnicate", &[]).is_none());
//! ```

pub mod adapter;
pub mod cache;
pub mod members;
pub mod stats;

pub use adapter::Adapter;
pub use cache::AdapterCache;
pub use members::{
    ConstructorProxy, MemberProxy, MemberState, MemberStats, MemberTable, MethodProxy,
};
pub use stats::CacheStats;
