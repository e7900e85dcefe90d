//! Domain-partitioned adapter cache.
//!
//! Layout: one partition per [`IsolationDomain`], each mapping
//! [`StructuralKey`]s to a slot holding at most one [`Adapter`].
//!
//! ```text
//! partitions: DomainId -> Partition { token (weak), slots }
//! slots:      StructuralKey -> OnceCell<Arc<Adapter>>
//! ```
//!
//! Map guards are released before the generator runs. Creation is
//! single-flight per slot: concurrent callers for the same missing key block
//! on the slot's cell and all observe the winner's adapter. A failed
//! generation leaves the cell empty, so a waiting caller retries, and the
//! slot is removed once no caller holds it.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::OnceCell;
use stencil_core::{
    AdapterGenerator, AdapterShell, CacheConfig, DomainId, DomainToken, Introspector,
    IsolationDomain, KeyFactory, StencilResult, StructuralDescription, StructuralKey, TypeRef,
};

use crate::adapter::Adapter;
use crate::members::MemberTable;
use crate::stats::{CacheCounters, CacheStats};

type Slot = Arc<OnceCell<Arc<Adapter>>>;

struct Partition {
    token: DomainToken,
    slots: DashMap<StructuralKey, Slot>,
}

impl Partition {
    fn new(token: DomainToken, config: &CacheConfig) -> Self {
        let slots = match config.shard_amount {
            Some(shards) => {
                DashMap::with_capacity_and_shard_amount(config.partition_capacity, shards)
            }
            None => DashMap::with_capacity(config.partition_capacity),
        };
        Self { token, slots }
    }

    fn slot(&self, key: &StructuralKey) -> Slot {
        if let Some(slot) = self.slots.get(key) {
            return slot.value().clone();
        }
        self.slots.entry(key.clone()).or_default().value().clone()
    }

    /// Remove the slot for `key` if it holds no adapter and no caller still
    /// references it. Slots are only cloned under the shard lock, so the
    /// count cannot grow while `remove_if` holds it; the last failing caller
    /// to let go removes the slot.
    fn discard_abandoned(&self, key: &StructuralKey) {
        self.slots
            .remove_if(key, |_, slot| Arc::strong_count(slot) == 1 && slot.get().is_none());
    }

    fn get(&self, key: &StructuralKey) -> Option<Arc<Adapter>> {
        self.slots.get(key)?.value().get().cloned()
    }

    fn adapter_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.value().get().is_some())
            .count()
    }
}

/// Cache of accessor adapters, at most one per (domain, structural key).
///
/// An explicit service object: create one, share it (it is `Send + Sync`),
/// and drop it to release every adapter.
///
/// # Example
///
/// ```ignore
/// let cache = AdapterCache::with_defaults(Arc::new(generator), Arc::new(NoIntrospection))?;
/// let domain = IsolationDomain::named("plugins");
/// let adapter = cache.get_adapter(&domain, &person, &["name"], &["name"], &[str_type])?;
/// let values = adapter.get_property_values(&instance)?;
/// ```
pub struct AdapterCache {
    config: CacheConfig,
    generator: Arc<dyn AdapterGenerator>,
    introspector: Arc<dyn Introspector>,
    partitions: DashMap<DomainId, Arc<Partition>>,
    counters: CacheCounters,
    domains_created: AtomicUsize,
}

impl AdapterCache {
    /// Create a cache using `generator` for [`get_adapter`](Self::get_adapter)
    /// and `introspector` for every adapter's member table.
    pub fn new(
        config: CacheConfig,
        generator: Arc<dyn AdapterGenerator>,
        introspector: Arc<dyn Introspector>,
    ) -> StencilResult<Self> {
        config.validate()?;
        let partitions = match config.shard_amount {
            Some(shards) => DashMap::with_shard_amount(shards),
            None => DashMap::new(),
        };
        Ok(Self {
            config,
            generator,
            introspector,
            partitions,
            counters: CacheCounters::default(),
            domains_created: AtomicUsize::new(0),
        })
    }

    /// Create a cache with default configuration.
    pub fn with_defaults(
        generator: Arc<dyn AdapterGenerator>,
        introspector: Arc<dyn Introspector>,
    ) -> StencilResult<Self> {
        Self::new(CacheConfig::default(), generator, introspector)
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Get the adapter for a structural description, generating it with the
    /// registered generator on first request in `domain`.
    pub fn get_adapter<G, S>(
        &self,
        domain: &IsolationDomain,
        target: &TypeRef,
        getters: &[G],
        setters: &[S],
        types: &[TypeRef],
    ) -> StencilResult<Arc<Adapter>>
    where
        G: AsRef<str>,
        S: AsRef<str>,
    {
        let key = KeyFactory::structural_key(target, getters, setters, types);
        self.get_or_create_keyed(domain, &key, || self.generator.generate(&key.description()))
    }

    /// [`get_adapter`](Self::get_adapter) for an owned description.
    pub fn get_adapter_for(
        &self,
        domain: &IsolationDomain,
        description: &StructuralDescription,
    ) -> StencilResult<Arc<Adapter>> {
        let key = description.key();
        self.get_or_create_keyed(domain, &key, || self.generator.generate(description))
    }

    /// Get the adapter for a structural description, calling `generator` to
    /// produce its shell if the key is absent from `domain`.
    ///
    /// The description is validated before anything else; `generator` runs
    /// at most once per (domain, key) across all callers, and its error is
    /// returned without caching anything.
    pub fn get_or_create<G, S, F>(
        &self,
        domain: &IsolationDomain,
        target: &TypeRef,
        getters: &[G],
        setters: &[S],
        types: &[TypeRef],
        generator: F,
    ) -> StencilResult<Arc<Adapter>>
    where
        G: AsRef<str>,
        S: AsRef<str>,
        F: FnOnce() -> StencilResult<Box<dyn AdapterShell>>,
    {
        let key = KeyFactory::structural_key(target, getters, setters, types);
        self.get_or_create_keyed(domain, &key, generator)
    }

    fn get_or_create_keyed<F>(
        &self,
        domain: &IsolationDomain,
        key: &StructuralKey,
        generator: F,
    ) -> StencilResult<Arc<Adapter>>
    where
        F: FnOnce() -> StencilResult<Box<dyn AdapterShell>>,
    {
        key.validate()?;

        let partition = self.partition(domain);
        let slot = partition.slot(key);

        if let Some(adapter) = slot.get() {
            self.counters.hit();
            tracing::trace!(domain = %domain.id(), key = %key.short_id(), "Adapter cache hit");
            return Ok(Arc::clone(adapter));
        }

        let mut generated = false;
        let result = slot
            .get_or_try_init(|| {
                generated = true;
                self.build(domain, key, generator)
            })
            .map(Arc::clone);

        match result {
            Ok(adapter) => {
                if generated {
                    self.counters.miss();
                } else {
                    self.counters.hit();
                }
                Ok(adapter)
            }
            Err(error) => {
                drop(slot);
                partition.discard_abandoned(key);
                self.counters.miss();
                self.counters.generation_failed();
                tracing::warn!(
                    domain = %domain.id(),
                    target = %key.target(),
                    key = %key.short_id(),
                    %error,
                    "Adapter generation failed"
                );
                Err(error)
            }
        }
    }

    fn build<F>(
        &self,
        domain: &IsolationDomain,
        key: &StructuralKey,
        generator: F,
    ) -> StencilResult<Arc<Adapter>>
    where
        F: FnOnce() -> StencilResult<Box<dyn AdapterShell>>,
    {
        let shell = generator()?;
        let members = MemberTable::new(
            key.target().clone(),
            Arc::clone(&self.introspector),
            self.config.member_capacity,
        );
        self.counters.generated();
        tracing::debug!(
            domain = %domain.id(),
            target = %key.target(),
            key = %key.short_id(),
            properties = key.property_count(),
            "Generated adapter"
        );
        Ok(Arc::new(Adapter::new(domain.id(), key.clone(), shell, members)))
    }

    fn partition(&self, domain: &IsolationDomain) -> Arc<Partition> {
        let id = domain.id();
        if let Some(partition) = self.partitions.get(&id) {
            return partition.value().clone();
        }

        let mut created = false;
        let partition = self
            .partitions
            .entry(id)
            .or_insert_with(|| {
                created = true;
                Arc::new(Partition::new(domain.token(), &self.config))
            })
            .value()
            .clone();

        if created {
            tracing::debug!(domain = %id, label = ?domain.label(), "Created domain partition");
            let seen = self.domains_created.fetch_add(1, Ordering::Relaxed) + 1;
            if self.config.sweep_on_new_domain && seen % self.config.sweep_interval == 0 {
                self.sweep();
            }
        }
        partition
    }

    /// Look up an existing adapter without generating one.
    pub fn peek(&self, domain: &IsolationDomain, key: &StructuralKey) -> Option<Arc<Adapter>> {
        self.partitions.get(&domain.id())?.value().get(key)
    }

    /// Drop a domain's partition. Returns the number of adapters released.
    ///
    /// Lookups racing with teardown of the same domain may land in the old
    /// partition; callers tear a domain down once they stop using it.
    pub fn drop_domain(&self, domain: &IsolationDomain) -> usize {
        let Some((id, partition)) = self.partitions.remove(&domain.id()) else {
            return 0;
        };
        let released = partition.adapter_count();
        self.counters.released(1);
        tracing::info!(domain = %id, adapters = released, "Dropped domain partition");
        released
    }

    /// Remove partitions whose domain has no live handle.
    /// Returns the number of partitions removed.
    pub fn sweep(&self) -> usize {
        let mut removed = 0usize;
        self.partitions.retain(|_, partition| {
            let alive = partition.token.is_alive();
            if !alive {
                removed += 1;
            }
            alive
        });
        if removed > 0 {
            self.counters.released(removed as u64);
            tracing::info!(partitions = removed, "Swept dead domain partitions");
        }
        removed
    }

    /// Drop every partition.
    pub fn clear(&self) {
        let domains = self.partitions.len();
        self.partitions.clear();
        self.counters.released(domains as u64);
        tracing::info!(partitions = domains, "Cleared adapter cache");
    }

    pub fn domain_count(&self) -> usize {
        self.partitions.len()
    }

    /// Adapters cached for one domain.
    pub fn adapter_count(&self, domain: &IsolationDomain) -> usize {
        self.partitions
            .get(&domain.id())
            .map(|partition| partition.value().adapter_count())
            .unwrap_or(0)
    }

    pub fn stats(&self) -> CacheStats {
        let (domains, adapters) = self
            .partitions
            .iter()
            .fold((0u64, 0u64), |(domains, adapters), partition| {
                (domains + 1, adapters + partition.value().adapter_count() as u64)
            });
        self.counters.snapshot(domains, adapters)
    }
}

impl std::fmt::Debug for AdapterCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterCache")
            .field("config", &self.config)
            .field("domains", &self.partitions.len())
            .finish()
    }
}
