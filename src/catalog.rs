use crate::element::Element;
use crate::pool::{PoolBuilder, SharedPool};
use crate::registry::MetadataRegistry;
use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

/// Registry and pool of one element kind.
pub struct KindState<T> {
    registry: MetadataRegistry<T>,
    pool: SharedPool<T>,
}

impl<T> KindState<T> {
    #[inline(always)]
    pub fn registry(&self) -> &MetadataRegistry<T> {
        &self.registry
    }

    #[inline(always)]
    pub fn pool(&self) -> &SharedPool<T> {
        &self.pool
    }
}

/// Per-kind registries and pools, created on first use of each kind.
///
/// The process-wide instance is `Catalog::global()`. Separate catalogs share nothing,
/// which keeps tests independent of each other.
pub struct Catalog {
    kinds: RwLock<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
    pool_settings: PoolBuilder,
}

/// Settings for a `Catalog`.
#[derive(Copy, Clone, Debug, Default)]
pub struct CatalogBuilder {
    pool_settings: PoolBuilder,
}

impl CatalogBuilder {
    pub fn new() -> CatalogBuilder {
        CatalogBuilder::default()
    }

    /// Settings for the fallback pool of every kind.
    pub fn pool(mut self, pool_settings: PoolBuilder) -> CatalogBuilder {
        self.pool_settings = pool_settings;
        self
    }

    pub fn build(self) -> Catalog {
        Catalog {
            kinds: RwLock::new(HashMap::new()),
            pool_settings: self.pool_settings,
        }
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Catalog::new()
    }
}

impl Catalog {
    pub fn new() -> Catalog {
        CatalogBuilder::new().build()
    }

    pub fn builder() -> CatalogBuilder {
        CatalogBuilder::new()
    }

    pub fn global() -> &'static Catalog {
        static GLOBAL: OnceLock<Catalog> = OnceLock::new();
        GLOBAL.get_or_init(Catalog::new)
    }

    /// Returns the state for `T`, creating and seeding it on first use.
    pub fn kind<T: Element>(&self) -> Arc<KindState<T>> {
        let id = TypeId::of::<T>();
        if let Some(existing) = self.kinds.read().get(&id) {
            return downcast(existing.clone());
        }

        // seeding may look up other kinds, so it runs outside of the lock
        let state = KindState {
            registry: MetadataRegistry::new(),
            pool: self.pool_settings.build(),
        };
        T::seed(&state.registry);
        let state: Arc<dyn Any + Send + Sync> = Arc::new(state);

        let mut kinds = self.kinds.write();
        let entry = kinds.entry(id).or_insert_with(|| {
            debug!("created registry for {}", std::any::type_name::<T>());
            state
        });
        downcast(entry.clone())
    }

    /// Number of kinds created so far.
    pub fn kinds(&self) -> usize {
        self.kinds.read().len()
    }
}

fn downcast<T: 'static>(state: Arc<dyn Any + Send + Sync>) -> Arc<KindState<T>> {
    match state.downcast::<KindState<T>>() {
        Ok(state) => state,
        Err(_) => unreachable!("catalog entries are keyed by their kind"),
    }
}
