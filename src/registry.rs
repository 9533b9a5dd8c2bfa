use crate::compose;
use crate::descriptor::{Descriptor, Realization};
use crate::shape::{Pair, Shape, ShapeId, StaticShape};
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Published registry contents. A snapshot is never modified after it is stored.
struct Tables<T> {
    fundamentals: HashMap<u16, Arc<Descriptor<T>>>,
    binary: BTreeMap<u16, Arc<Descriptor<T>>>,
    max_span: u16,
    shapes: BTreeMap<u16, StaticShape<T>>,
    constructors: HashMap<(ShapeId, ShapeId), StaticShape<T>>,
}

impl<T> Clone for Tables<T> {
    fn clone(&self) -> Self {
        Tables {
            fundamentals: self.fundamentals.clone(),
            binary: self.binary.clone(),
            max_span: self.max_span,
            shapes: self.shapes.clone(),
            constructors: self.constructors.clone(),
        }
    }
}

impl<T> Tables<T> {
    fn empty() -> Tables<T> {
        Tables {
            fundamentals: HashMap::new(),
            binary: BTreeMap::new(),
            max_span: 0,
            shapes: BTreeMap::new(),
            constructors: HashMap::new(),
        }
    }

    fn insert_binary(&mut self, descriptor: Arc<Descriptor<T>>) {
        let capacity = descriptor.capacity();
        let span = grown_span(self.max_span, capacity);
        if span != self.max_span {
            debug!("max span {} -> {} for capacity {}", self.max_span, span, capacity);
            self.max_span = span;
        }
        self.binary.entry(capacity).or_insert(descriptor);
    }
}

/// True if capacities up to `capacity` are representable under `max_span`.
#[inline(always)]
pub(crate) fn span_covers(max_span: u16, capacity: u16) -> bool {
    max_span > 0 && capacity as u32 <= 2 * max_span as u32 - 1
}

/// Doubles `max_span` until `2 * max_span - 1 >= capacity`.
pub(crate) fn grown_span(max_span: u16, capacity: u16) -> u16 {
    let mut span = max_span.max(1) as u32;
    while 2 * span - 1 < capacity as u32 {
        span *= 2;
    }
    // 2 * 32768 - 1 covers u16::MAX, so the loop stops before leaving u16.
    span as u16
}

/// Counts of registry entries.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct RegistryStats {
    pub fundamentals: usize,
    pub binary: usize,
    pub shapes: usize,
    pub constructors: usize,
    pub max_span: u16,
}

/// Buffer shapes known for the element kind `T`.
///
/// Holds explicitly registered fundamental shapes, composite shapes cached by the
/// composition engine, the static types that can realize storage, and the pair
/// constructors used to combine them.
///
/// All mutation goes through `lock`. Readers load the current snapshot without locking;
/// a writer clones the snapshot, changes the copy and stores it back, so an entry seen
/// once stays visible to every later read.
pub struct MetadataRegistry<T> {
    tables: ArcSwap<Tables<T>>,
    lock: Mutex<()>,
}

impl<T> Default for MetadataRegistry<T> {
    fn default() -> Self {
        MetadataRegistry::new()
    }
}

impl<T: 'static> MetadataRegistry<T> {
    /// Registers the static shape `S` as a fundamental buffer.
    pub fn register_shape<S: Shape<Item = T>>(&self, is_binary: bool) -> bool {
        match Descriptor::of_shape::<S>(is_binary) {
            Some(descriptor) => self.register_buffer(descriptor),
            None => false,
        }
    }

    /// Registers the static constructor for `Pair<A, B>`, used when a composite of an `A`
    /// shaped low half and a `B` shaped high half is built.
    pub fn register_pair<A, B>(&self) -> bool
        where
            A: Shape<Item = T>,
            B: Shape<Item = T>,
    {
        let shape = match StaticShape::of::<Pair<A, B>>() {
            Some(shape) => shape,
            None => return false,
        };
        let key = (ShapeId::of::<A>(), ShapeId::of::<B>());

        let _guard = self.lock.lock();
        let current = self.tables.load_full();
        if current.constructors.contains_key(&key) {
            return false;
        }
        let mut next = Tables::clone(&current);
        next.constructors.insert(key, shape);
        next.shapes.entry(shape.capacity()).or_insert(shape);
        self.tables.store(Arc::new(next));
        trace!("registered pair constructor {}", shape.type_name());
        true
    }
}

impl<T> MetadataRegistry<T> {
    pub fn new() -> MetadataRegistry<T> {
        MetadataRegistry {
            tables: ArcSwap::from_pointee(Tables::empty()),
            lock: Mutex::new(()),
        }
    }

    /// Returns a descriptor with exactly `count` slots.
    ///
    /// An explicitly registered non-composite shape wins; otherwise the shape is composed
    /// from known pieces and cached. `None` if neither works.
    pub fn get_metadata(&self, count: usize) -> Option<Arc<Descriptor<T>>> {
        let capacity = u16::try_from(count).ok().filter(|c| *c > 0)?;
        {
            let tables = self.tables.load();
            if let Some(fundamental) = tables.fundamentals.get(&capacity) {
                if !fundamental.is_composite() {
                    return Some(fundamental.clone());
                }
            }
        }
        compose::compose(self, count, true)
    }

    /// Returns the exact descriptor for `count` if there is one, otherwise the smallest
    /// published descriptor with more slots.
    pub fn get_metadata_at_least(&self, count: usize) -> Option<Arc<Descriptor<T>>> {
        if let Some(exact) = self.get_metadata(count) {
            return Some(exact);
        }
        let capacity = u16::try_from(count).ok()?;
        let tables = self.tables.load();
        let binary = tables.binary.range(capacity..).next().map(|(_, d)| d);
        let fundamental = tables.fundamentals.values()
            .filter(|d| d.capacity() >= capacity)
            .min_by_key(|d| d.capacity());
        match (binary, fundamental) {
            (Some(b), Some(f)) => Some(if f.capacity() <= b.capacity() { f.clone() } else { b.clone() }),
            (Some(b), None) => Some(b.clone()),
            (None, Some(f)) => Some(f.clone()),
            (None, None) => None,
        }
    }

    /// Registers a fundamental buffer shape.
    ///
    /// Registering a second shape with an already known capacity changes nothing and
    /// returns `false`. Binary-eligible shapes also become composition pieces.
    pub fn register_buffer(&self, descriptor: Arc<Descriptor<T>>) -> bool {
        let capacity = descriptor.capacity();

        let _guard = self.lock.lock();
        let current = self.tables.load_full();
        if current.fundamentals.contains_key(&capacity) {
            trace!("fundamental {} already registered", capacity);
            return false;
        }

        let mut next = Tables::clone(&current);
        if let Realization::Static(shape) = descriptor.realization() {
            next.shapes.entry(capacity).or_insert(*shape);
        }
        next.fundamentals.insert(capacity, descriptor.clone());
        if descriptor.is_binary() {
            next.insert_binary(descriptor);
        }
        self.tables.store(Arc::new(next));
        debug!("registered fundamental {}", capacity);
        true
    }

    pub fn fundamental(&self, capacity: u16) -> Option<Arc<Descriptor<T>>> {
        self.tables.load().fundamentals.get(&capacity).cloned()
    }

    /// Binary-eligible descriptor cached for `capacity`.
    pub fn binary(&self, capacity: u16) -> Option<Arc<Descriptor<T>>> {
        self.tables.load().binary.get(&capacity).cloned()
    }

    pub fn max_span(&self) -> u16 {
        self.tables.load().max_span
    }

    /// True if `count` is below `2 * max_span`.
    pub fn can_represent(&self, count: usize) -> bool {
        match u16::try_from(count) {
            Ok(capacity) => capacity > 0 && span_covers(self.max_span(), capacity),
            Err(_) => false,
        }
    }

    pub fn stats(&self) -> RegistryStats {
        let tables = self.tables.load();
        RegistryStats {
            fundamentals: tables.fundamentals.len(),
            binary: tables.binary.len(),
            shapes: tables.shapes.len(),
            constructors: tables.constructors.len(),
            max_span: tables.max_span,
        }
    }

    pub(crate) fn largest_binary_at_most(&self, capacity: u16) -> Option<Arc<Descriptor<T>>> {
        self.tables.load().binary.range(..=capacity).next_back().map(|(_, d)| d.clone())
    }

    /// Largest binary piece that heads the doubling chain: a fundamental, or a composite
    /// of two equal halves.
    pub(crate) fn chain_top(&self) -> Option<Arc<Descriptor<T>>> {
        self.tables.load().binary.values()
            .rev()
            .find(|d| d.extends_chain())
            .cloned()
    }

    pub(crate) fn constructor(&self, low: ShapeId, high: ShapeId) -> Option<StaticShape<T>> {
        self.tables.load().constructors.get(&(low, high)).copied()
    }

    /// Smallest static shape holding at least `capacity` slots but fewer than twice as many.
    pub(crate) fn covering_shape(&self, capacity: u16) -> Option<StaticShape<T>> {
        let limit = 2 * capacity as u32;
        self.tables.load().shapes.range(capacity..)
            .next()
            .map(|(_, shape)| *shape)
            .filter(|shape| (shape.capacity() as u32) < limit)
    }

    /// Caches a composed binary descriptor. If the capacity is already cached, the
    /// published descriptor is kept and returned.
    pub(crate) fn publish_binary(&self, descriptor: Arc<Descriptor<T>>) -> Arc<Descriptor<T>> {
        debug_assert!(descriptor.is_binary(), "only binary descriptors are cached");
        let capacity = descriptor.capacity();

        let _guard = self.lock.lock();
        let current = self.tables.load_full();
        if let Some(existing) = current.binary.get(&capacity) {
            return existing.clone();
        }
        let mut next = Tables::clone(&current);
        next.insert_binary(descriptor.clone());
        self.tables.store(Arc::new(next));
        debug!("cached composite {}", capacity);
        descriptor
    }
}
