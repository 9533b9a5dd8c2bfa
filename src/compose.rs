/*!

Composition of larger buffer shapes out of registered ones.

A requested capacity is split greedily into the largest binary-eligible pieces the
registry knows, then the pieces are joined smallest first: the running composite becomes
the low half and the next piece the high half. When the request is beyond what the
doubling chain can represent, the top of the chain (the largest fundamental or doubled
piece) is paired with itself until it is. Lopsided composites never extend the chain.

Every join needs storage that holds both halves contiguously. The static pair
constructors registered for the two component types are tried first; `dynamic_compose`
falls back to any known static shape large enough to cover the join.

*/

use crate::descriptor::{Descriptor, Realization};
use crate::error::ConfigurationError;
use crate::registry::{grown_span, span_covers, MetadataRegistry};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Pieces allowed in one decomposition. Enough for any `u16` while every power of two up
/// to the span is a piece, since each greedy step then takes more than half of what is left.
const MAX_PIECES: usize = 16;

/// Capacity of `low + high`, and whether that composite may itself be a piece.
///
/// The composite is binary-eligible only if both halves are, `high` is not a lopsided
/// composite, and `high` is at least as large as `low`.
pub fn tie_break<T>(low: &Descriptor<T>, high: &Descriptor<T>) -> (u32, bool) {
    let capacity = low.capacity() as u32 + high.capacity() as u32;
    if !low.is_binary() || !high.is_binary() {
        return (capacity, false);
    }
    if high.is_composite() && !high.is_doubled() {
        return (capacity, false);
    }
    (capacity, high.capacity() >= low.capacity())
}

/// Builds (or finds) a descriptor of exactly `target` slots.
///
/// Returns `None` if the known pieces can not cover `target` or a join can not be
/// realized. With `cache_result`, a binary-eligible result and any doubling pieces built
/// on the way are published to the registry.
pub fn compose<T>(registry: &MetadataRegistry<T>, target: usize, cache_result: bool) -> Option<Arc<Descriptor<T>>> {
    let requested = u16::try_from(target).ok().filter(|t| *t > 0)?;
    if let Some(hit) = registry.binary(requested) {
        return Some(hit);
    }
    match Planner::new(registry, cache_result, false).build(requested) {
        Ok(descriptor) => {
            trace!("composed {:?}", descriptor);
            Some(descriptor)
        },
        Err(e) => {
            trace!("no composition for {}: {}", requested, e);
            None
        },
    }
}

/// Composes `target` and caches every binary-eligible composite on the way, so later
/// requests for those sub-capacities are plain lookups.
pub fn prepare<T>(registry: &MetadataRegistry<T>, target: usize) -> Result<Arc<Descriptor<T>>, ConfigurationError> {
    let requested = u16::try_from(target)
        .ok()
        .filter(|t| *t > 0)
        .ok_or(ConfigurationError::CapacityOutOfRange { requested: target })?;
    if let Some(hit) = registry.binary(requested) {
        return Ok(hit);
    }
    let prepared = Planner::new(registry, true, true).build(requested)?;
    debug!("prepared {} (binary: {})", requested, prepared.is_binary());
    Ok(prepared)
}

/// Finds storage for `low + high` when no static pair constructor exists for them.
///
/// Picks the smallest static shape the registry knows that holds the joined capacity
/// with less than double waste. `None` when there is none.
pub fn dynamic_compose<T>(registry: &MetadataRegistry<T>, low: &Descriptor<T>, high: &Descriptor<T>) -> Option<Realization<T>> {
    let capacity = low.capacity().checked_add(high.capacity())?;
    let shape = registry.covering_shape(capacity)?;
    if shape.capacity() == capacity {
        Some(Realization::Static(shape))
    } else {
        Some(Realization::Covering(shape))
    }
}

fn static_compose<T>(registry: &MetadataRegistry<T>, low: &Descriptor<T>, high: &Descriptor<T>) -> Option<Realization<T>> {
    registry.constructor(low.shape_id()?, high.shape_id()?)
        .map(Realization::Static)
}

/// Joins `low` and `high` into a new, unpublished composite.
pub(crate) fn pair<T>(registry: &MetadataRegistry<T>, low: &Arc<Descriptor<T>>, high: &Arc<Descriptor<T>>) -> Option<Arc<Descriptor<T>>> {
    let (capacity, is_binary) = tie_break(low, high);
    if capacity > u16::MAX as u32 {
        return None;
    }
    let realization = static_compose(registry, low, high)
        .or_else(|| dynamic_compose(registry, low, high))?;
    Descriptor::composite(low.clone(), high.clone(), is_binary, realization)
}

struct Planner<'r, T> {
    registry: &'r MetadataRegistry<T>,
    cache: bool,
    cache_intermediates: bool,
    /// Binary pieces built by this call that are not published.
    local: BTreeMap<u16, Arc<Descriptor<T>>>,
    local_span: u16,
}

impl<'r, T> Planner<'r, T> {
    fn new(registry: &'r MetadataRegistry<T>, cache: bool, cache_intermediates: bool) -> Planner<'r, T> {
        Planner {
            registry,
            cache,
            cache_intermediates,
            local: BTreeMap::new(),
            local_span: 0,
        }
    }

    fn span(&self) -> u16 {
        self.registry.max_span().max(self.local_span)
    }

    fn piece_at_most(&self, capacity: u16) -> Option<Arc<Descriptor<T>>> {
        let shared = self.registry.largest_binary_at_most(capacity);
        let local = self.local.range(..=capacity).next_back().map(|(_, d)| d.clone());
        match (shared, local) {
            (Some(shared), Some(local)) => Some(if local.capacity() > shared.capacity() { local } else { shared }),
            (shared, local) => shared.or(local),
        }
    }

    fn keep(&mut self, descriptor: Arc<Descriptor<T>>) -> Arc<Descriptor<T>> {
        if self.cache {
            return self.registry.publish_binary(descriptor);
        }
        let capacity = descriptor.capacity();
        self.local_span = grown_span(self.local_span, capacity);
        self.local.entry(capacity).or_insert(descriptor).clone()
    }

    fn build(&mut self, requested: u16) -> Result<Arc<Descriptor<T>>, ConfigurationError> {
        if let Err(e) = self.extend_span(requested) {
            if self.cache_intermediates {
                return Err(e);
            }
            trace!("span not extended: {}", e);
        }
        let pieces = self.decompose(requested)?;
        self.assemble(requested, pieces)
    }

    fn chain_top(&self) -> Option<Arc<Descriptor<T>>> {
        let shared = self.registry.chain_top();
        let local = self.local.values().rev().find(|d| d.extends_chain()).cloned();
        match (shared, local) {
            (Some(shared), Some(local)) => Some(if local.capacity() > shared.capacity() { local } else { shared }),
            (shared, local) => shared.or(local),
        }
    }

    fn extend_span(&mut self, requested: u16) -> Result<(), ConfigurationError> {
        if span_covers(self.span(), requested) {
            return Ok(());
        }
        let mut top = self.chain_top()
            .ok_or(ConfigurationError::MissingComponent { requested, remaining: requested })?;
        while !span_covers(self.span(), requested) {
            let doubled = match pair(self.registry, &top, &top) {
                Some(doubled) if doubled.is_binary() => doubled,
                _ => return Err(ConfigurationError::Unrepresentable { requested, max_span: self.span() }),
            };
            trace!("doubled {} into {}", top.capacity(), doubled.capacity());
            top = doubled.clone();
            self.keep(doubled);
        }
        Ok(())
    }

    /// Largest pieces first.
    fn decompose(&self, requested: u16) -> Result<Vec<Arc<Descriptor<T>>>, ConfigurationError> {
        let mut pieces = Vec::new();
        let mut remaining = requested;
        while remaining > 0 {
            let missing = ConfigurationError::MissingComponent { requested, remaining };
            if pieces.len() == MAX_PIECES {
                return Err(missing);
            }
            let piece = self.piece_at_most(remaining).ok_or(missing)?;
            remaining -= piece.capacity();
            pieces.push(piece);
        }
        Ok(pieces)
    }

    fn assemble(&mut self, requested: u16, mut pieces: Vec<Arc<Descriptor<T>>>) -> Result<Arc<Descriptor<T>>, ConfigurationError> {
        let mut running = pieces.pop()
            .ok_or(ConfigurationError::MissingComponent { requested, remaining: requested })?;
        while let Some(high) = pieces.pop() {
            let composed = pair(self.registry, &running, &high)
                .ok_or(ConfigurationError::NoRealization { requested, low: running.capacity(), high: high.capacity() })?;
            running = if self.cache_intermediates && composed.is_binary() && !pieces.is_empty() {
                self.keep(composed)
            } else {
                composed
            };
        }
        if self.cache && running.is_composite() && running.is_binary() {
            running = self.registry.publish_binary(running);
        }
        Ok(running)
    }
}
