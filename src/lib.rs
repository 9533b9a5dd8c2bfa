//! Stack buffers of runtime length, assembled from statically sized shapes.
//!
//! Each element kind has a `MetadataRegistry` of shapes. Requests for a capacity that no
//! shape matches are composed from smaller ones and cached. A `Dispatcher` realizes the
//! chosen shape on the stack and hands it to a continuation as a `SlotView`, falling back
//! to pooled heap storage when nothing inline fits.

#[macro_use]
mod logging;

mod shape;
mod slots;
mod descriptor;
mod registry;
mod compose;
mod shapes;
mod element;
mod pool;
mod view;
mod catalog;
mod dispatch;
mod error;

pub use shape::{Shape, Pair, ShapeId, StaticShape, RealizeFn};
pub use descriptor::{Descriptor, Realization};
pub use registry::{MetadataRegistry, RegistryStats};
pub use compose::{compose, prepare, tie_break, dynamic_compose};
pub use shapes::register_standard;
pub use element::{Element, ObjectSlot};
pub use pool::{SlotPool, SharedPool, PoolBuilder, PoolStats};
pub use view::SlotView;
pub use catalog::{Catalog, CatalogBuilder, KindState};
pub use dispatch::{Dispatcher, DispatchOptions, Route};
pub use error::ConfigurationError;

use std::sync::Arc;

/// Runs `continuation` over storage for `count` elements of `T` from the global catalog.
///
/// See `Dispatcher::allocate`.
pub fn allocate<T, R>(count: usize, is_minimum_count: bool, continuation: impl FnOnce(SlotView<'_, T>) -> R) -> R
    where
        T: Element,
{
    Dispatcher::global().allocate(count, is_minimum_count, continuation)
}

/// Descriptor for exactly `count` elements of `T` in the global catalog.
pub fn get_metadata<T: Element>(count: usize) -> Option<Arc<Descriptor<T>>> {
    Catalog::global().kind::<T>().registry().get_metadata(count)
}

#[cfg(test)]
pub mod dropflag;
