use crate::catalog::Catalog;
use crate::descriptor::Descriptor;
use crate::element::{Element, ObjectSlot};
use crate::pool::SlotPool;
use crate::registry::MetadataRegistry;
use crate::slots;
use crate::view::SlotView;
use std::mem::{size_of, MaybeUninit};
use std::sync::Arc;

/// Storage that served an allocation.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Route {
    /// Zero slots were requested.
    Empty,
    /// An inline shape of the element kind itself, registered or composed.
    Composed,
    /// An inline `ObjectSlot` shape viewed as the element kind.
    Placeholder,
    /// Storage rented from the pool.
    Pooled,
}

/// Settings for a `Dispatcher`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DispatchOptions {
    /// Inline shapes larger than this many bytes are not realized on the stack; such
    /// requests go to the pool.
    pub max_inline_bytes: usize,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        DispatchOptions {
            max_inline_bytes: 64 * 1024,
        }
    }
}

/// Hands out storage for `count` elements of a kind and runs a continuation over it.
///
/// An inline shape of the kind is preferred. Reference-like kinds fall back to shapes of
/// the `ObjectSlot` placeholder. Everything else is served from the kind's pool, and the
/// pooled storage goes back to the pool when the continuation returns or unwinds.
pub struct Dispatcher<'c> {
    catalog: &'c Catalog,
    options: DispatchOptions,
}

impl Dispatcher<'static> {
    pub fn global() -> Dispatcher<'static> {
        Dispatcher::new(Catalog::global())
    }
}

impl<'c> Dispatcher<'c> {
    pub fn new(catalog: &'c Catalog) -> Dispatcher<'c> {
        Dispatcher::with_options(catalog, DispatchOptions::default())
    }

    pub fn with_options(catalog: &'c Catalog, options: DispatchOptions) -> Dispatcher<'c> {
        Dispatcher {
            catalog,
            options,
        }
    }

    pub fn catalog(&self) -> &'c Catalog {
        self.catalog
    }

    pub fn options(&self) -> &DispatchOptions {
        &self.options
    }

    /// Runs `continuation` over storage for `count` elements of `T` and returns its result.
    ///
    /// With `is_minimum_count`, the view may be longer than `count`; otherwise it holds
    /// exactly `count` slots.
    pub fn allocate<T, R>(&self, count: usize, is_minimum_count: bool, continuation: impl FnOnce(SlotView<'_, T>) -> R) -> R
        where
            T: Element,
    {
        self.allocate_traced(count, is_minimum_count, continuation).1
    }

    /// Same as `allocate`, also reporting which storage was used.
    pub fn allocate_traced<T, R>(&self, count: usize, is_minimum_count: bool, continuation: impl FnOnce(SlotView<'_, T>) -> R) -> (Route, R)
        where
            T: Element,
    {
        let kind = self.catalog.kind::<T>();
        self.dispatch(kind.registry(), kind.pool(), count, is_minimum_count, continuation)
    }

    /// Same as `allocate_traced`, with `pool` instead of the kind's own pool.
    pub fn allocate_with_pool<T, P, R>(&self, count: usize, is_minimum_count: bool, pool: &P, continuation: impl FnOnce(SlotView<'_, T>) -> R) -> (Route, R)
        where
            T: Element,
            P: SlotPool<T> + ?Sized,
    {
        let kind = self.catalog.kind::<T>();
        self.dispatch(kind.registry(), pool, count, is_minimum_count, continuation)
    }

    fn dispatch<T, P, R>(
        &self,
        registry: &MetadataRegistry<T>,
        pool: &P,
        count: usize,
        is_minimum_count: bool,
        continuation: impl FnOnce(SlotView<'_, T>) -> R,
    ) -> (Route, R)
        where
            T: Element,
            P: SlotPool<T> + ?Sized,
    {
        if count == 0 {
            return (Route::Empty, continuation(SlotView::empty()));
        }

        if let Some(descriptor) = self.lookup(registry, count, is_minimum_count) {
            let len = view_len(&descriptor, count, is_minimum_count);
            let native = descriptor.native_capacity() as usize;
            trace!("{} x {}: composed {:?}", count, std::any::type_name::<T>(), descriptor);
            let result = descriptor.realize(|slots| continuation(SlotView::new(&mut slots[..len], native)));
            return (Route::Composed, result);
        }

        if T::REFERENCE_LIKE {
            if slots::slots_compatible::<ObjectSlot, T>() {
                let placeholder = self.catalog.kind::<ObjectSlot>();
                if let Some(descriptor) = self.lookup(placeholder.registry(), count, is_minimum_count) {
                    let len = view_len(&descriptor, count, is_minimum_count);
                    let native = descriptor.native_capacity() as usize;
                    trace!("{} x {}: placeholder {:?}", count, std::any::type_name::<T>(), descriptor);
                    let result = descriptor.realize(|slots| {
                        let slots = slots::project_slots_mut::<ObjectSlot, T>(slots);
                        continuation(SlotView::new(&mut slots[..len], native))
                    });
                    return (Route::Placeholder, result);
                }
            } else {
                warn!("{} is reference-like but does not fit an object slot", std::any::type_name::<T>());
            }
        }

        debug!("{} x {}: pooled", count, std::any::type_name::<T>());
        (Route::Pooled, pooled(pool, count, is_minimum_count, continuation))
    }

    fn lookup<U>(&self, registry: &MetadataRegistry<U>, count: usize, is_minimum_count: bool) -> Option<Arc<Descriptor<U>>> {
        let found = if is_minimum_count {
            registry.get_metadata_at_least(count)?
        } else {
            registry.get_metadata(count)?
        };
        if !is_minimum_count && found.capacity() as usize != count {
            return None;
        }
        let inline_bytes = found.native_capacity() as usize * size_of::<U>();
        if inline_bytes > self.options.max_inline_bytes {
            debug!("{} inline bytes exceed the limit of {}", inline_bytes, self.options.max_inline_bytes);
            return None;
        }
        Some(found)
    }
}

fn view_len<U>(descriptor: &Descriptor<U>, count: usize, is_minimum_count: bool) -> usize {
    if is_minimum_count {
        descriptor.capacity() as usize
    } else {
        count
    }
}

/// Pooled storage that goes back to its pool on drop, unwinding included.
struct Lease<'p, T, P: SlotPool<T> + ?Sized> {
    pool: &'p P,
    storage: Vec<MaybeUninit<T>>,
}

impl<'p, T, P: SlotPool<T> + ?Sized> Drop for Lease<'p, T, P> {
    fn drop(&mut self) {
        self.pool.give_back(std::mem::take(&mut self.storage));
    }
}

fn pooled<T, P, R>(pool: &P, count: usize, is_minimum_count: bool, continuation: impl FnOnce(SlotView<'_, T>) -> R) -> R
    where
        P: SlotPool<T> + ?Sized,
{
    let mut lease = Lease {
        pool,
        storage: pool.rent(count),
    };
    if lease.storage.len() < count {
        lease.storage.resize_with(count, MaybeUninit::uninit);
    }
    let native = lease.storage.len();
    let len = if is_minimum_count { native } else { count };
    continuation(SlotView::new(&mut lease.storage[..len], native))
}

#[cfg(test)]
mod dispatch_tests {
    use super::{DispatchOptions, Dispatcher, Route};
    use crate::catalog::Catalog;
    use crate::dropflag::{DropFlag, Droppable};
    use crate::element::{Element, ObjectSlot};
    use crate::pool::{SharedPool, SlotPool};
    use crate::registry::MetadataRegistry;
    use std::cell::{Cell, RefCell};
    use std::mem::MaybeUninit;
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use std::sync::Arc;

    struct CountingPool<T> {
        inner: SharedPool<T>,
        rents: Cell<usize>,
        returns: Cell<usize>,
    }

    impl<T> CountingPool<T> {
        fn new() -> CountingPool<T> {
            CountingPool {
                inner: SharedPool::new(),
                rents: Cell::new(0),
                returns: Cell::new(0),
            }
        }
    }

    impl<T> SlotPool<T> for CountingPool<T> {
        fn rent(&self, count: usize) -> Vec<MaybeUninit<T>> {
            self.rents.set(self.rents.get() + 1);
            self.inner.rent(count)
        }

        fn give_back(&self, storage: Vec<MaybeUninit<T>>) {
            self.returns.set(self.returns.get() + 1);
            self.inner.give_back(storage)
        }
    }

    /// Kind with a single registered shape of 8 slots.
    struct Sparse(#[allow(dead_code)] u32);

    impl Element for Sparse {
        fn seed(registry: &MetadataRegistry<Self>) {
            registry.register_shape::<[Sparse; 8]>(true);
        }
    }

    #[test]
    fn exact_descriptor_gives_exact_view_without_pool() {
        let catalog = Catalog::new();
        let pool = CountingPool::<u64>::new();
        let (route, len) = Dispatcher::new(&catalog).allocate_with_pool(12, false, &pool, |view| view.len());
        assert_eq!(Route::Composed, route);
        assert_eq!(12, len);
        assert_eq!(0, pool.rents.get());
        assert_eq!(0, pool.returns.get());
    }

    #[test]
    fn composed_view_holds_written_values() {
        let catalog = Catalog::new();
        let (route, sum) = Dispatcher::new(&catalog).allocate_traced::<u64, _>(100, false, |mut view| {
            assert_eq!(100, view.len());
            assert!(view.native_capacity() >= 100);
            view.fill_with(|i| i as u64).iter().sum::<u64>()
        });
        assert_eq!(Route::Composed, route);
        assert_eq!(4950, sum);
    }

    #[test]
    fn minimum_count_may_use_larger_shape() {
        let catalog = Catalog::new();
        let dispatcher = Dispatcher::new(&catalog);
        let (route, len) = dispatcher.allocate_traced::<Sparse, _>(5, true, |view| view.len());
        assert_eq!(Route::Composed, route);
        assert_eq!(8, len);

        let (route, len) = dispatcher.allocate_traced::<Sparse, _>(5, false, |view| view.len());
        assert_eq!(Route::Pooled, route);
        assert_eq!(5, len);
    }

    #[test]
    fn uncomposable_count_falls_back_to_pool_once() {
        let catalog = Catalog::new();
        let pool = CountingPool::<u32>::new();
        let dispatcher = Dispatcher::new(&catalog);

        let (route, len) = dispatcher.allocate_with_pool(70_000, false, &pool, |view| view.len());
        assert_eq!(Route::Pooled, route);
        assert_eq!(70_000, len);
        assert_eq!(1, pool.rents.get());
        assert_eq!(1, pool.returns.get());

        let (_, len) = dispatcher.allocate_with_pool(70_000, true, &pool, |view| view.len());
        assert!(len >= 70_000);
        assert_eq!(2, pool.returns.get());
    }

    #[test]
    fn pooled_storage_is_returned_when_continuation_panics() {
        let catalog = Catalog::new();
        let pool = CountingPool::<u32>::new();
        let dispatcher = Dispatcher::new(&catalog);
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            dispatcher.allocate_with_pool::<u32, _, ()>(70_000, false, &pool, |_view| panic!("continuation failed"))
        }));
        assert!(outcome.is_err());
        assert_eq!(1, pool.rents.get());
        assert_eq!(1, pool.returns.get());
    }

    #[test]
    fn continuation_error_is_returned_after_release() {
        let catalog = Catalog::new();
        let pool = CountingPool::<u8>::new();
        let (_, result) = Dispatcher::new(&catalog).allocate_with_pool(70_000, false, &pool, |_view| -> Result<(), &'static str> {
            Err("rejected")
        });
        assert_eq!(Err("rejected"), result);
        assert_eq!(1, pool.returns.get());
    }

    #[test]
    fn reference_kind_uses_placeholder_shapes() {
        let catalog = Catalog::new();
        let (route, sum) = Dispatcher::new(&catalog).allocate_traced::<Box<u32>, _>(10, false, |mut view| {
            view.fill_with(|i| Box::new(i as u32));
            view.as_slice().iter().map(|b| **b).sum::<u32>()
        });
        assert_eq!(Route::Placeholder, route);
        assert_eq!(45, sum);
        assert_eq!(0, catalog.kind::<Box<u32>>().registry().stats().binary);
    }

    #[test]
    fn uncomposable_reference_count_falls_back_to_pool_once() {
        let catalog = Catalog::new();
        let pool = CountingPool::<Box<u32>>::new();
        let (route, len) = Dispatcher::new(&catalog).allocate_with_pool(70_000, false, &pool, |mut view| {
            assert!(view.push(Box::new(1)).is_ok());
            view.len()
        });
        assert_eq!(Route::Pooled, route);
        assert_eq!(70_000, len);
        assert_eq!(1, pool.rents.get());
        assert_eq!(1, pool.returns.get());
    }

    #[test]
    fn minimum_count_reference_view_uses_placeholder_capacity() {
        let catalog = Catalog::new();
        let (route, (len, native)) = Dispatcher::new(&catalog).allocate_traced::<Box<u32>, _>(100, true, |view| {
            (view.len(), view.native_capacity())
        });
        assert_eq!(Route::Placeholder, route);
        let placeholder = catalog.kind::<ObjectSlot>().registry().get_metadata_at_least(100).unwrap();
        assert_eq!(placeholder.capacity() as usize, len);
        assert!(len >= 100);
        assert!(native >= len);
    }

    #[test]
    fn placeholder_items_are_dropped_once() {
        let catalog = Catalog::new();
        let flag = DropFlag::new(RefCell::new(0));
        let route = Dispatcher::new(&catalog).allocate_traced::<Box<Droppable>, _>(5, false, |mut view| {
            view.fill_with(|_| Box::new(Droppable { dropflag: flag.clone() }));
            assert_eq!(0, *flag.borrow());
        }).0;
        assert_eq!(Route::Placeholder, route);
        assert_eq!(5, *flag.borrow());

        let shared = Arc::new(7u32);
        let route = Dispatcher::new(&catalog).allocate_traced::<Arc<u32>, _>(4, false, |mut view| {
            view.fill_with(|_| shared.clone());
            assert_eq!(5, Arc::strong_count(&shared));
        }).0;
        assert_eq!(Route::Placeholder, route);
        assert_eq!(1, Arc::strong_count(&shared));
    }

    /// Reference-like kind two pointers wide.
    struct Wide(#[allow(dead_code)] *const (), #[allow(dead_code)] *const ());

    impl Element for Wide {
        const REFERENCE_LIKE: bool = true;

        fn seed(_registry: &MetadataRegistry<Self>) {}
    }

    #[test]
    fn reference_kind_wider_than_object_slot_goes_to_pool() {
        let catalog = Catalog::new();
        let pool = CountingPool::<Wide>::new();
        let (route, len) = Dispatcher::new(&catalog).allocate_with_pool(6, false, &pool, |view| view.len());
        assert_eq!(Route::Pooled, route);
        assert_eq!(6, len);
        assert_eq!(1, pool.returns.get());
        assert_eq!(1, catalog.kinds(), "placeholder registry is not consulted");
    }

    #[test]
    fn odd_request_keeps_large_counts_inline() {
        let catalog = Catalog::new();
        let dispatcher = Dispatcher::new(&catalog);
        let (route, _) = dispatcher.allocate_traced::<u8, _>(36, false, |view| view.len());
        assert_eq!(Route::Composed, route);
        let (route, len) = dispatcher.allocate_traced::<u8, _>(1000, false, |view| view.len());
        assert_eq!(Route::Composed, route);
        assert_eq!(1000, len);
    }

    #[test]
    fn oversized_inline_shape_goes_to_pool() {
        let catalog = Catalog::new();
        let dispatcher = Dispatcher::with_options(&catalog, DispatchOptions { max_inline_bytes: 64 });
        let (route, _) = dispatcher.allocate_traced::<u64, _>(8, false, |view| view.len());
        assert_eq!(Route::Composed, route);
        let (route, len) = dispatcher.allocate_traced::<u64, _>(16, false, |view| view.len());
        assert_eq!(Route::Pooled, route);
        assert_eq!(16, len);
    }

    #[test]
    fn zero_count_gets_empty_view() {
        let catalog = Catalog::new();
        let pool = CountingPool::<u16>::new();
        let (route, len) = Dispatcher::new(&catalog).allocate_with_pool(0, false, &pool, |view| view.len());
        assert_eq!(Route::Empty, route);
        assert_eq!(0, len);
        assert_eq!(0, pool.rents.get());
    }

    #[test]
    fn initialized_items_are_dropped_after_continuation() {
        let catalog = Catalog::new();
        let flag = DropFlag::new(RefCell::new(0));
        let route = Dispatcher::new(&catalog).allocate_traced::<Droppable, _>(3, false, |mut view| {
            view.fill_with(|_| Droppable { dropflag: flag.clone() });
            assert_eq!(0, *flag.borrow());
        }).0;
        assert_eq!(Route::Composed, route);
        assert_eq!(3, *flag.borrow());
    }

    #[test]
    fn global_dispatcher_allocates() {
        assert_eq!(7, crate::allocate::<u16, _>(7, false, |view| view.len()));
        assert_eq!(7, crate::get_metadata::<u16>(7).unwrap().capacity());
    }
}
