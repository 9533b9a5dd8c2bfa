use crate::slots;
use std::any::TypeId;
use std::fmt::{Debug, Formatter};
use std::mem::MaybeUninit;

/// A type whose memory is exactly `CAPACITY` consecutive `Item` slots.
///
/// # Safety
///
/// The implementing type must have the size and alignment of `[Self::Item; Self::CAPACITY]`,
/// with no padding before, between or after the slots.
pub unsafe trait Shape: Sized + 'static {
    type Item: 'static;
    const CAPACITY: usize;
}

unsafe impl<T: 'static, const N: usize> Shape for [T; N] {
    type Item = T;
    const CAPACITY: usize = N;
}

/// Two shapes of the same item laid out back to back, `low` first.
///
/// Both halves are item arrays (or pairs of them), so their sizes are multiples of the
/// item alignment and `repr(C)` places `high` right after `low`.
#[repr(C)]
#[allow(dead_code)]
pub struct Pair<A, B> {
    low: A,
    high: B,
}

unsafe impl<A, B> Shape for Pair<A, B>
    where
        A: Shape,
        B: Shape<Item = A::Item>,
{
    type Item = A::Item;
    const CAPACITY: usize = A::CAPACITY + B::CAPACITY;
}

/// Identity of a static shape type.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct ShapeId(TypeId);

impl ShapeId {
    pub fn of<S: Shape>() -> ShapeId {
        ShapeId(TypeId::of::<S>())
    }
}

/// Instantiates uninitialized storage and hands it to the continuation.
pub type RealizeFn<T> = fn(&mut dyn FnMut(&mut [MaybeUninit<T>]));

/// Type-erased handle to a static shape with item `T`.
pub struct StaticShape<T> {
    id: ShapeId,
    capacity: u16,
    realize: RealizeFn<T>,
    name: &'static str,
}

impl<T> Clone for StaticShape<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for StaticShape<T> {}

impl<T> Debug for StaticShape<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticShape")
            .field("capacity", &self.capacity)
            .field("type", &self.name)
            .finish()
    }
}

impl<T: 'static> StaticShape<T> {
    /// Erases the shape type `S`. Returns `None` for empty shapes and shapes with more
    /// than `u16::MAX` slots.
    pub fn of<S: Shape<Item = T>>() -> Option<StaticShape<T>> {
        let capacity = u16::try_from(S::CAPACITY).ok().filter(|c| *c > 0)?;
        Some(StaticShape {
            id: ShapeId::of::<S>(),
            capacity,
            realize: realize_shape::<S>,
            name: std::any::type_name::<S>(),
        })
    }
}

impl<T> StaticShape<T> {
    #[inline(always)]
    pub fn id(&self) -> ShapeId {
        self.id
    }

    #[inline(always)]
    pub fn capacity(&self) -> u16 {
        self.capacity
    }

    pub fn type_name(&self) -> &'static str {
        self.name
    }

    /// Runs `f` over freshly instantiated, uninitialized storage of this shape.
    ///
    /// The storage lives in the realizing stack frame and is gone once `f` returns.
    pub fn run<R>(&self, f: impl FnOnce(&mut [MaybeUninit<T>]) -> R) -> R {
        let mut f = Some(f);
        let mut result = None;
        (self.realize)(&mut |slots: &mut [MaybeUninit<T>]| {
            if let Some(f) = f.take() {
                result = Some(f(slots));
            }
        });
        match result {
            Some(result) => result,
            None => unreachable!("shape realizer did not run its continuation"),
        }
    }
}

fn realize_shape<S: Shape>(f: &mut dyn FnMut(&mut [MaybeUninit<S::Item>])) {
    let mut storage = MaybeUninit::<S>::uninit();
    let slots = unsafe { slots::shape_slots_mut(&mut storage) };
    f(slots)
}
