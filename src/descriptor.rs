use crate::shape::{Shape, ShapeId, StaticShape};
use std::fmt::{Debug, Formatter};
use std::mem::MaybeUninit;
use std::sync::Arc;

/// How a descriptor instantiates its storage.
pub enum Realization<T> {
    /// A static shape with exactly the descriptor's capacity.
    Static(StaticShape<T>),
    /// A larger static shape chosen at run time; only the first `capacity` slots are exposed.
    Covering(StaticShape<T>),
}

impl<T> Clone for Realization<T> {
    fn clone(&self) -> Self {
        match self {
            Realization::Static(shape) => Realization::Static(*shape),
            Realization::Covering(shape) => Realization::Covering(*shape),
        }
    }
}

impl<T> Debug for Realization<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Realization::Static(shape) => f.debug_tuple("Static").field(shape).finish(),
            Realization::Covering(shape) => f.debug_tuple("Covering").field(shape).finish(),
        }
    }
}

impl<T> Realization<T> {
    #[inline(always)]
    pub fn shape(&self) -> &StaticShape<T> {
        match self {
            Realization::Static(shape) | Realization::Covering(shape) => shape,
        }
    }
}

/// Immutable description of one buffer shape.
///
/// A composite descriptor owns its two components, `low` and `high`, and its capacity is
/// always their sum. Once a descriptor is published to a registry it is shared through an
/// `Arc` and never changes.
pub struct Descriptor<T> {
    capacity: u16,
    is_binary: bool,
    components: Option<(Arc<Descriptor<T>>, Arc<Descriptor<T>>)>,
    realization: Realization<T>,
}

impl<T: 'static> Descriptor<T> {
    /// Describes the static shape `S` as a fundamental, non-composite buffer.
    pub fn of_shape<S: Shape<Item = T>>(is_binary: bool) -> Option<Arc<Descriptor<T>>> {
        StaticShape::of::<S>().map(|shape| Descriptor::fundamental(shape, is_binary))
    }
}

impl<T> Descriptor<T> {
    pub fn fundamental(shape: StaticShape<T>, is_binary: bool) -> Arc<Descriptor<T>> {
        Arc::new(Descriptor {
            capacity: shape.capacity(),
            is_binary,
            components: None,
            realization: Realization::Static(shape),
        })
    }

    /// Builds a composite of `low` and `high`. Returns `None` if the combined capacity
    /// overflows `u16` or the realization is too small to hold it.
    pub(crate) fn composite(
        low: Arc<Descriptor<T>>,
        high: Arc<Descriptor<T>>,
        is_binary: bool,
        realization: Realization<T>,
    ) -> Option<Arc<Descriptor<T>>> {
        let capacity = low.capacity.checked_add(high.capacity)?;
        if realization.shape().capacity() < capacity {
            return None;
        }
        Some(Arc::new(Descriptor {
            capacity,
            is_binary,
            components: Some((low, high)),
            realization,
        }))
    }

    #[inline(always)]
    pub fn capacity(&self) -> u16 {
        self.capacity
    }

    /// Slots actually instantiated on realization, at least `capacity`.
    #[inline(always)]
    pub fn native_capacity(&self) -> u16 {
        self.realization.shape().capacity()
    }

    #[inline(always)]
    pub fn is_binary(&self) -> bool {
        self.is_binary
    }

    #[inline(always)]
    pub fn is_composite(&self) -> bool {
        self.components.is_some()
    }

    /// Returns `(low, high)` for composite descriptors.
    pub fn components(&self) -> Option<(&Arc<Descriptor<T>>, &Arc<Descriptor<T>>)> {
        self.components.as_ref().map(|(low, high)| (low, high))
    }

    /// True for a composite of two halves with equal capacity.
    pub fn is_doubled(&self) -> bool {
        match &self.components {
            Some((low, high)) => low.capacity == high.capacity,
            None => false,
        }
    }

    /// True if pairing this descriptor with itself yields another binary piece.
    pub fn extends_chain(&self) -> bool {
        self.is_binary && (!self.is_composite() || self.is_doubled())
    }

    /// Identity of the exact static type behind this descriptor, if there is one.
    pub fn shape_id(&self) -> Option<ShapeId> {
        match &self.realization {
            Realization::Static(shape) => Some(shape.id()),
            Realization::Covering(_) => None,
        }
    }

    pub fn realization(&self) -> &Realization<T> {
        &self.realization
    }

    /// Instantiates storage for this shape and runs `f` over its first `capacity` slots.
    pub fn realize<R>(&self, f: impl FnOnce(&mut [MaybeUninit<T>]) -> R) -> R {
        let capacity = self.capacity as usize;
        self.realization.shape().run(|slots| f(&mut slots[..capacity]))
    }
}

impl<T> Debug for Descriptor<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct("Descriptor");
        s.field("capacity", &self.capacity)
            .field("is_binary", &self.is_binary);
        if let Some((low, high)) = &self.components {
            s.field("low", &low.capacity).field("high", &high.capacity);
        }
        s.field("realization", &self.realization).finish()
    }
}
