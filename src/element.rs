use crate::registry::MetadataRegistry;
use crate::shapes;
use std::ptr::NonNull;
use std::rc::Rc;
use std::sync::Arc;

/// An element kind buffers can be allocated for.
///
/// Value kinds get their own registry seeded with the standard shapes. Reference-like
/// kinds (one pointer per slot) keep an empty registry and borrow storage from the
/// `ObjectSlot` placeholder registry instead.
pub trait Element: Sized + 'static {
    const REFERENCE_LIKE: bool = false;

    /// Called once when the registry for this kind is created.
    fn seed(registry: &MetadataRegistry<Self>) {
        shapes::register_standard(registry);
    }
}

/// Placeholder kind whose slots carry any reference-like kind.
#[repr(transparent)]
#[derive(Copy, Clone, Debug)]
pub struct ObjectSlot(*const ());

impl Element for ObjectSlot {}

macro_rules! value_elements {
    ($($t:ty),* $(,)?) => {
        $( impl Element for $t {} )*
    };
}

value_elements!(
    u8, u16, u32, u64, u128, usize,
    i8, i16, i32, i64, i128, isize,
    f32, f64, bool, char, (), String,
);

impl<X: 'static> Element for Vec<X> {}

impl<X: Element, const N: usize> Element for [X; N] {}

macro_rules! reference_like {
    () => {
        const REFERENCE_LIKE: bool = true;

        fn seed(_registry: &MetadataRegistry<Self>) {}
    };
}

impl<X: 'static> Element for Box<X> { reference_like!(); }
impl<X: 'static> Element for Arc<X> { reference_like!(); }
impl<X: 'static> Element for Rc<X> { reference_like!(); }
impl<X: 'static> Element for &'static X { reference_like!(); }
impl<X: 'static> Element for *const X { reference_like!(); }
impl<X: 'static> Element for *mut X { reference_like!(); }
impl<X: 'static> Element for NonNull<X> { reference_like!(); }
impl<X: 'static> Element for Option<Box<X>> { reference_like!(); }
impl<X: 'static> Element for Option<Arc<X>> { reference_like!(); }
impl<X: 'static> Element for Option<NonNull<X>> { reference_like!(); }

#[cfg(test)]
mod element_tests {
    use super::{Element, ObjectSlot};
    use crate::slots::slots_compatible;
    use std::sync::Arc;

    fn assert_fits_placeholder<T: Element>() {
        assert!(T::REFERENCE_LIKE);
        assert!(slots_compatible::<ObjectSlot, T>(), "{} fits an object slot", std::any::type_name::<T>());
    }

    #[test]
    fn reference_like_kinds_fit_object_slots() {
        assert_fits_placeholder::<Box<u64>>();
        assert_fits_placeholder::<Arc<String>>();
        assert_fits_placeholder::<&'static u32>();
        assert_fits_placeholder::<Option<Box<[u8; 64]>>>();
    }

    #[test]
    fn value_kinds_are_not_reference_like() {
        assert!(!u64::REFERENCE_LIKE);
        assert!(!String::REFERENCE_LIKE);
        assert!(!ObjectSlot::REFERENCE_LIKE);
    }
}
