/*!

Reinterpret shape storage as item slots, and placeholder slots as slots of another kind.

Everything here hands out `MaybeUninit` slots only. Whatever bytes are in there, nothing
is read as a `T` until the caller has written one.

*/

use crate::shape::Shape;
use std::mem::{align_of, size_of, MaybeUninit};

/// Views uninitialized shape storage as its `S::CAPACITY` item slots.
///
/// # Safety
///
/// Relies on the `Shape` layout contract of `S`.
#[inline(always)]
pub unsafe fn shape_slots_mut<S: Shape>(storage: &mut MaybeUninit<S>) -> &mut [MaybeUninit<S::Item>] {
    debug_assert_eq!(
        size_of::<S>(),
        size_of::<S::Item>() * S::CAPACITY,
        "shape size matches its slot count"
    );
    std::slice::from_raw_parts_mut(storage.as_mut_ptr() as *mut MaybeUninit<S::Item>, S::CAPACITY)
}

/// Returns true if slots of `From` can carry values of `To`.
#[inline(always)]
pub const fn slots_compatible<From, To>() -> bool {
    size_of::<From>() == size_of::<To>() && align_of::<To>() <= align_of::<From>()
}

/// Projects placeholder slots onto slots of `To`.
///
/// Panics if the slot sizes differ or `To` needs stricter alignment than `From`.
pub fn project_slots_mut<From, To>(slots: &mut [MaybeUninit<From>]) -> &mut [MaybeUninit<To>] {
    assert_eq!(
        size_of::<From>(),
        size_of::<To>(),
        "placeholder slot size differs from {}",
        std::any::type_name::<To>()
    );
    assert!(
        align_of::<To>() <= align_of::<From>(),
        "placeholder slot alignment is weaker than {}",
        std::any::type_name::<To>()
    );
    unsafe { std::slice::from_raw_parts_mut(slots.as_mut_ptr() as *mut MaybeUninit<To>, slots.len()) }
}
