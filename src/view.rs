use std::fmt::{Debug, Formatter};
use std::mem::MaybeUninit;

/// Storage handed to an allocation continuation.
///
/// The view borrows its slots for the duration of the call only. Slots are filled front
/// to back; the initialized prefix is readable as a slice and is dropped together with the
/// view. Slots beyond `len` (when the realized shape is larger than requested) are not
/// reachable.
pub struct SlotView<'a, T> {
    slots: &'a mut [MaybeUninit<T>],
    native_capacity: usize,
    initialized: usize,
}

impl<'a, T> SlotView<'a, T> {
    pub(crate) fn new(slots: &'a mut [MaybeUninit<T>], native_capacity: usize) -> SlotView<'a, T> {
        debug_assert!(native_capacity >= slots.len(), "view fits in realized storage");
        SlotView {
            slots,
            native_capacity,
            initialized: 0,
        }
    }

    pub(crate) fn empty() -> SlotView<'a, T> {
        SlotView::new(&mut [], 0)
    }

    /// Number of slots in the view.
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Slots of the storage that was actually realized, at least `len`.
    #[inline(always)]
    pub fn native_capacity(&self) -> usize {
        self.native_capacity
    }

    /// Number of initialized slots at the front of the view.
    #[inline(always)]
    pub fn initialized(&self) -> usize {
        self.initialized
    }

    #[inline(always)]
    pub fn remaining(&self) -> usize {
        self.slots.len() - self.initialized
    }

    #[inline(always)]
    pub fn is_full(&self) -> bool {
        self.initialized == self.slots.len()
    }

    /// Initializes the next slot, or gives the value back if the view is full.
    pub fn push(&mut self, value: T) -> Result<&mut T, T> {
        match self.slots.get_mut(self.initialized) {
            None => Err(value),
            Some(slot) => {
                self.initialized += 1;
                Ok(slot.write(value))
            },
        }
    }

    /// Initializes every remaining slot with `f(index)` and returns the whole initialized prefix.
    pub fn fill_with(&mut self, mut f: impl FnMut(usize) -> T) -> &mut [T] {
        while self.initialized < self.slots.len() {
            let index = self.initialized;
            self.slots[index].write(f(index));
            self.initialized += 1;
        }
        self.as_mut_slice()
    }

    /// Pushes items until the view is full or the iterator ends. Returns how many were taken.
    pub fn extend<I: IntoIterator<Item = T>>(&mut self, items: I) -> usize {
        let mut taken = 0;
        let mut items = items.into_iter();
        while !self.is_full() {
            match items.next() {
                Some(item) => {
                    let index = self.initialized;
                    self.slots[index].write(item);
                    self.initialized += 1;
                    taken += 1;
                },
                None => break,
            }
        }
        taken
    }

    pub fn as_slice(&self) -> &[T] {
        unsafe { std::slice::from_raw_parts(self.slots.as_ptr() as *const T, self.initialized) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        unsafe { std::slice::from_raw_parts_mut(self.slots.as_mut_ptr() as *mut T, self.initialized) }
    }

    /// Drops the initialized prefix and starts over.
    pub fn clear(&mut self) {
        let initialized = self.initialized;
        self.initialized = 0;
        unsafe {
            std::ptr::drop_in_place(std::slice::from_raw_parts_mut(self.slots.as_mut_ptr() as *mut T, initialized));
        }
    }

    /// All slots of the view, initialized or not.
    ///
    /// # Safety
    ///
    /// Slots below `initialized` hold live values; overwriting them leaks those values, and
    /// calling `MaybeUninit::assume_init_drop` on them leads to a double drop.
    pub unsafe fn as_uninit_mut(&mut self) -> &mut [MaybeUninit<T>] {
        self.slots
    }

    /// Declares the first `len` slots initialized.
    ///
    /// # Safety
    ///
    /// The first `len` slots must hold valid values, and values below the previous
    /// `initialized` mark that are past `len` are forgotten.
    pub unsafe fn set_initialized(&mut self, len: usize) {
        if len > self.slots.len() {
            panic!("set_initialized exceeds view length");
        }
        self.initialized = len;
    }
}

impl<'a, T> Drop for SlotView<'a, T> {
    fn drop(&mut self) {
        self.clear();
    }
}

impl<'a, T: Debug> Debug for SlotView<'a, T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlotView")
            .field("len", &self.len())
            .field("native_capacity", &self.native_capacity)
            .field("items", &self.as_slice())
            .finish()
    }
}

#[cfg(test)]
mod view_tests {
    use super::SlotView;
    use crate::dropflag::{DropFlag, Droppable};
    use std::cell::RefCell;
    use std::mem::MaybeUninit;

    #[test]
    fn push_stops_at_view_length() {
        let mut storage = [MaybeUninit::<u32>::uninit(); 4];
        let mut view = SlotView::new(&mut storage[..3], 4);
        assert_eq!(3, view.len());
        assert_eq!(4, view.native_capacity());
        for i in 0..3 {
            assert_eq!(i, *view.push(i).expect("room left"));
        }
        assert!(view.is_full());
        assert_eq!(Err(9), view.push(9).map(|v| *v));
        assert_eq!(&[0, 1, 2], view.as_slice());
    }

    #[test]
    fn fill_with_initializes_remaining_slots() {
        let mut storage = [MaybeUninit::<usize>::uninit(); 5];
        let mut view = SlotView::new(&mut storage, 5);
        view.push(100).unwrap();
        let filled = view.fill_with(|i| i * 10);
        assert_eq!(&[100, 10, 20, 30, 40], filled);
    }

    #[test]
    fn extend_takes_only_what_fits() {
        let mut storage = [MaybeUninit::<u8>::uninit(); 3];
        let mut view = SlotView::new(&mut storage, 3);
        assert_eq!(3, view.extend(0..10));
        assert_eq!(&[0, 1, 2], view.as_slice());
        assert_eq!(0, view.remaining());
    }

    #[test]
    fn initialized_items_are_dropped_with_view() {
        let flag = DropFlag::new(RefCell::new(0));
        let mut storage: Vec<MaybeUninit<Droppable>> = (0..4).map(|_| MaybeUninit::uninit()).collect();
        {
            let mut view = SlotView::new(&mut storage, 4);
            view.push(Droppable { dropflag: flag.clone() }).ok().unwrap();
            view.push(Droppable { dropflag: flag.clone() }).ok().unwrap();
            assert_eq!(0, *flag.borrow());
        }
        assert_eq!(2, *flag.borrow());
    }

    #[test]
    fn clear_drops_items_once() {
        let flag = DropFlag::new(RefCell::new(0));
        let mut storage: Vec<MaybeUninit<Droppable>> = (0..2).map(|_| MaybeUninit::uninit()).collect();
        let mut view = SlotView::new(&mut storage, 2);
        view.fill_with(|_| Droppable { dropflag: flag.clone() });
        view.clear();
        assert_eq!(2, *flag.borrow());
        assert_eq!(0, view.initialized());
        drop(view);
        assert_eq!(2, *flag.borrow());
    }
}
