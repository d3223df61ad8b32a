//! Cleanup functions and control-block allocators.

use base::alloc::Layout;
use base::ptr::NonNull;

use alloc::boxed::Box;

/// Releases the object behind a pointer once its owner is done with it.
///
/// A [`SharedPtr`](crate::SharedPtr) built from a null pointer and a deleter
/// still runs the deleter, with that null pointer. [`UniquePtr`](crate::UniquePtr)
/// only ever passes non-null pointers.
pub trait Deleter<T: ?Sized> {
    /// Clean up the object behind `ptr`.
    ///
    /// # Safety
    ///
    /// `ptr` must be the pointer this deleter was handed ownership of, and is
    /// passed at most once.
    unsafe fn delete(&mut self, ptr: *mut T);
}

/// Frees pointers that came from [`Box::into_raw`], slices included.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct DefaultDelete;

impl<T: ?Sized> Deleter<T> for DefaultDelete {
    #[inline]
    unsafe fn delete(&mut self, ptr: *mut T) {
        if !ptr.is_null() {
            drop(unsafe { Box::from_raw(ptr) });
        }
    }
}

/// A borrowed deleter; the owner only keeps the reference.
impl<T: ?Sized, D: Deleter<T> + ?Sized> Deleter<T> for &mut D {
    #[inline]
    unsafe fn delete(&mut self, ptr: *mut T) {
        unsafe { (**self).delete(ptr) }
    }
}

/// Adapts a closure into a [`Deleter`].
///
/// ```
/// use throwing_ptr::{FnDeleter, UniquePtr};
///
/// let free = FnDeleter(|p: *mut i32| drop(unsafe { Box::from_raw(p) }));
/// let raw = Box::into_raw(Box::new(3));
/// let p = unsafe { UniquePtr::from_raw_with_deleter(raw, free) };
/// assert_eq!(*p, 3);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct FnDeleter<F>(pub F);

impl<T: ?Sized, F: FnMut(*mut T)> Deleter<T> for FnDeleter<F> {
    #[inline]
    unsafe fn delete(&mut self, ptr: *mut T) {
        (self.0)(ptr)
    }
}

/// Keeps a foreign owner alive until the control block disposes of it.
///
/// Dropping the value is the cleanup; `delete` itself does nothing.
pub(crate) struct KeepAlive<P>(#[allow(dead_code)] pub(crate) P);

impl<T: ?Sized, P> Deleter<T> for KeepAlive<P> {
    #[inline]
    unsafe fn delete(&mut self, _ptr: *mut T) {}
}

/// The memory source for control blocks.
///
/// # Safety
///
/// `allocate` must return memory fitting `layout` (size and alignment) that
/// stays valid until handed back to `deallocate` with the same layout.
pub unsafe trait RawAlloc {
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>>;

    /// # Safety
    ///
    /// `ptr` came from `allocate` on this allocator (or a copy of it) with the
    /// same `layout`.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout);
}

/// The global heap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Global;

unsafe impl RawAlloc for Global {
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        if layout.size() == 0 {
            return NonNull::new(layout.align() as *mut u8);
        }
        NonNull::new(unsafe { base::alloc::alloc(layout) })
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        if layout.size() != 0 {
            unsafe { base::alloc::dealloc(ptr.as_ptr(), layout) }
        }
    }
}

unsafe impl<A: RawAlloc + ?Sized> RawAlloc for &A {
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        (**self).allocate(layout)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        unsafe { (**self).deallocate(ptr, layout) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base::cell::Cell;

    struct Flag<'a>(&'a Cell<u32>);

    impl Drop for Flag<'_> {
        fn drop(&mut self) {
            self.0.set(self.0.get() + 1);
        }
    }

    #[test]
    fn default_delete_drops_the_box() {
        let drops = Cell::new(0);
        let raw = Box::into_raw(Box::new(Flag(&drops)));
        unsafe { DefaultDelete.delete(raw) };
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn default_delete_ignores_null() {
        unsafe { Deleter::<u32>::delete(&mut DefaultDelete, base::ptr::null_mut()) };
    }

    #[test]
    fn default_delete_handles_slices() {
        let drops = Cell::new(0);
        let boxed: Box<[Flag<'_>]> = alloc::vec![Flag(&drops), Flag(&drops)].into_boxed_slice();
        unsafe { DefaultDelete.delete(Box::into_raw(boxed)) };
        assert_eq!(drops.get(), 2);
    }

    #[test]
    fn borrowed_deleter_forwards() {
        let calls = Cell::new(0);
        let mut inner = FnDeleter(|p: *mut u8| {
            calls.set(calls.get() + 1);
            drop(unsafe { Box::from_raw(p) });
        });
        let mut borrowed = &mut inner;
        let raw = Box::into_raw(Box::new(1u8));
        unsafe { Deleter::<u8>::delete(&mut borrowed, raw) };
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn global_round_trips_zero_sized_layouts() {
        let layout = Layout::new::<()>();
        let mem = Global.allocate(layout).unwrap();
        unsafe { Global.deallocate(mem, layout) };

        let layout = Layout::new::<[u64; 4]>();
        let mem = Global.allocate(layout).unwrap();
        assert_eq!(mem.as_ptr() as usize % layout.align(), 0);
        unsafe { Global.deallocate(mem, layout) };
    }
}
