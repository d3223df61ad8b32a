// The counting protocol is adapted from the rust standard library Arc.

use base::alloc::{handle_alloc_error, Layout};
use base::mem::ManuallyDrop;
use base::ptr::{self, NonNull};
use base::sync::atomic;
use base::sync::atomic::Ordering::{Acquire, Relaxed, Release};

use crate::deleter::{Deleter, RawAlloc};

/// A soft limit on the amount of references that may be made to a control
/// block.
const MAX_REFCOUNT: usize = (isize::MAX) as usize;

macro_rules! acquire {
    ($x:expr) => {
        atomic::fence(Acquire)
    };
}

/// The part every control block starts with.
///
/// `weak` counts the observers plus one on behalf of all owners together, so
/// the block outlives the pointee for as long as any observer needs it.
#[repr(C)]
pub(crate) struct CtrlHeader {
    strong: atomic::AtomicUsize,
    weak: atomic::AtomicUsize,
    /// Cleans up the managed object.
    dispose: unsafe fn(NonNull<CtrlHeader>),
    /// Frees the block itself.
    destroy: unsafe fn(NonNull<CtrlHeader>),
}

impl CtrlHeader {
    fn new(
        dispose: unsafe fn(NonNull<CtrlHeader>),
        destroy: unsafe fn(NonNull<CtrlHeader>),
    ) -> Self {
        Self {
            strong: atomic::AtomicUsize::new(1),
            weak: atomic::AtomicUsize::new(1),
            dispose,
            destroy,
        }
    }
}

/// An unowned handle to a control block.
///
/// Counting is left to the pointer types holding it; the handle itself is
/// plain data.
#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) struct Ctrl(NonNull<CtrlHeader>);

impl Ctrl {
    #[inline]
    fn inner(&self) -> &CtrlHeader {
        // This unsafety is ok because whoever holds this handle also holds a
        // strong or weak count, which keeps the block allocated.
        unsafe { self.0.as_ref() }
    }

    /// The identity used for owner-based ordering.
    #[inline]
    pub(crate) fn addr(self) -> usize {
        self.0.as_ptr() as usize
    }

    #[inline]
    pub(crate) fn strong_count(self) -> usize {
        self.inner().strong.load(Relaxed)
    }

    #[inline]
    pub(crate) fn inc_strong(self) {
        // Relaxed is enough: a new owner can only be made from an existing
        // one, and handing that one over already synchronizes.
        let old_size = self.inner().strong.fetch_add(1, Relaxed);

        if old_size > MAX_REFCOUNT {
            panic!("reference count overflow");
        }
    }

    /// Gives up one owner, disposing of the pointee if it was the last.
    ///
    /// # Safety
    ///
    /// The caller owns one strong count and does not use it afterwards.
    #[inline]
    pub(crate) unsafe fn dec_strong(self) {
        if self.inner().strong.fetch_sub(1, Release) != 1 {
            return;
        }

        // Uses of the pointee happen before their owner's release decrement,
        // which happens before this fence, which happens before disposal.
        acquire!(self.inner().strong);

        unsafe { self.drop_slow() };
    }

    #[inline(never)]
    unsafe fn drop_slow(self) {
        log::trace!("disposing pointee of control block {:p}", self.0);
        unsafe { (self.inner().dispose)(self.0) };

        // Drop the weak count held collectively by the owners.
        unsafe { self.dec_weak() };
    }

    /// Turns an observer into an owner, unless the pointee is already gone.
    #[inline]
    pub(crate) fn try_inc_strong(self) -> bool {
        let strong = &self.inner().strong;
        let mut n = strong.load(Relaxed);

        loop {
            if n == 0 {
                return false;
            }
            if n > MAX_REFCOUNT {
                panic!("reference count overflow");
            }

            // Acquire pairs with the release decrement in `dec_strong`, so a
            // successful upgrade sees every write made before the last
            // owner let go.
            match strong.compare_exchange_weak(n, n + 1, Acquire, Relaxed) {
                Ok(_) => return true,
                Err(old) => n = old,
            }
        }
    }

    #[inline]
    pub(crate) fn inc_weak(self) {
        let old_size = self.inner().weak.fetch_add(1, Relaxed);

        if old_size > MAX_REFCOUNT {
            panic!("reference count overflow");
        }
    }

    /// Gives up one weak count, freeing the block if it was the last.
    ///
    /// # Safety
    ///
    /// The caller owns one weak count and does not use it afterwards.
    #[inline]
    pub(crate) unsafe fn dec_weak(self) {
        if self.inner().weak.fetch_sub(1, Release) != 1 {
            return;
        }

        acquire!(self.inner().weak);

        log::trace!("freeing control block {:p}", self.0);
        unsafe { (self.inner().destroy)(self.0) };
    }
}

fn allocate_block<B, A: RawAlloc>(alloc: &A) -> Result<NonNull<B>, Layout> {
    let layout = Layout::new::<B>();
    match alloc.allocate(layout) {
        Some(mem) => Ok(mem.cast()),
        None => Err(layout),
    }
}

/// A block for a pointer allocated elsewhere, released through a deleter.
#[repr(C)]
struct PtrBlock<T: ?Sized, D, A> {
    header: CtrlHeader,
    /// May be null; the deleter still runs.
    ptr: *mut T,
    deleter: ManuallyDrop<D>,
    alloc: ManuallyDrop<A>,
}

impl<T: ?Sized, D: Deleter<T>, A: RawAlloc> PtrBlock<T, D, A> {
    unsafe fn dispose(header: NonNull<CtrlHeader>) {
        let block = header.cast::<Self>().as_ptr();
        unsafe {
            let mut deleter = ManuallyDrop::take(&mut (*block).deleter);
            deleter.delete((*block).ptr);
        }
    }

    unsafe fn destroy(header: NonNull<CtrlHeader>) {
        let block = header.cast::<Self>();
        unsafe {
            let alloc = ManuallyDrop::take(&mut (*block.as_ptr()).alloc);
            alloc.deallocate(block.cast(), Layout::new::<Self>());
        }
    }
}

/// A block that stores the pointee inline, as `make_shared` does.
#[repr(C)]
struct InplaceBlock<T, A> {
    header: CtrlHeader,
    alloc: ManuallyDrop<A>,
    value: ManuallyDrop<T>,
}

impl<T, A: RawAlloc> InplaceBlock<T, A> {
    unsafe fn dispose(header: NonNull<CtrlHeader>) {
        let block = header.cast::<Self>().as_ptr();
        unsafe { ManuallyDrop::drop(&mut *ptr::addr_of_mut!((*block).value)) };
    }

    unsafe fn destroy(header: NonNull<CtrlHeader>) {
        let block = header.cast::<Self>();
        unsafe {
            let alloc = ManuallyDrop::take(&mut (*block.as_ptr()).alloc);
            alloc.deallocate(block.cast(), Layout::new::<Self>());
        }
    }
}

/// Creates a control block that owns `ptr` and releases it through `deleter`.
///
/// The new block holds one strong count for the caller. If the block cannot
/// be allocated, `ptr` is released before reporting the failure.
///
/// # Safety
///
/// `ptr` must be valid for `deleter`, and owned by nobody else. It may be
/// null if `deleter` accepts that.
pub(crate) unsafe fn with_deleter<T, D, A>(ptr: *mut T, mut deleter: D, alloc: A) -> Ctrl
where
    T: ?Sized,
    D: Deleter<T>,
    A: RawAlloc,
{
    let block = match allocate_block::<PtrBlock<T, D, A>, A>(&alloc) {
        Ok(block) => block,
        Err(layout) => {
            unsafe { deleter.delete(ptr) };
            handle_alloc_error(layout)
        }
    };

    unsafe {
        block.as_ptr().write(PtrBlock {
            header: CtrlHeader::new(PtrBlock::<T, D, A>::dispose, PtrBlock::<T, D, A>::destroy),
            ptr,
            deleter: ManuallyDrop::new(deleter),
            alloc: ManuallyDrop::new(alloc),
        });
    }
    Ctrl(block.cast())
}

/// Creates a control block holding `value` inline.
///
/// Returns the block, with one strong count for the caller, and the address
/// of the value inside it.
pub(crate) fn inplace<T, A: RawAlloc>(value: T, alloc: A) -> (Ctrl, NonNull<T>) {
    let block = match allocate_block::<InplaceBlock<T, A>, A>(&alloc) {
        Ok(block) => block,
        Err(layout) => handle_alloc_error(layout),
    };

    unsafe {
        block.as_ptr().write(InplaceBlock {
            header: CtrlHeader::new(InplaceBlock::<T, A>::dispose, InplaceBlock::<T, A>::destroy),
            alloc: ManuallyDrop::new(alloc),
            value: ManuallyDrop::new(value),
        });
        let value = NonNull::new_unchecked(ptr::addr_of_mut!((*block.as_ptr()).value)).cast::<T>();
        (Ctrl(block.cast()), value)
    }
}
