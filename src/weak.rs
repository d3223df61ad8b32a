use base::fmt;
use base::marker::PhantomData;
use base::mem;
use base::ptr::NonNull;

use crate::ctrl::Ctrl;
use crate::shared::SharedPtr;
use crate::ReferenceCounted;

/// A non-owning observer of a [`SharedPtr`]'s control block.
///
/// It keeps the block alive but not the pointee; [`lock`](Self::lock) turns it
/// back into an owner while the pointee exists.
pub struct WeakPtr<T: ?Sized> {
    ptr: Option<NonNull<T>>,
    ctrl: Option<Ctrl>,
    phantom: PhantomData<T>,
}

unsafe impl<T: ?Sized + Sync + Send> Send for WeakPtr<T> {}
unsafe impl<T: ?Sized + Sync + Send> Sync for WeakPtr<T> {}

impl<T: ?Sized> WeakPtr<T> {
    /// An observer of nothing; always expired.
    pub const fn new() -> Self {
        Self {
            ptr: None,
            ctrl: None,
            phantom: PhantomData,
        }
    }

    #[inline]
    pub(crate) fn ctrl(&self) -> Option<Ctrl> {
        self.ctrl
    }

    /// The observed pointer. Only meaningful while not expired.
    #[inline]
    pub(crate) fn get(&self) -> Option<NonNull<T>> {
        self.ptr
    }

    /// Get the number of owners of the observed control block.
    #[inline]
    pub fn use_count(&self) -> usize {
        self.ctrl.map_or(0, Ctrl::strong_count)
    }

    /// Whether the pointee is gone, or was never there.
    #[inline]
    pub fn expired(&self) -> bool {
        self.use_count() == 0
    }

    /// A new owner of the pointee, or an empty pointer if it is gone.
    ///
    /// ```
    /// use throwing_ptr::SharedPtr;
    ///
    /// let owner = SharedPtr::new(5);
    /// let weak = owner.downgrade();
    /// assert_eq!(*weak.lock(), 5);
    ///
    /// drop(owner);
    /// assert!(weak.lock().is_null());
    /// ```
    pub fn lock(&self) -> SharedPtr<T> {
        match self.ctrl {
            Some(ctrl) if ctrl.try_inc_strong() => unsafe {
                SharedPtr::from_parts(self.ptr, Some(ctrl))
            },
            Some(ctrl) => {
                log::trace!("lock on expired control block {:p}", ctrl.addr() as *const ());
                SharedPtr::null()
            }
            None => SharedPtr::null(),
        }
    }

    /// Stops observing.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn swap(&mut self, other: &mut Self) {
        mem::swap(self, other);
    }

    /// Ownership-based ordering, the same as [`SharedPtr::owner_before`].
    pub fn owner_before<O: ReferenceCounted + ?Sized>(&self, other: &O) -> bool {
        self.owner_id() < other.owner_id()
    }

    /// Observes the same control block through a pointer of a compatible type,
    /// typically an unsizing cast.
    ///
    /// # Safety
    ///
    /// `f` must return a pointer into the object the control block keeps
    /// alive. It is called even when the observer has expired, so it must
    /// only convert its argument, never read through it.
    pub unsafe fn map_raw<U: ?Sized, F>(self, f: F) -> WeakPtr<U>
    where
        F: FnOnce(NonNull<T>) -> NonNull<U>,
    {
        let this = mem::ManuallyDrop::new(self);
        WeakPtr {
            ptr: this.ptr.map(f),
            ctrl: this.ctrl,
            phantom: PhantomData,
        }
    }
}

impl<T: ?Sized> Clone for WeakPtr<T> {
    #[inline]
    fn clone(&self) -> Self {
        if let Some(ctrl) = self.ctrl {
            ctrl.inc_weak();
        }
        Self {
            ptr: self.ptr,
            ctrl: self.ctrl,
            phantom: PhantomData,
        }
    }
}

impl<T: ?Sized> Drop for WeakPtr<T> {
    #[inline]
    fn drop(&mut self) {
        if let Some(ctrl) = self.ctrl {
            unsafe { ctrl.dec_weak() };
        }
    }
}

impl<T: ?Sized> Default for WeakPtr<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> From<&SharedPtr<T>> for WeakPtr<T> {
    fn from(shared: &SharedPtr<T>) -> Self {
        let ctrl = shared.ctrl();
        if let Some(ctrl) = ctrl {
            ctrl.inc_weak();
        }
        Self {
            ptr: shared.get(),
            ctrl,
            phantom: PhantomData,
        }
    }
}

impl<T: ?Sized> ReferenceCounted for WeakPtr<T> {
    fn use_count(&self) -> usize {
        WeakPtr::use_count(self)
    }

    fn owner_id(&self) -> usize {
        self.ctrl.map_or(0, Ctrl::addr)
    }
}

impl<T: ?Sized> fmt::Debug for WeakPtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(Weak)")
    }
}
