//! Objects that can hand out owners of themselves.

use base::cell::UnsafeCell;
use base::fmt;

use crate::error::BadWeakPtr;
use crate::shared::SharedPtr;
use crate::weak::WeakPtr;

/// The self reference an object embeds to support [`SharedFromThis`].
///
/// It is wired when the object is put under shared ownership with
/// [`SharedPtr::new_enabled`] or [`SharedPtr::from_raw_enabled`]. Cloning
/// gives an unwired one, since the clone is a different object.
pub struct EnableSharedFromThis<T> {
    weak_this: UnsafeCell<WeakPtr<T>>,
}

// The cell is only written while wiring, before other threads can see the
// object, or while no owner exists.
unsafe impl<T: Send + Sync> Send for EnableSharedFromThis<T> {}
unsafe impl<T: Send + Sync> Sync for EnableSharedFromThis<T> {}

impl<T> EnableSharedFromThis<T> {
    pub const fn new() -> Self {
        Self {
            weak_this: UnsafeCell::new(WeakPtr::new()),
        }
    }

    fn weak(&self) -> WeakPtr<T> {
        unsafe { (*self.weak_this.get()).clone() }
    }

    /// Points the self reference at `owner`, unless it already observes a
    /// live one.
    ///
    /// # Safety
    ///
    /// No other thread accesses this self reference during the call.
    unsafe fn adopt(&self, owner: &SharedPtr<T>) {
        let slot = unsafe { &mut *self.weak_this.get() };
        if slot.expired() {
            log::trace!("wiring self reference to {:p}", *owner);
            *slot = owner.downgrade();
        }
    }
}

impl<T> Default for EnableSharedFromThis<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for EnableSharedFromThis<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for EnableSharedFromThis<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EnableSharedFromThis")
    }
}

/// Gives an object access to the shared ownership it is under.
///
/// ```
/// use throwing_ptr::{EnableSharedFromThis, SharedFromThis, SharedPtr};
///
/// struct Node {
///     this: EnableSharedFromThis<Node>,
///     value: i32,
/// }
///
/// impl SharedFromThis for Node {
///     fn enable_shared_from_this(&self) -> &EnableSharedFromThis<Self> {
///         &self.this
///     }
/// }
///
/// let node = SharedPtr::new_enabled(Node { this: EnableSharedFromThis::new(), value: 4 });
/// let again = node.shared_from_this().unwrap();
/// assert_eq!(again.value, 4);
/// assert_eq!(node.use_count(), 2);
/// ```
pub trait SharedFromThis: Send + Sync + Sized + 'static {
    fn enable_shared_from_this(&self) -> &EnableSharedFromThis<Self>;

    /// A new owner of `self`, or [`BadWeakPtr`] if nobody owns it.
    fn shared_from_this(&self) -> Result<SharedPtr<Self>, BadWeakPtr> {
        SharedPtr::try_from(&self.enable_shared_from_this().weak())
    }

    /// An observer of `self`; expired if nobody owns it.
    fn weak_from_this(&self) -> WeakPtr<Self> {
        self.enable_shared_from_this().weak()
    }
}

impl<T: SharedFromThis> SharedPtr<T> {
    /// Like [`new`](Self::new), then wires `value`'s self reference.
    pub fn new_enabled(value: T) -> Self {
        let shared = Self::new(value);
        shared.enable_this();
        shared
    }

    /// Like [`from_raw`](Self::from_raw), then wires the pointee's self
    /// reference unless it already has a live owner.
    ///
    /// # Safety
    ///
    /// Same as [`from_raw`](Self::from_raw).
    pub unsafe fn from_raw_enabled(ptr: *mut T) -> Self {
        let shared = unsafe { Self::from_raw(ptr) };
        shared.enable_this();
        shared
    }

    fn enable_this(&self) {
        if let Some(ptr) = self.get() {
            let this = unsafe { ptr.as_ref() }.enable_shared_from_this();
            unsafe { this.adopt(self) };
        }
    }
}
