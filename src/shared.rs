use base::borrow;
use base::cmp::Ordering;
use base::marker::PhantomData;
use base::mem;
use base::ops::Deref;
#[cfg(feature = "array")]
use base::ops::Index;
use base::ptr::{self, NonNull};
#[cfg(feature = "array")]
use base::slice::SliceIndex;

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::ctrl::{self, Ctrl};
use crate::deleter::{DefaultDelete, Deleter, Global, KeepAlive, RawAlloc};
use crate::error::{self, BadWeakPtr, NullPtrError};
use crate::unique::UniquePtr;
use crate::weak::WeakPtr;
use crate::{Null, ReferenceCounted};

/// A thread-safe reference-counted pointer that may be null.
///
/// Ownership is shared through a control block; the pointee is released when
/// the last owner is dropped or reset. The stored pointer may differ from the
/// owned one (see [`alias`](Self::alias) and [`map`](Self::map)); every access
/// goes through the stored pointer.
///
/// `*p` and `p.field` raise [`NullPtrError`] when the stored pointer is null.
/// The checked accessors tag that error with the pointee's type, so they need
/// `T: 'static`.
pub struct SharedPtr<T: ?Sized> {
    ptr: Option<NonNull<T>>,
    ctrl: Option<Ctrl>,
    phantom: PhantomData<T>,
}

unsafe impl<T: ?Sized + Sync + Send> Send for SharedPtr<T> {}
unsafe impl<T: ?Sized + Sync + Send> Sync for SharedPtr<T> {}

impl<T: ?Sized> SharedPtr<T> {
    /// An empty pointer with no control block.
    pub const fn null() -> Self {
        Self {
            ptr: None,
            ctrl: None,
            phantom: PhantomData,
        }
    }

    /// Assembles a pointer from parts.
    ///
    /// # Safety
    ///
    /// `ctrl`, if any, carries a strong count that now belongs to the result,
    /// and `ptr` stays valid while that count is held.
    #[inline]
    pub(crate) unsafe fn from_parts(ptr: Option<NonNull<T>>, ctrl: Option<Ctrl>) -> Self {
        Self {
            ptr,
            ctrl,
            phantom: PhantomData,
        }
    }

    #[inline]
    pub(crate) fn ctrl(&self) -> Option<Ctrl> {
        self.ctrl
    }

    /// A new owner of this control block that stores `ptr`.
    #[inline]
    pub(crate) fn share_as<U: ?Sized>(&self, ptr: Option<NonNull<U>>) -> SharedPtr<U> {
        if let Some(ctrl) = self.ctrl {
            ctrl.inc_strong();
        }
        unsafe { SharedPtr::from_parts(ptr, self.ctrl) }
    }

    /// Whether both store the same pointer and share ownership.
    #[cfg_attr(not(feature = "atomic"), allow(dead_code))]
    pub(crate) fn is_equivalent(&self, other: &Self) -> bool {
        self.addr() == other.addr() && self.ctrl == other.ctrl
    }

    /// The aliasing constructor: shares `owner`'s control block but stores
    /// `ptr`.
    ///
    /// The result keeps `owner`'s pointee alive and reports `ptr` from every
    /// accessor, which is typically a field of that pointee.
    ///
    /// # Safety
    ///
    /// `ptr` must stay valid for as long as the control block keeps the
    /// pointee alive.
    pub unsafe fn alias<U: ?Sized>(owner: &SharedPtr<U>, ptr: *const T) -> Self {
        owner.share_as(NonNull::new(ptr as *mut T))
    }

    /// Safe aliasing: a new owner of the same control block storing the
    /// reference `f` returns.
    ///
    /// A null pointer maps to a null pointer without calling `f`.
    ///
    /// ```
    /// use throwing_ptr::SharedPtr;
    ///
    /// let pair = SharedPtr::new((1, String::from("two")));
    /// let second = pair.map(|p| p.1.as_str());
    /// drop(pair);
    /// assert_eq!(&*second, "two");
    /// ```
    pub fn map<U: ?Sized, F>(&self, f: F) -> SharedPtr<U>
    where
        F: FnOnce(&T) -> &U,
    {
        match self.ptr {
            Some(ptr) => {
                let target = NonNull::from(f(unsafe { ptr.as_ref() }));
                self.share_as(Some(target))
            }
            None => self.share_as(None),
        }
    }

    /// The stored pointer, `None` when null. Never checks.
    #[inline]
    pub fn get(&self) -> Option<NonNull<T>> {
        self.ptr
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.ptr.is_none()
    }

    /// Get the number of owners sharing this control block, 0 when there is
    /// none.
    ///
    /// A relaxed load; other threads may change it at any time.
    #[inline]
    pub fn use_count(&self) -> usize {
        self.ctrl.map_or(0, Ctrl::strong_count)
    }

    /// Whether this is the only owner.
    #[inline]
    pub fn unique(&self) -> bool {
        self.use_count() == 1
    }

    /// Creates an observer of the same control block.
    pub fn downgrade(&self) -> WeakPtr<T> {
        WeakPtr::from(self)
    }

    /// Gives up ownership, leaving the pointer empty.
    pub fn reset(&mut self) {
        *self = Self::null();
    }

    pub fn swap(&mut self, other: &mut Self) {
        mem::swap(self, other);
    }

    /// Ownership-based ordering, independent of the stored pointers.
    pub fn owner_before<O: ReferenceCounted + ?Sized>(&self, other: &O) -> bool {
        self.owner_id() < other.owner_id()
    }

    /// The pointee, or the null access error.
    pub fn try_ref(&self) -> Result<&T, NullPtrError<T>>
    where
        T: 'static,
    {
        match self.ptr {
            Some(ptr) => Ok(unsafe { ptr.as_ref() }),
            None => Err(NullPtrError::new()),
        }
    }

    #[inline]
    pub(crate) fn thin(&self) -> *const () {
        crate::thin(self.ptr)
    }

    #[inline]
    pub(crate) fn addr(&self) -> usize {
        self.thin() as usize
    }
}

impl<T> SharedPtr<T> {
    /// The stored pointer as a raw pointer, null when empty. Never checks.
    #[inline]
    pub fn as_ptr(&self) -> *const T {
        self.ptr.map_or(ptr::null(), |ptr| ptr.as_ptr() as *const T)
    }
}

impl<T: Send + Sync + 'static> SharedPtr<T> {
    /// Allocates `value` and its control block together.
    pub fn new(value: T) -> Self {
        Self::new_in(value, Global)
    }

    /// Like [`new`](Self::new), with the allocation served by `alloc`.
    pub fn new_in<A: RawAlloc + Send + 'static>(value: T, alloc: A) -> Self {
        let (ctrl, ptr) = ctrl::inplace(value, alloc);
        unsafe { Self::from_parts(Some(ptr), Some(ctrl)) }
    }
}

impl<T: ?Sized + Send + Sync + 'static> SharedPtr<T> {
    /// Takes ownership of a pointer from [`Box::into_raw`].
    ///
    /// A null `ptr` still gets a control block: the result is null but owned,
    /// with a `use_count()` of 1.
    ///
    /// # Safety
    ///
    /// A non-null `ptr` must come from `Box::into_raw` and be owned by nobody
    /// else.
    pub unsafe fn from_raw(ptr: *mut T) -> Self {
        unsafe { Self::from_raw_with_deleter(ptr, DefaultDelete) }
    }

    /// Takes ownership of `ptr`, to be released by `deleter` when the last
    /// owner goes away.
    ///
    /// A null `ptr` is owned like any other: `deleter` runs on it once the
    /// last owner goes away.
    ///
    /// ```
    /// use throwing_ptr::{FnDeleter, SharedPtr};
    ///
    /// let check = FnDeleter(|p: *mut u8| assert!(p.is_null()));
    /// let p = unsafe { SharedPtr::from_raw_with_deleter(std::ptr::null_mut::<u8>(), check) };
    /// assert!(p.is_null());
    /// assert_eq!(p.use_count(), 1);
    /// ```
    ///
    /// # Safety
    ///
    /// `ptr` must be releasable by `deleter` and, if non-null, owned by
    /// nobody else.
    pub unsafe fn from_raw_with_deleter<D>(ptr: *mut T, deleter: D) -> Self
    where
        D: Deleter<T> + Send + 'static,
    {
        unsafe { Self::from_raw_with_deleter_in(ptr, deleter, Global) }
    }

    /// Like [`from_raw_with_deleter`](Self::from_raw_with_deleter), with the
    /// control block allocated by `alloc`.
    ///
    /// # Safety
    ///
    /// Same as [`from_raw_with_deleter`](Self::from_raw_with_deleter).
    pub unsafe fn from_raw_with_deleter_in<D, A>(ptr: *mut T, deleter: D, alloc: A) -> Self
    where
        D: Deleter<T> + Send + 'static,
        A: RawAlloc + Send + 'static,
    {
        unsafe {
            let ctrl = ctrl::with_deleter(ptr, deleter, alloc);
            Self::from_parts(NonNull::new(ptr), Some(ctrl))
        }
    }

    /// Replaces the owned object with `ptr`.
    ///
    /// # Safety
    ///
    /// Same as [`from_raw`](Self::from_raw).
    pub unsafe fn reset_with(&mut self, ptr: *mut T) {
        *self = unsafe { Self::from_raw(ptr) };
    }

    /// # Safety
    ///
    /// Same as [`from_raw_with_deleter`](Self::from_raw_with_deleter).
    pub unsafe fn reset_with_deleter<D>(&mut self, ptr: *mut T, deleter: D)
    where
        D: Deleter<T> + Send + 'static,
    {
        *self = unsafe { Self::from_raw_with_deleter(ptr, deleter) };
    }

    /// # Safety
    ///
    /// Same as [`from_raw_with_deleter`](Self::from_raw_with_deleter).
    pub unsafe fn reset_with_deleter_in<D, A>(&mut self, ptr: *mut T, deleter: D, alloc: A)
    where
        D: Deleter<T> + Send + 'static,
        A: RawAlloc + Send + 'static,
    {
        *self = unsafe { Self::from_raw_with_deleter_in(ptr, deleter, alloc) };
    }
}

#[cfg(feature = "array")]
impl<T: 'static> SharedPtr<[T]> {
    /// An element or subslice, or the null access error.
    ///
    /// Only null is checked; out-of-range indices behave as slice indexing.
    pub fn try_index<I: SliceIndex<[T]>>(&self, index: I) -> Result<&I::Output, NullPtrError<T>> {
        match self.ptr {
            Some(ptr) => Ok(&(unsafe { ptr.as_ref() })[index]),
            None => Err(NullPtrError::new()),
        }
    }
}

impl<T: ?Sized> Clone for SharedPtr<T> {
    /// Makes another owner of the same control block.
    #[inline]
    fn clone(&self) -> Self {
        self.share_as(self.ptr)
    }
}

impl<T: ?Sized> Drop for SharedPtr<T> {
    /// Gives up ownership, releasing the pointee if this was the last owner.
    #[inline]
    fn drop(&mut self) {
        if let Some(ctrl) = self.ctrl {
            unsafe { ctrl.dec_strong() };
        }
    }
}

impl<T: ?Sized + 'static> Deref for SharedPtr<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        match self.ptr {
            Some(ptr) => unsafe { ptr.as_ref() },
            None => error::raise::<T>(),
        }
    }
}

#[cfg(feature = "array")]
impl<T: 'static, I: SliceIndex<[T]>> Index<I> for SharedPtr<[T]> {
    type Output = I::Output;

    #[inline]
    fn index(&self, index: I) -> &I::Output {
        match self.ptr {
            Some(ptr) => &(unsafe { ptr.as_ref() })[index],
            None => error::raise::<T>(),
        }
    }
}

impl<T: ?Sized + 'static> borrow::Borrow<T> for SharedPtr<T> {
    fn borrow(&self) -> &T {
        &**self
    }
}

impl<T: ?Sized + 'static> AsRef<T> for SharedPtr<T> {
    fn as_ref(&self) -> &T {
        &**self
    }
}

impl<T: ?Sized> ReferenceCounted for SharedPtr<T> {
    fn use_count(&self) -> usize {
        SharedPtr::use_count(self)
    }

    fn owner_id(&self) -> usize {
        self.ctrl.map_or(0, Ctrl::addr)
    }
}

impl<T: ?Sized> Default for SharedPtr<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T: ?Sized> From<Null> for SharedPtr<T> {
    fn from(_: Null) -> Self {
        Self::null()
    }
}

impl<T: ?Sized + Send + Sync + 'static> From<Box<T>> for SharedPtr<T> {
    fn from(boxed: Box<T>) -> Self {
        unsafe { Self::from_raw(Box::into_raw(boxed)) }
    }
}

impl<T: Send + Sync + 'static> From<Vec<T>> for SharedPtr<[T]> {
    fn from(values: Vec<T>) -> Self {
        Self::from(values.into_boxed_slice())
    }
}

impl<T, D> From<UniquePtr<T, D>> for SharedPtr<T>
where
    T: ?Sized + Send + Sync + 'static,
    D: Deleter<T> + Send + 'static,
{
    /// Adopts the pointer and the deleter; an empty source gives an empty
    /// pointer.
    fn from(unique: UniquePtr<T, D>) -> Self {
        let (ptr, deleter) = unique.into_raw_parts();
        match ptr {
            Some(ptr) => unsafe { Self::from_raw_with_deleter(ptr.as_ptr(), deleter) },
            None => Self::null(),
        }
    }
}

impl<T: ?Sized + Send + Sync + 'static> From<Arc<T>> for SharedPtr<T> {
    /// Shares the `Arc`'s pointee; the `Arc` is dropped when the last owner
    /// goes away.
    fn from(arc: Arc<T>) -> Self {
        let ptr = NonNull::from(&*arc);
        unsafe {
            let ctrl = ctrl::with_deleter(ptr.as_ptr(), KeepAlive(arc), Global);
            Self::from_parts(Some(ptr), Some(ctrl))
        }
    }
}

impl<T: ?Sized> TryFrom<&WeakPtr<T>> for SharedPtr<T> {
    type Error = BadWeakPtr;

    /// Unlike [`WeakPtr::lock`], an expired observer is an error here.
    fn try_from(weak: &WeakPtr<T>) -> Result<Self, BadWeakPtr> {
        match weak.ctrl() {
            Some(ctrl) if ctrl.try_inc_strong() => unsafe {
                Ok(Self::from_parts(weak.get(), Some(ctrl)))
            },
            _ => Err(BadWeakPtr),
        }
    }
}

impl<T: ?Sized, U: ?Sized> PartialEq<SharedPtr<U>> for SharedPtr<T> {
    /// Two `SharedPtr`s are equal if they store the same address, whoever owns
    /// it.
    #[inline]
    fn eq(&self, other: &SharedPtr<U>) -> bool {
        self.addr() == other.addr()
    }
}

impl<T: ?Sized> Eq for SharedPtr<T> {}

impl<T: ?Sized, U: ?Sized> PartialOrd<SharedPtr<U>> for SharedPtr<T> {
    /// Orders by stored address, with null first.
    fn partial_cmp(&self, other: &SharedPtr<U>) -> Option<Ordering> {
        Some(self.addr().cmp(&other.addr()))
    }
}

impl<T: ?Sized> Ord for SharedPtr<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.addr().cmp(&other.addr())
    }
}

impl_address_ops!([T: ?Sized] SharedPtr<T>);
