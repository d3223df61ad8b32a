use base::borrow;
use base::cmp::Ordering;
use base::marker::PhantomData;
use base::mem::{self, ManuallyDrop};
use base::ops::{Deref, DerefMut, Index, IndexMut};
use base::ptr::{self, NonNull};
use base::slice::SliceIndex;

use alloc::boxed::Box;

use crate::deleter::{DefaultDelete, Deleter};
use crate::error::{self, NullPtrError};
use crate::Null;

/// Sole ownership of one object, or one slice, released through a [`Deleter`].
///
/// `*p`, `p.field` and `p[i]` check for null and raise [`NullPtrError`]
/// instead of dereferencing it. Everything else behaves like an owning raw
/// pointer with a cleanup function attached.
///
/// The checked accessors tag their error with the pointee's type, so they need
/// `T: 'static`. A pointer to a borrowing type can still be built, moved and
/// released, and reached through [`get`](Self::get).
///
/// Ownership is never copied:
///
/// ```compile_fail
/// fn copyable<P: Clone>() {}
/// copyable::<throwing_ptr::UniquePtr<i32>>();
/// ```
pub struct UniquePtr<T: ?Sized, D: Deleter<T> = DefaultDelete> {
    ptr: Option<NonNull<T>>,
    deleter: D,
    phantom: PhantomData<T>,
}

unsafe impl<T: ?Sized + Send, D: Deleter<T> + Send> Send for UniquePtr<T, D> {}
unsafe impl<T: ?Sized + Sync, D: Deleter<T> + Sync> Sync for UniquePtr<T, D> {}

impl<T> UniquePtr<T> {
    /// Moves `value` to the heap.
    pub fn new(value: T) -> Self {
        Self::from(Box::new(value))
    }
}

impl<T: ?Sized> UniquePtr<T> {
    /// Gives the object back as a `Box`, or `None` if empty.
    pub fn into_box(self) -> Option<Box<T>> {
        let (ptr, _) = self.into_raw_parts();
        ptr.map(|ptr| unsafe { Box::from_raw(ptr.as_ptr()) })
    }
}

impl<T: ?Sized, D: Deleter<T> + Default> UniquePtr<T, D> {
    /// An empty pointer.
    pub fn null() -> Self {
        Self::null_with_deleter(D::default())
    }

    /// Takes ownership of `ptr`; null gives an empty pointer.
    ///
    /// # Safety
    ///
    /// A non-null `ptr` must be releasable by `D::default()` and owned by
    /// nobody else.
    pub unsafe fn from_raw(ptr: *mut T) -> Self {
        unsafe { Self::from_raw_with_deleter(ptr, D::default()) }
    }
}

impl<T: ?Sized, D: Deleter<T>> UniquePtr<T, D> {
    pub fn null_with_deleter(deleter: D) -> Self {
        Self {
            ptr: None,
            deleter,
            phantom: PhantomData,
        }
    }

    /// Takes ownership of `ptr`, to be released by `deleter`.
    ///
    /// The deleter can be borrowed (`&mut D`), in which case it has to outlive
    /// the pointer.
    ///
    /// # Safety
    ///
    /// A non-null `ptr` must be releasable by `deleter` and owned by nobody
    /// else.
    pub unsafe fn from_raw_with_deleter(ptr: *mut T, deleter: D) -> Self {
        Self {
            ptr: NonNull::new(ptr),
            deleter,
            phantom: PhantomData,
        }
    }

    /// The stored pointer, `None` when empty. Never checks.
    #[inline]
    pub fn get(&self) -> Option<NonNull<T>> {
        self.ptr
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.ptr.is_none()
    }

    pub fn get_deleter(&self) -> &D {
        &self.deleter
    }

    pub fn get_deleter_mut(&mut self) -> &mut D {
        &mut self.deleter
    }

    /// Gives up ownership without running the deleter.
    ///
    /// The pointer is left empty and the caller becomes responsible for the
    /// returned object.
    pub fn release(&mut self) -> Option<NonNull<T>> {
        self.ptr.take()
    }

    /// Releases the owned object, if any, leaving the pointer empty.
    pub fn reset(&mut self) {
        self.replace(None);
    }

    /// Takes ownership of `ptr`, then releases the previously owned object.
    ///
    /// # Safety
    ///
    /// Same as [`from_raw_with_deleter`](Self::from_raw_with_deleter) with this
    /// pointer's deleter.
    pub unsafe fn reset_with(&mut self, ptr: *mut T) {
        self.replace(NonNull::new(ptr));
    }

    fn replace(&mut self, ptr: Option<NonNull<T>>) {
        // The new pointer is in place before the old object is released.
        if let Some(old) = mem::replace(&mut self.ptr, ptr) {
            log::trace!("releasing uniquely owned {:p}", old);
            unsafe { self.deleter.delete(old.as_ptr()) };
        }
    }

    /// Exchanges pointers and deleters.
    pub fn swap(&mut self, other: &mut Self) {
        mem::swap(self, other);
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

    /// The pointee, mutably, or the null access error.
    pub fn try_mut(&mut self) -> Result<&mut T, NullPtrError<T>>
    where
        T: 'static,
    {
        match self.ptr {
            Some(mut ptr) => Ok(unsafe { ptr.as_mut() }),
            None => Err(NullPtrError::new()),
        }
    }

    /// Moves ownership into a pointer of a compatible type, keeping the
    /// deleter.
    ///
    /// This is how a `UniquePtr<Circle>` becomes a `UniquePtr<dyn Shape>`:
    ///
    /// ```
    /// use std::ptr::NonNull;
    /// use throwing_ptr::UniquePtr;
    ///
    /// let p = UniquePtr::new(4_u8);
    /// let d = unsafe { p.map_raw(|p| -> NonNull<dyn std::fmt::Display> { p }) };
    /// assert_eq!(d.to_string(), "4");
    /// ```
    ///
    /// # Safety
    ///
    /// `f` must return a pointer to the same object that the deleter can
    /// release.
    pub unsafe fn map_raw<U, F>(self, f: F) -> UniquePtr<U, D>
    where
        U: ?Sized,
        D: Deleter<U>,
        F: FnOnce(NonNull<T>) -> NonNull<U>,
    {
        let (ptr, deleter) = self.into_raw_parts();
        UniquePtr {
            ptr: ptr.map(f),
            deleter,
            phantom: PhantomData,
        }
    }

    /// Splits into pointer and deleter without running the deleter.
    pub(crate) fn into_raw_parts(self) -> (Option<NonNull<T>>, D) {
        let this = ManuallyDrop::new(self);
        let deleter = unsafe { ptr::read(&this.deleter) };
        (this.ptr, deleter)
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

impl<T, D: Deleter<T>> UniquePtr<T, D> {
    /// The stored pointer as a raw pointer, null when empty. Never checks.
    #[inline]
    pub fn as_ptr(&self) -> *const T {
        self.ptr.map_or(ptr::null(), |ptr| ptr.as_ptr() as *const T)
    }

    #[inline]
    pub fn as_mut_ptr(&mut self) -> *mut T {
        self.ptr.map_or(ptr::null_mut(), NonNull::as_ptr)
    }
}

impl<T: 'static, D: Deleter<[T]>> UniquePtr<[T], D> {
    /// An element or subslice, or the null access error.
    ///
    /// Only null is checked; out-of-range indices behave as slice indexing.
    pub fn try_index<I: SliceIndex<[T]>>(&self, index: I) -> Result<&I::Output, NullPtrError<T>> {
        match self.ptr {
            Some(ptr) => Ok(&(unsafe { ptr.as_ref() })[index]),
            None => Err(NullPtrError::new()),
        }
    }

    pub fn try_index_mut<I: SliceIndex<[T]>>(
        &mut self,
        index: I,
    ) -> Result<&mut I::Output, NullPtrError<T>> {
        match self.ptr {
            Some(mut ptr) => Ok(&mut (unsafe { ptr.as_mut() })[index]),
            None => Err(NullPtrError::new()),
        }
    }
}

impl<T: ?Sized, D: Deleter<T>> Drop for UniquePtr<T, D> {
    #[inline]
    fn drop(&mut self) {
        if let Some(ptr) = self.ptr {
            unsafe { self.deleter.delete(ptr.as_ptr()) };
        }
    }
}

impl<T: ?Sized + 'static, D: Deleter<T>> Deref for UniquePtr<T, D> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        match self.ptr {
            Some(ptr) => unsafe { ptr.as_ref() },
            None => error::raise::<T>(),
        }
    }
}

impl<T: ?Sized + 'static, D: Deleter<T>> DerefMut for UniquePtr<T, D> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        match self.ptr {
            Some(mut ptr) => unsafe { ptr.as_mut() },
            None => error::raise::<T>(),
        }
    }
}

impl<T: 'static, D: Deleter<[T]>, I: SliceIndex<[T]>> Index<I> for UniquePtr<[T], D> {
    type Output = I::Output;

    #[inline]
    fn index(&self, index: I) -> &I::Output {
        match self.ptr {
            Some(ptr) => &(unsafe { ptr.as_ref() })[index],
            None => error::raise::<T>(),
        }
    }
}

impl<T: 'static, D: Deleter<[T]>, I: SliceIndex<[T]>> IndexMut<I> for UniquePtr<[T], D> {
    #[inline]
    fn index_mut(&mut self, index: I) -> &mut I::Output {
        match self.ptr {
            Some(mut ptr) => &mut (unsafe { ptr.as_mut() })[index],
            None => error::raise::<T>(),
        }
    }
}

impl<T: ?Sized + 'static, D: Deleter<T>> borrow::Borrow<T> for UniquePtr<T, D> {
    fn borrow(&self) -> &T {
        &**self
    }
}

impl<T: ?Sized + 'static, D: Deleter<T>> AsRef<T> for UniquePtr<T, D> {
    fn as_ref(&self) -> &T {
        &**self
    }
}

impl<T: ?Sized + 'static, D: Deleter<T>> AsMut<T> for UniquePtr<T, D> {
    fn as_mut(&mut self) -> &mut T {
        &mut **self
    }
}

impl<T: ?Sized, D: Deleter<T> + Default> Default for UniquePtr<T, D> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T: ?Sized, D: Deleter<T> + Default> From<Null> for UniquePtr<T, D> {
    fn from(_: Null) -> Self {
        Self::null()
    }
}

impl<T: ?Sized> From<Box<T>> for UniquePtr<T> {
    fn from(boxed: Box<T>) -> Self {
        unsafe { Self::from_raw(Box::into_raw(boxed)) }
    }
}

impl<T: ?Sized, D, U: ?Sized, E> PartialEq<UniquePtr<U, E>> for UniquePtr<T, D>
where
    D: Deleter<T>,
    E: Deleter<U>,
{
    /// Two `UniquePtr`s are equal if they store the same address.
    #[inline]
    fn eq(&self, other: &UniquePtr<U, E>) -> bool {
        self.addr() == other.addr()
    }
}

impl<T: ?Sized, D: Deleter<T>> Eq for UniquePtr<T, D> {}

impl<T: ?Sized, D, U: ?Sized, E> PartialOrd<UniquePtr<U, E>> for UniquePtr<T, D>
where
    D: Deleter<T>,
    E: Deleter<U>,
{
    /// Orders by stored address, with null first.
    fn partial_cmp(&self, other: &UniquePtr<U, E>) -> Option<Ordering> {
        Some(self.addr().cmp(&other.addr()))
    }
}

impl<T: ?Sized, D: Deleter<T>> Ord for UniquePtr<T, D> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.addr().cmp(&other.addr())
    }
}

impl_address_ops!([T: ?Sized, D: Deleter<T>] UniquePtr<T, D>);
