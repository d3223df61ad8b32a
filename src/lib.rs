//! Unique, shared and weak pointers that turn a null dereference into a typed
//! error instead of undefined behaviour.
//!
//! [`UniquePtr`], [`SharedPtr`] and [`WeakPtr`] mirror the ownership rules of
//! the classic unique/shared/weak pointer trio: pluggable deleters, aliasing,
//! allocator-aware construction, owner-based ordering and atomic slots. The
//! only behavioural addition is at the access operations (`*p`, `p.field`,
//! `p[i]`): when the stored pointer is null they raise [`NullPtrError<T>`]
//! instead of touching memory. Construction, assignment, comparison, hashing
//! and raw-pointer retrieval never check.
//!
//! Access comes in two forms:
//!
//! * `try_ref`, `try_mut` and `try_index` return `Result<_, NullPtrError<T>>`.
//! * The operators (`Deref`, `DerefMut`, `Index`) unwind with the error. With
//!   the `std` feature, [`catch_null_deref`] and [`catch_null_deref_of`] turn
//!   that unwind back into a `Result`.
//!
//! ```
//! use throwing_ptr::{BaseNullPtrError, SharedPtr};
//!
//! fn first(p: &SharedPtr<Vec<u8>>) -> Result<u8, BaseNullPtrError> {
//!     Ok(p.try_ref()?[0])
//! }
//!
//! assert_eq!(first(&SharedPtr::new(vec![7])), Ok(7));
//! assert!(first(&SharedPtr::null()).unwrap_err().is::<Vec<u8>>());
//! ```
//!
//! # Features
//!
//! * `std`: the catch helpers, which recover the typed error from an unwind.
//! * `array`: element access on `SharedPtr<[T]>`.
//! * `atomic`: [`AtomicSharedPtr`] and the `atomic_*` functions.
#![no_std]
extern crate maybe_std as base;

extern crate alloc;
#[cfg(feature = "std")]
extern crate std;

use base::cmp::Ordering;
use base::ptr::NonNull;

use alloc::boxed::Box;
use alloc::sync::Arc;

/// Comparisons with [`Null`] and with the native pointer types, hashing and
/// pointer formatting, all in terms of the stored pointer. Expects inherent
/// `get()`, `addr()` and `thin()` methods.
macro_rules! impl_address_ops {
    ([$($generics:tt)*] $ty:ty) => {
        impl<$($generics)*> PartialEq<$crate::Null> for $ty {
            #[inline]
            fn eq(&self, _: &$crate::Null) -> bool {
                self.addr() == 0
            }
        }

        impl<$($generics)*> PartialEq<$ty> for $crate::Null {
            #[inline]
            fn eq(&self, other: &$ty) -> bool {
                other.addr() == 0
            }
        }

        impl<$($generics)*> PartialOrd<$crate::Null> for $ty {
            #[inline]
            fn partial_cmp(&self, _: &$crate::Null) -> Option<::core::cmp::Ordering> {
                Some(self.addr().cmp(&0))
            }
        }

        impl<$($generics)*> PartialOrd<$ty> for $crate::Null {
            #[inline]
            fn partial_cmp(&self, other: &$ty) -> Option<::core::cmp::Ordering> {
                Some(0.cmp(&other.addr()))
            }
        }

        impl_address_ops!(@native [$($generics)*] $ty, ::alloc::boxed::Box<U>);
        impl_address_ops!(@native [$($generics)*] $ty, ::alloc::sync::Arc<U>);
        impl_address_ops!(@native [$($generics)*] $ty, *const U);
        impl_address_ops!(@native [$($generics)*] $ty, *mut U);
        // `Box` is fundamental, so coherence rules out `Box<U> == $ty`.
        impl_address_ops!(@native_lhs [$($generics)*] $ty, ::alloc::sync::Arc<U>);
        impl_address_ops!(@native_lhs [$($generics)*] $ty, *const U);
        impl_address_ops!(@native_lhs [$($generics)*] $ty, *mut U);

        impl<$($generics)*> ::core::hash::Hash for $ty {
            /// Hashes exactly like the raw stored pointer, metadata included.
            fn hash<H: ::core::hash::Hasher>(&self, state: &mut H) {
                match self.get() {
                    Some(ptr) => ::core::ptr::hash(ptr.as_ptr().cast_const(), state),
                    None => ::core::ptr::hash(::core::ptr::null::<()>(), state),
                }
            }
        }

        impl<$($generics)*> ::core::fmt::Pointer for $ty {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                ::core::fmt::Pointer::fmt(&self.thin(), f)
            }
        }

        impl<$($generics)*> ::core::fmt::Debug for $ty {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                ::core::fmt::Pointer::fmt(&self.thin(), f)
            }
        }
    };
    (@native [$($generics:tt)*] $ty:ty, $native:ty) => {
        impl<$($generics)*, U: ?Sized> PartialEq<$native> for $ty {
            #[inline]
            fn eq(&self, other: &$native) -> bool {
                self.addr() == $crate::RawAddress::raw_addr(other)
            }
        }

        impl<$($generics)*, U: ?Sized> PartialOrd<$native> for $ty {
            #[inline]
            fn partial_cmp(&self, other: &$native) -> Option<::core::cmp::Ordering> {
                Some(self.addr().cmp(&$crate::RawAddress::raw_addr(other)))
            }
        }
    };
    (@native_lhs [$($generics:tt)*] $ty:ty, $native:ty) => {
        impl<$($generics)*, U: ?Sized> PartialEq<$ty> for $native {
            #[inline]
            fn eq(&self, other: &$ty) -> bool {
                $crate::RawAddress::raw_addr(self) == other.addr()
            }
        }

        impl<$($generics)*, U: ?Sized> PartialOrd<$ty> for $native {
            #[inline]
            fn partial_cmp(&self, other: &$ty) -> Option<::core::cmp::Ordering> {
                Some($crate::RawAddress::raw_addr(self).cmp(&other.addr()))
            }
        }
    };
}

#[cfg(feature = "atomic")]
mod atomic;
mod cast;
mod ctrl;
mod deleter;
mod error;
mod from_this;
mod shared;
mod unique;
mod weak;

#[cfg(feature = "atomic")]
pub use atomic::*;
pub use cast::*;
pub use deleter::{DefaultDelete, Deleter, FnDeleter, Global, RawAlloc};
pub use error::*;
pub use from_this::*;
pub use shared::SharedPtr;
pub use unique::UniquePtr;
pub use weak::WeakPtr;

/// The null pointer literal.
///
/// Converts into an empty pointer of any kind and compares against all of
/// them, from either side.
///
/// ```
/// use throwing_ptr::{Null, UniquePtr};
///
/// let mut p = UniquePtr::new(5);
/// assert!(p != Null && Null != p);
/// p = Null.into();
/// assert!(p == Null && Null == p);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Null;

/// A pointer that shares a control block with other pointers.
pub trait ReferenceCounted {
    /// Get the number of owning pointers referring to the same control block.
    ///
    /// Zero for an empty pointer. Racy under concurrent mutation.
    fn use_count(&self) -> usize;

    /// The identity of the control block, `0` when there is none.
    ///
    /// Pointers compare equal here exactly when they share ownership, whatever
    /// address they store.
    fn owner_id(&self) -> usize;
}

/// Orders pointers by the control block they share rather than by the
/// address they store, so they can key ordered containers.
///
/// ```
/// use std::collections::BTreeSet;
/// use throwing_ptr::{OwnerKey, SharedPtr};
///
/// let pair = SharedPtr::new((1, 2));
/// let first = pair.map(|p| &p.0);
///
/// let mut owners = BTreeSet::new();
/// owners.insert(OwnerKey(pair.clone()));
/// assert!(!owners.insert(OwnerKey(pair.clone())));
///
/// // Different stored addresses, same owner.
/// assert!(!pair.owner_before(&first) && !first.owner_before(&pair));
/// ```
#[derive(Debug, Clone, Default)]
pub struct OwnerKey<P>(pub P);

impl<P: ReferenceCounted> PartialEq for OwnerKey<P> {
    fn eq(&self, other: &Self) -> bool {
        self.0.owner_id() == other.0.owner_id()
    }
}

impl<P: ReferenceCounted> Eq for OwnerKey<P> {}

impl<P: ReferenceCounted> PartialOrd for OwnerKey<P> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<P: ReferenceCounted> Ord for OwnerKey<P> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.owner_id().cmp(&other.0.owner_id())
    }
}

/// Allocates `value` together with its control block.
pub fn make_shared<T: Send + Sync + 'static>(value: T) -> SharedPtr<T> {
    SharedPtr::new(value)
}

/// Like [`make_shared`], with the single allocation served by `alloc`.
pub fn allocate_shared<T, A>(alloc: A, value: T) -> SharedPtr<T>
where
    T: Send + Sync + 'static,
    A: RawAlloc + Send + 'static,
{
    SharedPtr::new_in(value, alloc)
}

pub fn make_unique<T>(value: T) -> UniquePtr<T> {
    UniquePtr::new(value)
}

/// A uniquely owned slice of `len` default values.
pub fn make_unique_slice<T: Default>(len: usize) -> UniquePtr<[T]> {
    let slice: Box<[T]> = (0..len).map(|_| T::default()).collect();
    UniquePtr::from(slice)
}

/// The address a native pointer type stores, without metadata.
pub(crate) trait RawAddress {
    fn raw_addr(&self) -> usize;
}

impl<U: ?Sized> RawAddress for Box<U> {
    fn raw_addr(&self) -> usize {
        (&**self as *const U).cast::<()>() as usize
    }
}

impl<U: ?Sized> RawAddress for Arc<U> {
    fn raw_addr(&self) -> usize {
        Arc::as_ptr(self).cast::<()>() as usize
    }
}

impl<U: ?Sized> RawAddress for *const U {
    fn raw_addr(&self) -> usize {
        self.cast::<()>() as usize
    }
}

impl<U: ?Sized> RawAddress for *mut U {
    fn raw_addr(&self) -> usize {
        self.cast::<()>() as usize
    }
}

/// Thin address of an optional pointer, null when absent.
#[inline]
pub(crate) fn thin<T: ?Sized>(ptr: Option<NonNull<T>>) -> *const () {
    match ptr {
        Some(ptr) => ptr.cast::<()>().as_ptr() as *const (),
        None => base::ptr::null(),
    }
}
