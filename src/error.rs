//! Errors reported by the pointer types.
//!
//! Every null access produces a [`NullPtrError<T>`], tagged with the pointee
//! type `T`. It converts into [`BaseNullPtrError`], which is what catch-all
//! handlers work with; converting back only succeeds for the same `T`.

#[cfg(feature = "std")]
use base::any::Any;
use base::any::{type_name, TypeId};
#[cfg(feature = "std")]
use base::cell::Cell;
use base::fmt;
use base::marker::PhantomData;
use base::ops::Deref;

use alloc::format;
use alloc::string::String;

use thiserror::Error;

/// The message carried by every null access error.
pub const NULL_DEREF_MESSAGE: &str = "Dereference of nullptr";

/// A null pointer was dereferenced.
///
/// Handlers written against this type see every null access, whatever the
/// pointee type was.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
#[error("Dereference of nullptr")]
pub struct BaseNullPtrError {
    type_name: &'static str,
    type_id: Option<TypeId>,
}

impl BaseNullPtrError {
    /// An untyped null access error.
    pub const fn new() -> Self {
        Self {
            type_name: "",
            type_id: None,
        }
    }

    /// The fixed description, `"Dereference of nullptr"`.
    pub const fn what(&self) -> &'static str {
        NULL_DEREF_MESSAGE
    }

    /// A diagnostic naming the pointee type.
    ///
    /// Empty for the untyped kind. The type name is whatever
    /// [`type_name`] reports and is not stable across compilers.
    pub fn what_type(&self) -> String {
        match self.type_id {
            Some(_) => format!("Dereferenced nullptr of type {}", self.type_name),
            None => String::new(),
        }
    }

    /// The pointee type name, if this error came from a typed one.
    pub fn type_name(&self) -> Option<&'static str> {
        self.type_id.map(|_| self.type_name)
    }

    /// Whether this error was raised for pointee type `T`.
    pub fn is<T: ?Sized + 'static>(&self) -> bool {
        self.type_id == Some(TypeId::of::<T>())
    }
}

impl Default for BaseNullPtrError {
    fn default() -> Self {
        Self::new()
    }
}

/// A null pointer to a `T` was dereferenced.
///
/// Dereferences to [`BaseNullPtrError`] and converts into it with `?`.
#[derive(Error)]
#[error("Dereference of nullptr")]
pub struct NullPtrError<T: ?Sized + 'static> {
    base: BaseNullPtrError,
    marker: PhantomData<fn() -> *const T>,
}

impl<T: ?Sized + 'static> NullPtrError<T> {
    pub fn new() -> Self {
        Self {
            base: BaseNullPtrError {
                type_name: type_name::<T>(),
                type_id: Some(TypeId::of::<T>()),
            },
            marker: PhantomData,
        }
    }

    /// The fixed description, `"Dereference of nullptr"`.
    pub const fn what(&self) -> &'static str {
        NULL_DEREF_MESSAGE
    }

    /// `"Dereferenced nullptr of type "` followed by the name of `T`.
    pub fn what_type(&self) -> String {
        self.base.what_type()
    }

    /// Widens this error to the catch-all kind, keeping the type tag.
    pub fn into_base(self) -> BaseNullPtrError {
        self.base
    }
}

impl<T: ?Sized + 'static> Default for NullPtrError<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized + 'static> Clone for NullPtrError<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: ?Sized + 'static> Copy for NullPtrError<T> {}

impl<T: ?Sized + 'static> PartialEq for NullPtrError<T> {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

impl<T: ?Sized + 'static> Eq for NullPtrError<T> {}

impl<T: ?Sized + 'static> fmt::Debug for NullPtrError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NullPtrError")
            .field("type_name", &self.base.type_name)
            .finish()
    }
}

impl<T: ?Sized + 'static> Deref for NullPtrError<T> {
    type Target = BaseNullPtrError;

    fn deref(&self) -> &BaseNullPtrError {
        &self.base
    }
}

impl<T: ?Sized + 'static> From<NullPtrError<T>> for BaseNullPtrError {
    fn from(error: NullPtrError<T>) -> Self {
        error.base
    }
}

impl<T: ?Sized + 'static> TryFrom<BaseNullPtrError> for NullPtrError<T> {
    type Error = BaseNullPtrError;

    /// Narrows a catch-all error back to `T`, handing it back unchanged if it
    /// was raised for another pointee type.
    fn try_from(error: BaseNullPtrError) -> Result<Self, BaseNullPtrError> {
        if error.is::<T>() {
            Ok(Self {
                base: error,
                marker: PhantomData,
            })
        } else {
            Err(error)
        }
    }
}

/// An observer was turned into an owner after its pointee was destroyed, or
/// `shared_from_this` was called on an object nobody owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Error)]
#[error("bad_weak_ptr")]
pub struct BadWeakPtr;

#[cfg(feature = "std")]
std::thread_local! {
    /// The error behind the null access currently unwinding on this thread.
    static RAISED: Cell<Option<BaseNullPtrError>> = const { Cell::new(None) };
}

/// Unwinds out of an operator-form access on a null pointer to `T`.
///
/// The payload is [`NULL_DEREF_MESSAGE`] itself, so an uncaught access reports
/// it like any other panic. The typed error waits in a thread-local slot for
/// [`catch_null_deref`] and [`catch_null_deref_of`].
#[cfg(feature = "std")]
#[cold]
#[track_caller]
pub(crate) fn raise<T: ?Sized + 'static>() -> ! {
    let error = NullPtrError::<T>::new().into_base();
    RAISED.with(|raised| raised.set(Some(error)));
    std::panic::panic_any(NULL_DEREF_MESSAGE)
}

/// The error behind `payload`, if it unwound out of [`raise`].
#[cfg(feature = "std")]
fn raised(payload: &(dyn Any + Send)) -> Option<BaseNullPtrError> {
    match payload.downcast_ref::<&'static str>() {
        Some(&message) if message == NULL_DEREF_MESSAGE => RAISED.with(|raised| raised.get()),
        _ => None,
    }
}

#[cfg(feature = "std")]
fn clear_raised() {
    RAISED.with(|raised| raised.set(None));
}

#[cfg(not(feature = "std"))]
#[cold]
#[track_caller]
pub(crate) fn raise<T: ?Sized + 'static>() -> ! {
    panic!("{}", NullPtrError::<T>::new())
}

/// Runs `f`, turning a null access raised by any pointer operator into `Err`.
///
/// Other panics keep unwinding.
///
/// ```
/// use throwing_ptr::{catch_null_deref, SharedPtr};
///
/// let empty = SharedPtr::<i32>::null();
/// let error = catch_null_deref(|| *empty + 1).unwrap_err();
/// assert_eq!(error.what(), "Dereference of nullptr");
/// ```
#[cfg(feature = "std")]
pub fn catch_null_deref<R, F>(f: F) -> Result<R, BaseNullPtrError>
where
    F: FnOnce() -> R + std::panic::UnwindSafe,
{
    clear_raised();
    match std::panic::catch_unwind(f) {
        Ok(value) => Ok(value),
        Err(payload) => match raised(&*payload) {
            Some(error) => {
                clear_raised();
                Err(error)
            }
            None => std::panic::resume_unwind(payload),
        },
    }
}

/// Runs `f`, turning a null access to a `T` into `Err`.
///
/// Null accesses for any other pointee type, and unrelated panics, keep
/// unwinding.
#[cfg(feature = "std")]
pub fn catch_null_deref_of<T, R, F>(f: F) -> Result<R, NullPtrError<T>>
where
    T: ?Sized + 'static,
    F: FnOnce() -> R + std::panic::UnwindSafe,
{
    clear_raised();
    match std::panic::catch_unwind(f) {
        Ok(value) => Ok(value),
        Err(payload) => {
            // Another pointee type leaves the tag in place for an outer catch.
            if let Some(error) = raised(&*payload) {
                if let Ok(typed) = NullPtrError::<T>::try_from(error) {
                    clear_raised();
                    return Err(typed);
                }
            }
            std::panic::resume_unwind(payload)
        }
    }
}
