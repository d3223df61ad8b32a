//! Conversions between shared pointers of different pointee types.
//!
//! Every cast shares ownership with its source: the result keeps the same
//! control block alive and only the stored pointer changes.

use base::any::Any;
use base::ptr::NonNull;

use crate::shared::SharedPtr;

/// Runtime type inspection for [`dynamic_pointer_cast`].
///
/// Implemented for every sized `'static` type and for the `dyn Any` objects.
/// A trait object becomes castable by making `DynCast` a supertrait:
///
/// ```
/// use throwing_ptr::{dynamic_pointer_cast, static_pointer_cast, DynCast, SharedPtr};
///
/// trait Shape: DynCast + Send + Sync {}
///
/// struct Square(u32);
/// impl Shape for Square {}
///
/// let square = SharedPtr::new(Square(3));
/// let shape: SharedPtr<dyn Shape> =
///     static_pointer_cast(&square, |s| s as &(dyn Shape + 'static));
///
/// let back = dynamic_pointer_cast::<Square, _>(&shape);
/// assert_eq!(back.try_ref().map(|s| s.0), Ok(3));
/// assert!(dynamic_pointer_cast::<String, _>(&shape).is_null());
/// ```
pub trait DynCast: Any {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> DynCast for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl DynCast for dyn Any {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl DynCast for dyn Any + Send {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl DynCast for dyn Any + Send + Sync {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Shares `p` as the reference `f` converts its pointee to, such as an
/// upcast to a trait object. An empty `p` gives an empty result.
pub fn static_pointer_cast<T, U, F>(p: &SharedPtr<T>, f: F) -> SharedPtr<U>
where
    T: ?Sized,
    U: ?Sized,
    F: FnOnce(&T) -> &U,
{
    p.map(f)
}

/// Shares `p` as a `U` if that is what it points to at runtime.
///
/// Gives an empty pointer, with no shared ownership, when the pointee is
/// something else or `p` is empty.
pub fn dynamic_pointer_cast<U, T>(p: &SharedPtr<T>) -> SharedPtr<U>
where
    U: Any,
    T: DynCast + ?Sized,
{
    let target = p
        .get()
        .and_then(|ptr| unsafe { ptr.as_ref() }.as_any().downcast_ref::<U>())
        .map(NonNull::from);

    match target {
        Some(target) => p.share_as(Some(target)),
        None => SharedPtr::null(),
    }
}

/// Another owner of the same pointee.
///
/// Pointees carry no constness of their own, so this is a plain share.
pub fn const_pointer_cast<T: ?Sized>(p: &SharedPtr<T>) -> SharedPtr<T> {
    p.clone()
}

/// Shares `p` with its stored pointer cast to `*const U`.
///
/// # Safety
///
/// Dereferencing the result must be valid for `U`.
pub unsafe fn reinterpret_pointer_cast<U, T: ?Sized>(p: &SharedPtr<T>) -> SharedPtr<U> {
    p.share_as(p.get().map(NonNull::cast::<U>))
}
