#![cfg(feature = "std")]

use std::panic;

use throwing_ptr::{
    catch_null_deref, catch_null_deref_of, BaseNullPtrError, NullPtrError, SharedPtr, UniquePtr,
    NULL_DEREF_MESSAGE,
};

struct Engine {
    rpm: u32,
}

#[test]
fn every_null_access_carries_the_fixed_message() {
    let unique: UniquePtr<Engine> = UniquePtr::null();
    let shared: SharedPtr<Engine> = SharedPtr::null();

    let a = catch_null_deref(|| unique.rpm).unwrap_err();
    let b = catch_null_deref(|| shared.rpm).unwrap_err();
    assert_eq!(a.what(), NULL_DEREF_MESSAGE);
    assert_eq!(b.to_string(), "Dereference of nullptr");
    assert_eq!(a, b);
}

#[test]
fn what_type_names_the_pointee() {
    let shared: SharedPtr<Engine> = SharedPtr::null();
    let error = catch_null_deref_of::<Engine, _, _>(|| shared.rpm).unwrap_err();
    assert_eq!(
        error.what_type(),
        format!("Dereferenced nullptr of type {}", std::any::type_name::<Engine>())
    );
    assert!(BaseNullPtrError::new().what_type().is_empty());
}

#[test]
fn broad_catch_sees_every_pointee_type() {
    let numbers: UniquePtr<[u8]> = UniquePtr::null();
    let text: SharedPtr<String> = SharedPtr::null();

    assert!(catch_null_deref(|| numbers[0]).unwrap_err().is::<u8>());
    assert!(catch_null_deref(|| text.len()).unwrap_err().is::<String>());
}

#[test]
#[cfg(feature = "array")]
fn shared_array_access_raises_for_the_element_type() {
    let numbers: SharedPtr<[u8]> = SharedPtr::null();
    assert!(catch_null_deref(|| numbers[0]).unwrap_err().is::<u8>());
}

#[test]
#[should_panic(expected = "Dereference of nullptr")]
fn uncaught_access_reports_the_fixed_message() {
    let engine: UniquePtr<Engine> = UniquePtr::null();
    let _rpm = engine.rpm;
}

#[test]
fn a_catch_only_recovers_its_own_raise() {
    let text: SharedPtr<String> = SharedPtr::null();
    assert!(catch_null_deref(|| text.len()).is_err());

    // A plain panic with the same text is not a null access.
    let result = panic::catch_unwind(|| catch_null_deref(|| panic!("Dereference of nullptr")));
    assert!(result.is_err());
}

#[test]
fn narrow_catch_lets_other_pointee_types_through() {
    let text: SharedPtr<String> = SharedPtr::null();

    let outer = catch_null_deref(|| catch_null_deref_of::<Engine, _, _>(|| text.len()));
    let error = outer.unwrap_err();
    assert!(error.is::<String>());
    assert!(NullPtrError::<Engine>::try_from(error).is_err());
}

#[test]
fn unrelated_panics_keep_unwinding() {
    let result = panic::catch_unwind(|| catch_null_deref(|| panic!("unrelated")));
    let payload = result.unwrap_err();
    assert_eq!(payload.downcast_ref::<&str>(), Some(&"unrelated"));
}

#[test]
fn successful_access_passes_the_value_through() {
    let shared = SharedPtr::new(Engine { rpm: 900 });
    assert_eq!(catch_null_deref(|| shared.rpm), Ok(900));
    assert_eq!(catch_null_deref_of::<Engine, _, _>(|| shared.rpm), Ok(900));
}

#[test]
fn result_forms_never_unwind() {
    let unique: UniquePtr<Engine> = UniquePtr::null();
    let shared: SharedPtr<Engine> = SharedPtr::null();

    let unique_error = unique.try_ref().map(|e| e.rpm).unwrap_err();
    let shared_error = shared.try_ref().map(|e| e.rpm).unwrap_err();
    assert_eq!(unique_error, shared_error);

    let widened: BaseNullPtrError = unique_error.into();
    assert!(widened.is::<Engine>());
    assert_eq!(NullPtrError::<Engine>::try_from(widened), Ok(shared_error));
}

#[test]
fn non_null_checks_never_raise() {
    let shared: SharedPtr<Engine> = SharedPtr::null();
    let copy = shared.clone();
    assert!(copy.get().is_none());
    assert_eq!(copy, shared);
    assert_eq!(format!("{:p}", copy), format!("{:p}", std::ptr::null::<Engine>()));
}
