use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use throwing_ptr::{
    catch_null_deref_of, make_unique, make_unique_slice, FnDeleter, Null, NullPtrError, UniquePtr,
};

struct Counted(Arc<AtomicUsize>);

impl Drop for Counted {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

fn counter() -> Arc<AtomicUsize> {
    Arc::new(AtomicUsize::new(0))
}

fn hash_of<H: Hash + ?Sized>(value: &H) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

#[test]
fn default_and_null_are_empty() {
    let p: UniquePtr<i32> = UniquePtr::default();
    assert!(p.is_null());
    assert_eq!(p.get(), None);
    assert!(p.as_ptr().is_null());

    let q: UniquePtr<i32> = Null.into();
    assert!(q == Null);
    assert!(Null == q);
}

#[test]
fn from_raw_keeps_the_address() {
    let raw = Box::into_raw(Box::new(10));
    let p = unsafe { UniquePtr::<i32>::from_raw(raw) };
    assert_eq!(p.as_ptr(), raw as *const i32);
    assert_eq!(*p, 10);
}

#[test]
fn from_null_raw_is_empty() {
    let p = unsafe { UniquePtr::<i32>::from_raw(std::ptr::null_mut()) };
    assert!(p.is_null());
}

#[test]
fn deref_of_null_raises_typed_error() {
    let p: UniquePtr<String> = UniquePtr::null();
    let error = catch_null_deref_of::<String, _, _>(|| p.len()).unwrap_err();
    assert_eq!(error.what(), "Dereference of nullptr");
    assert!(error.what_type().contains("String"));
}

#[test]
fn try_ref_and_try_mut() {
    let mut p = UniquePtr::new(1);
    *p.try_mut().unwrap() += 1;
    assert_eq!(p.try_ref(), Ok(&2));

    let mut empty: UniquePtr<i32> = UniquePtr::null();
    assert_eq!(empty.try_ref(), Err(NullPtrError::new()));
    assert!(empty.try_mut().is_err());
}

#[test]
fn drop_runs_the_deleter_once() {
    let calls = counter();
    {
        let seen = calls.clone();
        let deleter = FnDeleter(move |p: *mut i32| {
            seen.fetch_add(1, Ordering::SeqCst);
            drop(unsafe { Box::from_raw(p) });
        });
        let p = unsafe { UniquePtr::from_raw_with_deleter(Box::into_raw(Box::new(3)), deleter) };
        assert_eq!(*p, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn borrowed_deleter_is_used_in_place() {
    let calls = counter();
    let seen = calls.clone();
    let mut deleter = FnDeleter(move |p: *mut i32| {
        seen.fetch_add(1, Ordering::SeqCst);
        drop(unsafe { Box::from_raw(p) });
    });
    {
        let p = unsafe { UniquePtr::from_raw_with_deleter(Box::into_raw(Box::new(1)), &mut deleter) };
        assert!(!p.is_null());
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn release_detaches_without_cleanup() {
    let drops = counter();
    let mut p = UniquePtr::new(Counted(drops.clone()));
    let raw = p.release().unwrap();
    assert!(p.is_null());
    drop(p);
    assert_eq!(drops.load(Ordering::SeqCst), 0);

    drop(unsafe { Box::from_raw(raw.as_ptr()) });
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[test]
fn reset_releases_the_old_object() {
    let drops = counter();
    let mut p = UniquePtr::new(Counted(drops.clone()));
    unsafe { p.reset_with(Box::into_raw(Box::new(Counted(drops.clone())))) };
    assert_eq!(drops.load(Ordering::SeqCst), 1);

    p.reset();
    assert_eq!(drops.load(Ordering::SeqCst), 2);
    assert!(p.is_null());

    p.reset();
    assert_eq!(drops.load(Ordering::SeqCst), 2);
}

#[test]
fn assigning_null_is_reset() {
    let drops = counter();
    let mut p = UniquePtr::new(Counted(drops.clone()));
    p = Null.into();
    assert!(p.is_null());
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[test]
fn swap_exchanges_objects() {
    let mut a = UniquePtr::new(1);
    let mut b = UniquePtr::new(2);
    let (pa, pb) = (a.as_ptr(), b.as_ptr());
    a.swap(&mut b);
    assert_eq!((*a, *b), (2, 1));
    assert_eq!((a.as_ptr(), b.as_ptr()), (pb, pa));

    std::mem::swap(&mut a, &mut b);
    assert_eq!((*a, *b), (1, 2));
}

#[test]
fn moving_transfers_ownership() {
    let a = UniquePtr::new(5);
    let address = a.as_ptr();
    let b = a;
    assert_eq!(b.as_ptr(), address);
    assert_eq!(b.into_box().map(|b| *b), Some(5));
}

#[test]
fn unsizes_through_map_raw() {
    trait Shape {
        fn area(&self) -> u32;
    }

    struct Square(u32);

    impl Shape for Square {
        fn area(&self) -> u32 {
            self.0 * self.0
        }
    }

    let square = UniquePtr::new(Square(3));
    let shape = unsafe { square.map_raw(|p| -> NonNull<dyn Shape> { p }) };
    assert_eq!(shape.area(), 9);
}

#[test]
fn comparisons_follow_the_address() {
    let a = UniquePtr::new(1);
    let b = UniquePtr::new(1);
    let empty: UniquePtr<i32> = UniquePtr::null();

    assert!(a != b);
    assert_eq!(a < b, (a.as_ptr() as usize) < (b.as_ptr() as usize));
    assert!(empty < a && empty <= b);
    assert!(empty == Null && a > Null && Null < a);
}

#[test]
fn hash_and_format_match_the_raw_pointer() {
    let p = UniquePtr::new(7_u64);
    let raw = p.as_ptr();
    assert_eq!(hash_of(&p), hash_of(&raw));
    assert_eq!(format!("{:p}", p), format!("{:p}", raw));
    assert_eq!(format!("{:?}", p), format!("{:p}", raw));

    let empty: UniquePtr<u64> = UniquePtr::null();
    assert_eq!(hash_of(&empty), hash_of(&std::ptr::null::<u64>()));
}

#[test]
fn slice_hash_includes_the_length() {
    let p = make_unique_slice::<u8>(3);
    let raw: *const [u8] = p.get().unwrap().as_ptr();
    assert_eq!(hash_of(&p), hash_of(&raw));

    let shorter: *const [u8] = std::ptr::slice_from_raw_parts(raw.cast::<u8>(), 2);
    assert_ne!(hash_of(&p), hash_of(&shorter));
}

#[test]
fn compares_with_native_pointers() {
    let boxed = Box::new(5);
    let raw: *const i32 = &*boxed;
    let p = unsafe { UniquePtr::<i32>::from_raw(Box::into_raw(Box::new(5))) };
    let same = UniquePtr::from(boxed);

    assert!(same == raw && raw == same);
    assert!(same == raw.cast_mut() && raw.cast_mut() == same);
    assert!(p != raw && raw != p);
    assert_eq!(p < raw, (p.as_ptr() as usize) < (raw as usize));
    assert_eq!(raw < p, (raw as usize) < (p.as_ptr() as usize));

    let other = Box::new(5);
    assert!(p != other);
    assert_eq!(p < other, (p.as_ptr() as usize) < (&*other as *const i32 as usize));

    let arc = Arc::new(5);
    assert!(p != arc && arc != p);

    let empty: UniquePtr<i32> = UniquePtr::null();
    assert!(empty == std::ptr::null::<i32>() && std::ptr::null::<i32>() == empty);
}

#[test]
fn array_access_and_release_with_custom_deleter() {
    let called = Arc::new(AtomicUsize::new(0));
    let seen = called.clone();
    let deleter = FnDeleter(move |p: *mut [i32]| {
        seen.fetch_add(1, Ordering::SeqCst);
        drop(unsafe { Box::from_raw(p) });
    });

    let raw = Box::into_raw(vec![1, 2, 3].into_boxed_slice());
    let mut p = unsafe { UniquePtr::from_raw_with_deleter(raw, deleter) };
    p[1] = 20;
    assert_eq!(p[1], 20);
    assert_eq!(&p[..2], &[1, 20]);
    assert_eq!(p.try_index(2), Ok(&3));
    *p.try_index_mut(0).unwrap() = 10;
    assert_eq!(p[0], 10);

    let released = p.release().unwrap();
    drop(p);
    assert_eq!(called.load(Ordering::SeqCst), 0);
    drop(unsafe { Box::from_raw(released.as_ptr()) });
}

#[test]
fn null_array_raises_element_typed_error() {
    let p: UniquePtr<[u16]> = UniquePtr::null();
    let error = catch_null_deref_of::<u16, _, _>(|| p[0]).unwrap_err();
    assert!(error.is::<u16>());
    assert_eq!(p.try_index(0), Err(NullPtrError::<u16>::new()));
}

#[test]
fn make_unique_helpers() {
    let p = make_unique(String::from("abc"));
    assert_eq!(p.len(), 3);

    let slice = make_unique_slice::<u8>(4);
    assert_eq!(&slice[..], &[0, 0, 0, 0]);
    let empty = make_unique_slice::<u8>(0);
    assert!(!empty.is_null());
}

#[test]
fn get_deleter_reaches_the_stored_deleter() {
    #[derive(Default)]
    struct Tracking {
        deleted: usize,
    }

    impl throwing_ptr::Deleter<i32> for Tracking {
        unsafe fn delete(&mut self, ptr: *mut i32) {
            self.deleted += 1;
            drop(unsafe { Box::from_raw(ptr) });
        }
    }

    let mut p: UniquePtr<i32, Tracking> = unsafe { UniquePtr::from_raw(Box::into_raw(Box::new(1))) };
    assert_eq!(p.get_deleter().deleted, 0);
    p.reset();
    assert_eq!(p.get_deleter().deleted, 1);
    p.get_deleter_mut().deleted = 5;
    assert_eq!(p.get_deleter().deleted, 5);
}

#[test]
fn borrowing_pointees_are_owned_without_checked_access() {
    struct View<'a>(&'a str);

    let text = String::from("borrowed");
    let mut p = UniquePtr::new(View(&text));
    let seen = p.get().map(|view| unsafe { view.as_ref() }.0);
    assert_eq!(seen, Some("borrowed"));

    p.reset();
    assert!(p.is_null());
}
