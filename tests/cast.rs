use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use throwing_ptr::{
    const_pointer_cast, dynamic_pointer_cast, reinterpret_pointer_cast, static_pointer_cast,
    DynCast, SharedPtr,
};

trait Animal: DynCast + Send + Sync {
    fn name(&self) -> &str;
}

struct Dog {
    drops: Arc<AtomicUsize>,
}

impl Animal for Dog {
    fn name(&self) -> &str {
        "dog"
    }
}

impl Drop for Dog {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

struct Cat;

impl Animal for Cat {
    fn name(&self) -> &str {
        "cat"
    }
}

fn as_animal<A: Animal>(a: &A) -> &(dyn Animal + 'static) {
    a
}

#[test]
fn static_cast_shares_ownership() {
    let drops = Arc::new(AtomicUsize::new(0));
    let dog = SharedPtr::new(Dog {
        drops: drops.clone(),
    });
    let animal: SharedPtr<dyn Animal> = static_pointer_cast(&dog, as_animal);

    assert_eq!(animal.name(), "dog");
    assert_eq!(dog.use_count(), 2);
    assert_eq!(animal, dog);

    drop(dog);
    assert_eq!(drops.load(Ordering::SeqCst), 0);
    drop(animal);
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[test]
fn static_cast_of_empty_is_empty() {
    let empty: SharedPtr<Cat> = SharedPtr::null();
    let animal: SharedPtr<dyn Animal> = static_pointer_cast(&empty, as_animal);
    assert!(animal.is_null());
    assert_eq!(animal.use_count(), 0);
}

#[test]
fn dynamic_cast_matches_runtime_type() {
    let drops = Arc::new(AtomicUsize::new(0));
    let dog = SharedPtr::new(Dog { drops });
    let animal: SharedPtr<dyn Animal> = static_pointer_cast(&dog, as_animal);

    let back = dynamic_pointer_cast::<Dog, _>(&animal);
    assert_eq!(back, dog);
    assert_eq!(dog.use_count(), 3);

    let wrong = dynamic_pointer_cast::<Cat, _>(&animal);
    assert!(wrong.is_null());
    assert_eq!(wrong.use_count(), 0);
    assert_eq!(dog.use_count(), 3);
}

#[test]
fn dynamic_cast_of_empty_never_errors() {
    let empty: SharedPtr<dyn Animal> = SharedPtr::null();
    assert!(dynamic_pointer_cast::<Cat, _>(&empty).is_null());
}

#[test]
fn dynamic_cast_from_any() {
    let value: Box<dyn Any + Send + Sync> = Box::new(12_i64);
    let any: SharedPtr<dyn Any + Send + Sync> = SharedPtr::from(value);

    assert_eq!(*dynamic_pointer_cast::<i64, _>(&any), 12);
    assert!(dynamic_pointer_cast::<i32, _>(&any).is_null());
}

#[test]
fn const_cast_is_a_plain_share() {
    let p = SharedPtr::new(5);
    let q = const_pointer_cast(&p);
    assert_eq!(p, q);
    assert_eq!(p.use_count(), 2);
}

#[test]
fn reinterpret_cast_keeps_address_and_owner() {
    let p = SharedPtr::new(0x0102_0304_u32);
    let bytes = unsafe { reinterpret_pointer_cast::<[u8; 4], _>(&p) };
    assert_eq!(bytes.as_ptr() as usize, p.as_ptr() as usize);
    assert_eq!(*bytes, 0x0102_0304_u32.to_ne_bytes());
    assert_eq!(p.use_count(), 2);
}
