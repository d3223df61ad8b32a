//! A shared pointer slot that several threads may read and replace at once.
//!
//! Each slot is guarded by its own spin lock, so none of these operations is
//! lock free. Replaced values are dropped after the lock is released, which
//! keeps pointee destructors out of the critical section.

use base::cell::UnsafeCell;
use base::fmt;
use base::mem;
use base::sync::atomic::{AtomicBool, Ordering};

use crate::shared::SharedPtr;

/// An atomically replaceable [`SharedPtr`].
///
/// ```
/// use std::sync::atomic::Ordering::SeqCst;
/// use throwing_ptr::{AtomicSharedPtr, SharedPtr};
///
/// let slot = AtomicSharedPtr::new(SharedPtr::new(1));
/// let mut expected = slot.load(SeqCst);
///
/// assert!(slot.compare_exchange_strong(&mut expected, SharedPtr::new(2), SeqCst, SeqCst));
/// assert_eq!(*slot.load(SeqCst), 2);
///
/// // `expected` is stale now; a failed exchange refreshes it.
/// assert!(!slot.compare_exchange_strong(&mut expected, SharedPtr::new(3), SeqCst, SeqCst));
/// assert_eq!(*expected, 2);
/// ```
pub struct AtomicSharedPtr<T: ?Sized> {
    locked: AtomicBool,
    slot: UnsafeCell<SharedPtr<T>>,
}

unsafe impl<T: ?Sized + Send + Sync> Send for AtomicSharedPtr<T> {}
unsafe impl<T: ?Sized + Send + Sync> Sync for AtomicSharedPtr<T> {}

struct SlotGuard<'a, T: ?Sized> {
    owner: &'a AtomicSharedPtr<T>,
}

impl<T: ?Sized> SlotGuard<'_, T> {
    #[inline]
    fn get(&mut self) -> &mut SharedPtr<T> {
        // Holding the guard means holding the lock.
        unsafe { &mut *self.owner.slot.get() }
    }
}

impl<T: ?Sized> Drop for SlotGuard<'_, T> {
    #[inline]
    fn drop(&mut self) {
        self.owner.locked.store(false, Ordering::Release);
    }
}

/// Exponential spinning, then yielding to the scheduler when `std` is there.
struct Backoff {
    step: u32,
}

impl Backoff {
    const SPIN_LIMIT: u32 = 6;

    fn new() -> Self {
        Self { step: 0 }
    }

    fn snooze(&mut self) {
        if self.step < Self::SPIN_LIMIT {
            for _ in 0..1_u32 << self.step {
                base::hint::spin_loop();
            }
            self.step += 1;
        } else {
            #[cfg(feature = "std")]
            std::thread::yield_now();
            #[cfg(not(feature = "std"))]
            base::hint::spin_loop();
        }
    }
}

impl<T: ?Sized> AtomicSharedPtr<T> {
    pub const fn new(value: SharedPtr<T>) -> Self {
        Self {
            locked: AtomicBool::new(false),
            slot: UnsafeCell::new(value),
        }
    }

    /// A slot holding an empty pointer.
    pub const fn null() -> Self {
        Self::new(SharedPtr::null())
    }

    /// Always `false`: every operation takes the slot's lock.
    pub const fn is_lock_free(&self) -> bool {
        false
    }

    fn lock(&self) -> SlotGuard<'_, T> {
        let mut backoff = Backoff::new();
        while self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            while self.locked.load(Ordering::Relaxed) {
                backoff.snooze();
            }
        }
        SlotGuard { owner: self }
    }

    /// Another owner of the current value.
    ///
    /// # Panics
    ///
    /// Panics if `order` is [`Release`](Ordering::Release) or
    /// [`AcqRel`](Ordering::AcqRel).
    pub fn load(&self, order: Ordering) -> SharedPtr<T> {
        check_load(order);
        self.lock().get().clone()
    }

    /// Replaces the current value, dropping the old one.
    ///
    /// # Panics
    ///
    /// Panics if `order` is [`Acquire`](Ordering::Acquire) or
    /// [`AcqRel`](Ordering::AcqRel).
    pub fn store(&self, value: SharedPtr<T>, order: Ordering) {
        check_store(order);
        drop(self.replace(value));
    }

    /// Replaces the current value, returning the old one.
    pub fn swap(&self, value: SharedPtr<T>, _order: Ordering) -> SharedPtr<T> {
        self.replace(value)
    }

    fn replace(&self, value: SharedPtr<T>) -> SharedPtr<T> {
        mem::replace(self.lock().get(), value)
    }

    /// Stores `desired` if the slot holds the same pointer with the same
    /// ownership as `expected`.
    ///
    /// On failure `expected` becomes a copy of the current value. Pointees are
    /// never compared, only stored pointers and control blocks.
    ///
    /// # Panics
    ///
    /// Panics if `failure` is [`Release`](Ordering::Release) or
    /// [`AcqRel`](Ordering::AcqRel).
    pub fn compare_exchange_strong(
        &self,
        expected: &mut SharedPtr<T>,
        desired: SharedPtr<T>,
        _success: Ordering,
        failure: Ordering,
    ) -> bool {
        check_failure(failure);

        let mut guard = self.lock();
        let current = guard.get();
        if current.is_equivalent(expected) {
            let old = mem::replace(current, desired);
            drop(guard);
            drop(old);
            true
        } else {
            let old = mem::replace(expected, current.clone());
            drop(guard);
            log::trace!("compare-exchange found {:p}, expected {:p}", *expected, old);
            drop(old);
            drop(desired);
            false
        }
    }

    /// Same as [`compare_exchange_strong`](Self::compare_exchange_strong);
    /// the lock rules out spurious failures.
    pub fn compare_exchange_weak(
        &self,
        expected: &mut SharedPtr<T>,
        desired: SharedPtr<T>,
        success: Ordering,
        failure: Ordering,
    ) -> bool {
        self.compare_exchange_strong(expected, desired, success, failure)
    }

    pub fn into_inner(self) -> SharedPtr<T> {
        self.slot.into_inner()
    }

    /// The value, through exclusive access that needs no locking.
    pub fn get_mut(&mut self) -> &mut SharedPtr<T> {
        self.slot.get_mut()
    }
}

fn check_load(order: Ordering) {
    match order {
        Ordering::Release => panic!("there is no such thing as a release load"),
        Ordering::AcqRel => panic!("there is no such thing as an acquire-release load"),
        _ => {}
    }
}

fn check_store(order: Ordering) {
    match order {
        Ordering::Acquire => panic!("there is no such thing as an acquire store"),
        Ordering::AcqRel => panic!("there is no such thing as an acquire-release store"),
        _ => {}
    }
}

fn check_failure(order: Ordering) {
    match order {
        Ordering::Release => panic!("there is no such thing as a release failure ordering"),
        Ordering::AcqRel => panic!("there is no such thing as an acquire-release failure ordering"),
        _ => {}
    }
}

impl<T: ?Sized> Default for AtomicSharedPtr<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T: ?Sized> From<SharedPtr<T>> for AtomicSharedPtr<T> {
    fn from(value: SharedPtr<T>) -> Self {
        Self::new(value)
    }
}

impl<T: ?Sized> fmt::Debug for AtomicSharedPtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.load(Ordering::SeqCst), f)
    }
}

pub fn atomic_is_lock_free<T: ?Sized>(p: &AtomicSharedPtr<T>) -> bool {
    p.is_lock_free()
}

pub fn atomic_load<T: ?Sized>(p: &AtomicSharedPtr<T>) -> SharedPtr<T> {
    p.load(Ordering::SeqCst)
}

pub fn atomic_load_explicit<T: ?Sized>(p: &AtomicSharedPtr<T>, order: Ordering) -> SharedPtr<T> {
    p.load(order)
}

pub fn atomic_store<T: ?Sized>(p: &AtomicSharedPtr<T>, value: SharedPtr<T>) {
    p.store(value, Ordering::SeqCst)
}

pub fn atomic_store_explicit<T: ?Sized>(p: &AtomicSharedPtr<T>, value: SharedPtr<T>, order: Ordering) {
    p.store(value, order)
}

pub fn atomic_exchange<T: ?Sized>(p: &AtomicSharedPtr<T>, value: SharedPtr<T>) -> SharedPtr<T> {
    p.swap(value, Ordering::SeqCst)
}

pub fn atomic_exchange_explicit<T: ?Sized>(
    p: &AtomicSharedPtr<T>,
    value: SharedPtr<T>,
    order: Ordering,
) -> SharedPtr<T> {
    p.swap(value, order)
}

pub fn atomic_compare_exchange_weak<T: ?Sized>(
    p: &AtomicSharedPtr<T>,
    expected: &mut SharedPtr<T>,
    desired: SharedPtr<T>,
) -> bool {
    p.compare_exchange_weak(expected, desired, Ordering::SeqCst, Ordering::SeqCst)
}

pub fn atomic_compare_exchange_strong<T: ?Sized>(
    p: &AtomicSharedPtr<T>,
    expected: &mut SharedPtr<T>,
    desired: SharedPtr<T>,
) -> bool {
    p.compare_exchange_strong(expected, desired, Ordering::SeqCst, Ordering::SeqCst)
}

pub fn atomic_compare_exchange_weak_explicit<T: ?Sized>(
    p: &AtomicSharedPtr<T>,
    expected: &mut SharedPtr<T>,
    desired: SharedPtr<T>,
    success: Ordering,
    failure: Ordering,
) -> bool {
    p.compare_exchange_weak(expected, desired, success, failure)
}

pub fn atomic_compare_exchange_strong_explicit<T: ?Sized>(
    p: &AtomicSharedPtr<T>,
    expected: &mut SharedPtr<T>,
    desired: SharedPtr<T>,
    success: Ordering,
    failure: Ordering,
) -> bool {
    p.compare_exchange_strong(expected, desired, success, failure)
}
