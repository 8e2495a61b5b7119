//! Lock utilities
//!
//! Registry and loader state live behind `std::sync` locks that are never held
//! across an `.await`. A poisoned lock only means a panic happened while it was
//! held; every critical section here leaves the data consistent before it can
//! panic, so the guard is recovered instead of propagating the poison.

use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::warn;

/// Acquire a mutex, recovering from poisoning
pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        warn!("Recovering poisoned mutex");
        PoisonError::into_inner(poisoned)
    })
}

/// Acquire a read lock, recovering from poisoning
pub fn read_lock<T>(rwlock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    rwlock.read().unwrap_or_else(|poisoned| {
        warn!("Recovering poisoned read lock");
        PoisonError::into_inner(poisoned)
    })
}

/// Acquire a write lock, recovering from poisoning
pub fn write_lock<T>(rwlock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    rwlock.write().unwrap_or_else(|poisoned| {
        warn!("Recovering poisoned write lock");
        PoisonError::into_inner(poisoned)
    })
}

/// Execute a closure with a read lock held
pub fn with_read_lock<T, F, R>(rwlock: &RwLock<T>, f: F) -> R
where
    F: FnOnce(&T) -> R,
{
    let guard = read_lock(rwlock);
    f(&guard)
}

/// Execute a closure with a write lock held
pub fn with_write_lock<T, F, R>(rwlock: &RwLock<T>, f: F) -> R
where
    F: FnOnce(&mut T) -> R,
{
    let mut guard = write_lock(rwlock);
    f(&mut guard)
}
