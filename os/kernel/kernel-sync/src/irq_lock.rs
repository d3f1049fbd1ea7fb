use crate::IrqGuard;
use core::{
    cell::UnsafeCell,
    ops::{Deref, DerefMut},
    sync::atomic::{AtomicBool, Ordering},
};

/// A lock for single-core state shared with exception handlers.
///
/// Holding the lock masks IRQs. Because nothing else can run on the core while
/// it is held, finding it already taken means the current call chain is
/// trying to acquire it a second time (for example a data abort raised while
/// the page tables are being edited). [`lock`](Self::lock) panics in that
/// case rather than spinning forever.
pub struct IrqLock<T> {
    /// * `false`: free
    /// * `true`: held
    held: AtomicBool,
    inner: UnsafeCell<T>,
}

// Safety: access to `inner` is serialized by `held`.
unsafe impl<T: Send> Sync for IrqLock<T> {}

impl<T> IrqLock<T> {
    pub const fn new(inner: T) -> Self {
        Self {
            held: AtomicBool::new(false),
            inner: UnsafeCell::new(inner),
        }
    }

    /// Masks IRQs and takes the lock if it is free.
    ///
    /// On failure the previous IRQ state is restored before returning `None`.
    #[inline]
    pub fn try_lock(&self) -> Option<IrqLockGuard<'_, T>> {
        let irq = IrqGuard::new();
        if self
            .held
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            Some(IrqLockGuard { lock: self, _irq: irq })
        } else {
            None
        }
    }

    /// Masks IRQs and takes the lock.
    ///
    /// # Panics
    /// Panics if the lock is already held.
    #[inline]
    #[track_caller]
    pub fn lock(&self) -> IrqLockGuard<'_, T> {
        match self.try_lock() {
            Some(guard) => guard,
            None => panic!("IrqLock acquired re-entrantly"),
        }
    }

    /// Runs `f` with the lock held.
    #[inline]
    #[track_caller]
    pub fn with_lock<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut g = self.lock();
        f(&mut g)
    }

    #[inline]
    pub fn is_locked(&self) -> bool {
        self.held.load(Ordering::Relaxed)
    }

    /// Exclusive access without locking; `&mut self` rules out contention.
    #[inline]
    pub const fn get_mut(&mut self) -> &mut T {
        self.inner.get_mut()
    }

    #[inline]
    pub fn into_inner(self) -> T {
        self.inner.into_inner()
    }
}

/// Grants access to the data of an [`IrqLock`].
///
/// Dropping the guard releases the lock first and then restores the IRQ mask.
pub struct IrqLockGuard<'a, T> {
    lock: &'a IrqLock<T>,
    _irq: IrqGuard,
}

impl<T> Deref for IrqLockGuard<'_, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        // Safety: the guard proves the lock is held.
        unsafe { &*self.lock.inner.get() }
    }
}

impl<T> DerefMut for IrqLockGuard<'_, T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        // Safety: the guard proves the lock is held.
        unsafe { &mut *self.lock.inner.get() }
    }
}

impl<T> Drop for IrqLockGuard<'_, T> {
    #[inline]
    fn drop(&mut self) {
        self.lock.held.store(false, Ordering::Release);
    }
}
