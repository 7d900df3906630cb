//! Lock primitives, swapped for loom's model-checked versions under `cfg(loom)`.
//!
//! Both variants expose the parking_lot calling convention: `read()` and
//! `write()` return guards directly.

#[cfg(not(loom))]
pub(crate) use parking_lot::RwLock;

#[cfg(loom)]
pub(crate) use self::model::RwLock;

#[cfg(loom)]
mod model {
    use std::sync::PoisonError;

    pub(crate) struct RwLock<T> {
        inner: loom::sync::RwLock<T>,
    }

    impl<T> RwLock<T> {
        pub(crate) fn new(data: T) -> Self {
            Self {
                inner: loom::sync::RwLock::new(data),
            }
        }

        pub(crate) fn read(&self) -> loom::sync::RwLockReadGuard<'_, T> {
            // A panicking writer never leaves a chain half-spliced.
            self.inner.read().unwrap_or_else(PoisonError::into_inner)
        }

        pub(crate) fn write(&self) -> loom::sync::RwLockWriteGuard<'_, T> {
            self.inner.write().unwrap_or_else(PoisonError::into_inner)
        }
    }
}
