//! Interior mutability used by the container. The cell flavour follows the
//! service pointer selected through the crate features.

pub(crate) trait LockEx<T> {
    fn with_inner<R, F: FnOnce(&T) -> R>(&self, f: F) -> R;
    fn with_inner_mut<R, F: FnOnce(&mut T) -> R>(&self, f: F) -> R;
}

#[cfg(feature = "rc")]
mod types {
    use super::LockEx;
    use std::cell::RefCell;

    pub type Lock<T> = RefCell<T>;
    pub type OnceCell<T> = once_cell::unsync::OnceCell<T>;

    impl<T> LockEx<T> for Lock<T> {
        fn with_inner<R, F: FnOnce(&T) -> R>(&self, f: F) -> R {
            f(&*self.borrow())
        }

        fn with_inner_mut<R, F: FnOnce(&mut T) -> R>(&self, f: F) -> R {
            f(&mut *self.borrow_mut())
        }
    }

    /// Resolution never leaves the thread that owns the container, so
    /// there is nothing to serialize.
    pub(crate) struct ResolutionLock;

    pub(crate) struct ResolutionGuard;

    impl ResolutionLock {
        pub fn new() -> Self {
            ResolutionLock
        }

        pub fn enter(&self) -> ResolutionGuard {
            ResolutionGuard
        }
    }
}

#[cfg(feature = "arc")]
mod types {
    use super::LockEx;
    use std::{
        sync::{Condvar, Mutex, PoisonError},
        thread::{self, ThreadId},
    };

    pub type Lock<T> = Mutex<T>;
    pub type OnceCell<T> = once_cell::sync::OnceCell<T>;

    impl<T> LockEx<T> for Lock<T> {
        fn with_inner<R, F: FnOnce(&T) -> R>(&self, f: F) -> R {
            f(&*self.lock().unwrap_or_else(PoisonError::into_inner))
        }

        fn with_inner_mut<R, F: FnOnce(&mut T) -> R>(&self, f: F) -> R {
            f(&mut *self.lock().unwrap_or_else(PoisonError::into_inner))
        }
    }

    /// Lets one thread at a time resolve through a container. The owning
    /// thread can enter again while it holds the lock, so nested
    /// resolutions and user code invoked by them never block themselves.
    /// Other threads wait until the owner is done, which keeps in-progress
    /// markers and the request path private to the owner.
    pub(crate) struct ResolutionLock {
        owner: Mutex<Option<(ThreadId, usize)>>,
        released: Condvar,
    }

    pub(crate) struct ResolutionGuard<'a> {
        lock: &'a ResolutionLock,
    }

    impl ResolutionLock {
        pub fn new() -> Self {
            ResolutionLock {
                owner: Mutex::new(None),
                released: Condvar::new(),
            }
        }

        pub fn enter(&self) -> ResolutionGuard<'_> {
            let current = thread::current().id();
            let mut owner =
                self.owner.lock().unwrap_or_else(PoisonError::into_inner);
            loop {
                match *owner {
                    Some((id, depth)) if id == current => {
                        *owner = Some((id, depth + 1));
                        break;
                    }
                    Some(_) => {
                        owner = self
                            .released
                            .wait(owner)
                            .unwrap_or_else(PoisonError::into_inner);
                    }
                    None => {
                        *owner = Some((current, 1));
                        break;
                    }
                }
            }
            ResolutionGuard { lock: self }
        }
    }

    impl Drop for ResolutionGuard<'_> {
        fn drop(&mut self) {
            let mut owner = self
                .lock
                .owner
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            *owner = match *owner {
                Some((id, depth)) if depth > 1 => Some((id, depth - 1)),
                _ => None,
            };
            if owner.is_none() {
                self.lock.released.notify_all();
            }
        }
    }
}

#[allow(clippy::wildcard_imports)]
pub(crate) use types::*;
