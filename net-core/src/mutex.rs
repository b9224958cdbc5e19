// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The four named critical sections from `spec.md` §5, realized as
//! newtype wrappers over `core::cell::RefCell`. A component task here has
//! exactly one thread, so "mutex" collapses to "must not be re-entered
//! while already borrowed" — a `RefCell` borrow panic stands in for the
//! deadlock the original spec warns a real mutex would hit.
//!
//! `Lifecycle` deliberately isn't one of these four: spec.md §5 names
//! exactly four sections (engine allocation, engine entry points, the
//! socket table, and the event-mask/cursor snapshot), and the component's
//! own state machine isn't among them.

use core::cell::{Ref, RefCell, RefMut};

macro_rules! lock_newtype {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        pub struct $name<T>(RefCell<T>);

        impl<T> $name<T> {
            pub const fn new(value: T) -> Self {
                Self(RefCell::new(value))
            }

            pub fn borrow(&self) -> Ref<'_, T> {
                self.0.borrow()
            }

            pub fn borrow_mut(&self) -> RefMut<'_, T> {
                self.0.borrow_mut()
            }

            pub fn into_inner(self) -> T {
                self.0.into_inner()
            }
        }
    };
}

lock_newtype!(
    AllocatorLock,
    "Guards the protocol engine's socket-set allocator: adding or removing an engine socket."
);
lock_newtype!(
    NwStackLock,
    "Guards the protocol engine's entry points reached from outside the pump's own tick, e.g. an RPC handler bringing the stack up."
);
lock_newtype!(SocketCbLock, "Guards every read or modification of the socket table.");
lock_newtype!(
    StackTsLock,
    "Guards the event-mask/cursor snapshot taken by both the pump's fan-out pass and getPendingEvents."
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reentrant_borrow_mut_panics_instead_of_corrupting_state() {
        let lock = SocketCbLock::new(0u32);
        let _first = lock.borrow_mut();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            lock.borrow_mut();
        }));
        assert!(result.is_err());
    }

    #[test]
    fn sequential_non_overlapping_borrows_never_panic() {
        let lock = AllocatorLock::new(vec![1, 2, 3]);
        {
            let mut v = lock.borrow_mut();
            v.push(4);
        }
        assert_eq!(*lock.borrow(), vec![1, 2, 3, 4]);
    }
}
