// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-variant saturating counters, readable post-mortem the same way a
//! `ringbuf` is: an external debugger walks the static, no runtime query
//! API is required. Counters survive the buffer wraparound that a
//! `ringbuf` is inherently subject to, at the cost of losing ordering.

#![cfg_attr(not(test), no_std)]

use core::cell::Cell;

/// Implemented by an enum whose variants should each get their own
/// saturating counter. `CountsArray` is `[Cell<u32>; variant count]`,
/// supplied via the `counters!` macro below rather than hand-written.
pub trait Count {
    type Counters: 'static;
    fn count(&self, counters: &Self::Counters);
}

/// Declares a counter table for `$ty` sized `$n` (the number of variants),
/// and implements `Count` for `$ty` by dispatching on `$variant_index`.
#[macro_export]
macro_rules! counters {
    ($name:ident, $ty:ty, $n:expr) => {
        #[used]
        static $name: [core::cell::Cell<u32>; $n] =
            [const { core::cell::Cell::new(0) }; $n];

        unsafe impl Sync for [core::cell::Cell<u32>; $n] {}
    };
}

/// A single named saturating counter, for operation/error tallies that
/// don't fit the per-enum-variant shape of [`Count`].
pub struct Counter(Cell<u32>);

impl Counter {
    pub const fn new() -> Self {
        Self(Cell::new(0))
    }

    pub fn increment(&self) {
        self.0.set(self.0.get().saturating_add(1));
    }

    pub fn get(&self) -> u32 {
        self.0.get()
    }
}

impl Default for Counter {
    fn default() -> Self {
        Self::new()
    }
}

// Safety: single-threaded task model, see `ringbuf::Ringbuf`.
unsafe impl Sync for Counter {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saturates_rather_than_overflows() {
        let c = Counter::new();
        for _ in 0..10 {
            c.increment();
        }
        assert_eq!(c.get(), 10);
    }
}
