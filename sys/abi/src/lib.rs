// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Kernel ABI definitions shared between the microkernel and tasks that run
//! on top of it.
//!
//! This crate carries only what a capability-style task needs to address its
//! peers and to decode the kernel's notification word: task identity and the
//! generation counter that guards against talking to a restarted peer. RPC
//! marshalling itself lives in `idol-runtime`; this crate never depends on
//! it.

#![no_std]

use serde::{Deserialize, Serialize};

/// Number of bits of a `TaskId` used for the task index, the remainder being
/// the generation number.
pub const TASK_ID_INDEX_BITS: u32 = 10;

/// Names a particular incarnation of a task: an index (stable across
/// restarts) plus a generation number (bumped on every restart). A stale
/// generation number reliably identifies a peer that has been restarted
/// since the capability to it was minted, which is how this system
/// implements "the client went away" without shared mutable bookkeeping.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TaskId(pub u16);

impl TaskId {
    /// Reserved id standing for the kernel itself, e.g. as the sender of a
    /// notification delivered in place of a real message.
    pub const KERNEL: Self = Self(!0);

    /// Reserved id for a `task_slot!` that has not yet been bound to a real
    /// peer.
    pub const UNBOUND: Self = Self(Self::INDEX_MASK - 1);

    pub const INDEX_BITS: u32 = TASK_ID_INDEX_BITS;
    pub const INDEX_MASK: u16 = (1 << Self::INDEX_BITS) - 1;

    pub const fn for_index_and_gen(index: usize, gen: Generation) -> Self {
        TaskId(
            (index as u16 & Self::INDEX_MASK)
                | (gen.0 as u16) << Self::INDEX_BITS,
        )
    }

    pub fn index(&self) -> usize {
        usize::from(self.0 & Self::INDEX_MASK)
    }

    pub fn generation(&self) -> Generation {
        Generation((self.0 >> Self::INDEX_BITS) as u8)
    }

    pub fn next_generation(self) -> Self {
        Self::for_index_and_gen(self.index(), self.generation().next())
    }

    /// The badge value a kernel-mediated RPC presents to the receiver: the
    /// raw bit pattern of the sender's `TaskId`. This system treats the
    /// badge as the client identity (see `net-core::sockets`).
    pub fn badge(&self) -> u16 {
        self.0
    }
}

/// Generation counter of a task incarnation; wraps on overflow.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
#[repr(transparent)]
pub struct Generation(pub u8);

impl Generation {
    pub const ZERO: Self = Self(0);

    pub fn next(self) -> Self {
        Generation(self.0.wrapping_add(1))
    }
}

impl From<u8> for Generation {
    fn from(x: u8) -> Self {
        Self(x)
    }
}
