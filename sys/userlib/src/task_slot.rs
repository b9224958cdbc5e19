// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Compile-time placeholders for peer task identity.
//!
//! A task is written against a *role* ("the NIC driver", "the system
//! controller") rather than a specific `TaskId`, because the index a given
//! role ends up at depends on the application's task manifest, which this
//! crate is built before. A `task_slot!` placeholder is patched with the
//! real index by the post-link build step; at runtime it resolves to a
//! `TaskId` once and is otherwise immutable.

use abi::{Generation, TaskId};
use core::cell::Cell;

#[repr(C)]
pub struct TaskSlot(Cell<u16>);

impl TaskSlot {
    /// A task slot left unresolved by the build step. Calling
    /// `get_task_id` on one of these panics, since it would indicate a
    /// missing entry in the application manifest.
    pub const UNBOUND: Self = Self(Cell::new(TaskId::UNBOUND.0));

    pub fn get_task_id(&self) -> TaskId {
        let index = self.0.get();
        if index == TaskId::UNBOUND.0 {
            panic!("task_slot! used before being resolved by the build step");
        }
        TaskId::for_index_and_gen(index.into(), Generation::default())
    }
}

// Safety: the only mutation this cell ever receives is the one-time patch
// applied by the build step before the task's code starts running; once
// running, every access is a read of a value fixed at link time.
unsafe impl Sync for TaskSlot {}
