// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Non-ARM placeholder backend. `task-net`'s binary only ever targets an
//! ARM MCU; this module exists solely so that `cargo doc`/`cargo metadata`
//! and the host-side test crates that merely depend on this crate's types
//! (but never call the trap) can build on a developer workstation.

use super::{RecvMessage, TaskId};

pub(super) fn raw_send(
    _target: TaskId,
    _operation: u16,
    _outgoing: &[u8],
    _incoming: &mut [u8],
) -> (u32, usize) {
    unimplemented!("no kernel trap on this target")
}

pub(super) fn raw_recv(_buffer: &mut [u8], _notification_mask: u32) -> RecvMessage {
    unimplemented!("no kernel trap on this target")
}

pub(super) fn raw_reply(_peer: TaskId, _code: u32, _message: &[u8]) {
    unimplemented!("no kernel trap on this target")
}

pub(super) fn raw_set_timer(_deadline: Option<u64>, _notifications: u32) {
    unimplemented!("no kernel trap on this target")
}

pub(super) fn raw_timer_now() -> u64 {
    unimplemented!("no kernel trap on this target")
}

pub(super) fn raw_post(_target: TaskId, _notification_bits: u32) {
    unimplemented!("no kernel trap on this target")
}
