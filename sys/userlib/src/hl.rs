// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! High-level wrapper over the raw syscall stubs.

use crate::{sys_recv_open, sys_reply, Message, TaskId};
use num_traits::FromPrimitive;

/// Receives a message or a notification and dispatches it.
///
/// `notify` runs when the kernel hands back a notification instead of a
/// message (sender reads as `TaskId::KERNEL`); `msg` runs for a real call,
/// after decoding the wire operation code into `O`. An operation code this
/// task doesn't recognize gets an immediate "bad operation" reply (code 1)
/// without ever reaching `msg`.
pub fn recv<O, E>(
    buffer: &mut [u8],
    mask: u32,
    notify: impl FnOnce(u32),
    msg: impl FnOnce(O, Message<'_>) -> Result<(), E>,
) where
    O: FromPrimitive,
    E: Into<u32>,
{
    let rm = sys_recv_open(buffer, mask);
    let sender = rm.sender;
    if sender == TaskId::KERNEL {
        notify(rm.operation);
        return;
    }
    if let Some(op) = O::from_u32(rm.operation) {
        let m = Message {
            buffer: &buffer[..rm.message_len],
            sender,
            response_capacity: rm.response_capacity,
            lease_count: rm.lease_count,
        };
        if let Err(e) = msg(op, m) {
            sys_reply(sender, e.into(), &[]);
        }
    } else {
        sys_reply(sender, 1, &[]);
    }
}

/// Variant of `recv` for a task that never listens for notifications.
pub fn recv_without_notification<O, E>(
    buffer: &mut [u8],
    msg: impl FnOnce(O, Message<'_>) -> Result<(), E>,
) where
    O: FromPrimitive,
    E: Into<u32>,
{
    recv(buffer, 0, |_| (), msg)
}
