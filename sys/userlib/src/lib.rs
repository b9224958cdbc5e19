// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Minimal user-task support library.
//!
//! Re-exports `abi`'s task-identity types and adds the small set of syscall
//! stubs a component actually issues: send a message, block for a message or
//! notification, reply to a caller, and read the monotonic timer. Argument
//! marshalling for leases is left to `idol-runtime`; this crate only supplies
//! the raw trap and the types it moves across the trap boundary.

#![no_std]

#[macro_use]
pub mod macros;

pub use abi::*;

pub mod hl;
pub mod task_slot;

use core::marker::PhantomData;

/// A borrowed region of memory offered to a callee for the duration of one
/// IPC, read-only, write-only, or both.
#[derive(Debug)]
pub struct Lease<'a> {
    base: *const u8,
    len: usize,
    writable: bool,
    _marker: PhantomData<&'a mut ()>,
}

impl<'a> Lease<'a> {
    pub fn read_only(x: &'a [u8]) -> Self {
        Self {
            base: x.as_ptr(),
            len: x.len(),
            writable: false,
            _marker: PhantomData,
        }
    }

    pub fn read_write(x: &'a mut [u8]) -> Self {
        Self {
            base: x.as_ptr(),
            len: x.len(),
            writable: true,
            _marker: PhantomData,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }
}

/// Message delivered to the recipient of a `sys_recv`, before operation-code
/// decoding.
pub struct RecvMessage {
    pub sender: TaskId,
    pub operation: u32,
    pub message_len: usize,
    pub response_capacity: usize,
    pub lease_count: usize,
}

/// A decoded, application-typed message, handed to a `hl::recv` closure.
pub struct Message<'a> {
    pub buffer: &'a [u8],
    pub sender: TaskId,
    pub response_capacity: usize,
    pub lease_count: usize,
}

cfg_if::cfg_if! {
    if #[cfg(target_arch = "arm")] {
        mod arch_arm;
        use arch_arm::{raw_post, raw_recv, raw_reply, raw_send, raw_set_timer, raw_timer_now};
    } else {
        mod arch_sim;
        use arch_sim::{raw_post, raw_recv, raw_reply, raw_send, raw_set_timer, raw_timer_now};
    }
}

/// Sends `operation` with `outgoing` payload to `target`, blocking until the
/// callee replies into `incoming` (or dies, see `ClientError::WentAway` at
/// the `idol-runtime` layer). Returns the response code and the number of
/// response bytes written.
pub fn sys_send(
    target: TaskId,
    operation: u16,
    outgoing: &[u8],
    incoming: &mut [u8],
) -> (u32, usize) {
    raw_send(target, operation, outgoing, incoming)
}

/// Blocks until a message or an accepted notification bit arrives.
/// `notification_mask` selects which notification bits may wake this task
/// while it is not also expecting a message from a specific sender.
pub fn sys_recv_open(buffer: &mut [u8], notification_mask: u32) -> RecvMessage {
    raw_recv(buffer, notification_mask)
}

/// Replies to `peer` with response code `code` and `message` as the response
/// body.
pub fn sys_reply(peer: TaskId, code: u32, message: &[u8]) {
    raw_reply(peer, code, message)
}

/// Arms (or disarms, with `deadline = None`) the task's one-shot timer,
/// posting `notifications` when it expires.
pub fn sys_set_timer(deadline: Option<u64>, notifications: u32) {
    raw_set_timer(deadline, notifications)
}

/// Reads the monotonic millisecond clock maintained by the kernel's time
/// driver.
pub fn sys_get_timer() -> TimerState {
    TimerState { now: raw_timer_now() }
}

/// Snapshot of the kernel's monotonic clock at the moment of the call.
pub struct TimerState {
    pub now: u64,
}

/// Posts `notification_bits` to `target`'s notification word without
/// waiting for it to be observed. Used to wake a peer task out of its own
/// `sys_recv_open` — e.g. the stack component waking a client whose event
/// queue just gained an entry.
pub fn sys_post(target: TaskId, notification_bits: u32) {
    raw_post(target, notification_bits)
}
