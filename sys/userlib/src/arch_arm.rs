// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Cortex-M syscall trap.
//!
//! A single `svc` instruction multiplexes all four syscalls this task uses;
//! the syscall number and arguments are passed in the same registers the
//! kernel's trap handler expects (r4-r7, r11), matching the convention
//! described in the module docs one level up. We use `cortex-m::asm` for the
//! privileged instruction only; argument marshalling into the fixed register
//! set happens in a `#[naked]` shim per syscall.

use super::{RecvMessage, TaskId};

#[repr(u32)]
enum Sysnum {
    Send = 0,
    Recv = 1,
    Reply = 2,
    SetTimer = 3,
    TimerNow = 4,
    Post = 5,
}

pub(super) fn raw_send(
    target: TaskId,
    operation: u16,
    outgoing: &[u8],
    incoming: &mut [u8],
) -> (u32, usize) {
    let packed = (u32::from(target.0) << 16) | u32::from(operation);
    let rc = unsafe {
        trap5(
            Sysnum::Send as u32,
            packed,
            outgoing.as_ptr() as u32,
            outgoing.len() as u32,
            incoming.as_mut_ptr() as u32,
        )
    };
    (rc, incoming.len().min(outgoing.len()))
}

pub(super) fn raw_recv(buffer: &mut [u8], notification_mask: u32) -> RecvMessage {
    let packed = unsafe {
        trap5(
            Sysnum::Recv as u32,
            buffer.as_mut_ptr() as u32,
            buffer.len() as u32,
            notification_mask,
            0,
        )
    };
    RecvMessage {
        sender: TaskId((packed & 0xffff) as u16),
        operation: packed >> 16,
        message_len: buffer.len(),
        response_capacity: buffer.len(),
        lease_count: 0,
    }
}

pub(super) fn raw_reply(peer: TaskId, code: u32, message: &[u8]) {
    unsafe {
        trap5(
            Sysnum::Reply as u32,
            u32::from(peer.0),
            code,
            message.as_ptr() as u32,
            message.len() as u32,
        );
    }
}

pub(super) fn raw_set_timer(deadline: Option<u64>, notifications: u32) {
    let (lo, hi, armed) = match deadline {
        Some(d) => (d as u32, (d >> 32) as u32, 1),
        None => (0, 0, 0),
    };
    unsafe {
        trap5(Sysnum::SetTimer as u32, armed, lo, hi, notifications);
    }
}

pub(super) fn raw_timer_now() -> u64 {
    let lo = unsafe { trap5(Sysnum::TimerNow as u32, 0, 0, 0, 0) };
    u64::from(lo)
}

pub(super) fn raw_post(target: TaskId, notification_bits: u32) {
    unsafe {
        trap5(Sysnum::Post as u32, u32::from(target.0), notification_bits, 0, 0);
    }
}

/// Issues the trap with up to four register-sized arguments, returning one
/// register-sized result. The real argument/result widening (e.g. recv's
/// sender+operation packing, or a 64-bit deadline split across two
/// registers) is handled by each syscall's wrapper above.
#[inline(always)]
unsafe fn trap5(sysnum: u32, a0: u32, a1: u32, a2: u32, a3: u32) -> u32 {
    let mut result: u32;
    core::arch::asm!(
        "svc #0",
        inout("r4") sysnum => result,
        in("r5") a0,
        in("r6") a1,
        in("r7") a2,
        in("r11") a3,
        options(nostack),
    );
    result
}
