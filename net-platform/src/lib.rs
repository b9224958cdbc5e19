// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The platform-binding boundary: narrow traits standing between the
//! network stack's own logic and the kernel primitives it's actually built
//! against, so none of `net-core`'s algorithms need to know whether a
//! real kernel or a test harness is driving them.
//!
//! `task-net` is the only thing that implements these against real
//! syscalls; a host test or a different deployment could supply its own
//! implementations without touching `net-core` or `net-nic` at all.

#![cfg_attr(not(test), no_std)]

use userlib::TaskId;

/// Monotonic millisecond clock plus the periodic tick the event pump rides
/// to drive protocol-engine retransmit/keepalive timers even when no frame
/// has arrived to wake it on its own.
pub trait TickSource {
    fn now_millis(&self) -> u64;
}

/// Fires a client's notification capability. Safe to call more than once
/// for the same client between harvests — the "notify exactly once per
/// pending batch" guarantee belongs to the caller, not this trait.
pub trait Notifier {
    fn notify(&mut self, client_index: usize, client_id: u16);
}

/// A fixed-size shared-memory region: a NIC rx/tx ring's backing memory,
/// or (on another deployment) a client payload buffer. This port's RPC
/// payloads already go through `idol_runtime::Leased`, so the only
/// `Dataport` implementor in this tree is the NIC ring.
pub trait Dataport {
    fn as_bytes(&self) -> &[u8];
    fn as_bytes_mut(&mut self) -> &mut [u8];
}

/// Kernel-backed `TickSource`: reads the same monotonic clock `multitimer`
/// arms its deadlines against.
pub struct KernelClock;

impl TickSource for KernelClock {
    fn now_millis(&self) -> u64 {
        userlib::sys_get_timer().now
    }
}

/// Kernel-backed `Notifier`: a client's badge doubles as its `TaskId`, so
/// notifying it is a direct `sys_post` with no lookup table of our own.
pub struct KernelNotifier;

impl Notifier for KernelNotifier {
    fn notify(&mut self, _client_index: usize, client_id: u16) {
        userlib::sys_post(TaskId(client_id), 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RecordingNotifier {
        notified: Vec<(usize, u16)>,
    }

    impl Notifier for RecordingNotifier {
        fn notify(&mut self, client_index: usize, client_id: u16) {
            self.notified.push((client_index, client_id));
        }
    }

    #[test]
    fn notifier_trait_object_records_every_call() {
        let mut n = RecordingNotifier { notified: vec![] };
        n.notify(0, 10);
        n.notify(1, 20);
        assert_eq!(n.notified, vec![(0, 10), (1, 20)]);
    }
}
