// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! NIC transport adapters shared across both deployment shapes this
//! component supports: a polling frame-slot ring mapped straight into a
//! dataport, and a virtqueue addressed the way a virtio net device
//! addresses its descriptors. Both sides implement the same [`NicDriver`]
//! trait so `task-net`'s engine adapter doesn't need to know which one
//! it's talking to.
//!
//! This module just moves memory around carefully; it does not know
//! anything about sockets, clients, or the protocol engine.

#![cfg_attr(not(test), no_std)]

pub mod ring;
pub mod virtq;

/// Outcome of a single `dev_read`/`dev_write` call, distinguishing the two
/// internal conditions a driver must be able to signal without tearing
/// the whole component down from the ones that are genuinely fatal.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum NicError {
    /// No frame available right now; try again on the next pump pass.
    TryAgain,
    /// A read found nothing to deliver — distinct from `TryAgain` in that
    /// it's a normal "nothing pending" rather than a transient busy state.
    NoData,
    /// The driver rejected a parameter (oversized frame, bad address
    /// encoding). Recoverable for the pass that caused it but does not by
    /// itself abort the component.
    InvalidParameter,
    /// The driver isn't initialized yet.
    NotInitialized,
    /// The driver doesn't implement this operation at all. Before the
    /// capability has been probed this downgrades to a permanent
    /// legacy-ring fallback; once probed, seeing it again is fatal.
    NotImplemented,
    /// Internal queue bookkeeping overflowed or a descriptor failed to
    /// decode; fatal to the current pump pass.
    Fatal,
}

/// Common surface both NIC transport variants implement so the engine
/// adapter can drive either one identically.
pub trait NicDriver {
    /// Copies the next available inbound frame into `out`, returning the
    /// number of bytes written. Returns `Ok(0)` (not `TryAgain`) when the
    /// driver has been found to be in its permanent legacy-ring fallback
    /// and genuinely has nothing to offer this pass.
    fn dev_read(&mut self, out: &mut [u8]) -> Result<usize, NicError>;

    /// Hands `frame` to the driver for transmission.
    fn dev_write(&mut self, frame: &[u8]) -> Result<(), NicError>;

    fn get_mac_address(&self) -> [u8; 6];

    /// Rings the doorbell so the peer (hardware or hypervisor) knows new
    /// descriptors are ready, if the transport needs one.
    fn notify_send(&mut self);
}

/// Translates a capability probe outcome into the documented fallback
/// behavior: `NotImplemented` before detection quietly degrades future
/// reads to `Ok(0)`; after detection, it's promoted to fatal because the
/// driver claimed a capability it then failed to honor.
pub struct FallbackGate {
    capability_detected: bool,
}

impl FallbackGate {
    pub fn new() -> Self {
        Self { capability_detected: false }
    }

    pub fn mark_detected(&mut self) {
        self.capability_detected = true;
    }

    pub fn classify(&self, err: NicError) -> GateOutcome {
        match err {
            NicError::NotImplemented if !self.capability_detected => {
                GateOutcome::PermanentFallback
            }
            NicError::NotImplemented => GateOutcome::Fatal,
            NicError::InvalidParameter | NicError::NotInitialized => {
                GateOutcome::Fatal
            }
            NicError::TryAgain | NicError::NoData => GateOutcome::NoFrame,
            NicError::Fatal => GateOutcome::Fatal,
        }
    }
}

impl Default for FallbackGate {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum GateOutcome {
    NoFrame,
    PermanentFallback,
    Fatal,
}

#[cfg(test)]
mod tests {
    use super::*;

    // Scenario S6: NOT_IMPLEMENTED before the capability is ever
    // detected degrades to a permanent fallback, not a fatal error.
    #[test]
    fn not_implemented_before_detection_is_permanent_fallback() {
        let gate = FallbackGate::new();
        assert_eq!(
            gate.classify(NicError::NotImplemented),
            GateOutcome::PermanentFallback
        );
    }

    #[test]
    fn not_implemented_after_detection_is_fatal() {
        let mut gate = FallbackGate::new();
        gate.mark_detected();
        assert_eq!(gate.classify(NicError::NotImplemented), GateOutcome::Fatal);
    }

    #[test]
    fn try_again_and_no_data_never_reach_fatal() {
        let gate = FallbackGate::new();
        assert_eq!(gate.classify(NicError::TryAgain), GateOutcome::NoFrame);
        assert_eq!(gate.classify(NicError::NoData), GateOutcome::NoFrame);
    }
}
