// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The polling ring transport: a from-NIC array of fixed-size frame
//! slots and a single to-NIC outbound buffer, all living in plain memory
//! rather than behind DMA ownership bits. A slot's `len` field doubles
//! as its ownership flag — `0` means empty and available to the
//! producer, nonzero means a frame is waiting to be drained.
//!
//! This is deliberately simpler than a hardware descriptor ring: there's
//! no out-of-band "who owns this" bit, so the two sides agree purely by
//! the convention of "reader zeroes `len` after it copies the frame out."

use crate::{NicDriver, NicError};
use core::cell::Cell;

/// One inbound frame slot. `MTU` bounds the largest frame this ring can
/// carry; a frame claiming a larger `len` than the slot can hold is a
/// decode failure, not a short read.
pub struct FrameSlot<const MTU: usize> {
    len: Cell<u16>,
    data: Cell<[u8; MTU]>,
}

impl<const MTU: usize> FrameSlot<MTU> {
    pub const fn empty() -> Self {
        Self { len: Cell::new(0), data: Cell::new([0; MTU]) }
    }
}

/// Polling ring NIC transport: `N` inbound slots scanned round-robin,
/// one outbound buffer. Used when the platform offers no interrupt or
/// virtqueue facility and the pump must simply poll memory each tick.
pub struct PollingRing<const N: usize, const MTU: usize> {
    rx: [FrameSlot<MTU>; N],
    rx_cursor: Cell<usize>,
    tx_pending: Cell<bool>,
    tx: FrameSlot<MTU>,
    mac: [u8; 6],
}

impl<const N: usize, const MTU: usize> PollingRing<N, MTU> {
    pub fn new(mac: [u8; 6]) -> Self {
        Self {
            rx: core::array::from_fn(|_| FrameSlot::empty()),
            rx_cursor: Cell::new(0),
            tx_pending: Cell::new(false),
            tx: FrameSlot::empty(),
            mac,
        }
    }

    /// Test/simulation hook: deposits a frame into the next empty rx
    /// slot as if the peer had written it, for exercising `dev_read`
    /// without a real hardware or hypervisor counterpart.
    #[cfg(test)]
    pub fn inject_rx_frame(&self, frame: &[u8]) -> bool {
        for slot in &self.rx {
            if slot.len.get() == 0 {
                let mut buf = [0u8; MTU];
                buf[..frame.len()].copy_from_slice(frame);
                slot.data.set(buf);
                slot.len.set(frame.len() as u16);
                return true;
            }
        }
        false
    }
}

impl<const N: usize, const MTU: usize> NicDriver for PollingRing<N, MTU> {
    fn dev_read(&mut self, out: &mut [u8]) -> Result<usize, NicError> {
        if N == 0 {
            return Ok(0);
        }
        for _ in 0..N {
            let idx = self.rx_cursor.get();
            self.rx_cursor.set((idx + 1) % N);
            let slot = &self.rx[idx];
            let len = slot.len.get() as usize;
            if len == 0 {
                continue;
            }
            if len > out.len() {
                return Err(NicError::InvalidParameter);
            }
            let data = slot.data.get();
            out[..len].copy_from_slice(&data[..len]);
            slot.len.set(0);
            return Ok(len);
        }
        Ok(0)
    }

    fn dev_write(&mut self, frame: &[u8]) -> Result<(), NicError> {
        if frame.len() > MTU {
            return Err(NicError::InvalidParameter);
        }
        if self.tx_pending.get() {
            return Err(NicError::TryAgain);
        }
        let mut buf = [0u8; MTU];
        buf[..frame.len()].copy_from_slice(frame);
        self.tx.data.set(buf);
        self.tx.len.set(frame.len() as u16);
        self.tx_pending.set(true);
        Ok(())
    }

    fn get_mac_address(&self) -> [u8; 6] {
        self.mac
    }

    fn notify_send(&mut self) {
        // The polling transport has no doorbell; the peer is expected to
        // poll `tx` itself on its own schedule.
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_drains_injected_frame_and_clears_the_slot() {
        let mut ring: PollingRing<4, 256> = PollingRing::new([0; 6]);
        assert!(ring.inject_rx_frame(&[1, 2, 3]));
        let mut out = [0u8; 256];
        let n = ring.dev_read(&mut out).unwrap();
        assert_eq!(n, 3);
        assert_eq!(&out[..3], &[1, 2, 3]);
        // Second read finds nothing: the slot was cleared.
        assert_eq!(ring.dev_read(&mut out).unwrap(), 0);
    }

    #[test]
    fn write_rejects_oversized_frame_without_blocking_future_writes() {
        let mut ring: PollingRing<1, 8> = PollingRing::new([0; 6]);
        assert_eq!(ring.dev_write(&[0u8; 9]), Err(NicError::InvalidParameter));
        assert_eq!(ring.dev_write(&[1, 2, 3]), Ok(()));
    }

    #[test]
    fn second_write_before_drain_is_try_again() {
        let mut ring: PollingRing<1, 8> = PollingRing::new([0; 6]);
        ring.dev_write(&[1]).unwrap();
        assert_eq!(ring.dev_write(&[2]), Err(NicError::TryAgain));
    }

    #[test]
    fn round_robin_cursor_does_not_starve_later_slots() {
        let ring: PollingRing<3, 16> = PollingRing::new([0; 6]);
        ring.inject_rx_frame(&[9]);
        ring.inject_rx_frame(&[9]);
        ring.inject_rx_frame(&[9]);
        let mut ring = ring;
        let mut out = [0u8; 16];
        for _ in 0..3 {
            assert_eq!(ring.dev_read(&mut out).unwrap(), 1);
        }
        assert_eq!(ring.dev_read(&mut out).unwrap(), 0);
    }
}
