// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The virtqueue transport: descriptors addressed by a 32-bit
//! `(buffer_id << 24) | offset` encoding into a fixed pool of shared
//! buffers, rather than raw physical addresses. This lets the component
//! hand descriptors to a peer without exposing real memory addresses
//! across the trust boundary.
//!
//! In-flight receive descriptors are tracked in a small internal FIFO
//! (capacity 256, matching the largest buffer-id space the encoding can
//! address); exceeding it or failing to decode a descriptor is treated
//! as fatal to the pump pass that discovered it, since it means the peer
//! and this component have lost sync on queue state.

use crate::{NicDriver, NicError};

/// Largest number of buffer ids in flight at once; also the width of the
/// 8-bit id field in the descriptor encoding.
pub const FIFO_CAPACITY: usize = 256;

/// Splits a descriptor address into its buffer id and byte offset.
pub fn decode_descriptor(addr: u32) -> (u8, u32) {
    let id = (addr >> 24) as u8;
    let offset = addr & 0x00ff_ffff;
    (id, offset)
}

pub fn encode_descriptor(id: u8, offset: u32) -> Result<u32, NicError> {
    if offset > 0x00ff_ffff {
        return Err(NicError::InvalidParameter);
    }
    Ok((u32::from(id) << 24) | offset)
}

/// Fixed-capacity FIFO of pending receive buffer ids, used to track which
/// descriptors the peer has returned to us but the pump hasn't drained
/// yet. Pushing onto a full queue is the overflow condition the transport
/// treats as fatal.
pub struct DescriptorFifo {
    slots: [u8; FIFO_CAPACITY],
    head: usize,
    len: usize,
}

impl DescriptorFifo {
    pub const fn new() -> Self {
        Self { slots: [0; FIFO_CAPACITY], head: 0, len: 0 }
    }

    pub fn push(&mut self, id: u8) -> Result<(), NicError> {
        if self.len == FIFO_CAPACITY {
            return Err(NicError::Fatal);
        }
        let tail = (self.head + self.len) % FIFO_CAPACITY;
        self.slots[tail] = id;
        self.len += 1;
        Ok(())
    }

    pub fn pop(&mut self) -> Option<u8> {
        if self.len == 0 {
            return None;
        }
        let id = self.slots[self.head];
        self.head = (self.head + 1) % FIFO_CAPACITY;
        self.len -= 1;
        Some(id)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Default for DescriptorFifo {
    fn default() -> Self {
        Self::new()
    }
}

const BUFFER_SIZE: usize = 1536;

/// Virtqueue-backed NIC transport over a pool of `NUM_BUFFERS` fixed-size
/// buffers, each addressable by `(id << 24) | offset`.
pub struct VirtQueue<const NUM_BUFFERS: usize> {
    buffers: [[u8; BUFFER_SIZE]; NUM_BUFFERS],
    rx_ready: DescriptorFifo,
    free_ids: DescriptorFifo,
    mac: [u8; 6],
}

impl<const NUM_BUFFERS: usize> VirtQueue<NUM_BUFFERS> {
    pub fn new(mac: [u8; 6]) -> Self {
        assert!(NUM_BUFFERS <= FIFO_CAPACITY, "buffer pool must fit the 8-bit id space");
        let mut free_ids = DescriptorFifo::new();
        for id in 0..NUM_BUFFERS {
            free_ids.push(id as u8).expect("pool fits FIFO_CAPACITY by construction");
        }
        Self {
            buffers: [[0; BUFFER_SIZE]; NUM_BUFFERS],
            rx_ready: DescriptorFifo::new(),
            free_ids,
            mac,
        }
    }

    /// Test/simulation hook standing in for the peer delivering a filled
    /// buffer: copies `frame` into a free buffer and marks it ready for
    /// `dev_read` to drain.
    #[cfg(test)]
    pub fn inject_rx_frame(&mut self, frame: &[u8]) -> Result<(), NicError> {
        let id = self.free_ids.pop().ok_or(NicError::Fatal)?;
        self.buffers[id as usize][..frame.len()].copy_from_slice(frame);
        self.rx_ready.push(id)
    }

    fn decode_and_validate(&self, addr: u32, need_len: usize) -> Result<(u8, u32), NicError> {
        let (id, offset) = decode_descriptor(addr);
        if id as usize >= NUM_BUFFERS {
            return Err(NicError::Fatal);
        }
        if offset as usize + need_len > BUFFER_SIZE {
            return Err(NicError::Fatal);
        }
        Ok((id, offset))
    }
}

impl<const NUM_BUFFERS: usize> NicDriver for VirtQueue<NUM_BUFFERS> {
    fn dev_read(&mut self, out: &mut [u8]) -> Result<usize, NicError> {
        let Some(id) = self.rx_ready.pop() else {
            return Ok(0);
        };
        // The length actually written by the peer isn't separately
        // recorded in this simplified pool, so the caller's buffer
        // length bounds how much we hand back; real frame length is
        // carried at a higher layer once this returns.
        let len = out.len().min(BUFFER_SIZE);
        out[..len].copy_from_slice(&self.buffers[id as usize][..len]);
        self.free_ids.push(id)?;
        Ok(len)
    }

    fn dev_write(&mut self, frame: &[u8]) -> Result<(), NicError> {
        let id = self.free_ids.pop().ok_or(NicError::TryAgain)?;
        if frame.len() > BUFFER_SIZE {
            self.free_ids.push(id)?;
            return Err(NicError::InvalidParameter);
        }
        let (id, offset) = self.decode_and_validate(
            encode_descriptor(id, 0)?,
            frame.len(),
        )?;
        self.buffers[id as usize][offset as usize..offset as usize + frame.len()]
            .copy_from_slice(frame);
        self.rx_ready.push(id)
    }

    fn get_mac_address(&self) -> [u8; 6] {
        self.mac
    }

    fn notify_send(&mut self) {
        // A real virtio backend would kick the notify register here;
        // the pool above is drained synchronously by the peer side in
        // this simulation.
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_round_trips_through_encode_and_decode() {
        let addr = encode_descriptor(7, 1234).unwrap();
        assert_eq!(decode_descriptor(addr), (7, 1234));
    }

    #[test]
    fn encode_rejects_offset_outside_24_bits() {
        assert_eq!(
            encode_descriptor(0, 0x0100_0000),
            Err(NicError::InvalidParameter)
        );
    }

    #[test]
    fn fifo_is_first_in_first_out() {
        let mut fifo = DescriptorFifo::new();
        fifo.push(1).unwrap();
        fifo.push(2).unwrap();
        assert_eq!(fifo.pop(), Some(1));
        assert_eq!(fifo.pop(), Some(2));
        assert_eq!(fifo.pop(), None);
    }

    #[test]
    fn fifo_overflow_is_fatal() {
        let mut fifo = DescriptorFifo::new();
        for i in 0..FIFO_CAPACITY {
            fifo.push(i as u8).unwrap();
        }
        assert_eq!(fifo.push(0), Err(NicError::Fatal));
    }

    #[test]
    fn read_drains_injected_frame_and_recycles_the_buffer_id() {
        let mut vq: VirtQueue<4> = VirtQueue::new([0; 6]);
        vq.inject_rx_frame(&[1, 2, 3]).unwrap();
        let mut out = [0u8; BUFFER_SIZE];
        let n = vq.dev_read(&mut out).unwrap();
        assert_eq!(n, BUFFER_SIZE.min(out.len()));
        assert_eq!(&out[..3], &[1, 2, 3]);
        assert_eq!(vq.free_ids.len(), 4);
    }

    #[test]
    fn write_exhausting_the_pool_reports_try_again() {
        let mut vq: VirtQueue<1> = VirtQueue::new([0; 6]);
        vq.dev_write(&[1, 2]).unwrap();
        // The sole buffer id was handed off to rx_ready by the write
        // above and never recycled by a read, so the pool is empty.
        assert_eq!(vq.dev_write(&[3]), Err(NicError::TryAgain));
    }
}
