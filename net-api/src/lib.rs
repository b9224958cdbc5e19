// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Client API for the network stack server: the error taxonomy, wire
//! types, and event-record layout shared by every caller, plus the
//! Idol-generated `Net` client stub.

#![no_std]

use derive_idol_err::IdolError;
use hubpack::SerializedSize;
use serde::{Deserialize, Serialize};
use userlib::*;
use zerocopy::{Immutable, IntoBytes, KnownLayout};

/// Error taxonomy returned by every stack RPC. `Ok(())`/`Ok(value)` at the
/// Idol layer is encoded as `0`, so none of these may be `0`.
#[derive(
    Copy,
    Clone,
    Debug,
    Eq,
    PartialEq,
    FromPrimitive,
    IdolError,
    SerializedSize,
    Serialize,
    Deserialize,
)]
#[repr(u32)]
pub enum NetError {
    /// Null argument, unparseable IPv4 text, or an out-of-range enum value.
    InvalidParameter = 1,
    /// Handle out of range, slot free, or owner mismatch.
    InvalidHandle = 2,
    /// Operation not valid for this socket's type (e.g. `sendto` on STREAM).
    NetworkProto = 3,
    /// Stream read/write attempted on an unconnected socket.
    NetworkConnNone = 4,
    /// Component not yet RUNNING, or the NIC driver isn't ready.
    NotInitialized = 5,
    /// Component reached FATAL_ERROR; terminal.
    Aborted = 6,
    /// `configIpAddr` attempted outside UNINITIALIZED.
    InvalidState = 7,
    /// `configIpAddr` attempted when the IP configuration is build-baked.
    OperationDenied = 8,
    /// More clients presented badges than the manifest configured.
    OutOfBounds = 9,
    /// `getPendingEvents` budget too small for even one event record.
    BufferTooSmall = 10,
    /// The socket pool has no free slot for this client's quota.
    InsufficientSpace = 11,
    /// Engine or driver failure with no more specific category.
    Generic = 12,

    /// Server restarted out from under an in-flight call.
    #[idol(server_death)]
    ServerRestarted = 13,
}

impl From<idol_runtime::ServerDeath> for NetError {
    fn from(_: idol_runtime::ServerDeath) -> Self {
        NetError::ServerRestarted
    }
}

/// One saturating counter per `NetError` variant, indexed by discriminant
/// minus one. Built on `counters::Counter` rather than the crate's
/// `counters!` macro: that macro implements `Sync` for a foreign array of a
/// foreign element type, which the orphan rules don't allow, so it can't
/// actually be used from here.
pub struct NetErrorCounters([counters::Counter; NetError::COUNT]);

impl NetErrorCounters {
    pub const fn new() -> Self {
        Self([const { counters::Counter::new() }; NetError::COUNT])
    }

    pub fn get(&self, err: NetError) -> u32 {
        self.0[NetError::index(err)].get()
    }
}

impl Default for NetErrorCounters {
    fn default() -> Self {
        Self::new()
    }
}

impl counters::Count for NetError {
    type Counters = NetErrorCounters;

    fn count(&self, counters: &Self::Counters) {
        counters.0[Self::index(*self)].increment();
    }
}

impl NetError {
    const COUNT: usize = 13;

    fn index(self) -> usize {
        self as u32 as usize - 1
    }
}

/// Handle returned by `create`/`accept`: a small non-negative index into the
/// stack's fixed socket table. Never constructed by a client; always
/// returned by the server and passed back verbatim.
pub type SocketHandle = u32;

/// Sentinel used in `EventRecord::parent_handle` when a slot has no parent
/// (was not produced by `accept`), and in `AcceptResult`/etc. wherever "no
/// handle" needs to be distinguished from a valid handle of `0`.
pub const NO_HANDLE: i32 = -1;

#[derive(
    Copy, Clone, Debug, Eq, PartialEq, FromPrimitive, SerializedSize, Serialize, Deserialize,
)]
#[repr(u8)]
pub enum SocketDomain {
    Inet = 0,
}

#[derive(
    Copy, Clone, Debug, Eq, PartialEq, FromPrimitive, SerializedSize, Serialize, Deserialize,
)]
#[repr(u8)]
pub enum SocketKind {
    Stream = 0,
    Dgram = 1,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, SerializedSize, Serialize, Deserialize)]
pub struct SocketAddrV4 {
    pub addr: [u8; 4],
    pub port: u16,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, SerializedSize, Serialize, Deserialize)]
#[repr(u8)]
pub enum ComponentState {
    Uninitialized = 0,
    Initialized = 1,
    Running = 2,
    FatalError = 3,
}

pub mod event_bits {
    /// Self-describing: cleared from the mask the moment a harvest
    /// observes it.
    pub const CONN_EST: u16 = 1 << 0;
    pub const WRITE: u16 = 1 << 1;
    pub const ERROR: u16 = 1 << 2;
    /// Sticky: survives harvest until the RPC that consumes the underlying
    /// condition runs (`read`/`recvfrom`, `accept`, `close`/teardown ack).
    pub const READ: u16 = 1 << 3;
    pub const CONN_ACPT: u16 = 1 << 4;
    pub const CLOSED: u16 = 1 << 5;

    pub const SELF_DESCRIBING: u16 = CONN_EST | WRITE | ERROR;
    pub const STICKY: u16 = READ | CONN_ACPT | CLOSED;
}

/// One entry of the array `getPendingEvents` appends to a client's
/// dataport. Packed little-endian, exactly 14 bytes; clients rely on this
/// exact size to chunk a byte budget into records.
#[derive(
    Copy, Clone, Debug, Eq, PartialEq, IntoBytes, Immutable, KnownLayout,
)]
#[repr(C, packed)]
pub struct EventRecord {
    pub mask: u16,
    pub socket_handle: i32,
    pub parent_socket_handle: i32,
    pub current_error: i32,
}

impl EventRecord {
    pub const SIZE: usize = core::mem::size_of::<Self>();
}

const _: () = assert!(EventRecord::SIZE >= 14);

include!(concat!(env!("OUT_DIR"), "/client_stub.rs"));
