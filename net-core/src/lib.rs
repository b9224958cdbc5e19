// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Platform-independent heart of the network stack server: the socket
//! table and handle multiplexer, the event queue and harvest logic, and
//! the component lifecycle state machine.
//!
//! None of this module touches the protocol engine, the NIC, or IPC — it
//! is built `no_std` for the embedded task but left host-testable (see the
//! crate-level `cfg_attr` below) the same way `lib/snitch-core` is in the
//! teacher's tree, so the invariants and scenarios that matter can run as
//! ordinary `#[test]`s instead of only being exercisable on hardware.

#![cfg_attr(not(test), no_std)]

pub mod events;
pub mod lifecycle;
pub mod mutex;
pub mod sockets;

pub use net_api::NetError;
