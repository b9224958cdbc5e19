// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! End-to-end scenarios composing the socket table, event harvest, and
//! NIC fallback gate the way the pump drives them together, without
//! bringing up a real `smoltcp` interface or kernel IPC transport.

use net_api::event_bits;
use net_core::events::harvest_events;
use net_core::sockets::{ReserveError, SlotType, SocketTable};
use net_nic::{FallbackGate, GateOutcome, NicError};

const ALICE: u16 = 10;
const BOB: u16 = 20;

fn roster() -> SocketTable<4, 2> {
    SocketTable::new(&[(ALICE, 2), (BOB, 1)])
}

/// Scenario: TCP accept hands a freshly-minted child socket to the
/// listener's owner, never to whichever client happens to call `accept`
/// first — ownership is established at `accept` time, not guessed from
/// the caller.
#[test]
fn tcp_accept_assigns_ownership_to_the_listener_not_the_caller() {
    let mut table = roster();
    let listener = table.reserve_handle(1, ALICE).unwrap();
    table.set_socket_type(listener, SlotType::Stream);
    table.bump_pending_connections(listener);

    assert!(table.take_pending_connection(listener));
    let child = table.reserve_handle(2, ALICE).unwrap();
    table.set_parent_handle(child, listener).unwrap();

    assert_eq!(table.slot(child).unwrap().owner_client_id, Some(ALICE));
    // Bob can never touch Alice's accepted child, even by guessing its
    // handle number.
    assert_eq!(table.check_owner(child, BOB), Err(net_api::NetError::InvalidHandle));
}

/// Scenario: once a client is at quota, further `create` calls observe
/// `INSUFFICIENT_SPACE` and the client's other sockets are unaffected.
#[test]
fn quota_exhaustion_reports_insufficient_space_without_disturbing_existing_sockets() {
    let mut table = roster();
    let h0 = table.reserve_handle(1, BOB).unwrap();
    assert_eq!(table.reserve_handle(2, BOB), Err(ReserveError::QuotaExceeded));
    // The socket Bob already has is untouched by the rejected request.
    assert_eq!(table.slot(h0).unwrap().owner_client_id, Some(BOB));
}

/// Scenario: a client harvesting its events across two passes sees every
/// event exactly once even when the harvest is split by a small byte
/// budget, matching what a client chunking `getPendingEvents` calls would
/// observe.
#[test]
fn paged_event_harvest_covers_every_pending_event_exactly_once() {
    let mut table = roster();
    let handles: Vec<usize> = (0..3).map(|i| table.reserve_handle(i, ALICE).unwrap()).collect();
    for &h in &handles {
        table.set_event_bits(h, event_bits::WRITE, None);
    }

    let client_index = table.client_id_to_index(ALICE).unwrap();
    let mut seen = Vec::new();
    loop {
        let mut page = Vec::new();
        let n = harvest_events(&mut table, client_index, 1, |r| page.push(r));
        if n == 0 {
            break;
        }
        seen.extend(page);
        if !table.client(client_index).needs_to_be_notified {
            break;
        }
    }

    let mut seen_handles: Vec<i32> = seen.iter().map(|r| r.socket_handle).collect();
    seen_handles.sort_unstable();
    let mut expected: Vec<i32> = handles.iter().map(|&h| h as i32).collect();
    expected.sort_unstable();
    assert_eq!(seen_handles, expected);
}

/// Scenario: a driver that reports NOT_IMPLEMENTED before this component
/// ever detects the capability falls back to the legacy ring permanently
/// rather than aborting the component.
#[test]
fn driver_missing_a_capability_falls_back_instead_of_aborting() {
    let gate = FallbackGate::new();
    assert_eq!(gate.classify(NicError::NotImplemented), GateOutcome::PermanentFallback);

    let mut gate = FallbackGate::new();
    gate.mark_detected();
    assert_eq!(gate.classify(NicError::NotImplemented), GateOutcome::Fatal);
}
