// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-client event harvesting: turning pending socket event bits into the
//! `EventRecord` array a client reads out of `getPendingEvents`.
//!
//! Harvesting is a scan of the whole socket table starting at the client's
//! `head` cursor and wrapping modulo the table size, so one client's
//! events are never skipped or duplicated by another client's slots
//! sharing the same table.

use net_api::{event_bits, EventRecord, NO_HANDLE};

use crate::sockets::{SlotStatus, SocketTable};

/// Visits slots owned by `client_index` starting at its `head` cursor,
/// wrapping modulo the table size, emitting at most `max_records` events
/// and never visiting more than `num_sockets` slots in one call.
///
/// Self-describing bits (`CONN_EST`/`WRITE`/`ERROR`) are cleared the
/// instant they're observed; sticky bits (`READ`/`CONN_ACPT`/`CLOSED`)
/// are left set for the RPC that actually consumes the condition. The
/// client's `tail` always ends the call equal to `head`; `head` only
/// advances past a slot once it's been visited. If the scan is cut short
/// by `max_records` rather than running out of slots to look at, the
/// client is flagged to be notified again so it comes back for the rest.
///
/// Returns the number of records emitted.
pub fn harvest_events<const N: usize, const C: usize>(
    table: &mut SocketTable<N, C>,
    client_index: usize,
    max_records: usize,
    mut emit: impl FnMut(EventRecord),
) -> usize {
    let num_sockets = table.num_sockets();
    if num_sockets == 0 || max_records == 0 {
        return 0;
    }

    let start = table.client(client_index).head;
    let stop = table.client(client_index).tail;
    let mut pos = start;
    let mut emitted = 0usize;
    let mut cut_short = false;

    for i in 0..num_sockets {
        if i > 0 && pos == stop {
            break;
        }
        if emitted == max_records {
            cut_short = true;
            break;
        }

        if let Some(record) = harvest_one(table, client_index, pos) {
            emit(record);
            emitted += 1;
        }

        pos = (pos + 1) % num_sockets;
    }

    let client = table.client_mut(client_index);
    client.head = pos;
    client.tail = client.head;
    if cut_short {
        client.needs_to_be_notified = true;
    }

    emitted
}

/// Flags every client owning at least one in-use slot with a nonzero event
/// mask, independent of whether that client has ever called
/// `getPendingEvents`. The pump's fan-out pass runs this after every
/// engine poll so a client is woken the first time an event lands on one
/// of its sockets, not only on its next harvest call.
pub fn mark_clients_with_pending_events<const N: usize, const C: usize>(
    table: &mut SocketTable<N, C>,
) {
    let mut to_notify = [false; C];
    for handle in 0..table.num_sockets() {
        let Some(slot) = table.slot(handle) else { continue };
        if slot.status != SlotStatus::InUse || slot.event_mask == 0 {
            continue;
        }
        let Some(owner) = slot.owner_client_id else { continue };
        if let Some(idx) = table.client_id_to_index(owner) {
            to_notify[idx] = true;
        }
    }
    for (idx, flag) in to_notify.iter().enumerate() {
        if *flag {
            table.client_mut(idx).needs_to_be_notified = true;
        }
    }
}

/// Produces an `EventRecord` for `handle` if it's an in-use slot owned by
/// `client_index` with a nonzero mask, clearing self-describing bits in
/// the same step.
fn harvest_one<const N: usize, const C: usize>(
    table: &mut SocketTable<N, C>,
    client_index: usize,
    handle: usize,
) -> Option<EventRecord> {
    let client_id = table.client(client_index).client_id;
    let slot = table.slot(handle)?;
    if slot.status != SlotStatus::InUse || slot.owner_client_id != Some(client_id) {
        return None;
    }
    if slot.event_mask == 0 {
        return None;
    }

    let mask = slot.event_mask;
    let parent_socket_handle = slot
        .parent_handle
        .map(|p| p as i32)
        .unwrap_or(NO_HANDLE);
    let current_error = slot
        .current_error
        .map(|e| u32::from(e) as i32)
        .unwrap_or(0);

    let record = EventRecord {
        mask,
        socket_handle: handle as i32,
        parent_socket_handle,
        current_error,
    };

    table.slot_mut(handle).expect("handle just proved valid above").event_mask =
        mask & !event_bits::SELF_DESCRIBING;

    Some(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sockets::SocketTable;

    fn table() -> SocketTable<4, 1> {
        SocketTable::new(&[(7, 4)])
    }

    // Invariant 5: self-describing bits clear on harvest, sticky bits
    // survive.
    #[test]
    fn self_describing_bits_clear_sticky_bits_remain() {
        let mut t = table();
        let h = t.reserve_handle(1, 7).unwrap();
        t.set_event_bits(h, event_bits::WRITE | event_bits::READ, None);

        let mut out = vec![];
        let n = harvest_events(&mut t, 0, 10, |r| out.push(r));
        assert_eq!(n, 1);
        assert_eq!(out[0].mask, event_bits::WRITE | event_bits::READ);
        assert_eq!(t.slot(h).unwrap().event_mask, event_bits::READ);
    }

    // Invariant 6: tail always ends equal to head.
    #[test]
    fn tail_always_tracks_head_after_harvest() {
        let mut t = table();
        let h = t.reserve_handle(1, 7).unwrap();
        t.set_event_bits(h, event_bits::CONN_EST, None);
        harvest_events(&mut t, 0, 10, |_| {});
        let c = t.client(0);
        assert_eq!(c.head, c.tail);
    }

    // Invariant 8 / S5: a scan cut short by the record cap sets
    // needs_to_be_notified and leaves head at the next unvisited slot.
    #[test]
    fn cap_limited_scan_requests_renotification_and_resumes_where_it_stopped() {
        let mut t = table();
        let h0 = t.reserve_handle(1, 7).unwrap();
        let h1 = t.reserve_handle(2, 7).unwrap();
        let h2 = t.reserve_handle(3, 7).unwrap();
        for h in [h0, h1, h2] {
            t.set_event_bits(h, event_bits::WRITE, None);
        }

        let mut out = vec![];
        let n = harvest_events(&mut t, 0, 2, |r| out.push(r));
        assert_eq!(n, 2);
        assert!(t.client(0).needs_to_be_notified);
        assert_eq!(t.client(0).head, h2);

        out.clear();
        let n2 = harvest_events(&mut t, 0, 10, |r| out.push(r));
        assert_eq!(n2, 1);
        assert_eq!(out[0].socket_handle, h2 as i32);
    }

    #[test]
    fn empty_table_scan_with_equal_head_and_tail_visits_every_slot_once() {
        let mut t = table();
        let h0 = t.reserve_handle(1, 7).unwrap();
        t.set_event_bits(h0, event_bits::ERROR, None);
        // head == tail == 0 here; the scan must still visit slot 0 rather
        // than treating an empty range as "nothing to do".
        let mut out = vec![];
        let n = harvest_events(&mut t, 0, 10, |r| out.push(r));
        assert_eq!(n, 1);
        assert_eq!(out[0].socket_handle, h0 as i32);
    }

    #[test]
    fn mark_clients_with_pending_events_flags_owners_without_a_harvest_call() {
        let mut t = table();
        let h = t.reserve_handle(1, 7).unwrap();
        assert!(!t.client(0).needs_to_be_notified);
        t.set_event_bits(h, event_bits::WRITE, None);
        mark_clients_with_pending_events(&mut t);
        assert!(t.client(0).needs_to_be_notified);
    }

    #[test]
    fn mark_clients_with_pending_events_ignores_slots_with_an_empty_mask() {
        let mut t = table();
        t.reserve_handle(1, 7).unwrap();
        mark_clients_with_pending_events(&mut t);
        assert!(!t.client(0).needs_to_be_notified);
    }

    #[test]
    fn parent_handle_surfaces_as_no_handle_sentinel_when_absent() {
        let mut t = table();
        let h = t.reserve_handle(1, 7).unwrap();
        t.set_event_bits(h, event_bits::CONN_EST, None);
        let mut out = vec![];
        harvest_events(&mut t, 0, 10, |r| out.push(r));
        assert_eq!(out[0].parent_socket_handle, NO_HANDLE);
    }
}
