// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The socket table: a fixed pool of `N` slots shared by `C` configured
//! clients under per-client quotas.
//!
//! A slot is exclusively owned by one client for its entire `InUse`
//! lifetime; every operation that resolves a handle re-checks ownership
//! rather than trusting a previously-resolved index, since a caller is
//! never trusted further than the badge the kernel attached to its
//! message.

use net_api::NetError;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SlotStatus {
    Free,
    InUse,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SlotType {
    Unspec,
    Stream,
    Dgram,
}

impl From<net_api::SocketKind> for SlotType {
    fn from(k: net_api::SocketKind) -> Self {
        match k {
            net_api::SocketKind::Stream => SlotType::Stream,
            net_api::SocketKind::Dgram => SlotType::Dgram,
        }
    }
}

#[derive(Copy, Clone, Debug)]
pub struct Slot {
    pub status: SlotStatus,
    pub owner_client_id: Option<u16>,
    pub parent_handle: Option<usize>,
    pub socket_type: SlotType,
    pub connected: bool,
    pub pending_connections: u8,
    pub event_mask: u16,
    pub current_error: Option<NetError>,
    pub engine_socket: Option<usize>,
}

impl Slot {
    const fn sentinel() -> Self {
        Self {
            status: SlotStatus::Free,
            owner_client_id: None,
            parent_handle: None,
            socket_type: SlotType::Unspec,
            connected: false,
            pending_connections: 0,
            event_mask: 0,
            current_error: None,
            engine_socket: None,
        }
    }

    /// The slot's `io_buffer` is never owned by the slot itself — it's the
    /// owning client's dataport, looked up by client id at the layer that
    /// actually maps shared memory.
    pub fn io_buffer_owner(&self) -> Option<u16> {
        self.owner_client_id
    }
}

impl Default for Slot {
    fn default() -> Self {
        Self::sentinel()
    }
}

#[derive(Copy, Clone, Debug)]
pub struct ClientRecord {
    pub client_id: u16,
    pub in_use: bool,
    pub socket_quota: u16,
    pub current_sockets_in_use: u16,
    pub needs_to_be_notified: bool,
    pub head: usize,
    pub tail: usize,
}

impl ClientRecord {
    const fn unconfigured() -> Self {
        Self {
            client_id: 0,
            in_use: false,
            socket_quota: 0,
            current_sockets_in_use: 0,
            needs_to_be_notified: false,
            head: 0,
            tail: 0,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ReserveError {
    UnknownClient,
    QuotaExceeded,
    NoFreeSlot,
}

impl From<ReserveError> for NetError {
    fn from(e: ReserveError) -> Self {
        match e {
            // A badge the RPC transport itself authenticated but that
            // isn't in the configured roster indicates more clients than
            // the manifest provisioned for.
            ReserveError::UnknownClient => NetError::OutOfBounds,
            ReserveError::QuotaExceeded | ReserveError::NoFreeSlot => {
                NetError::InsufficientSpace
            }
        }
    }
}

pub struct SocketTable<const N: usize, const C: usize> {
    slots: [Slot; N],
    clients: [ClientRecord; C],
}

impl<const N: usize, const C: usize> SocketTable<N, C> {
    /// Builds the table from a client roster (`(badge, quota)` pairs, in
    /// manifest order). Every roster entry becomes an `in_use` client
    /// record; client records are never destroyed afterward.
    pub fn new(roster: &[(u16, u16)]) -> Self {
        assert_eq!(roster.len(), C, "roster length must match client capacity");
        let mut clients = [ClientRecord::unconfigured(); C];
        for (i, &(client_id, quota)) in roster.iter().enumerate() {
            clients[i] = ClientRecord {
                client_id,
                in_use: true,
                socket_quota: quota,
                current_sockets_in_use: 0,
                needs_to_be_notified: false,
                head: 0,
                tail: 0,
            };
        }
        Self { slots: [Slot::sentinel(); N], clients }
    }

    pub fn num_sockets(&self) -> usize {
        N
    }

    pub fn client_id_to_index(&self, client_id: u16) -> Option<usize> {
        self.clients
            .iter()
            .position(|c| c.in_use && c.client_id == client_id)
    }

    pub fn client(&self, index: usize) -> &ClientRecord {
        &self.clients[index]
    }

    pub fn client_mut(&mut self, index: usize) -> &mut ClientRecord {
        &mut self.clients[index]
    }

    pub fn clients(&self) -> &[ClientRecord] {
        &self.clients
    }

    pub fn slot(&self, handle: usize) -> Option<&Slot> {
        self.slots.get(handle)
    }

    pub(crate) fn slot_mut(&mut self, handle: usize) -> Option<&mut Slot> {
        self.slots.get_mut(handle)
    }

    /// Overwrites the engine-socket identity already stored for `handle`.
    /// `reserve_handle` takes a placeholder value since the real engine
    /// socket can only be minted once the handle index is known; this
    /// fixes it up to the real value right afterward.
    pub fn set_engine_socket(&mut self, handle: usize, value: usize) {
        if let Some(s) = self.slot_mut(handle) {
            s.engine_socket = Some(value);
        }
    }

    pub fn engine_socket_of(&self, handle: usize) -> Option<usize> {
        self.slot(handle).and_then(|s| s.engine_socket)
    }

    /// Linear scan from engine socket back to handle; the engine adapter
    /// uses this when a callback carries only the engine's own socket
    /// identity.
    pub fn handle_of_engine_socket(&self, engine_socket: usize) -> Option<usize> {
        self.slots.iter().position(|s| {
            s.status == SlotStatus::InUse && s.engine_socket == Some(engine_socket)
        })
    }

    /// Resolves `handle` and checks that `client_id` owns it. Every
    /// data-plane RPC goes through this before touching slot state;
    /// mismatch or an out-of-range/free handle both yield `InvalidHandle`
    /// without mutating anything.
    pub fn check_owner(&self, handle: usize, client_id: u16) -> Result<usize, NetError> {
        match self.slot(handle) {
            Some(s) if s.status == SlotStatus::InUse && s.owner_client_id == Some(client_id) => {
                Ok(handle)
            }
            _ => Err(NetError::InvalidHandle),
        }
    }

    /// Allocates the lowest-index free slot for `client_id`, owning
    /// `engine_socket`. Fails without mutating state if the client is
    /// unknown or already at quota, or if the table has no free slot.
    pub fn reserve_handle(
        &mut self,
        engine_socket: usize,
        client_id: u16,
    ) -> Result<usize, ReserveError> {
        let client_index = self
            .client_id_to_index(client_id)
            .ok_or(ReserveError::UnknownClient)?;
        let client = &self.clients[client_index];
        if client.current_sockets_in_use >= client.socket_quota {
            return Err(ReserveError::QuotaExceeded);
        }
        let handle = self
            .slots
            .iter()
            .position(|s| s.status == SlotStatus::Free)
            .ok_or(ReserveError::NoFreeSlot)?;

        self.slots[handle] = Slot {
            status: SlotStatus::InUse,
            owner_client_id: Some(client_id),
            engine_socket: Some(engine_socket),
            ..Slot::sentinel()
        };
        self.clients[client_index].current_sockets_in_use += 1;
        Ok(handle)
    }

    /// Frees `handle`, which must be `InUse` and owned by `client_id`.
    /// Returns `InvalidHandle` and leaves everything untouched otherwise.
    pub fn free_handle(&mut self, handle: usize, client_id: u16) -> Result<(), NetError> {
        self.check_owner(handle, client_id)?;
        let client_index = self
            .client_id_to_index(client_id)
            .expect("check_owner already proved this client is in_use");
        self.clients[client_index].current_sockets_in_use -= 1;
        self.slots[handle] = Slot::sentinel();
        Ok(())
    }

    /// Records `parent` on `child` and adopts the parent's owner, for use
    /// immediately after `accept` mints a new engine socket.
    pub fn set_parent_handle(&mut self, child: usize, parent: usize) -> Result<(), NetError> {
        let parent_owner = self
            .slot(parent)
            .filter(|s| s.status == SlotStatus::InUse)
            .and_then(|s| s.owner_client_id)
            .ok_or(NetError::InvalidHandle)?;
        let child_slot = self.slot_mut(child).ok_or(NetError::InvalidHandle)?;
        child_slot.parent_handle = Some(parent);
        child_slot.owner_client_id = Some(parent_owner);
        Ok(())
    }

    pub fn set_socket_type(&mut self, handle: usize, kind: SlotType) {
        if let Some(s) = self.slot_mut(handle) {
            s.socket_type = kind;
        }
    }

    pub fn set_connected(&mut self, handle: usize, connected: bool) {
        if let Some(s) = self.slot_mut(handle) {
            s.connected = connected;
        }
    }

    pub fn bump_pending_connections(&mut self, handle: usize) {
        if let Some(s) = self.slot_mut(handle) {
            s.pending_connections = s.pending_connections.saturating_add(1);
        }
    }

    pub fn take_pending_connection(&mut self, handle: usize) -> bool {
        match self.slot_mut(handle) {
            Some(s) if s.pending_connections > 0 => {
                s.pending_connections -= 1;
                true
            }
            _ => false,
        }
    }

    /// Sets event-mask bits and, for an error bit, the latched error code.
    /// Called from engine callbacks running under the pump; never
    /// re-enters any lock of its own (see `docs/DESIGN.md` on re-entrant
    /// engine calls).
    pub fn set_event_bits(&mut self, handle: usize, bits: u16, error: Option<NetError>) {
        if let Some(s) = self.slot_mut(handle) {
            s.event_mask |= bits;
            if let Some(e) = error {
                s.current_error = Some(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> SocketTable<4, 2> {
        SocketTable::new(&[(10, 2), (20, 1)])
    }

    // Invariant 1: FREE iff all sentinel fields.
    #[test]
    fn free_slots_are_fully_sentinel() {
        let t = table();
        for h in 0..4 {
            let s = t.slot(h).unwrap();
            assert_eq!(s.status, SlotStatus::Free);
            assert!(s.engine_socket.is_none());
            assert!(s.owner_client_id.is_none());
            assert_eq!(s.event_mask, 0);
        }
    }

    // Invariant 2: current_sockets_in_use matches the count of owned
    // in-use slots, and never exceeds quota.
    #[test]
    fn in_use_count_matches_owned_slots_and_respects_quota() {
        let mut t = table();
        let h1 = t.reserve_handle(100, 10).unwrap();
        let h2 = t.reserve_handle(101, 10).unwrap();
        let idx = t.client_id_to_index(10).unwrap();
        assert_eq!(t.client(idx).current_sockets_in_use, 2);
        assert_eq!(t.client(idx).current_sockets_in_use, t.client(idx).socket_quota);
        assert!(t.slot(h1).unwrap().status == SlotStatus::InUse);
        assert!(t.slot(h2).unwrap().status == SlotStatus::InUse);
    }

    // Invariant 3 / S2: ownership mismatch returns InvalidHandle and
    // mutates nothing.
    #[test]
    fn ownership_mismatch_is_rejected_without_mutation() {
        let mut t = table();
        let h = t.reserve_handle(100, 10).unwrap();
        let before = t.client(t.client_id_to_index(10).unwrap()).current_sockets_in_use;
        assert_eq!(t.free_handle(h, 20), Err(NetError::InvalidHandle));
        assert_eq!(t.slot(h).unwrap().status, SlotStatus::InUse);
        assert_eq!(
            t.client(t.client_id_to_index(10).unwrap()).current_sockets_in_use,
            before
        );
    }

    // Invariant 7 / S3: quota exhaustion leaves current_sockets_in_use
    // unchanged and returns a no-slot error.
    #[test]
    fn quota_exhaustion_does_not_increment_usage() {
        let mut t = table();
        t.reserve_handle(1, 20).unwrap();
        let idx = t.client_id_to_index(20).unwrap();
        assert_eq!(t.client(idx).current_sockets_in_use, 1);
        assert_eq!(
            t.reserve_handle(2, 20),
            Err(ReserveError::QuotaExceeded)
        );
        assert_eq!(t.client(idx).current_sockets_in_use, 1);
    }

    #[test]
    fn reserve_picks_lowest_free_index() {
        let mut t = table();
        let h1 = t.reserve_handle(1, 10).unwrap();
        assert_eq!(h1, 0);
        t.free_handle(h1, 10).unwrap();
        let h2 = t.reserve_handle(2, 10).unwrap();
        assert_eq!(h2, 0);
    }

    #[test]
    fn unknown_client_cannot_reserve() {
        let mut t = table();
        assert_eq!(t.reserve_handle(1, 999), Err(ReserveError::UnknownClient));
    }

    #[test]
    fn table_exhaustion_reports_no_free_slot() {
        let mut t = table();
        t.reserve_handle(1, 10).unwrap();
        t.reserve_handle(2, 10).unwrap();
        t.reserve_handle(3, 20).unwrap();
        // Table (N=4) now has one slot left, but client 20 is already at
        // quota 1 so the fourth client can't reach it either; use a wider
        // table to exercise true table exhaustion instead.
        let mut wide: SocketTable<1, 1> = SocketTable::new(&[(1, 5)]);
        wide.reserve_handle(1, 1).unwrap();
        assert_eq!(wide.reserve_handle(2, 1), Err(ReserveError::NoFreeSlot));
    }

    #[test]
    fn set_engine_socket_overwrites_the_placeholder_value() {
        let mut t = table();
        let h = t.reserve_handle(0, 10).unwrap();
        assert_eq!(t.engine_socket_of(h), Some(0));
        t.set_engine_socket(h, h);
        assert_eq!(t.engine_socket_of(h), Some(h));
    }

    #[test]
    fn accept_links_child_to_parent_and_adopts_owner() {
        let mut t = table();
        let listener = t.reserve_handle(1, 10).unwrap();
        let child = t.reserve_handle(2, 10).unwrap();
        t.set_parent_handle(child, listener).unwrap();
        assert_eq!(t.slot(child).unwrap().parent_handle, Some(listener));
        assert_eq!(t.slot(child).unwrap().owner_client_id, Some(10));
    }
}
