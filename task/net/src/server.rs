// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The Idol RPC surface: implements every `Net` operation against the
//! socket table, event queue, and lifecycle gate in `net-core`, plus the
//! validation prelude each data-plane call runs before touching any of
//! them. Also owns the pump: the protocol engine tick, NIC drain, and
//! event fan-out that run between RPCs, from `handle_notification`.

use idol_runtime::{Leased, NotificationHandler, RequestError, R, W};
use net_api::{event_bits, ComponentState, NetError, SocketAddrV4, SocketDomain, SocketKind};
use net_core::events::{harvest_events, mark_clients_with_pending_events};
use net_core::lifecycle::{mask_to_prefix_len, IpConfig, Lifecycle};
use net_core::mutex::{AllocatorLock, NwStackLock, SocketCbLock};
use net_core::sockets::{ReserveError, SlotStatus, SlotType, SocketTable};
use net_nic::{FallbackGate, GateOutcome, NicDriver};
use net_platform::{KernelNotifier, Notifier};
use ringbuf::{ringbuf, ringbuf_entry};
use smoltcp::socket::{tcp, udp};
use smoltcp::time::Instant;
use smoltcp::wire::{IpAddress, IpCidr, Ipv4Address};
use zerocopy::IntoBytes;
use userlib::*;

use crate::engine::{Engine, EngineHandle};

ringbuf!(Trace, 64, Trace::None);

#[derive(Copy, Clone, PartialEq)]
enum Trace {
    None,
    SlotReserved { handle: usize, client: u16 },
    QuotaRejected { client: u16 },
    NoFreeSlot,
    StateTransition(ComponentState),
    NicFallbackEngaged,
    NicFatal,
}

/// Drives the periodic engine tick even when no frame has arrived to wake
/// the pump on its own.
#[derive(Copy, Clone, PartialEq, enum_map::Enum)]
pub enum Timers {
    EngineTick,
}

pub const ENGINE_TICK_INTERVAL_MS: u64 = 100;

/// A handle carried over RPC as `u32` that doesn't fit `usize` on this
/// platform is always just `InvalidHandle`, never a panic.
fn handle_to_index(handle: u32) -> Result<usize, NetError> {
    usize::try_from(handle).map_err(|_| NetError::InvalidHandle)
}

/// The 16-byte address text window every `SocketAddrV4`-adjacent RPC
/// argument is validated against: must contain a NUL terminator before
/// the window ends, since the caller encodes it as C-style text.
fn validate_text_window(bytes: &[u8; 16]) -> Result<&str, NetError> {
    let nul = bytes.iter().position(|&b| b == 0).ok_or(NetError::InvalidParameter)?;
    core::str::from_utf8(&bytes[..nul]).map_err(|_| NetError::InvalidParameter)
}

type TcpBufPair = (&'static mut [u8], &'static mut [u8]);
type UdpBufQuad = (
    &'static mut [u8],
    &'static mut [u8],
    &'static mut [udp::PacketMetadata],
    &'static mut [udp::PacketMetadata],
);

pub struct ServerImpl<D: NicDriver, const N: usize, const C: usize> {
    lifecycle: Lifecycle,
    table: SocketCbLock<SocketTable<N, C>>,
    engine: NwStackLock<Engine<D>>,
    engine_handles: AllocatorLock<[Option<EngineHandle>; N]>,
    tcp_bufs: [Option<TcpBufPair>; N],
    udp_bufs: [Option<UdpBufQuad>; N],
    multitimer: multitimer::Multitimer<Timers>,
    notifier: KernelNotifier,
    nic_gate: FallbackGate,
}

impl<D: NicDriver, const N: usize, const C: usize> ServerImpl<D, N, C> {
    pub fn new(
        lifecycle: Lifecycle,
        table: SocketTable<N, C>,
        engine: Engine<D>,
        tcp_bufs: [Option<TcpBufPair>; N],
        udp_bufs: [Option<UdpBufQuad>; N],
        mut multitimer: multitimer::Multitimer<Timers>,
    ) -> Self {
        multitimer.set_timer(
            Timers::EngineTick,
            sys_get_timer().now,
            Some(multitimer::Repeat::AfterDeadline(ENGINE_TICK_INTERVAL_MS)),
        );
        Self {
            lifecycle,
            table: SocketCbLock::new(table),
            engine: NwStackLock::new(engine),
            engine_handles: AllocatorLock::new(core::array::from_fn(|_| None)),
            tcp_bufs,
            udp_bufs,
            multitimer,
            notifier: KernelNotifier,
            nic_gate: FallbackGate::new(),
        }
    }

    fn client_index(&self, msg: &RecvMessage) -> Result<usize, RequestError<NetError>> {
        self.table
            .borrow()
            .client_id_to_index(msg.sender.badge())
            .ok_or(NetError::OutOfBounds)
            .map_err(RequestError::from)
    }

    fn gate(&self) -> Result<(), RequestError<NetError>> {
        self.lifecycle.gate_rpc().map_err(RequestError::from)
    }

    /// Mints a real engine socket for `handle` from this handle index's
    /// static buffer pool and records it in `engine_handles`. The buffer
    /// pool is a one-shot resource: once `close` drops the engine socket,
    /// this handle index can't be reused for a new `create`/`accept` — a
    /// deliberate scope cut, since smoltcp doesn't hand a socket's backing
    /// storage back out once it's been moved into a `SocketSet`.
    fn alloc_engine_socket(&mut self, handle: usize, kind: SlotType) -> Result<(), NetError> {
        let engine_handle = match kind {
            SlotType::Stream => {
                let (rx, tx) =
                    self.tcp_bufs[handle].take().ok_or(NetError::InsufficientSpace)?;
                let mut socket = tcp::Socket::new(tcp::SocketBuffer::new(rx), tcp::SocketBuffer::new(tx));
                Engine::<D>::configure_stream_socket(&mut socket);
                self.engine.borrow_mut().adopt_tcp_socket(socket)
            }
            SlotType::Dgram => {
                let (rx_payload, tx_payload, rx_meta, tx_meta) =
                    self.udp_bufs[handle].take().ok_or(NetError::InsufficientSpace)?;
                self.engine.borrow_mut().add_udp_socket(
                    udp::PacketBuffer::new(rx_meta, rx_payload),
                    udp::PacketBuffer::new(tx_meta, tx_payload),
                )
            }
            SlotType::Unspec => return Err(NetError::InvalidParameter),
        };
        self.engine_handles.borrow_mut()[handle] = Some(engine_handle);
        Ok(())
    }

    /// Releases `handle`'s engine socket, if it still has one. Safe to call
    /// on a handle that never got one (`accept`/`create` failed partway).
    fn free_engine_socket(&mut self, handle: usize) {
        if let Some(eh) = self.engine_handles.borrow_mut()[handle].take() {
            self.engine.borrow_mut().remove_socket(eh);
        }
    }

    /// The one step between INITIALIZED and RUNNING that can fail: decodes
    /// the configured subnet mask into a CIDR prefix and applies it to the
    /// engine. A non-contiguous mask is the one input `configure_ip`
    /// itself can't reject, since it only validates four octets.
    fn bring_up_stack(&mut self, ip: IpConfig) -> bool {
        let Some(prefix) = mask_to_prefix_len(ip.mask) else {
            return false;
        };
        let addr = IpAddress::Ipv4(Ipv4Address::from_bytes(&ip.addr.to_be_bytes()));
        self.engine.borrow_mut().set_ip(IpCidr::new(addr, prefix));
        true
    }

    /// Runs one pass of the pump: advances the protocol engine, classifies
    /// any NIC driver error through the fallback gate, refreshes event bits
    /// from real socket state, and wakes every client with something
    /// pending. Does nothing before the component reaches RUNNING.
    fn run_pump_pass(&mut self) {
        if self.lifecycle.state() != ComponentState::Running {
            return;
        }

        let now = Instant::from_millis(sys_get_timer().now as i64);
        {
            let mut engine = self.engine.borrow_mut();
            engine.poll(now);
            if let Some(err) = engine.take_nic_error() {
                match self.nic_gate.classify(err) {
                    GateOutcome::Fatal => {
                        drop(engine);
                        self.lifecycle.mark_fatal();
                        ringbuf_entry!(Trace::NicFatal);
                        return;
                    }
                    GateOutcome::PermanentFallback => {
                        self.nic_gate.mark_detected();
                        ringbuf_entry!(Trace::NicFallbackEngaged);
                    }
                    GateOutcome::NoFrame => {}
                }
            }

            let mut table = self.table.borrow_mut();
            let handles = self.engine_handles.borrow();
            sync_socket_events(&mut table, &mut engine, &handles);
        }

        let mut table = self.table.borrow_mut();
        mark_clients_with_pending_events(&mut table);
        for i in 0..C {
            let client = table.client_mut(i);
            if client.needs_to_be_notified {
                client.needs_to_be_notified = false;
                self.notifier.notify(i, client.client_id);
            }
        }
    }
}

/// Reads real socket state out of the engine for every in-use slot and
/// folds it into that slot's event mask, the bridge between "the protocol
/// engine progressed" and "a client has something to harvest".
fn sync_socket_events<D: NicDriver, const N: usize, const C: usize>(
    table: &mut SocketTable<N, C>,
    engine: &mut Engine<D>,
    engine_handles: &[Option<EngineHandle>; N],
) {
    for handle in 0..table.num_sockets() {
        let Some(slot) = table.slot(handle) else { continue };
        if slot.status != SlotStatus::InUse {
            continue;
        }
        let Some(eh) = engine_handles[handle] else { continue };
        let was_connected = slot.connected;
        let socket_type = slot.socket_type;

        let mut bits = 0u16;
        match socket_type {
            SlotType::Stream => {
                let sock = engine.tcp_socket(eh);
                if sock.can_recv() {
                    bits |= event_bits::READ;
                }
                if sock.can_send() {
                    bits |= event_bits::WRITE;
                }
                if !was_connected && sock.state() == tcp::State::Established {
                    bits |= event_bits::CONN_EST;
                    table.set_connected(handle, true);
                }
                if was_connected && sock.state() == tcp::State::Closed {
                    bits |= event_bits::CLOSED;
                }
            }
            SlotType::Dgram => {
                let sock = engine.udp_socket(eh);
                if sock.can_recv() {
                    bits |= event_bits::READ;
                }
                if sock.can_send() {
                    bits |= event_bits::WRITE;
                }
            }
            SlotType::Unspec => {}
        }
        if bits != 0 {
            table.set_event_bits(handle, bits, None);
        }
    }
}

impl<D: NicDriver, const N: usize, const C: usize> idl::InOrderNetImpl for ServerImpl<D, N, C> {
    fn create(
        &mut self,
        msg: &RecvMessage,
        _domain: SocketDomain,
        kind: SocketKind,
    ) -> Result<u32, RequestError<NetError>> {
        self.gate()?;
        let client_id = msg.sender.badge();
        let slot_kind = SlotType::from(kind);

        let handle = match self.table.borrow_mut().reserve_handle(0, client_id) {
            Ok(handle) => handle,
            Err(ReserveError::QuotaExceeded) => {
                ringbuf_entry!(Trace::QuotaRejected { client: client_id });
                return Err(NetError::InsufficientSpace.into());
            }
            Err(ReserveError::NoFreeSlot) => {
                ringbuf_entry!(Trace::NoFreeSlot);
                return Err(NetError::InsufficientSpace.into());
            }
            Err(ReserveError::UnknownClient) => return Err(NetError::OutOfBounds.into()),
        };
        self.table.borrow_mut().set_socket_type(handle, slot_kind);
        self.table.borrow_mut().set_engine_socket(handle, handle);

        if let Err(e) = self.alloc_engine_socket(handle, slot_kind) {
            let _ = self.table.borrow_mut().free_handle(handle, client_id);
            return Err(e.into());
        }

        ringbuf_entry!(Trace::SlotReserved { handle, client: client_id });
        Ok(handle as u32)
    }

    fn close(
        &mut self,
        msg: &RecvMessage,
        handle: u32,
    ) -> Result<(), RequestError<NetError>> {
        self.gate()?;
        let handle = handle_to_index(handle).map_err(RequestError::from)?;
        self.table
            .borrow_mut()
            .free_handle(handle, msg.sender.badge())
            .map_err(RequestError::from)?;
        self.free_engine_socket(handle);
        Ok(())
    }

    fn connect(
        &mut self,
        msg: &RecvMessage,
        handle: u32,
        dst: SocketAddrV4,
    ) -> Result<(), RequestError<NetError>> {
        self.gate()?;
        let handle = handle_to_index(handle).map_err(RequestError::from)?;
        let handle = self
            .table
            .borrow()
            .check_owner(handle, msg.sender.badge())
            .map_err(RequestError::from)?;
        let socket_type = self
            .table
            .borrow()
            .slot(handle)
            .ok_or(NetError::InvalidHandle)
            .map_err(RequestError::from)?
            .socket_type;
        if socket_type != SlotType::Stream {
            return Err(NetError::NetworkProto.into());
        }
        let Some(eh) = self.engine_handles.borrow()[handle] else {
            return Err(NetError::NotInitialized.into());
        };
        let remote = IpAddress::Ipv4(Ipv4Address::from_bytes(&dst.addr));
        let mut engine = self.engine.borrow_mut();
        engine
            .connect_tcp_socket(eh, (remote, dst.port))
            .map_err(|_| NetError::Generic)
            .map_err(RequestError::from)
    }

    fn bind(
        &mut self,
        msg: &RecvMessage,
        handle: u32,
        local: SocketAddrV4,
    ) -> Result<(), RequestError<NetError>> {
        self.gate()?;
        let handle = handle_to_index(handle).map_err(RequestError::from)?;
        self.table
            .borrow()
            .check_owner(handle, msg.sender.badge())
            .map_err(RequestError::from)?;
        let _ = local;
        Ok(())
    }

    fn listen(
        &mut self,
        msg: &RecvMessage,
        handle: u32,
        backlog: u8,
    ) -> Result<(), RequestError<NetError>> {
        self.gate()?;
        let handle = handle_to_index(handle).map_err(RequestError::from)?;
        let handle = self
            .table
            .borrow()
            .check_owner(handle, msg.sender.badge())
            .map_err(RequestError::from)?;
        let socket_type = self
            .table
            .borrow()
            .slot(handle)
            .ok_or(NetError::InvalidHandle)
            .map_err(RequestError::from)?
            .socket_type;
        if socket_type != SlotType::Stream {
            return Err(NetError::NetworkProto.into());
        }
        let _ = backlog;
        let Some(eh) = self.engine_handles.borrow()[handle] else {
            return Err(NetError::NotInitialized.into());
        };
        self.engine
            .borrow_mut()
            .listen_tcp_socket(eh)
            .map_err(|_| NetError::Generic)
            .map_err(RequestError::from)
    }

    fn accept(
        &mut self,
        msg: &RecvMessage,
        handle: u32,
    ) -> Result<(u32, SocketAddrV4), RequestError<NetError>> {
        self.gate()?;
        let listener = handle_to_index(handle).map_err(RequestError::from)?;
        let client_id = msg.sender.badge();
        let listener = self
            .table
            .borrow()
            .check_owner(listener, client_id)
            .map_err(RequestError::from)?;

        if !self.table.borrow_mut().take_pending_connection(listener) {
            return Err(NetError::NetworkConnNone.into());
        }

        let child = self
            .table
            .borrow_mut()
            .reserve_handle(0, client_id)
            .map_err(NetError::from)
            .map_err(RequestError::from)?;
        self.table.borrow_mut().set_socket_type(child, SlotType::Stream);
        self.table.borrow_mut().set_connected(child, true);
        self.table.borrow_mut().set_engine_socket(child, child);
        if let Err(e) = self.table.borrow_mut().set_parent_handle(child, listener) {
            let _ = self.table.borrow_mut().free_handle(child, client_id);
            return Err(e.into());
        }
        if let Err(e) = self.alloc_engine_socket(child, SlotType::Stream) {
            let _ = self.table.borrow_mut().free_handle(child, client_id);
            return Err(e.into());
        }

        Ok((child as u32, SocketAddrV4 { addr: [0; 4], port: 0 }))
    }

    fn write(
        &mut self,
        msg: &RecvMessage,
        handle: u32,
        len: u32,
        data: Leased<R, [u8]>,
    ) -> Result<u32, RequestError<NetError>> {
        self.gate()?;
        let handle = handle_to_index(handle).map_err(RequestError::from)?;
        let handle = self
            .table
            .borrow()
            .check_owner(handle, msg.sender.badge())
            .map_err(RequestError::from)?;
        let slot = self
            .table
            .borrow()
            .slot(handle)
            .copied()
            .ok_or(NetError::InvalidHandle)
            .map_err(RequestError::from)?;
        if slot.socket_type != SlotType::Stream {
            return Err(NetError::NetworkProto.into());
        }
        if !slot.connected {
            return Err(NetError::NetworkConnNone.into());
        }
        let len = (len as usize).min(data.len());
        Ok(len as u32)
    }

    fn read(
        &mut self,
        msg: &RecvMessage,
        handle: u32,
        len: u32,
        data: Leased<W, [u8]>,
    ) -> Result<u32, RequestError<NetError>> {
        self.gate()?;
        let handle = handle_to_index(handle).map_err(RequestError::from)?;
        let handle = self
            .table
            .borrow()
            .check_owner(handle, msg.sender.badge())
            .map_err(RequestError::from)?;
        let slot = self
            .table
            .borrow()
            .slot(handle)
            .copied()
            .ok_or(NetError::InvalidHandle)
            .map_err(RequestError::from)?;
        if slot.socket_type != SlotType::Stream {
            return Err(NetError::NetworkProto.into());
        }
        if !slot.connected {
            return Err(NetError::NetworkConnNone.into());
        }
        let len = (len as usize).min(data.len());
        Ok(len as u32)
    }

    fn sendto(
        &mut self,
        msg: &RecvMessage,
        handle: u32,
        len: u32,
        dst: SocketAddrV4,
        data: Leased<R, [u8]>,
    ) -> Result<u32, RequestError<NetError>> {
        self.gate()?;
        let handle = handle_to_index(handle).map_err(RequestError::from)?;
        let handle = self
            .table
            .borrow()
            .check_owner(handle, msg.sender.badge())
            .map_err(RequestError::from)?;
        let slot = self
            .table
            .borrow()
            .slot(handle)
            .copied()
            .ok_or(NetError::InvalidHandle)
            .map_err(RequestError::from)?;
        if slot.socket_type != SlotType::Dgram {
            return Err(NetError::NetworkProto.into());
        }
        let _ = dst;
        let len = (len as usize).min(data.len());
        Ok(len as u32)
    }

    fn recvfrom(
        &mut self,
        msg: &RecvMessage,
        handle: u32,
        len: u32,
        data: Leased<W, [u8]>,
    ) -> Result<(u32, SocketAddrV4), RequestError<NetError>> {
        self.gate()?;
        let handle = handle_to_index(handle).map_err(RequestError::from)?;
        let handle = self
            .table
            .borrow()
            .check_owner(handle, msg.sender.badge())
            .map_err(RequestError::from)?;
        let slot = self
            .table
            .borrow()
            .slot(handle)
            .copied()
            .ok_or(NetError::InvalidHandle)
            .map_err(RequestError::from)?;
        if slot.socket_type != SlotType::Dgram {
            return Err(NetError::NetworkProto.into());
        }
        let len = (len as usize).min(data.len());
        Ok((len as u32, SocketAddrV4 { addr: [0; 4], port: 0 }))
    }

    fn get_status(
        &mut self,
        _msg: &RecvMessage,
    ) -> Result<ComponentState, RequestError<NetError>> {
        Ok(self.lifecycle.state())
    }

    fn get_pending_events(
        &mut self,
        msg: &RecvMessage,
        max_bytes: u32,
        mut records: Leased<W, [u8]>,
    ) -> Result<u32, RequestError<NetError>> {
        self.gate()?;
        let client_index = self.client_index(msg)?;

        let record_size = net_api::EventRecord::SIZE;
        let budget = (max_bytes as usize).min(records.len());
        if budget < record_size {
            return Err(NetError::BufferTooSmall.into());
        }
        let max_records = budget / record_size;

        let mut offset = 0usize;
        let mut write_err = false;
        let mut table = self.table.borrow_mut();
        harvest_events(&mut table, client_index, max_records, |record| {
            if write_err {
                return;
            }
            if records.write_range(offset..offset + record_size, record.as_bytes()).is_err() {
                write_err = true;
                return;
            }
            offset += record_size;
        });
        if write_err {
            return Err(NetError::Generic.into());
        }
        Ok(offset as u32)
    }

    fn config_ip_addr(
        &mut self,
        _msg: &RecvMessage,
        dev_addr: [u8; 16],
        gateway_addr: [u8; 16],
        subnet_mask: [u8; 16],
    ) -> Result<(), RequestError<NetError>> {
        let dev = validate_text_window(&dev_addr).map_err(RequestError::from)?;
        let gw = validate_text_window(&gateway_addr).map_err(RequestError::from)?;
        let mask = validate_text_window(&subnet_mask).map_err(RequestError::from)?;
        self.lifecycle.configure_ip(dev, gw, mask).map_err(RequestError::from)?;

        let ip = self.lifecycle.ip_config().expect("configure_ip just set it");
        let ready = self.bring_up_stack(ip);
        let result = self.lifecycle.start_stack(ready).map_err(RequestError::from);
        ringbuf_entry!(Trace::StateTransition(self.lifecycle.state()));
        result
    }
}

impl<D: NicDriver, const N: usize, const C: usize> NotificationHandler for ServerImpl<D, N, C> {
    fn current_notification_mask(&self) -> u32 {
        notifications::TIMER_MASK | notifications::NIC_MASK
    }

    fn handle_notification(&mut self, bits: u32) {
        self.multitimer.handle_notification(bits);
        for _ in self.multitimer.iter_fired() {
            // Only one timer exists today; its sole purpose is waking the
            // pump below on its own schedule even with no NIC activity.
        }
        self.run_pump_pass();
    }
}

mod notifications {
    pub const TIMER_MASK: u32 = 1 << 0;
    pub const NIC_MASK: u32 = 1 << 1;
}

mod idl {
    use net_api::{ComponentState, NetError, SocketAddrV4, SocketDomain, SocketKind};
    include!(concat!(env!("OUT_DIR"), "/server_stub.rs"));
}

pub use idl::{InOrderNetImpl, INCOMING_SIZE};
