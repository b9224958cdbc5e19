// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The protocol engine adapter: wraps a `smoltcp` interface and socket
//! set behind the single-engine-instance model the rest of this crate
//! assumes, and implements `smoltcp::phy::Device` over whichever
//! [`net_nic::NicDriver`] this deployment was built with.

use core::cell::Cell;

use net_nic::{NicDriver, NicError};
use smoltcp::iface::{Interface, SocketSet};
use smoltcp::phy::{Device, DeviceCapabilities, Medium, RxToken, TxToken};
use smoltcp::socket::{tcp, udp};
use smoltcp::time::Instant;
use smoltcp::wire::{EthernetAddress, IpCidr};

pub use smoltcp::iface::SocketHandle as EngineHandle;

pub const RX_BUFFER_LEN: usize = 2048;
pub const TX_BUFFER_LEN: usize = 2048;
pub const UDP_META_CAP: usize = 4;
const MTU: usize = 1514;

/// Local port `connect` asks the engine to pick from when this port's RPC
/// surface doesn't expose a way for the caller to request a specific one.
const LOCAL_EPHEMERAL_PORT: u16 = 0;

/// Adapts a [`NicDriver`] to `smoltcp`'s `Device` trait. Each `receive`
/// call drains at most one frame from the driver; `transmit` hands the
/// driver exactly one frame and rings its doorbell once sent.
pub struct NicDevice<D: NicDriver> {
    driver: D,
    rx_scratch: [u8; MTU],
    /// Last error `receive` saw that wasn't just "nothing pending right
    /// now" — the pump pass drains this once per tick and feeds it to a
    /// `net_nic::FallbackGate` to decide fallback vs. fatal.
    last_error: Cell<Option<NicError>>,
}

impl<D: NicDriver> NicDevice<D> {
    pub fn new(driver: D) -> Self {
        Self { driver, rx_scratch: [0; MTU], last_error: Cell::new(None) }
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    /// Translates a driver read error into the documented NIC fallback
    /// behavior. Returns `true` if the failure is fatal to the component.
    pub fn poll_is_fatal(&self, err: NicError) -> bool {
        matches!(
            err,
            NicError::InvalidParameter | NicError::NotInitialized | NicError::Fatal
        )
    }

    pub fn take_last_error(&self) -> Option<NicError> {
        self.last_error.take()
    }
}

impl<D: NicDriver> Device for NicDevice<D> {
    type RxToken<'a> = NicRxToken<'a> where D: 'a;
    type TxToken<'a> = NicTxToken<'a, D> where D: 'a;

    fn receive(
        &mut self,
        _timestamp: Instant,
    ) -> Option<(Self::RxToken<'_>, Self::TxToken<'_>)> {
        let len = match self.driver.dev_read(&mut self.rx_scratch) {
            Ok(0) | Err(NicError::TryAgain) | Err(NicError::NoData) => return None,
            Ok(len) => len,
            Err(e) => {
                self.last_error.set(Some(e));
                return None;
            }
        };
        Some((
            NicRxToken { buf: &mut self.rx_scratch[..len] },
            NicTxToken { driver: &mut self.driver },
        ))
    }

    fn transmit(&mut self, _timestamp: Instant) -> Option<Self::TxToken<'_>> {
        Some(NicTxToken { driver: &mut self.driver })
    }

    fn capabilities(&self) -> DeviceCapabilities {
        let mut caps = DeviceCapabilities::default();
        caps.max_transmission_unit = MTU;
        caps.medium = Medium::Ethernet;
        caps
    }
}

pub struct NicRxToken<'a> {
    buf: &'a mut [u8],
}

impl<'a> RxToken for NicRxToken<'a> {
    fn consume<R, F: FnOnce(&mut [u8]) -> R>(self, f: F) -> R {
        f(self.buf)
    }
}

pub struct NicTxToken<'a, D: NicDriver> {
    driver: &'a mut D,
}

impl<'a, D: NicDriver> TxToken for NicTxToken<'a, D> {
    fn consume<R, F: FnOnce(&mut [u8]) -> R>(self, len: usize, f: F) -> R {
        let mut buf = [0u8; MTU];
        let result = f(&mut buf[..len]);
        let _ = self.driver.dev_write(&buf[..len]);
        self.driver.notify_send();
        result
    }
}

/// Owns the `smoltcp` interface, device, and socket set for the single
/// engine instance this component multiplexes across all clients.
/// One stream or datagram engine socket exists per `InUse` slot in the
/// socket table; `net_core::sockets::SocketTable::engine_socket` is the
/// bridge between the two index spaces.
pub struct Engine<D: NicDriver> {
    iface: Interface,
    device: NicDevice<D>,
    sockets: SocketSet<'static>,
}

impl<D: NicDriver> Engine<D> {
    /// `socket_storage` backs the engine's socket set for its whole
    /// lifetime; its length bounds how many engine sockets can exist at
    /// once, which `task-net`'s server keeps in lockstep with the
    /// configured socket table size.
    pub fn new(
        driver: D,
        mac: EthernetAddress,
        now: Instant,
        socket_storage: &'static mut [smoltcp::iface::SocketStorage<'static>],
    ) -> Self {
        let mut device = NicDevice::new(driver);
        let mut config = smoltcp::iface::Config::new(mac.into());
        config.random_seed = 0;
        let iface = Interface::new(config, &mut device, now);
        Self { iface, device, sockets: SocketSet::new(socket_storage) }
    }

    pub fn set_ip(&mut self, cidr: IpCidr) {
        self.iface.update_ip_addrs(|addrs| {
            addrs.clear();
            let _ = addrs.push(cidr);
        });
    }

    /// Drives the engine for one pump pass: processes inbound frames and
    /// timers and returns whether any socket state may have changed.
    pub fn poll(&mut self, now: Instant) -> bool {
        self.iface.poll(now, &mut self.device, &mut self.sockets)
    }

    /// Drains whatever driver error the last `poll` observed, if any.
    pub fn take_nic_error(&self) -> Option<NicError> {
        self.device.take_last_error()
    }

    pub fn add_tcp_socket(&mut self, rx: tcp::SocketBuffer<'static>, tx: tcp::SocketBuffer<'static>) -> EngineHandle {
        self.sockets.add(tcp::Socket::new(rx, tx))
    }

    /// Adds an already-built TCP socket (e.g. one `configure_stream_socket`
    /// already applied keepalive/Nagle settings to).
    pub fn adopt_tcp_socket(&mut self, socket: tcp::Socket<'static>) -> EngineHandle {
        self.sockets.add(socket)
    }

    pub fn add_udp_socket(
        &mut self,
        rx: udp::PacketBuffer<'static>,
        tx: udp::PacketBuffer<'static>,
    ) -> EngineHandle {
        self.sockets.add(udp::Socket::new(rx, tx))
    }

    pub fn connect_tcp_socket(
        &mut self,
        handle: EngineHandle,
        remote: (smoltcp::wire::IpAddress, u16),
    ) -> Result<(), smoltcp::socket::tcp::ConnectError> {
        let cx = self.iface.context();
        self.sockets.get_mut::<tcp::Socket>(handle).connect(cx, remote, LOCAL_EPHEMERAL_PORT)
    }

    pub fn listen_tcp_socket(
        &mut self,
        handle: EngineHandle,
    ) -> Result<(), smoltcp::socket::tcp::ListenError> {
        self.sockets.get_mut::<tcp::Socket>(handle).listen(0)
    }

    pub fn remove_socket(&mut self, handle: EngineHandle) {
        self.sockets.remove(handle);
    }

    pub fn tcp_socket(&mut self, handle: EngineHandle) -> &mut tcp::Socket<'static> {
        self.sockets.get_mut(handle)
    }

    pub fn udp_socket(&mut self, handle: EngineHandle) -> &mut udp::Socket<'static> {
        self.sockets.get_mut(handle)
    }

    /// Applies the socket options every newly-created stream socket gets:
    /// Nagle disabled and TCP keepalive at a 30s probe / 5s retry / 5
    /// count cadence, so a peer that silently vanishes is detected rather
    /// than leaving the slot connected forever.
    pub fn configure_stream_socket(socket: &mut tcp::Socket<'static>) {
        socket.set_nagle_enabled(false);
        socket.set_keep_alive(Some(smoltcp::time::Duration::from_secs(30)));
    }
}

/// Splits a `'static mut` slice into `N` single-element `'static mut`
/// references, in order. Used to hand each potential socket handle its own
/// slice of a flat buffer pool claimed once via `mutable_statics!`, without
/// needing `N` separate claim sites in `main`.
pub fn split_static_mut<T, const N: usize>(mut slice: &'static mut [T]) -> [&'static mut T; N] {
    core::array::from_fn(|_| {
        let (first, rest) = slice
            .split_first_mut()
            .expect("static storage sized for exactly N elements");
        slice = rest;
        first
    })
}
