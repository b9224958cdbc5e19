// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Entry point for the multiplexed network stack component: claims the
//! static socket-buffer pools, brings up the polling-ring NIC transport,
//! builds the protocol engine and socket table, and hands both to
//! `ServerImpl`. All ongoing work — the pump tick, NIC drain, and event
//! fan-out — happens inside `idol_runtime::dispatch`'s call into
//! `handle_notification`, not in this loop.

#![no_std]
#![no_main]

mod engine;
mod server;

use engine::{Engine, UDP_META_CAP};
use mutable_statics::mutable_statics;
use net_core::lifecycle::Lifecycle;
use net_core::sockets::SocketTable;
use net_nic::ring::PollingRing;
use server::ServerImpl;
use smoltcp::iface::SocketStorage;
use smoltcp::socket::udp;
use smoltcp::time::Instant;
use smoltcp::wire::EthernetAddress;
use userlib::*;

include!(concat!(env!("OUT_DIR"), "/net_config.rs"));

/// This deployment has no build-manifest field for a MAC address; the
/// polling-ring transport has no address of its own to report either, so
/// a fixed locally-administered address stands in for real hardware
/// identity.
const MAC_ADDRESS: [u8; 6] = [0x02, 0x00, 0x00, 0x00, 0x00, 0x01];

const NIC_MTU: usize = 1514;

/// Inbound frame slots the polling ring scans each tick. Unrelated to
/// `NUM_SOCKETS` — this bounds in-flight unread frames, not sockets.
const NIC_RING_DEPTH: usize = 8;

type Driver = PollingRing<NIC_RING_DEPTH, NIC_MTU>;

#[export_name = "main"]
fn main() -> ! {
    let table: SocketTable<NUM_SOCKETS, NUM_CLIENTS> = SocketTable::new(&CLIENTS);
    let lifecycle = match baked_ip() {
        Some((addr, gateway, mask)) => {
            Lifecycle::new_baked(net_core::lifecycle::IpConfig { addr, gateway, mask })
        }
        None => Lifecycle::new_unconfigured(),
    };

    let (tcp_rx, tcp_tx, udp_rx_payload, udp_tx_payload, udp_rx_meta, udp_tx_meta, socket_storage) = mutable_statics! {
        static mut TCP_RX: [[u8; engine::RX_BUFFER_LEN]; NUM_SOCKETS] = [|| [0; engine::RX_BUFFER_LEN]; _];
        static mut TCP_TX: [[u8; engine::TX_BUFFER_LEN]; NUM_SOCKETS] = [|| [0; engine::TX_BUFFER_LEN]; _];
        static mut UDP_RX_PAYLOAD: [[u8; engine::RX_BUFFER_LEN]; NUM_SOCKETS] = [|| [0; engine::RX_BUFFER_LEN]; _];
        static mut UDP_TX_PAYLOAD: [[u8; engine::TX_BUFFER_LEN]; NUM_SOCKETS] = [|| [0; engine::TX_BUFFER_LEN]; _];
        static mut UDP_RX_META: [[udp::PacketMetadata; UDP_META_CAP]; NUM_SOCKETS] =
            [|| [udp::PacketMetadata::EMPTY; UDP_META_CAP]; _];
        static mut UDP_TX_META: [[udp::PacketMetadata; UDP_META_CAP]; NUM_SOCKETS] =
            [|| [udp::PacketMetadata::EMPTY; UDP_META_CAP]; _];
        static mut SOCKET_STORAGE: [SocketStorage<'static>; NUM_SOCKETS] = [Default::default; _];
    };

    let tcp_rx: [&'static mut [u8; engine::RX_BUFFER_LEN]; NUM_SOCKETS] =
        engine::split_static_mut(tcp_rx.as_mut_slice());
    let tcp_tx: [&'static mut [u8; engine::TX_BUFFER_LEN]; NUM_SOCKETS] =
        engine::split_static_mut(tcp_tx.as_mut_slice());
    let udp_rx_payload: [&'static mut [u8; engine::RX_BUFFER_LEN]; NUM_SOCKETS] =
        engine::split_static_mut(udp_rx_payload.as_mut_slice());
    let udp_tx_payload: [&'static mut [u8; engine::TX_BUFFER_LEN]; NUM_SOCKETS] =
        engine::split_static_mut(udp_tx_payload.as_mut_slice());
    let udp_rx_meta: [&'static mut [udp::PacketMetadata; UDP_META_CAP]; NUM_SOCKETS] =
        engine::split_static_mut(udp_rx_meta.as_mut_slice());
    let udp_tx_meta: [&'static mut [udp::PacketMetadata; UDP_META_CAP]; NUM_SOCKETS] =
        engine::split_static_mut(udp_tx_meta.as_mut_slice());

    let mut tcp_rx_iter = tcp_rx.into_iter();
    let mut tcp_tx_iter = tcp_tx.into_iter();
    let tcp_bufs = core::array::from_fn(|_| {
        Some((
            tcp_rx_iter.next().unwrap().as_mut_slice(),
            tcp_tx_iter.next().unwrap().as_mut_slice(),
        ))
    });

    let mut udp_rx_payload_iter = udp_rx_payload.into_iter();
    let mut udp_tx_payload_iter = udp_tx_payload.into_iter();
    let mut udp_rx_meta_iter = udp_rx_meta.into_iter();
    let mut udp_tx_meta_iter = udp_tx_meta.into_iter();
    let udp_bufs = core::array::from_fn(|_| {
        Some((
            udp_rx_payload_iter.next().unwrap().as_mut_slice(),
            udp_tx_payload_iter.next().unwrap().as_mut_slice(),
            udp_rx_meta_iter.next().unwrap().as_mut_slice(),
            udp_tx_meta_iter.next().unwrap().as_mut_slice(),
        ))
    });

    let driver: Driver = PollingRing::new(MAC_ADDRESS);
    let now = Instant::from_millis(sys_get_timer().now as i64);
    let engine: Engine<Driver> =
        Engine::new(driver, EthernetAddress(MAC_ADDRESS), now, socket_storage.as_mut_slice());

    let multitimer: multitimer::Multitimer<server::Timers> = multitimer::Multitimer::new(0);

    let mut server: ServerImpl<Driver, NUM_SOCKETS, NUM_CLIENTS> =
        ServerImpl::new(lifecycle, table, engine, tcp_bufs, udp_bufs, multitimer);

    let mut incoming = [0u8; server::INCOMING_SIZE];
    loop {
        idol_runtime::dispatch(&mut incoming, &mut server);
    }
}
