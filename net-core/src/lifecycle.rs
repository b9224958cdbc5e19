// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The component's own state machine: `UNINITIALIZED` → `INITIALIZED` →
//! `RUNNING` → `FATAL_ERROR`. Every RPC surface checks `gate_rpc` before
//! doing anything else, so a dead or not-yet-configured component can
//! never be coaxed into touching the socket table or the engine.

use net_api::{ComponentState, NetError};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct IpConfig {
    pub addr: u32,
    pub gateway: u32,
    pub mask: u32,
}

pub struct Lifecycle {
    state: ComponentState,
    ip: Option<IpConfig>,
    /// Set when the IP configuration was baked in at build time; in that
    /// case `configIpAddr` is permanently denied rather than merely
    /// state-gated, and the component starts RUNNING immediately.
    baked: bool,
}

impl Lifecycle {
    /// Construction path for a deployment with no build-time IP baked in:
    /// starts UNINITIALIZED, waiting for `configIpAddr`.
    pub fn new_unconfigured() -> Self {
        Self { state: ComponentState::Uninitialized, ip: None, baked: false }
    }

    /// Construction path for a deployment with the IP baked into the
    /// manifest: skips straight to RUNNING, no `configIpAddr` call ever
    /// needed or permitted.
    pub fn new_baked(ip: IpConfig) -> Self {
        Self { state: ComponentState::Running, ip: Some(ip), baked: true }
    }

    pub fn state(&self) -> ComponentState {
        self.state
    }

    pub fn ip_config(&self) -> Option<IpConfig> {
        self.ip
    }

    /// Every RPC but `getStatus` and `configIpAddr` calls this first.
    /// FATAL_ERROR rejects every call; anything before RUNNING isn't
    /// ready to touch sockets or the engine yet.
    pub fn gate_rpc(&self) -> Result<(), NetError> {
        match self.state {
            ComponentState::FatalError => Err(NetError::Aborted),
            ComponentState::Running => Ok(()),
            ComponentState::Uninitialized | ComponentState::Initialized => {
                Err(NetError::NotInitialized)
            }
        }
    }

    /// Applies a dotted-quad IP configuration. Valid only from
    /// UNINITIALIZED and only when the deployment didn't bake its own
    /// address in. Leaves the component at INITIALIZED — bringing the
    /// stack up (which can fail) is a separate step, `start_stack`.
    pub fn configure_ip(
        &mut self,
        dev_addr: &str,
        gateway_addr: &str,
        subnet_mask: &str,
    ) -> Result<(), NetError> {
        if self.baked {
            return Err(NetError::OperationDenied);
        }
        if self.state != ComponentState::Uninitialized {
            return Err(NetError::InvalidState);
        }

        let addr = parse_ipv4(dev_addr).ok_or(NetError::InvalidParameter)?;
        let gateway = parse_ipv4(gateway_addr).ok_or(NetError::InvalidParameter)?;
        let mask = parse_ipv4(subnet_mask).ok_or(NetError::InvalidParameter)?;

        self.ip = Some(IpConfig { addr, gateway, mask });
        self.state = ComponentState::Initialized;
        Ok(())
    }

    /// Brings the stack and NIC online after `configure_ip` has set an
    /// address: the one step that can still fail between INITIALIZED and
    /// RUNNING. `ready` is the caller's own verdict on whether the engine
    /// and NIC driver actually came up (e.g. the configured subnet mask
    /// decoded to a valid CIDR prefix and the driver answered a MAC-address
    /// probe) — this method only performs the state transition that
    /// verdict implies. A baked deployment starts RUNNING directly and
    /// never calls this.
    pub fn start_stack(&mut self, ready: bool) -> Result<(), NetError> {
        if self.state != ComponentState::Initialized {
            return Err(NetError::InvalidState);
        }
        if ready {
            self.state = ComponentState::Running;
            Ok(())
        } else {
            self.state = ComponentState::FatalError;
            Err(NetError::NotInitialized)
        }
    }

    pub fn mark_running(&mut self) {
        if self.state == ComponentState::Initialized {
            self.state = ComponentState::Running;
        }
    }

    /// A graceful engine-tick return, or any unrecoverable driver/engine
    /// failure, drives the component to FATAL_ERROR. Terminal: nothing
    /// moves it back out.
    pub fn mark_fatal(&mut self) {
        self.state = ComponentState::FatalError;
    }
}

/// Converts a dotted-quad subnet mask into a CIDR prefix length. `None` if
/// the mask isn't a contiguous run of leading one bits (e.g.
/// `255.0.255.0`) — the one way IP bring-up can still fail on input
/// `configure_ip` already accepted as four valid octets.
pub fn mask_to_prefix_len(mask: u32) -> Option<u8> {
    let ones = mask.leading_ones();
    let rest = mask << ones;
    if rest != 0 {
        return None;
    }
    Some(ones as u8)
}

/// Parses a NUL-free dotted-quad IPv4 address string into a big-endian
/// `u32`. Rejects anything but exactly four decimal octets 0-255
/// separated by single dots — no leading zeros tolerated beyond a lone
/// `0`, since this mirrors the narrow textual window callers pass
/// in-band rather than a general `Ipv4Addr::from_str`.
pub fn parse_ipv4(s: &str) -> Option<u32> {
    let mut octets = [0u8; 4];
    let mut parts = s.split('.');
    for octet in octets.iter_mut() {
        let part = parts.next()?;
        if part.is_empty() || (part.len() > 1 && part.starts_with('0')) {
            return None;
        }
        *octet = part.parse::<u8>().ok()?;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(u32::from_be_bytes(octets))
}

#[cfg(test)]
mod tests {
    use super::*;

    // Invariant 4: FATAL_ERROR is terminal.
    #[test]
    fn fatal_error_rejects_every_rpc_and_never_recovers() {
        let mut l = Lifecycle::new_unconfigured();
        l.configure_ip("10.0.0.1", "10.0.0.254", "255.255.255.0").unwrap();
        l.start_stack(true).unwrap();
        assert_eq!(l.gate_rpc(), Ok(()));
        l.mark_fatal();
        assert_eq!(l.gate_rpc(), Err(NetError::Aborted));
        l.mark_running();
        assert_eq!(l.state(), ComponentState::FatalError);
        assert_eq!(l.gate_rpc(), Err(NetError::Aborted));
    }

    // Invariant 9: configIpAddr only succeeds from UNINITIALIZED.
    #[test]
    fn config_ip_addr_is_one_shot() {
        let mut l = Lifecycle::new_unconfigured();
        assert_eq!(l.configure_ip("192.168.1.1", "192.168.1.1", "255.255.255.0"), Ok(()));
        assert_eq!(l.state(), ComponentState::Initialized);
        assert_eq!(
            l.configure_ip("192.168.1.2", "192.168.1.1", "255.255.255.0"),
            Err(NetError::InvalidState)
        );
    }

    // Scenario S4: a failed stack/NIC bring-up drives the component to
    // FATAL_ERROR instead of RUNNING, and that's terminal.
    #[test]
    fn failed_stack_bring_up_drives_fatal_error_not_running() {
        let mut l = Lifecycle::new_unconfigured();
        l.configure_ip("10.0.0.1", "10.0.0.254", "255.255.255.0").unwrap();
        assert_eq!(l.start_stack(false), Err(NetError::NotInitialized));
        assert_eq!(l.state(), ComponentState::FatalError);
        assert_eq!(l.gate_rpc(), Err(NetError::Aborted));
    }

    #[test]
    fn start_stack_outside_initialized_is_invalid_state() {
        let mut l = Lifecycle::new_unconfigured();
        assert_eq!(l.start_stack(true), Err(NetError::InvalidState));
    }

    #[test]
    fn successful_start_stack_reaches_running() {
        let mut l = Lifecycle::new_unconfigured();
        l.configure_ip("10.0.0.1", "10.0.0.254", "255.255.255.0").unwrap();
        assert_eq!(l.start_stack(true), Ok(()));
        assert_eq!(l.state(), ComponentState::Running);
    }

    #[test]
    fn baked_ip_denies_config_ip_addr_unconditionally() {
        let mut l = Lifecycle::new_baked(IpConfig { addr: 1, gateway: 2, mask: 3 });
        assert_eq!(l.state(), ComponentState::Running);
        assert_eq!(
            l.configure_ip("10.0.0.1", "10.0.0.1", "255.0.0.0"),
            Err(NetError::OperationDenied)
        );
    }

    #[test]
    fn rpcs_before_running_are_not_initialized() {
        let l = Lifecycle::new_unconfigured();
        assert_eq!(l.gate_rpc(), Err(NetError::NotInitialized));
    }

    #[test]
    fn rpcs_after_configure_ip_but_before_start_stack_are_still_not_initialized() {
        let mut l = Lifecycle::new_unconfigured();
        l.configure_ip("10.0.0.1", "10.0.0.254", "255.255.255.0").unwrap();
        assert_eq!(l.gate_rpc(), Err(NetError::NotInitialized));
    }

    #[test]
    fn mask_to_prefix_len_accepts_only_contiguous_leading_ones() {
        assert_eq!(mask_to_prefix_len(0xffff_ff00), Some(24));
        assert_eq!(mask_to_prefix_len(0xffff_ffff), Some(32));
        assert_eq!(mask_to_prefix_len(0), Some(0));
        assert_eq!(mask_to_prefix_len(0xff00_ff00), None);
    }

    #[test]
    fn malformed_address_text_is_rejected_and_state_does_not_move() {
        let mut l = Lifecycle::new_unconfigured();
        assert_eq!(
            l.configure_ip("256.0.0.1", "10.0.0.1", "255.255.255.0"),
            Err(NetError::InvalidParameter)
        );
        assert_eq!(l.state(), ComponentState::Uninitialized);
        assert_eq!(
            l.configure_ip("10.0.0", "10.0.0.1", "255.255.255.0"),
            Err(NetError::InvalidParameter)
        );
        assert_eq!(
            l.configure_ip("10.0.0.01", "10.0.0.1", "255.255.255.0"),
            Err(NetError::InvalidParameter)
        );
    }

    #[test]
    fn parses_dotted_quad_into_big_endian_u32() {
        assert_eq!(parse_ipv4("0.0.0.0"), Some(0));
        assert_eq!(parse_ipv4("255.255.255.255"), Some(0xffff_ffff));
        assert_eq!(parse_ipv4("10.0.0.1"), Some(0x0a00_0001));
    }
}
