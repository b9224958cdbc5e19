// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Turns the app manifest's `[net-stack]` table into the generated Rust
//! `task-net` builds against: the socket pool size, the client roster
//! (badge + quota, in manifest order), and an optional build-baked IPv4
//! configuration.
//!
//! This subset must *not* be `deny_unknown_fields`, since it is parsed out
//! of a larger app-wide TOML document that also configures unrelated
//! tasks.

use anyhow::{bail, Result};
use serde::Deserialize;

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GlobalConfig {
    pub net_stack: NetStackConfig,
}

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct NetStackConfig {
    pub num_sockets: usize,
    pub clients: Vec<ClientConfig>,
    pub baked_ip: Option<BakedIp>,
}

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ClientConfig {
    /// Kernel badge this client authenticates with. Must be unique.
    pub badge: u16,
    pub quota: u16,
}

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct BakedIp {
    pub addr: String,
    pub gateway: String,
    pub mask: String,
}

pub fn load_net_stack_config() -> Result<NetStackConfig> {
    let cfg = build_util::config::<GlobalConfig>()?.net_stack;
    if cfg.clients.is_empty() {
        bail!("net-stack config must list at least one client");
    }
    let mut quota_sum = 0usize;
    for c in &cfg.clients {
        quota_sum += usize::from(c.quota);
    }
    if quota_sum > cfg.num_sockets {
        bail!(
            "sum of client quotas ({quota_sum}) exceeds num-sockets ({})",
            cfg.num_sockets
        );
    }
    Ok(cfg)
}

/// Emits `NUM_SOCKETS`, `CLIENTS: [(badge, quota); N]`, and `baked_ip()`
/// into a file `task-net`'s build script `include!`s.
pub fn generate_client_config(
    config: &NetStackConfig,
    mut out: impl std::io::Write,
) -> Result<(), std::io::Error> {
    writeln!(out, "pub const NUM_SOCKETS: usize = {};", config.num_sockets)?;
    writeln!(out, "pub const NUM_CLIENTS: usize = {};", config.clients.len())?;
    writeln!(
        out,
        "pub static CLIENTS: [(u16, u16); {}] = [",
        config.clients.len()
    )?;
    for c in &config.clients {
        writeln!(out, "    ({}, {}),", c.badge, c.quota)?;
    }
    writeln!(out, "];")?;

    match &config.baked_ip {
        Some(ip) => {
            let addr = parse_dotted_quad(&ip.addr)
                .unwrap_or_else(|| panic!("invalid baked-ip.addr {:?}", ip.addr));
            let gateway = parse_dotted_quad(&ip.gateway).unwrap_or_else(|| {
                panic!("invalid baked-ip.gateway {:?}", ip.gateway)
            });
            let mask = parse_dotted_quad(&ip.mask)
                .unwrap_or_else(|| panic!("invalid baked-ip.mask {:?}", ip.mask));
            writeln!(
                out,
                "pub fn baked_ip() -> Option<(u32, u32, u32)> {{ Some(({addr:#x}, {gateway:#x}, {mask:#x})) }}"
            )?;
        }
        None => {
            writeln!(out, "pub fn baked_ip() -> Option<(u32, u32, u32)> {{ None }}")?;
        }
    }

    Ok(())
}

fn parse_dotted_quad(s: &str) -> Option<u32> {
    let mut parts = s.split('.');
    let mut octets = [0u8; 4];
    for octet in &mut octets {
        *octet = parts.next()?.parse().ok()?;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(u32::from_be_bytes(octets))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_dotted_quad() {
        assert_eq!(parse_dotted_quad("10.0.0.5"), Some(0x0a000005));
    }

    #[test]
    fn rejects_malformed_addresses() {
        assert_eq!(parse_dotted_quad("10.0.0"), None);
        assert_eq!(parse_dotted_quad("10.0.0.5.6"), None);
        assert_eq!(parse_dotted_quad("10.0.0.256"), None);
        assert_eq!(parse_dotted_quad("not-an-ip"), None);
    }
}
