//! The kernel routing table collaborator sketched in spec §6: a platform-agnostic
//! `list`/`add` contract over IPv4 routes, mirroring `octavius-route`'s `RouteTable`
//! trait. Narrowed to IPv4 only (no IPv6, per the speaker's Non-goals) and widened
//! with `add`, which `octavius-route` had not yet implemented (it only listed
//! routes).
//!
//! The trait is expressed with `#[async_trait]` rather than `octavius-route`'s
//! return-position-impl-trait style so `bgp-daemon` can hold it as
//! `Arc<dyn RouteTable>`: one peer, one trait object, no generic threaded through
//! the whole FSM.

use async_trait::async_trait;
use bgp_common::Ipv4Prefix;
use std::{
    io,
    net::Ipv4Addr,
};
use thiserror::Error;

#[cfg(target_os = "linux")] pub mod linux;
#[cfg(target_os = "windows")] pub mod windows_sys;

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[cfg(target_os = "linux")]
    #[error("netlink error: {0}")]
    Netlink(#[from] rtnetlink::Error),

    #[cfg(target_os = "windows")]
    #[error("Win32 API error (code {0})")]
    Win32(u32),
}

/// The routing protocol that installed a route, mirroring `octavius-route`'s
/// `RouteProtocol` (kept even though this core never reads it back, since a future
/// extension reading Loc-RIB back out of the kernel will want it).
#[derive(Ord, PartialOrd, Eq, PartialEq, Debug, Hash, Clone, Copy)]
pub enum RouteProtocol {
    Other,
    Static,
    Bgp,
    Dhcp,
    Ospf,
    Kernel,
    RouterAdvertisement,
}

/// A single IPv4 route in the kernel forwarding table.
#[derive(Ord, PartialOrd, Eq, PartialEq, Debug, Hash, Clone, Copy)]
pub struct Route {
    pub protocol: RouteProtocol,
    pub destination: Ipv4Prefix,
    pub next_hop: Option<Ipv4Addr>,
}

/// The external collaborator spec §6 calls "the raw operating-system routing-table
/// manipulation primitive": `list_ipv4_routes` (used by Loc-RIB construction to match
/// configured networks) and `add_ipv4_route` (used to install a selected Loc-RIB
/// entry; failure is fatal to the peer per §4.4/§7).
#[async_trait]
pub trait RouteTable: Send + Sync {
    /// Every route currently in the kernel's IPv4 forwarding table.
    async fn list(&self) -> Result<Vec<Route>, RouteError>;

    /// Installs a route for `destination` via `gateway`.
    async fn add(&self, destination: Ipv4Prefix, gateway: Ipv4Addr) -> Result<(), RouteError>;
}
