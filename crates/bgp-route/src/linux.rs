use crate::{
    Route,
    RouteError,
    RouteProtocol,
    RouteTable,
};
use async_trait::async_trait;
use bgp_common::Ipv4Prefix;
use futures_util::TryStreamExt;
use netlink_packet_route::route::{
    RouteAddress,
    RouteAttribute,
};
use rtnetlink::{
    new_connection,
    Handle,
    IpVersion,
};
use std::net::Ipv4Addr;
use tokio::task::JoinHandle;

type NetlinkRouteProtocol = netlink_packet_route::route::RouteProtocol;

impl From<NetlinkRouteProtocol> for RouteProtocol {
    fn from(value: NetlinkRouteProtocol) -> Self {
        match value {
            NetlinkRouteProtocol::Bgp => Self::Bgp,
            NetlinkRouteProtocol::Ospf => Self::Ospf,
            NetlinkRouteProtocol::Static => Self::Static,
            NetlinkRouteProtocol::Dhcp => Self::Dhcp,
            NetlinkRouteProtocol::Kernel => Self::Kernel,
            NetlinkRouteProtocol::Ra => Self::RouterAdvertisement,
            _ => Self::Other,
        }
    }
}

pub struct LinuxRouteTable {
    handle: Handle,
    _connection_task: JoinHandle<()>,
}

impl LinuxRouteTable {
    pub fn new() -> Result<Self, RouteError> {
        let (connection, handle, _) = new_connection()?;
        Ok(Self {
            handle,
            _connection_task: tokio::spawn(connection),
        })
    }
}

fn message_to_route(message: netlink_packet_route::route::RouteMessage) -> Option<Route> {
    let RouteAddress::Inet(dest) = message
        .attributes
        .iter()
        .find_map(|attr| if let RouteAttribute::Destination(addr) = attr { Some(addr.clone()) } else { None })?
    else {
        return None;
    };

    let next_hop = message.attributes.iter().find_map(|attr| {
        if let RouteAttribute::Gateway(RouteAddress::Inet(addr)) = attr {
            Some(*addr)
        } else {
            None
        }
    });

    Some(Route {
        protocol: RouteProtocol::from(message.header.protocol),
        destination: Ipv4Prefix::new(dest, message.header.destination_prefix_length).ok()?,
        next_hop,
    })
}

#[async_trait]
impl RouteTable for LinuxRouteTable {
    async fn list(&self) -> Result<Vec<Route>, RouteError> {
        let mut routes = Vec::new();
        let mut stream = self.handle.route().get(IpVersion::V4).execute();
        while let Some(message) = stream.try_next().await? {
            if let Some(route) = message_to_route(message) {
                routes.push(route);
            }
        }
        Ok(routes)
    }

    async fn add(&self, destination: Ipv4Prefix, gateway: Ipv4Addr) -> Result<(), RouteError> {
        self.handle
            .route()
            .add()
            .v4()
            .destination_prefix(destination.address, destination.prefix_len)
            .gateway(gateway)
            .execute()
            .await?;
        Ok(())
    }
}
