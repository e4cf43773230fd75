use crate::{
    Route,
    RouteError,
    RouteProtocol,
    RouteTable,
};
use async_trait::async_trait;
use bgp_common::Ipv4Prefix;
use std::{
    net::Ipv4Addr,
    slice,
};
use windows::Win32::NetworkManagement::IpHelper::{
    CreateIpForwardEntry2,
    FreeMibTable,
    GetIpForwardTable2,
    InitializeIpForwardEntry,
    MIB_IPFORWARD_ROW2,
    MIB_IPFORWARD_TABLE2,
};
use windows::Win32::Networking::WinSock::{
    ADDRESS_FAMILY,
    AF_INET,
    MIB_IPPROTO_NETMGMT,
    MIB_IPPROTO_NT_AUTOSTATIC,
    NL_ROUTE_PROTOCOL,
    PROTO_IP_BGP,
    PROTO_IP_DHCP,
    PROTO_IP_NT_STATIC,
    PROTO_IP_OSPF,
    SOCKADDR_INET,
};

impl From<NL_ROUTE_PROTOCOL> for RouteProtocol {
    fn from(value: NL_ROUTE_PROTOCOL) -> Self {
        match value {
            PROTO_IP_NT_STATIC | MIB_IPPROTO_NT_AUTOSTATIC | MIB_IPPROTO_NETMGMT => Self::Static,
            PROTO_IP_BGP => Self::Bgp,
            PROTO_IP_DHCP => Self::Dhcp,
            PROTO_IP_OSPF => Self::Ospf,
            _ => Self::Other,
        }
    }
}

fn ipv4_from_sockaddr(addr: SOCKADDR_INET) -> Option<Ipv4Addr> {
    unsafe { (addr.si_family == AF_INET).then(|| Ipv4Addr::from(addr.Ipv4.sin_addr.S_un.S_addr.to_ne_bytes())) }
}

pub struct WindowsRouteTable;

impl WindowsRouteTable {
    pub fn new() -> Result<Self, RouteError> {
        Ok(Self)
    }
}

#[async_trait]
impl RouteTable for WindowsRouteTable {
    async fn list(&self) -> Result<Vec<Route>, RouteError> {
        let mut table_ptr: *mut MIB_IPFORWARD_TABLE2 = std::ptr::null_mut();
        let result = unsafe { GetIpForwardTable2(ADDRESS_FAMILY(AF_INET.0), &mut table_ptr) };
        if result.is_err() {
            return Err(RouteError::Win32(result.0 as u32));
        }

        let mut routes = Vec::new();
        if !table_ptr.is_null() {
            let table = unsafe { &*table_ptr };
            for entry in unsafe { slice::from_raw_parts(table.Table.as_ptr(), table.NumEntries as usize) } {
                let Some(dest_addr) = ipv4_from_sockaddr(entry.DestinationPrefix.Prefix) else {
                    continue;
                };
                let Ok(destination) = Ipv4Prefix::new(dest_addr, entry.DestinationPrefix.PrefixLength as u8) else {
                    continue;
                };
                routes.push(Route {
                    protocol: RouteProtocol::from(entry.Protocol),
                    destination,
                    next_hop: ipv4_from_sockaddr(entry.NextHop),
                });
            }
            unsafe { FreeMibTable(table_ptr as *mut _) };
        }
        Ok(routes)
    }

    async fn add(&self, destination: Ipv4Prefix, gateway: Ipv4Addr) -> Result<(), RouteError> {
        let mut row = MIB_IPFORWARD_ROW2::default();
        unsafe { InitializeIpForwardEntry(&mut row) };

        row.DestinationPrefix.PrefixLength = destination.prefix_len;
        row.DestinationPrefix.Prefix.si_family = AF_INET;
        row.DestinationPrefix.Prefix.Ipv4.sin_family = AF_INET;
        row.DestinationPrefix.Prefix.Ipv4.sin_addr.S_un.S_addr = u32::from_ne_bytes(destination.address.octets());

        row.NextHop.si_family = AF_INET;
        row.NextHop.Ipv4.sin_family = AF_INET;
        row.NextHop.Ipv4.sin_addr.S_un.S_addr = u32::from_ne_bytes(gateway.octets());

        let result = unsafe { CreateIpForwardEntry2(&row) };
        if result.is_err() {
            return Err(RouteError::Win32(result.0 as u32));
        }
        Ok(())
    }
}
