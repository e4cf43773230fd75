//! The textual per-peer configuration line from §6: `localAS localIP remoteAS
//! remoteIP mode [network ...]`. Parsing is all-or-nothing: an invalid field
//! anywhere in the line produces an error and no `Config` is constructed,
//! mirroring `original_source`'s `config.New` validation order.

use bgp_common::{
    AsNumber,
    CommonError,
    Ipv4Prefix,
};
use std::{
    net::{
        AddrParseError,
        Ipv4Addr,
    },
    str::FromStr,
};
use thiserror::Error;

/// Default BGP TCP port. Carried on `Config` rather than as process-wide
/// mutable state, per the redesign direction in the source spec's design notes.
pub const DEFAULT_BGP_PORT: u16 = 179;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Mode {
    Active,
    Passive,
}

impl FromStr for Mode {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "passive" => Ok(Self::Passive),
            other => Err(ConfigError::InvalidMode(other.to_string())),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("expected 'localAS localIP remoteAS remoteIP mode [network ...]', got {0} field(s)")]
    WrongFieldCount(usize),
    #[error("invalid local AS number: {0}")]
    LocalAs(CommonError),
    #[error("invalid local IPv4 address: {0}")]
    LocalIp(AddrParseError),
    #[error("invalid remote AS number: {0}")]
    RemoteAs(CommonError),
    #[error("invalid remote IPv4 address: {0}")]
    RemoteIp(AddrParseError),
    #[error("invalid mode '{0}' (expected 'active' or 'passive')")]
    InvalidMode(String),
    #[error("invalid network '{0}': {1}")]
    Network(String, CommonError),
}

/// An immutable per-peer configuration record. `networks` may be empty.
#[derive(Debug, Clone)]
pub struct Config {
    pub local_as: AsNumber,
    pub local_ip: Ipv4Addr,
    pub remote_as: AsNumber,
    pub remote_ip: Ipv4Addr,
    pub mode: Mode,
    pub networks: Vec<Ipv4Prefix>,
    pub bgp_port: u16,
}

impl Config {
    /// Parses one configuration line. Fields beyond the first five are CIDR
    /// IPv4 networks to originate from Loc-RIB.
    pub fn parse_line(line: &str) -> Result<Self, ConfigError> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 5 {
            return Err(ConfigError::WrongFieldCount(fields.len()));
        }

        let local_as: AsNumber = fields[0].parse().map_err(ConfigError::LocalAs)?;
        let local_ip: Ipv4Addr = fields[1].parse().map_err(ConfigError::LocalIp)?;
        let remote_as: AsNumber = fields[2].parse().map_err(ConfigError::RemoteAs)?;
        let remote_ip: Ipv4Addr = fields[3].parse().map_err(ConfigError::RemoteIp)?;
        let mode: Mode = fields[4].parse()?;

        let mut networks = Vec::with_capacity(fields.len().saturating_sub(5));
        for raw in &fields[5..] {
            let network: Ipv4Prefix = raw.parse().map_err(|error| ConfigError::Network(raw.to_string(), error))?;
            networks.push(network);
        }

        Ok(Self {
            local_as,
            local_ip,
            remote_as,
            remote_ip,
            mode,
            networks,
            bgp_port: DEFAULT_BGP_PORT,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_line() {
        let config = Config::parse_line("64512 127.0.0.1 64513 127.0.0.2 Active 10.100.220.0/24").unwrap();
        assert_eq!(config.local_as, AsNumber(64512));
        assert_eq!(config.mode, Mode::Active);
        assert_eq!(config.networks.len(), 1);
        assert_eq!(config.bgp_port, DEFAULT_BGP_PORT);
    }

    #[test]
    fn mode_is_case_insensitive() {
        assert_eq!("PASSIVE".parse::<Mode>().unwrap(), Mode::Passive);
        assert_eq!("passive".parse::<Mode>().unwrap(), Mode::Passive);
    }

    #[test]
    fn rejects_too_few_fields() {
        assert!(matches!(Config::parse_line("64512 127.0.0.1"), Err(ConfigError::WrongFieldCount(2))));
    }

    #[test]
    fn rejects_bad_network_without_partial_config() {
        assert!(Config::parse_line("64512 127.0.0.1 64513 127.0.0.2 active not-a-cidr").is_err());
    }

    #[test]
    fn empty_network_list_is_allowed() {
        let config = Config::parse_line("64512 127.0.0.1 64513 127.0.0.2 passive").unwrap();
        assert!(config.networks.is_empty());
    }
}
