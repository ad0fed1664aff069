use std::fmt::{Display, Formatter};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use log::debug;
use serde::{Deserialize, Deserializer};

use manet_core::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressFamily {
    Ipv4,
    Ipv6,
}

impl Display for AddressFamily {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            AddressFamily::Ipv4 => write!(f, "IPv4"),
            AddressFamily::Ipv6 => write!(f, "IPv6"),
        }
    }
}

/// Network prefix such as `10.0.0.0/8` or `2001:1::/64`. Host bits of the given address are
/// cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressPrefix {
    network: IpAddr,
    length: u8,
}

impl AddressPrefix {
    pub fn family(&self) -> AddressFamily {
        match self.network {
            IpAddr::V4(_) => AddressFamily::Ipv4,
            IpAddr::V6(_) => AddressFamily::Ipv6,
        }
    }

    pub fn network(&self) -> IpAddr {
        self.network
    }

    pub fn length(&self) -> u8 {
        self.length
    }

    fn host_bits(&self) -> u32 {
        match self.family() {
            AddressFamily::Ipv4 => 32 - self.length as u32,
            AddressFamily::Ipv6 => 128 - self.length as u32,
        }
    }

    /// Number of assignable host addresses. IPv4 excludes the network and broadcast
    /// addresses, IPv6 excludes the subnet-router anycast address.
    pub fn capacity(&self) -> u128 {
        let host_bits = self.host_bits();
        let size = if host_bits >= 128 {
            u128::MAX
        } else {
            1u128 << host_bits
        };
        match self.family() {
            AddressFamily::Ipv4 => size.saturating_sub(2),
            AddressFamily::Ipv6 if host_bits >= 128 => size,
            AddressFamily::Ipv6 => size - 1,
        }
    }

    /// Host address at `offset` from the network address.
    fn host(&self, offset: u128) -> IpAddr {
        match self.network {
            IpAddr::V4(network) => {
                IpAddr::V4(Ipv4Addr::from(u32::from(network).wrapping_add(offset as u32)))
            }
            IpAddr::V6(network) => {
                IpAddr::V6(Ipv6Addr::from(u128::from(network).wrapping_add(offset)))
            }
        }
    }
}

impl FromStr for AddressPrefix {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ConfigError::InvalidPrefix {
            prefix: s.to_string(),
            reason: reason.to_string(),
        };
        let (address, length) = s
            .trim()
            .split_once('/')
            .ok_or_else(|| invalid("expected <address>/<length>"))?;
        let address: IpAddr = address
            .parse()
            .map_err(|_| invalid("address is not an IPv4 or IPv6 address"))?;
        let length: u8 = length
            .parse()
            .map_err(|_| invalid("prefix length is not a number"))?;
        let network = match address {
            IpAddr::V4(v4) => {
                if length > 32 {
                    return Err(invalid("IPv4 prefix length exceeds 32"));
                }
                let mask = u32::MAX.checked_shl(32 - length as u32).unwrap_or(0);
                IpAddr::V4(Ipv4Addr::from(u32::from(v4) & mask))
            }
            IpAddr::V6(v6) => {
                if length > 128 {
                    return Err(invalid("IPv6 prefix length exceeds 128"));
                }
                let mask = u128::MAX.checked_shl(128 - length as u32).unwrap_or(0);
                IpAddr::V6(Ipv6Addr::from(u128::from(v6) & mask))
            }
        };
        Ok(Self { network, length })
    }
}

impl Display for AddressPrefix {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.network, self.length)
    }
}

impl<'de> Deserialize<'de> for AddressPrefix {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Hands out addresses of one prefix in strictly increasing order, starting at the first
/// host address.
#[derive(Debug, Clone)]
pub struct AddressPool {
    prefix: AddressPrefix,
    assigned: u128,
}

impl AddressPool {
    pub fn new(prefix: AddressPrefix) -> Self {
        Self {
            prefix,
            assigned: 0,
        }
    }

    pub fn prefix(&self) -> &AddressPrefix {
        &self.prefix
    }

    pub fn remaining(&self) -> u128 {
        self.prefix.capacity() - self.assigned
    }

    /// Assigns `count` addresses or none at all when the prefix cannot hold them.
    pub fn assign(&mut self, count: u32) -> Result<Vec<IpAddr>, ConfigError> {
        if count as u128 > self.remaining() {
            return Err(ConfigError::AddressPoolExhausted {
                prefix: self.prefix.to_string(),
                capacity: self.prefix.capacity(),
                requested: count,
            });
        }
        let addresses: Vec<IpAddr> = (0..count as u128)
            .map(|index| self.prefix.host(self.assigned + index + 1))
            .collect();
        self.assigned += count as u128;
        debug!(
            "Assigned {} addresses from {}, {} left",
            count,
            self.prefix,
            self.remaining()
        );
        Ok(addresses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_masks_prefixes() {
        let prefix: AddressPrefix = "10.1.2.3/8".parse().expect("valid prefix");
        assert_eq!(prefix.to_string(), "10.0.0.0/8");
        assert_eq!(prefix.family(), AddressFamily::Ipv4);
        let prefix: AddressPrefix = "2001:1::/64".parse().expect("valid prefix");
        assert_eq!(prefix.family(), AddressFamily::Ipv6);
        assert!("10.0.0.0".parse::<AddressPrefix>().is_err());
        assert!("10.0.0.0/33".parse::<AddressPrefix>().is_err());
        assert!("nonsense/8".parse::<AddressPrefix>().is_err());
    }

    #[test]
    fn capacity_excludes_reserved_addresses() {
        let v4: AddressPrefix = "192.168.1.0/24".parse().expect("valid prefix");
        assert_eq!(v4.capacity(), 254);
        let v4: AddressPrefix = "192.168.1.0/32".parse().expect("valid prefix");
        assert_eq!(v4.capacity(), 0);
        let v6: AddressPrefix = "2001:1::/120".parse().expect("valid prefix");
        assert_eq!(v6.capacity(), 255);
    }

    #[test]
    fn assigns_from_first_host() {
        let mut pool = AddressPool::new("10.0.0.0/8".parse().expect("valid prefix"));
        let addresses = pool.assign(3).expect("enough room");
        let expected: Vec<IpAddr> = ["10.0.0.1", "10.0.0.2", "10.0.0.3"]
            .iter()
            .map(|a| a.parse().expect("valid address"))
            .collect();
        assert_eq!(addresses, expected);

        let mut pool = AddressPool::new("2001:1::/64".parse().expect("valid prefix"));
        let addresses = pool.assign(2).expect("enough room");
        assert_eq!(addresses[0].to_string(), "2001:1::1");
        assert_eq!(addresses[1].to_string(), "2001:1::2");
    }

    #[test]
    fn exhaustion_assigns_nothing() {
        let mut pool = AddressPool::new("192.168.1.0/30".parse().expect("valid prefix"));
        assert!(matches!(
            pool.assign(3),
            Err(ConfigError::AddressPoolExhausted { capacity: 2, .. })
        ));
        assert_eq!(pool.remaining(), 2);
        assert_eq!(pool.assign(2).expect("fits").len(), 2);
    }
}
