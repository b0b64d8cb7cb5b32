//! Endpoint resolution.
//!
//! Each configured endpoint is resolved exactly once, at startup. There is
//! no caching and no retry: a host that cannot be resolved is fatal before
//! any forwarder starts.

use std::net::IpAddr;

use log::debug;
use tokio::net::lookup_host;

use crate::error_handling::types::ResolutionError;

/// Turns a host string into a concrete address.
///
/// Literal IPv4/IPv6 addresses are returned as-is without touching the
/// resolver; anything else goes through one DNS lookup and the first
/// returned address wins.
pub async fn resolve(host: &str) -> Result<IpAddr, ResolutionError> {
    if let Ok(addr) = host.parse::<IpAddr>() {
        return Ok(addr);
    }
    let mut addrs = lookup_host((host, 0))
        .await
        .map_err(|e| ResolutionError::LookupFailed(host.to_string(), e))?;
    match addrs.next() {
        Some(addr) => {
            debug!("resolved '{}' to {}", host, addr.ip());
            Ok(addr.ip())
        }
        None => Err(ResolutionError::NoAddresses(host.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    #[tokio::test]
    async fn literal_ipv4_skips_the_lookup() {
        let addr = resolve("127.0.0.1").await.unwrap();
        assert_eq!(addr, IpAddr::V4(Ipv4Addr::LOCALHOST));
    }

    #[tokio::test]
    async fn literal_ipv6_skips_the_lookup() {
        let addr = resolve("::1").await.unwrap();
        assert_eq!(addr, IpAddr::V6(Ipv6Addr::LOCALHOST));
    }

    #[tokio::test]
    async fn unresolvable_name_is_an_error() {
        // RFC 2606 reserves .invalid, so this can never resolve.
        let err = resolve("this-host-does-not-exist.invalid").await.unwrap_err();
        assert!(matches!(
            err,
            ResolutionError::LookupFailed(_, _) | ResolutionError::NoAddresses(_)
        ));
    }
}
