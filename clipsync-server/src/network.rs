use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};

use if_addrs::IfAddr;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceAddr {
    pub name: String,
    pub addr: Ipv4Addr,
    pub is_up: bool,
}

impl InterfaceAddr {
    pub fn up(name: impl Into<String>, addr: Ipv4Addr) -> Self {
        Self {
            name: name.into(),
            addr,
            is_up: true,
        }
    }
}

/// Source of candidate IPv4 addresses for the listener.
pub trait InterfaceSource: Send + Sync {
    fn ipv4_candidates(&self) -> Vec<InterfaceAddr>;
}

/// Asks the routing table which local address reaches the outside.
///
/// Connecting a UDP socket only selects a route; nothing is sent.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultRoute;

const ROUTE_TARGET: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8)), 80);

impl InterfaceSource for DefaultRoute {
    fn ipv4_candidates(&self) -> Vec<InterfaceAddr> {
        let routed = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
            .and_then(|socket| socket.connect(ROUTE_TARGET).map(|()| socket))
            .and_then(|socket| socket.local_addr());
        match routed {
            Ok(SocketAddr::V4(local)) => vec![InterfaceAddr::up("default-route", *local.ip())],
            Ok(SocketAddr::V6(_)) => Vec::new(),
            Err(err) => {
                debug!("default route lookup failed: {}", err);
                Vec::new()
            }
        }
    }
}

/// Enumerates the host's IPv4 interfaces, falling back to the default-route lookup when
/// enumeration fails or finds nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemInterfaces;

impl InterfaceSource for SystemInterfaces {
    fn ipv4_candidates(&self) -> Vec<InterfaceAddr> {
        match if_addrs::get_if_addrs() {
            Ok(interfaces) => {
                let candidates: Vec<InterfaceAddr> = interfaces
                    .iter()
                    .filter_map(|iface| match &iface.addr {
                        IfAddr::V4(v4) => Some(InterfaceAddr {
                            name: iface.name.clone(),
                            addr: v4.ip,
                            is_up: iface.is_oper_up(),
                        }),
                        IfAddr::V6(_) => None,
                    })
                    .collect();
                if !candidates.is_empty() {
                    return candidates;
                }
            }
            Err(err) => debug!("interface enumeration failed: {}", err),
        }
        DefaultRoute.ipv4_candidates()
    }
}

#[derive(Debug, Default, Clone)]
pub struct StaticInterfaces(pub Vec<InterfaceAddr>);

impl InterfaceSource for StaticInterfaces {
    fn ipv4_candidates(&self) -> Vec<InterfaceAddr> {
        self.0.clone()
    }
}

fn is_wifi_class(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    matches!(lower.as_str(), "en0" | "en2")
        || lower.starts_with("wl")
        || lower.starts_with("wi-fi")
}

/// Best LAN-reachable address: up, not loopback, not link-local, Wi-Fi first.
pub fn pick_lan_address(candidates: &[InterfaceAddr]) -> Option<Ipv4Addr> {
    let usable = || {
        candidates
            .iter()
            .filter(|c| c.is_up && !c.addr.is_loopback() && !c.addr.is_link_local())
            .filter(|c| !c.addr.is_unspecified())
    };
    usable()
        .find(|c| is_wifi_class(&c.name))
        .or_else(|| usable().next())
        .map(|c| c.addr)
}

/// Preferred host if given, else the best discovered address, else the wildcard.
pub fn resolve_bind_host(preferred: Option<IpAddr>, source: &dyn InterfaceSource) -> IpAddr {
    if let Some(host) = preferred {
        return host;
    }
    pick_lan_address(&source.ipv4_candidates())
        .map(IpAddr::V4)
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wifi_interface_is_preferred() {
        let candidates = vec![
            InterfaceAddr::up("eth0", Ipv4Addr::new(10, 0, 0, 5)),
            InterfaceAddr::up("en0", Ipv4Addr::new(192, 168, 1, 7)),
        ];
        assert_eq!(
            pick_lan_address(&candidates),
            Some(Ipv4Addr::new(192, 168, 1, 7))
        );
    }

    #[test]
    fn link_local_loopback_and_down_interfaces_are_skipped() {
        let candidates = vec![
            InterfaceAddr::up("en0", Ipv4Addr::new(169, 254, 3, 4)),
            InterfaceAddr::up("lo", Ipv4Addr::LOCALHOST),
            InterfaceAddr {
                name: "wlan0".to_owned(),
                addr: Ipv4Addr::new(192, 168, 0, 2),
                is_up: false,
            },
            InterfaceAddr::up("eth1", Ipv4Addr::new(172, 16, 0, 9)),
        ];
        assert_eq!(
            pick_lan_address(&candidates),
            Some(Ipv4Addr::new(172, 16, 0, 9))
        );
    }

    #[test]
    fn falls_back_to_wildcard_without_candidates() {
        let host = resolve_bind_host(None, &StaticInterfaces::default());
        assert_eq!(host, IpAddr::V4(Ipv4Addr::UNSPECIFIED));
    }

    #[test]
    fn system_interfaces_report_ipv4_only() {
        for candidate in SystemInterfaces.ipv4_candidates() {
            assert!(!candidate.name.is_empty());
        }
        let host = resolve_bind_host(None, &SystemInterfaces);
        assert!(host.is_ipv4());
    }

    #[test]
    fn preferred_host_wins() {
        let source = StaticInterfaces(vec![InterfaceAddr::up(
            "en0",
            Ipv4Addr::new(192, 168, 1, 7),
        )]);
        let host = resolve_bind_host(Some(IpAddr::V4(Ipv4Addr::LOCALHOST)), &source);
        assert_eq!(host, IpAddr::V4(Ipv4Addr::LOCALHOST));
    }
}
