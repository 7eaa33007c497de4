//! Interface discovery and resolution.

use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv6Addr;

use getifaddrs::{Address, getifaddrs, if_nametoindex};

use crate::config::{InterfaceConfig, UnresolvedConfig};
use crate::error::{Error, Result};

/// A local network interface as discovered from the OS.
#[derive(Debug, Clone)]
pub struct NetworkInterface {
    pub name: String,
    pub index: u32,
    pub inet6: Vec<Ipv6Addr>,
    pub mac: Option<[u8; 6]>,
}

/// Enumerates every interface the OS reports, merging `getifaddrs()`
/// entries by interface name.
pub(crate) fn discover_interfaces() -> Result<Vec<NetworkInterface>> {
    let mut by_name: BTreeMap<String, NetworkInterface> = BTreeMap::new();

    for entry in getifaddrs()? {
        let iface = by_name.entry(entry.name.clone()).or_insert_with(|| NetworkInterface {
            name: entry.name.clone(),
            index: 0,
            inet6: Vec::new(),
            mac: None,
        });

        match entry.address {
            Address::V4(_) => {}
            Address::V6(v6) => iface.inet6.push(v6.address),
            Address::Mac(mac) => iface.mac = Some(mac),
        }
    }

    for iface in by_name.values_mut() {
        iface.index = if_nametoindex(&iface.name)?;
    }

    Ok(by_name.into_values().collect())
}

fn is_link_local(addr: &Ipv6Addr) -> bool {
    (addr.segments()[0] & 0xffc0) == 0xfe80
}

/// Accept iff (global ∨ ULA) ∧ ¬multicast: anything that isn't
/// unspecified, loopback, link-local or multicast is treated as an
/// acceptable "global" address for binding purposes.
fn is_global_or_ula(addr: &Ipv6Addr) -> bool {
    !addr.is_unspecified() && !addr.is_loopback() && !is_link_local(addr) && !addr.is_multicast()
}

/// The universal/local bit of the interface identifier: bit 1 of byte 8
/// (counting from 0), used by `auto` address selection to break ties.
fn has_universal_bit(addr: &Ipv6Addr) -> bool {
    addr.octets()[8] & 0x02 != 0
}

enum AddressSelector {
    All,
    Auto,
    Explicit(Vec<Ipv6Addr>),
}

fn parse_selector(value: &str, interface: &str, option: &'static str) -> Result<AddressSelector> {
    let trimmed = value.trim();
    match trimmed.to_lowercase().as_str() {
        "" => Ok(AddressSelector::Explicit(Vec::new())),
        "all" => Ok(AddressSelector::All),
        "auto" => Ok(AddressSelector::Auto),
        _ => {
            let mut addrs = Vec::new();
            for token in trimmed.split([',', ' ', '\t']).filter(|t| !t.is_empty()) {
                let addr: Ipv6Addr = token
                    .parse()
                    .map_err(|_| Error::InvalidAddress(token.to_string()))?;

                if option == "link-local-addresses" && !is_link_local(&addr) {
                    return Err(Error::NotLinkLocal {
                        interface: interface.to_string(),
                        option,
                        address: addr,
                    });
                }
                if option == "global-addresses" && (!is_global_or_ula(&addr) || addr.is_multicast()) {
                    return Err(Error::NotGlobalOrUla {
                        interface: interface.to_string(),
                        option,
                        address: addr,
                    });
                }

                addrs.push(addr);
            }
            Ok(AddressSelector::Explicit(addrs))
        }
    }
}

fn discovered(iface: &NetworkInterface, want_link_local: bool) -> Vec<Ipv6Addr> {
    let set: BTreeSet<Ipv6Addr> = iface
        .inet6
        .iter()
        .copied()
        .filter(|a| if want_link_local { is_link_local(a) } else { !is_link_local(a) && is_global_or_ula(a) })
        .collect();
    set.into_iter().collect()
}

/// Picks the "best" address for the `auto` selector.
fn pick_best(mut candidates: Vec<Ipv6Addr>) -> Option<Ipv6Addr> {
    let universal: Vec<Ipv6Addr> = candidates.iter().copied().filter(has_universal_bit).collect();
    if let Some(best) = universal.into_iter().min() {
        return Some(best);
    }
    candidates.sort();
    candidates.into_iter().next()
}

fn expand_selector(
    selector: AddressSelector,
    iface: &NetworkInterface,
    want_link_local: bool,
) -> Vec<Ipv6Addr> {
    match selector {
        AddressSelector::Explicit(addrs) => {
            let set: BTreeSet<Ipv6Addr> = addrs.into_iter().collect();
            set.into_iter().collect()
        }
        AddressSelector::All => discovered(iface, want_link_local),
        AddressSelector::Auto => pick_best(discovered(iface, want_link_local)).into_iter().collect(),
    }
}

fn parse_bool(value: Option<&str>, default: bool) -> bool {
    match value.map(str::to_lowercase).as_deref() {
        None => default,
        Some("yes") | Some("true") | Some("1") => true,
        Some("no") | Some("false") | Some("0") => false,
        Some(_) => default,
    }
}

/// Resolves every configured interface section against the live OS
/// interface list: wildcard expansion, address selector expansion, and
/// the drop/fatal rules around empty and multicast interfaces.
pub(crate) fn resolve_interfaces(
    config: &UnresolvedConfig,
    os_interfaces: &[NetworkInterface],
) -> Result<BTreeMap<String, InterfaceConfig>> {
    let raw = config.raw();
    let by_name: BTreeMap<&str, &NetworkInterface> =
        os_interfaces.iter().map(|i| (i.name.as_str(), i)).collect();

    let wildcard = raw
        .interface_sections()
        .find(|s| s.arg.as_deref() == Some("*"));

    let mut explicit_names: BTreeSet<String> = raw
        .interface_sections()
        .filter(|s| s.arg.as_deref() != Some("*"))
        .filter_map(|s| s.arg.clone())
        .collect();

    let mut resolved = BTreeMap::new();

    // Explicit sections first.
    for section in raw.interface_sections().filter(|s| s.arg.as_deref() != Some("*")) {
        let name = section.arg.clone().unwrap_or_default();
        let iface = by_name
            .get(name.as_str())
            .ok_or_else(|| Error::InterfaceNotFound(name.clone()))?;

        let multicast = parse_bool(section.get("multicast"), false);
        let listen_to_self = parse_bool(section.get("listen-to-self"), false);

        let ll_default = if multicast { "auto" } else { "" };
        let ll_selector = parse_selector(
            section.get("link-local-addresses").unwrap_or(ll_default),
            &name,
            "link-local-addresses",
        )?;
        let global_selector = parse_selector(
            section.get("global-addresses").unwrap_or(""),
            &name,
            "global-addresses",
        )?;

        let link_local = expand_selector(ll_selector, iface, true);
        let global = expand_selector(global_selector, iface, false);

        finish_interface(name, multicast, listen_to_self, link_local, global, &mut resolved)?;
    }

    // Wildcard expansion: clone to every OS interface lacking an explicit section.
    if let Some(template) = wildcard {
        for iface in os_interfaces {
            if explicit_names.contains(iface.name.as_str()) {
                continue;
            }
            explicit_names.insert(iface.name.clone());

            let multicast = parse_bool(template.get("multicast"), false);
            let listen_to_self = parse_bool(template.get("listen-to-self"), false);

            let ll_default = if multicast { "auto" } else { "" };
            let ll_selector = parse_selector(
                template.get("link-local-addresses").unwrap_or(ll_default),
                &iface.name,
                "link-local-addresses",
            )?;
            let global_selector = parse_selector(
                template.get("global-addresses").unwrap_or(""),
                &iface.name,
                "global-addresses",
            )?;

            let link_local = expand_selector(ll_selector, iface, true);
            let global = expand_selector(global_selector, iface, false);

            finish_interface(
                iface.name.clone(),
                multicast,
                listen_to_self,
                link_local,
                global,
                &mut resolved,
            )?;
        }
    }

    Ok(resolved)
}

fn finish_interface(
    name: String,
    multicast: bool,
    listen_to_self: bool,
    link_local: Vec<Ipv6Addr>,
    global: Vec<Ipv6Addr>,
    resolved: &mut BTreeMap<String, InterfaceConfig>,
) -> Result<()> {
    let cfg = InterfaceConfig {
        name: name.clone(),
        multicast,
        listen_to_self,
        link_local,
        global,
    };

    if !cfg.is_usable() {
        tracing::debug!(interface = %name, "dropping interface with no usable addresses");
        return Ok(());
    }

    if cfg.multicast && cfg.link_local.is_empty() {
        return Err(Error::MulticastWithoutLinkLocal { interface: name });
    }

    resolved.insert(name, cfg);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iface(name: &str, addrs: &[&str]) -> NetworkInterface {
        NetworkInterface {
            name: name.to_string(),
            index: 1,
            inet6: addrs.iter().map(|a| a.parse().unwrap()).collect(),
            mac: None,
        }
    }

    #[test]
    fn auto_prefers_universal_bit_tie_break() {
        let eth0 = iface("eth0", &["fe80::1", "fe80::2:0:0:1"]);
        let chosen = pick_best(discovered(&eth0, true));
        assert_eq!(chosen, Some("fe80::2:0:0:1".parse().unwrap()));
    }

    #[test]
    fn auto_falls_back_to_smallest_without_universal_bit() {
        let eth0 = iface("eth0", &["fe80::2", "fe80::1"]);
        let chosen = pick_best(discovered(&eth0, true));
        assert_eq!(chosen, Some("fe80::1".parse().unwrap()));
    }

    #[test]
    fn classifies_link_local_and_global() {
        assert!(is_link_local(&"fe80::1".parse().unwrap()));
        assert!(!is_link_local(&"2001:db8::1".parse().unwrap()));
        assert!(is_global_or_ula(&"fc00::1".parse().unwrap()));
        assert!(is_global_or_ula(&"2001:db8::1".parse().unwrap()));
        assert!(!is_global_or_ula(&"ff02::1:2".parse().unwrap()));
        assert!(!is_global_or_ula(&"::".parse().unwrap()));
    }

    #[test]
    fn wildcard_expansion_skips_explicit_sections() {
        let text = "[interface *]\nlink-local-addresses = auto\nmulticast = yes\n\n[interface eth1]\nmulticast = no\nglobal-addresses = 2001:db8::1\n";
        let raw = crate::config::tests_support::parse_raw(text);
        let os = vec![
            iface("eth0", &["fe80::1"]),
            iface("eth1", &["fe80::2", "2001:db8::1"]),
            iface("lo", &[]),
        ];

        let cfg = crate::config::tests_support::unresolved_from_raw(raw);
        let resolved = resolve_interfaces(&cfg, &os).unwrap();

        assert_eq!(resolved.len(), 2);
        assert!(resolved["eth0"].multicast);
        assert_eq!(resolved["eth0"].link_local, vec!["fe80::1".parse::<Ipv6Addr>().unwrap()]);
        assert!(!resolved["eth1"].multicast);
        assert_eq!(resolved["eth1"].global, vec!["2001:db8::1".parse::<Ipv6Addr>().unwrap()]);
        assert!(!resolved.contains_key("lo"));
    }
}
