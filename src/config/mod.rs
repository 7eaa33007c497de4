//! Typed configuration model.
//!
//! Loading happens in two steps because interface resolution needs
//! OS-level address discovery that this module has no business knowing
//! about: [`UnresolvedConfig::load`] parses everything except interfaces,
//! and the caller (the supervisor) completes the picture by calling
//! [`UnresolvedConfig::finish`] with the resolved interface map produced by
//! [`crate::iface::resolve_interfaces`].

mod raw;

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::net::Ipv6Addr;
use std::path::Path;

use raw::RawConfig;

use crate::duid::Duid;
use crate::error::{Error, Result};

/// A single `[interface NAME]` block, fully resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceConfig {
    pub name: String,
    pub multicast: bool,
    pub listen_to_self: bool,
    pub link_local: Vec<Ipv6Addr>,
    pub global: Vec<Ipv6Addr>,
}

impl InterfaceConfig {
    /// An interface is only usable once it has something to bind.
    pub(crate) fn is_usable(&self) -> bool {
        !self.link_local.is_empty() || !self.global.is_empty()
    }
}

/// The `[handler]` section, preserved mostly verbatim since loading the
/// actual handler implementation is outside the core's scope.
#[derive(Debug, Clone, Default)]
pub struct HandlerDescriptor {
    pub module: String,
    pub class: Option<String>,
    pub extra: BTreeMap<String, String>,
}

/// Syslog facility names accepted in `[logging] facility=`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyslogFacility {
    Kern,
    User,
    Mail,
    Daemon,
    Auth,
    Syslog,
    Lpr,
    News,
    Uucp,
    Cron,
    AuthPriv,
    Ftp,
    Local0,
    Local1,
    Local2,
    Local3,
    Local4,
    Local5,
    Local6,
    Local7,
}

impl SyslogFacility {
    fn parse(name: &str) -> Option<Self> {
        use SyslogFacility::*;
        Some(match name.to_lowercase().as_str() {
            "kern" => Kern,
            "user" => User,
            "mail" => Mail,
            "daemon" => Daemon,
            "auth" => Auth,
            "syslog" => Syslog,
            "lpr" => Lpr,
            "news" => News,
            "uucp" => Uucp,
            "cron" => Cron,
            "authpriv" => AuthPriv,
            "ftp" => Ftp,
            "local0" => Local0,
            "local1" => Local1,
            "local2" => Local2,
            "local3" => Local3,
            "local4" => Local4,
            "local5" => Local5,
            "local6" => Local6,
            "local7" => Local7,
            _ => return None,
        })
    }

    /// The RFC 3164 numeric facility code (facility * 8).
    pub(crate) fn code(self) -> u8 {
        use SyslogFacility::*;
        match self {
            Kern => 0,
            User => 1,
            Mail => 2,
            Daemon => 3,
            Auth => 4,
            Syslog => 5,
            Lpr => 6,
            News => 7,
            Uucp => 8,
            Cron => 9,
            AuthPriv => 10,
            Ftp => 11,
            Local0 => 16,
            Local1 => 17,
            Local2 => 18,
            Local3 => 19,
            Local4 => 20,
            Local5 => 21,
            Local6 => 22,
            Local7 => 23,
        }
    }

    fn name(self) -> &'static str {
        use SyslogFacility::*;
        match self {
            Kern => "kern",
            User => "user",
            Mail => "mail",
            Daemon => "daemon",
            Auth => "auth",
            Syslog => "syslog",
            Lpr => "lpr",
            News => "news",
            Uucp => "uucp",
            Cron => "cron",
            AuthPriv => "authpriv",
            Ftp => "ftp",
            Local0 => "local0",
            Local1 => "local1",
            Local2 => "local2",
            Local3 => "local3",
            Local4 => "local4",
            Local5 => "local5",
            Local6 => "local6",
            Local7 => "local7",
        }
    }
}

/// The immutable server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub duid: Duid,
    pub user: String,
    pub group: String,
    pub exception_window_s: f64,
    pub max_exceptions: usize,
    pub workers: usize,
    pub logging_facility: SyslogFacility,
    pub handler_descriptor: HandlerDescriptor,
    pub interfaces: BTreeMap<String, InterfaceConfig>,
}

impl ServerConfig {
    /// Renders the normalized, resolved configuration for `--show-config`.
    /// Not round-trippable into [`UnresolvedConfig::load`] byte for byte,
    /// but every value the core consumes is represented.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "[server]");
        let _ = writeln!(out, "duid = {}", self.duid);
        let _ = writeln!(out, "user = {}", self.user);
        let _ = writeln!(out, "group = {}", self.group);
        let _ = writeln!(out, "exception-window = {}", self.exception_window_s);
        let _ = writeln!(out, "max-exceptions = {}", self.max_exceptions);
        let _ = writeln!(out, "threads = {}", self.workers);
        let _ = writeln!(out);

        let _ = writeln!(out, "[logging]");
        let _ = writeln!(out, "facility = {}", self.logging_facility.name());
        let _ = writeln!(out);

        let _ = writeln!(out, "[handler]");
        let _ = writeln!(out, "module = {}", self.handler_descriptor.module);
        if let Some(class) = &self.handler_descriptor.class {
            let _ = writeln!(out, "class = {class}");
        }
        for (k, v) in &self.handler_descriptor.extra {
            let _ = writeln!(out, "{k} = {v}");
        }

        for (name, iface) in &self.interfaces {
            let _ = writeln!(out);
            let _ = writeln!(out, "[interface {name}]");
            let _ = writeln!(out, "multicast = {}", iface.multicast);
            let _ = writeln!(out, "listen-to-self = {}", iface.listen_to_self);
            let link_local = iface
                .link_local
                .iter()
                .map(Ipv6Addr::to_string)
                .collect::<Vec<_>>()
                .join(" ");
            let global = iface
                .global
                .iter()
                .map(Ipv6Addr::to_string)
                .collect::<Vec<_>>()
                .join(" ");
            let _ = writeln!(out, "link-local-addresses = {link_local}");
            let _ = writeln!(out, "global-addresses = {global}");
        }

        out
    }
}

/// Everything parsed from the config file except resolved interfaces.
#[derive(Debug)]
pub struct UnresolvedConfig {
    duid_hex: Option<String>,
    pub(crate) user: String,
    pub(crate) group: String,
    pub(crate) exception_window_s: f64,
    pub(crate) max_exceptions: usize,
    pub(crate) workers: usize,
    pub(crate) logging_facility: SyslogFacility,
    pub(crate) handler_descriptor: HandlerDescriptor,
    pub(crate) raw: RawConfig,
}

impl UnresolvedConfig {
    /// Loads and parses the config file. Failure to open or parse the
    /// file is always fatal.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| Error::ConfigOpen {
            path: path.display().to_string(),
            source,
        })?;
        let raw = RawConfig::parse(&text)?;

        let server = raw.section("server");
        let logging = raw.section("logging");
        let handler = raw.section("handler");

        let duid_hex = server
            .and_then(|s| s.get("duid"))
            .filter(|v| !v.trim().is_empty())
            .map(str::to_string);

        let user = server.and_then(|s| s.get("user")).unwrap_or("nobody").to_string();
        let group = server.and_then(|s| s.get("group")).unwrap_or("nobody").to_string();

        let exception_window_s = server
            .and_then(|s| s.get("exception-window"))
            .map(|v| v.parse::<f64>().map_err(|_| Error::ConfigSyntax {
                line: 0,
                message: format!("invalid exception-window value '{v}'"),
            }))
            .transpose()?
            .unwrap_or(1.0);

        let max_exceptions = server
            .and_then(|s| s.get("max-exceptions"))
            .map(|v| v.parse::<usize>().map_err(|_| Error::ConfigSyntax {
                line: 0,
                message: format!("invalid max-exceptions value '{v}'"),
            }))
            .transpose()?
            .unwrap_or(10);

        let workers = server
            .and_then(|s| s.get("threads"))
            .map(|v| v.parse::<usize>().map_err(|_| Error::ConfigSyntax {
                line: 0,
                message: format!("invalid threads value '{v}'"),
            }))
            .transpose()?
            .unwrap_or(10)
            .max(1);

        let facility_name = logging.and_then(|s| s.get("facility")).unwrap_or("daemon");
        let logging_facility = SyslogFacility::parse(facility_name)
            .ok_or_else(|| Error::UnknownFacility(facility_name.to_string()))?;

        let mut handler_descriptor = HandlerDescriptor::default();
        if let Some(handler) = handler {
            handler_descriptor.module = handler.get("module").unwrap_or_default().to_string();
            handler_descriptor.class = handler.get("class").map(str::to_string);
            for (k, v) in handler.iter() {
                if k != "module" && k != "class" {
                    handler_descriptor.extra.insert(k.to_string(), v.to_string());
                }
            }
        }

        Ok(UnresolvedConfig {
            duid_hex,
            user,
            group,
            exception_window_s,
            max_exceptions,
            workers,
            logging_facility,
            handler_descriptor,
            raw,
        })
    }

    pub(crate) fn configured_duid_hex(&self) -> Option<&str> {
        self.duid_hex.as_deref()
    }

    pub(crate) fn raw(&self) -> &RawConfig {
        &self.raw
    }

    /// Completes configuration loading once interfaces have been resolved
    /// against the live OS interface list and a DUID has been derived.
    pub fn finish(
        self,
        duid: Duid,
        interfaces: BTreeMap<String, InterfaceConfig>,
    ) -> ServerConfig {
        ServerConfig {
            duid,
            user: self.user,
            group: self.group,
            exception_window_s: self.exception_window_s,
            max_exceptions: self.max_exceptions,
            workers: self.workers,
            logging_facility: self.logging_facility,
            handler_descriptor: self.handler_descriptor,
            interfaces,
        }
    }
}

/// Test-only helpers for building an [`UnresolvedConfig`] from in-memory
/// text, used by [`crate::iface`]'s tests.
#[cfg(test)]
pub(crate) mod tests_support {
    use super::{HandlerDescriptor, RawConfig, SyslogFacility, UnresolvedConfig};

    pub(crate) fn parse_raw(text: &str) -> RawConfig {
        RawConfig::parse(text).unwrap()
    }

    pub(crate) fn unresolved_from_raw(raw: RawConfig) -> UnresolvedConfig {
        UnresolvedConfig {
            duid_hex: None,
            user: "nobody".to_string(),
            group: "nobody".to_string(),
            exception_window_s: 1.0,
            max_exceptions: 10,
            workers: 10,
            logging_facility: SyslogFacility::Daemon,
            handler_descriptor: HandlerDescriptor::default(),
            raw,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_use_documented_values() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("dhcp6d-test-config-defaults-{:p}", &dir));
        std::fs::write(&path, "[handler]\nmodule = demo\n").unwrap();
        let cfg = UnresolvedConfig::load(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(cfg.user, "nobody");
        assert_eq!(cfg.group, "nobody");
        assert_eq!(cfg.exception_window_s, 1.0);
        assert_eq!(cfg.max_exceptions, 10);
        assert_eq!(cfg.workers, 10);
        assert_eq!(cfg.logging_facility, SyslogFacility::Daemon);
    }

    #[test]
    fn rejects_unknown_facility() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("dhcp6d-test-config-bad-facility-{:p}", &dir));
        std::fs::write(&path, "[logging]\nfacility = nonsense\n").unwrap();
        let err = UnresolvedConfig::load(&path).unwrap_err();
        std::fs::remove_file(&path).ok();
        assert!(matches!(err, Error::UnknownFacility(_)));
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = UnresolvedConfig::load("/nonexistent/dhcp6d.conf").unwrap_err();
        assert!(matches!(err, Error::ConfigOpen { .. }));
    }
}
