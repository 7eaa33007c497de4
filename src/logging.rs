//! Log setup: a syslog sink always on, plus an optional stdout sink whose
//! verbosity follows the `-v` flag count, mirroring `set_up_logger()`.

use std::fmt::Write as _;
use std::os::unix::net::UnixDatagram;
use std::sync::Mutex;

use tracing::Level;
use tracing_subscriber::Layer;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::SyslogFacility;

const SYSLOG_PATH: &str = "/dev/log";

/// A minimal RFC 3164 syslog writer over a Unix domain socket.
///
/// No crate in the dependency stack speaks syslog, so this is hand-rolled:
/// one UDP-style datagram per event, `<priority>message` with no
/// timestamp or hostname (syslogd fills those in for a local socket).
struct SyslogLayer {
    socket: Mutex<Option<UnixDatagram>>,
    facility_code: u8,
}

impl SyslogLayer {
    fn connect(facility: SyslogFacility) -> Self {
        let socket = UnixDatagram::unbound()
            .and_then(|sock| sock.connect(SYSLOG_PATH).map(|_| sock))
            .ok();
        if socket.is_none() {
            eprintln!("warning: could not connect to {SYSLOG_PATH}, syslog output disabled");
        }
        SyslogLayer { socket: Mutex::new(socket), facility_code: facility.code() }
    }

    fn severity(level: &Level) -> u8 {
        match *level {
            Level::ERROR => 3,
            Level::WARN => 4,
            Level::INFO => 6,
            Level::DEBUG | Level::TRACE => 7,
        }
    }
}

impl<S> Layer<S> for SyslogLayer
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let priority = self.facility_code * 8 + Self::severity(event.metadata().level());

        let mut message = String::new();
        let mut visitor = MessageVisitor(&mut message);
        event.record(&mut visitor);

        let line = format!("<{priority}>{}: {message}", event.metadata().target());

        let mut guard = self.socket.lock().expect("syslog socket mutex poisoned");
        if let Some(socket) = guard.as_mut() {
            if socket.send(line.as_bytes()).is_err() {
                *guard = None;
            }
        }
    }
}

struct MessageVisitor<'a>(&'a mut String);

impl tracing::field::Visit for MessageVisitor<'_> {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.0, "{value:?}");
        } else {
            let _ = write!(self.0, " {}={value:?}", field.name());
        }
    }
}

/// Installs the global subscriber: syslog always, plus stdout at a level
/// selected by `-v` count (0 = off, 1 = warn, 2 = info, 3+ = debug).
pub fn init(facility: SyslogFacility, verbosity: u8) {
    let stdout_level = match verbosity {
        0 => None,
        1 => Some(Level::WARN),
        2 => Some(Level::INFO),
        _ => Some(Level::DEBUG),
    };

    let registry = tracing_subscriber::registry().with(SyslogLayer::connect(facility));

    // Re-entrant callers (repeated `render_config`/`serve` calls in the
    // same process, as in tests) would otherwise panic on the second
    // `set_global_default`; only the first call's subscriber wins.
    if let Some(level) = stdout_level {
        let stdout_layer = tracing_subscriber::fmt::layer().with_filter(
            tracing_subscriber::filter::LevelFilter::from_level(level),
        );
        let _ = registry.with(stdout_layer).try_init();
    } else {
        let _ = registry.try_init();
    }
}
