#![forbid(unsafe_code)]

use std::net::SocketAddrV6;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use dhcp6d::{Handler, HandlerResult, Message};

/// DHCPv6 server core CLI driver.
#[derive(Parser, Debug)]
#[command(name = "dhcp6d", version, about)]
struct Args {
    /// Path to the configuration file.
    config: PathBuf,

    /// Resolve and print the effective configuration, then exit.
    #[arg(short = 'C', long = "show-config")]
    show_config: bool,

    /// Increase log verbosity; repeatable (-v, -vv, -vvv).
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    verbose: u8,
}

/// A placeholder handler that logs and drops every request.
///
/// Loading the real DHCPv6 option codec and lease logic named in
/// `[handler] module=` is outside this crate's scope; production
/// deployments link their own `Handler` implementation against this
/// library instead of running this binary as-is.
struct NullHandler;

#[async_trait]
impl Handler for NullHandler {
    fn name(&self) -> &'static str {
        "null-handler"
    }

    async fn handle(&self, _message: &Message, sender: SocketAddrV6, _local: SocketAddrV6) -> HandlerResult {
        tracing::debug!(%sender, "no handler configured, dropping request");
        HandlerResult::None
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if args.show_config {
        return match dhcp6d::render_config(&args.config, args.verbose) {
            Ok(rendered) => {
                print!("{rendered}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("dhcp6d: {e}");
                ExitCode::FAILURE
            }
        };
    }

    match dhcp6d::serve(&args.config, Arc::new(NullHandler), args.verbose).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("dhcp6d: {e}");
            ExitCode::FAILURE
        }
    }
}
