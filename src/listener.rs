//! Per-socket receive loops and OS signal bridging.
//!
//! Each [`crate::socket::ListeningSocket`] gets its own task reading
//! datagrams in a loop, and a dedicated task bridges `SIGHUP`/`SIGINT`/
//! `SIGTERM` via `tokio::signal::unix`.

use std::net::{SocketAddr, SocketAddrV6};
use std::sync::Arc;

use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::handler::Handler;
use crate::message::{HandlerResult, Message};
use crate::socket::ListeningSocket;
use crate::supervisor::FaultTracker;
use crate::worker::{JobTracker, WorkerPool};

const BUFFER_SIZE: usize = 1500;

/// Runs the receive loop for one socket until shutdown is requested or
/// the socket itself errors out.
pub(crate) async fn run_listener(
    listening: Arc<ListeningSocket>,
    handler: Arc<dyn Handler>,
    pool: WorkerPool,
    jobs: JobTracker,
    faults: FaultTracker,
    shutdown: CancellationToken,
) {
    let mut buf = vec![0u8; BUFFER_SIZE];

    loop {
        let (len, sender) = tokio::select! {
            _ = shutdown.cancelled() => return,
            result = listening.socket.recv_from(&mut buf) => match result {
                Ok(pair) => pair,
                Err(e) => {
                    tracing::error!(interface = %listening.interface, error = %e, "recv_from failed");
                    if faults.record_fault() {
                        shutdown.cancel();
                    }
                    return;
                }
            },
        };

        let sender = match sender {
            SocketAddr::V6(v6) => v6,
            SocketAddr::V4(_) => continue,
        };

        let local = match listening.local_addr() {
            Ok(SocketAddr::V6(v6)) => v6,
            _ => continue,
        };

        let message = match Message::parse(&buf[..len]) {
            Ok(message) => message,
            Err(e) => {
                tracing::info!(%sender, error = %e, "dropping unparsable datagram");
                continue;
            }
        };

        let permit = pool.acquire().await;
        let handler = Arc::clone(&handler);
        let listening = Arc::clone(&listening);

        jobs.spawn(async move {
            let _permit = permit;
            let result = handler.handle(&message, sender, local).await;
            if let Err(e) = dispatch(&listening, result, sender).await {
                // A per-request send failure is a handler/network fault, not
                // a listener fault: it never counts toward the exception
                // storm threshold, or one unreachable peer could take the
                // whole server down.
                tracing::error!(%sender, error = %e, "failed to send reply");
            }
        })
        .await;
    }
}

async fn dispatch(listening: &ListeningSocket, result: HandlerResult, sender: SocketAddrV6) -> Result<()> {
    let (message, destination) = match result {
        HandlerResult::None => return Ok(()),
        HandlerResult::Reply(message) => (message, sender),
        HandlerResult::ReplyTo(message, destination) => (message, destination),
    };

    let bytes = match message.serialize() {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(%destination, error = %e, "failed to serialize reply, dropping");
            return Ok(());
        }
    };

    listening.reply_socket().send_to(&bytes, SocketAddr::V6(destination)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::net::{Ipv6Addr, SocketAddrV6};

    use super::*;
    use crate::socket::test_support::{bind_loopback, multicast_for_test, unicast_for_test};

    fn loopback_addr(socket: &Arc<tokio::net::UdpSocket>) -> SocketAddrV6 {
        match socket.local_addr().unwrap() {
            SocketAddr::V6(v6) => v6,
            SocketAddr::V4(_) => unreachable!("test sockets are always v6"),
        }
    }

    #[tokio::test]
    async fn dispatch_drops_none_without_sending() {
        let socket = bind_loopback().await;
        let listening = unicast_for_test(socket);
        let sender = SocketAddrV6::new(Ipv6Addr::LOCALHOST, 546, 0, 0);

        dispatch(&listening, HandlerResult::None, sender).await.unwrap();
    }

    #[tokio::test]
    async fn dispatch_replies_to_sender_on_unicast_socket() {
        let reply_socket = bind_loopback().await;
        let listening = unicast_for_test(Arc::clone(&reply_socket));

        let client = bind_loopback().await;
        let client_addr = loopback_addr(&client);

        let message = Message::from_bytes(vec![7, 0, 0, 1]);
        dispatch(&listening, HandlerResult::Reply(message), client_addr).await.unwrap();

        let mut buf = [0u8; 16];
        let (len, from) = client.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], &[7, 0, 0, 1]);
        assert_eq!(from, SocketAddr::V6(loopback_addr(&reply_socket)));
    }

    #[tokio::test]
    async fn dispatch_replies_to_explicit_destination() {
        let reply_socket = bind_loopback().await;
        let listening = unicast_for_test(Arc::clone(&reply_socket));

        let sender_addr = SocketAddrV6::new(Ipv6Addr::LOCALHOST, 1, 0, 0);
        let destination_socket = bind_loopback().await;
        let destination_addr = loopback_addr(&destination_socket);

        let message = Message::from_bytes(vec![7, 0, 0, 2]);
        dispatch(&listening, HandlerResult::ReplyTo(message, destination_addr), sender_addr)
            .await
            .unwrap();

        let mut buf = [0u8; 16];
        let (len, _) = destination_socket.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], &[7, 0, 0, 2]);
    }

    #[tokio::test]
    async fn dispatch_on_multicast_socket_replies_from_paired_socket() {
        let multicast_socket = bind_loopback().await;
        let reply_from = bind_loopback().await;
        let listening = multicast_for_test(multicast_socket, Arc::clone(&reply_from));

        let client = bind_loopback().await;
        let client_addr = loopback_addr(&client);

        let message = Message::from_bytes(vec![7, 0, 0, 3]);
        dispatch(&listening, HandlerResult::Reply(message), client_addr).await.unwrap();

        let mut buf = [0u8; 16];
        let (len, from) = client.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], &[7, 0, 0, 3]);
        assert_eq!(from, SocketAddr::V6(loopback_addr(&reply_from)));
    }

    #[tokio::test]
    async fn dispatch_drops_and_logs_on_serialize_failure() {
        let socket = bind_loopback().await;
        let listening = unicast_for_test(socket);
        let sender = SocketAddrV6::new(Ipv6Addr::LOCALHOST, 546, 0, 0);

        let too_short = Message::from_bytes(vec![1, 2]);
        dispatch(&listening, HandlerResult::Reply(too_short), sender).await.unwrap();
    }
}

/// Bridges `SIGHUP` to [`Handler::reload`] and `SIGINT`/`SIGTERM` to
/// server shutdown.
pub(crate) async fn run_signal_bridge(handler: Arc<dyn Handler>, shutdown: CancellationToken) {
    let mut sighup = match signal(SignalKind::hangup()) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "failed to install SIGHUP handler");
            return;
        }
    };
    let mut sigint = match signal(SignalKind::interrupt()) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "failed to install SIGINT handler");
            return;
        }
    };
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "failed to install SIGTERM handler");
            return;
        }
    };

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = sighup.recv() => {
                tracing::info!("received SIGHUP, reloading handler");
                handler.reload().await;
            }
            _ = sigint.recv() => {
                tracing::info!("received SIGINT, shutting down");
                shutdown.cancel();
                return;
            }
            _ = sigterm.recv() => {
                tracing::info!("received SIGTERM, shutting down");
                shutdown.cancel();
                return;
            }
        }
    }
}
