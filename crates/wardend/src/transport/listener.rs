//! Single-threaded serve loop on a loopback TCP endpoint.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, TcpListener};
use std::thread;
use std::time::Duration;

use tracing::{info, warn};

use crate::process::ShutdownController;

use super::{ConnectionHandler, Disposition, LISTENER_TARGET, ListenerError};

const ACCEPT_BACKOFF: Duration = Duration::from_millis(25);
const ERROR_BACKOFF: Duration = Duration::from_millis(150);

/// Listener bound to `127.0.0.1:<port>`.
#[derive(Debug)]
pub(crate) struct RpcListener {
    listener: TcpListener,
    addr: SocketAddr,
}

impl RpcListener {
    pub(crate) fn bind(port: u16) -> Result<Self, ListenerError> {
        let requested = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
        let listener = TcpListener::bind(requested).map_err(|source| ListenerError::Bind {
            addr: requested,
            source,
        })?;
        listener
            .set_nonblocking(true)
            .map_err(|source| ListenerError::NonBlocking { source })?;
        let addr = listener
            .local_addr()
            .map_err(|source| ListenerError::NonBlocking { source })?;
        Ok(Self { listener, addr })
    }

    pub(crate) const fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Accepts and handles connections one at a time until the shutdown
    /// controller requests termination or a handler asks to stop.
    ///
    /// The controller is polled between accepts, so a termination signal is
    /// observed within one back-off interval once the current call returns.
    pub(crate) fn serve<H: ConnectionHandler>(
        &self,
        handler: &H,
        shutdown: &ShutdownController,
    ) -> Result<(), ListenerError> {
        info!(
            target: LISTENER_TARGET,
            endpoint = %self.addr,
            "rpc endpoint listening"
        );
        let mut last_error = None::<io::ErrorKind>;
        while !shutdown.check()? {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    last_error = None;
                    if let Err(error) = stream.set_nonblocking(false) {
                        warn!(target: LISTENER_TARGET, error = %error, %peer, "dropping connection");
                        continue;
                    }
                    if handler.handle(stream) == Disposition::Stop {
                        shutdown.request_shutdown();
                    }
                }
                Err(error) if error.kind() == io::ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_BACKOFF);
                }
                Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
                Err(error) => {
                    let kind = error.kind();
                    if last_error != Some(kind) {
                        warn!(
                            target: LISTENER_TARGET,
                            error = %error,
                            "socket accept error"
                        );
                    }
                    last_error = Some(kind);
                    thread::sleep(ERROR_BACKOFF);
                }
            }
        }
        info!(target: LISTENER_TARGET, "serve loop stopped");
        Ok(())
    }
}
