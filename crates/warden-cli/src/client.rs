//! One-shot RPC client for the loopback endpoint.

use std::io::{self, BufRead, BufReader};
use std::net::{Ipv4Addr, SocketAddr, TcpStream};
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

use warden_daemon_types::{ProtocolError, RpcReply, RpcRequest};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Errors raised while talking to the daemon.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Nothing is listening on the endpoint.
    #[error("Server does not seem to be running (nothing listening on {addr})")]
    NotRunning {
        /// Endpoint that refused the connection.
        addr: SocketAddr,
    },
    /// Connecting failed for another reason.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        /// Endpoint being contacted.
        addr: SocketAddr,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Sending the request failed.
    #[error("failed to send request: {0}")]
    Send(#[source] ProtocolError),
    /// Reading the reply failed.
    #[error("failed to read reply: {0}")]
    Read(#[source] io::Error),
    /// The reply line could not be decoded.
    #[error("failed to decode reply: {0}")]
    Decode(#[source] ProtocolError),
    /// The daemon closed the connection without replying.
    #[error("the daemon closed the connection without replying")]
    Closed,
}

/// Sends `method(params)` to the daemon on `127.0.0.1:port` and returns its reply.
pub fn call(port: u16, method: &str, params: Value) -> Result<RpcReply, ClientError> {
    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
    let mut stream = TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT).map_err(|source| {
        if source.kind() == io::ErrorKind::ConnectionRefused {
            ClientError::NotRunning { addr }
        } else {
            ClientError::Connect { addr, source }
        }
    })?;
    RpcRequest::new(method, params)
        .write_jsonl(&mut stream)
        .map_err(ClientError::Send)?;
    let mut line = String::new();
    let read = BufReader::new(stream)
        .read_line(&mut line)
        .map_err(ClientError::Read)?;
    if read == 0 {
        return Err(ClientError::Closed);
    }
    RpcReply::parse(&line).map_err(ClientError::Decode)
}
