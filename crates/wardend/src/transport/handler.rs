//! Connection handling for the serve loop.

use std::io::{self, Read};
use std::net::TcpStream;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use warden_daemon_types::{MALFORMED_REQUEST, MAX_REQUEST_BYTES, RpcReply, RpcRequest};

use crate::rpc::{CallOutcome, ProcedureRegistry};

use super::LISTENER_TARGET;

/// Time a client has to deliver its whole request line.
const REQUEST_DEADLINE: Duration = Duration::from_secs(5);

/// What the serve loop does after a connection has been handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Disposition {
    /// Keep accepting connections.
    Continue,
    /// Stop serving; a procedure requested termination.
    Stop,
}

/// Handles accepted connections one at a time.
pub(crate) trait ConnectionHandler {
    /// Handles a single connection. Implementations should avoid panicking.
    fn handle(&self, stream: TcpStream) -> Disposition;
}

/// A stream whose next read can be bounded in time.
pub(crate) trait BoundedRead: Read {
    /// Caps the wait of the next read at `remaining`.
    fn limit_wait(&mut self, remaining: Duration) -> io::Result<()>;
}

impl BoundedRead for TcpStream {
    fn limit_wait(&mut self, remaining: Duration) -> io::Result<()> {
        self.set_read_timeout(Some(remaining))
    }
}

/// Reads one request line, dispatches it, and writes one reply line.
///
/// The whole line must arrive before the request deadline, so a client
/// trickling bytes cannot hold the serve thread.
pub(crate) struct RpcConnectionHandler<'a> {
    registry: &'a ProcedureRegistry,
    deadline: Duration,
}

impl<'a> RpcConnectionHandler<'a> {
    pub(crate) const fn new(registry: &'a ProcedureRegistry) -> Self {
        Self {
            registry,
            deadline: REQUEST_DEADLINE,
        }
    }

    #[cfg(test)]
    pub(crate) const fn with_deadline(registry: &'a ProcedureRegistry, deadline: Duration) -> Self {
        Self { registry, deadline }
    }

    fn respond(&self, line: &[u8]) -> CallOutcome {
        match RpcRequest::parse(line) {
            Ok(request) => self.registry.dispatch(request),
            Err(error) => {
                warn!(
                    target: LISTENER_TARGET,
                    error = %error,
                    "rejecting malformed request"
                );
                CallOutcome::Reply(RpcReply::from(MALFORMED_REQUEST.fault()))
            }
        }
    }
}

impl ConnectionHandler for RpcConnectionHandler<'_> {
    fn handle(&self, mut stream: TcpStream) -> Disposition {
        let deadline = Instant::now() + self.deadline;
        let outcome = match read_request_line(&mut stream, deadline) {
            Ok(Some(line)) => self.respond(&line),
            Ok(None) => return Disposition::Continue,
            Err(error) if error.kind() == io::ErrorKind::InvalidData => {
                CallOutcome::Reply(RpcReply::from(MALFORMED_REQUEST.fault()))
            }
            Err(error) => {
                warn!(target: LISTENER_TARGET, error = %error, "connection handler error");
                return Disposition::Continue;
            }
        };
        match outcome {
            CallOutcome::Reply(reply) => {
                if let Err(error) = reply.write_jsonl(&mut stream) {
                    warn!(target: LISTENER_TARGET, error = %error, "failed to write reply");
                }
                Disposition::Continue
            }
            CallOutcome::Terminate => {
                debug!(target: LISTENER_TARGET, "termination requested by procedure");
                Disposition::Stop
            }
        }
    }
}

fn read_request_line<R: BoundedRead>(
    stream: &mut R,
    deadline: Instant,
) -> io::Result<Option<Vec<u8>>> {
    let mut buffer = Vec::new();
    let mut chunk = [0_u8; 1024];
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "request line not received before the deadline",
            ));
        }
        stream.limit_wait(remaining)?;
        let bytes_read = read_chunk_with_retry(stream, &mut chunk)?;
        if bytes_read == 0 {
            return Ok((!buffer.is_empty()).then_some(buffer));
        }
        let received = chunk.get(..bytes_read).unwrap_or_default();
        if let Some(pos) = received.iter().position(|byte| *byte == b'\n') {
            buffer.extend_from_slice(received.get(..=pos).unwrap_or_default());
            enforce_request_limit(buffer.len())?;
            return Ok(Some(buffer));
        }
        buffer.extend_from_slice(received);
        enforce_request_limit(buffer.len())?;
    }
}

fn read_chunk_with_retry<R: Read>(stream: &mut R, chunk: &mut [u8]) -> io::Result<usize> {
    loop {
        match stream.read(chunk) {
            Ok(read) => return Ok(read),
            Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
            Err(error) => return Err(error),
        }
    }
}

fn enforce_request_limit(length: usize) -> io::Result<()> {
    if length > MAX_REQUEST_BYTES {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("request exceeds {MAX_REQUEST_BYTES} bytes"),
        ));
    }
    Ok(())
}
