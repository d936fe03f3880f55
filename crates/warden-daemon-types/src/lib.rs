//! Wire types shared by `wardend` and the `warden` client.
//!
//! Each connection carries exactly one JSON Lines exchange: the client writes
//! an [`RpcRequest`] line and the daemon answers with one [`RpcReply`] line.
//! A failed call only ever surfaces as a [`PublicFault`]; the stable faults
//! the daemon emits on its own are listed as [`StableFault`] constants.

use std::borrow::Cow;
use std::io::{self, Write};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Upper bound on a single request line, newline included.
pub const MAX_REQUEST_BYTES: usize = 64 * 1024;

/// A call to a named procedure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    /// Registered procedure name.
    pub method: String,
    /// Positional (array) or keyword (object) arguments.
    #[serde(default)]
    pub params: Value,
}

impl RpcRequest {
    /// Builds a request with the given parameters.
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }

    /// Parses a request line, rejecting blank input.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError`] when the line is empty, not JSON, or the
    /// parameters are neither an array, an object, nor absent.
    pub fn parse(line: &[u8]) -> Result<Self, ProtocolError> {
        let text = std::str::from_utf8(line).map_err(|_| ProtocolError::NotUtf8)?;
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(ProtocolError::Empty);
        }
        let request: Self = serde_json::from_str(trimmed)?;
        match request.params {
            Value::Array(_) | Value::Object(_) | Value::Null => Ok(request),
            _ => Err(ProtocolError::InvalidParams),
        }
    }

    /// Writes the request as a single JSONL line.
    ///
    /// # Errors
    ///
    /// Returns an error when serialisation or writing fails.
    pub fn write_jsonl<W: Write>(&self, writer: &mut W) -> Result<(), ProtocolError> {
        serde_json::to_writer(&mut *writer, self)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }
}

/// The daemon's answer to one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RpcReply {
    /// The procedure returned a value.
    Result {
        /// Returned value.
        value: Value,
    },
    /// The call failed; only public faults are ever carried here.
    Fault {
        /// Stable fault code.
        code: i32,
        /// Operator-facing message.
        message: String,
    },
}

impl RpcReply {
    /// Wraps a successful return value.
    #[must_use]
    pub const fn result(value: Value) -> Self {
        Self::Result { value }
    }

    /// Parses one reply line.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError`] when the line is not a valid reply.
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Err(ProtocolError::Empty);
        }
        Ok(serde_json::from_str(trimmed)?)
    }

    /// Writes the reply as a single JSONL line.
    ///
    /// # Errors
    ///
    /// Returns an error when serialisation or writing fails.
    pub fn write_jsonl<W: Write>(&self, writer: &mut W) -> Result<(), ProtocolError> {
        serde_json::to_writer(&mut *writer, self)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }
}

impl From<PublicFault> for RpcReply {
    fn from(fault: PublicFault) -> Self {
        Self::Fault {
            code: fault.code,
            message: fault.message.into_owned(),
        }
    }
}

/// The only error shape allowed to cross the RPC boundary.
///
/// Procedures may return this directly to expose a failure verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("fault {code}: {message}")]
pub struct PublicFault {
    /// Stable fault code.
    pub code: i32,
    /// Operator-facing message.
    pub message: Cow<'static, str>,
}

impl PublicFault {
    /// Builds a fault with a caller-chosen code and message.
    pub fn new(code: i32, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// A fixed code/message pair emitted by the daemon itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StableFault {
    /// Stable fault code.
    pub code: i32,
    /// Fixed message; never carries details of the underlying failure.
    pub message: &'static str,
}

impl StableFault {
    /// Materialises the fault for transmission.
    #[must_use]
    pub const fn fault(self) -> PublicFault {
        PublicFault {
            code: self.code,
            message: Cow::Borrowed(self.message),
        }
    }
}

impl From<StableFault> for PublicFault {
    fn from(stable: StableFault) -> Self {
        stable.fault()
    }
}

/// Any failure the fault layer could not classify.
pub const GENERIC_INTERNAL_ERROR: StableFault = StableFault {
    code: 1,
    message: "internal error",
};

/// A lower-level protocol fault raised while serving a call.
pub const GENERIC_RPC_ERROR: StableFault = StableFault {
    code: 2,
    message: "RPC error",
};

/// The object or resource a call referred to does not exist.
pub const OBJECT_NOT_FOUND: StableFault = StableFault {
    code: 3,
    message: "object not found",
};

/// No procedure with the requested name is registered.
pub const METHOD_NOT_FOUND: StableFault = StableFault {
    code: 4,
    message: "method not found",
};

/// The request line could not be decoded.
pub const MALFORMED_REQUEST: StableFault = StableFault {
    code: 5,
    message: "malformed request",
};

/// Errors raised while framing or decoding protocol lines.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The line was blank.
    #[error("request line is empty")]
    Empty,
    /// The line was not valid UTF-8.
    #[error("request line is not valid UTF-8")]
    NotUtf8,
    /// Parameters were a scalar rather than an array or object.
    #[error("params must be an array or an object")]
    InvalidParams,
    /// JSON encoding or decoding failed.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// Writing to the stream failed.
    #[error("failed to write message: {0}")]
    Io(#[from] io::Error),
}
