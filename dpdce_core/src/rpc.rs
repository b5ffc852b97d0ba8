//! Request/response transport for the protocol server.
//!
//! Wire format is one JSON object per UDP datagram:
//! request `{"id": .., "method": "..", "params": ..}`, success response
//! `{"id": .., "result": ..}`, error response `{"id": .., "error": ".."}`.
//! The id is echoed verbatim so a client can match replies.
use serde_json::{Value, json};
use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::Duration;
use thiserror::Error;

const MAX_DATAGRAM: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub addr: SocketAddr,
    pub id: Value,
    pub method: String,
    pub params: Value,
}

#[derive(Debug, Error)]
pub enum TransportError {
    /// No request arrived within the poll interval.
    #[error("timed out waiting for a request")]
    Timeout,
    #[error("malformed request from {addr}: {reason}")]
    Malformed { addr: SocketAddr, reason: String },
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub trait Transport {
    fn receive_request(&mut self) -> Result<Request, TransportError>;
    fn send_success_response(
        &mut self,
        addr: SocketAddr,
        id: &Value,
        payload: Value,
    ) -> Result<(), TransportError>;
    fn send_error_response(
        &mut self,
        addr: SocketAddr,
        id: &Value,
        message: &str,
    ) -> Result<(), TransportError>;
}

/// Parse one datagram. `id` and `method` are required, `params` defaults to null.
pub fn decode_request(addr: SocketAddr, bytes: &[u8]) -> Result<Request, TransportError> {
    let malformed = |reason: String| TransportError::Malformed { addr, reason };
    let value: Value = serde_json::from_slice(bytes).map_err(|e| malformed(e.to_string()))?;
    let Value::Object(mut obj) = value else {
        return Err(malformed("request is not an object".into()));
    };
    let id = obj
        .remove("id")
        .ok_or_else(|| malformed("missing id".into()))?;
    let method = match obj.remove("method") {
        Some(Value::String(m)) => m,
        Some(_) => return Err(malformed("method must be a string".into())),
        None => return Err(malformed("missing method".into())),
    };
    let params = obj.remove("params").unwrap_or(Value::Null);
    Ok(Request {
        addr,
        id,
        method,
        params,
    })
}

pub fn encode_success(id: &Value, payload: Value) -> Vec<u8> {
    json!({ "id": id, "result": payload }).to_string().into_bytes()
}

pub fn encode_error(id: &Value, message: &str) -> Vec<u8> {
    json!({ "id": id, "error": message }).to_string().into_bytes()
}

/// UDP transport with a bounded receive wait so the serve loop can notice shutdown.
pub struct UdpTransport {
    socket: UdpSocket,
    buf: Vec<u8>,
}

impl UdpTransport {
    pub fn bind(addr: impl ToSocketAddrs, poll_timeout: Duration) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_read_timeout(Some(poll_timeout))?;
        Ok(Self {
            socket,
            buf: vec![0; MAX_DATAGRAM],
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    fn send(&self, addr: SocketAddr, bytes: &[u8]) -> Result<(), TransportError> {
        self.socket.send_to(bytes, addr)?;
        Ok(())
    }
}

impl Transport for UdpTransport {
    fn receive_request(&mut self) -> Result<Request, TransportError> {
        loop {
            match self.socket.recv_from(&mut self.buf) {
                Ok((n, addr)) => return decode_request(addr, &self.buf[..n]),
                Err(e) => match e.kind() {
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => {
                        return Err(TransportError::Timeout);
                    }
                    // ICMP port-unreachable from an earlier reply surfaces here on some platforms.
                    io::ErrorKind::ConnectionRefused | io::ErrorKind::ConnectionReset => continue,
                    _ => return Err(e.into()),
                },
            }
        }
    }

    fn send_success_response(
        &mut self,
        addr: SocketAddr,
        id: &Value,
        payload: Value,
    ) -> Result<(), TransportError> {
        self.send(addr, &encode_success(id, payload))
    }

    fn send_error_response(
        &mut self,
        addr: SocketAddr,
        id: &Value,
        message: &str,
    ) -> Result<(), TransportError> {
        self.send(addr, &encode_error(id, message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn addr() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 50055))
    }

    #[test]
    fn decodes_request_with_params() {
        let req = decode_request(
            addr(),
            br#"{"id": 7, "method": "set_setting", "params": {"rx_gain": 12}}"#,
        )
        .unwrap();
        assert_eq!(req.id, json!(7));
        assert_eq!(req.method, "set_setting");
        assert_eq!(req.params, json!({"rx_gain": 12}));
    }

    #[test]
    fn params_default_to_null() {
        let req = decode_request(addr(), br#"{"id": "a", "method": "get_results"}"#).unwrap();
        assert_eq!(req.params, Value::Null);
    }

    #[rstest]
    #[case(&b"not json"[..])]
    #[case(&b"[1, 2]"[..])]
    #[case(&br#"{"method": "reset"}"#[..])]
    #[case(&br#"{"id": 1}"#[..])]
    #[case(&br#"{"id": 1, "method": 3}"#[..])]
    fn rejects_malformed(#[case] bytes: &[u8]) {
        let err = decode_request(addr(), bytes).unwrap_err();
        assert!(matches!(err, TransportError::Malformed { .. }), "{err}");
    }

    #[test]
    fn responses_echo_id() {
        let ok: Value = serde_json::from_slice(&encode_success(&json!(3), json!("ok"))).unwrap();
        assert_eq!(ok, json!({"id": 3, "result": "ok"}));
        let err: Value = serde_json::from_slice(&encode_error(&json!("x"), "busy")).unwrap();
        assert_eq!(err, json!({"id": "x", "error": "busy"}));
    }

    #[test]
    fn udp_receive_times_out() {
        let mut t = UdpTransport::bind("127.0.0.1:0", Duration::from_millis(20)).unwrap();
        assert!(matches!(t.receive_request(), Err(TransportError::Timeout)));
    }
}
