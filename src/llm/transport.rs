//! Blocking JSON-over-HTTP transport.

use std::error::Error as _;
use std::io;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

/// How a single POST went wrong, reduced to what the fallback ladder needs.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("HTTP status {0}")]
    Status(u16),
    #[error("{0}")]
    Other(String),
}

/// POST a JSON body and decode a JSON response.
pub trait HttpTransport {
    fn post_json(&self, url: &str, body: &Value) -> Result<Value, TransportError>;
}

/// `ureq` agent with a fixed per-request timeout.
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new(timeout: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
        }
    }
}

impl HttpTransport for UreqTransport {
    fn post_json(&self, url: &str, body: &Value) -> Result<Value, TransportError> {
        let response = match self.agent.post(url).send_json(body) {
            Ok(response) => response,
            Err(ureq::Error::Status(code, _)) => return Err(TransportError::Status(code)),
            Err(ureq::Error::Transport(transport)) => {
                return Err(if transport_timed_out(&transport) {
                    TransportError::Timeout
                } else {
                    TransportError::Other(transport.to_string())
                });
            }
        };

        response.into_json::<Value>().map_err(|e| {
            if is_timeout_kind(e.kind()) {
                TransportError::Timeout
            } else {
                TransportError::Other(format!("failed to decode response body: {e}"))
            }
        })
    }
}

fn transport_timed_out(transport: &ureq::Transport) -> bool {
    transport.kind() == ureq::ErrorKind::Io
        && transport
            .source()
            .and_then(|source| source.downcast_ref::<io::Error>())
            .is_some_and(|io_err| is_timeout_kind(io_err.kind()))
}

fn is_timeout_kind(kind: io::ErrorKind) -> bool {
    matches!(kind, io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    /// Serve exactly one canned HTTP response on a loopback port.
    fn serve_once(status_line: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 4096];
            let _ = stream.read(&mut buf);
            let response = format!(
                "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = stream.write_all(response.as_bytes());
        });
        format!("http://{addr}/api/chat")
    }

    #[test]
    fn decodes_json_body() {
        let url = serve_once("200 OK", r#"{"message":{"content":"y"}}"#);
        let transport = UreqTransport::new(Duration::from_secs(5));
        let value = transport
            .post_json(&url, &serde_json::json!({"model": "m"}))
            .unwrap();
        assert_eq!(value["message"]["content"], "y");
    }

    #[test]
    fn maps_status_codes() {
        let url = serve_once("404 Not Found", "{}");
        let transport = UreqTransport::new(Duration::from_secs(5));
        let err = transport.post_json(&url, &Value::Null).unwrap_err();
        assert!(matches!(err, TransportError::Status(404)));
    }

    #[test]
    fn silent_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            thread::sleep(Duration::from_millis(600));
            drop(stream);
        });

        let transport = UreqTransport::new(Duration::from_millis(200));
        let err = transport
            .post_json(&format!("http://{addr}/api/chat"), &Value::Null)
            .unwrap_err();
        assert!(matches!(err, TransportError::Timeout), "got {err:?}");
        handle.join().unwrap();
    }

    #[test]
    fn refused_connection_is_other() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport = UreqTransport::new(Duration::from_secs(1));
        let err = transport
            .post_json(&format!("http://{addr}/"), &Value::Null)
            .unwrap_err();
        assert!(matches!(err, TransportError::Other(_)), "got {err:?}");
    }
}
