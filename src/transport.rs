//! The transport collaborator.
//!
//! The core consumes transport through this one narrow contract and owns
//! no HTTP logic itself; retry policy, if any, belongs to the caller.

use crate::error::SecurityError;
use std::time::Duration;

/// Posts a secured envelope and returns the peer's status and raw body.
pub trait Transport {
    fn post_envelope(
        &self,
        url: &str,
        body: &[u8],
        headers: &[(String, String)],
    ) -> Result<(u16, Vec<u8>), SecurityError>;
}

/// Production HTTP transport.
pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, SecurityError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| SecurityError::Transport(e.to_string()))?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn post_envelope(
        &self,
        url: &str,
        body: &[u8],
        headers: &[(String, String)],
    ) -> Result<(u16, Vec<u8>), SecurityError> {
        let mut request = self.client.post(url).body(body.to_vec());
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }
        let response = request
            .send()
            .map_err(|e| SecurityError::Transport(e.to_string()))?;
        let status = response.status().as_u16();
        let bytes = response
            .bytes()
            .map_err(|e| SecurityError::Transport(e.to_string()))?
            .to_vec();
        Ok((status, bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    /// Canned-response double; also used by the integration suite.
    struct StubTransport {
        status: u16,
        response: Vec<u8>,
        seen_headers: RefCell<Vec<(String, String)>>,
    }

    impl Transport for StubTransport {
        fn post_envelope(
            &self,
            _url: &str,
            _body: &[u8],
            headers: &[(String, String)],
        ) -> Result<(u16, Vec<u8>), SecurityError> {
            *self.seen_headers.borrow_mut() = headers.to_vec();
            Ok((self.status, self.response.clone()))
        }
    }

    #[test]
    fn test_transport_is_object_safe() {
        let stub = StubTransport {
            status: 200,
            response: b"<ok/>".to_vec(),
            seen_headers: RefCell::new(Vec::new()),
        };
        let transport: &dyn Transport = &stub;
        let headers = vec![("SOAPAction".to_string(), "GetSession".to_string())];
        let (status, body) = transport
            .post_envelope("http://example/ws", b"<e/>", &headers)
            .unwrap();
        assert_eq!(status, 200);
        assert_eq!(body, b"<ok/>");
        assert_eq!(stub.seen_headers.borrow().len(), 1);
    }
}
