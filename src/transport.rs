// HTTP transport boundary. The core only consumes these traits; the ESP-IDF
// implementation lives in `esp::http`.

use anyhow::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

/// One request/response exchange.
///
/// Headers and body are set before `open`; status, length and body are
/// available after it returns `Ok`.
pub trait HttpSession {
    fn set_header(&mut self, name: &str, value: &str);

    fn set_body(&mut self, body: Vec<u8>);

    fn open(&mut self, method: Method, url: &str) -> Result<()>;

    fn status(&self) -> u16;

    /// Declared body length, `None` when the response carries none
    fn content_length(&self) -> Option<u64>;

    /// `Ok(0)` marks the end of the body
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    fn read_all(&mut self) -> Result<Vec<u8>> {
        let mut body = Vec::new();
        let mut buf = [0u8; 512];
        loop {
            let n = self.read(&mut buf)?;
            if n == 0 {
                break;
            }
            body.extend_from_slice(&buf[..n]);
        }
        Ok(body)
    }

    fn close(&mut self);
}

/// Hands out a fresh session per exchange; sessions are never reused.
pub trait HttpConnector {
    type Session: HttpSession;

    fn create(&self) -> Result<Self::Session>;
}
