// HTTP(S) transport over the ESP-IDF HTTP client

use anyhow::{anyhow, Context, Result};
use embedded_svc::http::{Headers, Method as HttpMethod, Status};
use esp_idf_svc::http::client::{Configuration, EspHttpConnection};
use esp_idf_svc::io::{Read, Write};
use std::time::Duration;

use crate::transport::{HttpConnector, HttpSession, Method};

const BUFFER_SIZE: usize = 2048;
const TIMEOUT: Duration = Duration::from_secs(30);

pub struct EspHttpConnector {
    timeout: Duration,
}

impl EspHttpConnector {
    pub fn new() -> Self {
        Self { timeout: TIMEOUT }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for EspHttpConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpConnector for EspHttpConnector {
    type Session = EspHttpSession;

    fn create(&self) -> Result<EspHttpSession> {
        let conn = EspHttpConnection::new(&Configuration {
            buffer_size: Some(BUFFER_SIZE),
            buffer_size_tx: Some(1024),
            timeout: Some(self.timeout),
            crt_bundle_attach: Some(esp_idf_svc::sys::esp_crt_bundle_attach),
            ..Default::default()
        })
        .context("Failed to create EspHttpConnection")?;

        Ok(EspHttpSession {
            conn: Some(conn),
            headers: Vec::new(),
            body: None,
            status: 0,
            content_length: None,
        })
    }
}

/// Headers and body are held until `open`, which sends the whole request
/// and waits for the response headers.
pub struct EspHttpSession {
    conn: Option<EspHttpConnection>,
    headers: Vec<(String, String)>,
    body: Option<Vec<u8>>,
    status: u16,
    content_length: Option<u64>,
}

impl EspHttpSession {
    fn conn(&mut self) -> Result<&mut EspHttpConnection> {
        self.conn.as_mut().ok_or_else(|| anyhow!("HTTP session already closed"))
    }
}

impl HttpSession for EspHttpSession {
    fn set_header(&mut self, name: &str, value: &str) {
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.to_string()));
    }

    fn set_body(&mut self, body: Vec<u8>) {
        self.body = Some(body);
    }

    fn open(&mut self, method: Method, url: &str) -> Result<()> {
        let body = self.body.take();
        let body_len = body.as_ref().map(|b| b.len().to_string());

        let mut headers: Vec<(&str, &str)> = self
            .headers
            .iter()
            .map(|(n, v)| (n.as_str(), v.as_str()))
            .collect();
        if let Some(len) = body_len.as_deref() {
            headers.push(("Content-Length", len));
        }

        let http_method = match method {
            Method::Get => HttpMethod::Get,
            Method::Post => HttpMethod::Post,
        };

        let conn = self
            .conn
            .as_mut()
            .ok_or_else(|| anyhow!("HTTP session already closed"))?;
        conn.initiate_request(http_method, url, &headers)
            .with_context(|| format!("{} {}", method.as_str(), url))?;
        if let Some(body) = body {
            conn.write_all(&body).context("Failed to send request body")?;
        }
        conn.initiate_response().context("Failed to read response headers")?;

        self.status = conn.status();
        self.content_length = conn
            .header("Content-Length")
            .and_then(|v| v.trim().parse::<u64>().ok());
        log::debug!(
            "{} {} -> {} (length {:?})",
            method.as_str(),
            url,
            self.status,
            self.content_length
        );
        Ok(())
    }

    fn status(&self) -> u16 {
        self.status
    }

    fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = self.conn()?.read(buf)?;
        Ok(n)
    }

    fn close(&mut self) {
        // Dropping the connection tears down the socket
        self.conn = None;
    }
}
