//! Streaming download, verify and flash.
//!
//! Bytes are hashed in wire order as they arrive and written straight to the
//! inactive OTA slot, so the image is never held in RAM. Writes start only
//! once the image header region has been buffered, and the boot target is
//! switched only after the MD5 matches and the driver accepts the image.

use crate::clock::Clock;
use crate::error::{ErrorKind, OtaError, Result};
use crate::hash::{digests_match, HashAccumulator};
use crate::image::{AppDescriptor, HEADER_REGION_LEN};
use crate::storage::{FlashError, ImageWriter};
use crate::task::UpdateTask;
use crate::transport::{HttpConnector, HttpSession, Method};

/// Upper bound for one read buffer
pub const MAX_CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadProgress {
    /// 0..=100
    pub percent: u8,
    /// Bytes received since the previous report
    pub recent_bytes: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradeState {
    Idle,
    HeaderBuffering,
    Writing,
    Verifying,
    Committing,
    Done,
    Failed(ErrorKind),
}

pub(crate) struct Pipeline<'a, W: ImageWriter, K: Clock> {
    writer: &'a mut W,
    clock: &'a K,
    chunk_size: usize,
    interval_us: u64,
    state: UpgradeState,
    session: Option<W::Handle>,
    app: Option<AppDescriptor>,
    bytes_written: u64,
}

impl<'a, W: ImageWriter, K: Clock> Pipeline<'a, W, K> {
    pub fn new(writer: &'a mut W, clock: &'a K, chunk_size: usize, interval_ms: u64) -> Self {
        Self {
            writer,
            clock,
            chunk_size: chunk_size.clamp(1, MAX_CHUNK_SIZE),
            interval_us: interval_ms.saturating_mul(1000),
            state: UpgradeState::Idle,
            session: None,
            app: None,
            bytes_written: 0,
        }
    }

    pub fn state(&self) -> UpgradeState {
        self.state
    }

    pub fn take_app(&mut self) -> Option<AppDescriptor> {
        self.app.take()
    }

    /// Run one upgrade. Any failure aborts an open write session before
    /// returning, and leaves the boot target untouched.
    pub fn run<N, F>(
        &mut self,
        connector: &N,
        prepare: impl FnOnce(&mut N::Session),
        url: &str,
        task: &UpdateTask,
        on_progress: F,
    ) -> Result<()>
    where
        N: HttpConnector,
        F: FnMut(DownloadProgress),
    {
        let result = self.execute(connector, prepare, url, task, on_progress);
        if let Err(e) = &result {
            if let Some(handle) = self.session.take() {
                log::warn!("Aborting OTA write after {} bytes", self.bytes_written);
                self.writer.abort(handle);
            }
            log::error!("Firmware upgrade failed: {}", e);
            self.transition(UpgradeState::Failed(e.kind()));
        }
        result
    }

    fn execute<N, F>(
        &mut self,
        connector: &N,
        prepare: impl FnOnce(&mut N::Session),
        url: &str,
        task: &UpdateTask,
        on_progress: F,
    ) -> Result<()>
    where
        N: HttpConnector,
        F: FnMut(DownloadProgress),
    {
        let target = self
            .writer
            .next_update_target()
            .ok_or(OtaError::StorageUnavailable)?;
        log::info!("Writing to partition {}", self.writer.describe(&target));

        let mut http = connector
            .create()
            .map_err(|e| OtaError::transport("Failed to create HTTP session", e))?;
        prepare(&mut http);
        let streamed = self.stream(&mut http, &target, url, task, on_progress);
        http.close();
        let digest = streamed?;

        self.transition(UpgradeState::Verifying);
        log::info!("Calculated MD5: {}", digest);
        log::info!("Expected MD5: {}", task.expected_digest);
        if !digests_match(&digest, &task.expected_digest) {
            log::error!("MD5 verification failed!");
            return Err(OtaError::Integrity {
                expected: task.expected_digest.clone(),
                actual: digest,
            });
        }
        log::info!("MD5 verification passed!");

        self.commit(&target)
    }

    /// Download, hash and write the body. Returns the lowercase hex MD5.
    fn stream<S, F>(
        &mut self,
        http: &mut S,
        target: &W::Target,
        url: &str,
        task: &UpdateTask,
        mut on_progress: F,
    ) -> Result<String>
    where
        S: HttpSession,
        F: FnMut(DownloadProgress),
    {
        http.open(Method::Get, url)
            .map_err(|e| OtaError::transport("Failed to open HTTP connection", e))?;

        let status = http.status();
        if status != 200 {
            return Err(OtaError::Transport(format!(
                "Failed to get firmware, status code: {}",
                status
            )));
        }

        let content_length = http.content_length().unwrap_or(0);
        if content_length == 0 || content_length != task.declared_size {
            return Err(OtaError::SizeMismatch {
                declared: content_length,
                expected: task.declared_size,
            });
        }

        self.transition(UpgradeState::HeaderBuffering);
        let mut hash = HashAccumulator::new();
        let mut header = Vec::with_capacity(HEADER_REGION_LEN);
        let mut buffer = vec![0u8; self.chunk_size];
        let mut total_read: u64 = 0;
        let mut recent_read: usize = 0;
        let mut last_calc_time = self.clock.now_us();

        loop {
            let n = http
                .read(&mut buffer)
                .map_err(|e| OtaError::transport("Failed to read HTTP data", e))?;
            let chunk = &buffer[..n];

            hash.update(chunk);

            // Calculate speed and progress every interval
            recent_read += n;
            total_read += n as u64;
            let now = self.clock.now_us();
            if now.saturating_sub(last_calc_time) >= self.interval_us || n == 0 {
                let percent = (total_read.saturating_mul(100) / content_length).min(100) as u8;
                log::info!(
                    "Progress: {}% ({}/{}), Speed: {}B/s",
                    percent,
                    total_read,
                    content_length,
                    recent_read
                );
                on_progress(DownloadProgress {
                    percent,
                    recent_bytes: recent_read,
                });
                last_calc_time = now;
                recent_read = 0;
            }

            if n == 0 {
                break;
            }

            if self.session.is_some() {
                self.write_payload(chunk)?;
                continue;
            }

            header.extend_from_slice(chunk);
            if header.len() >= HEADER_REGION_LEN {
                self.open_session(target, &header)?;
                self.write_payload(&header)?;
                header = Vec::new();
            }
        }

        if self.session.is_none() {
            log::warn!(
                "Stream ended after {} bytes, inside the {} byte image header",
                total_read,
                HEADER_REGION_LEN
            );
        }

        Ok(hash.finalize())
    }

    fn open_session(&mut self, target: &W::Target, header: &[u8]) -> Result<()> {
        match AppDescriptor::from_image_prefix(header) {
            Some(app) => {
                if !app.header_valid {
                    log::warn!("Image header magic not recognised, leaving validation to the driver");
                }
                log::info!(
                    "New firmware version: {} ({}, built {} {}, IDF {})",
                    app.version,
                    app.project_name,
                    app.build_date,
                    app.build_time,
                    app.idf_version
                );
                self.app = Some(app);
            }
            None => log::warn!("Could not decode app descriptor"),
        }

        let handle = self
            .writer
            .begin(target)
            .map_err(|e| OtaError::Storage(format!("Failed to begin OTA: {}", e)))?;
        self.session = Some(handle);
        self.transition(UpgradeState::Writing);
        Ok(())
    }

    fn write_payload(&mut self, data: &[u8]) -> Result<()> {
        let Some(handle) = self.session.as_mut() else {
            return Err(OtaError::Storage("write before OTA session began".to_string()));
        };
        self.writer
            .write(handle, data)
            .map_err(|e| OtaError::Storage(format!("Failed to write OTA data: {}", e)))?;
        self.bytes_written += data.len() as u64;
        Ok(())
    }

    fn commit(&mut self, target: &W::Target) -> Result<()> {
        let handle = self.session.take().ok_or_else(|| {
            OtaError::Storage(format!(
                "image shorter than the {} byte header region",
                HEADER_REGION_LEN
            ))
        })?;

        self.transition(UpgradeState::Committing);
        self.writer.finalize(handle).map_err(|e| match e {
            FlashError::ValidateFailed => OtaError::ValidateFailed,
            FlashError::Driver(msg) => OtaError::Storage(format!("Failed to end OTA: {}", msg)),
        })?;

        self.writer.set_boot_target(target).map_err(|e| {
            OtaError::Storage(format!("Failed to set boot partition: {}", e))
        })?;

        self.transition(UpgradeState::Done);
        log::info!("Firmware upgrade successful ({} bytes written)", self.bytes_written);
        Ok(())
    }

    fn transition(&mut self, next: UpgradeState) {
        log::debug!("OTA state: {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}
