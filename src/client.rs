// OneNET fuse-ota client
//
// Auth headers: https://open.iot.10086.cn/doc/aiot/fuse/detail/1464
// Report version: https://open.iot.10086.cn/doc/aiot/fuse/detail/1454
// Check task: https://open.iot.10086.cn/doc/aiot/fuse/detail/1447
// Report status: https://open.iot.10086.cn/doc/aiot/fuse/detail/1449
// Download: https://open.iot.10086.cn/doc/aiot/fuse/detail/1448

use crate::clock::{Clock, SystemClock};
use crate::config::{Credentials, OtaConfig, SettingsStore};
use crate::error::{OtaError, Result};
use crate::image::AppDescriptor;
use crate::pipeline::{DownloadProgress, Pipeline, UpgradeState};
use crate::storage::ImageWriter;
use crate::task::{CheckResponse, StatusReport, UpdateTask, VersionReport};
use crate::transport::{HttpConnector, HttpSession, Method};

/// Drives the update protocol against the OneNET service.
///
/// Every exchange opens its own HTTP session. The client keeps the task
/// from the last `check_task`, which `report_status` and `upgrade` act on.
pub struct OnenetOta<N: HttpConnector, W: ImageWriter, K: Clock = SystemClock> {
    connector: N,
    writer: W,
    clock: K,
    credentials: Credentials,
    config: OtaConfig,
    task: UpdateTask,
    last_state: UpgradeState,
    incoming_app: Option<AppDescriptor>,
}

impl<N: HttpConnector, W: ImageWriter> OnenetOta<N, W, SystemClock> {
    pub fn new(connector: N, writer: W, credentials: Credentials, config: OtaConfig) -> Self {
        Self::with_clock(connector, writer, SystemClock::new(), credentials, config)
    }

    /// Build a client with the identity stored in persistent settings
    pub fn from_settings<S: SettingsStore + ?Sized>(
        connector: N,
        writer: W,
        settings: &S,
        config: OtaConfig,
    ) -> anyhow::Result<Self> {
        let credentials = Credentials::load(settings)?;
        if !credentials.is_complete() {
            log::warn!("OTA credentials incomplete, requests will likely be rejected");
        }
        Ok(Self::new(connector, writer, credentials, config))
    }
}

impl<N: HttpConnector, W: ImageWriter, K: Clock> OnenetOta<N, W, K> {
    pub fn with_clock(
        connector: N,
        writer: W,
        clock: K,
        credentials: Credentials,
        config: OtaConfig,
    ) -> Self {
        Self {
            connector,
            writer,
            clock,
            credentials,
            config,
            task: UpdateTask::none(),
            last_state: UpgradeState::Idle,
            incoming_app: None,
        }
    }

    /// POST the running firmware version.
    pub fn report_version(&mut self) -> Result<()> {
        log::info!("Current firmware version: {}", self.config.firmware_version);
        let url = self.endpoint("version");
        let body = to_json(&VersionReport {
            s_version: &self.config.firmware_version,
            f_version: &self.config.hardware_version,
        })?;
        log::debug!("ReportVersion: {}", String::from_utf8_lossy(&body));

        self.exchange(Method::Post, &url, Some(body))?;
        Ok(())
    }

    /// Ask the service for a pending task.
    ///
    /// "No task" is a normal outcome and comes back as `available == false`.
    /// The stored task is cleared first, so a failed check leaves nothing
    /// behind for `upgrade` to act on.
    pub fn check_task(&mut self) -> Result<UpdateTask> {
        self.task = UpdateTask::none();

        let url = self.endpoint(&format!(
            "check?type={}&version={}",
            self.config.check_type,
            encode_query_value(&self.config.firmware_version)
        ));
        let body = self.exchange(Method::Get, &url, None)?;

        let response = CheckResponse::parse(&body)
            .map_err(|e| OtaError::Protocol(format!("Failed to parse JSON response: {}", e)))?;
        if let Some(msg) = &response.msg {
            log::info!("CheckTask, msg: {}", msg);
        }
        if !response.has_task() {
            log::info!("No OTA task, code: {:?}", response.code);
            return Ok(UpdateTask::none());
        }

        let task = response.into_task();
        log::info!(
            "OtaTask, target_version: {}, tid: {}, target_size: {}, target_md5: {}",
            task.target_version,
            task.task_id,
            task.declared_size,
            task.expected_digest
        );
        self.task = task.clone();
        Ok(task)
    }

    /// POST a progress marker for the current task.
    ///
    /// Needs a task id from a successful `check_task`; without one this
    /// returns `NoTask` and sends nothing.
    pub fn report_status(&mut self, step: i32) -> Result<()> {
        if self.task.task_id.is_empty() {
            log::error!("ReportStatus({}) called without an OTA task", step);
            return Err(OtaError::NoTask);
        }
        let url = self.endpoint(&format!("{}/status", self.task.task_id));
        let body = to_json(&StatusReport { step })?;

        self.exchange(Method::Post, &url, Some(body))?;
        log::info!("Reported OTA step {} for task {}", step, self.task.task_id);
        Ok(())
    }

    /// Download, verify and flash the pending task's firmware, then make it
    /// the next boot image. `on_progress` runs on this thread, roughly once
    /// per progress interval and once more at the end of the stream. Pass
    /// `|_| {}` when progress is not wanted.
    ///
    /// The task must be available and carry a task id; otherwise this
    /// returns `NoTask` before touching the network or flash.
    pub fn upgrade<F>(&mut self, on_progress: F) -> Result<()>
    where
        F: FnMut(DownloadProgress),
    {
        if !self.task.available || self.task.task_id.is_empty() {
            log::error!("No OTA task");
            self.last_state = UpgradeState::Failed(OtaError::NoTask.kind());
            return Err(OtaError::NoTask);
        }

        let url = self.endpoint(&format!("{}/download", self.task.task_id));
        let credentials = &self.credentials;
        let mut pipeline = Pipeline::new(
            &mut self.writer,
            &self.clock,
            self.config.chunk_size,
            self.config.progress_interval_ms,
        );
        let result = pipeline.run(
            &self.connector,
            |http| apply_headers(http, credentials),
            &url,
            &self.task,
            on_progress,
        );
        self.last_state = pipeline.state();
        self.incoming_app = pipeline.take_app();
        result
    }

    pub fn has_new_version(&self) -> bool {
        self.task.available
    }

    /// Target version from the last successful `check_task`
    pub fn firmware_version(&self) -> &str {
        &self.task.target_version
    }

    pub fn task(&self) -> &UpdateTask {
        &self.task
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn config(&self) -> &OtaConfig {
        &self.config
    }

    pub fn last_upgrade_state(&self) -> UpgradeState {
        self.last_state
    }

    /// App descriptor decoded from the header of the last download
    pub fn incoming_app(&self) -> Option<&AppDescriptor> {
        self.incoming_app.as_ref()
    }

    #[cfg(test)]
    pub(crate) fn writer(&self) -> &W {
        &self.writer
    }

    fn endpoint(&self, tail: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            self.config.base_url, self.credentials.product_id, self.credentials.device_id, tail
        )
    }

    fn exchange(&self, method: Method, url: &str, body: Option<Vec<u8>>) -> Result<Vec<u8>> {
        let mut http = self
            .connector
            .create()
            .map_err(|e| OtaError::transport("Failed to create HTTP session", e))?;
        apply_headers(&mut http, &self.credentials);
        if let Some(body) = body {
            http.set_body(body);
        }
        let result = send(&mut http, method, url);
        http.close();
        result
    }
}

fn apply_headers<S: HttpSession>(http: &mut S, credentials: &Credentials) {
    http.set_header("Authorization", &credentials.authorization);
    http.set_header("Content-Type", "application/json");
}

fn send<S: HttpSession>(http: &mut S, method: Method, url: &str) -> Result<Vec<u8>> {
    http.open(method, url)
        .map_err(|e| OtaError::transport("Failed to open HTTP connection", e))?;

    let status = http.status();
    if status != 200 {
        return Err(OtaError::Protocol(format!(
            "{} {} failed, status code: {}",
            method.as_str(),
            url,
            status
        )));
    }

    let body = http
        .read_all()
        .map_err(|e| OtaError::transport("Failed to read response", e))?;
    log::debug!("Response: {}", String::from_utf8_lossy(&body));
    Ok(body)
}

/// Percent-encode a query value, keeping only RFC 3986 unreserved bytes
fn encode_query_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for b in value.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => out.push(b as char),
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| OtaError::Protocol(format!("Failed to encode request: {}", e)))
}
