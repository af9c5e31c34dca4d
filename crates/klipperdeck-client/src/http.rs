//! Request/response calls against Moonraker.

use crate::error::TransportError;
use crate::info::{PrinterInfo, ServerInfo};
use crate::live::{self, LivePolicy, LiveSubscription};
use klipperdeck_core::subsystems::SUBSCRIBED_FIELDS;
use klipperdeck_core::{ConnectionParams, Encoded, FileRecord, Record, normalize_port};
use reqwest::multipart::{Form, Part};
use reqwest::{Method, Url};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::time::Duration;

/// Default root for G-code files.
pub const GCODE_ROOT: &str = "gcodes";

/// Per-call deadlines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub read: Duration,
    pub write: Duration,
    pub upload: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        let read = Duration::from_secs(5);
        Self {
            read,
            write: read * 2,
            upload: Duration::from_secs(30),
        }
    }
}

/// Client for one Moonraker endpoint.
#[derive(Debug, Clone)]
pub struct MoonrakerClient {
    http: reqwest::Client,
    host: String,
    port: u16,
    timeouts: Timeouts,
    live: LivePolicy,
}

impl MoonrakerClient {
    /// Create a client, repairing a misconfigured port.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        let host = host.into();
        let (port, correction) = normalize_port(port);
        if let Some(correction) = correction {
            tracing::warn!("{}", correction);
        }
        Self {
            http: reqwest::Client::new(),
            host,
            port,
            timeouts: Timeouts::default(),
            live: LivePolicy::default(),
        }
    }

    pub fn from_params(params: &ConnectionParams) -> Self {
        Self::new(params.host.clone(), params.port)
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_live_policy(mut self, live: LivePolicy) -> Self {
        self.live = live;
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// The port in use, after repair.
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}:{}/websocket", self.host, self.port)
    }

    fn url(&self, path: &str) -> Result<Url, TransportError> {
        let raw = format!("{}{}", self.base_url(), path);
        Url::parse(&raw).map_err(|e| TransportError::Unknown(format!("invalid url {raw}: {e}")))
    }

    /// Issue one call. Reads get the read deadline, everything else the
    /// (longer) write deadline. A `result` envelope is unwrapped.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, TransportError> {
        let url = self.url(path)?;
        self.send(method, url, body).await
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
    ) -> Result<Value, TransportError> {
        let timeout = if method == Method::GET {
            self.timeouts.read
        } else {
            self.timeouts.write
        };
        let url_str = url.to_string();

        let mut req = self
            .http
            .request(method.clone(), url)
            .timeout(timeout)
            .header(reqwest::header::ACCEPT, "application/json");
        if let Some(body) = body {
            req = req.json(body);
        }

        tracing::debug!("{} {}", method, url_str);
        let resp = req
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(&url_str, e, timeout))?;
        Self::json_or_error(&url_str, resp, timeout).await
    }

    async fn json_or_error(
        url: &str,
        resp: reqwest::Response,
        timeout: Duration,
    ) -> Result<Value, TransportError> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let message = match status.canonical_reason() {
                Some(reason) if body.is_empty() => reason.to_string(),
                _ => body.chars().take(200).collect(),
            };
            return Err(TransportError::from_status(url, status.as_u16(), message));
        }

        let value: Value = resp
            .json()
            .await
            .map_err(|e| TransportError::from_reqwest(url, e, timeout))?;
        Ok(unwrap_result(value))
    }

    async fn get_as<T: DeserializeOwned>(&self, path: &str) -> Result<T, TransportError> {
        let value = self.request(Method::GET, path, None).await?;
        serde_json::from_value(value)
            .map_err(|e| TransportError::Unknown(format!("unexpected answer from {path}: {e}")))
    }

    pub async fn server_info(&self) -> Result<ServerInfo, TransportError> {
        self.get_as("/server/info").await
    }

    pub async fn printer_info(&self) -> Result<PrinterInfo, TransportError> {
        self.get_as("/printer/info").await
    }

    /// Bulk query of the given subsystems. Returns the `status` object.
    pub async fn query_objects(&self, objects: &[(&str, &[&str])]) -> Result<Record, TransportError> {
        let mut url = self.url("/printer/objects/query")?;
        {
            let mut pairs = url.query_pairs_mut();
            for (key, fields) in objects {
                pairs.append_pair(key, &fields.join(","));
            }
        }

        let value = self.send(Method::GET, url, None).await?;
        match value {
            Value::Object(mut map) => match map.remove("status") {
                Some(Value::Object(status)) => Ok(status),
                _ => Ok(map),
            },
            other => Err(TransportError::Unknown(format!(
                "unexpected object query answer: {other}"
            ))),
        }
    }

    /// Bulk query of every subsystem the session consumes.
    pub async fn query_status(&self) -> Result<Record, TransportError> {
        self.query_objects(SUBSCRIBED_FIELDS).await
    }

    pub async fn list_files(&self, root: &str) -> Result<Vec<FileRecord>, TransportError> {
        let value = self
            .request(Method::GET, &format!("/server/files/list?root={root}"), None)
            .await?;
        Ok(klipperdeck_core::parse_file_list(&value))
    }

    /// Multipart upload with its own, longer deadline.
    pub async fn upload_file(
        &self,
        filename: &str,
        contents: Vec<u8>,
        root: &str,
    ) -> Result<Value, TransportError> {
        let url = self.url("/server/files/upload")?;
        let url_str = url.to_string();
        let timeout = self.timeouts.upload;

        let form = Form::new()
            .part("file", Part::bytes(contents).file_name(filename.to_string()))
            .text("root", root.to_string());

        tracing::debug!("POST {} ({})", url_str, filename);
        let resp = self
            .http
            .post(url)
            .timeout(timeout)
            .multipart(form)
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(&url_str, e, timeout))?;
        Self::json_or_error(&url_str, resp, timeout).await
    }

    pub async fn run_script(&self, script: &str) -> Result<Value, TransportError> {
        self.request(
            Method::POST,
            "/printer/gcode/script",
            Some(&json!({ "script": script })),
        )
        .await
    }

    pub async fn start_print(&self, filename: &str) -> Result<Value, TransportError> {
        self.request(
            Method::POST,
            "/printer/print/start",
            Some(&json!({ "filename": filename })),
        )
        .await
    }

    pub async fn emergency_stop(&self) -> Result<Value, TransportError> {
        self.request(Method::POST, "/printer/emergency_stop", None)
            .await
    }

    pub async fn firmware_restart(&self) -> Result<Value, TransportError> {
        self.request(Method::POST, "/printer/firmware_restart", None)
            .await
    }

    /// Send an encoded command to its endpoint.
    pub async fn execute(&self, command: &Encoded) -> Result<Value, TransportError> {
        match command {
            Encoded::Script(script) => self.run_script(script).await,
            Encoded::StartPrint { filename } => self.start_print(filename).await,
            Encoded::EmergencyStop => self.emergency_stop().await,
            Encoded::FirmwareRestart => self.firmware_restart().await,
        }
    }

    /// Lightweight reachability check. Never fails.
    pub async fn probe(&self) -> bool {
        match self.request(Method::GET, "/server/info", None).await {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!("probe of {} failed: {}", self.base_url(), e);
                false
            }
        }
    }

    /// Open the push channel.
    pub fn subscribe_live(&self) -> LiveSubscription {
        live::spawn(self.ws_url(), self.live)
    }
}

fn unwrap_result(value: Value) -> Value {
    match value {
        Value::Object(mut map) => match map.remove("result") {
            Some(result) => result,
            None => Value::Object(map),
        },
        other => other,
    }
}
