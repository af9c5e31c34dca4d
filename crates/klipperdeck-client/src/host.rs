//! The host seam between a session and the transport.

use crate::error::TransportError;
use crate::http::{GCODE_ROOT, MoonrakerClient};
use crate::info::{PrinterInfo, ServerInfo};
use crate::live::LiveSubscription;
use klipperdeck_core::{Encoded, FileRecord, Record};
use reqwest::Method;
use std::future::Future;

/// What a session needs from a printer host.
pub trait PrinterHost: Send + Sync + 'static {
    /// Base URL, for log lines.
    fn describe(&self) -> String;

    /// Reachability check, keeping the failure for classification.
    fn ping(&self) -> impl Future<Output = Result<(), TransportError>> + Send;

    fn server_info(&self) -> impl Future<Output = Result<ServerInfo, TransportError>> + Send;

    fn printer_info(&self) -> impl Future<Output = Result<PrinterInfo, TransportError>> + Send;

    /// Bulk query of every consumed subsystem.
    fn query_status(&self) -> impl Future<Output = Result<Record, TransportError>> + Send;

    fn list_files(&self) -> impl Future<Output = Result<Vec<FileRecord>, TransportError>> + Send;

    fn execute(&self, command: Encoded) -> impl Future<Output = Result<(), TransportError>> + Send;

    fn upload(
        &self,
        filename: String,
        contents: Vec<u8>,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Open the push channel.
    fn subscribe_live(&self) -> LiveSubscription;
}

impl PrinterHost for MoonrakerClient {
    fn describe(&self) -> String {
        self.base_url()
    }

    async fn ping(&self) -> Result<(), TransportError> {
        self.request(Method::GET, "/server/info", None)
            .await
            .map(|_| ())
    }

    async fn server_info(&self) -> Result<ServerInfo, TransportError> {
        MoonrakerClient::server_info(self).await
    }

    async fn printer_info(&self) -> Result<PrinterInfo, TransportError> {
        MoonrakerClient::printer_info(self).await
    }

    async fn query_status(&self) -> Result<Record, TransportError> {
        MoonrakerClient::query_status(self).await
    }

    async fn list_files(&self) -> Result<Vec<FileRecord>, TransportError> {
        MoonrakerClient::list_files(self, GCODE_ROOT).await
    }

    async fn execute(&self, command: Encoded) -> Result<(), TransportError> {
        MoonrakerClient::execute(self, &command).await.map(|_| ())
    }

    async fn upload(&self, filename: String, contents: Vec<u8>) -> Result<(), TransportError> {
        MoonrakerClient::upload_file(self, &filename, contents, GCODE_ROOT)
            .await
            .map(|_| ())
    }

    fn subscribe_live(&self) -> LiveSubscription {
        MoonrakerClient::subscribe_live(self)
    }
}
