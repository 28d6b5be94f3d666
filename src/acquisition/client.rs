//! Device status page fetching.
//!
//! The barometer's web interface uses a self-signed certificate, so the
//! client is built with certificate validation switched off. This is a
//! deliberate trust decision scoped to this one endpoint; the client is
//! never used for anything else.

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, error, info, warn};
use reqwest::{Client, StatusCode};

use crate::error::AcquisitionError;
use crate::models::{EndpointCredential, Reading};

use super::extract::extract_pressure;

pub const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Anything that can produce one reading per call.
#[async_trait]
pub trait ReadingSource: Send + Sync {
    async fn acquire_reading(&self) -> Result<Reading, AcquisitionError>;
}

/// Authenticates against the device, fetches the status page and extracts
/// the current pressure. Performs no retries.
pub struct Acquirer {
    client: Client,
    credential: EndpointCredential,
}

impl Acquirer {
    pub fn new(credential: EndpointCredential) -> Result<Self, AcquisitionError> {
        let client = Client::builder()
            .timeout(FETCH_TIMEOUT)
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|source| AcquisitionError::Transport { source })?;

        warn!(
            "TLS certificate validation disabled for {} (self-signed device certificate)",
            credential.url
        );

        Ok(Self { client, credential })
    }

    pub fn credential(&self) -> &EndpointCredential {
        &self.credential
    }

    /// Fetches the raw status page body.
    pub async fn fetch_page(&self) -> Result<String, AcquisitionError> {
        info!("Connecting to {}", self.credential.url);

        let response = self
            .client
            .get(&self.credential.url)
            .basic_auth(&self.credential.username, Some(&self.credential.password))
            .send()
            .await
            .map_err(|source| {
                error!("Connection error: {source}");
                AcquisitionError::Transport { source }
            })?;

        let status = response.status();
        debug!("Response status code: {status}");

        match status {
            StatusCode::OK => response
                .text()
                .await
                .map_err(|source| AcquisitionError::Transport { source }),
            StatusCode::UNAUTHORIZED => {
                error!("Auth failed, check username/password");
                Err(AcquisitionError::Authentication)
            }
            other => {
                error!("Failed to access page. Status code: {other}");
                Err(AcquisitionError::Status {
                    status: other.as_u16(),
                })
            }
        }
    }
}

#[async_trait]
impl ReadingSource for Acquirer {
    async fn acquire_reading(&self) -> Result<Reading, AcquisitionError> {
        let body = self.fetch_page().await?;
        let pressure = extract_pressure(&body)?;
        let reading = Reading::now(pressure);

        info!(
            "Extracted pressure: {} Pa ({:.2} hPa)",
            reading.pressure_raw, reading.pressure_normalized
        );
        Ok(reading)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const PAGE: &str = "<table><tr><th>Field</th><th>Setting</th></tr>\
                        <tr><td>Barometer Value</td><td>Pressure = 96231</td></tr></table>";

    /// Serves one canned HTTP response and hands back the raw request.
    async fn serve_once(status_line: &'static str, body: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let n = socket.read(&mut buf).await.unwrap();
            let response = format!(
                "HTTP/1.1 {status_line}\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
            String::from_utf8_lossy(&buf[..n]).into_owned()
        });

        (format!("http://{addr}/status.html"), handle)
    }

    fn acquirer(url: String) -> Acquirer {
        Acquirer::new(EndpointCredential::new(url, "admin", "secret")).unwrap()
    }

    #[tokio::test]
    async fn test_acquires_reading_with_basic_auth() {
        let (url, server) = serve_once("200 OK", PAGE).await;

        let reading = acquirer(url).acquire_reading().await.unwrap();
        assert_eq!(reading.pressure_raw, 96231);
        assert!((reading.pressure_normalized - 962.31).abs() < 1e-9);

        let request = server.await.unwrap();
        // base64("admin:secret")
        assert!(request.contains("YWRtaW46c2VjcmV0"));
    }

    #[tokio::test]
    async fn test_unauthorized_is_authentication_error() {
        let (url, _server) = serve_once("401 Unauthorized", "").await;

        let err = acquirer(url).acquire_reading().await.unwrap_err();
        assert!(matches!(err, AcquisitionError::Authentication));
    }

    #[tokio::test]
    async fn test_other_status_carries_code() {
        let (url, _server) = serve_once("503 Service Unavailable", "busy").await;

        let err = acquirer(url).acquire_reading().await.unwrap_err();
        assert!(matches!(err, AcquisitionError::Status { status: 503 }));
    }

    #[tokio::test]
    async fn test_malformed_page_is_extraction_error() {
        let (url, _server) = serve_once("200 OK", "<html>maintenance</html>").await;

        let err = acquirer(url).acquire_reading().await.unwrap_err();
        assert!(matches!(
            err,
            AcquisitionError::Extraction(crate::error::ExtractionError::NoTable)
        ));
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = acquirer(format!("http://{addr}/"))
            .acquire_reading()
            .await
            .unwrap_err();
        assert!(matches!(err, AcquisitionError::Transport { .. }));
    }
}
