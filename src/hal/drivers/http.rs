use async_trait::async_trait;
use log::debug;
use std::time::Duration;

use crate::core::RawSample;
use crate::error::TransportError;
use crate::hal::{Transport, TransportHandle, TransportKind};

/// Polls `http://{host}/data` once per cycle
pub struct HttpTransport {
    url: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(host: &str, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        Ok(Self {
            url: format!("http://{}/data", host.trim_end_matches('/')),
            timeout,
            client,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Http
    }

    fn endpoint(&self) -> String {
        self.url.clone()
    }

    async fn connect(&self) -> Result<Box<dyn TransportHandle>, TransportError> {
        let handle = HttpHandle {
            url: self.url.clone(),
            timeout: self.timeout,
            client: Some(self.client.clone()),
        };

        // Probe once; the probe body is not dispatched
        handle
            .get_body()
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        debug!("probe of {} succeeded", self.url);

        Ok(Box::new(handle))
    }
}

/// Open HTTP "connection"; holds the pooled client
pub struct HttpHandle {
    url: String,
    timeout: Duration,
    client: Option<reqwest::Client>,
}

impl HttpHandle {
    async fn get_body(&self) -> Result<String, TransportError> {
        let client = self.client.as_ref().ok_or(TransportError::Closed)?;
        let response = client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| self.map_err(e))?
            .error_for_status()
            .map_err(|e| self.map_err(e))?;
        response.text().await.map_err(|e| self.map_err(e))
    }

    fn map_err(&self, e: reqwest::Error) -> TransportError {
        if e.is_timeout() {
            TransportError::Timeout(self.timeout)
        } else {
            TransportError::Read(e.to_string())
        }
    }
}

#[async_trait]
impl TransportHandle for HttpHandle {
    async fn fetch_one(&mut self) -> Result<RawSample, TransportError> {
        let body = self.get_body().await?;
        Ok(RawSample::from_json_str(&body)?)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.client = None;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.client.is_some()
    }
}
