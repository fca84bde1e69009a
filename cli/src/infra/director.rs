//! Infrastructure implementation of the `DirectorClient` port.
//!
//! Talks to the director API over HTTPS, trusting only the director CA
//! recorded in state.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{Certificate, Client, header};
use serde::Deserialize;

use crate::application::ports::{DirectorClient, DirectorInfo, DirectorTarget};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, Default)]
pub struct HttpDirectorClient;

#[derive(Debug, Deserialize)]
struct InfoResponse {
    #[serde(default)]
    name: String,
    #[serde(default)]
    uuid: String,
    #[serde(default)]
    version: String,
}

impl HttpDirectorClient {
    fn client(target: &DirectorTarget<'_>) -> Result<Client> {
        let mut builder = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT);
        if !target.ca_cert.is_empty() {
            let ca = Certificate::from_pem(target.ca_cert.as_bytes())
                .context("parsing director CA certificate")?;
            builder = builder.add_root_certificate(ca);
        }
        builder.build().context("building director HTTP client")
    }
}

fn url(target: &DirectorTarget<'_>, path: &str) -> String {
    format!("{}{path}", target.address.trim_end_matches('/'))
}

impl DirectorClient for HttpDirectorClient {
    async fn info(&self, target: &DirectorTarget<'_>) -> Result<DirectorInfo> {
        let response = Self::client(target)?
            .get(url(target, "/info"))
            .send()
            .await
            .with_context(|| format!("connecting to director at {}", target.address))?
            .error_for_status()
            .context("director /info")?;
        let info: InfoResponse = response.json().await.context("parsing director /info")?;
        Ok(DirectorInfo {
            name: info.name,
            uuid: info.uuid,
            version: info.version,
        })
    }

    async fn upload_cloud_config(&self, target: &DirectorTarget<'_>, cloud_config: &str) -> Result<()> {
        let response = Self::client(target)?
            .post(url(target, "/cloud_configs"))
            .basic_auth(target.username, Some(target.password))
            .header(header::CONTENT_TYPE, "text/yaml")
            .body(cloud_config.to_string())
            .send()
            .await
            .with_context(|| format!("connecting to director at {}", target.address))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("director rejected cloud config ({status}): {}", body.trim());
        }
        tracing::debug!(address = target.address, "cloud config uploaded");
        Ok(())
    }
}
