//! HTTP implementation of the classification API.
//!
//! The service only trusts the primary's own certificate, so this client works
//! on the primary node alone.

use std::path::Path;
use std::time::Duration;

use reqwest::Method;
use serde_json::{Value, json};
use tracing::debug;
use url::Url;

use super::{ClassificationApi, Classes, Group, NewGroup};
use crate::config::ClassifierConfig;
use crate::error::{Error, Result};

/// Classification client using mutual TLS.
pub struct HttpClassifier {
    base: Url,
    client: reqwest::Client,
    runtime: tokio::runtime::Runtime,
}

impl HttpClassifier {
    pub fn from_config(config: &ClassifierConfig) -> Result<Self> {
        let mut identity_pem = read_pem(&config.key)?;
        identity_pem.extend(read_pem(&config.cert)?);
        let identity = reqwest::Identity::from_pem(&identity_pem).map_err(|e| {
            Error::InvalidConfig {
                message: format!("invalid classifier client identity: {}", e),
            }
        })?;
        let ca = reqwest::Certificate::from_pem(&read_pem(&config.ca_cert)?).map_err(|e| {
            Error::InvalidConfig {
                message: format!("invalid classifier CA certificate: {}", e),
            }
        })?;

        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .identity(identity)
            .add_root_certificate(ca)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(concat!("stagehand/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::InvalidConfig {
                message: format!("failed to build HTTP client: {}", e),
            })?;

        Self::with_client(&config.url, client)
    }

    /// Build from an already configured `reqwest` client.
    pub fn with_client(base_url: &str, client: reqwest::Client) -> Result<Self> {
        let base = Url::parse(base_url.trim_end_matches('/')).map_err(|e| Error::InvalidConfig {
            message: format!("classifier.url is not a valid URL: {}", e),
        })?;
        let runtime = tokio::runtime::Runtime::new()?;
        Ok(Self {
            base,
            client,
            runtime,
        })
    }

    pub fn groups_url(&self) -> Url {
        self.join(&["groups"])
    }

    pub fn group_url(&self, group_id: &str) -> Url {
        self.join(&["groups", group_id])
    }

    pub fn pin_url(&self, group_id: &str, subject: &str) -> Url {
        let mut url = self.join(&["groups", group_id, "pin"]);
        url.query_pairs_mut().append_pair("nodes", subject);
        url
    }

    fn join(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Send one request and return the response body.
    fn send(&self, method: Method, url: Url, body: Option<&Value>) -> Result<String> {
        let method_name = method_name(&method);
        debug!(method = method_name, url = %url, "classifier request");
        let mut request = self.client.request(method, url.clone());
        if let Some(body) = body {
            request = request.json(body);
        }

        let http_error = |message: String| Error::Http {
            method: method_name,
            url: url.to_string(),
            message,
        };

        self.runtime.block_on(async {
            let response = request.send().await.map_err(|e| http_error(e.to_string()))?;
            let status = response.status();
            let text = response.text().await.map_err(|e| http_error(e.to_string()))?;
            if !status.is_success() {
                return Err(http_error(format!("HTTP {}: {}", status, text.trim())));
            }
            Ok(text)
        })
    }
}

fn method_name(method: &Method) -> &'static str {
    if *method == Method::GET {
        "GET"
    } else {
        "POST"
    }
}

fn read_pem(path: &Path) -> Result<Vec<u8>> {
    if !path.exists() {
        return Err(Error::MissingFile {
            path: path.to_path_buf(),
        });
    }
    Ok(std::fs::read(path)?)
}

impl ClassificationApi for HttpClassifier {
    fn list_groups(&self) -> Result<Vec<Group>> {
        let text = self.send(Method::GET, self.groups_url(), None)?;
        Ok(serde_json::from_str(&text)?)
    }

    fn create_group(&self, group: &NewGroup) -> Result<Group> {
        let body = serde_json::to_value(group)?;
        let text = self.send(Method::POST, self.groups_url(), Some(&body))?;
        Ok(serde_json::from_str(&text)?)
    }

    fn update_classes(&self, group_id: &str, classes: &Classes) -> Result<()> {
        let body = json!({ "classes": classes });
        self.send(Method::POST, self.group_url(group_id), Some(&body))?;
        Ok(())
    }

    fn pin_node(&self, group_id: &str, subject: &str) -> Result<()> {
        self.send(Method::POST, self.pin_url(group_id, subject), None)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> HttpClassifier {
        HttpClassifier::with_client(
            "https://master.vm:4433/classifier-api/v1/",
            reqwest::Client::new(),
        )
        .unwrap()
    }

    #[test]
    fn builds_resource_urls() {
        let c = classifier();
        assert_eq!(
            c.groups_url().as_str(),
            "https://master.vm:4433/classifier-api/v1/groups"
        );
        assert_eq!(
            c.group_url("abc-123").as_str(),
            "https://master.vm:4433/classifier-api/v1/groups/abc-123"
        );
    }

    #[test]
    fn pin_url_encodes_subject() {
        let c = classifier();
        assert_eq!(
            c.pin_url("abc", "compile1.vm").as_str(),
            "https://master.vm:4433/classifier-api/v1/groups/abc/pin?nodes=compile1.vm"
        );
        assert!(c.pin_url("abc", "a b").as_str().ends_with("nodes=a+b"));
    }

    #[test]
    fn missing_certificate_is_reported() {
        let mut config = ClassifierConfig::default();
        config.key = "/nonexistent/key.pem".into();
        let err = HttpClassifier::from_config(&config).err().unwrap();
        assert!(matches!(err, Error::MissingFile { .. }));
    }
}
