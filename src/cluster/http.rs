//! Kubernetes REST API client for VolumeSnapshot resources

use async_trait::async_trait;
use reqwest::{Certificate, Client, Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use super::error::{ClusterError, Result};
use super::{ClusterClient, LabelSelector, SnapshotList};
use crate::config::{ClusterConfig, SERVICE_ACCOUNT_CA_FILE};
use crate::snapshot::{SNAPSHOT_GROUP, SNAPSHOT_RESOURCE, SnapshotVersion, v1alpha1, v1beta1};

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpClusterSettings {
    pub api_server: String,
    pub token: Option<String>,
    pub ca_file: Option<PathBuf>,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub page_size: u32,
    pub user_agent: String,
}

impl Default for HttpClusterSettings {
    fn default() -> Self {
        Self {
            api_server: "https://kubernetes.default.svc".to_string(),
            token: None,
            ca_file: None,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            page_size: 500,
            user_agent: format!("snapscheduler/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl HttpClusterSettings {
    /// Build settings from the `[cluster]` config section
    ///
    /// The bearer token comes from `config.token` when set (environment),
    /// otherwise from `config.token_file` if that file exists. The in-cluster
    /// CA bundle is optional; any other configured CA file must exist.
    pub fn from_config(config: &ClusterConfig) -> Result<Self> {
        let token = match &config.token {
            Some(token) => Some(token.clone()),
            None if config.token_file.exists() => {
                let raw = std::fs::read_to_string(&config.token_file)?;
                Some(raw.trim().to_string())
            }
            None => {
                warn!(
                    path = %config.token_file.display(),
                    "No bearer token configured, sending unauthenticated requests"
                );
                None
            }
        };

        let ca_file = match &config.ca_file {
            Some(path) if path.exists() => Some(path.clone()),
            Some(path) if path.as_path() == Path::new(SERVICE_ACCOUNT_CA_FILE) => {
                debug!(
                    path = %path.display(),
                    "Service account CA bundle not mounted, using system roots"
                );
                None
            }
            Some(path) => {
                return Err(ClusterError::Config(format!(
                    "CA bundle {} does not exist",
                    path.display()
                )));
            }
            None => None,
        };

        let request_timeout = config.request_timeout.to_std().ok_or_else(|| {
            ClusterError::Config("request_timeout must not be negative".to_string())
        })?;
        let connect_timeout = config.connect_timeout.to_std().ok_or_else(|| {
            ClusterError::Config("connect_timeout must not be negative".to_string())
        })?;

        Ok(Self {
            api_server: config.api_server.clone(),
            token,
            ca_file,
            connect_timeout,
            request_timeout,
            page_size: config.page_size,
            ..Self::default()
        })
    }
}

/// Minimal `metav1.Status` body returned on API errors
#[derive(Debug, Default, Deserialize)]
struct Status {
    #[serde(default)]
    message: String,
}

/// Minimal `metav1.APIGroup` discovery document
#[derive(Debug, Default, Deserialize)]
struct ApiGroup {
    #[serde(default)]
    versions: Vec<GroupVersion>,
}

#[derive(Debug, Deserialize)]
struct GroupVersion {
    version: String,
}

/// VolumeSnapshot client speaking the Kubernetes REST API
pub struct HttpClusterClient {
    client: Client,
    base_url: String,
    token: Option<String>,
    page_size: u32,
}

impl HttpClusterClient {
    pub fn new(settings: HttpClusterSettings) -> Result<Self> {
        let mut builder = Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .user_agent(&settings.user_agent);

        if let Some(path) = &settings.ca_file {
            let pem = std::fs::read(path)?;
            let cert = Certificate::from_pem(&pem)
                .map_err(|e| ClusterError::Config(format!("Invalid CA bundle {}: {}", path.display(), e)))?;
            builder = builder.add_root_certificate(cert);
        }

        let client = builder.build()?;

        Ok(Self {
            client,
            base_url: settings.api_server.trim_end_matches('/').to_string(),
            token: settings.token,
            page_size: settings.page_size.max(1),
        })
    }

    pub fn from_config(config: &ClusterConfig) -> Result<Self> {
        Self::new(HttpClusterSettings::from_config(config)?)
    }

    fn group_url(&self) -> String {
        format!("{}/apis/{}", self.base_url, SNAPSHOT_GROUP)
    }

    fn collection_url(&self, version: SnapshotVersion, namespace: &str) -> String {
        format!(
            "{}/{}/namespaces/{}/{}",
            self.group_url(),
            version.as_str(),
            namespace,
            SNAPSHOT_RESOURCE
        )
    }

    fn object_url(&self, version: SnapshotVersion, namespace: &str, name: &str) -> String {
        format!("{}/{}", self.collection_url(version, namespace), name)
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let request = self.client.request(method, url);
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Send and return the body, mapping non-2xx responses to errors
    async fn send(&self, request: RequestBuilder) -> Result<(StatusCode, Vec<u8>)> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.bytes().await?.to_vec();

        if status.is_success() {
            return Ok((status, body));
        }

        let message = serde_json::from_slice::<Status>(&body)
            .map(|s| s.message)
            .ok()
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("Unknown")
                    .to_string()
            });

        Err(ClusterError::Api {
            status: status.as_u16(),
            message,
        })
    }

    async fn list_page(
        &self,
        version: SnapshotVersion,
        namespace: &str,
        selector: &LabelSelector,
        continue_token: Option<&str>,
    ) -> Result<Vec<u8>> {
        let url = self.collection_url(version, namespace);
        let mut query = vec![
            ("labelSelector", selector.to_query()),
            ("limit", self.page_size.to_string()),
        ];
        if let Some(token) = continue_token {
            query.push(("continue", token.to_string()));
        }

        let (_, body) = self.send(self.request(Method::GET, &url).query(&query)).await?;
        Ok(body)
    }
}

#[async_trait]
impl ClusterClient for HttpClusterClient {
    async fn list_snapshots(
        &self,
        version: SnapshotVersion,
        namespace: &str,
        selector: &LabelSelector,
    ) -> Result<SnapshotList> {
        let mut continue_token: Option<String> = None;
        let mut alpha = Vec::new();
        let mut beta = Vec::new();
        let mut pages = 0usize;

        loop {
            let body = self
                .list_page(version, namespace, selector, continue_token.as_deref())
                .await?;
            pages += 1;

            let next = match version {
                SnapshotVersion::V1Alpha1 => {
                    let page: v1alpha1::VolumeSnapshotList = serde_json::from_slice(&body)?;
                    alpha.extend(page.items);
                    page.metadata.continue_token
                }
                SnapshotVersion::V1Beta1 => {
                    let page: v1beta1::VolumeSnapshotList = serde_json::from_slice(&body)?;
                    beta.extend(page.items);
                    page.metadata.continue_token
                }
            };

            match next.filter(|token| !token.is_empty()) {
                Some(token) => continue_token = Some(token),
                None => break,
            }
        }

        let list = match version {
            SnapshotVersion::V1Alpha1 => SnapshotList::V1Alpha1(alpha),
            SnapshotVersion::V1Beta1 => SnapshotList::V1Beta1(beta),
        };
        debug!(%version, namespace, pages, count = list.len(), "Listed snapshots");
        Ok(list)
    }

    async fn delete_snapshot(
        &self,
        version: SnapshotVersion,
        namespace: &str,
        name: &str,
    ) -> Result<()> {
        let url = self.object_url(version, namespace, name);
        match self.send(self.request(Method::DELETE, &url)).await {
            Ok(_) => {
                debug!(%version, namespace, name, "Deleted snapshot");
                Ok(())
            }
            Err(ClusterError::Api { status: 404, .. }) => Err(ClusterError::NotFound {
                resource: SNAPSHOT_RESOURCE.to_string(),
                namespace: namespace.to_string(),
                name: name.to_string(),
            }),
            Err(e) => Err(e),
        }
    }

    async fn served_versions(&self) -> Result<Vec<SnapshotVersion>> {
        let url = self.group_url();
        let body = match self.send(self.request(Method::GET, &url)).await {
            Ok((_, body)) => body,
            // Group not installed at all
            Err(ClusterError::Api { status: 404, .. }) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let group: ApiGroup = serde_json::from_slice(&body)?;
        let mut versions: Vec<SnapshotVersion> = group
            .versions
            .iter()
            .filter_map(|gv| {
                let parsed = SnapshotVersion::from_version_str(&gv.version);
                if parsed.is_none() {
                    debug!(version = %gv.version, "Ignoring unsupported snapshot API version");
                }
                parsed
            })
            .collect();
        versions.sort();
        versions.dedup();
        Ok(versions)
    }
}
