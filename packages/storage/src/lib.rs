//! Object storage for rendered ticket artifacts.
//!
//! Goal:
//! - S3-compatible storage in production/staging
//! - On-disk storage for local dev
//! - In-memory storage for tests
//!
//! Every upload returns a URL. URLs under this storage's public base are read
//! back through the object store itself; any other `http(s)` URL is fetched
//! over the network.

use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use object_store::path::Path;
use object_store::{Attribute, Attributes, ObjectStore, ObjectStoreExt, PutOptions};
use ticket_core::{Classify, ErrorKind};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("invalid storage config: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("object_store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("download failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unsupported artifact URL: {0}")]
    UnsupportedUrl(String),
}

impl Classify for StorageError {
    fn kind(&self) -> ErrorKind {
        match self {
            StorageError::InvalidConfig(_) | StorageError::UnsupportedUrl(_) => ErrorKind::Invalid,
            StorageError::ObjectStore(object_store::Error::NotFound { .. }) => ErrorKind::NotFound,
            StorageError::Io(_) | StorageError::ObjectStore(_) | StorageError::Http(_) => {
                ErrorKind::Transient
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    S3,
    Filesystem,
    Memory,
}

impl StorageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StorageKind::S3 => "s3",
            StorageKind::Filesystem => "filesystem",
            StorageKind::Memory => "memory",
        }
    }
}

#[derive(Debug, Clone)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    pub endpoint: Option<String>,
    pub allow_http: bool,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
    pub virtual_hosted_style: bool,
}

impl S3Config {
    /// Public URL objects in this bucket are reachable at.
    fn public_base(&self) -> String {
        match self.endpoint.as_deref() {
            Some(endpoint) => format!("{}/{}", endpoint.trim_end_matches('/'), self.bucket),
            None => format!("https://{}.s3.{}.amazonaws.com", self.bucket, self.region),
        }
    }
}

#[derive(Debug, Clone)]
pub enum StorageBackendConfig {
    S3(S3Config),
    Filesystem { root: PathBuf },
    Memory,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackendConfig,
    /// Optional key prefix applied to all object keys.
    pub prefix: Option<String>,
    /// Overrides the base of returned URLs (e.g. a CDN in front of the bucket).
    pub public_url: Option<String>,
}

impl StorageConfig {
    pub fn memory() -> Self {
        Self {
            backend: StorageBackendConfig::Memory,
            prefix: None,
            public_url: None,
        }
    }

    pub fn filesystem(root: impl Into<PathBuf>) -> Self {
        Self {
            backend: StorageBackendConfig::Filesystem { root: root.into() },
            prefix: None,
            public_url: None,
        }
    }

    pub fn s3(cfg: S3Config) -> Self {
        Self {
            backend: StorageBackendConfig::S3(cfg),
            prefix: None,
            public_url: None,
        }
    }

    /// Build a config from environment variables.
    ///
    /// Selection rules:
    /// - If `STORAGE_BACKEND` is set: use it (`s3`, `filesystem`, `memory`)
    /// - Otherwise: default to filesystem (`./data/object_store`)
    ///
    /// S3 env vars (S3-compatible):
    /// - `S3_BUCKET` (required when backend is `s3`)
    /// - `AWS_REGION` (default: `us-east-1`)
    /// - `S3_ENDPOINT` (optional, e.g. `http://localhost:9000`)
    /// - `S3_ALLOW_HTTP` (`true`/`false`, default: auto true if endpoint is http://)
    /// - `S3_VIRTUAL_HOSTED_STYLE` (`true`/`false`, default: false)
    /// - `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY`, `AWS_SESSION_TOKEN` (optional)
    ///
    /// Filesystem env vars:
    /// - `STORAGE_FS_ROOT` (default: `./data/object_store`)
    ///
    /// Common:
    /// - `STORAGE_PREFIX` (optional, e.g. `tickets/`)
    /// - `STORAGE_PUBLIC_URL` (optional base for returned URLs)
    pub fn from_env() -> Result<Self, StorageError> {
        let backend = std::env::var("STORAGE_BACKEND").ok();
        let prefix = std::env::var("STORAGE_PREFIX").ok().and_then(non_empty);
        let public_url = std::env::var("STORAGE_PUBLIC_URL").ok().and_then(non_empty);

        let cfg = match backend.as_deref() {
            Some("s3") => Self::s3(read_s3_config()?),
            Some("filesystem") | Some("fs") | None => Self::filesystem(fs_root()),
            Some("memory") | Some("mem") => Self::memory(),
            Some(other) => {
                return Err(StorageError::InvalidConfig(format!(
                    "unsupported STORAGE_BACKEND={other} (expected s3|filesystem|memory)"
                )));
            }
        };

        Ok(Self {
            prefix,
            public_url,
            ..cfg
        })
    }
}

#[derive(Clone)]
pub struct Storage {
    kind: StorageKind,
    store: Arc<dyn ObjectStore>,
    prefix: Option<String>,
    public_base: String,
    http: reqwest::Client,
}

impl Storage {
    pub fn kind(&self) -> StorageKind {
        self.kind
    }

    pub fn kind_str(&self) -> &'static str {
        self.kind.as_str()
    }

    pub async fn new(cfg: StorageConfig) -> Result<Self, StorageError> {
        let (kind, store, base) = match cfg.backend {
            StorageBackendConfig::S3(s3) => {
                let base = s3.public_base();
                (StorageKind::S3, Arc::new(build_s3(s3).await?) as Arc<dyn ObjectStore>, base)
            }
            StorageBackendConfig::Filesystem { root } => {
                ensure_dir(&root)?;
                let fs = object_store::local::LocalFileSystem::new_with_prefix(&root)?;
                let base = format!("file://{}", root.canonicalize()?.display());
                (StorageKind::Filesystem, Arc::new(fs) as Arc<dyn ObjectStore>, base)
            }
            StorageBackendConfig::Memory => {
                let mem = object_store::memory::InMemory::new();
                (StorageKind::Memory, Arc::new(mem) as Arc<dyn ObjectStore>, "memory://store".to_string())
            }
        };

        let public_base = cfg
            .public_url
            .and_then(non_empty)
            .unwrap_or(base)
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            kind,
            store,
            prefix: cfg.prefix.and_then(non_empty),
            public_base,
            http: reqwest::Client::new(),
        })
    }

    pub async fn from_env() -> Result<Self, StorageError> {
        Self::new(StorageConfig::from_env()?).await
    }

    fn to_path(&self, key: &str) -> Result<Path, StorageError> {
        let key = key.trim_start_matches('/');
        if key.is_empty() {
            return Err(StorageError::InvalidConfig(
                "object key must not be empty".to_string(),
            ));
        }

        let joined = match self.prefix.as_deref() {
            Some(prefix) => {
                let prefix = prefix.trim_matches('/');
                if prefix.is_empty() {
                    key.to_string()
                } else {
                    format!("{prefix}/{key}")
                }
            }
            None => key.to_string(),
        };

        Ok(Path::from(joined))
    }

    /// Public URL of an object path.
    pub fn url_for(&self, path: &Path) -> String {
        format!("{}/{}", self.public_base, path)
    }

    /// Store `bytes` under `key` and return the object's URL.
    ///
    /// Writing the same key twice overwrites the object, so the URL is stable.
    pub async fn upload(
        &self,
        key: &str,
        bytes: impl Into<Bytes>,
        content_type: &str,
    ) -> Result<String, StorageError> {
        let path = self.to_path(key)?;

        // Only the S3 backend keeps object attributes.
        let mut attributes = Attributes::new();
        if self.kind == StorageKind::S3 {
            attributes.insert(Attribute::ContentType, content_type.to_string().into());
        }
        let opts = PutOptions {
            attributes,
            ..Default::default()
        };

        self.store
            .put_opts(&path, object_store::PutPayload::from(bytes.into()), opts)
            .await?;

        let url = self.url_for(&path);
        tracing::debug!(%url, backend = self.kind_str(), "Uploaded object");
        Ok(url)
    }

    /// Download an artifact by URL.
    pub async fn fetch(&self, url: &str) -> Result<Bytes, StorageError> {
        if let Some(rest) = url.strip_prefix(&self.public_base)
            && let Some(object) = rest.strip_prefix('/')
            && !object.is_empty()
        {
            let res = self.store.get(&Path::from(object)).await?;
            return Ok(res.bytes().await?);
        }

        if url.starts_with("http://") || url.starts_with("https://") {
            let response = self.http.get(url).send().await?.error_for_status()?;
            return Ok(response.bytes().await?);
        }

        Err(StorageError::UnsupportedUrl(url.to_string()))
    }
}

fn ensure_dir(root: &FsPath) -> Result<(), StorageError> {
    std::fs::create_dir_all(root)?;
    Ok(())
}

fn fs_root() -> PathBuf {
    std::env::var("STORAGE_FS_ROOT")
        .ok()
        .and_then(non_empty)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("./data/object_store"))
}

fn non_empty(s: String) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn parse_bool_env(var_name: &str) -> Result<Option<bool>, StorageError> {
    let v = match std::env::var(var_name) {
        Ok(v) => v,
        Err(std::env::VarError::NotPresent) => return Ok(None),
        Err(e) => {
            return Err(StorageError::InvalidConfig(format!(
                "failed reading {var_name}: {e}"
            )));
        }
    };

    let normalized = v.trim().to_ascii_lowercase();
    let parsed = match normalized.as_str() {
        "1" | "true" | "yes" | "y" => true,
        "0" | "false" | "no" | "n" => false,
        _ => {
            return Err(StorageError::InvalidConfig(format!(
                "invalid boolean for {var_name}={v} (expected true/false)"
            )));
        }
    };
    Ok(Some(parsed))
}

fn read_s3_config() -> Result<S3Config, StorageError> {
    let bucket = std::env::var("S3_BUCKET")
        .ok()
        .and_then(non_empty)
        .ok_or_else(|| {
            StorageError::InvalidConfig("S3_BUCKET is required for s3 backend".into())
        })?;

    let region = std::env::var("AWS_REGION")
        .ok()
        .and_then(non_empty)
        .unwrap_or_else(|| "us-east-1".to_string());

    let endpoint = std::env::var("S3_ENDPOINT").ok().and_then(non_empty);
    let allow_http = match parse_bool_env("S3_ALLOW_HTTP")? {
        Some(v) => v,
        None => endpoint
            .as_deref()
            .is_some_and(|e| e.trim_start().to_ascii_lowercase().starts_with("http://")),
    };

    let virtual_hosted_style = parse_bool_env("S3_VIRTUAL_HOSTED_STYLE")?.unwrap_or(false);

    Ok(S3Config {
        bucket,
        region,
        endpoint,
        allow_http,
        access_key_id: std::env::var("AWS_ACCESS_KEY_ID").ok().and_then(non_empty),
        secret_access_key: std::env::var("AWS_SECRET_ACCESS_KEY").ok().and_then(non_empty),
        session_token: std::env::var("AWS_SESSION_TOKEN").ok().and_then(non_empty),
        virtual_hosted_style,
    })
}

async fn build_s3(cfg: S3Config) -> Result<object_store::aws::AmazonS3, StorageError> {
    let mut builder = object_store::aws::AmazonS3Builder::new()
        .with_bucket_name(cfg.bucket)
        .with_region(cfg.region)
        .with_virtual_hosted_style_request(cfg.virtual_hosted_style);

    if let Some(endpoint) = cfg.endpoint {
        builder = builder.with_endpoint(endpoint);
    }
    if cfg.allow_http {
        builder = builder.with_allow_http(true);
    }
    if let Some(access_key_id) = cfg.access_key_id {
        builder = builder.with_access_key_id(access_key_id);
    }
    if let Some(secret_access_key) = cfg.secret_access_key {
        builder = builder.with_secret_access_key(secret_access_key);
    }
    if let Some(session_token) = cfg.session_token {
        builder = builder.with_token(session_token);
    }

    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::disallowed_methods)]

    use super::*;

    #[tokio::test]
    async fn in_memory_upload_returns_fetchable_url() -> Result<(), StorageError> {
        let storage = Storage::new(StorageConfig::memory()).await?;
        let url = storage
            .upload("qr-codes/named-1-0.png", Bytes::from("png"), "image/png")
            .await?;
        assert_eq!(url, "memory://store/qr-codes/named-1-0.png");
        assert_eq!(storage.fetch(&url).await?, Bytes::from("png"));
        Ok(())
    }

    #[tokio::test]
    async fn upload_overwrites_same_key() -> Result<(), StorageError> {
        let storage = Storage::new(StorageConfig::memory()).await?;
        let first = storage.upload("pdf-files/general-4.pdf", Bytes::from("v1"), "application/pdf").await?;
        let second = storage.upload("pdf-files/general-4.pdf", Bytes::from("v2"), "application/pdf").await?;
        assert_eq!(first, second);
        assert_eq!(storage.fetch(&second).await?, Bytes::from("v2"));
        Ok(())
    }

    #[tokio::test]
    async fn prefix_is_part_of_url() -> Result<(), StorageError> {
        let cfg = StorageConfig {
            prefix: Some("event/".to_string()),
            public_url: Some("https://cdn.example.com/".to_string()),
            ..StorageConfig::memory()
        };
        let storage = Storage::new(cfg).await?;
        let url = storage.upload("pdf-files/named-2.pdf", Bytes::from("pdf"), "application/pdf").await?;
        assert_eq!(url, "https://cdn.example.com/event/pdf-files/named-2.pdf");
        assert_eq!(storage.fetch(&url).await?, Bytes::from("pdf"));
        Ok(())
    }

    #[tokio::test]
    async fn filesystem_round_trip() -> Result<(), StorageError> {
        let dir = tempfile::tempdir()?;
        let storage = Storage::new(StorageConfig::filesystem(dir.path())).await?;

        let url = storage
            .upload("pdf-files/named-9.pdf", Bytes::from("%PDF"), "application/pdf")
            .await?;
        assert!(url.starts_with("file://"));
        assert_eq!(storage.fetch(&url).await?, Bytes::from("%PDF"));
        Ok(())
    }

    #[tokio::test]
    async fn missing_object_is_not_found() -> Result<(), StorageError> {
        let storage = Storage::new(StorageConfig::memory()).await?;
        let err = storage.fetch("memory://store/pdf-files/named-404.pdf").await;
        assert!(matches!(err, Err(ref e) if e.kind() == ErrorKind::NotFound));

        let err = storage.fetch("ftp://elsewhere/file.pdf").await;
        assert!(matches!(err, Err(StorageError::UnsupportedUrl(_))));
        Ok(())
    }

    #[test]
    fn s3_public_base_uses_virtual_host_url() {
        let cfg = S3Config {
            bucket: "tickets".to_string(),
            region: "eu-west-1".to_string(),
            endpoint: None,
            allow_http: false,
            access_key_id: None,
            secret_access_key: None,
            session_token: None,
            virtual_hosted_style: false,
        };
        assert_eq!(cfg.public_base(), "https://tickets.s3.eu-west-1.amazonaws.com");
    }
}
