use async_trait::async_trait;
use log::{error, info, warn};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FileStoreError {
    #[error("not_found")]
    NotFound,
    #[error("other: {0}")]
    Other(String),
}

/// Blob storage behind the file-sharing records. Keys are the `file_path`
/// values produced by [`object_path`].
#[async_trait]
pub trait FileStore: Send + Sync {
    async fn put(&self, path: &str, bytes: &[u8]) -> Result<(), FileStoreError>;
    async fn get(&self, path: &str) -> Result<(Vec<u8>, String), FileStoreError>;
    async fn delete(&self, path: &str) -> Result<(), FileStoreError>;
}

/// Anything outside [A-Za-z0-9.-] becomes an underscore.
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
        .collect()
}

/// Store key for an upload: `files/<uploader>/<millis>_<sanitized-name>`.
/// The millisecond prefix keeps same-named uploads from colliding.
pub fn object_path(uploader_id: &str, file_name: &str) -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    format!("files/{}/{}_{}", uploader_id, millis, sanitize_file_name(file_name))
}

/// Public download URL for a store key (served by the files route).
pub fn download_url(path: &str) -> String {
    let mut url = String::new();
    for segment in path.split('/') {
        url.push('/');
        url.push_str(&urlencoding::encode(segment));
    }
    url
}

fn sniff_mime(bytes: &[u8]) -> String {
    infer::get(bytes)
        .map(|t| t.mime_type().to_string())
        .unwrap_or_else(|| "application/octet-stream".into())
}

// ---------------- Filesystem implementation (default backend) ----------------
pub struct FsFileStore {
    root: PathBuf,
}

impl FsFileStore {
    pub fn new() -> Self {
        let root = std::env::var("CLASSLINK_FILES_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("data/files"));
        Self { root }
    }

    pub fn with_root(root: PathBuf) -> Self {
        Self { root }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, FileStoreError> {
        // Keys are forward-slash relative paths; anything else is hostile.
        let rel = Path::new(path);
        if path.is_empty() || rel.components().any(|c| !matches!(c, Component::Normal(_))) {
            return Err(FileStoreError::Other(format!("invalid store key '{path}'")));
        }
        Ok(self.root.join(rel))
    }
}

impl Default for FsFileStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FileStore for FsFileStore {
    async fn put(&self, path: &str, bytes: &[u8]) -> Result<(), FileStoreError> {
        let full = self.resolve(path)?;
        if let Some(dir) = full.parent() {
            std::fs::create_dir_all(dir).map_err(|e| FileStoreError::Other(e.to_string()))?;
        }
        std::fs::write(&full, bytes).map_err(|e| FileStoreError::Other(e.to_string()))
    }

    async fn get(&self, path: &str) -> Result<(Vec<u8>, String), FileStoreError> {
        let full = self.resolve(path)?;
        let bytes = match std::fs::read(&full) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(FileStoreError::NotFound),
            Err(e) => return Err(FileStoreError::Other(e.to_string())),
        };
        let mime = sniff_mime(&bytes);
        Ok((bytes, mime))
    }

    async fn delete(&self, path: &str) -> Result<(), FileStoreError> {
        let full = self.resolve(path)?;
        // Records are the source of truth; a missing blob is not an error here.
        match std::fs::remove_file(&full) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(FileStoreError::Other(e.to_string())),
        }
    }
}

// ---------------- S3 implementation (MinIO compatible) ----------------
pub struct S3FileStore {
    bucket: String,
    client: aws_sdk_s3::Client,
}

impl S3FileStore {
    pub async fn new() -> anyhow::Result<Self> {
        use aws_credential_types::provider::SharedCredentialsProvider;
        use aws_credential_types::Credentials;

        let endpoint = std::env::var("S3_ENDPOINT")
            .map_err(|_| anyhow::anyhow!("S3_ENDPOINT must be set when FILE_STORE=s3"))?;
        let bucket = std::env::var("S3_BUCKET").unwrap_or_else(|_| "classlink-files".into());
        let region = std::env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".into());

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new(region))
            .endpoint_url(endpoint);
        if let (Ok(access), Ok(secret)) =
            (std::env::var("S3_ACCESS_KEY"), std::env::var("S3_SECRET_KEY"))
        {
            let creds = Credentials::new(access, secret, None, None, "static");
            loader = loader.credentials_provider(SharedCredentialsProvider::new(creds));
        }
        let shared = loader.load().await;
        // MinIO and most self-hosted endpoints have no wildcard DNS, so
        // address buckets by path instead of subdomain.
        let conf = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(true)
            .build();
        let client = aws_sdk_s3::Client::from_conf(conf);
        info!("S3 client ready, bucket '{bucket}'");

        ensure_bucket(&client, &bucket).await?;
        Ok(Self { bucket, client })
    }
}

const MAX_CREATE_ATTEMPTS: u32 = 8;

/// Creates the bucket if it is missing. MinIO in a compose setup can come up
/// after this service, so creation retries with a growing pause.
async fn ensure_bucket(client: &aws_sdk_s3::Client, bucket: &str) -> anyhow::Result<()> {
    if client.head_bucket().bucket(bucket).send().await.is_ok() {
        return Ok(());
    }
    info!("bucket '{bucket}' not reachable, creating");
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match client.create_bucket().bucket(bucket).send().await {
            Ok(_) => {
                info!("created bucket '{bucket}' on attempt {attempt}");
                return Ok(());
            }
            Err(e) if attempt >= MAX_CREATE_ATTEMPTS => {
                return Err(anyhow::anyhow!(
                    "could not create bucket '{bucket}' after {attempt} attempts: {e}"
                ));
            }
            Err(e) => {
                let pause = Duration::from_millis(u64::from(200 * attempt * attempt));
                warn!("create_bucket attempt {attempt} failed: {e:?}, retrying in {pause:?}");
                tokio::time::sleep(pause).await;
            }
        }
    }
}

#[async_trait]
impl FileStore for S3FileStore {
    async fn put(&self, path: &str, bytes: &[u8]) -> Result<(), FileStoreError> {
        use aws_sdk_s3::primitives::ByteStream;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(path)
            .content_type(sniff_mime(bytes))
            .body(ByteStream::from(bytes.to_vec()))
            .send()
            .await
            .map_err(|e| {
                error!("put_object {path} failed: {e:?}");
                FileStoreError::Other(e.to_string())
            })?;
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<(Vec<u8>, String), FileStoreError> {
        let obj = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(path)
            .send()
            .await
            .map_err(|_| FileStoreError::NotFound)?;
        let body = obj
            .body
            .collect()
            .await
            .map_err(|e| FileStoreError::Other(e.to_string()))?;
        let bytes = body.into_bytes().to_vec();
        let mime = sniff_mime(&bytes);
        Ok((bytes, mime))
    }

    async fn delete(&self, path: &str) -> Result<(), FileStoreError> {
        // Records are the source of truth; a missing blob is not an error here.
        let _ = self
            .client
            .delete_object()
            .bucket(&self.bucket)
            .key(path)
            .send()
            .await;
        Ok(())
    }
}

/// Factory used in main. FILE_STORE selects the backend: "s3" for S3/MinIO,
/// anything else (or unset) for the local filesystem. S3 misconfiguration
/// panics early rather than limping along without uploads.
pub async fn build_file_store() -> Arc<dyn FileStore> {
    match std::env::var("FILE_STORE").as_deref() {
        Ok("s3") => match S3FileStore::new().await {
            Ok(store) => Arc::new(store),
            Err(e) => panic!("Failed to initialize S3 file store: {e}"),
        },
        _ => Arc::new(FsFileStore::new()),
    }
}
