use anyhow::{Result, anyhow};
use std::path::PathBuf;
use url::Url;

/// Where the source file lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceUri {
    Local(PathBuf),
    S3 { bucket: String, key: String },
}

impl SourceUri {
    /// Parse `s3://bucket/key`, `file:///path` or a plain local path
    pub fn parse(uri: &str) -> Result<Self> {
        let Ok(url) = Url::parse(uri) else {
            return Ok(SourceUri::Local(PathBuf::from(uri)));
        };

        match url.scheme() {
            "s3" => {
                let bucket = url
                    .host_str()
                    .filter(|b| !b.is_empty())
                    .ok_or_else(|| anyhow!("S3 URI missing bucket: {}", uri))?
                    .to_string();

                let key = url.path().trim_start_matches('/').to_string();
                if key.is_empty() || key.ends_with('/') {
                    return Err(anyhow!("S3 URI missing object key: {}", uri));
                }

                Ok(SourceUri::S3 { bucket, key })
            }
            "file" => {
                let path = url
                    .to_file_path()
                    .map_err(|_| anyhow!("Invalid file:// URI: {}", uri))?;
                Ok(SourceUri::Local(path))
            }
            // Windows drive letters parse as a one-letter scheme
            scheme if scheme.len() == 1 => Ok(SourceUri::Local(PathBuf::from(uri))),
            scheme => Err(anyhow!("Unsupported URI scheme: {}", scheme)),
        }
    }

    /// Object key within its store: the S3 key, or the file name for local paths
    pub fn key(&self) -> Result<String> {
        match self {
            SourceUri::S3 { key, .. } => Ok(key.clone()),
            SourceUri::Local(path) => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .ok_or_else(|| anyhow!("Local path has no file name: {}", path.display())),
        }
    }

    /// Directory a local store should be rooted at
    pub fn local_root(&self) -> Option<PathBuf> {
        match self {
            SourceUri::Local(path) => Some(
                path.parent()
                    .filter(|p| !p.as_os_str().is_empty())
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(".")),
            ),
            SourceUri::S3 { .. } => None,
        }
    }
}
