//! Resolves IIIF identifiers to raw image bytes.
//!
//! An identifier is tried as a file under the configured image root first;
//! failing that it is read as a percent-encoded `http(s)` URL, or as a
//! base64 string decoding to one. Remote fetches go through the source
//! cache when one is attached, so concurrent requests for the same origin
//! share a single download. File-system sources are read fresh every time
//! and never enter the cache.

use std::borrow::Cow;
use std::path::PathBuf;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use log::debug;
use percent_encoding::percent_decode_str;
use rocket::tokio;
use url::Url;

use crate::cache::SourceCache;
use crate::error::{Error, Result};

/// Raw encoded bytes plus the modification time the HTTP layer reports:
/// the file mtime for local sources, the fetch time for remote ones.
#[derive(Debug, Clone)]
pub struct RawSource {
    pub bytes: Arc<Vec<u8>>,
    pub mod_time: DateTime<Utc>,
}

#[derive(Clone)]
pub struct SourceLoader {
    root: PathBuf,
    client: reqwest::Client,
    cache: Option<Arc<SourceCache>>,
}

impl SourceLoader {
    pub fn new(root: &str, client: reqwest::Client, cache: Option<Arc<SourceCache>>) -> Self {
        Self {
            root: PathBuf::from(root),
            client,
            cache,
        }
    }

    /// Percent-decodes an identifier and strips `../` sequences.
    pub fn sanitize(identifier: &str) -> String {
        let decoded = if identifier.contains('%') {
            match percent_decode_str(identifier).decode_utf8() {
                Ok(decoded) => decoded,
                Err(_) => Cow::Borrowed(identifier),
            }
        } else {
            Cow::Borrowed(identifier)
        };
        decoded.replace("../", "")
    }

    pub async fn resolve(&self, identifier: &str) -> Result<RawSource> {
        let identifier = Self::sanitize(identifier);

        let path = self.root.join(&identifier);
        if let Ok(meta) = tokio::fs::metadata(&path).await {
            let bytes = tokio::fs::read(&path)
                .await
                .map_err(|_| Error::Unreadable(identifier.clone()))?;
            let mod_time = meta
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());
            return Ok(RawSource {
                bytes: Arc::new(bytes),
                mod_time,
            });
        }
        debug!("no file at {:?}, trying remote", path);

        let url = self.remote_url(&identifier)?;
        let bytes = match &self.cache {
            Some(cache) => cache.get(&url).await?,
            None => Arc::new(download(&self.client, &url).await?),
        };

        Ok(RawSource {
            bytes,
            mod_time: Utc::now(),
        })
    }

    /// The identifier is either a direct URL (possibly with its `//`
    /// collapsed to `/` by the routing layer) or base64 for one.
    fn remote_url(&self, identifier: &str) -> Result<String> {
        let not_found = || Error::NotFound(identifier.to_string());

        let candidate = if identifier.starts_with("http:/") || identifier.starts_with("https:/") {
            if identifier.contains("://") {
                identifier.to_string()
            } else {
                identifier.replacen(":/", "://", 1)
            }
        } else {
            let decoded = BASE64.decode(identifier).map_err(|_| {
                debug!("identifier {:?} is not a base64 encoded URL either", identifier);
                not_found()
            })?;
            String::from_utf8(decoded).map_err(|_| not_found())?
        };

        let parsed = Url::parse(&candidate).map_err(|_| not_found())?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(not_found());
        }

        Ok(candidate)
    }
}

/// Fetches a remote source, propagating the upstream status on non-200.
pub async fn download(client: &reqwest::Client, url: &str) -> Result<Vec<u8>> {
    debug!("downloading {}", url);

    let response = client.get(url).send().await.map_err(|e| {
        debug!("download error for {:?}: {}", url, e);
        Error::NotFound(url.to_string())
    })?;

    let status = response.status();
    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(Error::NotFound(url.to_string()));
    }
    if !status.is_success() {
        return Err(Error::Upstream {
            status: status.as_u16(),
            url: url.to_string(),
        });
    }

    let bytes = response.bytes().await.map_err(|_| Error::Upstream {
        status: 502,
        url: url.to_string(),
    })?;

    Ok(bytes.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn loader(root: &str) -> SourceLoader {
        SourceLoader::new(root, reqwest::Client::new(), None)
    }

    #[test]
    fn sanitize_decodes_and_strips_traversal() {
        assert_eq!(SourceLoader::sanitize("lena.jpg"), "lena.jpg");
        assert_eq!(SourceLoader::sanitize("../../etc/passwd"), "etc/passwd");
        assert_eq!(
            SourceLoader::sanitize("http%3A%2F%2Fexample.org%2Fa.png"),
            "http://example.org/a.png"
        );
        assert_eq!(SourceLoader::sanitize("..%2F..%2Fsecret.png"), "secret.png");
    }

    #[test]
    fn remote_url_normalizes_collapsed_slashes() {
        let loader = loader("/nonexistent");
        assert_eq!(
            loader.remote_url("http:/example.org/a.png").unwrap(),
            "http://example.org/a.png"
        );
        assert_eq!(
            loader.remote_url("https://example.org/a.png").unwrap(),
            "https://example.org/a.png"
        );
    }

    #[test]
    fn remote_url_accepts_base64_urls_only() {
        let loader = loader("/nonexistent");

        let encoded = BASE64.encode("http://example.org/missing.png");
        assert_eq!(
            loader.remote_url(&encoded).unwrap(),
            "http://example.org/missing.png"
        );

        let not_a_url = BASE64.encode("just some text");
        assert!(matches!(
            loader.remote_url(&not_a_url),
            Err(Error::NotFound(_))
        ));

        let ftp = BASE64.encode("ftp://example.org/a.png");
        assert!(matches!(loader.remote_url(&ftp), Err(Error::NotFound(_))));

        assert!(matches!(
            loader.remote_url("not-base64-at-all!"),
            Err(Error::NotFound(_))
        ));
    }

    #[rocket::async_test]
    async fn resolve_reads_files_under_the_root() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(dir.path().join("test.bin")).unwrap();
        file.write_all(b"hello").unwrap();

        let loader = loader(dir.path().to_str().unwrap());
        let source = loader.resolve("test.bin").await.unwrap();
        assert_eq!(*source.bytes, b"hello".to_vec());
        assert!(source.mod_time <= Utc::now());
    }

    #[rocket::async_test]
    async fn resolve_rejects_directories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("images")).unwrap();

        let loader = loader(dir.path().to_str().unwrap());
        assert!(matches!(
            loader.resolve("images").await,
            Err(Error::Unreadable(_))
        ));
    }

    #[rocket::async_test]
    async fn resolve_misses_fall_through_to_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let loader = loader(dir.path().to_str().unwrap());
        assert!(matches!(
            loader.resolve("missing.png").await,
            Err(Error::NotFound(_))
        ));
    }
}
