//! Object store sink
//!
//! Uploads the output directory and the run log under
//! `<event_id>/<result_id>/`. Every file is attempted even when an earlier
//! upload fails, since the uploaded output may be the only record of what
//! went wrong.

use async_trait::async_trait;
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::errors::{SinkError, SinkResult};
use crate::utils::run_log::RUN_LOG_UPLOAD_NAME;

/// Object store transport
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Bucket the store writes to
    fn bucket(&self) -> &str;

    async fn put(&self, key: &str, body: Vec<u8>) -> SinkResult<()>;
}

/// S3-style object store reached by plain HTTP PUT
pub struct HttpObjectStore {
    client: Client,
    endpoint: String,
    bucket: String,
}

impl HttpObjectStore {
    pub fn new(endpoint: &str, bucket: &str, timeout: Duration) -> SinkResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("wphase-publish/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            bucket: bucket.to_string(),
        })
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/{}/{}", self.endpoint, self.bucket, key)
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put(&self, key: &str, body: Vec<u8>) -> SinkResult<()> {
        let url = self.object_url(key);
        let response = self.client.put(&url).body(body).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SinkError::transport(
                "object_store",
                format!("PUT {url} returned HTTP {status}"),
            ));
        }
        Ok(())
    }
}

/// Check that `segment` can stand as one component of an object key
///
/// Rejects empty and dot segments, separators, URL metacharacters and
/// control characters.
pub fn check_key_segment(segment: &str) -> Result<(), String> {
    if segment.trim().is_empty() || segment == "." || segment == ".." {
        return Err(format!("'{segment}' is not a usable key segment"));
    }
    let forbidden = |c: &char| matches!(c, '/' | '\\' | '?' | '#' | '%') || c.is_control();
    if let Some(c) = segment.chars().find(forbidden) {
        return Err(format!(
            "'{}' contains '{}'",
            segment.escape_default(),
            c.escape_default()
        ));
    }
    Ok(())
}

/// Key prefix for one result of one event
pub fn key_prefix(event_id: &str, result_id: &str) -> SinkResult<String> {
    for segment in [event_id, result_id] {
        check_key_segment(segment).map_err(SinkError::InvalidKey)?;
    }
    Ok(format!("{event_id}/{result_id}"))
}

/// Files under `output_dir` with their slash-separated relative paths
fn collect_output_files(output_dir: &Path) -> Vec<(PathBuf, String)> {
    if !output_dir.is_dir() {
        debug!("Output directory absent, nothing to collect: {}", output_dir.display());
        return Vec::new();
    }

    let mut files: Vec<(PathBuf, String)> = WalkDir::new(output_dir)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Skipping unreadable output entry: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| {
            let relative = entry.path().strip_prefix(output_dir).ok()?;
            let key = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            Some((entry.path().to_path_buf(), key))
        })
        .collect();
    files.sort_by(|a, b| a.1.cmp(&b.1));
    files
}

/// Uploads a run's output
pub struct OutputUploader<'a> {
    store: &'a dyn ObjectStore,
    prefix: String,
}

impl<'a> OutputUploader<'a> {
    /// Fails when either identifier cannot be used inside an object key
    pub fn new(store: &'a dyn ObjectStore, event_id: &str, result_id: &str) -> SinkResult<Self> {
        Ok(Self {
            store,
            prefix: key_prefix(event_id, result_id)?,
        })
    }

    /// Upload the output directory and the run log; returns the uploaded keys
    ///
    /// Fails after attempting everything if any single upload failed.
    pub async fn upload(
        &self,
        output_dir: &Path,
        run_log: Option<&Path>,
    ) -> SinkResult<Vec<String>> {
        let mut uploads = collect_output_files(output_dir);
        if let Some(log_path) = run_log {
            uploads.retain(|(path, _)| path != log_path);
            if log_path.is_file() {
                uploads.push((log_path.to_path_buf(), RUN_LOG_UPLOAD_NAME.to_string()));
            } else {
                warn!("Run log missing, not uploaded: {}", log_path.display());
            }
        }

        let mut uploaded = Vec::with_capacity(uploads.len());
        let mut failures = Vec::new();
        for (path, relative) in uploads {
            let key = format!("{}/{}", self.prefix, relative);
            let result = match tokio::fs::read(&path).await {
                Ok(body) => self.store.put(&key, body).await,
                Err(e) => Err(SinkError::Io(e)),
            };
            match result {
                Ok(()) => {
                    debug!("Uploaded object: bucket={} key={}", self.store.bucket(), key);
                    uploaded.push(key);
                }
                Err(e) => {
                    warn!("Upload failed: bucket={} key={} error={}", self.store.bucket(), key, e);
                    failures.push(format!("{key}: {e}"));
                }
            }
        }

        if !failures.is_empty() {
            return Err(SinkError::transport(
                "object_store",
                format!(
                    "{} of {} uploads failed: {}",
                    failures.len(),
                    failures.len() + uploaded.len(),
                    failures.join("; ")
                ),
            ));
        }

        info!(
            "Output uploaded: bucket={} prefix={} objects={}",
            self.store.bucket(),
            self.prefix,
            uploaded.len()
        );
        Ok(uploaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryStore {
        objects: Mutex<Vec<(String, Vec<u8>)>>,
        reject: Option<&'static str>,
    }

    #[async_trait]
    impl ObjectStore for MemoryStore {
        fn bucket(&self) -> &str {
            "wphase-results"
        }

        async fn put(&self, key: &str, body: Vec<u8>) -> SinkResult<()> {
            if self.reject.is_some_and(|r| key.ends_with(r)) {
                return Err(SinkError::transport("object_store", "rejected"));
            }
            self.objects.lock().unwrap().push((key.to_string(), body));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_upload_layout() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("output");
        std::fs::create_dir_all(output.join("plots")).unwrap();
        std::fs::write(output.join("wphase_output.json"), b"{}").unwrap();
        std::fs::write(output.join("plots/beachball.png"), b"png").unwrap();
        let log = dir.path().join("run.log");
        std::fs::write(&log, b"log line").unwrap();

        let store = MemoryStore::default();
        let keys = OutputUploader::new(&store, "ga2020abcd", "r1")
            .unwrap()
            .upload(&output, Some(&log))
            .await
            .unwrap();

        assert_eq!(
            keys,
            vec![
                "ga2020abcd/r1/plots/beachball.png",
                "ga2020abcd/r1/wphase_output.json",
                "ga2020abcd/r1/wphase.log",
            ]
        );
        let objects = store.objects.lock().unwrap();
        assert_eq!(objects[2].1, b"log line");
    }

    #[tokio::test]
    async fn test_failed_upload_does_not_stop_others() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.json"), b"a").unwrap();
        std::fs::write(dir.path().join("b.xml"), b"b").unwrap();

        let store = MemoryStore {
            reject: Some("a.json"),
            ..MemoryStore::default()
        };
        let err = OutputUploader::new(&store, "e", "r")
            .unwrap()
            .upload(dir.path(), None)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("1 of 2 uploads failed"));
        assert_eq!(store.objects.lock().unwrap()[0].0, "e/r/b.xml");
    }

    #[tokio::test]
    async fn test_run_log_inside_output_is_uploaded_once() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("wphase-publish.log");
        std::fs::write(&log, b"log").unwrap();

        let store = MemoryStore::default();
        let keys = OutputUploader::new(&store, "e", "r")
            .unwrap()
            .upload(dir.path(), Some(&log))
            .await
            .unwrap();
        assert_eq!(keys, vec!["e/r/wphase.log"]);
    }

    #[rstest]
    #[case("")]
    #[case(".")]
    #[case("..")]
    #[case("ga2020/abcd")]
    #[case("..\\escape")]
    #[case("r1?acl")]
    #[case("r1%2F")]
    #[case("line\nbreak")]
    fn test_unsafe_key_segment_rejected(#[case] segment: &str) {
        assert!(check_key_segment(segment).is_err());

        let store = MemoryStore::default();
        let err = OutputUploader::new(&store, "ga2020abcd", segment).err().unwrap();
        assert!(matches!(err, SinkError::InvalidKey(_)));
    }

    #[test]
    fn test_key_prefix() {
        assert_eq!(key_prefix("ga2020abcd", "r1.v2-final").unwrap(), "ga2020abcd/r1.v2-final");
    }

    #[test]
    fn test_object_url() {
        let store = HttpObjectStore::new(
            "https://s3.example.org/",
            "wphase-results",
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(
            store.object_url("e/r/wphase.log"),
            "https://s3.example.org/wphase-results/e/r/wphase.log"
        );
    }
}
