use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};

use crate::config::{StorageBackend, StorageConfig};
use crate::trip_data::{self, Dataset};

/// Whole-file, read-only access to the bulk datasets.
pub trait BlobStore {
    fn fetch(&self, file_id: &str) -> Result<Vec<u8>>;
}

pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        LocalBlobStore {
            root: root.as_ref().to_path_buf(),
        }
    }
}

impl BlobStore for LocalBlobStore {
    fn fetch(&self, file_id: &str) -> Result<Vec<u8>> {
        let path = self.root.join(file_id);
        std::fs::read(&path).with_context(|| format!("failed to read {}", path.display()))
    }
}

/// Downloads files from Google Drive with an OAuth access token.
pub struct DriveBlobStore {
    base_url: String,
    access_token: String,
    http: reqwest::blocking::Client,
}

const DRIVE_FILES_URL: &str = "https://www.googleapis.com/drive/v3/files";
const DOWNLOAD_CHUNK: usize = 1024 * 1024;

impl DriveBlobStore {
    pub fn new(access_token: &str) -> Result<Self> {
        Self::with_base_url(DRIVE_FILES_URL, access_token)
    }

    pub fn with_base_url(base_url: &str, access_token: &str) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()?;
        Ok(DriveBlobStore {
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token: access_token.to_string(),
            http,
        })
    }
}

/// Drive ids are often pasted together with the rest of the share link, e.g.
/// `1zoe.../view?usp=drive_link`.
pub fn normalize_drive_file_id(file_id: &str) -> &str {
    file_id
        .split(['/', '?'])
        .next()
        .unwrap_or(file_id)
        .trim()
}

impl BlobStore for DriveBlobStore {
    fn fetch(&self, file_id: &str) -> Result<Vec<u8>> {
        let file_id = normalize_drive_file_id(file_id);
        let url = format!("{}/{}?alt=media", self.base_url, file_id);
        let mut response = self
            .http
            .get(&url)
            .bearer_auth(&self.access_token)
            .send()
            .with_context(|| format!("failed to request drive file {}", file_id))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            bail!("drive download of {} failed: {} {}", file_id, status, body);
        }

        let total = response.content_length();
        let mut data = Vec::with_capacity(total.unwrap_or(0) as usize);
        let mut chunk = vec![0; DOWNLOAD_CHUNK];
        let mut last_reported = None;
        loop {
            let read = response.read(&mut chunk)?;
            if read == 0 {
                break;
            }
            data.extend_from_slice(&chunk[..read]);
            if let Some(total) = total.filter(|t| *t > 0) {
                let percent = data.len() as u64 * 100 / total;
                if last_reported != Some(percent / 10) {
                    last_reported = Some(percent / 10);
                    info!("download {}: {}%", file_id, percent);
                }
            }
        }
        info!("downloaded {} ({} bytes)", file_id, data.len());
        Ok(data)
    }
}

pub fn open_store(config: &StorageConfig) -> Result<Box<dyn BlobStore>> {
    Ok(match &config.backend {
        StorageBackend::Local { root } => Box::new(LocalBlobStore::new(root)),
        StorageBackend::Drive { access_token } => Box::new(DriveBlobStore::new(access_token)?),
    })
}

/// Fetches and parses both tables.
pub fn load_dataset(store: &dyn BlobStore, config: &StorageConfig) -> Result<Dataset> {
    let samples = store.fetch(&config.samples_file)?;
    let trips = trip_data::load_samples_csv(&samples)
        .with_context(|| format!("failed to parse sample table {}", config.samples_file))?;
    let sequences = store.fetch(&config.sequences_file)?;
    let sequences = trip_data::load_sequences_json(&sequences)
        .with_context(|| format!("failed to parse sequence table {}", config.sequences_file))?;
    info!(
        "loaded {} trips and {} sequences",
        trips.len(),
        sequences.len()
    );
    Dataset::new(trips, sequences)
}
