//! Model weight download with atomic placement
//!
//! Downloads are streamed in chunks into a temporary file next to the
//! destination, then renamed into place, so a crashed or failed download
//! never leaves a partial weight file where a loader could find it.

use crate::error::{CutoutError, Result};
use crate::registry::ModelSpec;
use log::{info, warn};
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);
const CHUNK_SIZE: usize = 256 * 1024;

/// Resolve a model's weight file, downloading it when permitted
///
/// Returns the local path when the file exists or was fetched. With
/// `allow_remote` off and no local file, fails with `ModelMissing`.
///
/// # Errors
/// - `ModelMissing` when the file is absent and downloads are disallowed,
///   or the spec has no remote URL
/// - `Download` on network or HTTP failures
/// - `Io` on filesystem failures
pub fn ensure_weight_file(
    spec: &ModelSpec,
    model_dir: &Path,
    allow_remote: bool,
) -> Result<PathBuf> {
    let destination = model_dir.join(spec.file_name);
    if destination.exists() {
        return Ok(destination);
    }
    if !allow_remote {
        return Err(CutoutError::model_missing(format!(
            "{} not found in {}; place the file there or enable remote downloads",
            spec.file_name,
            model_dir.display()
        )));
    }
    let url = spec.remote_url.ok_or_else(|| {
        CutoutError::model_missing(format!(
            "{} has no remote source configured",
            spec.file_name
        ))
    })?;

    fs::create_dir_all(model_dir)
        .map_err(|e| CutoutError::file_io_error("create model directory", model_dir, e))?;
    download_to(url, &destination)?;
    Ok(destination)
}

/// Stream a URL into `destination` via a temporary file
///
/// # Errors
/// - `Download` on network failures or non-success HTTP status
/// - `Io` on filesystem failures
pub fn download_to(url: &str, destination: &Path) -> Result<()> {
    info!("Downloading {} -> {}", url, destination.display());

    let client = reqwest::blocking::Client::builder()
        .timeout(DOWNLOAD_TIMEOUT)
        .build()
        .map_err(|e| CutoutError::download(format!("Failed to create HTTP client: {e}")))?;

    let mut response = client
        .get(url)
        .send()
        .map_err(|e| CutoutError::download(format!("Request to {url} failed: {e}")))?;
    if !response.status().is_success() {
        return Err(CutoutError::download(format!(
            "Unable to download {} (status {})",
            url,
            response.status()
        )));
    }

    let temp_path = destination.with_extension("part");
    let result = write_chunked(&mut response, &temp_path);
    match result {
        Ok(bytes) => {
            fs::rename(&temp_path, destination)
                .map_err(|e| CutoutError::file_io_error("move downloaded file", destination, e))?;
            info!(
                "Downloaded {} ({:.1} MB)",
                destination.display(),
                bytes as f64 / (1024.0 * 1024.0)
            );
            Ok(())
        },
        Err(e) => {
            if temp_path.exists() {
                if let Err(cleanup_err) = fs::remove_file(&temp_path) {
                    warn!("Failed to clean up partial download: {cleanup_err}");
                }
            }
            Err(e)
        },
    }
}

fn write_chunked<R: Read>(reader: &mut R, path: &Path) -> Result<u64> {
    let mut file =
        fs::File::create(path).map_err(|e| CutoutError::file_io_error("create file", path, e))?;
    let mut buffer = vec![0u8; CHUNK_SIZE];
    let mut total = 0u64;
    loop {
        let read = reader
            .read(&mut buffer)
            .map_err(|e| CutoutError::download(format!("Read from response failed: {e}")))?;
        if read == 0 {
            break;
        }
        file.write_all(buffer.get(..read).unwrap_or(&buffer))
            .map_err(|e| CutoutError::file_io_error("write chunk", path, e))?;
        total += read as u64;
    }
    file.flush()
        .map_err(|e| CutoutError::file_io_error("flush file", path, e))?;
    Ok(total)
}
