use async_trait::async_trait;
use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressState, ProgressStyle};
use log::info;
use reqwest::StatusCode;
use std::error;
use std::fmt::Write;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;

use crate::config::SerializableRecord;
use crate::storage::Storage;

fn record_path<R: SerializableRecord>(dir: &str) -> String {
    let dir = dir.trim_end_matches('/');
    if dir.is_empty() {
        R::FILE_NAME.to_string()
    } else {
        format!("{dir}/{}", R::FILE_NAME)
    }
}

#[async_trait]
pub trait StorageExt: Storage {
    /// Dumps the record as JSON into `dir`, using the record's own file name.
    async fn save_record<R: SerializableRecord + Send + Sync>(
        &self,
        dir: &str,
        record: &R,
    ) -> anyhow::Result<PathBuf> {
        let path = record_path::<R>(dir);
        self.write(&path, record.to_json_string()?).await?;
        info!("{} configuration saved in {path}", R::MODEL_TYPE);
        Ok(self.path_buf(&path))
    }

    /// Loads a record previously stored in `dir`. Returns None if there is nothing there.
    async fn load_record<R: SerializableRecord + Send>(
        &self,
        dir: &str,
    ) -> anyhow::Result<Option<R>> {
        let path = record_path::<R>(dir);
        let Some(content) = self.read(&path).await? else {
            return Ok(None);
        };
        Ok(Some(R::from_json_slice(&content)?))
    }

    /// Loads a remote from the local data directory, downloading it from
    /// the remote endpoint if necessary
    ///
    /// # Arguments
    ///
    /// * `url`: The URL of the remote file
    /// * `local_file`: The filename in the local data directory
    /// * `force`: Force the download even if the file exists
    /// * `cbk`: A callback for tracking progress of the download (elapsed, total)
    ///
    /// returns: Result<PathBuf, Error>
    async fn fetch_remote_data_file<Cb: Fn(usize, usize) + Send + Sync + 'static>(
        &self,
        url: &str,
        local_file: &str,
        force: bool,
        cbk: Cb,
    ) -> std::io::Result<PathBuf> {
        // At this point, the file might already exist on disk, so nothing else to do.
        if self.exists(local_file).await? && !force {
            return Ok(self.path_buf(local_file));
        }

        // If the file was not in disk, we need to download it.
        let resp = reqwest::get(url).await.map_err(io_err)?;
        let status_code = resp.status();
        if status_code != StatusCode::OK {
            return Err(io_err(format!(
                "Error downloading {url}. Invalid status code {status_code}"
            )));
        }
        let total_bytes = resp.content_length().unwrap_or_default() as usize;

        // The file will be first downloaded to a temporary file, to avoid corruptions.
        let temp_file = format!("{local_file}.temp");
        let mut file = self.create(&temp_file).await?;

        // Stream the HTTP response to the file stream.
        let mut stream = resp.bytes_stream();
        let mut downloaded_bytes = 0;
        while let Some(item) = stream.next().await {
            match item {
                Ok(chunk) => {
                    downloaded_bytes += chunk.len();
                    cbk(downloaded_bytes, total_bytes);
                    file.write_all(&chunk).await?
                }
                Err(err) => return Err(io_err(err)),
            }
        }
        file.flush().await?;
        drop(file);

        // If everything succeeded, we are fine to promote the newly stored temporary
        // file to the actual destination.
        self.mv(&temp_file, local_file).await?;

        Ok(self.path_buf(local_file))
    }
}

impl<T: Storage + 'static> StorageExt for T {}

pub fn download_bar(file: &str) -> ProgressBar {
    const NAME_LEN: usize = 32;
    const NAME_SHIFT_INTERVAL: usize = 300;
    let pb = ProgressBar::with_draw_target(None, ProgressDrawTarget::stderr());
    let file_string = file.to_string();
    let style = ProgressStyle::with_template(
        "{file:>32} {spinner:.green} [{wide_bar:.cyan/blue}] {bytes}/{total_bytes}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .with_key("file", move |state: &ProgressState, w: &mut dyn Write| {
        if file_string.len() > NAME_LEN {
            let el = state.elapsed().as_millis() as usize;
            let offset = (el / NAME_SHIFT_INTERVAL) % (file_string.len() - NAME_LEN + 1);
            let view = &file_string[offset..offset + NAME_LEN];
            let _ = write!(w, "{view: >w$}", w = NAME_LEN);
        } else {
            let _ = write!(w, "{file_string: >w$}", w = NAME_LEN);
        }
    })
    .progress_chars("#>-");
    pb.set_style(style);
    pb
}

fn io_err<E>(e: E) -> std::io::Error
where
    E: Into<Box<dyn error::Error + Send + Sync>>,
{
    std::io::Error::new(std::io::ErrorKind::Other, e)
}
