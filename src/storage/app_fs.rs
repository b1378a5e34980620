use async_trait::async_trait;
use directories::ProjectDirs;
use std::path::PathBuf;

use crate::storage::{Storage, StorageFile};

/// [Storage] backed by a directory on disk.
#[derive(Clone)]
pub struct AppFs {
    pub root: PathBuf,
}

impl StorageFile for tokio::fs::File {}

#[async_trait]
impl Storage for AppFs {
    type File = tokio::fs::File;

    async fn exists(&self, path: &str) -> std::io::Result<bool> {
        let (abs_filepath, _, _) = self.relative_file_to_path_buf(path);
        tokio::fs::try_exists(abs_filepath).await
    }

    async fn read(&self, path: &str) -> std::io::Result<Option<Vec<u8>>> {
        let (abs_filepath, _, _) = self.relative_file_to_path_buf(path);
        match tokio::fs::read(abs_filepath).await {
            Ok(v) => Ok(Some(v)),
            Err(err) => {
                if err.kind() == std::io::ErrorKind::NotFound {
                    Ok(None)
                } else {
                    Err(err)
                }
            }
        }
    }

    async fn write(&self, path: &str, content: impl AsRef<[u8]> + Send) -> std::io::Result<()> {
        let (abs_filepath, abs_filedir, _) = self.relative_file_to_path_buf(path);
        tokio::fs::create_dir_all(abs_filedir).await?;
        tokio::fs::write(abs_filepath, content).await?;
        Ok(())
    }

    async fn create(&self, path: &str) -> std::io::Result<Self::File> {
        let (abs_filepath, abs_filedir, _) = self.relative_file_to_path_buf(path);
        tokio::fs::create_dir_all(abs_filedir).await?;
        tokio::fs::File::create(abs_filepath).await
    }

    async fn list(&self, path: &str) -> std::io::Result<Vec<String>> {
        let (abs_dir, _, _) = self.relative_file_to_path_buf(path);
        let mut files = vec![];
        let mut dir = match tokio::fs::read_dir(abs_dir).await {
            Ok(v) => v,
            Err(err) => {
                if err.kind() == std::io::ErrorKind::NotFound {
                    return Ok(vec![]);
                }
                return Err(err);
            }
        };
        while let Some(entry) = dir.next_entry().await? {
            let entry_path = entry.path();
            let Ok(rel) = entry_path.strip_prefix(&self.root) else {
                continue;
            };
            let rel = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            files.push(rel)
        }
        files.sort();
        Ok(files)
    }

    async fn mv(&self, from: &str, to: &str) -> std::io::Result<()> {
        let (from_filepath, _, _) = self.relative_file_to_path_buf(from);
        let (to_filepath, to_dirpath, _) = self.relative_file_to_path_buf(to);
        tokio::fs::create_dir_all(to_dirpath).await?;
        tokio::fs::rename(from_filepath, to_filepath).await
    }

    fn path_buf(&self, path: &str) -> PathBuf {
        let (abs_filepath, _, _) = self.relative_file_to_path_buf(path);
        abs_filepath
    }
}

impl AppFs {
    pub fn new(value: impl Into<PathBuf>) -> Self {
        Self { root: value.into() }
    }

    /// Storage rooted at the user's data directory for this application.
    pub fn project() -> std::io::Result<Self> {
        let dirs = ProjectDirs::from("com", "sweetcocoa", "pop2piano").ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "Could not load project directory",
            )
        })?;
        Ok(Self::new(dirs.data_dir()))
    }

    /// Gets a / separated relative path and returns:
    /// - The absolute path in the disk
    /// - The absolute path of the dir containing the file in the disk
    /// - The filename
    fn relative_file_to_path_buf(&self, relative_file: &str) -> (PathBuf, PathBuf, String) {
        let mut abs_file_dir = self.root.to_path_buf();

        // The provided `relative_path` might contain directories separated with /
        let mut relative_file_elements = relative_file
            .split('/')
            .filter(|e| !e.is_empty())
            .collect::<Vec<_>>();
        // so take the file name...
        let file_name = relative_file_elements.pop().unwrap_or_default();
        // ... and append the rest of the elements to the base directory.
        for element in relative_file_elements {
            abs_file_dir = abs_file_dir.join(element);
        }
        (
            abs_file_dir.join(file_name),
            abs_file_dir,
            file_name.to_string(),
        )
    }
}
