// ABOUTME: Flat per-directory file storage shared by the server (one per
// ABOUTME: user) and the client (one sync directory).

use crate::model::filename::Filename;
use crate::model::listing::FileEntry;
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::fs;
use tokio::io::AsyncWriteExt;

fn system_time_from_secs(secs: i64) -> SystemTime {
    if secs >= 0 {
        UNIX_EPOCH + Duration::from_secs(secs as u64)
    } else {
        UNIX_EPOCH - Duration::from_secs((-secs) as u64)
    }
}

/// A flat, non-recursive directory of files. One `LocalStore`
/// corresponds to one user's `sync_dir` on the server, or to the client's
/// single local sync directory.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        LocalStore { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, name: &Filename) -> PathBuf {
        self.root.join(name.as_str())
    }

    pub async fn ensure_dir(&self) -> io::Result<()> {
        fs::create_dir_all(&self.root).await
    }

    /// Lists regular files directly under the root; never recurses, never
    /// fails the whole listing because one entry's metadata is unreadable.
    /// Excludes dotfiles, which includes the `.{name}.partial` temp files
    /// `open_write` uses while a transfer is in progress: a partial upload
    /// must not be visible until it is committed.
    pub async fn list(&self) -> io::Result<Vec<FileEntry>> {
        let mut entries = Vec::new();
        let mut read_dir = match fs::read_dir(&self.root).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(entries),
            Err(e) => return Err(e),
        };

        while let Some(entry) = read_dir.next_entry().await? {
            let Ok(file_type) = entry.file_type().await else { continue };
            if !file_type.is_file() {
                continue;
            }
            let Ok(metadata) = entry.metadata().await else { continue };
            let Ok(name) = Filename::parse(entry.file_name().to_string_lossy().into_owned())
            else {
                continue;
            };
            if name.is_hidden() {
                continue;
            }
            entries.push(FileEntry {
                name,
                size: metadata.len(),
                mtime: system_time_from_secs(metadata.mtime()),
                atime: system_time_from_secs(metadata.atime()),
                ctime: system_time_from_secs(metadata.ctime()),
            });
        }
        Ok(entries)
    }

    /// Fails if the file is absent.
    pub async fn open_read(&self, name: &Filename) -> io::Result<fs::File> {
        fs::File::open(self.path_for(name)).await
    }

    /// Opens a write-in-progress: bytes land in a sibling temp file and only
    /// become visible under `name` once `commit` renames it into place, so a
    /// partial upload never shows up in a listing.
    pub async fn open_write(&self, name: &Filename) -> io::Result<PendingWrite> {
        self.ensure_dir().await?;
        let final_path = self.path_for(name);
        let temp_path = self.root.join(format!(".{}.partial", name.as_str()));
        let file = fs::File::create(&temp_path).await?;
        Ok(PendingWrite { file, temp_path, final_path, committed: false })
    }

    /// Absent file is not an error.
    pub async fn delete(&self, name: &Filename) -> io::Result<()> {
        match fs::remove_file(self.path_for(name)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// A file being written through a temp-name-and-rename commit.
#[derive(Debug)]
pub struct PendingWrite {
    file: fs::File,
    temp_path: PathBuf,
    final_path: PathBuf,
    committed: bool,
}

impl PendingWrite {
    pub async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.file.write_all(data).await
    }

    /// Commits the full byte stream atomically. Called only after the
    /// terminator has been received.
    pub async fn commit(mut self) -> io::Result<()> {
        self.file.flush().await?;
        fs::rename(&self.temp_path, &self.final_path).await?;
        self.committed = true;
        Ok(())
    }

    /// Discards a partial upload, e.g. after transport loss mid-transfer.
    pub async fn abort(mut self) -> io::Result<()> {
        self.committed = true; // suppress the Drop warning path below
        match fs::remove_file(&self.temp_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

impl Drop for PendingWrite {
    fn drop(&mut self) {
        if !self.committed {
            let temp_path = self.temp_path.clone();
            tokio::spawn(async move {
                let _ = fs::remove_file(&temp_path).await;
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn write_then_read_round_trips_bytes() {
        let dir = tempdir().unwrap();
        let store = LocalStore::new(dir.path());
        let name = Filename::parse("hello.txt").unwrap();

        let mut pending = store.open_write(&name).await.unwrap();
        pending.write_all(b"hi\n").await.unwrap();
        pending.commit().await.unwrap();

        let mut file = store.open_read(&name).await.unwrap();
        let mut buf = Vec::new();
        tokio::io::AsyncReadExt::read_to_end(&mut file, &mut buf).await.unwrap();
        assert_eq!(buf, b"hi\n");
    }

    #[tokio::test]
    async fn aborted_write_leaves_no_visible_file() {
        let dir = tempdir().unwrap();
        let store = LocalStore::new(dir.path());
        let name = Filename::parse("partial.bin").unwrap();

        let mut pending = store.open_write(&name).await.unwrap();
        pending.write_all(b"half").await.unwrap();
        pending.abort().await.unwrap();

        let listing = store.list().await.unwrap();
        assert!(listing.is_empty());
        assert!(store.open_read(&name).await.is_err());
    }

    #[tokio::test]
    async fn delete_of_absent_file_is_not_an_error() {
        let dir = tempdir().unwrap();
        let store = LocalStore::new(dir.path());
        let name = Filename::parse("ghost.txt").unwrap();
        store.delete(&name).await.unwrap();
    }

    #[tokio::test]
    async fn list_reports_every_file_and_only_files() {
        let dir = tempdir().unwrap();
        let store = LocalStore::new(dir.path());
        for n in ["a.txt", "b.txt"] {
            let name = Filename::parse(n).unwrap();
            let mut pending = store.open_write(&name).await.unwrap();
            pending.write_all(b"x").await.unwrap();
            pending.commit().await.unwrap();
        }
        fs::create_dir(dir.path().join("subdir")).await.unwrap();

        let mut names: Vec<_> = store.list().await.unwrap().into_iter().map(|e| e.name.into_string()).collect();
        names.sort();
        assert_eq!(names, vec!["a.txt".to_string(), "b.txt".to_string()]);
    }

    #[tokio::test]
    async fn list_excludes_a_partial_upload_in_progress() {
        let dir = tempdir().unwrap();
        let store = LocalStore::new(dir.path());
        let name = Filename::parse("big.bin").unwrap();

        // Simulates the window while open_write's temp file is still being
        // written: it must not appear in a listing even though it already
        // has a size on disk.
        let mut pending = store.open_write(&name).await.unwrap();
        pending.write_all(b"half").await.unwrap();

        let listing = store.list().await.unwrap();
        assert!(listing.is_empty());

        pending.commit().await.unwrap();
        let names: Vec<_> = store.list().await.unwrap().into_iter().map(|e| e.name.into_string()).collect();
        assert_eq!(names, vec!["big.bin".to_string()]);
    }
}
