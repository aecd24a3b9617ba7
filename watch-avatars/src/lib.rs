use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use url::Url;

use watch_error::{Result, WatchError};

/// Where a confirmed avatar's bytes come from.
#[derive(Debug, Clone)]
pub enum AvatarSource {
    /// Bytes already in hand, e.g. fetched for content fingerprinting.
    Bytes(Vec<u8>),
    /// Fetch from the CDN, streamed to disk.
    Remote(Url),
}

/// Append-only directory of timestamped avatar snapshots. Existing
/// artifacts are never overwritten or deleted.
pub struct AvatarStore {
    root: PathBuf,
}

impl AvatarStore {
    pub fn new(root: &Path) -> Self {
        AvatarStore {
            root: root.to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Artifact file name for one snapshot. Second-resolution timestamp
    /// first so the directory sorts chronologically.
    pub fn artifact_name(subject: &str, taken_at: &DateTime<Local>) -> String {
        format!(
            "{}_{}_profile.jpg",
            taken_at.format("%Y%m%d_%H%M%S"),
            subject
        )
    }

    /// Persist one avatar snapshot and return its path. Every failure
    /// in here, network or disk, surfaces as
    /// [`WatchError::ArtifactWrite`] so the caller knows the baseline
    /// must not move.
    pub async fn save(
        &self,
        client: &reqwest::Client,
        source: AvatarSource,
        subject: &str,
        taken_at: &DateTime<Local>,
    ) -> Result<PathBuf> {
        fs::create_dir_all(&self.root).map_err(artifact_err)?;
        let path = self.root.join(Self::artifact_name(subject, taken_at));
        match source {
            AvatarSource::Bytes(bytes) => {
                fs::write(&path, bytes).map_err(artifact_err)?;
            }
            AvatarSource::Remote(url) => self.download(client, &url, &path).await?,
        }
        log::info!("avatar artifact saved to {}", path.display());
        Ok(path)
    }

    /// Stream the body to a sibling temp file, then rename into place.
    /// A dropped connection never leaves a half-written artifact under
    /// the final name.
    async fn download(&self, client: &reqwest::Client, url: &Url, path: &Path) -> Result<()> {
        let mut response = client
            .get(url.as_str())
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(artifact_err)?;

        let suffix: String = std::iter::repeat_with(fastrand::alphanumeric)
            .take(10)
            .collect();
        let tmp_path = path.with_extension(format!("part.{suffix}"));

        let streamed: Result<()> = async {
            let mut file = File::create(&tmp_path).map_err(artifact_err)?;
            while let Some(chunk) = response.chunk().await.map_err(artifact_err)? {
                file.write_all(&chunk).map_err(artifact_err)?;
            }
            file.flush().map_err(artifact_err)?;
            Ok(())
        }
        .await;
        if let Err(err) = streamed {
            let _ = fs::remove_file(&tmp_path);
            return Err(err);
        }

        if let Err(err) = fs::rename(&tmp_path, path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(artifact_err(err));
        }
        Ok(())
    }
}

fn artifact_err(err: impl std::fmt::Display) -> WatchError {
    WatchError::ArtifactWrite(err.to_string())
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use chrono::TimeZone;
    use tempdir::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    fn taken_at() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 8, 21, 7, 5, 9).unwrap()
    }

    async fn spawn_image(status: &'static str, body: &'static [u8]) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let _ = socket.read(&mut buf).await.unwrap();
            let head = format!(
                "HTTP/1.1 {status}\r\ncontent-type: image/jpeg\r\n\
content-length: {}\r\nconnection: close\r\n\r\n",
                body.len(),
            );
            socket.write_all(head.as_bytes()).await.unwrap();
            socket.write_all(body).await.unwrap();
            socket.shutdown().await.unwrap();
        });
        addr
    }

    #[test]
    fn artifact_names_sort_chronologically() {
        assert_eq!(
            AvatarStore::artifact_name("ghost", &taken_at()),
            "20260821_070509_ghost_profile.jpg"
        );
    }

    #[tokio::test]
    async fn saves_bytes_under_timestamped_name() {
        let dir = TempDir::new("avatars").unwrap();
        let store = AvatarStore::new(&dir.path().join("profile_pics"));
        let path = store
            .save(
                &reqwest::Client::new(),
                AvatarSource::Bytes(b"jpeg bytes".to_vec()),
                "ghost",
                &taken_at(),
            )
            .await
            .unwrap();
        assert_eq!(
            path.file_name().and_then(|n| n.to_str()),
            Some("20260821_070509_ghost_profile.jpg")
        );
        assert_eq!(fs::read(&path).unwrap(), b"jpeg bytes");
    }

    #[tokio::test]
    async fn streams_remote_bytes_and_cleans_up_temp_files() {
        let addr = spawn_image("200 OK", b"remote jpeg").await;
        let dir = TempDir::new("avatars").unwrap();
        let store = AvatarStore::new(dir.path());
        let url = Url::parse(&format!("http://{addr}/v/avatar.jpg")).unwrap();
        let path = store
            .save(
                &reqwest::Client::new(),
                AvatarSource::Remote(url),
                "ghost",
                &taken_at(),
            )
            .await
            .unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"remote jpeg");

        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["20260821_070509_ghost_profile.jpg".to_string()]);
    }

    #[tokio::test]
    async fn failed_download_is_an_artifact_write_error() {
        let addr = spawn_image("404 Not Found", b"gone").await;
        let dir = TempDir::new("avatars").unwrap();
        let store = AvatarStore::new(dir.path());
        let url = Url::parse(&format!("http://{addr}/v/avatar.jpg")).unwrap();
        let err = store
            .save(
                &reqwest::Client::new(),
                AvatarSource::Remote(url),
                "ghost",
                &taken_at(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, WatchError::ArtifactWrite(_)));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
