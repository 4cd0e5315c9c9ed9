//! Per-request working directory.
//!
//! Each request gets `<work_dir>/<uuid>/`, so concurrent requests never share
//! `message_<index>` files.

use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::tts::AudioFormat;

/// Identity and scratch space of one request.
///
/// The directory is removed by [`RequestContext::finish`], or on drop when the request
/// future is abandoned (client disconnect, panic).
#[derive(Debug)]
pub struct RequestContext {
    id: Uuid,
    dir: PathBuf,
    keep: bool,
    finished: bool,
}

impl RequestContext {
    /// Create the request directory under `work_dir`.
    pub async fn create(work_dir: &Path, keep: bool) -> std::io::Result<Self> {
        let id = Uuid::new_v4();
        let dir = work_dir.join(id.to_string());
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            id,
            dir,
            keep,
            finished: false,
        })
    }

    /// Request identifier.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Request-private directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Audio path for message `index`.
    pub fn audio_path(&self, index: usize, format: AudioFormat) -> PathBuf {
        self.dir
            .join(format!("message_{index}.{}", format.extension()))
    }

    /// Remove the directory unless artifacts are kept.
    pub async fn finish(mut self) {
        self.finished = true;
        if self.keep {
            tracing::debug!(request_id = %self.id, dir = %self.dir.display(), "keeping request artifacts");
            return;
        }
        if let Err(e) = tokio::fs::remove_dir_all(&self.dir).await {
            tracing::warn!(request_id = %self.id, error = %e, "failed to remove request directory");
        }
    }
}

impl Drop for RequestContext {
    fn drop(&mut self) {
        if self.finished || self.keep {
            return;
        }
        match std::fs::remove_dir_all(&self.dir) {
            Ok(()) => tracing::debug!(request_id = %self.id, "removed abandoned request directory"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(request_id = %self.id, error = %e, "failed to remove abandoned request directory");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[tokio::test]
    async fn contexts_are_isolated() {
        let root = tempfile::tempdir().unwrap();
        let a = RequestContext::create(root.path(), false).await.unwrap();
        let b = RequestContext::create(root.path(), false).await.unwrap();
        assert_ne!(a.id(), b.id());
        assert_ne!(
            a.audio_path(0, AudioFormat::Mp3),
            b.audio_path(0, AudioFormat::Mp3)
        );
        assert!(a.dir().is_dir());
    }

    #[tokio::test]
    async fn audio_path_uses_index_and_extension() {
        let root = tempfile::tempdir().unwrap();
        let ctx = RequestContext::create(root.path(), false).await.unwrap();
        assert!(ctx.audio_path(3, AudioFormat::Wav).ends_with("message_3.wav"));
    }

    #[tokio::test]
    async fn finish_removes_directory_unless_kept() {
        let root = tempfile::tempdir().unwrap();
        let ctx = RequestContext::create(root.path(), false).await.unwrap();
        let dir = ctx.dir().to_path_buf();
        std::fs::write(ctx.audio_path(0, AudioFormat::Mp3), b"x").unwrap();
        ctx.finish().await;
        assert!(!dir.exists());

        let kept = RequestContext::create(root.path(), true).await.unwrap();
        let kept_dir = kept.dir().to_path_buf();
        drop(kept);
        assert!(kept_dir.exists());

        let kept = RequestContext::create(root.path(), true).await.unwrap();
        let dir = kept.dir().to_path_buf();
        kept.finish().await;
        assert!(dir.exists());
    }

    #[tokio::test]
    async fn dropping_without_finish_removes_directory() {
        let root = tempfile::tempdir().unwrap();
        let ctx = RequestContext::create(root.path(), false).await.unwrap();
        let dir = ctx.dir().to_path_buf();
        std::fs::write(ctx.audio_path(0, AudioFormat::Wav), b"x").unwrap();
        drop(ctx);
        assert!(!dir.exists());
    }
}
