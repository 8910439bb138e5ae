//! Speech synthesis collaborator seam.
//!
//! Audio rendering lives outside the supervisor. A synthesizer accepts text,
//! hands back a handle at once, and resolves the completion channel when
//! playback ends.

use thiserror::Error;
use tokio::sync::oneshot;
use tracing::info;
use vui_core::{AppId, Id};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpeechError {
    #[error("speech synthesis unavailable: {0}")]
    Unavailable(String),
    #[error("playback failed: {0}")]
    Playback(String),
    #[error("speech job dropped before completion")]
    Dropped,
}

/// An accepted synthesis request.
#[derive(Debug)]
pub struct SpeechJob {
    pub handle: Id,
    pub completion: oneshot::Receiver<Result<(), SpeechError>>,
}

impl SpeechJob {
    /// A job plus the sender that completes it.
    pub fn pending() -> (Self, oneshot::Sender<Result<(), SpeechError>>) {
        let (tx, rx) = oneshot::channel();
        let job = Self {
            handle: Id::new(),
            completion: rx,
        };
        (job, tx)
    }

    /// Wait for playback to end. A dropped sender counts as failure.
    pub async fn wait(self) -> Result<(), SpeechError> {
        self.completion.await.unwrap_or(Err(SpeechError::Dropped))
    }
}

pub trait SpeechSynthesizer: Send + Sync + std::fmt::Debug {
    /// Queue `text` for playback on behalf of `app_id`. Must not block.
    fn speak(&self, app_id: &AppId, text: &str) -> Result<SpeechJob, SpeechError>;
}

/// Synthesizer for devices without audio: logs and completes immediately.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentSynthesizer;

impl SpeechSynthesizer for SilentSynthesizer {
    fn speak(&self, app_id: &AppId, text: &str) -> Result<SpeechJob, SpeechError> {
        let (job, done) = SpeechJob::pending();
        info!(app_id = %app_id, handle = %job.handle, text, "speak");
        let _ = done.send(Ok(()));
        Ok(job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn silent_synthesizer_completes() {
        let job = SilentSynthesizer.speak(&AppId::from("a"), "hello").unwrap();
        assert!(!job.handle.0.is_empty());
        assert_eq!(job.wait().await, Ok(()));
    }

    #[tokio::test]
    async fn dropped_sender_is_failure() {
        let (job, done) = SpeechJob::pending();
        drop(done);
        assert_eq!(job.wait().await, Err(SpeechError::Dropped));
    }
}
