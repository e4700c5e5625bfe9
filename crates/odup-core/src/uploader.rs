//! One file's upload lifecycle: session, progress accounting, retry and resume.

use std::sync::Arc;
use std::time::Instant;

use crate::dashboard::Dashboard;
use crate::discover::FileDescriptor;
use crate::retry::{classify, ErrorKind, RetryDecision, RetryPolicy, UploadError};
use crate::session::{ByteRange, UploadSession, UploadedItem};

/// Terminal result of [`RetryingUploader::upload_with_retry`].
#[derive(Debug)]
pub enum UploadOutcome {
    Completed(UploadedItem),
    /// Gave up on the file (permanent error, or attempts exhausted).
    Abandoned(UploadError),
}

/// Instantaneous speed from consecutive acknowledgements of one file.
#[derive(Debug, Clone, Copy)]
pub struct SpeedMeter {
    last: Instant,
    speed: f64,
}

impl SpeedMeter {
    pub fn new(start: Instant) -> Self {
        Self {
            last: start,
            speed: 0.0,
        }
    }

    /// Bytes per second for `range`, measured since the previous observation.
    /// A zero interval keeps the previous value.
    pub fn observe(&mut self, range: ByteRange, now: Instant) -> f64 {
        let elapsed = now.saturating_duration_since(self.last).as_secs_f64();
        self.last = now;
        if elapsed > 0.0 {
            self.speed = range.len() as f64 / elapsed;
        }
        self.speed
    }
}

/// Uploads single files through an [`UploadSession`], retrying transient
/// failures against the same session so that retries resume.
pub struct RetryingUploader<S: UploadSession> {
    primitive: Arc<S>,
    dashboard: Arc<Dashboard>,
    policy: RetryPolicy,
    destination: String,
}

impl<S: UploadSession> RetryingUploader<S> {
    pub fn new(
        primitive: Arc<S>,
        dashboard: Arc<Dashboard>,
        policy: RetryPolicy,
        destination: &str,
    ) -> Self {
        Self {
            primitive,
            dashboard,
            policy,
            destination: destination.trim_matches('/').to_string(),
        }
    }

    pub fn dashboard(&self) -> &Arc<Dashboard> {
        &self.dashboard
    }

    /// Remote path of `file` under the destination directory.
    pub fn remote_path(&self, file: &FileDescriptor) -> String {
        if self.destination.is_empty() {
            file.relative_path.clone()
        } else {
            format!("{}/{}", self.destination, file.relative_path)
        }
    }

    /// Upload `file` until it succeeds or fails permanently.
    ///
    /// The session handle is kept across attempts; only a lost session is
    /// replaced. The file's task leaves the registry on either outcome.
    pub async fn upload_with_retry(&self, file: &FileDescriptor) -> UploadOutcome {
        let mut session: Option<S::Session> = None;
        let mut attempt = 1u32;
        loop {
            match self.attempt(file, &mut session).await {
                Ok(item) => {
                    self.dashboard.finish_task(&file.relative_path);
                    tracing::info!(
                        file = %file.relative_path,
                        id = %item.id,
                        name = %item.name,
                        size = item.size,
                        attempts = attempt,
                        "upload complete"
                    );
                    return UploadOutcome::Completed(item);
                }
                Err(e) => {
                    let kind = classify(&e);
                    if kind == ErrorKind::SessionLost {
                        session = None;
                    }
                    match self.policy.decide(attempt, kind) {
                        RetryDecision::NoRetry => {
                            tracing::error!(
                                file = %file.relative_path,
                                attempt,
                                code = e.provider_code().unwrap_or("-"),
                                "upload abandoned: {}",
                                e
                            );
                            self.dashboard.finish_task(&file.relative_path);
                            return UploadOutcome::Abandoned(e);
                        }
                        RetryDecision::RetryAfter(delay) => {
                            tracing::warn!(
                                file = %file.relative_path,
                                attempt,
                                delay_ms = delay.as_millis() as u64,
                                resume = session.is_some(),
                                "upload failed, retrying: {}",
                                e
                            );
                            tokio::time::sleep(delay).await;
                            attempt += 1;
                        }
                    }
                }
            }
        }
    }

    /// One attempt: create the session if needed, then push the remaining bytes
    /// in a blocking task. The (possibly new) session is written back even on failure.
    async fn attempt(
        &self,
        file: &FileDescriptor,
        session: &mut Option<S::Session>,
    ) -> Result<UploadedItem, UploadError> {
        self.dashboard.begin_task(&file.relative_path, file.size);

        let primitive = Arc::clone(&self.primitive);
        let dashboard = Arc::clone(&self.dashboard);
        let file = file.clone();
        let remote_path = self.remote_path(&file);
        let existing = session.clone();

        let joined = tokio::task::spawn_blocking(move || {
            let handle = match existing {
                Some(h) => h,
                None => {
                    tracing::debug!(file = %file.relative_path, remote = %remote_path, "creating upload session");
                    match primitive.create(&file, &remote_path) {
                        Ok(h) => h,
                        Err(e) => return (None, Err(e)),
                    }
                }
            };
            let mut meter = SpeedMeter::new(Instant::now());
            let result = primitive.upload(&handle, &file, &mut |range: ByteRange| {
                let speed = meter.observe(range, Instant::now());
                dashboard.report_progress(&file.relative_path, file.size, speed, range.max);
            });
            (Some(handle), result)
        })
        .await;

        match joined {
            Ok((handle, result)) => {
                if handle.is_some() {
                    *session = handle;
                }
                result
            }
            Err(e) => Err(UploadError::Aborted(e.to_string())),
        }
    }
}
