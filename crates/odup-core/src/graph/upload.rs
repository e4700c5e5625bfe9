//! OneDrive resumable upload sessions (`createUploadSession` + byte-range PUTs).

use anyhow::Context;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use url::Url;

use super::auth::TokenSource;
use super::http::{self, Method};
use super::parse;
use crate::discover::FileDescriptor;
use crate::retry::UploadError;
use crate::session::{ByteRange, UploadSession, UploadedItem};

/// Handle of a server-side upload session. The URL is pre-authorized and
/// stays valid across retries until the session expires.
#[derive(Debug, Clone)]
pub struct GraphSession {
    pub upload_url: String,
    /// Drive path the session writes to, used to confirm a finished upload.
    pub remote_path: String,
    /// Set before the PUT carrying the last byte goes out. Shared by clones,
    /// so a retry knows the previous attempt may already have finished the file.
    final_chunk_sent: Arc<AtomicBool>,
}

impl GraphSession {
    pub fn new(upload_url: String, remote_path: &str) -> Self {
        Self {
            upload_url,
            remote_path: remote_path.to_string(),
            final_chunk_sent: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn final_chunk_sent(&self) -> bool {
        self.final_chunk_sent.load(Ordering::SeqCst)
    }
}

/// Where a session stands according to its status query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionStatus {
    /// Continue at this byte.
    Expecting(u64),
    /// The server expects nothing more: every byte has been received.
    Complete,
}

/// Outcome of reconnecting to an existing session.
#[derive(Debug)]
enum Resume {
    At(u64),
    Finished(UploadedItem),
}

/// `{base}/users/{user}/drive/root:/{dirs}/{name}` plus an optional `:/{action}`.
/// Every path segment is percent-encoded.
fn drive_path_url(
    base: &Url,
    user_id: &str,
    remote_path: &str,
    action: Option<&str>,
) -> Result<String, UploadError> {
    let parts: Vec<&str> = remote_path.split('/').filter(|p| !p.is_empty()).collect();
    let Some((name, dirs)) = parts.split_last() else {
        return Err(UploadError::Protocol(format!("empty remote path {:?}", remote_path)));
    };
    let mut url = base.clone();
    {
        let mut segs = url
            .path_segments_mut()
            .map_err(|_| UploadError::Protocol(format!("unusable graph base url {}", base)))?;
        segs.pop_if_empty();
        segs.extend(["users", user_id, "drive", "root:"]);
        segs.extend(dirs);
        match action {
            Some(action) => {
                segs.push(&format!("{}:", name));
                segs.push(action);
            }
            None => {
                segs.push(name);
            }
        }
    }
    Ok(url.into())
}

/// `createUploadSession` URL for `remote_path` in the user's drive:
/// `{base}/users/{user}/drive/root:/{remote_path}:/createUploadSession`.
pub fn create_session_url(base: &Url, user_id: &str, remote_path: &str) -> Result<String, UploadError> {
    drive_path_url(base, user_id, remote_path, Some("createUploadSession"))
}

/// Path-addressed driveItem URL: `{base}/users/{user}/drive/root:/{remote_path}`.
pub fn drive_item_url(base: &Url, user_id: &str, remote_path: &str) -> Result<String, UploadError> {
    drive_path_url(base, user_id, remote_path, None)
}

/// Upload primitive backed by Microsoft Graph.
pub struct GraphUploader<T: TokenSource> {
    tokens: Arc<T>,
    graph_base: Url,
    user_id: String,
    chunk_size: u64,
}

impl<T: TokenSource> GraphUploader<T> {
    pub fn new(
        tokens: Arc<T>,
        graph_base_url: &str,
        user_id: &str,
        chunk_size: u64,
    ) -> anyhow::Result<Self> {
        let graph_base = Url::parse(graph_base_url)
            .with_context(|| format!("invalid graph base url {}", graph_base_url))?;
        if graph_base.cannot_be_a_base() {
            anyhow::bail!("invalid graph base url {}", graph_base_url);
        }
        Ok(Self {
            tokens,
            graph_base,
            user_id: user_id.to_string(),
            chunk_size: chunk_size.max(1),
        })
    }

    /// Ask the session where to continue.
    fn session_status(&self, session: &GraphSession, size: u64) -> Result<SessionStatus, UploadError> {
        let resp = http::request(Method::Get, &session.upload_url, &[], &[])?;
        if resp.status == 404 {
            return Err(UploadError::SessionExpired);
        }
        if !resp.is_success() {
            return Err(parse::error_from_response(resp.status, &resp.body));
        }
        Ok(match parse::parse_next_expected(&resp.body)? {
            Some(offset) if offset < size => SessionStatus::Expecting(offset),
            _ => SessionStatus::Complete,
        })
    }

    /// Look up the item a finished session produced. Used when the response to
    /// the last chunk was lost. Anything but a matching item is final: the bytes
    /// are already on the server and uploading them again would duplicate the file.
    fn confirm_item(&self, session: &GraphSession, file: &FileDescriptor) -> Result<UploadedItem, UploadError> {
        let url = drive_item_url(&self.graph_base, &self.user_id, &session.remote_path)?;
        let token = self.tokens.bearer_token()?;
        let headers = [format!("Authorization: Bearer {}", token)];
        let resp = http::request(Method::Get, &url, &headers, &[])?;
        match resp.status {
            200 => {
                let item = parse::parse_item(&resp.body)?;
                if item.size != file.size {
                    return Err(UploadError::Unconfirmed(format!(
                        "{} has {} bytes, expected {}",
                        session.remote_path, item.size, file.size
                    )));
                }
                tracing::info!(file = %file.relative_path, id = %item.id, "confirmed finished upload");
                Ok(item)
            }
            404 => Err(UploadError::Unconfirmed(format!(
                "{} not found after the session completed",
                session.remote_path
            ))),
            status => Err(parse::error_from_response(status, &resp.body)),
        }
    }

    /// Resume point, or the finished item when the server already has every byte.
    fn resume(&self, session: &GraphSession, file: &FileDescriptor) -> Result<Resume, UploadError> {
        match self.session_status(session, file.size) {
            Ok(SessionStatus::Expecting(offset)) => Ok(Resume::At(offset)),
            Ok(SessionStatus::Complete) => self.confirm_item(session, file).map(Resume::Finished),
            // A session that received its last chunk may be gone by now.
            Err(UploadError::SessionExpired) if session.final_chunk_sent() => {
                match self.confirm_item(session, file) {
                    Ok(item) => Ok(Resume::Finished(item)),
                    Err(UploadError::Unconfirmed(reason)) => {
                        tracing::debug!(file = %file.relative_path, %reason, "finished session not confirmed");
                        Err(UploadError::SessionExpired)
                    }
                    Err(e) => Err(e),
                }
            }
            Err(e) => Err(e),
        }
    }
}

impl<T: TokenSource + 'static> UploadSession for GraphUploader<T> {
    type Session = GraphSession;

    fn create(&self, _file: &FileDescriptor, remote_path: &str) -> Result<GraphSession, UploadError> {
        let url = create_session_url(&self.graph_base, &self.user_id, remote_path)?;
        let token = self.tokens.bearer_token()?;
        let body = serde_json::json!({
            "item": { "@microsoft.graph.conflictBehavior": "rename" }
        })
        .to_string();
        let headers = [
            format!("Authorization: Bearer {}", token),
            "Content-Type: application/json".to_string(),
        ];
        let resp = http::request(Method::Post, &url, &headers, body.as_bytes())?;
        if !resp.is_success() {
            return Err(parse::error_from_response(resp.status, &resp.body));
        }
        let upload_url = parse::parse_session(&resp.body)?;
        tracing::debug!(remote = %remote_path, "upload session created");
        Ok(GraphSession::new(upload_url, remote_path))
    }

    fn upload(
        &self,
        session: &GraphSession,
        file: &FileDescriptor,
        on_progress: &mut dyn FnMut(ByteRange),
    ) -> Result<UploadedItem, UploadError> {
        if file.size == 0 {
            return Err(UploadError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "empty files cannot be sent through an upload session",
            )));
        }
        let mut offset = match self.resume(session, file)? {
            Resume::At(offset) => offset,
            Resume::Finished(item) => {
                on_progress(ByteRange {
                    min: file.size,
                    max: file.size,
                });
                return Ok(item);
            }
        };
        if offset > 0 {
            tracing::info!(file = %file.relative_path, offset, "resuming upload session");
        }

        let mut src = File::open(&file.absolute_path)?;
        let mut buf = vec![0u8; self.chunk_size.min(file.size) as usize];

        loop {
            if offset >= file.size {
                // Last chunk was accepted without an item in the response.
                let item = self.confirm_item(session, file)?;
                on_progress(ByteRange {
                    min: file.size,
                    max: file.size,
                });
                return Ok(item);
            }
            let len = self.chunk_size.min(file.size - offset);
            let chunk = &mut buf[..len as usize];
            src.seek(SeekFrom::Start(offset))?;
            src.read_exact(chunk)?;

            if offset + len == file.size {
                session.final_chunk_sent.store(true, Ordering::SeqCst);
            }
            let headers = [format!(
                "Content-Range: bytes {}-{}/{}",
                offset,
                offset + len - 1,
                file.size
            )];
            let resp = http::request(Method::Put, &session.upload_url, &headers, chunk)?;
            match resp.status {
                200 | 201 => {
                    let item = parse::parse_item(&resp.body)?;
                    on_progress(ByteRange {
                        min: offset,
                        max: file.size,
                    });
                    return Ok(item);
                }
                202 => {
                    let next = parse::parse_next_expected(&resp.body)?
                        .unwrap_or(offset + len)
                        .min(file.size);
                    on_progress(ByteRange {
                        min: offset,
                        max: next.max(offset),
                    });
                    tracing::trace!(file = %file.relative_path, next, "chunk accepted");
                    offset = next;
                }
                404 => return Err(UploadError::SessionExpired),
                status => return Err(parse::error_from_response(status, &resp.body)),
            }
        }
    }
}
