//! In-memory upload primitive for uploader and scheduler tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Condvar, Mutex};

use crate::discover::FileDescriptor;
use crate::session::{ByteRange, UploadError, UploadSession, UploadedItem};

pub(crate) fn descriptor(relative_path: &str, size: u64) -> FileDescriptor {
    FileDescriptor {
        relative_path: relative_path.to_string(),
        absolute_path: PathBuf::from("/media").join(relative_path),
        size,
    }
}

/// Scripted misbehaviour for one `upload` call of a file.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Fault {
    /// Acknowledge this many chunks, then fail like a dropped connection.
    DropAfter(u64),
    /// Fail with a provider error code.
    Provider(&'static str),
    /// The server forgot the session.
    Expire,
}

type Observer = Box<dyn Fn() -> Option<u64> + Send + Sync>;

#[derive(Default)]
struct State {
    next_session: u64,
    acked: HashMap<u64, u64>,
    creates: Vec<String>,
    ranges: HashMap<String, Vec<(u64, u64)>>,
    starts: HashMap<String, Vec<Option<u64>>>,
    faults: HashMap<String, VecDeque<Fault>>,
    gated: HashSet<String>,
    started: Vec<String>,
}

/// Fake drive: sessions remember the acknowledged offset, uploads can be
/// gated (blocked until released) and scripted to fail.
pub(crate) struct FakeDrive {
    chunk: u64,
    state: Mutex<State>,
    released: Condvar,
    observer: Mutex<Option<(Observer, Arc<Mutex<Vec<u64>>>)>>,
}

pub(crate) struct Watcher(Arc<Mutex<Vec<u64>>>);

impl Watcher {
    pub(crate) fn values(&self) -> Vec<u64> {
        self.0.lock().unwrap().clone()
    }
}

impl FakeDrive {
    pub(crate) fn new(chunk: u64) -> Self {
        Self {
            chunk,
            state: Mutex::new(State::default()),
            released: Condvar::new(),
            observer: Mutex::new(None),
        }
    }

    pub(crate) fn inject(&self, file: &str, fault: Fault) {
        let mut st = self.state.lock().unwrap();
        st.faults.entry(file.to_string()).or_default().push_back(fault);
    }

    /// Uploads of `file` block until [`release`](Self::release) is called.
    pub(crate) fn gate(&self, file: &str) {
        self.state.lock().unwrap().gated.insert(file.to_string());
    }

    pub(crate) fn release(&self, file: &str) {
        self.state.lock().unwrap().gated.remove(file);
        self.released.notify_all();
    }

    pub(crate) fn release_all(&self) {
        self.state.lock().unwrap().gated.clear();
        self.released.notify_all();
    }

    /// Remote paths passed to `create`, in call order.
    pub(crate) fn creates(&self) -> Vec<String> {
        self.state.lock().unwrap().creates.clone()
    }

    /// Files whose `upload` was entered (gated or not), in call order, one entry per attempt.
    pub(crate) fn started(&self) -> Vec<String> {
        self.state.lock().unwrap().started.clone()
    }

    /// All acknowledged `(min, max)` ranges reported for `file`.
    pub(crate) fn ranges(&self, file: &str) -> Vec<(u64, u64)> {
        let st = self.state.lock().unwrap();
        st.ranges.get(file).cloned().unwrap_or_default()
    }

    /// First `min` reported by each `upload` call (`None` if it reported nothing).
    pub(crate) fn attempt_starts(&self, file: &str) -> Vec<Option<u64>> {
        let st = self.state.lock().unwrap();
        st.starts.get(file).cloned().unwrap_or_default()
    }

    /// Sample `probe` after every acknowledged chunk.
    pub(crate) fn watch_progress<F>(&self, probe: F) -> Watcher
    where
        F: Fn() -> Option<u64> + Send + Sync + 'static,
    {
        let values = Arc::new(Mutex::new(Vec::new()));
        *self.observer.lock().unwrap() = Some((Box::new(probe), Arc::clone(&values)));
        Watcher(values)
    }

    fn observe(&self) {
        if let Some((probe, values)) = self.observer.lock().unwrap().as_ref() {
            if let Some(v) = probe() {
                values.lock().unwrap().push(v);
            }
        }
    }
}

impl UploadSession for FakeDrive {
    type Session = u64;

    fn create(&self, _file: &FileDescriptor, remote_path: &str) -> Result<u64, UploadError> {
        let mut st = self.state.lock().unwrap();
        st.next_session += 1;
        let id = st.next_session;
        st.acked.insert(id, 0);
        st.creates.push(remote_path.to_string());
        Ok(id)
    }

    fn upload(
        &self,
        session: &u64,
        file: &FileDescriptor,
        on_progress: &mut dyn FnMut(ByteRange),
    ) -> Result<UploadedItem, UploadError> {
        let key = file.relative_path.clone();
        let (fault, mut offset) = {
            let mut st = self.state.lock().unwrap();
            st.started.push(key.clone());
            while st.gated.contains(&key) {
                st = self.released.wait(st).unwrap();
            }
            st.starts.entry(key.clone()).or_default().push(None);
            let fault = st.faults.get_mut(&key).and_then(|q| q.pop_front());
            match fault {
                Some(Fault::Provider(code)) => {
                    return Err(UploadError::Provider {
                        status: 403,
                        code: code.to_string(),
                        message: "scripted".to_string(),
                    });
                }
                Some(Fault::Expire) => {
                    st.acked.remove(session);
                    return Err(UploadError::SessionExpired);
                }
                _ => {}
            }
            let offset = *st.acked.get(session).ok_or(UploadError::SessionExpired)?;
            (fault, offset)
        };

        let mut sent = 0u64;
        while offset < file.size {
            if let Some(Fault::DropAfter(n)) = fault {
                if sent == n {
                    // CURLE_RECV_ERROR
                    return Err(UploadError::Transport(curl::Error::new(56)));
                }
            }
            let end = (offset + self.chunk).min(file.size);
            {
                let mut st = self.state.lock().unwrap();
                st.acked.insert(*session, end);
                st.ranges.entry(key.clone()).or_default().push((offset, end));
                if let Some(first) = st.starts.get_mut(&key).and_then(|v| v.last_mut()) {
                    first.get_or_insert(offset);
                }
            }
            on_progress(ByteRange {
                min: offset,
                max: end,
            });
            self.observe();
            offset = end;
            sent += 1;
        }

        let name = key.rsplit('/').next().unwrap_or(&key).to_string();
        Ok(UploadedItem {
            id: format!("item-{}", session),
            name,
            size: file.size,
            created_date_time: None,
        })
    }
}
