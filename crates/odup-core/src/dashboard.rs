//! Live dashboard: the task registry plus the renderer and its output.
//!
//! Every registry mutation redraws while still holding the lock, so updates
//! coming from different upload threads reach the screen in a single order.

use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::registry::{Task, TaskRegistry};
use crate::render::{self, ProgressRenderer, RenderCounts};

struct Inner {
    registry: TaskRegistry,
    renderer: ProgressRenderer,
    counts: RenderCounts,
    out: Option<Box<dyn Write + Send>>,
}

pub struct Dashboard {
    inner: Mutex<Inner>,
}

impl Dashboard {
    /// Dashboard that redraws into `out` (usually stdout).
    pub fn new(renderer: ProgressRenderer, out: Box<dyn Write + Send>) -> Self {
        Self::build(renderer, Some(out))
    }

    /// Dashboard that tracks state without drawing anything.
    pub fn headless() -> Self {
        Self::build(ProgressRenderer::new(render::DEFAULT_COLUMNS), None)
    }

    fn build(renderer: ProgressRenderer, out: Option<Box<dyn Write + Send>>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                registry: TaskRegistry::new(),
                renderer,
                counts: RenderCounts::default(),
                out,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panicking writer must not take the whole dashboard down with it.
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Show a file as soon as its upload starts. Keeps the existing task (and
    /// its progress) when the file is being retried.
    pub fn begin_task(&self, file_path: &str, size: u64) {
        let mut inner = self.lock();
        if inner.registry.get(file_path).is_none() {
            inner.registry.upsert(file_path, size, 0.0, 0);
            inner.redraw();
        }
    }

    /// Record acknowledged progress for a file and redraw.
    pub fn report_progress(&self, file_path: &str, size: u64, speed: f64, uploaded: u64) {
        let mut inner = self.lock();
        inner.registry.upsert(file_path, size, speed, uploaded);
        inner.redraw();
    }

    /// Remove a file's task (finished or abandoned) and redraw.
    pub fn finish_task(&self, file_path: &str) -> Option<Task> {
        let mut inner = self.lock();
        let removed = inner.registry.remove(file_path);
        inner.redraw();
        removed
    }

    /// Update the pool counters shown in the header and redraw.
    pub fn set_counts(&self, counts: RenderCounts) {
        let mut inner = self.lock();
        if inner.counts != counts {
            inner.counts = counts;
            inner.redraw();
        }
    }

    /// Like [`set_counts`](Self::set_counts), but `current` is evaluated under
    /// the dashboard lock, so concurrent callers cannot publish a stale value last.
    /// `current` may take other locks; nothing takes the dashboard lock inside them.
    pub fn refresh_counts(&self, current: impl FnOnce() -> RenderCounts) {
        let mut inner = self.lock();
        let counts = current();
        if inner.counts != counts {
            inner.counts = counts;
            inner.redraw();
        }
    }

    /// Terminal was resized: recompute the name column and redraw.
    pub fn resize(&self, columns: u16) {
        let mut inner = self.lock();
        inner.renderer.set_columns(columns);
        tracing::trace!(columns, name_width = inner.renderer.name_width(), "terminal resized");
        inner.redraw();
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.lock().registry.tasks().to_vec()
    }

    pub fn task(&self, file_path: &str) -> Option<Task> {
        self.lock().registry.get(file_path).cloned()
    }

    pub fn counts(&self) -> RenderCounts {
        self.lock().counts
    }

    /// Current frame as text (what the next redraw would print).
    pub fn frame(&self) -> String {
        let inner = self.lock();
        inner.renderer.render(&inner.counts, inner.registry.tasks())
    }
}

impl Inner {
    fn redraw(&mut self) {
        let Some(out) = self.out.as_mut() else {
            return;
        };
        let frame = self.renderer.render(&self.counts, self.registry.tasks());
        if let Err(e) = render::draw_frame(out.as_mut(), &frame) {
            tracing::debug!("dashboard redraw failed: {}", e);
        }
    }
}

/// Follow terminal resizes (SIGWINCH) and keep the dashboard layout in sync.
/// Returns `None` where window-change signals are unavailable.
pub fn spawn_resize_listener(dashboard: Arc<Dashboard>) -> Option<tokio::task::JoinHandle<()>> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut winch = match signal(SignalKind::window_change()) {
            Ok(s) => s,
            Err(e) => {
                tracing::debug!("cannot subscribe to terminal resize: {}", e);
                return None;
            }
        };
        Some(tokio::spawn(async move {
            while winch.recv().await.is_some() {
                dashboard.resize(render::terminal_columns());
            }
        }))
    }
    #[cfg(not(unix))]
    {
        let _ = dashboard;
        None
    }
}
