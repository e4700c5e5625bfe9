//! In-memory table of in-flight uploads, in registration order.
//!
//! Not synchronized on its own; the [`Dashboard`](crate::dashboard::Dashboard)
//! keeps it behind the same lock that serializes redraws.

/// Live progress record for one in-flight upload.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    /// Unique key (the file's path relative to the input root).
    pub file_path: String,
    /// Total bytes of the file.
    pub size: u64,
    /// Instantaneous speed in bytes per second.
    pub speed: f64,
    /// Bytes acknowledged by the remote. Always `<= size`.
    pub uploaded: u64,
}

impl Task {
    /// Fraction complete in [0.0, 1.0].
    pub fn fraction(&self) -> f64 {
        if self.size == 0 {
            return 1.0;
        }
        (self.uploaded as f64 / self.size as f64).min(1.0)
    }
}

#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: Vec<Task>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or update the task for `file_path`.
    ///
    /// `uploaded` is clamped to `size` and never moves backwards for an
    /// existing task, so late or duplicate acknowledgements are harmless.
    pub fn upsert(&mut self, file_path: &str, size: u64, speed: f64, uploaded: u64) -> &Task {
        let uploaded = uploaded.min(size);
        let pos = match self.tasks.iter().position(|t| t.file_path == file_path) {
            Some(pos) => {
                let task = &mut self.tasks[pos];
                task.size = size;
                task.speed = speed;
                task.uploaded = task.uploaded.max(uploaded);
                pos
            }
            None => {
                self.tasks.push(Task {
                    file_path: file_path.to_string(),
                    size,
                    speed,
                    uploaded,
                });
                self.tasks.len() - 1
            }
        };
        &self.tasks[pos]
    }

    /// Drop the task (upload finished or abandoned). Order of the rest is kept.
    pub fn remove(&mut self, file_path: &str) -> Option<Task> {
        let pos = self.tasks.iter().position(|t| t.file_path == file_path)?;
        Some(self.tasks.remove(pos))
    }

    pub fn get(&self, file_path: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.file_path == file_path)
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
