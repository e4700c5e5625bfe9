//! Text rendering of the upload dashboard.
//!
//! [`ProgressRenderer::render`] is pure (state in, frame out); [`draw_frame`]
//! puts a frame on screen in place of the previous one.

use crossterm::cursor::MoveTo;
use crossterm::terminal::{Clear, ClearType};
use crossterm::QueueableCommand;
use std::io::{self, Write};

use crate::registry::Task;
use crate::size::format_size;

/// Columns taken by everything on a task line except the file name:
/// size (8) + speed (9) + gauge (20) + three separating spaces.
pub const FIXED_COLUMNS: usize = 40;
/// Name column never shrinks below this, even on very narrow terminals.
pub const MIN_NAME_WIDTH: usize = 10;
pub const GAUGE_WIDTH: usize = 20;
const SIZE_WIDTH: usize = 8;
const SPEED_WIDTH: usize = 9;
/// Used when the terminal size cannot be queried (not a tty).
pub const DEFAULT_COLUMNS: u16 = 100;

// "[" + cells + "]" + " " + "100.0%"
const GAUGE_CELLS: usize = GAUGE_WIDTH - 2 - 1 - 6;

/// Pool counters shown above the task table. Zero values are not printed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderCounts {
    pub total: usize,
    pub running: usize,
    pub pending: usize,
}

#[derive(Debug, Clone)]
pub struct ProgressRenderer {
    columns: usize,
    name_width: usize,
}

impl ProgressRenderer {
    pub fn new(columns: u16) -> Self {
        let mut r = Self {
            columns: 0,
            name_width: 0,
        };
        r.set_columns(columns);
        r
    }

    /// Renderer sized to the current terminal.
    pub fn from_terminal() -> Self {
        Self::new(terminal_columns())
    }

    /// Recompute the layout after a terminal resize.
    pub fn set_columns(&mut self, columns: u16) {
        self.columns = usize::from(columns.max(1));
        self.name_width = self
            .columns
            .saturating_sub(FIXED_COLUMNS)
            .max(MIN_NAME_WIDTH);
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn name_width(&self) -> usize {
        self.name_width
    }

    /// Full frame: counters, rule, column header, one line per task.
    pub fn render(&self, counts: &RenderCounts, tasks: &[Task]) -> String {
        let mut out = String::new();
        if counts.total > 0 {
            out.push_str(&format!("Total files: {}\n", counts.total));
        }
        if counts.running > 0 {
            out.push_str(&format!("Uploading:   {}\n", counts.running));
        }
        if counts.pending > 0 {
            out.push_str(&format!("Pending:     {}\n", counts.pending));
        }
        out.push_str(&"-".repeat(self.columns));
        out.push('\n');
        out.push_str(&format!(
            "{:<w$} {:>8} {:>9} {}\n",
            "File",
            "Size",
            "Speed",
            "Progress",
            w = self.name_width
        ));
        for task in tasks {
            out.push_str(&self.task_line(task));
            out.push('\n');
        }
        out
    }

    fn task_line(&self, task: &Task) -> String {
        let speed = format!("{}/s", fit_size(task.speed.max(0.0) as u64, SPEED_WIDTH - 2));
        format!(
            "{} {:>sw$} {:>pw$} {}",
            fit_name(&task.file_path, self.name_width),
            fit_size(task.size, SIZE_WIDTH),
            speed,
            gauge(task.uploaded, task.size),
            sw = SIZE_WIDTH,
            pw = SPEED_WIDTH,
        )
    }
}

/// Query the terminal width, falling back to [`DEFAULT_COLUMNS`].
pub fn terminal_columns() -> u16 {
    crossterm::terminal::size()
        .map(|(cols, _)| cols)
        .unwrap_or(DEFAULT_COLUMNS)
}

/// Percentage with one decimal, rounded down: `floor(uploaded / size * 1000) / 10`.
pub fn percent(uploaded: u64, size: u64) -> f64 {
    if size == 0 {
        return 100.0;
    }
    let permille = u128::from(uploaded.min(size)) * 1000 / u128::from(size);
    permille as f64 / 10.0
}

/// Fixed-width (20 columns) progress gauge, e.g. `[#####......] 45.5%`.
/// Cells fill monotonically and are all filled only at 100%.
pub fn gauge(uploaded: u64, size: u64) -> String {
    let pct = percent(uploaded, size);
    let filled = ((pct * GAUGE_CELLS as f64) / 100.0).floor() as usize;
    let filled = filled.min(GAUGE_CELLS);
    format!(
        "[{}{}] {:>5.1}%",
        "#".repeat(filled),
        ".".repeat(GAUGE_CELLS - filled),
        pct
    )
}

/// [`format_size`] held to `width` characters: the decimal goes first
/// (`1023.5KB` → `1023KB`).
fn fit_size(bytes: u64, width: usize) -> String {
    let text = format_size(bytes);
    if text.len() <= width {
        return text;
    }
    let unit_at = text
        .find(|c: char| c.is_ascii_alphabetic())
        .unwrap_or(text.len());
    let whole = match text.find('.') {
        Some(dot) => format!("{}{}", &text[..dot], &text[unit_at..]),
        None => text,
    };
    whole.chars().take(width).collect()
}

/// Pad or cut `name` to exactly `width` characters. Long names keep their tail
/// (the file name) behind a leading ellipsis.
fn fit_name(name: &str, width: usize) -> String {
    let len = name.chars().count();
    if len <= width {
        return format!("{:<width$}", name, width = width);
    }
    if width == 0 {
        return String::new();
    }
    let tail: String = name.chars().skip(len - (width - 1)).collect();
    format!("…{}", tail)
}

/// Replace the previous frame on screen: cursor to the top-left, clear to the
/// end of the screen, then write `frame`.
pub fn draw_frame<W: Write + ?Sized>(out: &mut W, frame: &str) -> io::Result<()> {
    out.queue(MoveTo(0, 0))?;
    out.queue(Clear(ClearType::FromCursorDown))?;
    out.write_all(frame.as_bytes())?;
    out.flush()
}
