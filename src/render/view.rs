//! Character-grid spectrum view.

use anyhow::{ensure, Result};

/// Maps power values onto a bounded `columns` x `rows` display grid.
///
/// Presentation only: the input is consumed read-only and values outside the
/// configured dB range are clamped, never rejected.
pub struct SpectrumView {
    columns: usize,
    rows: usize,
    min_db: f32,
    max_db: f32,
    marker: char,
}

impl SpectrumView {
    pub fn new(columns: usize, rows: usize, min_db: f32, max_db: f32, marker: char) -> Result<Self> {
        ensure!(columns > 0 && rows > 0, "display grid must be non-empty");
        ensure!(
            max_db > min_db,
            "display range is empty: {} dB .. {} dB",
            min_db,
            max_db
        );
        Ok(Self {
            columns,
            rows,
            min_db,
            max_db,
            marker,
        })
    }

    /// Renders one frame. Bins are binned down to `columns` (per-column
    /// maximum) and levels scale linearly from `min_db` (bottom row) to
    /// `max_db` (top row).
    pub fn render(&self, power: &[f32]) -> String {
        let mut levels: Vec<Option<usize>> = vec![None; self.columns];
        for (i, &value) in power.iter().enumerate() {
            let col = i * self.columns / power.len();
            let frac = (value.clamp(self.min_db, self.max_db) - self.min_db)
                / (self.max_db - self.min_db);
            let level = ((frac * (self.rows - 1) as f32).round() as usize).min(self.rows - 1);
            let cell = &mut levels[col];
            *cell = Some(cell.map_or(level, |prev| prev.max(level)));
        }

        let horizontal = "-".repeat(self.columns);
        let mut out = String::with_capacity((self.columns + 3) * (self.rows + 2));
        out.push('+');
        out.push_str(&horizontal);
        out.push_str("+\n");
        for row in (0..self.rows).rev() {
            out.push('|');
            for level in &levels {
                out.push(if *level == Some(row) { self.marker } else { ' ' });
            }
            out.push_str("|\n");
        }
        out.push('+');
        out.push_str(&horizontal);
        out.push('+');
        out
    }
}
