//! 📊 progress.rs: "Are we there yet?" every pipeline, every record, until the deadline.
//!
//! 🚀 A progress bar whose message is a borderless comfy table (records/s, processed/total,
//! elapsed, ETA), plus an `info!` checkpoint every `progress_every` records so the run log
//! tells the same story the terminal did.
//!
//! ⚠️ Watching this bar will not make the CRM answer faster. The 429s are not personal.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::NOTHING};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

/// 🔢 "12345" → "12,345". Eyes deserve nice things.
pub(crate) fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().enumerate() {
        if i > 0 && (s.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result
}

/// ⏱️ MM:SS, or HH:MM:SS for the long hauls.
pub(crate) fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}

/// 📊 Tracks records processed against a known total. 5-second sliding window for the rate.
pub(crate) struct ProgressMetrics {
    /// 🏷️ "invoices", "clients", ... shows up in the bar and the checkpoints
    label: String,
    total: u64,
    processed: u64,
    /// 🔔 checkpoint cadence; 0 turns checkpoints off
    every: u64,
    progress_bar: ProgressBar,
    /// 🔄 (timestamp, processed) samples, oldest in front
    rate_samples: VecDeque<(Instant, u64)>,
    start_time: Instant,
}

impl std::fmt::Debug for ProgressMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // -- 🎭 ProgressBar doesn't derive Debug, and nobody wants it in a log line anyway
        f.debug_struct("ProgressMetrics")
            .field("label", &self.label)
            .field("total", &self.total)
            .field("processed", &self.processed)
            .field("every", &self.every)
            .finish()
    }
}

impl ProgressMetrics {
    pub(crate) fn new(label: impl Into<String>, total: u64, every: usize) -> Self {
        let progress_bar = ProgressBar::new(total);
        let style = ProgressStyle::default_bar()
            .template("{msg}\n| [{bar:40.cyan/blue}]")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-");
        progress_bar.set_style(style);

        let start_time = Instant::now();
        let mut rate_samples = VecDeque::new();
        rate_samples.push_back((start_time, 0u64));

        Self {
            label: label.into(),
            total,
            processed: 0,
            every: every as u64,
            progress_bar,
            rate_samples,
            start_time,
        }
    }

    /// 🔄 One more record through the door, whatever its outcome.
    pub(crate) fn record(&mut self) {
        self.processed += 1;
        let rate = self.calculate_rate();
        self.render(rate);
        self.progress_bar.set_position(self.processed);

        if self.every > 0 && self.processed % self.every == 0 {
            info!(
                "📊 [{}] {}/{} ({:.1}%) | {:.1}/s | ETA {}",
                self.label,
                format_number(self.processed),
                format_number(self.total),
                self.percent(),
                self.overall_rate(),
                self.eta().map(format_duration).unwrap_or_else(|| "--:--".into())
            );
        }
    }

    #[cfg(test)]
    pub(crate) fn processed(&self) -> u64 {
        self.processed
    }

    pub(crate) fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// ✅ Leave the last frame on screen.
    pub(crate) fn finish(&self) {
        self.progress_bar.finish();
    }

    fn percent(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.processed as f64 / self.total as f64) * 100.0
    }

    fn overall_rate(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.processed as f64 / elapsed
        } else {
            0.0
        }
    }

    /// 🔮 Linear extrapolation from the whole run so far. `None` until there's something to extrapolate.
    fn eta(&self) -> Option<Duration> {
        let rate = self.overall_rate();
        if rate <= 0.0 || self.processed >= self.total {
            return None;
        }
        let remaining = (self.total - self.processed) as f64 / rate;
        Some(Duration::from_secs_f64(remaining))
    }

    fn calculate_rate(&mut self) -> f64 {
        let now = Instant::now();
        let window = Duration::from_secs(5);
        while let Some(&(timestamp, _)) = self.rate_samples.front() {
            if now.duration_since(timestamp) > window {
                self.rate_samples.pop_front();
            } else {
                break;
            }
        }
        self.rate_samples.push_back((now, self.processed));

        if let Some(&(oldest_time, oldest_processed)) = self.rate_samples.front() {
            let elapsed = now.duration_since(oldest_time).as_secs_f64();
            if elapsed > 0.0 {
                return self.processed.saturating_sub(oldest_processed) as f64 / elapsed;
            }
        }
        0.0
    }

    /// 🎨 Layout:
    /// ```text
    /// <label>
    ///   <records/s>   <processed / total>
    ///   <elapsed>     <remaining>
    /// | [=====>----------]
    /// ```
    fn render(&self, rate: f64) {
        let remaining = self
            .eta()
            .map(format_duration)
            .unwrap_or_else(|| "--:--".to_string());

        let mut table = Table::new();
        table.load_preset(NOTHING);
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.add_row(vec![
            Cell::new(format!("{} records/s", format_number(rate as u64)))
                .set_alignment(CellAlignment::Right),
            Cell::new(format!(
                "{} / {} ({:.1}%)",
                format_number(self.processed),
                format_number(self.total),
                self.percent()
            ))
            .set_alignment(CellAlignment::Right),
        ]);
        table.add_row(vec![
            Cell::new(format!("{} elapsed", format_duration(self.elapsed())))
                .set_alignment(CellAlignment::Right),
            Cell::new(format!("{} remaining", remaining)).set_alignment(CellAlignment::Right),
        ]);

        self.progress_bar
            .set_message(format!("{}\n{}", self.label, table));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_big_numbers_get_their_commas() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1_000), "1,000");
        assert_eq!(format_number(48_213_007), "48,213,007");
    }

    #[test]
    fn the_one_where_durations_grow_an_hour_column_only_when_needed() {
        assert_eq!(format_duration(Duration::from_secs(75)), "01:15");
        assert_eq!(format_duration(Duration::from_secs(3_725)), "01:02:05");
    }

    #[test]
    fn the_one_where_every_record_is_counted_and_the_eta_runs_out() {
        let mut metrics = ProgressMetrics::new("invoices", 3, 2);
        for _ in 0..3 {
            metrics.record();
        }
        metrics.finish();
        assert_eq!(metrics.processed(), 3);
        assert_eq!(metrics.eta(), None);
        assert!((metrics.percent() - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn the_one_where_an_empty_run_does_not_divide_by_zero() {
        let metrics = ProgressMetrics::new("pppoe", 0, 500);
        assert_eq!(metrics.percent(), 0.0);
        assert_eq!(metrics.eta(), None);
    }
}
