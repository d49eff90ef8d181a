//! Terminal presentation of session state.
//!
//! The `render_*` functions are pure: they turn state into lines of text and
//! never mutate anything. [`ProgressBars`] mirrors conversion callbacks onto
//! `indicatif` bars.

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use crate::convert::ConversionObserver;
use crate::intake::{FileProgress, FileStatus, SelectedFile};
use crate::logbuf::LogBuffer;
use crate::logging;
use crate::results::{unique_download_names, ConversionResult};

pub fn format_megabytes(bytes: u64) -> String {
    format!("{:.2} MB", bytes as f64 / 1024.0 / 1024.0)
}

pub fn render_file_line(file: &SelectedFile, record: &FileProgress) -> String {
    let status = match record.status {
        FileStatus::Pending => String::new(),
        FileStatus::Converting => format!(" - converting... {}%", record.progress),
        FileStatus::Completed => " ✓ done".to_string(),
        FileStatus::Failed => " ✗ failed".to_string(),
    };
    format!(
        "{} ({}){}",
        record.file_name,
        format_megabytes(file.size()),
        status
    )
}

pub fn render_file_list(files: &[SelectedFile], progress: &[FileProgress]) -> Vec<String> {
    let mut lines = vec![format!("Selected files: {}", files.len())];
    lines.extend(
        files
            .iter()
            .zip(progress)
            .map(|(file, record)| format!("  {}", render_file_line(file, record))),
    );
    lines
}

/// Status line for the file being converted
pub fn render_current(record: Option<&FileProgress>) -> Option<String> {
    let record = record.filter(|r| r.status == FileStatus::Converting)?;
    Some(format!(
        "Converting: {} ({}%)",
        record.file_name, record.progress
    ))
}

pub fn render_results(results: &[ConversionResult]) -> Vec<String> {
    if results.is_empty() {
        return Vec::new();
    }
    let names = unique_download_names(results.iter().map(|r| r.file_name.as_str()));
    let mut lines = vec![format!("Converted: {} file(s)", results.len())];
    for (result, name) in results.iter().zip(names) {
        lines.push(format!(
            "  {} -> {}  original {}, GIF {}",
            result.file_name,
            name,
            format_megabytes(result.original_size),
            format_megabytes(result.output_size.unwrap_or(0))
        ));
    }
    lines
}

pub fn render_log_tail(logs: &LogBuffer, window: usize) -> Vec<String> {
    logs.tail(window).map(str::to_string).collect()
}

pub fn render_summary(progress: &[FileProgress]) -> String {
    let done = progress
        .iter()
        .filter(|p| p.status == FileStatus::Completed)
        .count();
    let failed = progress
        .iter()
        .filter(|p| p.status == FileStatus::Failed)
        .count();
    if failed == 0 {
        format!("{} of {} converted", done, progress.len())
    } else {
        format!(
            "{} of {} converted, {} failed",
            done,
            progress.len(),
            failed
        )
    }
}

/// A status line for the file being converted plus one bar per selected file
///
/// While the bars exist, terminal log output is printed around them.
pub struct ProgressBars {
    _multi: MultiProgress,
    status: ProgressBar,
    bars: Vec<ProgressBar>,
    records: Vec<FileProgress>,
    current: Option<usize>,
}

impl ProgressBars {
    pub fn new(files: &[SelectedFile]) -> Self {
        let multi = MultiProgress::new();
        let status = multi.add(ProgressBar::new_spinner());
        status.set_style(
            ProgressStyle::with_template("{msg}").unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        let style = ProgressStyle::with_template(
            "{prefix:>24} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>3}% {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");

        let bars = files
            .iter()
            .map(|file| {
                let bar = multi.add(ProgressBar::new(100));
                bar.set_style(style.clone());
                bar.set_prefix(file.name().to_string());
                bar.set_message("pending");
                bar
            })
            .collect();
        logging::attach_progress(&multi);
        Self {
            _multi: multi,
            status,
            bars,
            records: files.iter().map(|f| FileProgress::pending(f.name())).collect(),
            current: None,
        }
    }

    /// Text of the status line
    pub fn current_line(&self) -> Option<String> {
        render_current(self.current.and_then(|i| self.records.get(i)))
    }

    fn refresh_status(&self) {
        self.status.set_message(self.current_line().unwrap_or_default());
    }

    /// Stop any bar still drawing
    pub fn finish(&self) {
        self.status.finish_and_clear();
        for bar in &self.bars {
            if !bar.is_finished() {
                bar.abandon();
            }
        }
        logging::detach_progress();
    }
}

impl Drop for ProgressBars {
    fn drop(&mut self) {
        logging::detach_progress();
    }
}

impl ConversionObserver for ProgressBars {
    fn on_status(&mut self, index: usize, status: FileStatus) {
        if let Some(record) = self.records.get_mut(index) {
            if record.transition(status).is_ok() && status == FileStatus::Converting {
                self.current = Some(index);
            }
        }
        self.refresh_status();
        let Some(bar) = self.bars.get(index) else {
            return;
        };
        match status {
            FileStatus::Pending => bar.set_message("pending"),
            FileStatus::Converting => bar.set_message("converting"),
            FileStatus::Completed => {
                bar.set_position(100);
                bar.finish_with_message("done");
            }
            FileStatus::Failed => bar.abandon_with_message("failed"),
        }
    }

    fn on_progress(&mut self, index: usize, percent: u8) {
        if let Some(record) = self.records.get_mut(index) {
            record.advance(percent);
        }
        self.refresh_status();
        if let Some(bar) = self.bars.get(index) {
            bar.set_position(u64::from(percent));
        }
    }
}
