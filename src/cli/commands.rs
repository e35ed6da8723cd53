//! CLI Command Implementations
//!
//! Implements the actual logic for each CLI command.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::Serialize;

use super::SelectionArgs;
use crate::config::ExportConfig;
use crate::engine::buffer::db_to_linear;
use crate::exporter::{BlockExporter, ExportRequest, ExportedAudio};
use crate::model::OutputFormat;
use crate::session::StaticSession;

/// Gain overrides given on the command line, in dB
#[derive(Debug, Clone, Copy, Default)]
pub struct GainOverrides {
    pub instrumental_db: Option<f32>,
    pub vocals_db: Option<f32>,
}

/// Written by `export --report`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExportReport<'a> {
    exported_at: DateTime<Utc>,
    output_path: &'a Path,
    size_bytes: usize,
    #[serde(flatten)]
    export: &'a ExportedAudio,
}

/// Load the session and config named by the selection and build an exporter
fn open_exporter(selection: &SelectionArgs, gains: GainOverrides) -> Result<BlockExporter> {
    let mut session = StaticSession::from_json_file(&selection.session)
        .with_context(|| format!("Failed to load session {}", selection.session.display()))?;
    if let Some(base) = selection.session.parent() {
        session.rebase_stems(base);
    }

    if let Some(rate) = selection.rate {
        session.mix.playback_rate = rate;
    }
    if let Some(db) = gains.instrumental_db {
        session.mix.instrumental_gain = db_to_linear(db);
    }
    if let Some(db) = gains.vocals_db {
        session.mix.vocals_gain = db_to_linear(db);
    }

    let config = match &selection.config {
        Some(path) => ExportConfig::from_json_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => ExportConfig::default(),
    };

    Ok(BlockExporter::for_session(Arc::new(session), config)?)
}

/// Print the source range of each selected block.
pub fn resolve(selection: &SelectionArgs) -> Result<()> {
    let exporter = open_exporter(selection, GainOverrides::default())?;
    let resolution = exporter.resolve(&selection.blocks);

    println!("Resolved Segments:");
    println!("{:-<60}", "");
    for segment in &resolution.segments {
        println!(
            "  {:<16} {:>9.3}s - {:>9.3}s  ({:.3}s)  {}",
            segment.block_id,
            segment.start,
            segment.end,
            segment.duration(),
            segment.label
        );
    }
    for skipped in &resolution.skipped {
        println!("  skipped: {}", skipped);
    }
    println!("{:-<60}", "");
    println!("Total source: {:.3}s", resolution.total_source_secs());

    Ok(())
}

/// Print the output timeline for the selection.
pub fn plan(selection: &SelectionArgs, format: OutputFormat) -> Result<()> {
    let exporter = open_exporter(selection, GainOverrides::default())?;
    let preview = exporter.preview(&selection.blocks, format)?;

    println!("Export Plan (rate {:.3}):", preview.playback_rate);
    println!("{:-<60}", "");
    for entry in &preview.entries {
        println!(
            "  {:>9.3}s +{:>8.3}s  {:<16} src {:.3}s - {:.3}s",
            entry.output_start,
            entry.output_duration,
            entry.block_id,
            entry.source_start,
            entry.source_end
        );
    }
    println!("{:-<60}", "");
    println!(
        "Output: {} ({:.3}s of max {:.0}s)",
        preview.filename,
        preview.total_output_secs,
        exporter.config().max_duration_secs
    );
    for warning in &preview.warnings {
        println!("Warning: {}", warning);
    }

    Ok(())
}

/// Render, encode and write the selection.
pub fn export(
    selection: &SelectionArgs,
    output: &Path,
    format: OutputFormat,
    bitrate: Option<u32>,
    gains: GainOverrides,
    report: Option<&Path>,
) -> Result<()> {
    let exporter = open_exporter(selection, gains)?;

    let mut request = ExportRequest::new(selection.blocks.iter().cloned(), format);
    request.bitrate_kbps = bitrate;

    let mut last_percent = 0;
    let exported = exporter.export_with_progress(&request, |progress| {
        let percent = (progress.fraction() * 100.0) as u32;
        if percent >= last_percent + 10 {
            info!("Encoding: {}%", percent);
            last_percent = percent;
        }
    })?;

    let path = output_path(output, &exported.filename);
    std::fs::write(&path, &exported.bytes)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    for warning in &exported.warnings {
        warn!("{}", warning);
    }
    println!("Exported: {}", path.display());
    println!(
        "  {}, {:.2}s, {} Hz, {} ch, {} bytes",
        exported.mime_type(),
        exported.duration_secs,
        exported.sample_rate,
        exported.channels,
        exported.size_bytes()
    );
    println!("  sha256 {}", exported.sha256);

    if let Some(report_path) = report {
        let report = ExportReport {
            exported_at: Utc::now(),
            output_path: &path,
            size_bytes: exported.size_bytes(),
            export: &exported,
        };
        std::fs::write(report_path, serde_json::to_string_pretty(&report)?)
            .with_context(|| format!("Failed to write report {}", report_path.display()))?;
        println!("Report: {}", report_path.display());
    }

    Ok(())
}

/// Use `output` as the file path, or join the generated name onto a directory
fn output_path(output: &Path, filename: &str) -> PathBuf {
    if output.is_dir() {
        output.join(filename)
    } else {
        output.to_path_buf()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_path_uses_directory() {
        let dir = tempfile::tempdir().unwrap();

        assert_eq!(
            output_path(dir.path(), "Song__BPM120.mp3"),
            dir.path().join("Song__BPM120.mp3")
        );
        let file = dir.path().join("custom.mp3");
        assert_eq!(output_path(&file, "ignored.mp3"), file);
    }
}
