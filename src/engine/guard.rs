//! Export limits and output naming

use crate::error::{ExportError, Result};
use crate::model::OutputFormat;

/// Title used when the track has none
pub const FALLBACK_TITLE: &str = "karaoke_export";

/// Rates closer to 1.0 than this are treated as unchanged tempo
const RATE_EPSILON: f64 = 0.001;

/// Fail if the planned output is longer than the configured ceiling
///
/// Called with the scheduler's total before any rendering starts.
pub fn ensure_within_limit(total_output_secs: f64, max_secs: f64) -> Result<()> {
    if total_output_secs > max_secs {
        return Err(ExportError::DurationExceeded {
            duration_secs: total_output_secs,
            max_secs,
        });
    }
    Ok(())
}

/// Derive the download file name from the track title and tempo
///
/// # Example
/// ```
/// use blockmix::engine::guard::output_file_name;
/// use blockmix::OutputFormat;
///
/// assert_eq!(output_file_name(Some("Song"), 1.2, OutputFormat::Mp3), "Song__BPM120.mp3");
/// assert_eq!(output_file_name(Some("Song"), 1.0, OutputFormat::Wav), "Song.wav");
/// ```
pub fn output_file_name(title: Option<&str>, playback_rate: f64, format: OutputFormat) -> String {
    let title = title
        .map(sanitize)
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| FALLBACK_TITLE.to_string());

    let bpm_suffix = if (playback_rate - 1.0).abs() < RATE_EPSILON {
        String::new()
    } else {
        format!("__BPM{}", (playback_rate * 100.0).round() as i64)
    };

    format!("{}{}.{}", title, bpm_suffix, format.extension())
}

/// Replace characters that are not allowed in file names
fn sanitize(title: &str) -> String {
    title
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(1.0, "Title.mp3" ; "unity rate has no suffix")]
    #[test_case(1.0004, "Title.mp3" ; "negligible deviation has no suffix")]
    #[test_case(1.2, "Title__BPM120.mp3" ; "faster")]
    #[test_case(0.85, "Title__BPM85.mp3" ; "slower")]
    #[test_case(1.5, "Title__BPM150.mp3" ; "one and a half")]
    fn test_bpm_suffix(rate: f64, expected: &str) {
        assert_eq!(output_file_name(Some("Title"), rate, OutputFormat::Mp3), expected);
    }

    #[test]
    fn test_fallback_and_sanitized_titles() {
        assert_eq!(
            output_file_name(None, 1.0, OutputFormat::Mp3),
            "karaoke_export.mp3"
        );
        assert_eq!(
            output_file_name(Some("   "), 1.0, OutputFormat::Wav),
            "karaoke_export.wav"
        );
        assert_eq!(
            output_file_name(Some("AC/DC: Live?"), 1.0, OutputFormat::Mp3),
            "AC_DC_ Live_.mp3"
        );
    }

    #[test]
    fn test_duration_limit() {
        assert!(ensure_within_limit(600.0, 600.0).is_ok());

        let err = ensure_within_limit(650.0, 600.0).unwrap_err();
        assert_eq!(err.error_code(), "DURATION_EXCEEDED");
    }
}
