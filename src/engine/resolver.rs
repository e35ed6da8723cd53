//! Block time resolution
//!
//! Maps selected lyric blocks onto source-time segments using the marker
//! timeline. A block that cannot be placed is skipped and reported; it never
//! aborts the export on its own.

use log::{debug, warn};

use crate::error::ExportError;
use crate::model::{Block, Marker, Segment};

/// Outcome of resolving a block selection
#[derive(Debug, Default)]
pub struct Resolution {
    /// Segments in the caller's selection order
    pub segments: Vec<Segment>,
    /// One `UnresolvedSegment` per skipped block
    pub skipped: Vec<ExportError>,
}

impl Resolution {
    /// Total source duration of all resolved segments
    pub fn total_source_secs(&self) -> f64 {
        self.segments.iter().map(Segment::duration).sum()
    }

    /// Human-readable warnings for the skipped blocks
    pub fn warnings(&self) -> Vec<String> {
        self.skipped.iter().map(|e| e.to_string()).collect()
    }
}

/// Resolve the selected blocks into source-time segments
///
/// Output order follows `block_ids`, not song position.
///
/// # Arguments
/// * `block_ids` - Selected block ids in playback order
/// * `blocks` - All blocks of the track
/// * `markers` - The track's markers (sorted by time before use)
/// * `track_duration` - Full track length, used when a block runs to the end
pub fn resolve(
    block_ids: &[String],
    blocks: &[Block],
    markers: &[Marker],
    track_duration: f64,
) -> Resolution {
    let mut timeline: Vec<&Marker> = markers.iter().collect();
    timeline.sort_by(|a, b| a.time.total_cmp(&b.time));

    let mut resolution = Resolution::default();

    for block_id in block_ids {
        let Some(block) = blocks.iter().find(|b| &b.id == block_id) else {
            warn!("Selected block '{}' does not exist, skipping", block_id);
            resolution.skipped.push(unresolved(block_id, "no such block"));
            continue;
        };

        match resolve_block(block, &timeline, track_duration) {
            Ok(segment) => {
                debug!(
                    "Block '{}' -> [{:.3}s, {:.3}s)",
                    block.id, segment.start, segment.end
                );
                resolution.segments.push(segment);
            }
            Err(err) => {
                warn!("{}, skipping", err);
                resolution.skipped.push(err);
            }
        }
    }

    resolution
}

/// Resolve one block against a time-sorted marker timeline
fn resolve_block(
    block: &Block,
    timeline: &[&Marker],
    track_duration: f64,
) -> Result<Segment, ExportError> {
    let (first_line, last_line) = block
        .line_range()
        .ok_or_else(|| unresolved(&block.id, "block has no lines"))?;

    let start = match timeline.iter().find(|m| m.line_index == first_line) {
        Some(marker) => marker.time,
        None => {
            let nearest = timeline
                .iter()
                .find(|m| m.line_index >= first_line)
                .ok_or_else(|| {
                    unresolved(&block.id, format!("no marker at or after line {}", first_line))
                })?;
            warn!(
                "No marker on line {} for block '{}', using line {} at {:.2}s",
                first_line, block.id, nearest.line_index, nearest.time
            );
            nearest.time
        }
    };

    let end = match timeline.iter().find(|m| m.line_index > last_line) {
        Some(marker) => marker.time,
        None if track_duration > 0.0 => {
            warn!(
                "No marker after line {} for block '{}', running to track end {:.2}s",
                last_line, block.id, track_duration
            );
            track_duration
        }
        None => {
            return Err(unresolved(
                &block.id,
                format!("no marker after line {} and track duration unknown", last_line),
            ))
        }
    };

    if end <= start {
        return Err(unresolved(
            &block.id,
            format!("empty time range [{:.3}s, {:.3}s]", start, end),
        ));
    }

    Ok(Segment {
        start,
        end,
        block_id: block.id.clone(),
        label: block.name.clone(),
    })
}

fn unresolved(block_id: &str, reason: impl Into<String>) -> ExportError {
    ExportError::UnresolvedSegment {
        block_id: block_id.to_string(),
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BlockType;
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;

    fn markers() -> Vec<Marker> {
        vec![
            Marker::new("m0", 0, 10.0),
            Marker::new("m1", 1, 14.0),
            Marker::new("m2", 2, 25.0),
            Marker::new("m3", 3, 31.0),
            Marker::new("m4", 4, 40.0),
        ]
    }

    fn blocks() -> Vec<Block> {
        vec![
            Block::new("verse", "Verse 1", [0, 1], BlockType::Verse),
            Block::new("chorus", "Chorus", [2, 3], BlockType::Chorus),
            Block::new("outro", "Outro", [4], BlockType::Outro),
        ]
    }

    fn ids(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_resolves_adjacent_blocks() {
        let res = resolve(&ids(&["verse", "chorus"]), &blocks(), &markers(), 180.0);

        assert!(res.skipped.is_empty());
        assert_eq!(res.segments.len(), 2);
        assert_eq!((res.segments[0].start, res.segments[0].end), (10.0, 25.0));
        assert_eq!((res.segments[1].start, res.segments[1].end), (25.0, 40.0));
        assert_eq!(res.segments[1].label, "Chorus");
        assert_relative_eq!(res.total_source_secs(), 30.0);
    }

    #[test]
    fn test_preserves_selection_order() {
        let res = resolve(&ids(&["chorus", "verse"]), &blocks(), &markers(), 180.0);

        let order: Vec<&str> = res.segments.iter().map(|s| s.block_id.as_str()).collect();
        assert_eq!(order, vec!["chorus", "verse"]);
    }

    #[test]
    fn test_last_block_runs_to_track_end() {
        let res = resolve(&ids(&["outro"]), &blocks(), &markers(), 180.0);

        assert_eq!(res.segments[0].start, 40.0);
        assert_eq!(res.segments[0].end, 180.0);
    }

    #[test]
    fn test_last_block_without_duration_is_skipped() {
        let res = resolve(&ids(&["outro", "verse"]), &blocks(), &markers(), 0.0);

        assert_eq!(res.segments.len(), 1);
        assert_eq!(res.skipped.len(), 1);
        assert!(matches!(
            &res.skipped[0],
            ExportError::UnresolvedSegment { block_id, .. } if block_id == "outro"
        ));
    }

    #[test]
    fn test_missing_start_marker_uses_nearest_following() {
        let mut markers = markers();
        markers.retain(|m| m.line_index != 2);

        let res = resolve(&ids(&["chorus"]), &blocks(), &markers, 180.0);
        // Line 2 has no marker, so the block starts at line 3's marker
        assert_eq!(res.segments[0].start, 31.0);
        assert_eq!(res.segments[0].end, 40.0);
    }

    #[test]
    fn test_unsorted_markers_are_sorted_by_time() {
        let mut markers = markers();
        markers.reverse();

        let res = resolve(&ids(&["verse"]), &blocks(), &markers, 180.0);
        assert_eq!((res.segments[0].start, res.segments[0].end), (10.0, 25.0));
    }

    #[test]
    fn test_block_without_markers_is_skipped() {
        let mut blocks = blocks();
        blocks.push(Block::new("bridge", "Bridge", [9, 10], BlockType::Bridge));

        let res = resolve(&ids(&["bridge", "verse"]), &blocks, &markers(), 180.0);

        assert_eq!(res.segments.len(), 1);
        assert_eq!(res.segments[0].block_id, "verse");
        assert_eq!(res.warnings().len(), 1);
    }

    #[test]
    fn test_unknown_and_empty_blocks_are_skipped() {
        let mut blocks = blocks();
        blocks.push(Block::new("empty", "Empty", [], BlockType::Blank));

        let res = resolve(&ids(&["ghost", "empty"]), &blocks, &markers(), 180.0);

        assert!(res.segments.is_empty());
        assert_eq!(res.skipped.len(), 2);
    }

    #[test]
    fn test_zero_length_range_is_dropped() {
        // Two markers at the same instant produce an empty range
        let markers = vec![Marker::new("a", 0, 12.0), Marker::new("b", 1, 12.0)];
        let blocks = vec![Block::new("x", "X", [0], BlockType::Verse)];

        let res = resolve(&ids(&["x"]), &blocks, &markers, 60.0);
        assert!(res.segments.is_empty());
        assert_eq!(res.skipped.len(), 1);
    }
}
