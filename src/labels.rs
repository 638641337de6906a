//! TextGrid segmentation: interval parsing and the block plan that drives row
//! emission.
//!
//! Rows are emitted interval by interval. An interval covers the canonical
//! frames from `ceil(start / shift)` through `floor(end / shift)` inclusive,
//! so a frame sitting exactly on a shared boundary belongs to both adjacent
//! intervals and is written twice. That duplication is deliberate; it is how
//! the reference measurement tables count their rows.

use std::collections::BTreeSet;
use std::path::Path;

use textgrid::{TextGrid, TierType};

use crate::error::PipelineError;
use crate::grid::FrameGrid;

/// Guards ceil/floor against timestamps like 766.0000000000001 ms that come
/// out of seconds-to-ms conversion.
const BOUNDARY_EPS: f64 = 1e-6;

/// One labeled span of a segmentation tier, in milliseconds.
#[derive(Debug, Clone, PartialEq)]
pub struct TextGridInterval {
    pub start_ms: f64,
    pub end_ms: f64,
    pub label: String,
}

/// One run of output rows: an interval (or the whole grid) mapped to an
/// inclusive canonical frame range.
#[derive(Debug, Clone, PartialEq)]
pub struct RowBlock {
    pub label: String,
    pub seg_start_ms: f64,
    pub seg_end_ms: f64,
    pub first_frame: usize,
    pub last_frame: usize,
}

/// Read the intervals of one tier from a TextGrid file.
///
/// The `textgrid` crate parses the common long format; files it rejects go
/// through a hand-rolled line parser so short-format and loosely formatted
/// grids still load. `tier` selects an interval tier by name; `None` takes
/// the first interval tier in the file.
pub fn load_intervals(
    path: &Path,
    tier: Option<&str>,
) -> Result<Vec<TextGridInterval>, PipelineError> {
    match load_with_textgrid_crate(path, tier) {
        Ok(intervals) => Ok(intervals),
        Err(crate_err) => {
            tracing::debug!(
                path = %path.display(),
                error = %crate_err,
                "textgrid crate parse failed, trying fallback parser"
            );
            load_with_fallback_parser(path, tier).map_err(|e| PipelineError::textgrid(path, e))
        }
    }
}

fn load_with_textgrid_crate(path: &Path, tier: Option<&str>) -> Result<Vec<TextGridInterval>, String> {
    let grid = TextGrid::from_file(path).map_err(|err| format!("textgrid parse failed: {err}"))?;

    let selected = match tier {
        Some(name) => grid
            .tiers
            .iter()
            .find(|t| t.tier_type == TierType::IntervalTier && t.name == name)
            .ok_or_else(|| format!("no interval tier named '{name}'"))?,
        None => grid
            .tiers
            .iter()
            .find(|t| t.tier_type == TierType::IntervalTier)
            .ok_or_else(|| "no interval tier in file".to_string())?,
    };

    Ok(selected
        .intervals
        .iter()
        .map(|iv| TextGridInterval {
            start_ms: iv.xmin * 1000.0,
            end_ms: iv.xmax * 1000.0,
            label: iv.text.trim().to_string(),
        })
        .collect())
}

fn load_with_fallback_parser(path: &Path, tier: Option<&str>) -> Result<Vec<TextGridInterval>, String> {
    let contents = std::fs::read_to_string(path).map_err(|err| format!("read failed: {err}"))?;

    let mut in_item = false;
    let mut item_is_interval_tier = false;
    let mut item_name_matches = tier.is_none();
    let mut collecting = false;
    let mut done = false;

    let mut cur_xmin: Option<f64> = None;
    let mut cur_xmax: Option<f64> = None;
    let mut intervals = Vec::new();

    for raw_line in contents.lines() {
        let line = raw_line.trim();
        if line.starts_with("item [") {
            if collecting && !intervals.is_empty() {
                // First matching tier wins; later items are other tiers.
                done = true;
            }
            in_item = true;
            item_is_interval_tier = false;
            item_name_matches = tier.is_none();
            collecting = false;
            cur_xmin = None;
            cur_xmax = None;
            continue;
        }
        if done || !in_item {
            continue;
        }

        if let Some(value) = parse_assignment_value(line, "class") {
            item_is_interval_tier = strip_quotes(value).eq_ignore_ascii_case("IntervalTier");
            collecting = item_is_interval_tier && item_name_matches;
            continue;
        }
        if let Some(value) = parse_assignment_value(line, "name") {
            if let Some(wanted) = tier {
                item_name_matches = strip_quotes(value) == wanted;
            }
            collecting = item_is_interval_tier && item_name_matches;
            continue;
        }
        if !collecting {
            continue;
        }

        if let Some(value) = parse_assignment_value(line, "xmin") {
            cur_xmin = Some(parse_seconds(value)?);
            continue;
        }
        if let Some(value) = parse_assignment_value(line, "xmax") {
            cur_xmax = Some(parse_seconds(value)?);
            continue;
        }
        if let Some(value) = parse_assignment_value(line, "text") {
            let label = strip_quotes(value).trim().to_string();
            let (Some(xmin), Some(xmax)) = (cur_xmin, cur_xmax) else {
                return Err("interval text without xmin/xmax".to_string());
            };
            // The first xmin/xmax pair in a tier describes the tier itself;
            // interval entries always restate both before their text.
            intervals.push(TextGridInterval {
                start_ms: xmin * 1000.0,
                end_ms: xmax * 1000.0,
                label,
            });
            cur_xmin = None;
            cur_xmax = None;
        }
    }

    if !intervals.is_empty() {
        return Ok(intervals);
    }
    match tier {
        Some(name) => Err(format!("no interval tier named '{name}'")),
        None => Err("no interval tier in file".to_string()),
    }
}

fn parse_assignment_value<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    let (lhs, rhs) = line.split_once('=')?;
    if lhs.trim() == key {
        Some(rhs.trim())
    } else {
        None
    }
}

fn strip_quotes(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .unwrap_or(value)
}

fn parse_seconds(value: &str) -> Result<f64, String> {
    value
        .trim()
        .parse::<f64>()
        .map_err(|err| format!("bad timestamp '{value}': {err}"))
}

/// Plan the row blocks for a labeled file.
///
/// Intervals are visited in file order. Empty labels are skipped unless
/// `include_empty` is set; labels in `ignore` are always skipped. Surviving
/// intervals map to inclusive frame ranges on the grid; intervals that cover
/// no frame (or lie entirely past the grid) vanish.
pub fn plan_labeled_blocks(
    grid: &FrameGrid,
    intervals: &[TextGridInterval],
    include_empty: bool,
    ignore: &BTreeSet<String>,
) -> Vec<RowBlock> {
    let shift = grid.frame_shift_ms();
    let mut blocks = Vec::new();
    if grid.is_empty() {
        return blocks;
    }
    for iv in intervals {
        if iv.label.is_empty() && !include_empty {
            continue;
        }
        if ignore.contains(&iv.label) {
            continue;
        }
        let first = ((iv.start_ms / shift) - BOUNDARY_EPS).ceil().max(0.0) as usize;
        let last_f = ((iv.end_ms / shift) + BOUNDARY_EPS).floor();
        if last_f < 0.0 {
            continue;
        }
        let last = (last_f as usize).min(grid.len() - 1);
        if first > last {
            continue;
        }
        blocks.push(RowBlock {
            label: iv.label.clone(),
            seg_start_ms: iv.start_ms,
            seg_end_ms: iv.end_ms,
            first_frame: first,
            last_frame: last,
        });
    }
    blocks
}

/// The single unlabeled block covering the whole grid, used when no TextGrid
/// applies. No filtering ever touches it.
pub fn whole_grid_block(grid: &FrameGrid) -> Vec<RowBlock> {
    if grid.is_empty() {
        return Vec::new();
    }
    vec![RowBlock {
        label: String::new(),
        seg_start_ms: 0.0,
        seg_end_ms: grid.time_ms(grid.len() - 1),
        first_frame: 0,
        last_frame: grid.len() - 1,
    }]
}
