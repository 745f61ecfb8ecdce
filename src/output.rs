//! CLI output formatting.
//!
//! Every formatter here is a pure function returning display lines, so the
//! exact output is unit-tested without capturing stdout. The binary prints
//! the lines; nothing in the library writes to stdout directly.
//!
//! # Output Format
//!
//! ## Run
//!
//! One line per cell as it finishes, in completion order:
//!
//! ```text
//! 17_4  LC08_L2SP_123032_20240501 (score 0)
//! 18_4  skipped: No viable scene among 3 candidates
//! 19_4  done earlier
//! ```
//!
//! Then the summary:
//!
//! ```text
//! Cells: 3 (1 produced, 1 resumed, 1 skipped)
//! Mosaic: /work/MERGE_COG.tif
//! ```
//!
//! ## Progress
//!
//! ```text
//! 50.0% complete
//! ```

use crate::mosaic::{CellEvent, CellStatus, JobSummary, MosaicOutcome};

/// Format a finished-cell event as one display line.
pub fn format_cell_event(event: &CellEvent) -> String {
    let cell = event.cell.to_string();
    match &event.status {
        CellStatus::Produced { scene_id, score } => {
            format!("{cell:<6}{scene_id} (score {})", format_score(*score))
        }
        CellStatus::Skipped { reason } => format!("{cell:<6}skipped: {reason}"),
        CellStatus::Resumed => format!("{cell:<6}done earlier"),
    }
}

/// Scores print without trailing zeros: `0`, `12`, `2.5`, `33.3333`.
fn format_score(score: f64) -> String {
    if score.fract() == 0.0 {
        format!("{score:.0}")
    } else {
        let s = format!("{score:.4}");
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

/// Format the end-of-job summary.
pub fn format_summary(summary: &JobSummary) -> Vec<String> {
    let mut lines = vec![format!(
        "Cells: {} ({} produced, {} resumed, {} skipped)",
        summary.total, summary.produced, summary.resumed, summary.skipped
    )];
    lines.push(match &summary.mosaic {
        MosaicOutcome::Written(path) => format!("Mosaic: {}", path.display()),
        MosaicOutcome::NoTiles => "Mosaic: not written (no tiles produced)".to_string(),
        MosaicOutcome::Failed { detail } => format!("Mosaic: FAILED ({detail})"),
    });
    lines
}

/// Print the summary to stdout.
pub fn print_summary(summary: &JobSummary) {
    for line in format_summary(summary) {
        println!("{}", line);
    }
}

/// Format a progress fraction as a percentage line.
pub fn format_progress(fraction: f64) -> String {
    format!("{:.1}% complete", fraction * 100.0)
}
