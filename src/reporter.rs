use crate::tracker::RunSummary;

/// Emit the run summary as a single JSON line to stdout.
pub fn report_summary(summary: &RunSummary) {
    if let Ok(json) = serde_json::to_string(summary) {
        println!("{json}");
    }
}
