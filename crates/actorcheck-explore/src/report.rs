//! Format exploration reports for human consumption.

use crate::bugs::BugReport;
use crate::explorer::ExplorationReport;

/// Trace lines shown inline before truncating.
const TRACE_PREVIEW_LINES: usize = 10;

/// Format an exploration report for human consumption.
pub fn format_report(report: &ExplorationReport) -> String {
    let mut output = String::new();

    output.push_str("═══════════════════════════════════════════════════════════════════════\n");
    output.push_str("  actorcheck Exploration Report\n");
    output.push_str("═══════════════════════════════════════════════════════════════════════\n\n");

    output.push_str(&format!("Program:                {}\n", report.program));
    output.push_str(&format!("Strategy:               {}\n", report.strategy));
    output.push_str(&format!("Iterations:             {}\n", report.iterations));
    output.push_str(&format!("Scheduling steps:       {}\n", report.total_steps));
    output.push_str(&format!("Stopped because:        {}\n", report.stop_reason));
    output.push_str(&format!(
        "Elapsed:                {:.2}s\n",
        report.elapsed.as_secs_f64()
    ));
    output.push_str(&format!("Bugs discovered:        {}\n", report.bugs.len()));
    output.push('\n');

    output.push_str("─── Coverage Statistics ───────────────────────────────────────────────\n");
    output.push_str(&format!(
        "Total runs:             {}\n",
        report.coverage_stats.total_runs
    ));
    output.push_str(&format!(
        "Event pairs covered:    {}\n",
        report.coverage_stats.total_pairs
    ));
    if report.pattern_matches > 0 {
        output.push_str(&format!(
            "Pattern matched in:     {} iterations\n",
            report.pattern_matches
        ));
    }
    output.push('\n');

    if let Some(feedback) = &report.feedback {
        output.push_str("─── Feedback Statistics ───────────────────────────────────────────────\n");
        output.push_str(&format!(
            "Saved inputs:           {}\n",
            feedback.total_saved_inputs
        ));
        output.push_str(&format!(
            "Current input index:    {}\n",
            feedback.current_input_index
        ));
        output.push_str(&format!(
            "Pattern states covered: {}\n",
            feedback.covered_states.len()
        ));
        if !feedback.last_saved_scheduling.is_empty() {
            output.push_str(&format!(
                "Last saved scheduling:  {}\n",
                feedback.last_saved_scheduling.join(", ")
            ));
        }
        output.push('\n');
    }

    if !report.racing_pairs.is_empty() {
        output.push_str("─── Racing Sends ──────────────────────────────────────────────────────\n");
        for (a, b) in &report.racing_pairs {
            output.push_str(&format!("  {}  ||  {}\n", a, b));
        }
        output.push('\n');
    }

    if !report.bugs.is_empty() {
        output
            .push_str("─── Bugs Found ─────────────────────────────────────────────────────────\n");
        for (i, bug) in report.bugs.iter().enumerate() {
            output.push_str(&format!("\n{}. Bug #{}\n", i + 1, bug.bug_id));
            output.push_str(&format_bug(bug));
            output.push('\n');
        }
    } else {
        output
            .push_str("─── No Bugs Found ──────────────────────────────────────────────────────\n");
        output.push_str("No property violations detected during exploration.\n\n");
    }

    output.push_str("═══════════════════════════════════════════════════════════════════════\n");

    output
}

/// Format a bug report with the start of its reproducing trace.
pub fn format_bug(bug: &BugReport) -> String {
    let mut output = String::new();

    output.push_str(&format!("   Message:      {}\n", bug.message));
    output.push_str(&format!("   Iteration:    {}\n", bug.iteration));
    output.push_str(&format!("   Steps:        {}\n", bug.steps));
    output.push_str(&format!("   Strategy:     {}\n", bug.strategy));

    let lines: Vec<&str> = bug.trace.lines().collect();
    if !lines.is_empty() {
        output.push_str("\n   Trace:\n");
        for line in lines.iter().take(TRACE_PREVIEW_LINES) {
            output.push_str(&format!("     {}\n", line));
        }
        if lines.len() > TRACE_PREVIEW_LINES {
            output.push_str(&format!(
                "     ... and {} more lines\n",
                lines.len() - TRACE_PREVIEW_LINES
            ));
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coverage::CoverageStats;
    use crate::explorer::StopReason;
    use actorcheck_sched::{FeedbackStats, SendSite};
    use std::time::Duration;

    fn make_bug(id: u64, message: &str, trace_len: usize) -> BugReport {
        BugReport {
            bug_id: id,
            iteration: 4,
            message: message.to_string(),
            steps: trace_len,
            strategy: "random".to_string(),
            trace: (0..trace_len).map(|i| format!("({})\n", i % 3)).collect(),
        }
    }

    fn make_report(bugs: Vec<BugReport>) -> ExplorationReport {
        ExplorationReport {
            program: "register-race".to_string(),
            strategy: "random".to_string(),
            iterations: 10,
            total_steps: 210,
            stop_reason: StopReason::IterationsExhausted,
            bugs,
            coverage_stats: CoverageStats {
                total_pairs: 4,
                total_runs: 10,
            },
            racing_pairs: Vec::new(),
            feedback: None,
            pattern_matches: 0,
            iteration_reports: Vec::new(),
            elapsed: Duration::from_millis(1500),
        }
    }

    #[test]
    fn test_format_report_no_bugs() {
        let formatted = format_report(&make_report(Vec::new()));
        assert!(formatted.contains("Iterations:             10"));
        assert!(formatted.contains("Scheduling steps:       210"));
        assert!(formatted.contains("Bugs discovered:        0"));
        assert!(formatted.contains("Elapsed:                1.50s"));
        assert!(formatted.contains("No Bugs Found"));
        assert!(!formatted.contains("Feedback Statistics"));
    }

    #[test]
    fn test_format_report_with_bugs() {
        let report = make_report(vec![
            make_bug(0, "client0 read 201 after writing 104", 3),
            make_bug(1, "client1 read 105 after writing 203", 3),
        ]);
        let formatted = format_report(&report);
        assert!(formatted.contains("Bugs discovered:        2"));
        assert!(formatted.contains("Bug #0"));
        assert!(formatted.contains("Bug #1"));
        assert!(formatted.contains("client1 read 105"));
    }

    #[test]
    fn test_format_report_feedback_and_races() {
        let mut report = make_report(Vec::new());
        report.feedback = Some(FeedbackStats {
            total_saved_inputs: 6,
            current_input_index: 2,
            covered_states: [0, 1, 2].into_iter().collect(),
            last_saved_scheduling: vec!["Write".into(), "Read".into()],
        });
        let site = |sender: &str| SendSite {
            sender: sender.to_string(),
            receiver: "server".to_string(),
            location: 1,
        };
        report.racing_pairs = vec![(site("client0"), site("client1"))];
        report.pattern_matches = 3;

        let formatted = format_report(&report);
        assert!(formatted.contains("Saved inputs:           6"));
        assert!(formatted.contains("Last saved scheduling:  Write, Read"));
        assert!(formatted.contains("client0 -> server @1  ||  client1 -> server @1"));
        assert!(formatted.contains("Pattern matched in:     3 iterations"));
    }

    #[test]
    fn test_format_bug() {
        let formatted = format_bug(&make_bug(42, "boom", 2));
        assert!(formatted.contains("Message:      boom"));
        assert!(formatted.contains("Iteration:    4"));
        assert!(formatted.contains("Trace:"));
        assert!(formatted.contains("     (1)"));
    }

    #[test]
    fn test_format_bug_truncates_long_trace() {
        let formatted = format_bug(&make_bug(1, "boom", 25));
        assert!(formatted.contains("... and 15 more lines"));
    }
}
