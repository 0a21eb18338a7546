//! CLI output formatting.
//!
//! # Output Format
//!
//! ## Build
//!
//! ```text
//! club: 4 nodes (1 written, 3 unchanged), 2 removed in 0.04s
//! chess: FAILED with 1 error in 0.01s
//!     Building post: rendering posts/2024/05/01/open-day: broken template
//!
//! Jobs: 2 dispatched, 0 coalesced, 1 succeeded, 1 failed, 0 abandoned
//! ```
//!
//! ## Plan
//!
//! ```text
//! club: 2 entries to delete under public/club
//!     old/
//!     stale.html
//! ```
//!
//! # Architecture
//!
//! Each report has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::builder::BuildReport;
use crate::reconcile::Plan;
use crate::scheduler::SchedulerStats;
use std::path::Path;
use std::time::Duration;

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn format_duration(d: Duration) -> String {
    format!("{:.2}s", d.as_secs_f64())
}

fn plural(n: usize, word: &str) -> String {
    if n == 1 {
        format!("{n} {word}")
    } else {
        format!("{n} {word}s")
    }
}

/// Indented `step: error` lines for every recorded error.
fn error_lines(report: &BuildReport) -> Vec<String> {
    report
        .errors
        .steps()
        .flat_map(|(step, errors)| {
            errors
                .iter()
                .map(move |e| format!("{}{step}: {e}", indent(1)))
        })
        .collect()
}

// ============================================================================
// Build
// ============================================================================

pub fn format_build_report(report: &BuildReport) -> Vec<String> {
    let elapsed = format_duration(report.elapsed);
    if !report.succeeded() {
        let mut lines = vec![format!(
            "{}: FAILED with {} in {elapsed}",
            report.site,
            plural(report.errors.count(), "error")
        )];
        lines.extend(error_lines(report));
        return lines;
    }
    vec![format!(
        "{}: {} ({} written, {} unchanged), {} removed in {elapsed}",
        report.site,
        plural(report.nodes, "node"),
        report.written,
        report.unchanged,
        report.removed
    )]
}

pub fn print_build_report(report: &BuildReport) {
    for line in format_build_report(report) {
        println!("{}", line);
    }
}

pub fn format_scheduler_stats(stats: &SchedulerStats) -> Vec<String> {
    vec![format!(
        "Jobs: {} dispatched, {} coalesced, {} succeeded, {} failed, {} abandoned",
        stats.dispatched, stats.coalesced, stats.succeeded, stats.failed, stats.abandoned
    )]
}

pub fn print_scheduler_stats(stats: &SchedulerStats) {
    for line in format_scheduler_stats(stats) {
        println!("{}", line);
    }
}

// ============================================================================
// Check
// ============================================================================

pub fn format_check_report(report: &BuildReport) -> Vec<String> {
    if report.succeeded() {
        return vec![format!(
            "{}: {} render cleanly",
            report.site,
            plural(report.nodes, "node")
        )];
    }
    let mut lines = vec![format!(
        "{}: {}",
        report.site,
        plural(report.errors.count(), "error")
    )];
    lines.extend(error_lines(report));
    lines
}

pub fn print_check_report(report: &BuildReport) {
    for line in format_check_report(report) {
        println!("{}", line);
    }
}

// ============================================================================
// Plan
// ============================================================================

/// Dry-run listing of a node reconciliation. Paths for which `is_dir`
/// holds get a trailing `/`.
pub fn format_plan(
    site: &str,
    site_dir: &Path,
    plan: &Plan,
    is_dir: impl Fn(&Path) -> bool,
) -> Vec<String> {
    if plan.is_empty() {
        return vec![format!("{site}: nothing to delete under {}", site_dir.display())];
    }
    let count = match plan.doomed.len() {
        1 => "1 entry".to_string(),
        n => format!("{n} entries"),
    };
    let mut lines = vec![format!("{site}: {count} to delete under {}", site_dir.display())];
    for path in &plan.doomed {
        let rel = path.strip_prefix(site_dir).unwrap_or(path);
        let slash = if is_dir(path) { "/" } else { "" };
        lines.push(format!("{}{}{slash}", indent(1), rel.display()));
    }
    for err in &plan.walk_errors {
        lines.push(format!("{}error: {err}", indent(1)));
    }
    lines
}

pub fn print_plan(site: &str, site_dir: &Path, plan: &Plan) {
    for line in format_plan(site, site_dir, plan, Path::is_dir) {
        println!("{}", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::BuildError;
    use crate::collector::ErrorCollector;
    use crate::types::SiteKey;
    use std::path::PathBuf;

    fn report(errors: ErrorCollector) -> BuildReport {
        BuildReport {
            site: SiteKey::new("club").unwrap(),
            nodes: 4,
            written: 1,
            unchanged: 3,
            removed: 2,
            elapsed: Duration::from_millis(40),
            errors,
        }
    }

    #[test]
    fn successful_build_is_one_line() {
        let lines = format_build_report(&report(ErrorCollector::new()));
        assert_eq!(
            lines,
            ["club: 4 nodes (1 written, 3 unchanged), 2 removed in 0.04s"]
        );
    }

    #[test]
    fn failed_build_lists_errors_by_step() {
        let mut errors = ErrorCollector::new();
        errors.add("Sync favicon", BuildError::MissingImage("icon".into()));
        let lines = format_build_report(&report(errors));
        assert_eq!(lines[0], "club: FAILED with 1 error in 0.04s");
        assert_eq!(lines[1], "    Sync favicon: image icon not found");
    }

    #[test]
    fn check_report_counts_nodes() {
        let lines = format_check_report(&report(ErrorCollector::new()));
        assert_eq!(lines, ["club: 4 nodes render cleanly"]);
    }

    #[test]
    fn stats_line() {
        let stats = SchedulerStats {
            enqueued: 4,
            dispatched: 3,
            coalesced: 1,
            succeeded: 2,
            failed: 1,
            abandoned: 0,
        };
        assert_eq!(
            format_scheduler_stats(&stats),
            ["Jobs: 3 dispatched, 1 coalesced, 2 succeeded, 1 failed, 0 abandoned"]
        );
    }

    #[test]
    fn plan_marks_directories() {
        let root = PathBuf::from("/out/club");
        let plan = Plan {
            doomed: vec![root.join("old"), root.join("stale.html")],
            walk_errors: Vec::new(),
        };
        let lines = format_plan("club", &root, &plan, |p| p.ends_with("old"));
        assert_eq!(
            lines,
            [
                "club: 2 entries to delete under /out/club",
                "    old/",
                "    stale.html",
            ]
        );
    }

    #[test]
    fn empty_plan() {
        let lines = format_plan("club", Path::new("/out/club"), &Plan::default(), |_| false);
        assert_eq!(lines, ["club: nothing to delete under /out/club"]);
    }
}
