//! Output formatting utilities for CLI commands

use callspan_shared::utils::time::{format_micros, format_nanos};
use callspan_shared::{top_by_wall, SessionReport, Span};
use colored::Colorize;

/// Print success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print warning message
pub fn warning(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Summary, hottest stats entries and span counts
pub fn print_report(report: &SessionReport, top: usize) {
    println!("{}", "=== Session ===".bold());
    println!("  Started: {}", format_nanos(report.started_at_ns));
    println!(
        "  Duration: {} | Calls: {} | Flags: {}",
        format_micros(report.duration_us),
        report.total_calls(),
        report.flags
    );
    if let Some(name) = &report.transaction_name {
        println!("  Transaction: {}", name.cyan());
    }
    if let Some(exception) = &report.exception {
        let message = exception.message.as_deref().unwrap_or("");
        println!("  Exception: {} {}", exception.class.red(), message);
    }
    if report.compile.count > 0 {
        println!(
            "  Compiled: {} unit(s) in {}",
            report.compile.count,
            format_micros(report.compile.wall_us)
        );
    }

    if !report.stats.is_empty() {
        println!(
            "\n  {:>8} {:>12} {:>12} {:>12}  CALL",
            "CALLS", "WALL", "CPU", "MEM"
        );
        for (name, entry) in top_by_wall(&report.stats, top) {
            let cpu = entry.cpu_us.map(format_micros).unwrap_or_else(|| "-".into());
            let mem = entry
                .mem_delta
                .map(|m| format!("{:+}", m))
                .unwrap_or_else(|| "-".into());
            println!(
                "  {:>8} {:>12} {:>12} {:>12}  {}",
                entry.calls,
                format_micros(entry.wall_us),
                cpu,
                mem,
                name
            );
        }
    }

    if !report.spans.is_empty() {
        let mut categories: Vec<(&str, usize)> = Vec::new();
        for span in &report.spans {
            match categories.iter_mut().find(|(c, _)| *c == span.category) {
                Some((_, n)) => *n += 1,
                None => categories.push((span.category.as_str(), 1)),
            }
        }
        let summary = categories
            .iter()
            .map(|(c, n)| format!("{}={}", c, n))
            .collect::<Vec<_>>()
            .join(" ");
        println!("\n  Spans: {} ({})", report.spans.len(), summary);
    }
    if report.dropped_spans > 0 {
        warning(&format!("{} span(s) dropped at the cap", report.dropped_spans));
    }
}

pub fn print_spans(report: &SessionReport) {
    println!("\n  {:>5} {:>10} {:>6} {:>12}  ANNOTATIONS", "ID", "CATEGORY", "CALLS", "TIME");
    for span in &report.spans {
        println!(
            "  {:>5} {:>10} {:>6} {:>12}  {}",
            span.id.0,
            span.category,
            span.invocations(),
            format_micros(span.total_duration_us() as u64),
            annotations(span)
        );
    }
}

fn annotations(span: &Span) -> String {
    span.annotations
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use callspan_shared::SpanId;

    #[test]
    fn test_annotations_sorted_by_key() {
        let mut span = Span::new(SpanId(1), "sql");
        span.annotations.insert("title".into(), "users".into());
        span.annotations.insert("sql".into(), "SELECT 1".into());
        assert_eq!(annotations(&span), "sql=SELECT 1 title=users");
    }
}
