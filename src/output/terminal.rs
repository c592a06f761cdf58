//! Terminal output formatting with colors.

use colored::Colorize;

use crate::report::{ParameterReport, SbcReport};

/// Significance level used only for coloring; it does not affect any
/// computed value in the report.
const DISPLAY_ALPHA: f64 = 0.05;

/// Block glyphs for the rank histogram sparkline, lowest to highest.
const HISTOGRAM_GLYPHS: [char; 8] = [
    '\u{2581}', '\u{2582}', '\u{2583}', '\u{2584}', '\u{2585}', '\u{2586}', '\u{2587}', '\u{2588}',
];

/// Format a full report for terminal display.
pub fn format_report(report: &SbcReport) -> String {
    let mut out = String::new();
    let sep = "\u{2500}".repeat(62);

    out.push_str(&sep);
    out.push('\n');
    out.push_str("  Simulation-Based Calibration\n\n");

    out.push_str(&format!(
        "    Simulations:  {} requested, {} completed",
        report.counts.n_requested, report.counts.n_completed
    ));
    let problems = report.counts.n_failed + report.counts.n_timed_out + report.counts.n_skipped;
    if problems > 0 {
        out.push_str(&format!(
            " ({})",
            format!(
                "{} failed, {} timed out, {} skipped",
                report.counts.n_failed, report.counts.n_timed_out, report.counts.n_skipped
            )
            .yellow()
        ));
    }
    out.push('\n');
    out.push_str(&format!(
        "    Ranks:        {} draws per simulation, {} bins\n",
        report.posterior_draws, report.bins
    ));
    out.push_str(&format!(
        "    Runtime:      {:.1}s\n",
        report.elapsed.as_secs_f64()
    ));
    if report.cancelled {
        out.push_str(&format!("    {}\n", "Run was cancelled early".yellow()));
    }
    out.push('\n');

    for parameter in &report.parameters {
        out.push_str(&format_parameter(parameter));
    }

    if !report.warnings.is_empty() {
        out.push_str(&format!("\n  {} Warnings\n", "\u{26A0}".yellow()));
        for warning in &report.warnings {
            out.push_str(&format!("    \u{2022} {}\n", warning));
        }
    }

    out.push_str(&sep);
    out.push('\n');
    out
}

/// One-line verdict suitable for log output or assertion messages.
pub fn format_summary_line(report: &SbcReport) -> String {
    match report.min_p_value() {
        Some(p) if p >= DISPLAY_ALPHA => format!(
            "{} ({} parameters, min p = {:.4})",
            "calibrated".green(),
            report.parameters.len(),
            p
        ),
        Some(p) => format!(
            "{} ({} parameters, min p = {:.4})",
            "miscalibrated".red(),
            report.parameters.len(),
            p
        ),
        None => "no completed simulations".yellow().to_string(),
    }
}

fn format_parameter(parameter: &ParameterReport) -> String {
    let mut out = String::new();

    let p_display = if parameter.p_value >= DISPLAY_ALPHA {
        format!("{:.4}", parameter.p_value).green()
    } else {
        format!("{:.4}", parameter.p_value).red()
    };
    out.push_str(&format!(
        "    {:<12}  X\u{00b2} = {:>7.2}  (dof {})  p = {}\n",
        parameter.parameter.bold(),
        parameter.chi_square,
        parameter.dof,
        p_display
    ));
    out.push_str(&format!(
        "    {:<12}  {}\n",
        "",
        sparkline(&parameter.bin_counts)
    ));
    for warning in &parameter.warnings {
        out.push_str(&format!("      \u{2022} {}\n", warning.dimmed()));
    }

    out
}

/// Render bin counts as a unicode block sparkline.
fn sparkline(counts: &[u64]) -> String {
    let max = counts.iter().copied().max().unwrap_or(0);
    if max == 0 {
        return String::new();
    }
    counts
        .iter()
        .map(|&c| {
            let level = (c * (HISTOGRAM_GLYPHS.len() as u64 - 1) + max / 2) / max;
            HISTOGRAM_GLYPHS[level as usize]
        })
        .collect()
}
