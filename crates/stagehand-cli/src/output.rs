//! Terminal output.

use console::style;

use stagehand_core::ErrorCategory;
use stagehand_core::bootstrap::GeneratedBundle;
use stagehand_core::install::InstallReport;

pub fn progress(message: &str) {
    println!("{} {}", style("==>").green().bold(), message);
}

pub fn print_report(report: &InstallReport) {
    println!(
        "{} {} ({})",
        style("Node").bold(),
        style(&report.hostname).cyan(),
        report.role
    );
    for step in &report.steps {
        if step.detail.is_empty() {
            progress(step.state.as_str());
        } else {
            progress(&format!("{} {}", step.state, style(&step.detail).dim()));
        }
    }
}

pub fn print_bundle(bundle: &GeneratedBundle) {
    progress(&format!("wrote {}", bundle.script_path.display()));
    if let Some(archive) = &bundle.archive_path {
        progress(&format!("wrote {}", archive.display()));
    }
    if let Some(digest) = &bundle.digest {
        println!("    blake3:   {}", digest);
    }
    if let Some(revision) = &bundle.revision {
        println!("    revision: {}", revision);
    }
    println!("    modules:  {} installed, {} skipped", bundle.installed, bundle.skipped.len());
    for skipped in &bundle.skipped {
        eprintln!(
            "{} {} ({}): {}",
            style("warning:").yellow().bold(),
            skipped.module,
            skipped.remote,
            skipped.reason
        );
    }
}

pub fn print_error(category: ErrorCategory, err: &anyhow::Error) {
    print_message(category, &format!("{:#}", err));
}

pub fn print_message(category: ErrorCategory, message: &str) {
    eprintln!(
        "{} {}",
        style(format!("error[{}]:", category)).red().bold(),
        message
    );
}
