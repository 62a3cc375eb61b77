//! Simple check example: run the design rules on a snapshot and print results.
//! Run with: cargo run --example simple_check [path/to/design.json]

use netguard::prelude::*;
use std::path::Path;

fn main() -> Result<(), NetguardError> {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "tests/fixtures/valid_counter.json".to_string());
    let path = Path::new(&path);

    if !path.exists() {
        eprintln!("File not found: {}", path.display());
        eprintln!("Usage: cargo run --example simple_check [path/to/design.json]");
        std::process::exit(1);
    }

    let result = NetguardCore::check_file(path, CheckOptions::default())?;

    println!("Checked {} (top: {})", result.file.display(), result.top);
    println!("Status: {}", result.status);
    println!(
        "Issues: {} (fatal: {}, severe: {}, normal: {})",
        result.total_issues(),
        result.stats.fatal,
        result.stats.severe,
        result.stats.normal
    );
    for issue in &result.issues {
        println!("  [{}] {} {}: {}", issue.severity, issue.rule_id, issue.circuit, issue.message);
        let names = issue.component_names();
        if !names.is_empty() {
            println!("    Components: {}", names.join(", "));
        }
    }

    if !result.export_allowed() {
        std::process::exit(1);
    }
    Ok(())
}
