//! NetGuard CLI - netlist design rule checks from the command line.

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use netguard::drc::RULES;
use netguard::{CheckOptions, CheckResult, DrcIssue, NetguardCore, Severity};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "netguard")]
#[command(about = "Netlist and clock design rule checker for logic schematics", long_about = None)]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a single design snapshot
    Check {
        /// Path to a design snapshot (.json)
        #[arg(value_name = "FILE")]
        file: PathBuf,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Check every design snapshot in a directory
    Project {
        /// Path to project directory
        #[arg(value_name = "DIR", default_value = ".")]
        dir: PathBuf,

        #[command(flatten)]
        run: RunArgs,
    },

    /// List design rules
    Rules {
        /// Show detailed rule descriptions
        #[arg(short, long)]
        details: bool,
    },
}

#[derive(clap::Args)]
struct RunArgs {
    /// Output format
    #[arg(short, long, value_enum, default_value = "human")]
    format: OutputFormat,

    /// Also exit with an error code if findings at this severity or higher exist
    #[arg(long, value_enum)]
    fail_on: Option<FailOnSeverity>,

    /// Analyze from this circuit instead of the design's top
    #[arg(long, value_name = "CIRCUIT")]
    top: Option<String>,

    /// Drop findings of a normal-severity rule (repeatable)
    #[arg(long, value_name = "RULE_ID")]
    suppress: Vec<String>,
}

impl RunArgs {
    fn options(&self) -> CheckOptions {
        let mut options = CheckOptions {
            top: self.top.clone(),
            ..Default::default()
        };
        for rule in &self.suppress {
            options = options.suppress(rule.as_str());
        }
        options
    }
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON output for CI/CD
    Json,
    /// GitHub Actions format
    Github,
    /// GitLab CI format
    Gitlab,
}

#[derive(Clone, ValueEnum)]
enum FailOnSeverity {
    Fatal,
    Severe,
    Normal,
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let exit_code = match cli.command {
        Commands::Check { file, run } => handle_check(&file, &run),
        Commands::Project { dir, run } => handle_project(&dir, &run),
        Commands::Rules { details } => {
            handle_rules(details);
            0
        }
    };

    process::exit(exit_code);
}

fn handle_check(file: &PathBuf, run: &RunArgs) -> i32 {
    match NetguardCore::check_file(file, run.options()) {
        Ok(result) => {
            output_results(std::slice::from_ref(&result), &run.format);
            exit_code(std::slice::from_ref(&result), run.fail_on.as_ref())
        }
        Err(e) => {
            tracing::debug!(error = ?e, "check aborted");
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn handle_project(dir: &PathBuf, run: &RunArgs) -> i32 {
    match NetguardCore::check_directory(dir, run.options()) {
        Ok(results) => {
            tracing::info!(files = results.len(), "project checked: {}", dir.display());
            output_results(&results, &run.format);
            exit_code(&results, run.fail_on.as_ref())
        }
        Err(e) => {
            tracing::debug!(error = ?e, "check aborted");
            eprintln!("Error: {}", e);
            1
        }
    }
}

/// A design that may not be exported always fails the run.
fn exit_code(results: &[CheckResult], fail_on: Option<&FailOnSeverity>) -> i32 {
    let failed = results.iter().any(|result| {
        !result.export_allowed() || fail_on.map(|s| should_fail(result, s)).unwrap_or(false)
    });
    i32::from(failed)
}

fn should_fail(result: &CheckResult, severity: &FailOnSeverity) -> bool {
    match severity {
        FailOnSeverity::Fatal => result.has_fatal(),
        FailOnSeverity::Severe => result.has_severe_or_fatal(),
        FailOnSeverity::Normal => result.total_issues() > 0,
    }
}

fn output_results(results: &[CheckResult], format: &OutputFormat) {
    match format {
        OutputFormat::Human => output_human(results),
        OutputFormat::Json => output_json(results),
        OutputFormat::Github => output_github(results),
        OutputFormat::Gitlab => output_gitlab(results),
    }
}

fn output_human(results: &[CheckResult]) {
    for result in results {
        println!("\nFile: {} (top: {})", result.file.display(), result.top);
        println!("{}", "─".repeat(60));

        if result.total_issues() == 0 {
            println!("  No issues found");
        }

        for (severity, heading) in [
            (Severity::Fatal, "FATAL"),
            (Severity::Severe, "SEVERE"),
            (Severity::Normal, "NORMAL"),
        ] {
            let issues: Vec<_> = result
                .issues
                .iter()
                .filter(|i| i.severity == severity)
                .collect();
            if issues.is_empty() {
                continue;
            }
            println!("\n  {}:", heading);
            for issue in issues {
                println!("    - [{}] {}: {}", issue.rule_id, issue.circuit, issue.message);
                let names = issue.component_names();
                if !names.is_empty() && severity != Severity::Normal {
                    println!("      Components: {}", names.join(", "));
                }
            }
        }

        println!("\n  Status: {}", result.status);
        println!("  Summary:");
        println!("    Fatal:  {}", result.stats.fatal);
        println!("    Severe: {}", result.stats.severe);
        println!("    Normal: {}", result.stats.normal);
    }
}

fn output_json(results: &[CheckResult]) {
    let output = serde_json::json!({
        "results": results.iter().map(|r| {
            serde_json::json!({
                "file": r.file.display().to_string(),
                "top": r.top,
                "status": r.status.to_string(),
                "export_allowed": r.export_allowed(),
                "issues": r.issues,
                "stats": r.stats,
            })
        }).collect::<Vec<_>>(),
        "summary": {
            "total_files": results.len(),
            "total_issues": results.iter().map(|r| r.total_issues()).sum::<usize>(),
            "fatal": results.iter().map(|r| r.stats.fatal).sum::<usize>(),
        }
    });
    match serde_json::to_string_pretty(&output) {
        Ok(text) => println!("{}", text),
        Err(e) => eprintln!("Error: {}", e),
    }
}

fn severity_to_github(issue: &DrcIssue) -> &'static str {
    match issue.severity {
        Severity::Fatal => "error",
        Severity::Severe => "warning",
        Severity::Normal => "notice",
    }
}

fn output_github(results: &[CheckResult]) {
    for result in results {
        for issue in &result.issues {
            let level = severity_to_github(issue);
            println!(
                "::{} file={},title={}::{}",
                level,
                result.file.display(),
                issue.rule_id,
                issue.message.replace('\n', " ")
            );
        }
    }
}

fn severity_to_gitlab(issue: &DrcIssue) -> &'static str {
    match issue.severity {
        Severity::Fatal => "blocker",
        Severity::Severe => "major",
        Severity::Normal => "info",
    }
}

fn output_gitlab(results: &[CheckResult]) {
    let mut reports = Vec::new();
    for result in results {
        for issue in &result.issues {
            reports.push(serde_json::json!({
                "description": issue.message,
                "check_name": issue.rule_id,
                "fingerprint": issue.id,
                "severity": severity_to_gitlab(issue),
                "location": {
                    "path": result.file.display().to_string(),
                }
            }));
        }
    }
    match serde_json::to_string_pretty(&reports) {
        Ok(text) => println!("{}", text),
        Err(e) => eprintln!("Error: {}", e),
    }
}

fn handle_rules(details: bool) {
    println!("Available design rules:\n");

    for rule in RULES {
        println!("  {} ({})", rule.id, rule.severity);
        println!("    {}", rule.title);
        if details {
            println!("    {}", rule.description);
        }
        println!();
    }
}
