//! Rendering of command results.

use std::io;

use anyhow::Result;
use clap::ValueEnum;
use console::style;

use stool_core::commands::{LocksReport, PortsReport, StageStatus, ValidationReport};
use stool_core::config::{StoolConfig, to_toml};
use stool_core::console::Console;
use stool_core::orchestrator::RunReport;
use stool_core::ports::PortRange;
use stool_core::select::EnumerationFailures;
use stool_core::stage::{Stage, StageState};

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable table
    #[default]
    Table,
    /// Machine-readable JSON
    Json,
    /// Only show errors
    Quiet,
}

impl OutputFormat {
    /// Console for per-stage progress; stdout stays clean for JSON.
    pub fn console(self) -> Console {
        match self {
            OutputFormat::Table => Console::stdio(),
            OutputFormat::Json => Console::new(Box::new(io::stderr()), Box::new(io::stderr())),
            OutputFormat::Quiet => Console::new(Box::new(io::sink()), Box::new(io::stderr())),
        }
    }
}

pub fn print_stage_created(format: OutputFormat, stage: &Stage) -> Result<()> {
    match format {
        OutputFormat::Table => {
            println!("✓ Created stage '{}'", stage.name);
            for entry in &stage.ports {
                println!(
                    "  {:<12} {}/{}",
                    entry.label,
                    entry.port,
                    entry.port.saturating_add(1)
                );
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(stage)?);
        }
        OutputFormat::Quiet => {}
    }
    Ok(())
}

pub fn print_run_report(format: OutputFormat, verb: &str, report: &RunReport) -> Result<()> {
    match format {
        OutputFormat::Table => {
            if report.processed.len() > 1 {
                println!("✓ {} {} stages", capitalize(verb), report.processed.len());
            }
            print_warnings(&report.warnings);
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "action": verb,
                "processed": report.processed,
                "warnings": report.warnings.iter().map(|f| {
                    serde_json::json!({ "stage": f.name, "reason": f.reason })
                }).collect::<Vec<_>>(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Quiet => {}
    }
    Ok(())
}

pub fn print_status(
    format: OutputFormat,
    stages: &[StageStatus],
    warnings: &EnumerationFailures,
) -> Result<()> {
    match format {
        OutputFormat::Table => {
            if stages.is_empty() {
                println!("No stages.");
            }
            let width = stages.iter().map(|s| s.name.len()).max().unwrap_or(0).max(5);
            for stage in stages {
                let state = match stage.state {
                    StageState::Up => style("up").green(),
                    StageState::Down => style("down").dim(),
                };
                let ports = stage
                    .ports
                    .iter()
                    .map(|e| format!("{}={}", e.label, e.port))
                    .collect::<Vec<_>>()
                    .join(" ");
                println!(
                    "{:<width$}  {:<6} {:<10} {}",
                    stage.name, state, stage.owner, ports
                );
                for holder in &stage.locked_by {
                    println!("{:<width$}  {} {}", "", style("locked:").yellow(), holder);
                }
            }
            print_warnings(warnings);
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(stages)?);
        }
        OutputFormat::Quiet => {}
    }
    Ok(())
}

pub fn print_validation(format: OutputFormat, reports: &[ValidationReport]) -> Result<()> {
    match format {
        OutputFormat::Table => {
            for report in reports {
                if report.problems.is_empty() {
                    println!("✓ {}", report.stage);
                } else {
                    println!("✗ {}", report.stage);
                    for problem in &report.problems {
                        println!("  ⚠ {}", problem);
                    }
                }
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(reports)?);
        }
        OutputFormat::Quiet => {
            for report in reports.iter().filter(|r| !r.problems.is_empty()) {
                for problem in &report.problems {
                    eprintln!("{}: {}", report.stage, problem);
                }
            }
        }
    }
    Ok(())
}

pub fn print_ports(format: OutputFormat, range: PortRange, report: &PortsReport) -> Result<()> {
    match format {
        OutputFormat::Table => {
            println!(
                "Range {}-{}: {} of {} pairs in use",
                range.first(),
                range.last(),
                report.used.len(),
                range.capacity()
            );
            for usage in &report.used {
                println!(
                    "  {}/{}  {} {}",
                    usage.port,
                    usage.port.saturating_add(1),
                    usage.stage,
                    style(&usage.label).dim()
                );
            }
            match report.next_free {
                Some(port) => println!("Next free: {}/{}", port, port.saturating_add(1)),
                None => println!("{} No free port pair left", style("⚠").yellow()),
            }
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "first": range.first(),
                "last": range.last(),
                "capacity": range.capacity(),
                "used": report.used,
                "next_free": report.next_free,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Quiet => {}
    }
    Ok(())
}

pub fn print_config(format: OutputFormat, config: &StoolConfig) -> Result<()> {
    match format {
        OutputFormat::Table => print!("{}", to_toml(config)?),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(config)?),
        OutputFormat::Quiet => {}
    }
    Ok(())
}

pub fn print_locks(format: OutputFormat, report: &LocksReport) -> Result<()> {
    match format {
        OutputFormat::Table => {
            if report.locks.is_empty() {
                println!("No locks held.");
            }
            for entry in &report.locks {
                println!(
                    "{:<20} {:<9} {} running '{}' since {}",
                    entry.resource,
                    entry.mode,
                    entry.owner,
                    entry.operation,
                    entry.since.format("%Y-%m-%d %H:%M:%S")
                );
            }
            if !report.stale.is_empty() && !report.repaired {
                println!(
                    "  ⚠ {} stale owner(s); run 'stool locks --repair'",
                    report.stale.len()
                );
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(report)?);
        }
        OutputFormat::Quiet => {}
    }
    Ok(())
}

fn print_warnings(warnings: &EnumerationFailures) {
    for failure in warnings.iter() {
        println!("  ⚠ {}: {}", failure.name, failure.reason);
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
