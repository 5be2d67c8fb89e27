//! Subcommand implementations.

pub mod config;
pub mod containers;
pub mod env;
pub mod install;

use provisioning::{LogEntry, LogKind};

/// Print one transcript line to stderr as it is recorded
pub fn print_log(entry: &LogEntry) {
    let marker = match entry.kind {
        LogKind::Info => "·",
        LogKind::Success => "✓",
        LogKind::Error => "✗",
    };
    eprintln!(
        "{} {} {}",
        entry.timestamp.format("%H:%M:%S"),
        marker,
        entry.text
    );
}
