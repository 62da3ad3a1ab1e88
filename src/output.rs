//! Output formatting utilities

use crate::dataset::Dataset;
use crate::error::Result;
use crate::resolver::LogEntry;
use crate::workspace::WorkspaceStats;

/// Pretty printer for datasnap output
pub struct PrettyPrinter;

impl PrettyPrinter {
    /// Print workspace statistics
    pub fn print_workspace_stats(stats: &WorkspaceStats) {
        println!("📊 Datasnap Workspace Statistics");
        println!("├─ Datasets: {}", stats.dataset_count);
        println!("├─ Objects: {}", stats.object_count);
        println!("└─ Object size: {}", format_bytes(stats.total_object_size));
    }

    /// Print dataset names with their head versions
    pub fn print_dataset_list(datasets: &[(String, String)]) {
        if datasets.is_empty() {
            println!("No datasets found.");
            return;
        }

        println!("📦 Datasets:");
        for (i, (name, head)) in datasets.iter().enumerate() {
            let prefix = if i == datasets.len() - 1 { "└─" } else { "├─" };
            println!("{} {} {}", prefix, name, head);
        }
    }

    /// Print a dataset history, newest first
    pub fn print_log(name: &str, entries: &[LogEntry]) {
        println!("📜 History of {}", name);
        for (i, entry) in entries.iter().enumerate() {
            let last = i == entries.len() - 1;
            let (prefix, indent) = if last { ("└─", "   ") } else { ("├─", "│  ") };
            println!("{} {}", prefix, entry.path);
            if let Some(ts) = entry.timestamp {
                println!("{}date:  {}", indent, ts.to_rfc2822());
            }
            println!("{}title: {}", indent, entry.title);
            for line in entry.message.lines() {
                println!("{}  {}", indent, line);
            }
        }
    }

    /// Print one dataset version
    pub fn print_dataset(ds: &Dataset) {
        let name = if ds.name.is_empty() { "(unnamed)" } else { ds.name.as_str() };
        println!("📸 Dataset: {}", name);
        println!("├─ Path: {}", ds.path.as_deref().unwrap_or("-"));
        println!("├─ Previous: {}", ds.previous_path.as_deref().unwrap_or("-"));
        if let Some(commit) = &ds.commit {
            println!("├─ Title: {}", commit.title.as_deref().unwrap_or(""));
            if let Some(ts) = commit.timestamp {
                println!("├─ Saved: {}", ts.to_rfc3339());
            }
        }
        if let Some(title) = ds.meta.as_ref().and_then(|m| m.title.as_deref()) {
            println!("├─ Meta title: {}", title);
        }
        if let Some(st) = &ds.structure {
            println!("├─ Format: {}", st.format);
            println!("├─ Entries: {}", st.entries.unwrap_or(0));
            println!("├─ Depth: {}", st.depth.unwrap_or(0));
            println!("├─ Errors: {}", st.err_count.unwrap_or(0));
            println!("├─ Size: {}", format_bytes(st.length.unwrap_or(0)));
        }
        println!("└─ Body: {}", ds.body_path.as_deref().unwrap_or("-"));
    }
}

/// JSON formatter for machine-readable output
pub struct JsonFormatter;

impl JsonFormatter {
    /// Format any serializable data as JSON
    pub fn format<T: serde::Serialize + ?Sized>(data: &T) -> Result<String> {
        Ok(serde_json::to_string_pretty(data)?)
    }

    /// Format workspace stats and dataset heads as JSON
    pub fn format_workspace_stats(stats: &WorkspaceStats, datasets: &[(String, String)]) -> Result<String> {
        let heads: serde_json::Map<String, serde_json::Value> = datasets
            .iter()
            .map(|(name, head)| (name.clone(), serde_json::Value::String(head.clone())))
            .collect();
        let json = serde_json::json!({
            "dataset_count": stats.dataset_count,
            "object_count": stats.object_count,
            "total_object_size": stats.total_object_size,
            "datasets": heads,
        });
        Ok(serde_json::to_string_pretty(&json)?)
    }
}

/// Format bytes in human-readable format
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}
