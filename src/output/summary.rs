//! Human readable reports for the command line

use crate::import::ImportStats;
use crate::state::{ResultStatus, Task};
use crate::storage::PageResult;
use std::fmt::Write;
use std::time::Duration;

const RULE: &str = "======================================================================";

/// Number of failed results shown in a task view
const MAX_FAILED_SHOWN: usize = 10;

/// Renders the end-of-run summary of a batch import
pub fn render_import_summary(stats: &ImportStats, elapsed: Duration) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", RULE);
    let _ = writeln!(out, "Import Statistics:");
    let _ = writeln!(out, "  Total: {} URLs", stats.total);
    let _ = writeln!(out, "  Success: {}", stats.success);
    let _ = writeln!(out, "  Failed: {}", stats.failed);
    let _ = writeln!(out, "  Duplicate: {}", stats.duplicate);
    let _ = writeln!(out, "  Skipped: {} (already imported)", stats.skipped);
    if let Some(rate) = stats.success_rate() {
        let _ = writeln!(out, "  Success rate: {:.2}%", rate);
    }

    let secs = elapsed.as_secs_f64();
    let _ = writeln!(out);
    let _ = writeln!(out, "  Elapsed: {:.2}s", secs);
    if stats.attempted() > 0 && secs > 0.0 {
        let _ = writeln!(out, "  Throughput: {:.2} URLs/s", stats.attempted() as f64 / secs);
    }
    let _ = writeln!(out, "{}", RULE);
    out
}

pub fn print_import_summary(stats: &ImportStats, elapsed: Duration) {
    print!("{}", render_import_summary(stats, elapsed));
}

/// Renders one task with its counters and most recent failures
pub fn render_task(task: &Task) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== Import Task {} ===\n", task.id);
    let _ = writeln!(out, "  Status: {}", task.status);
    let _ = writeln!(out, "  Knowledge base: {}", task.knowledge_base_id);
    let _ = writeln!(out, "  Base URL: {}", task.base_url);
    let _ = writeln!(out, "  Created: {}", task.created_at.to_rfc3339());
    if let Some(completed) = task.completed_at {
        let _ = writeln!(out, "  Completed: {}", completed.to_rfc3339());
    }
    let _ = writeln!(out);

    let percentage = if task.total_urls > 0 {
        task.processed_urls as f64 / task.total_urls as f64 * 100.0
    } else {
        0.0
    };
    let _ = writeln!(out, "Progress:");
    let _ = writeln!(
        out,
        "  Processed: {} / {} ({:.1}%)",
        task.processed_urls, task.total_urls, percentage
    );
    let _ = writeln!(out, "  Success: {}", task.success_count);
    let _ = writeln!(out, "  Failed: {}", task.failed_count);
    let _ = writeln!(out, "  Duplicate: {}", task.duplicate_count);
    if !task.current_url.is_empty() {
        let _ = writeln!(out, "  Current URL: {}", task.current_url);
    }
    if !task.error_message.is_empty() {
        let _ = writeln!(out, "  Message: {}", task.error_message);
    }

    let failures: Vec<_> = task
        .results
        .iter()
        .filter(|r| r.status == ResultStatus::Failed)
        .collect();
    if !failures.is_empty() {
        let _ = writeln!(out, "\nFailed URLs ({}):", failures.len());
        for result in failures.iter().rev().take(MAX_FAILED_SHOWN) {
            let _ = writeln!(
                out,
                "  - {}: {}",
                result.url,
                result.error.as_deref().unwrap_or("unknown error")
            );
        }
        if failures.len() > MAX_FAILED_SHOWN {
            let _ = writeln!(out, "  ... and {} more", failures.len() - MAX_FAILED_SHOWN);
        }
    }
    out
}

pub fn print_task(task: &Task) {
    print!("{}", render_task(task));
}

/// Prints one line per task of a listing page
pub fn print_task_list(page: &PageResult<Task>) {
    if page.items.is_empty() {
        println!("No tasks found ({} total)", page.total);
        return;
    }

    let first = (page.page as u64 - 1) * page.page_size as u64 + 1;
    println!(
        "Tasks {}-{} of {} (page {})",
        first,
        first + page.items.len() as u64 - 1,
        page.total,
        page.page
    );
    for task in &page.items {
        println!(
            "  {}  {:<10}  {:>4}/{:<4}  {}",
            task.id,
            task.status.to_string(),
            task.processed_urls,
            task.total_urls,
            task.base_url
        );
    }
}
