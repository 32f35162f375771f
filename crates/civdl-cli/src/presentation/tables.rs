//! Table formatting utilities for CLI output.

use std::fmt::Write;

use civdl_core::{TaskStatus, TaskView};

use super::format::{format_bytes, format_eta, format_speed};

const FILE_WIDTH: usize = 40;

/// Truncates a string to a maximum number of characters, adding "..." if needed.
///
/// # Examples
///
/// ```rust
/// use civdl_cli::presentation::truncate_string;
///
/// assert_eq!(truncate_string("Hello", 10), "Hello");
/// assert_eq!(truncate_string("Hello World", 8), "Hello...");
/// ```
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

fn size_column(task: &TaskView) -> String {
    match task.task.bytes_total {
        Some(total) => format!(
            "{} / {}",
            format_bytes(task.task.bytes_downloaded),
            format_bytes(total)
        ),
        None => format_bytes(task.task.bytes_downloaded),
    }
}

fn status_column(task: &TaskView) -> String {
    let mut status = task.task.status.as_str().to_string();
    if task.task.is_test {
        status.push_str(" (test)");
    }
    status
}

/// Render tasks as a fixed-width table, with failure reasons underneath.
pub fn render_tasks(tasks: &[TaskView]) -> String {
    if tasks.is_empty() {
        return "No downloads.\n".to_string();
    }

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<8}  {:<18}  {:>6}  {:<21}  {:>11}  {:>7}  {}",
        "ID", "STATUS", "PROG", "SIZE", "SPEED", "ETA", "FILE"
    );
    let _ = writeln!(out, "{}", "-".repeat(8 + 18 + 6 + 21 + 11 + 7 + FILE_WIDTH + 12));

    for view in tasks {
        let task = &view.task;
        let id = task.id.to_string();
        let _ = writeln!(
            out,
            "{:<8}  {:<18}  {:>5.1}%  {:<21}  {:>11}  {:>7}  {}",
            &id[..8],
            status_column(view),
            task.progress,
            size_column(view),
            format_speed(task.download_speed),
            format_eta(task.eta),
            truncate_string(&task.filename, FILE_WIDTH),
        );
        if task.status == TaskStatus::Failed {
            if let Some(error) = &task.error {
                let _ = writeln!(out, "          error: {error}");
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use civdl_core::{Task, TaskSpec};

    fn task(filename: &str) -> TaskView {
        let task = Task::new(
            TaskSpec {
                model_id: 4201,
                version_id: 2,
                file_id: 7,
                model_name: "Dreamlike".to_string(),
                model_type: "Checkpoint".to_string(),
                filename: filename.to_string(),
                file_path: PathBuf::from("/models").join(filename),
                is_test: false,
            },
            Default::default(),
        );
        TaskView {
            task,
            is_recent: false,
        }
    }

    #[test]
    fn truncate_counts_characters() {
        assert_eq!(truncate_string("ääääää", 5), "ää...");
        assert_eq!(truncate_string("abc", 3), "abc");
    }

    #[test]
    fn empty_table() {
        assert_eq!(render_tasks(&[]), "No downloads.\n");
    }

    #[test]
    fn row_shows_progress_and_size() {
        let mut view = task("dreamlike-v2.safetensors");
        view.task.status = TaskStatus::Downloading;
        view.task.progress = 25.0;
        view.task.bytes_downloaded = 1024;
        view.task.bytes_total = Some(4096);
        view.task.download_speed = Some(512.0);
        view.task.eta = Some(6);

        let table = render_tasks(&[view]);
        let row = table.lines().nth(2).unwrap();
        assert!(row.contains("downloading"));
        assert!(row.contains("25.0%"));
        assert!(row.contains("1.0 KB / 4.0 KB"));
        assert!(row.contains("512 B/s"));
        assert!(row.contains("6s"));
        assert!(row.ends_with("dreamlike-v2.safetensors"));
    }

    #[test]
    fn failed_row_shows_error() {
        let mut view = task("a.safetensors");
        view.task.status = TaskStatus::Failed;
        view.task.error = Some("Transfer failed: HTTP 403".to_string());

        let table = render_tasks(&[view]);
        assert!(table.contains("error: Transfer failed: HTTP 403"));
    }
}
