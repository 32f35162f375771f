//! Terminal rendering for task tables.

mod format;
mod tables;

pub use format::{format_bytes, format_eta, format_speed};
pub use tables::{render_tasks, truncate_string};
