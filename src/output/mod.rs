//! Output module for command line reports
//!
//! This module handles:
//! - The end-of-run summary of a batch import
//! - Task status views and task listings

mod summary;

pub use summary::{
    print_import_summary, print_task, print_task_list, render_import_summary, render_task,
};
