//! Background tasks: the daily sale check and the status line.

pub mod daily_check;
pub mod status_reporter;
