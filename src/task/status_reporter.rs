//! Hourly "N hours until check" status.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use log::debug;
use log::info;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::clock::Clock;
use crate::clock::next_whole_hour;

/// Somewhere to show a short status line.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StatusSink: Send + Sync {
    async fn set_status(&self, text: String);
}

pub struct StatusReporter {
    sink: Arc<dyn StatusSink>,
    clock: Arc<dyn Clock>,
    next_trigger: watch::Receiver<DateTime<Utc>>,
}

impl StatusReporter {
    pub fn new(
        sink: Arc<dyn StatusSink>,
        clock: Arc<dyn Clock>,
        next_trigger: watch::Receiver<DateTime<Utc>>,
    ) -> Self {
        Self {
            sink,
            clock,
            next_trigger,
        }
    }

    /// Whole hours left until `next`, rounded down.
    pub fn status_text(now: DateTime<Utc>, next: DateTime<Utc>) -> String {
        let hours = (next - now).num_hours().max(0);
        let plural = if hours == 1 { "" } else { "s" };
        format!("{hours} hour{plural} until check")
    }

    /// Publishes the status for the current instant.
    pub async fn report(&self) {
        let next = *self.next_trigger.borrow();
        let text = Self::status_text(self.clock.now(), next);
        debug!("Setting status to \"{text}\".");
        self.sink.set_status(text).await;
    }

    /// Reports now and then at every whole hour until `shutdown` turns true.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!("Starting status reporter.");
        while !*shutdown.borrow_and_update() {
            self.report().await;
            let wake = next_whole_hour(self.clock.now());
            tokio::select! {
                _ = self.clock.sleep_until(wake) => {}
                _ = shutdown.changed() => break,
            }
        }
        info!("Stopped status reporter.");
    }

    pub fn start(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}
