use chrono::{DateTime, Local, TimeZone};
use std::fmt::Display;
use std::io::{self, Write};
use std::sync::Mutex;

/// Receives the message of every fired action
pub trait ActionSink: Send + Sync {
    fn fire(&self, message: &str);
}

/// Format a line as `DD/MM/YYYY, HH:MM:SS:<millis>: <message>`
pub fn format_log_line<Tz>(at: &DateTime<Tz>, message: &str) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    format!(
        "{}:{}: {}",
        at.format("%d/%m/%Y, %H:%M:%S"),
        at.timestamp_subsec_millis(),
        message
    )
}

/// Writes a timestamped line per action (local time) to an output stream
pub struct LogSink<W: Write + Send = io::Stdout> {
    out: Mutex<W>,
}

impl LogSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> LogSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        match self.out.into_inner() {
            Ok(out) => out,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl<W: Write + Send> ActionSink for LogSink<W> {
    fn fire(&self, message: &str) {
        let line = format_log_line(&Local::now(), message);
        tracing::info!("{}", message);

        let mut out = match self.out.lock() {
            Ok(out) => out,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = writeln!(out, "{}", line).and_then(|_| out.flush()) {
            tracing::warn!("Failed to write action line: {}", e);
        }
    }
}
