use std::io::{self, Write};

use serde::Serialize;

use crate::launcher::LaunchSummary;

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_summary(summary: &LaunchSummary) -> io::Result<()> {
        Self::print_json(summary)
    }

    pub fn render_summary(summary: &LaunchSummary) -> io::Result<String> {
        serde_json::to_string_pretty(summary).map_err(io::Error::other)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}
