use std::io::{self, Write};

use serde::Serialize;

use crate::app::{ProgressEvent, ProgressSink, RunSummary};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Console,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_summary(summary: &RunSummary) -> io::Result<()> {
        Self::print_json(summary)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Progress lines on stderr and a coloured summary on stdout.
pub struct ConsoleOutput;

impl ConsoleOutput {
    pub fn print_summary(summary: &RunSummary) {
        let green = "\x1b[32m";
        let yellow = "\x1b[33m";
        let cyan = "\x1b[36m";
        let red = "\x1b[31m";
        let reset = "\x1b[0m";

        println!("{cyan}== harvest summary ({}) =={reset}", summary.source);
        for group in &summary.groups {
            let color = if group.failed > 0 { yellow } else { green };
            let categories = group
                .categories
                .iter()
                .map(|(category, count)| format!("{category}={count}"))
                .collect::<Vec<_>>()
                .join(" ");
            if summary.downloads_enabled {
                println!(
                    "{color}group {}: {} files, {} downloaded, {} already present, {} failed [{categories}]{reset}",
                    group.group_id,
                    group.records,
                    group.downloaded,
                    group.already_present,
                    group.failed
                );
            } else {
                println!(
                    "{color}group {}: {} files (metadata only) [{categories}]{reset}",
                    group.group_id, group.records
                );
            }
        }
        for group_id in &summary.missing_groups {
            println!("{yellow}group {group_id}: not available{reset}");
        }
        println!("{cyan}total files: {}{reset}", summary.total_records);
        match &summary.metadata_error {
            None => println!("{green}metadata: {}{reset}", summary.metadata_path),
            Some(err) => println!("{red}metadata not saved: {err}{reset}"),
        }
    }
}

impl ProgressSink for ConsoleOutput {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => eprintln!("{} ({:.1}s)", event.message, elapsed.as_secs_f64()),
            None => eprintln!("{}", event.message),
        }
    }
}
