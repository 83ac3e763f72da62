use crate::error::CommandSyntaxError;
use std::path::{Path, PathBuf};
use time::{macros::format_description, OffsetDateTime};

pub const FORMAT_HELP: &str = "Correct Format for single camera: 'M1 C15 P2'\n\
Multiple Cameras: 'M1 C15 P2;M2 C12 P1'\n\
Turning on/off sequence: 'Sequencing:On:M1' or 'Sequencing:Off:M1'";

const SEQUENCING: &str = "sequencing";

/// One operator command. Monitors are 0-based here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Callup {
        monitor: usize,
        camera: u32,
        preset: u32,
    },
    Sequencing {
        monitor: usize,
        enabled: bool,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    pub text: String,
    pub commands: Vec<Command>,
    pub errors: Vec<CommandSyntaxError>,
}

impl Batch {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Strips CR/LF and surrounding whitespace.
pub fn normalize(text: &str) -> String {
    text.replace(['\r', '\n'], "").trim().to_string()
}

/// Parses one file's worth of commands. Malformed segments are collected in
/// [`Batch::errors`] without stopping the rest.
pub fn parse_batch(text: &str) -> Result<Batch, CommandSyntaxError> {
    let text = normalize(text);
    let segments: Vec<&str> = text
        .split(';')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .collect();
    let Some(first) = segments.first() else {
        return Err(CommandSyntaxError::Empty);
    };
    if !is_sequencing(first) && !starts_with_monitor(first) {
        return Err(CommandSyntaxError::UnrecognizedBatch(first.to_string()));
    }

    let mut batch = Batch::default();
    for segment in &segments {
        let parsed = if is_sequencing(segment) {
            parse_sequencing(segment)
        } else {
            parse_callup(segment)
        };
        match parsed {
            Ok(command) => batch.commands.push(command),
            Err(err) => batch.errors.push(err),
        }
    }
    batch.text = text;
    Ok(batch)
}

fn is_sequencing(segment: &str) -> bool {
    segment
        .get(..SEQUENCING.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(SEQUENCING))
}

fn starts_with_monitor(segment: &str) -> bool {
    let mut chars = segment.chars().filter(|c| !c.is_whitespace());
    matches!(chars.next(), Some('M' | 'm')) && chars.next().is_some_and(|c| c.is_ascii_digit())
}

/// `M<n> C<c> P<p>`; whitespace between tokens is optional.
pub fn parse_callup(segment: &str) -> Result<Command, CommandSyntaxError> {
    let err = |reason: &str| CommandSyntaxError::Callup {
        segment: segment.to_string(),
        reason: reason.to_string(),
    };
    let compact: String = segment
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_uppercase();
    let rest = compact
        .strip_prefix('M')
        .ok_or_else(|| err("expected M<monitor>"))?;
    let (monitor, rest) = split_number(rest).ok_or_else(|| err("monitor number missing"))?;
    let rest = rest
        .strip_prefix('C')
        .ok_or_else(|| err("expected C<camera> after monitor"))?;
    let (camera, rest) = split_number(rest).ok_or_else(|| err("camera number missing"))?;
    let rest = rest
        .strip_prefix('P')
        .ok_or_else(|| err("expected P<preset> after camera"))?;
    let (preset, rest) = split_number(rest).ok_or_else(|| err("preset number missing"))?;
    if !rest.is_empty() {
        return Err(err("unexpected text after preset"));
    }
    let monitor = to_index(monitor).ok_or_else(|| err("monitor numbers start at 1"))?;
    Ok(Command::Callup {
        monitor,
        camera,
        preset,
    })
}

/// `Sequencing:On|Off:M<n>`.
pub fn parse_sequencing(segment: &str) -> Result<Command, CommandSyntaxError> {
    let err = |reason: &str| CommandSyntaxError::Sequencing {
        segment: segment.to_string(),
        reason: reason.to_string(),
    };
    let parts: Vec<&str> = segment.split(':').map(str::trim).collect();
    let [keyword, state, monitor] = parts.as_slice() else {
        return Err(err("expected three ':' separated fields"));
    };
    if !keyword.eq_ignore_ascii_case(SEQUENCING) {
        return Err(err("expected 'Sequencing'"));
    }
    let enabled = if state.eq_ignore_ascii_case("on") {
        true
    } else if state.eq_ignore_ascii_case("off") {
        false
    } else {
        return Err(err("state must be On or Off"));
    };
    let number = monitor
        .strip_prefix(['M', 'm'])
        .and_then(|digits| digits.parse::<u32>().ok())
        .ok_or_else(|| err("expected M<monitor>"))?;
    let monitor = to_index(number).ok_or_else(|| err("monitor numbers start at 1"))?;
    Ok(Command::Sequencing { monitor, enabled })
}

fn split_number(text: &str) -> Option<(u32, &str)> {
    let end = text
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(text.len());
    if end == 0 {
        return None;
    }
    let value = text[..end].parse::<u32>().ok()?;
    Some((value, &text[end..]))
}

fn to_index(number: u32) -> Option<usize> {
    (number as usize).checked_sub(1)
}

pub fn status_path(command_file: &Path) -> PathBuf {
    let mut name = command_file.as_os_str().to_os_string();
    name.push(".status");
    PathBuf::from(name)
}

/// Contents of the status side-file for one batch outcome.
pub fn status_report(text: &str, outcome: &Result<Batch, CommandSyntaxError>, at: OffsetDateTime) -> String {
    match outcome {
        Ok(batch) if batch.is_clean() => format!(
            "Callup Command-- {} --Processed Correctly -- {}",
            text,
            timestamp(at)
        ),
        Ok(batch) => {
            let errors: Vec<String> = batch.errors.iter().map(ToString::to_string).collect();
            format!(
                "{}\n\n{}\n{}",
                errors.join("\n"),
                FORMAT_HELP,
                timestamp(at)
            )
        }
        Err(err) => format!(
            "Error with Callup String '{}' ----- {}\n{}\n{}",
            text,
            err,
            FORMAT_HELP,
            timestamp(at)
        ),
    }
}

pub fn startup_banner(at: OffsetDateTime) -> String {
    format!(
        "Wall control started and can write to the callup file ----- {}",
        timestamp(at)
    )
}

fn timestamp(at: OffsetDateTime) -> String {
    let format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    at.format(&format).unwrap_or_default()
}
