use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use colored::Colorize;
use serde::Serialize;
use time::macros::format_description;
use time::OffsetDateTime;
use tokio::sync::Mutex;

use crate::types::{AggregateResult, ProbeOutcome};

/// Status tag for a console line, mirroring the classic `[+]`/`[-]` scanner
/// output convention.
#[derive(Debug, Clone, Copy)]
pub enum Tag {
    /// `[+]` lifecycle progress (green).
    Plus,
    /// `[-]` operator-facing errors (red).
    Minus,
    /// `[*]` warnings such as unattempted targets (yellow).
    Star,
    /// `[ ]` per-target probe results (plain).
    Space,
}

impl Tag {
    fn paint(&self, s: String) -> colored::ColoredString {
        match self {
            Tag::Plus => s.green(),
            Tag::Minus => s.red(),
            Tag::Star => s.yellow(),
            Tag::Space => s.white(),
        }
    }

    fn symbol(&self) -> char {
        match self {
            Tag::Plus => '+',
            Tag::Minus => '-',
            Tag::Star => '*',
            Tag::Space => ' ',
        }
    }
}

/// Serializes console output so lines from concurrent workers never tear.
/// The lock is scoped to one sweep, not the process.
pub struct Console {
    sink: Mutex<Box<dyn Write + Send>>,
}

impl Console {
    pub fn new() -> Self {
        Self::with_writer(std::io::stdout())
    }

    /// Emit lines to an arbitrary sink instead of stdout. Tests use this to
    /// capture concurrent emission.
    pub fn with_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            sink: Mutex::new(Box::new(writer)),
        }
    }

    /// Emit one tagged, timestamped line. The full line is formatted before
    /// the lock is taken and written in a single call while holding it.
    pub async fn line(&self, tag: Tag, msg: &str) {
        let line = format_line(tag, msg);
        let mut sink = self.sink.lock().await;
        let _ = writeln!(sink, "{line}");
        let _ = sink.flush();
    }

    /// One progress notification per probe result.
    pub async fn progress(&self, worker_index: usize, target: &str, outcome: &ProbeOutcome) {
        let msg = format_progress(worker_index, target, outcome);
        self.line(Tag::Space, &msg).await;
    }
}

impl Default for Console {
    fn default() -> Self {
        Self::new()
    }
}

fn format_line(tag: Tag, msg: &str) -> String {
    format!(
        "{} {} {}",
        tag.paint(format!("[{}]", tag.symbol())),
        format!("[{}]", console_timestamp()).bright_blue(),
        msg
    )
}

/// Format one probe result as a single line. Must never contain a newline:
/// line atomicity under the console lock depends on it.
pub fn format_progress(worker_index: usize, target: &str, outcome: &ProbeOutcome) -> String {
    let secs = outcome.elapsed().as_secs_f64();
    let verdict = match outcome {
        ProbeOutcome::Authorized { .. } => "Authorized".blue().on_magenta().to_string(),
        ProbeOutcome::Denied { .. } => "Access Denied".yellow().on_red().to_string(),
        ProbeOutcome::Failed { error, .. } => {
            format!("{}", error.to_string().replace('\n', " ").yellow())
        }
    };
    format!(
        "worker {}: {:.2}s -> {} => {}",
        worker_index + 1,
        secs,
        target.cyan(),
        verdict
    )
}

fn console_timestamp() -> String {
    let fmt = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    OffsetDateTime::now_utc()
        .format(&fmt)
        .unwrap_or_else(|_| String::from("1970-01-01 00:00:00"))
}

/// Default CSV path: `ldap-sweep-<date>-<time>.csv` in the working directory.
pub fn default_output_path() -> PathBuf {
    let fmt = format_description!("[year]-[month]-[day]-[hour]_[minute]_[second]");
    let stamp = OffsetDateTime::now_utc()
        .format(&fmt)
        .unwrap_or_else(|_| String::from("scan"));
    PathBuf::from(format!("ldap-sweep-{stamp}.csv"))
}

#[derive(Debug, Serialize)]
struct AuthorizedRecord<'a> {
    target: &'a str,
    info_file: String,
    metadata_bytes: usize,
}

/// Write one CSV row per authorized target. The file is created (with a
/// header) even when nothing was authorized, so a run always leaves a record.
pub fn write_csv(path: &Path, authorized: &AggregateResult, info_dir: &Path) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .with_context(|| format!("failed to create output file: {}", path.display()))?;
    // Explicit header so an empty aggregate still leaves a well-formed file.
    writer.write_record(["target", "info_file", "metadata_bytes"])?;
    for (target, metadata) in authorized {
        writer.serialize(AuthorizedRecord {
            target,
            info_file: info_dir.join(safe_filename(target)).display().to_string(),
            metadata_bytes: metadata.len(),
        })?;
    }
    writer.flush()?;
    Ok(())
}

/// Dump each authorized target's raw RootDSE text to `<info_dir>/<target>`.
/// Returns the number of files written.
pub fn write_info_files(info_dir: &Path, authorized: &AggregateResult) -> Result<usize> {
    if authorized.is_empty() {
        return Ok(0);
    }
    std::fs::create_dir_all(info_dir)
        .with_context(|| format!("failed to create info dir: {}", info_dir.display()))?;
    let mut written = 0;
    for (target, metadata) in authorized {
        let path = info_dir.join(safe_filename(target));
        std::fs::write(&path, metadata)
            .with_context(|| format!("failed to write {}", path.display()))?;
        written += 1;
    }
    Ok(written)
}

/// Reduce a target string to a filesystem-safe filename. Hostnames and IPs
/// pass through unchanged; anything else becomes `_`.
fn safe_filename(target: &str) -> String {
    target
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ErrorKind, ProbeError};
    use std::time::Duration;

    #[test]
    fn progress_lines_are_single_line() {
        let outcomes = [
            ProbeOutcome::Authorized {
                metadata: "namingContexts: dc=example,dc=com\n".into(),
                elapsed: Duration::from_millis(420),
            },
            ProbeOutcome::Denied {
                elapsed: Duration::from_millis(10),
            },
            ProbeOutcome::Failed {
                error: ProbeError::new(ErrorKind::Connection, "refused\nextra"),
                elapsed: Duration::from_millis(5),
            },
        ];
        for outcome in &outcomes {
            let line = format_progress(0, "ldap.example.com", outcome);
            assert!(!line.contains('\n'), "torn line: {line:?}");
        }
    }

    #[test]
    fn progress_line_mentions_target_and_worker() {
        let outcome = ProbeOutcome::Denied {
            elapsed: Duration::from_millis(1500),
        };
        let line = format_progress(2, "dc01.corp.local", &outcome);
        assert!(line.contains("worker 3"));
        assert!(line.contains("dc01.corp.local"));
        assert!(line.contains("1.50s"));
    }

    #[test]
    fn safe_filename_keeps_hostnames() {
        assert_eq!(safe_filename("ldap-1.example.com"), "ldap-1.example.com");
        assert_eq!(safe_filename("fe80::1%eth0"), "fe80__1_eth0");
    }

    #[test]
    fn empty_aggregate_still_writes_header() {
        let path =
            std::env::temp_dir().join(format!("ldap-sweep-empty-{}.csv", std::process::id()));
        write_csv(&path, &AggregateResult::new(), Path::new("info")).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(content.trim(), "target,info_file,metadata_bytes");
    }

    #[test]
    fn default_output_is_csv() {
        let path = default_output_path();
        assert!(path.to_string_lossy().ends_with(".csv"));
        assert!(path.to_string_lossy().starts_with("ldap-sweep-"));
    }
}
