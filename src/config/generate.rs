//! Emits a starter configuration an operator can adapt: a parser model
//! for a common access-log line, the `NewMatchPath`/`TimestampsUnsorted`
//! detectors every deployment wants, and a stdout sink. Backs
//! `aminer-rs config init`, giving a fresh install something runnable
//! rather than an empty shell.

use std::io::Write as _;
use std::path::Path;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("io error writing starter config: {0}")]
    Io(#[from] std::io::Error),
}

const STARTER_CONFIG: &str = r#"Parser:
  - id: accesslog
    start: true
    type: sequence
    args: [host, sep1, user, sep2, time, sep3, status]
  - id: host
    type: variable_byte
    args: "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789.-"
  - id: sep1
    type: fixed
    args: " - "
  - id: user
    type: variable_byte
    args: "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789_"
  - id: sep2
    type: fixed
    args: " ["
  - id: time
    type: datetime
    date_formats: ["%d/%b/%Y:%H:%M:%S"]
  - id: sep3
    type: fixed
    args: "] "
  - id: status
    type: decimal_integer

Input:
  Sources:
    - id: access-log
      path: /var/log/app/access.log
  TimestampPath: accesslog/time

Analysis:
  - id: new-paths
    type: new_match_path
    auto_include_flag: true
  - id: unsorted-timestamps
    type: timestamps_unsorted
    auto_include_flag: true

EventHandlers:
  - id: console
    type: stdout
"#;

/// Writes the starter config to `path`, or to stdout when `to_stdout` is
/// set (matching `Commands::Config { action: Init { stdout } }`'s shape).
pub fn init(path: Option<&Path>, to_stdout: bool) -> Result<(), GenerateError> {
    if to_stdout || path.is_none() {
        print!("{}", STARTER_CONFIG);
        return Ok(());
    }
    let path = path.expect("checked above");
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::File::create(path)?;
    file.write_all(STARTER_CONFIG.as_bytes())?;
    Ok(())
}
