use color_eyre::owo_colors::{OwoColorize, Style};
use env_logger::Env;
use log::{Level, LevelFilter, Record};
use std::io::Write;
use std::path::Path;

fn filename_maybe(path: &str) -> Option<String> {
  Path::new(path)
    .file_name()
    .map(|name| name.to_string_lossy().to_string())
}

fn get_file_line(record: &Record) -> String {
  let file = record.file().and_then(filename_maybe);
  match (file, record.line()) {
    (Some(file), None) => format!("{file}:"),
    (Some(file), Some(line)) => format!("{file}:{line}:"),
    _ => String::new(),
  }
  .dimmed()
  .to_string()
}

fn color_log_level(record: &Record) -> String {
  let mut level_str = record.level().to_string();
  level_str.truncate(1);
  let level_str = match record.level() {
    Level::Error => level_str.red().to_string(),
    Level::Warn => level_str.yellow().to_string(),
    Level::Info => level_str.cyan().dimmed().to_string(),
    Level::Debug => level_str.green().dimmed().to_string(),
    Level::Trace => level_str.dimmed().to_string(),
  };
  format!("{}{level_str}{}", "[".dimmed(), "]".dimmed())
}

/// Compact colored log lines: `[L] file.rs:42: message`. `RUST_LOG` still narrows per-module filters.
///
/// A logger which is already installed is kept: the second call is only reported at debug level.
pub fn setup_logger(filter_level: LevelFilter) {
  let installed = env_logger::Builder::from_env(Env::default().default_filter_or("warn"))
    .filter_level(filter_level)
    .format(|buf, record| {
      let level = color_log_level(record);
      let file_line = get_file_line(record);
      let args = record.args();
      writeln!(buf, "{level} {file_line} {args}")?;
      Ok(())
    })
    .try_init();

  if let Err(err) = installed {
    log::debug!("Logger was already initialized, keeping it: {err}");
  }
}

pub fn global_init() {
  let installed = color_eyre::config::HookBuilder::default()
    .theme(
      color_eyre::config::Theme::dark()
        .dependency_code(Style::new().dimmed())
        .file(Style::new().green())
        .line_number(Style::new().yellow())
        .panic_file(Style::new().green())
        .panic_line_number(Style::new().yellow())
        .panic_message(Style::new().bright_red().bold())
        .active_line(Style::new().cyan())
        .hidden_frames(Style::new().dimmed())
        .code_hash(Style::new().hidden()),
    )
    .panic_section(format!(
      "If you think it's a bug, consider reporting at: '{}/issues'",
      env!("CARGO_PKG_REPOSITORY"),
    ))
    .add_frame_filter(Box::new(|frames| {
      frames.retain(|frame| {
        frame.name.as_ref().map_or(false, |name| {
          !HIDDEN_CRATE_NAME_PREFIXES
            .iter()
            .any(|&prefix| name.starts_with(prefix) || name.starts_with(&format!("<{prefix}")))
        })
      });
    }))
    .install();

  if let Err(report) = installed {
    log::warn!("Error reporting hook was already installed: {report}");
  }
}

const HIDDEN_CRATE_NAME_PREFIXES: &[&str] = &[
  "__rust_try",
  "alloc::",
  "color_eyre::",
  "core::",
  "eyre::",
  "ndarray::",
  "ndarray_linalg::",
  "rustc::",
  "std::",
];

#[cfg(test)]
mod tests {
  use super::*;
  use rstest::rstest;

  #[rstest]
  fn repeated_logger_setup_keeps_first_logger() {
    setup_logger(LevelFilter::Warn);
    let level = log::max_level();
    setup_logger(LevelFilter::Trace);
    assert_eq!(log::max_level(), level);
  }

  #[rstest]
  fn repeated_hook_installation_does_not_panic() {
    global_init();
    global_init();
  }
}
