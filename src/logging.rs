use log::{Level, LevelFilter, Metadata, Record};
use std::sync::OnceLock;
use std::time::Instant;

static BOOT_TIME: OnceLock<Instant> = OnceLock::new();

mod colors {
    pub const RESET: &str = "\x1b[0m";
    pub const BRIGHT_RED: &str = "\x1b[91m";
    pub const BRIGHT_YELLOW: &str = "\x1b[93m";
    pub const BRIGHT_GREEN: &str = "\x1b[92m";
    pub const BRIGHT_BLUE: &str = "\x1b[94m";
    pub const GRAY: &str = "\x1b[90m";
}

/// Console logger that prints colored, timestamped lines over serial
struct OtaLogger;

impl log::Log for OtaLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let elapsed = BOOT_TIME.get_or_init(Instant::now).elapsed();
        let ts = format_uptime(elapsed.as_secs(), elapsed.subsec_millis());

        let (color, level_char) = match record.level() {
            Level::Error => (colors::BRIGHT_RED, 'E'),
            Level::Warn => (colors::BRIGHT_YELLOW, 'W'),
            Level::Info => (colors::BRIGHT_GREEN, 'I'),
            Level::Debug => (colors::BRIGHT_BLUE, 'D'),
            Level::Trace => (colors::GRAY, 'T'),
        };
        let module = short_module(record.module_path());

        println!(
            "{}{} [{}] {:>12} | {}{}",
            color,
            ts,
            level_char,
            module,
            record.args(),
            colors::RESET
        );
    }

    fn flush(&self) {}
}

static LOGGER: OtaLogger = OtaLogger;

/// Install the console logger. Debug level until changed at runtime.
pub fn init_logger() -> Result<(), log::SetLoggerError> {
    let _ = BOOT_TIME.set(Instant::now());
    log::set_logger(&LOGGER)?;
    log::set_max_level(LevelFilter::Debug);
    Ok(())
}

/// Parse and set log level from a string; returns true if applied
pub fn set_max_level_from_str(level: &str) -> bool {
    match parse_level(level) {
        Some(lf) => {
            log::set_max_level(lf);
            true
        }
        None => false,
    }
}

fn parse_level(level: &str) -> Option<LevelFilter> {
    Some(match level.to_ascii_lowercase().as_str() {
        "off" => LevelFilter::Off,
        "error" => LevelFilter::Error,
        "warn" | "warning" => LevelFilter::Warn,
        "info" => LevelFilter::Info,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => return None,
    })
}

fn format_uptime(seconds: u64, millis: u32) -> String {
    if seconds < 60 {
        format!("{:>3}.{:03}s", seconds, millis)
    } else if seconds < 3600 {
        format!("{:>2}m{:02}s", seconds / 60, seconds % 60)
    } else {
        format!("{:>2}h{:02}m", seconds / 3600, (seconds % 3600) / 60)
    }
}

fn short_module(path: Option<&str>) -> &str {
    let module = path.and_then(|p| p.rsplit("::").next()).unwrap_or("unknown");
    match module.char_indices().nth(12) {
        Some((idx, _)) => &module[..idx],
        None => module,
    }
}
