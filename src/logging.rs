//! Logging configuration for the supervisor harness
//!
//! Uses log4rs with two appenders:
//! 1. ConsoleAppender - stdout output
//! 2. RollingFileAppender - log files with size-based rotation

use log::LevelFilter;
use log4rs::append::console::ConsoleAppender;
use log4rs::append::rolling_file::policy::compound::roll::fixed_window::FixedWindowRoller;
use log4rs::append::rolling_file::policy::compound::trigger::size::SizeTrigger;
use log4rs::append::rolling_file::policy::compound::CompoundPolicy;
use log4rs::append::rolling_file::RollingFileAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;
use std::path::PathBuf;

/// Max size per log file before rotation
const MAX_LOG_SIZE: u64 = 20 * 1024 * 1024;

/// Number of rotated files to keep
const MAX_LOG_FILES: u32 = 10;

/// Initialize log4rs with console and rolling file appenders.
///
/// Log files land in `log_dir` as `supervisor.log`, rotating into
/// `supervisor.N.log`.
pub fn init_logger(log_dir: PathBuf) -> Result<log4rs::Handle, Box<dyn std::error::Error>> {
    std::fs::create_dir_all(&log_dir)?;

    let console = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(
            "{d(%H:%M:%S)} [{l}] {t} - {m}{n}",
        )))
        .build();

    let roll_pattern = log_dir.join("supervisor.{}.log");
    let roller = FixedWindowRoller::builder()
        .build(&roll_pattern.to_string_lossy(), MAX_LOG_FILES)?;
    let trigger = SizeTrigger::new(MAX_LOG_SIZE);
    let policy = CompoundPolicy::new(Box::new(trigger), Box::new(roller));

    let logfile = RollingFileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(
            "{d(%Y-%m-%d %H:%M:%S)} [{l}] {t} - {m}{n}",
        )))
        .build(log_dir.join("supervisor.log"), Box::new(policy))?;

    let config = Config::builder()
        .appender(Appender::builder().build("console", Box::new(console)))
        .appender(Appender::builder().build("logfile", Box::new(logfile)))
        .build(
            Root::builder()
                .appender("console")
                .appender("logfile")
                .build(LevelFilter::Info),
        )?;

    Ok(log4rs::init_config(config)?)
}
