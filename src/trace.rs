// Copyright 2025 The pivmech Authors
// See LICENSE.txt file for terms

use std::fs::File;

use simplelog::{Config, LevelFilter, SimpleLogger, WriteLogger};

fn parse_level(level: &str) -> LevelFilter {
    match level {
        "off" => LevelFilter::Off,
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "info" => LevelFilter::Info,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Trace,
    }
}

fn level_from_env() -> LevelFilter {
    match std::env::var("PIVMECH_TRACE_LEVEL") {
        Err(_) => LevelFilter::Error,
        Ok(l) => parse_level(&l),
    }
}

/// Initializes a simple logger for tracing purposes based on the value of
/// the environment variable PIVMECH_TRACE:
/// - stdout -> logs to standard output
/// - file -> any other value is interpreted as a file name to log into
/// - NOT PRESENT -> No tracing is initialized
///
/// If the logger initialization encounters an error, (for example the log
/// file can't be opened) no tracing is available and no error is reported.
///
/// The level comes from PIVMECH_TRACE_LEVEL, one of off, error, warn,
/// info, debug, trace. It defaults to error; any other value selects
/// trace.
pub fn log_init() {
    let level = level_from_env();
    match std::env::var("PIVMECH_TRACE") {
        Err(_) => (),
        Ok(t) => match t.as_str() {
            "stdout" => {
                let _ = SimpleLogger::init(level, Config::default());
            }
            file_name => {
                let file = match File::create(file_name) {
                    Ok(w) => w,
                    Err(_) => return,
                };
                let _ = WriteLogger::init(level, Config::default(), file);
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("off"), LevelFilter::Off);
        assert_eq!(parse_level("warn"), LevelFilter::Warn);
        assert_eq!(parse_level("debug"), LevelFilter::Debug);
        assert_eq!(parse_level("verbose"), LevelFilter::Trace);
    }
}
