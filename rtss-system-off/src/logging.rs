// Copyright Claudio Mattera 2024.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Functions for setting up the logging system
//!
//! Records are written to the console UART once it has been installed;
//! records logged before that are dropped, like early boot messages on any
//! console.

use core::fmt::Write as _;
use core::str::FromStr;

use log::max_level;
use log::set_logger_racy;
use log::set_max_level_racy;
use log::trace;
use log::Level;
use log::LevelFilter;
use log::Log;
use log::Metadata;
use log::Record;

use crate::cell::SyncUnsafeCell;
use crate::uart::Uart;

/// The UART the logger writes to, once installed
static CONSOLE: SyncUnsafeCell<Option<Uart>> = SyncUnsafeCell::new(None);

/// Setup logging
///
/// To change the log level change the `env` section in `.cargo/config.toml`
/// or remove it and set the environment variable `RTSS_LOGLEVEL` manually
/// before running `cargo build`.
///
/// This requires a clean rebuild because of
/// <https://github.com/rust-lang/cargo/issues/10358>
pub fn setup() {
    /// Log level
    const LEVEL: Option<&'static str> = option_env!("RTSS_LOGLEVEL");

    // SAFETY:
    // Called once, before any interrupt handler logs
    let result = unsafe { set_logger_racy(&ConsoleLogger) };

    // SAFETY:
    // set_logger_racy cannot have been called before this point
    unsafe { result.unwrap_unchecked() };

    if let Some(level) = LEVEL {
        let level = LevelFilter::from_str(level).unwrap_or(LevelFilter::Off);

        // SAFETY:
        // Called once, before any interrupt handler logs
        unsafe { set_max_level_racy(level) };
    }

    trace!("Logger is ready");
}

/// Hand the console UART to the logger
pub fn install_console(uart: Uart) {
    // SAFETY:
    // Called once from thread mode, before any task logs concurrently
    unsafe {
        *CONSOLE.get() = Some(uart);
    }
}

/// Logger that prints messages to the console UART
struct ConsoleLogger;

impl Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= max_level()
    }

    fn log(&self, record: &Record) {
        /// Modifier for restoring normal text style
        const RESET: &str = "\u{001B}[0m";
        /// Modifier for setting gray text
        const GRAY: &str = "\u{001B}[2m";
        /// Modifier for setting red text
        const RED: &str = "\u{001B}[31m";
        /// Modifier for setting green text
        const GREEN: &str = "\u{001B}[32m";
        /// Modifier for setting yellow text
        const YELLOW: &str = "\u{001B}[33m";
        /// Modifier for setting blue text
        const BLUE: &str = "\u{001B}[34m";
        /// Modifier for setting cyan text
        const CYAN: &str = "\u{001B}[35m";

        let color = match record.level() {
            Level::Error => RED,
            Level::Warn => YELLOW,
            Level::Info => GREEN,
            Level::Debug => BLUE,
            Level::Trace => CYAN,
        };

        if self.enabled(record.metadata()) {
            // SAFETY:
            // Log records are only produced from thread mode on the single
            // core, so the console is never aliased
            let console = unsafe { CONSOLE.get().as_mut() };
            if let Some(Some(uart)) = console {
                writeln!(
                    uart,
                    "{}{:>5} {}{}{}{}]{} {}",
                    color,
                    record.level(),
                    RESET,
                    GRAY,
                    record.target(),
                    GRAY,
                    RESET,
                    record.args()
                )
                .ok();
            }
        }
    }

    fn flush(&self) {}
}
