// Copyright Claudio Mattera 2024-2025.
//
// Distributed under the MIT License or the Apache 2.0 License at your option.
// See the accompanying files LICENSE-MIT.txt and LICENSE-APACHE-2.0.txt, or
// online at
// https://opensource.org/licenses/MIT
// https://opensource.org/licenses/Apache-2.0

//! Data structures and functions for error handling

use crate::profile::RetentionError;
use crate::service::Error as ServiceError;

/// An error
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Error {
    /// The console device failed its readiness check
    ConsoleNotReady,

    /// The wakeup counter device failed its readiness check
    WakeupTimerNotReady,

    /// The OFF profile could not be read from the Secure Enclave
    OffProfileRead(ServiceError),

    /// The OFF profile could not be written to the Secure Enclave
    OffProfileWrite(ServiceError),

    /// The OFF profile would retain an invalid memory configuration
    Retention(RetentionError),

    /// The wakeup counter could not be started
    TimerStart,
}

impl From<RetentionError> for Error {
    fn from(error: RetentionError) -> Self {
        Self::Retention(error)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

#[cfg(feature = "std")]
impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "{self:?}")
    }
}
