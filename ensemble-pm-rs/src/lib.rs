// Copyright Claudio Mattera 2024-2025.
//
// Distributed under the MIT License or the Apache 2.0 License at your option.
// See the accompanying files LICENSE-MIT.txt and LICENSE-APACHE-2.0.txt, or
// online at
// https://opensource.org/licenses/MIT
// https://opensource.org/licenses/Apache-2.0

//! Interface to the power services of the Alif Ensemble Secure Enclave
//!
//! The Secure Enclave is a companion processor that owns clock, voltage and
//! power-domain configuration for the real-time subsystems. This crate
//! models its RUN and OFF power profiles, a synchronous service client over
//! an application-provided mailbox transport, a reference-counted sleep-state
//! policy, and the ordered sequence a subsystem must follow to enter the
//! subsystem-OFF state.
//!
//! The crate is hardware independent: the mailbox transport, the wakeup
//! counter and the couple of platform registers involved are abstracted
//! behind traits, so the whole decision logic can be exercised on the host.

#![no_std]

#[cfg(any(feature = "std", test))]
extern crate std;

mod error;
pub use self::error::Error;

mod profile;
pub use self::profile::retained_memory_blocks;
pub use self::profile::ClockSource;
pub use self::profile::CoreTier;
pub use self::profile::CpuClockFrequency;
pub use self::profile::DcdcMode;
pub use self::profile::DecodeError;
pub use self::profile::EwicSources;
pub use self::profile::MemoryBlocks;
pub use self::profile::OffProfile;
pub use self::profile::PowerDomains;
pub use self::profile::RetentionError;
pub use self::profile::RunProfile;
pub use self::profile::WakeupEvents;

mod policy;
pub use self::policy::SleepState;
pub use self::policy::StatePolicy;

mod service;
pub use self::service::Error as ServiceError;
pub use self::service::SeService;
pub use self::service::ServiceId;
pub use self::service::Transport;
pub use self::service::TransportError;

mod sequence;
pub use self::sequence::configure_and_arm;
pub use self::sequence::Platform;
pub use self::sequence::SequenceConfig;
pub use self::sequence::TimerError;
pub use self::sequence::WakeupTimer;
