// Copyright Claudio Mattera 2024.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Driver for the low-power RTC used as the wakeup source
//!
//! The counter lives in the always-on domain and keeps running through the
//! subsystem OFF state. Its match interrupt is left unmasked so the
//! external wakeup controller sees the event and powers the subsystem back
//! up; the core itself never vectors into it.

use cortex_m::interrupt::InterruptNumber;

use ensemble_pm_rs::TimerError;
use ensemble_pm_rs::WakeupTimer;

use crate::registers;

/// Offset of the current counter value register
const CCVR: usize = 0x00;

/// Offset of the counter match register
const CMR: usize = 0x04;

/// Offset of the counter load register
const CLR: usize = 0x08;

/// Offset of the counter control register
const CCR: usize = 0x0c;

/// Interrupt enable bit of the control register
const CCR_IEN: u32 = 1 << 0;

/// Counter enable bit of the control register
const CCR_EN: u32 = 1 << 2;

/// Wrap enable bit of the control register
const CCR_WEN: u32 = 1 << 3;

/// Pattern written to probe the match register
const PROBE_PATTERN: u32 = 0x5a5a_5a5a;

/// Number of counter reads to wait for the first tick after starting
///
/// The counter runs at 32.768 kHz, so one tick is about 30 µs; the budget
/// covers that comfortably at the highest CPU clock.
const START_CHECK_BUDGET: u32 = 1_000_000;

/// The interrupt line of the low-power RTC
#[derive(Clone, Copy)]
pub struct LprtcInterrupt;

// SAFETY:
// The number matches the LPRTC entry of the SoC vector table
unsafe impl InterruptNumber for LprtcInterrupt {
    fn number(self) -> u16 {
        58
    }
}

/// The low-power RTC counter
pub struct Lprtc {
    /// Base address of the register block
    base: usize,
}

impl Lprtc {
    /// Create a driver over a register block
    #[must_use]
    pub fn new(base: usize) -> Self {
        Self { base }
    }
}

impl WakeupTimer for Lprtc {
    fn is_ready(&mut self) -> bool {
        registers::write(self.base + CMR, PROBE_PATTERN);
        let ready = registers::read(self.base + CMR) == PROBE_PATTERN;
        registers::write(self.base + CMR, 0);
        ready
    }

    fn start(&mut self, ticks: u32) -> Result<(), TimerError> {
        registers::write(self.base + CLR, 0);
        registers::write(self.base + CMR, ticks);
        registers::write(self.base + CCR, CCR_WEN | CCR_EN | CCR_IEN);

        // The counter is clocked from the always-on domain; verify it
        // actually advances before reporting success.
        let initial = registers::read(self.base + CCVR);
        for _ in 0..START_CHECK_BUDGET {
            if registers::read(self.base + CCVR) != initial {
                return Ok(());
            }
        }

        Err(TimerError)
    }
}
