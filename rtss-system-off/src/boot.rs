// Copyright Claudio Mattera 2024.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Fixed-order early boot phases
//!
//! These phases run first thing in `main`, before any device driver is
//! touched, in the order they are declared here. Their side effects and
//! saved values live in a single [`BootContext`] so the ordering
//! dependencies between phases stay visible.

use cortex_m::peripheral::NVIC;
use cortex_m::peripheral::SCB;

use ensemble_pm_rs::Platform;

use crate::lprtc::LprtcInterrupt;
use crate::registers;

/// Process-wide mutable state produced by the early boot phases
pub struct BootContext {
    /// Host power request value before the early override
    saved_power_request: u32,

    /// Whether the wakeup interrupt was pending at boot
    wakeup_pending: bool,
}

impl BootContext {
    /// Create an empty context; the phases fill it in
    #[must_use]
    pub fn new() -> Self {
        Self {
            saved_power_request: 0,
            wakeup_pending: false,
        }
    }

    /// Force the host subsystem top on, saving the previous request
    ///
    /// After a wake from sleep the enclave restores subsystem power much
    /// later in boot than peripheral setup needs it, so the firmware
    /// requests it directly and hands control back once the enclave is
    /// reachable.
    pub fn force_subsystem_power_on(&mut self) {
        self.saved_power_request = registers::read(registers::HOST_BSYS_PWR_REQ);
        registers::write(
            registers::HOST_BSYS_PWR_REQ,
            self.saved_power_request | registers::SYSTOP_LOGIC_ON_MEM_ON,
        );
    }

    /// Route the high-frequency oscillator to the console UART
    ///
    /// Must run before the console driver configures the peripheral.
    pub fn enable_console_clock(&mut self) {
        registers::set_bits(registers::CGU_CLK_ENA, registers::CLK_ENA_HFOSC);
        registers::clear_bits(
            registers::EXPSLV_UART_CTRL,
            1 << (registers::CONSOLE_UART_INDEX + registers::UART_CLK_SEL_SHIFT),
        );
    }

    /// Record whether the wakeup interrupt is pending
    ///
    /// A pending wakeup line at boot means this is a resume from sleep
    /// rather than a cold start. The flag is only ever used for a
    /// diagnostic message.
    pub fn capture_wakeup_reason(&mut self) {
        self.wakeup_pending = NVIC::is_pending(LprtcInterrupt);
    }

    /// Return whether the wakeup interrupt was pending at boot
    #[must_use]
    pub fn wakeup_pending(&self) -> bool {
        self.wakeup_pending
    }
}

impl Default for BootContext {
    fn default() -> Self {
        Self::new()
    }
}

impl Platform for BootContext {
    fn vtor(&self) -> u32 {
        // SAFETY:
        // Reading the vector table offset register has no side effects
        unsafe { (*SCB::PTR).vtor.read() }
    }

    fn restore_early_power_override(&mut self) {
        registers::write(registers::HOST_BSYS_PWR_REQ, self.saved_power_request);
    }
}
