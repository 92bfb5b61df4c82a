// Copyright Claudio Mattera 2024.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Fixed hardware register addresses and access helpers
//!
//! The handful of platform registers this firmware touches directly, with
//! their bit constants. Everything else goes through the Secure Enclave
//! services or a device driver module.

/// Host subsystem power request register
pub const HOST_BSYS_PWR_REQ: usize = 0x1A01_0400;

/// Logic-on and memory-on request for the host subsystem top
pub const SYSTOP_LOGIC_ON_MEM_ON: u32 = 0x20;

/// Clock enable register of the clock generation unit
pub const CGU_CLK_ENA: usize = 0x1A60_2014;

/// Enable bit of the high-frequency oscillator
pub const CLK_ENA_HFOSC: u32 = 1 << 23;

/// UART control register of the expansion slave block
pub const EXPSLV_UART_CTRL: usize = 0x4903_F008;

/// Lowest bit of the per-UART clock selection field
pub const UART_CLK_SEL_SHIFT: u32 = 8;

/// Index of the UART wired to the boot console
pub const CONSOLE_UART_INDEX: u32 = 4;

/// Register block of the console UART
pub const CONSOLE_UART_BASE: usize = 0x4900_4000;

/// Register block of the low-power RTC
pub const LPRTC_BASE: usize = 0x4290_0000;

/// Sender frame of the message handling unit toward the Secure Enclave
pub const SE_MHU_SENDER_BASE: usize = 0x1B80_0000;

/// Receiver frame of the message handling unit from the Secure Enclave
pub const SE_MHU_RECEIVER_BASE: usize = 0x1B81_0000;

/// Read a device register
#[must_use]
pub fn read(address: usize) -> u32 {
    // SAFETY:
    // The address is a device register that is always mapped
    unsafe { core::ptr::read_volatile(address as *const u32) }
}

/// Write a device register
pub fn write(address: usize, value: u32) {
    // SAFETY:
    // The address is a device register that is always mapped
    unsafe { core::ptr::write_volatile(address as *mut u32, value) }
}

/// Set bits in a device register
pub fn set_bits(address: usize, mask: u32) {
    write(address, read(address) | mask);
}

/// Clear bits in a device register
pub fn clear_bits(address: usize, mask: u32) {
    write(address, read(address) & !mask);
}
