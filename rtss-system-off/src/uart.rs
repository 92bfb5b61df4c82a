// Copyright Claudio Mattera 2024.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Minimal driver for the DesignWare APB console UART
//!
//! Transmit only; the console is a diagnostic sink. The clock source is
//! routed to the high-frequency oscillator in early boot, before this
//! driver configures the peripheral.

use core::convert::Infallible;

use crate::registers;

/// Offset of the transmit holding register
const THR: usize = 0x00;

/// Offset of the divisor latch low register, visible while DLAB is set
const DLL: usize = 0x00;

/// Offset of the divisor latch high register, visible while DLAB is set
const DLH: usize = 0x04;

/// Offset of the FIFO control register
const FCR: usize = 0x08;

/// Offset of the line control register
const LCR: usize = 0x0c;

/// Offset of the line status register
const LSR: usize = 0x14;

/// Divisor latch access bit of the line control register
const LCR_DLAB: u32 = 1 << 7;

/// Line control value for 8 data bits, no parity, one stop bit
const LCR_8N1: u32 = 0x03;

/// FIFO enable bit of the FIFO control register
const FCR_FIFO_ENABLE: u32 = 1 << 0;

/// Transmit-holding-register-empty bit of the line status register
const LSR_THRE: u32 = 1 << 5;

/// Transmitter-empty bit of the line status register
const LSR_TEMT: u32 = 1 << 6;

/// Baud rate divisor for 115200 baud from the 38.4 MHz oscillator
const BAUD_DIVISOR: u32 = 21;

/// The console UART
pub struct Uart {
    /// Base address of the register block
    base: usize,
}

impl Uart {
    /// Create a driver over a register block
    #[must_use]
    pub fn new(base: usize) -> Self {
        Self { base }
    }

    /// Configure the line for 115200 baud, 8N1, with FIFOs enabled
    pub fn initialize(&mut self) {
        registers::write(self.base + LCR, LCR_DLAB);
        registers::write(self.base + DLL, BAUD_DIVISOR & 0xff);
        registers::write(self.base + DLH, BAUD_DIVISOR >> 8);
        registers::write(self.base + LCR, LCR_8N1);
        registers::write(self.base + FCR, FCR_FIFO_ENABLE);
    }

    /// Return whether the peripheral holds the configured line settings
    ///
    /// A read-back mismatch means the peripheral is absent or its clock is
    /// not running, so the console cannot be used.
    #[must_use]
    pub fn is_ready(&mut self) -> bool {
        registers::read(self.base + LCR) == LCR_8N1
    }

    /// Write one byte, waiting for space in the transmit FIFO
    fn write_byte(&mut self, byte: u8) {
        while registers::read(self.base + LSR) & LSR_THRE == 0 {}
        registers::write(self.base + THR, u32::from(byte));
    }

    /// Write bytes, expanding newlines to carriage return plus newline
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        for byte in bytes {
            if *byte == b'\n' {
                self.write_byte(b'\r');
            }
            self.write_byte(*byte);
        }
    }
}

impl embedded_io::ErrorType for Uart {
    type Error = Infallible;
}

impl embedded_io::Write for Uart {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.write_bytes(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        while registers::read(self.base + LSR) & LSR_TEMT == 0 {}
        Ok(())
    }
}

impl core::fmt::Write for Uart {
    fn write_str(&mut self, text: &str) -> core::fmt::Result {
        self.write_bytes(text.as_bytes());
        Ok(())
    }
}
