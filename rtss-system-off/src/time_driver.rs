// Copyright Claudio Mattera 2024.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! SysTick-based time driver for `embassy-time`
//!
//! There is no vendor HAL for this SoC, so the firmware carries its own
//! driver: SysTick fires at the tick rate, a 64-bit tick counter extends
//! the hardware counter, and a single alarm serves the generic timer
//! queue. SysTick stops in the OFF state, which is irrelevant here since
//! waking from it goes through the reset vector anyway.

use core::cell::Cell;
use core::mem;
use core::ptr;
use core::sync::atomic::AtomicBool;
use core::sync::atomic::Ordering;

use cortex_m::peripheral::syst::SystClkSource;
use cortex_m::peripheral::SYST;

use cortex_m_rt::exception;

use critical_section::Mutex;

use embassy_time_driver::AlarmHandle;
use embassy_time_driver::Driver;

/// CPU cycles per timer tick
const CYCLES_PER_TICK: u32 = (crate::CPU_CLOCK_HZ as u64 / embassy_time_driver::TICK_HZ) as u32;

/// State of the single alarm
struct AlarmState {
    /// Tick at which the alarm fires, or `u64::MAX` when unset
    timestamp: Cell<u64>,

    /// Callback invoked when the alarm fires
    ///
    /// This is really an `Option<fn(*mut ())>`, but function pointers are
    /// not allowed in const initializers yet.
    callback: Cell<*const ()>,

    /// Context passed to the callback
    context: Cell<*mut ()>,
}

impl AlarmState {
    /// Create an unset alarm
    const fn new() -> Self {
        Self {
            timestamp: Cell::new(u64::MAX),
            callback: Cell::new(ptr::null()),
            context: Cell::new(ptr::null_mut()),
        }
    }
}

// SAFETY:
// The alarm state is only accessed within critical sections
unsafe impl Send for AlarmState {}

/// The SysTick time driver
struct SystickDriver {
    /// Ticks elapsed since the driver started
    ticks: Mutex<Cell<u64>>,

    /// Whether the single alarm has been handed out
    alarm_taken: AtomicBool,

    /// The single alarm
    alarm: Mutex<AlarmState>,
}

embassy_time_driver::time_driver_impl!(static DRIVER: SystickDriver = SystickDriver {
    ticks: Mutex::new(Cell::new(0)),
    alarm_taken: AtomicBool::new(false),
    alarm: Mutex::new(AlarmState::new()),
});

impl SystickDriver {
    /// Start the hardware counter at the tick rate
    fn start(&self, mut systick: SYST) {
        systick.set_clock_source(SystClkSource::Core);
        systick.set_reload(CYCLES_PER_TICK - 1);
        systick.clear_current();
        systick.enable_interrupt();
        systick.enable_counter();
    }

    /// Advance the tick counter and fire the alarm if it is due
    fn on_interrupt(&self) {
        critical_section::with(|cs| {
            let ticks = self.ticks.borrow(cs);
            let now = ticks.get().wrapping_add(1);
            ticks.set(now);

            let alarm = self.alarm.borrow(cs);
            if alarm.timestamp.get() > now {
                return;
            }
            alarm.timestamp.set(u64::MAX);

            let callback = alarm.callback.get();
            if callback.is_null() {
                return;
            }
            // SAFETY:
            // Only valid function pointers are stored by set_alarm_callback
            let callback: fn(*mut ()) = unsafe { mem::transmute(callback) };
            callback(alarm.context.get());
        });
    }
}

impl Driver for SystickDriver {
    fn now(&self) -> u64 {
        critical_section::with(|cs| self.ticks.borrow(cs).get())
    }

    unsafe fn allocate_alarm(&self) -> Option<AlarmHandle> {
        if self.alarm_taken.swap(true, Ordering::AcqRel) {
            None
        } else {
            Some(AlarmHandle::new(0))
        }
    }

    fn set_alarm_callback(&self, _alarm: AlarmHandle, callback: fn(*mut ()), context: *mut ()) {
        critical_section::with(|cs| {
            let alarm = self.alarm.borrow(cs);
            alarm.callback.set(callback as *const ());
            alarm.context.set(context);
        });
    }

    fn set_alarm(&self, _alarm: AlarmHandle, timestamp: u64) -> bool {
        critical_section::with(|cs| {
            let now = self.ticks.borrow(cs).get();
            let alarm = self.alarm.borrow(cs);
            if timestamp <= now {
                // The alarm would fire in the past; report that so the
                // queue polls again immediately.
                alarm.timestamp.set(u64::MAX);
                false
            } else {
                alarm.timestamp.set(timestamp);
                true
            }
        })
    }
}

/// Hand the SysTick peripheral to the time driver
pub fn init(systick: SYST) {
    DRIVER.start(systick);
}

#[exception]
fn SysTick() {
    DRIVER.on_interrupt();
}
