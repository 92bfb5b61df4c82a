// Copyright Claudio Mattera 2024.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Main crate
//!
//! Demonstration firmware for the subsystem OFF state: configure the RUN
//! and OFF power profiles through the Secure Enclave, arm the low-power
//! RTC as the wakeup source, then get off the CPU and let the sleep-commit
//! task power the subsystem down. Waking from the OFF state goes through
//! the reset vector, so on success this firmware simply boots again.

#![no_std]
#![no_main]

use log::error;
use log::info;

use embassy_executor::Spawner;

use embassy_time::Duration;
use embassy_time::Timer;

use cortex_m::Peripherals as CorePeripherals;

use panic_halt as _;

use ensemble_pm_rs::configure_and_arm;
use ensemble_pm_rs::CoreTier;
use ensemble_pm_rs::CpuClockFrequency;
use ensemble_pm_rs::Error as SequenceError;
use ensemble_pm_rs::EwicSources;
use ensemble_pm_rs::MemoryBlocks;
use ensemble_pm_rs::PowerDomains;
use ensemble_pm_rs::SeService;
use ensemble_pm_rs::SequenceConfig;
use ensemble_pm_rs::SleepState;
use ensemble_pm_rs::StatePolicy;
use ensemble_pm_rs::WakeupEvents;

mod boot;
use self::boot::BootContext;

mod cell;

mod logging;
use self::logging::install_console;
use self::logging::setup as setup_logging;

mod lprtc;
use self::lprtc::Lprtc;

mod mhu;
use self::mhu::SeMailbox;

mod registers;

mod sleep;
use self::sleep::commit_task;

mod time_driver;

mod uart;
use self::uart::Uart;

#[cfg(all(feature = "rtss-he", feature = "rtss-hp"))]
compile_error!("Select only one of the `rtss-he` and `rtss-hp` features");

#[cfg(not(any(feature = "rtss-he", feature = "rtss-hp")))]
compile_error!("Select one of the `rtss-he` and `rtss-hp` features");

/// Sleep window in milliseconds
const DEEP_SLEEP_MILLISECONDS: u64 = 10_000;

/// Minimum residency the platform requires to commit to the OFF state
const MIN_RESIDENCY_MILLISECONDS: u64 = 500;

// The idle path only commits to the OFF state when it can stay there
// longer than the minimum residency.
const _: () = assert!(DEEP_SLEEP_MILLISECONDS > MIN_RESIDENCY_MILLISECONDS);

/// Sleep window given to the idle path to commit to the OFF state
const DEEP_SLEEP_DURATION: Duration = Duration::from_millis(DEEP_SLEEP_MILLISECONDS);

/// Period of the terminal diagnostic spin
const SPIN_PERIOD: Duration = Duration::from_millis(1);

/// Frequency of the low-power RTC in Hertz
const LPRTC_HZ: u64 = 32_768;

/// Ticks of the wakeup counter covering the sleep window
#[allow(clippy::cast_possible_truncation, reason = "The tick count fits 32 bits")]
const WAKEUP_TICKS: u32 = (DEEP_SLEEP_MILLISECONDS * LPRTC_HZ / 1_000) as u32;

/// Name of the subsystem this firmware is built for
#[cfg(feature = "rtss-hp")]
const SUBSYSTEM_NAME: &str = "RTSS-HP";

/// Name of the subsystem this firmware is built for
#[cfg(not(feature = "rtss-hp"))]
const SUBSYSTEM_NAME: &str = "RTSS-HE";

/// Memory tier of this subsystem
#[cfg(feature = "rtss-hp")]
const CORE_TIER: CoreTier = CoreTier::HighPerformance;

/// Memory tier of this subsystem
#[cfg(not(feature = "rtss-hp"))]
const CORE_TIER: CoreTier = CoreTier::HighEfficiency;

/// CPU clock frequency requested in the RUN profile
#[cfg(feature = "rtss-hp")]
const CPU_CLOCK_FREQUENCY: CpuClockFrequency = CpuClockFrequency::Clock400MHz;

/// CPU clock frequency requested in the RUN profile
#[cfg(not(feature = "rtss-hp"))]
const CPU_CLOCK_FREQUENCY: CpuClockFrequency = CpuClockFrequency::Clock160MHz;

/// CPU clock in Hertz, used by the time driver
pub const CPU_CLOCK_HZ: u32 = CPU_CLOCK_FREQUENCY.to_raw();

/// Power domains kept during sleep, selecting the sleep depth
#[cfg(feature = "stop-mode")]
const SLEEP_POWER_DOMAINS: PowerDomains = PowerDomains::VBAT_AON;

/// Power domains kept during sleep, selecting the sleep depth
#[cfg(not(feature = "stop-mode"))]
const SLEEP_POWER_DOMAINS: PowerDomains = PowerDomains::SSE700_AON;

/// SRAM blocks this application wants retained when possible
///
/// Blocks not in use can be removed to lower the sleep floor further.
const APP_RETAINED_BLOCKS: MemoryBlocks = MemoryBlocks::SRAM4_1
    .union(MemoryBlocks::SRAM4_2)
    .union(MemoryBlocks::SRAM5_1)
    .union(MemoryBlocks::SRAM5_2);

/// Sleep-state policy shared between the boot sequence and the commit task
static POLICY: StatePolicy = StatePolicy::new();

/// Main task
#[embassy_executor::main]
async fn main(spawner: Spawner) {
    // Early boot phases, in fixed order, before any driver is touched.
    let mut boot = BootContext::new();
    boot.force_subsystem_power_on();
    boot.enable_console_clock();
    boot.capture_wakeup_reason();
    POLICY.lock(SleepState::SubsystemOff);

    if let Err(error) = main_fallible(&spawner, boot).await {
        error!("Error while running firmware: {error:?}");
    }

    // Terminal diagnostic state: the subsystem is still awake, either
    // because the sequence halted early or because sleep never engaged.
    // Spin at low duty so the failure stays visible on the console.
    loop {
        Timer::after(SPIN_PERIOD).await;
    }
}

/// Main task that can return an error
async fn main_fallible(spawner: &Spawner, mut boot: BootContext) -> Result<(), Error> {
    let peripherals = CorePeripherals::take().ok_or(Error::Peripherals)?;

    time_driver::init(peripherals.SYST);

    setup_logging();

    let mut console = Uart::new(registers::CONSOLE_UART_BASE);
    console.initialize();
    let console_ready = console.is_ready();
    if console_ready {
        install_console(console);
    }

    info!("{SUBSYSTEM_NAME} System OFF Demo");

    if boot.wakeup_pending() {
        info!("Wakeup interrupt pending at boot: woken by the LPRTC");
    }

    // Parked on the policy until the lock taken in early boot is released.
    spawner.must_spawn(commit_task(&POLICY, peripherals.SCB));

    let mut wakeup_timer = Lprtc::new(registers::LPRTC_BASE);
    let mailbox = SeMailbox::new(
        registers::SE_MHU_SENDER_BASE,
        registers::SE_MHU_RECEIVER_BASE,
    );
    let mut service = SeService::new(mailbox);

    let config = SequenceConfig {
        tier: CORE_TIER,
        cpu_clk_freq: CPU_CLOCK_FREQUENCY,
        sleep_domains: SLEEP_POWER_DOMAINS,
        ewic_cfg: EwicSources::RTC_A,
        wakeup_events: WakeupEvents::LPRTC,
        app_retained_blocks: APP_RETAINED_BLOCKS,
        wakeup_ticks: WAKEUP_TICKS,
    };

    configure_and_arm(
        &mut service,
        &mut wakeup_timer,
        &mut boot,
        &POLICY,
        console_ready,
        &config,
    )?;

    info!("Subsystem may enter the OFF state when idle");
    info!("Sleep for {DEEP_SLEEP_MILLISECONDS} ms");

    Timer::after(DEEP_SLEEP_DURATION).await;

    // The wait returned, so the commit task never powered the subsystem
    // down.
    Err(Error::SleepNotEngaged)
}

/// An error
#[derive(Debug)]
enum Error {
    /// The core peripherals were already taken
    Peripherals,

    /// An error within the entry sequence
    #[expect(unused, reason = "Never read directly")]
    Sequence(SequenceError),

    /// The subsystem stayed powered through the whole sleep window
    SleepNotEngaged,
}

impl From<SequenceError> for Error {
    fn from(error: SequenceError) -> Self {
        Self::Sequence(error)
    }
}
