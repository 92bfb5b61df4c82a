// Copyright Claudio Mattera 2024-2025.
//
// Distributed under the MIT License or the Apache 2.0 License at your option.
// See the accompanying files LICENSE-MIT.txt and LICENSE-APACHE-2.0.txt, or
// online at
// https://opensource.org/licenses/MIT
// https://opensource.org/licenses/Apache-2.0

//! The subsystem-OFF entry sequence
//!
//! The sequence runs once per boot: check that the console and the wakeup
//! counter are usable, configure the RUN profile, configure the OFF
//! profile, arm the wakeup counter and finally release the sleep-state
//! lock taken in early boot. RUN-profile failures are deliberately not
//! fatal: the subsystem keeps running on firmware defaults. OFF-profile
//! failures are fatal, since committing to sleep with a wrong OFF profile
//! could leave the subsystem unable to wake.

use log::info;
use log::warn;

use crate::error::Error;
use crate::policy::SleepState;
use crate::policy::StatePolicy;
use crate::profile::retained_memory_blocks;
use crate::profile::ClockSource;
use crate::profile::CoreTier;
use crate::profile::CpuClockFrequency;
use crate::profile::DcdcMode;
use crate::profile::EwicSources;
use crate::profile::MemoryBlocks;
use crate::profile::PowerDomains;
use crate::profile::WakeupEvents;
use crate::service::SeService;
use crate::service::Transport;

/// Power domains requested while the subsystem is running
const RUN_POWER_DOMAINS: PowerDomains = PowerDomains::SYST.union(PowerDomains::SSE700_AON);

/// DC-DC converter target voltage in millivolts while running
const RUN_DCDC_MILLIVOLTS: u16 = 825;

/// A countdown device able to wake the subsystem from the OFF state
pub trait WakeupTimer {
    /// Return whether the device passed its readiness check
    fn is_ready(&mut self) -> bool;

    /// Start counting; the device fires after the given number of ticks
    ///
    /// # Errors
    ///
    /// Returns an error if the counter could not be started
    fn start(&mut self, ticks: u32) -> Result<(), TimerError>;
}

/// A failure to start the wakeup counter
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimerError;

/// Access to the couple of platform facts the sequence depends on
pub trait Platform {
    /// Return the current vector table base
    fn vtor(&self) -> u32;

    /// Hand power-request control back to the enclave-driven path
    ///
    /// Undoes the forced subsystem-on override applied in early boot; only
    /// called once the enclave has proven reachable.
    fn restore_early_power_override(&mut self);
}

/// Build-time selected parameters of the sequence
pub struct SequenceConfig {
    /// Memory tier of the core running this firmware
    pub tier: CoreTier,

    /// CPU clock frequency to request in the RUN profile
    pub cpu_clk_freq: CpuClockFrequency,

    /// Power domains to keep during sleep, selecting the sleep depth
    pub sleep_domains: PowerDomains,

    /// External wakeup controller sources to arm
    pub ewic_cfg: EwicSources,

    /// Events allowed to wake the subsystem
    pub wakeup_events: WakeupEvents,

    /// SRAM blocks the application wants retained when possible
    pub app_retained_blocks: MemoryBlocks,

    /// Countdown ticks until the wakeup interrupt fires
    pub wakeup_ticks: u32,
}

/// Configure both power profiles, arm the wakeup counter, release the lock
///
/// This is the whole entry sequence short of the final blocking sleep. On
/// success the sleep-state lock taken in early boot has been released and
/// the caller only has to stay off the CPU long enough for the sleep
/// commit to happen. On failure the lock is still held and the subsystem
/// stays awake.
///
/// # Errors
///
/// Returns an error if a device readiness check fails, if the OFF profile
/// cannot be read, validated or written, or if the wakeup counter cannot
/// be started.
pub fn configure_and_arm<T, W, P>(
    service: &mut SeService<T>,
    wakeup_timer: &mut W,
    platform: &mut P,
    policy: &StatePolicy,
    console_ready: bool,
    config: &SequenceConfig,
) -> Result<(), Error>
where
    T: Transport,
    W: WakeupTimer,
    P: Platform,
{
    if !console_ready {
        return Err(Error::ConsoleNotReady);
    }
    if !wakeup_timer.is_ready() {
        return Err(Error::WakeupTimerNotReady);
    }

    configure_run_profile(service, platform, config);
    configure_off_profile(service, platform, config)?;

    wakeup_timer
        .start(config.wakeup_ticks)
        .map_err(|_error| Error::TimerStart)?;

    // Only now is it safe for the idle path to power the subsystem down.
    policy.unlock(SleepState::SubsystemOff);

    Ok(())
}

/// Configure the RUN profile, continuing on firmware defaults on failure
fn configure_run_profile<T, P>(service: &mut SeService<T>, platform: &mut P, config: &SequenceConfig)
where
    T: Transport,
    P: Platform,
{
    if let Err(error) = service.sync() {
        warn!("Secure Enclave not responding to service calls: {error:?}");
        return;
    }

    let mut profile = match service.run_profile() {
        Ok(profile) => profile,
        Err(error) => {
            warn!("Could not read the RUN profile: {error:?}");
            return;
        }
    };

    profile.power_domains = RUN_POWER_DOMAINS;
    profile.dcdc_voltage = RUN_DCDC_MILLIVOLTS;
    profile.dcdc_mode = DcdcMode::Pwm;
    profile.aon_clk_src = ClockSource::Lfxo;
    profile.run_clk_src = ClockSource::Pll;
    profile.cpu_clk_freq = config.cpu_clk_freq;
    if platform.vtor() != 0 {
        // Executing from MRAM; keep the code region powered.
        profile.memory_blocks |= MemoryBlocks::MRAM;
    }

    if let Err(error) = service.set_run_profile(&profile) {
        warn!("Could not write the RUN profile: {error:?}");
        return;
    }

    platform.restore_early_power_override();
}

/// Configure the OFF profile; any failure here is fatal
fn configure_off_profile<T, P>(
    service: &mut SeService<T>,
    platform: &mut P,
    config: &SequenceConfig,
) -> Result<(), Error>
where
    T: Transport,
    P: Platform,
{
    let mut profile = service.off_profile().map_err(Error::OffProfileRead)?;

    let vtor_address = platform.vtor();

    profile.power_domains = config.sleep_domains;
    profile.aon_clk_src = ClockSource::Lfxo;
    profile.stby_clk_src = ClockSource::Hfxo;
    profile.ewic_cfg = config.ewic_cfg;
    profile.wakeup_events = config.wakeup_events;
    profile.vtor_address = vtor_address;
    profile.memory_blocks =
        retained_memory_blocks(config.tier, vtor_address, config.app_retained_blocks)?;

    info!("Resume address is {vtor_address:#010x}");
    info!("Retained memory blocks are {:?}", profile.memory_blocks);

    service
        .set_off_profile(&profile)
        .map_err(Error::OffProfileWrite)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::vec::Vec;

    use crate::profile::OffProfile;
    use crate::profile::RetentionError;
    use crate::profile::RunProfile;
    use crate::service::Error as ServiceError;
    use crate::service::ServiceId;
    use crate::service::TransportError;

    /// How a scripted call should fail
    #[derive(Clone, Copy)]
    enum Failure {
        /// The mailbox exchange itself fails
        Transport,

        /// The exchange succeeds with a non-zero status word
        Status,
    }

    /// A scripted mailbox answering with firmware-default profiles
    struct ScriptedTransport {
        /// Calls seen so far
        calls: Vec<ServiceId>,

        /// Requests seen so far
        requests: Vec<(ServiceId, Vec<u32>)>,

        /// Call that should fail, if any
        fail_on: Option<(ServiceId, Failure)>,
    }

    impl ScriptedTransport {
        /// Create a mailbox where every call succeeds
        fn new() -> Self {
            Self {
                calls: Vec::new(),
                requests: Vec::new(),
                fail_on: None,
            }
        }

        /// Create a mailbox where one call fails
        fn failing_on(id: ServiceId, failure: Failure) -> Self {
            let mut transport = Self::new();
            transport.fail_on = Some((id, failure));
            transport
        }

        /// Return the request words of the single recorded call with an id
        fn request(&self, id: ServiceId) -> &[u32] {
            let mut matching = self.requests.iter().filter(|(seen, _)| *seen == id);
            let (_, words) = matching.next().unwrap();
            words
        }
    }

    impl Transport for ScriptedTransport {
        fn call(
            &mut self,
            id: ServiceId,
            request: &[u32],
            response: &mut [u32],
        ) -> Result<(), TransportError> {
            self.calls.push(id);
            self.requests.push((id, request.to_vec()));

            if let Some((fail_id, failure)) = self.fail_on {
                if fail_id == id {
                    match failure {
                        Failure::Transport => return Err(TransportError::Timeout),
                        Failure::Status => {
                            response[0] = 0xffff_fffb;
                            return Ok(());
                        }
                    }
                }
            }

            response[0] = 0;
            let payload = match id {
                ServiceId::GetRunProfile => default_run_profile().encode().to_vec(),
                ServiceId::GetOffProfile => default_off_profile().encode().to_vec(),
                ServiceId::Heartbeat
                | ServiceId::SetRunProfile
                | ServiceId::SetOffProfile => Vec::new(),
            };
            for (slot, word) in response[1..].iter_mut().zip(payload.iter()) {
                *slot = *word;
            }
            Ok(())
        }
    }

    /// A wakeup counter double
    struct ScriptedTimer {
        /// Result of the readiness check
        ready: bool,

        /// Whether starting should fail
        fail: bool,

        /// Tick counts of successful starts
        started: Vec<u32>,
    }

    impl ScriptedTimer {
        /// Create a ready, working counter
        fn new() -> Self {
            Self {
                ready: true,
                fail: false,
                started: Vec::new(),
            }
        }
    }

    impl WakeupTimer for ScriptedTimer {
        fn is_ready(&mut self) -> bool {
            self.ready
        }

        fn start(&mut self, ticks: u32) -> Result<(), TimerError> {
            if self.fail {
                return Err(TimerError);
            }
            self.started.push(ticks);
            Ok(())
        }
    }

    /// A platform double
    struct ScriptedPlatform {
        /// Reported vector table base
        vtor: u32,

        /// Number of restore calls seen
        restores: u32,
    }

    impl ScriptedPlatform {
        /// Create a platform executing from the tightly-coupled memory
        fn new() -> Self {
            Self {
                vtor: 0,
                restores: 0,
            }
        }
    }

    impl Platform for ScriptedPlatform {
        fn vtor(&self) -> u32 {
            self.vtor
        }

        fn restore_early_power_override(&mut self) {
            self.restores += 1;
        }
    }

    /// Firmware-default RUN profile reported by the scripted enclave
    fn default_run_profile() -> RunProfile {
        RunProfile {
            power_domains: PowerDomains::SYST,
            dcdc_voltage: 800,
            dcdc_mode: DcdcMode::Pfm,
            aon_clk_src: ClockSource::Lfrc,
            run_clk_src: ClockSource::Hfrc,
            cpu_clk_freq: CpuClockFrequency::Clock76MHz,
            memory_blocks: MemoryBlocks::empty(),
        }
    }

    /// Firmware-default OFF profile reported by the scripted enclave
    fn default_off_profile() -> OffProfile {
        OffProfile {
            power_domains: PowerDomains::VBAT_AON,
            aon_clk_src: ClockSource::Lfrc,
            stby_clk_src: ClockSource::Hfrc,
            ewic_cfg: EwicSources::empty(),
            wakeup_events: WakeupEvents::empty(),
            vtor_address: 0,
            memory_blocks: MemoryBlocks::empty(),
        }
    }

    /// Sequence parameters of the high-efficiency test build
    fn test_config() -> SequenceConfig {
        SequenceConfig {
            tier: CoreTier::HighEfficiency,
            cpu_clk_freq: CpuClockFrequency::Clock160MHz,
            sleep_domains: PowerDomains::SSE700_AON,
            ewic_cfg: EwicSources::RTC_A,
            wakeup_events: WakeupEvents::LPRTC,
            app_retained_blocks: MemoryBlocks::SRAM4_1.union(MemoryBlocks::SRAM4_2),
            wakeup_ticks: 327_680,
        }
    }

    /// Create a policy holding the early-boot subsystem-OFF lock
    fn locked_policy() -> StatePolicy {
        let policy = StatePolicy::new();
        policy.lock(SleepState::SubsystemOff);
        policy
    }

    #[test]
    fn unready_console_halts_before_any_service_call() {
        let mut service = SeService::new(ScriptedTransport::new());
        let mut timer = ScriptedTimer::new();
        let mut platform = ScriptedPlatform::new();
        let policy = locked_policy();

        let result = configure_and_arm(
            &mut service,
            &mut timer,
            &mut platform,
            &policy,
            false,
            &test_config(),
        );

        assert_eq!(result, Err(Error::ConsoleNotReady));
        assert!(service.transport().calls.is_empty());
        assert!(timer.started.is_empty());
        assert!(policy.is_locked(SleepState::SubsystemOff));
    }

    #[test]
    fn unready_wakeup_timer_halts_before_any_service_call() {
        let mut service = SeService::new(ScriptedTransport::new());
        let mut timer = ScriptedTimer::new();
        timer.ready = false;
        let mut platform = ScriptedPlatform::new();
        let policy = locked_policy();

        let result = configure_and_arm(
            &mut service,
            &mut timer,
            &mut platform,
            &policy,
            true,
            &test_config(),
        );

        assert_eq!(result, Err(Error::WakeupTimerNotReady));
        assert!(service.transport().calls.is_empty());
        assert!(policy.is_locked(SleepState::SubsystemOff));
    }

    #[test]
    fn run_profile_read_failure_is_not_fatal() {
        let transport = ScriptedTransport::failing_on(ServiceId::GetRunProfile, Failure::Status);
        let mut service = SeService::new(transport);
        let mut timer = ScriptedTimer::new();
        let mut platform = ScriptedPlatform::new();
        let policy = locked_policy();

        let result = configure_and_arm(
            &mut service,
            &mut timer,
            &mut platform,
            &policy,
            true,
            &test_config(),
        );

        assert_eq!(result, Ok(()));
        assert_eq!(timer.started, [327_680]);
        assert!(!policy.is_locked(SleepState::SubsystemOff));
        assert!(service.transport().calls.contains(&ServiceId::GetOffProfile));
        assert!(service.transport().calls.contains(&ServiceId::SetOffProfile));
        assert_eq!(platform.restores, 0);
    }

    #[test]
    fn handshake_failure_leaves_the_early_override_in_place() {
        let transport = ScriptedTransport::failing_on(ServiceId::Heartbeat, Failure::Transport);
        let mut service = SeService::new(transport);
        let mut timer = ScriptedTimer::new();
        let mut platform = ScriptedPlatform::new();
        let policy = locked_policy();

        let result = configure_and_arm(
            &mut service,
            &mut timer,
            &mut platform,
            &policy,
            true,
            &test_config(),
        );

        assert_eq!(result, Ok(()));
        assert_eq!(platform.restores, 0);
        assert!(!service.transport().calls.contains(&ServiceId::GetRunProfile));
        assert!(!service.transport().calls.contains(&ServiceId::SetRunProfile));
    }

    #[test]
    fn off_profile_read_failure_is_fatal() {
        let transport = ScriptedTransport::failing_on(ServiceId::GetOffProfile, Failure::Transport);
        let mut service = SeService::new(transport);
        let mut timer = ScriptedTimer::new();
        let mut platform = ScriptedPlatform::new();
        let policy = locked_policy();

        let result = configure_and_arm(
            &mut service,
            &mut timer,
            &mut platform,
            &policy,
            true,
            &test_config(),
        );

        assert_eq!(
            result,
            Err(Error::OffProfileRead(ServiceError::Transport(
                TransportError::Timeout
            )))
        );
        assert!(!service.transport().calls.contains(&ServiceId::SetOffProfile));
        assert!(timer.started.is_empty());
        assert!(policy.is_locked(SleepState::SubsystemOff));
    }

    #[test]
    fn off_profile_write_failure_is_fatal() {
        let transport = ScriptedTransport::failing_on(ServiceId::SetOffProfile, Failure::Status);
        let mut service = SeService::new(transport);
        let mut timer = ScriptedTimer::new();
        let mut platform = ScriptedPlatform::new();
        let policy = locked_policy();

        let result = configure_and_arm(
            &mut service,
            &mut timer,
            &mut platform,
            &policy,
            true,
            &test_config(),
        );

        assert_eq!(
            result,
            Err(Error::OffProfileWrite(ServiceError::Status(-5)))
        );
        assert!(timer.started.is_empty());
        assert!(policy.is_locked(SleepState::SubsystemOff));
    }

    #[test]
    fn timer_start_failure_keeps_the_lock_held() {
        let mut service = SeService::new(ScriptedTransport::new());
        let mut timer = ScriptedTimer::new();
        timer.fail = true;
        let mut platform = ScriptedPlatform::new();
        let policy = locked_policy();

        let result = configure_and_arm(
            &mut service,
            &mut timer,
            &mut platform,
            &policy,
            true,
            &test_config(),
        );

        assert_eq!(result, Err(Error::TimerStart));
        assert!(timer.started.is_empty());
        assert!(policy.is_locked(SleepState::SubsystemOff));
    }

    #[test]
    fn success_restores_the_override_and_releases_the_lock() {
        let mut service = SeService::new(ScriptedTransport::new());
        let mut timer = ScriptedTimer::new();
        let mut platform = ScriptedPlatform::new();
        let policy = locked_policy();
        let config = test_config();

        let result = configure_and_arm(
            &mut service,
            &mut timer,
            &mut platform,
            &policy,
            true,
            &config,
        );

        assert_eq!(result, Ok(()));
        assert_eq!(platform.restores, 1);
        assert_eq!(timer.started, [config.wakeup_ticks]);
        assert!(!policy.is_locked(SleepState::SubsystemOff));

        let written = service.transport().request(ServiceId::SetOffProfile);
        let expected = MemoryBlocks::SRAM4_1 | MemoryBlocks::SRAM4_2 | MemoryBlocks::SERAM;
        assert_eq!(written[0], config.sleep_domains.bits());
        assert_eq!(written[5], 0);
        assert_eq!(written[6], expected.bits());
    }

    #[test]
    fn executing_from_mram_is_reflected_in_both_profiles() {
        let mut service = SeService::new(ScriptedTransport::new());
        let mut timer = ScriptedTimer::new();
        let mut platform = ScriptedPlatform::new();
        platform.vtor = 0x8000_0000;
        let policy = locked_policy();

        let result = configure_and_arm(
            &mut service,
            &mut timer,
            &mut platform,
            &policy,
            true,
            &test_config(),
        );

        assert_eq!(result, Ok(()));

        let run_written = service.transport().request(ServiceId::SetRunProfile);
        assert_eq!(
            run_written[6] & MemoryBlocks::MRAM.bits(),
            MemoryBlocks::MRAM.bits()
        );

        let off_written = service.transport().request(ServiceId::SetOffProfile);
        let expected = MemoryBlocks::MRAM | MemoryBlocks::SERAM;
        assert_eq!(off_written[5], 0x8000_0000);
        assert_eq!(off_written[6], expected.bits());
    }

    #[test]
    fn invalid_retention_aborts_before_the_profile_is_written() {
        let mut service = SeService::new(ScriptedTransport::new());
        let mut timer = ScriptedTimer::new();
        let mut platform = ScriptedPlatform::new();
        platform.vtor = 0x5000_0000;
        let policy = locked_policy();
        let mut config = test_config();
        config.tier = CoreTier::HighPerformance;

        let result = configure_and_arm(
            &mut service,
            &mut timer,
            &mut platform,
            &policy,
            true,
            &config,
        );

        assert_eq!(result, Err(Error::Retention(RetentionError::TcmExecution)));
        assert!(!service.transport().calls.contains(&ServiceId::SetOffProfile));
        assert!(timer.started.is_empty());
        assert!(policy.is_locked(SleepState::SubsystemOff));
    }
}
