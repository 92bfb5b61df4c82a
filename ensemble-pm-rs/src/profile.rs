// Copyright Claudio Mattera 2024-2025.
//
// Distributed under the MIT License or the Apache 2.0 License at your option.
// See the accompanying files LICENSE-MIT.txt and LICENSE-APACHE-2.0.txt, or
// online at
// https://opensource.org/licenses/MIT
// https://opensource.org/licenses/Apache-2.0

//! RUN and OFF power profiles
//!
//! A profile is the unit of configuration exchanged with the Secure
//! Enclave: the RUN profile describes the subsystem while it executes, the
//! OFF profile describes what survives the subsystem-OFF state and what may
//! wake it. Profiles travel over the service mailbox as fixed-length arrays
//! of 32-bit words.

use bitflags::bitflags;

bitflags! {
    /// Power domains a profile may request to keep powered
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct PowerDomains: u32 {
        /// Battery-backed always-on domain
        const VBAT_AON = 1 << 0;

        /// Always-on domain of the SSE-700 subsystem
        const SSE700_AON = 1 << 1;

        /// System peripheral domain
        const SYST = 1 << 2;

        /// Secure Enclave subsystem domain
        const SESS = 1 << 3;

        /// Debug subsystem domain
        const DBSS = 1 << 4;

        /// Host subsystem top domain
        const SYSTOP = 1 << 5;
    }
}

bitflags! {
    /// Memory blocks that can be powered or retained
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct MemoryBlocks: u32 {
        /// Non-volatile MRAM code region
        const MRAM = 1 << 0;

        /// Secure Enclave scratch RAM
        const SERAM = 1 << 1;

        /// Lower half of SRAM4
        const SRAM4_1 = 1 << 2;

        /// Upper half of SRAM4
        const SRAM4_2 = 1 << 3;

        /// Lower half of SRAM5
        const SRAM5_1 = 1 << 4;

        /// Upper half of SRAM5
        const SRAM5_2 = 1 << 5;
    }
}

bitflags! {
    /// External wakeup interrupt controller sources
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct EwicSources: u32 {
        /// Low-power RTC, channel A
        const RTC_A = 1 << 0;

        /// Low-power timer
        const TIMER = 1 << 1;

        /// Low-power comparator
        const CMP = 1 << 2;

        /// Low-power GPIO
        const GPIO = 1 << 3;
    }
}

bitflags! {
    /// Wakeup events the Secure Enclave honors while the subsystem is off
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct WakeupEvents: u32 {
        /// Low-power RTC alarm
        const LPRTC = 1 << 0;

        /// Low-power timer expiry
        const LPTIMER = 1 << 1;

        /// Low-power comparator trigger
        const LPCMP = 1 << 2;

        /// Low-power GPIO edge
        const LPGPIO = 1 << 3;
    }
}

/// A clock source selectable in a power profile
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClockSource {
    /// Low-frequency RC oscillator
    Lfrc,

    /// Low-frequency crystal oscillator
    Lfxo,

    /// High-frequency RC oscillator
    Hfrc,

    /// High-frequency crystal oscillator
    Hfxo,

    /// System PLL
    Pll,
}

impl ClockSource {
    /// Return the wire encoding of this clock source
    #[must_use]
    pub const fn to_raw(self) -> u32 {
        match self {
            Self::Lfrc => 0,
            Self::Lfxo => 1,
            Self::Hfrc => 2,
            Self::Hfxo => 3,
            Self::Pll => 4,
        }
    }

    /// Parse a clock source from its wire encoding
    fn from_raw(raw: u32) -> Result<Self, DecodeError> {
        match raw {
            0 => Ok(Self::Lfrc),
            1 => Ok(Self::Lfxo),
            2 => Ok(Self::Hfrc),
            3 => Ok(Self::Hfxo),
            4 => Ok(Self::Pll),
            _ => Err(DecodeError),
        }
    }
}

/// A switching mode of the DC-DC converter
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DcdcMode {
    /// Converter disabled
    Off,

    /// Pulse-frequency modulation
    Pfm,

    /// Pulse-width modulation
    Pwm,
}

impl DcdcMode {
    /// Return the wire encoding of this mode
    #[must_use]
    pub const fn to_raw(self) -> u32 {
        match self {
            Self::Off => 0,
            Self::Pfm => 1,
            Self::Pwm => 2,
        }
    }

    /// Parse a mode from its wire encoding
    fn from_raw(raw: u32) -> Result<Self, DecodeError> {
        match raw {
            0 => Ok(Self::Off),
            1 => Ok(Self::Pfm),
            2 => Ok(Self::Pwm),
            _ => Err(DecodeError),
        }
    }
}

/// A CPU clock frequency tier
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CpuClockFrequency {
    /// 38.4 MHz crystal frequency
    Clock38MHz,

    /// 76.8 MHz doubled crystal frequency
    Clock76MHz,

    /// 160 MHz PLL frequency of the high-efficiency core
    Clock160MHz,

    /// 400 MHz PLL frequency of the high-performance core
    Clock400MHz,
}

impl CpuClockFrequency {
    /// Return the frequency in Hertz, which is also the wire encoding
    #[must_use]
    pub const fn to_raw(self) -> u32 {
        match self {
            Self::Clock38MHz => 38_400_000,
            Self::Clock76MHz => 76_800_000,
            Self::Clock160MHz => 160_000_000,
            Self::Clock400MHz => 400_000_000,
        }
    }

    /// Parse a frequency tier from its wire encoding
    fn from_raw(raw: u32) -> Result<Self, DecodeError> {
        match raw {
            38_400_000 => Ok(Self::Clock38MHz),
            76_800_000 => Ok(Self::Clock76MHz),
            160_000_000 => Ok(Self::Clock160MHz),
            400_000_000 => Ok(Self::Clock400MHz),
            _ => Err(DecodeError),
        }
    }
}

/// The operating configuration while the subsystem is active
///
/// Read from the Secure Enclave, selectively overridden and written back
/// once per boot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunProfile {
    /// Power domains requested while running
    pub power_domains: PowerDomains,

    /// DC-DC converter target voltage in millivolts
    pub dcdc_voltage: u16,

    /// DC-DC converter switching mode
    pub dcdc_mode: DcdcMode,

    /// Clock source of the always-on domain
    pub aon_clk_src: ClockSource,

    /// Clock source of the running core
    pub run_clk_src: ClockSource,

    /// CPU clock frequency tier
    pub cpu_clk_freq: CpuClockFrequency,

    /// Memory blocks requested to be powered
    pub memory_blocks: MemoryBlocks,
}

impl RunProfile {
    /// Number of payload words in the wire encoding
    pub const WORDS: usize = 7;

    /// Encode the profile into its service payload
    #[must_use]
    pub fn encode(&self) -> [u32; Self::WORDS] {
        [
            self.power_domains.bits(),
            u32::from(self.dcdc_voltage),
            self.dcdc_mode.to_raw(),
            self.aon_clk_src.to_raw(),
            self.run_clk_src.to_raw(),
            self.cpu_clk_freq.to_raw(),
            self.memory_blocks.bits(),
        ]
    }

    /// Decode a profile from its service payload
    ///
    /// # Errors
    ///
    /// Returns an error if any field does not hold a known encoding
    pub fn decode(words: &[u32; Self::WORDS]) -> Result<Self, DecodeError> {
        #[allow(clippy::cast_possible_truncation, reason = "Voltage is masked to 16 bits")]
        let dcdc_voltage = (words[1] & 0xffff) as u16;
        Ok(Self {
            power_domains: PowerDomains::from_bits_truncate(words[0]),
            dcdc_voltage,
            dcdc_mode: DcdcMode::from_raw(words[2])?,
            aon_clk_src: ClockSource::from_raw(words[3])?,
            run_clk_src: ClockSource::from_raw(words[4])?,
            cpu_clk_freq: CpuClockFrequency::from_raw(words[5])?,
            memory_blocks: MemoryBlocks::from_bits_truncate(words[6]),
        })
    }
}

/// The configuration applied when the subsystem enters the OFF state
///
/// The requested power domains select the sleep depth: keeping the
/// subsystem always-on domain powered yields a STANDBY-class sleep, while
/// dropping to the battery-backed domain yields a STOP-class sleep.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OffProfile {
    /// Power domains kept powered during sleep
    pub power_domains: PowerDomains,

    /// Clock source of the always-on domain during sleep
    pub aon_clk_src: ClockSource,

    /// Clock source used in standby
    pub stby_clk_src: ClockSource,

    /// External wakeup interrupt controller configuration
    pub ewic_cfg: EwicSources,

    /// Events allowed to wake the subsystem
    pub wakeup_events: WakeupEvents,

    /// Vector table base the core resumes from after waking
    pub vtor_address: u32,

    /// Memory blocks retained through sleep
    pub memory_blocks: MemoryBlocks,
}

impl OffProfile {
    /// Number of payload words in the wire encoding
    pub const WORDS: usize = 7;

    /// Encode the profile into its service payload
    #[must_use]
    pub fn encode(&self) -> [u32; Self::WORDS] {
        [
            self.power_domains.bits(),
            self.aon_clk_src.to_raw(),
            self.stby_clk_src.to_raw(),
            self.ewic_cfg.bits(),
            self.wakeup_events.bits(),
            self.vtor_address,
            self.memory_blocks.bits(),
        ]
    }

    /// Decode a profile from its service payload
    ///
    /// # Errors
    ///
    /// Returns an error if any field does not hold a known encoding
    pub fn decode(words: &[u32; Self::WORDS]) -> Result<Self, DecodeError> {
        Ok(Self {
            power_domains: PowerDomains::from_bits_truncate(words[0]),
            aon_clk_src: ClockSource::from_raw(words[1])?,
            stby_clk_src: ClockSource::from_raw(words[2])?,
            ewic_cfg: EwicSources::from_bits_truncate(words[3]),
            wakeup_events: WakeupEvents::from_bits_truncate(words[4]),
            vtor_address: words[5],
            memory_blocks: MemoryBlocks::from_bits_truncate(words[6]),
        })
    }
}

/// The memory tier of the core running this firmware
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CoreTier {
    /// High-efficiency core, whose tightly-coupled memory can be retained
    HighEfficiency,

    /// High-performance core, whose tightly-coupled memory cannot
    HighPerformance,
}

/// Select the memory blocks to retain through the OFF state
///
/// On the high-efficiency core a zero vector table base means the code runs
/// from the tightly-coupled memory, and the application-selected SRAM
/// blocks are retained together with the enclave scratch RAM; with a
/// nonzero base the code runs from MRAM and only MRAM and the scratch RAM
/// are kept. On the high-performance core the tightly-coupled memory
/// cannot be retained at all, so a vector table base pointing into it makes
/// the OFF profile invalid.
///
/// # Errors
///
/// Returns an error for the invalid tier/execution-region combination; the
/// caller must abort the sequence rather than commit a profile.
pub fn retained_memory_blocks(
    tier: CoreTier,
    vtor_address: u32,
    app_blocks: MemoryBlocks,
) -> Result<MemoryBlocks, RetentionError> {
    match tier {
        CoreTier::HighEfficiency => {
            if vtor_address == 0 {
                Ok(app_blocks | MemoryBlocks::SERAM)
            } else {
                Ok(MemoryBlocks::MRAM | MemoryBlocks::SERAM)
            }
        }
        CoreTier::HighPerformance => {
            if vtor_address == 0 {
                Ok(MemoryBlocks::MRAM)
            } else {
                Err(RetentionError::TcmExecution)
            }
        }
    }
}

/// A profile payload that could not be decoded
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DecodeError;

/// An invalid retention request
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetentionError {
    /// Code executes from a tightly-coupled memory that cannot be retained
    TcmExecution,
}

#[cfg(test)]
mod tests {
    use super::*;

    /// SRAM blocks a test application asks to retain
    const APP_BLOCKS: MemoryBlocks = MemoryBlocks::SRAM4_1
        .union(MemoryBlocks::SRAM4_2)
        .union(MemoryBlocks::SRAM5_1)
        .union(MemoryBlocks::SRAM5_2);

    #[test]
    fn retention_high_efficiency_from_tcm_keeps_app_blocks() {
        let blocks = retained_memory_blocks(CoreTier::HighEfficiency, 0, APP_BLOCKS);
        assert_eq!(blocks, Ok(APP_BLOCKS | MemoryBlocks::SERAM));
    }

    #[test]
    fn retention_high_efficiency_from_mram_keeps_code_region() {
        let blocks = retained_memory_blocks(CoreTier::HighEfficiency, 0x8000_0000, APP_BLOCKS);
        assert_eq!(blocks, Ok(MemoryBlocks::MRAM | MemoryBlocks::SERAM));
    }

    #[test]
    fn retention_high_performance_from_mram_keeps_code_region() {
        let blocks = retained_memory_blocks(CoreTier::HighPerformance, 0, APP_BLOCKS);
        assert_eq!(blocks, Ok(MemoryBlocks::MRAM));
    }

    #[test]
    fn retention_high_performance_from_tcm_is_invalid() {
        let blocks = retained_memory_blocks(CoreTier::HighPerformance, 0x5000_0000, APP_BLOCKS);
        assert_eq!(blocks, Err(RetentionError::TcmExecution));
    }

    #[test]
    fn run_profile_round_trips_through_wire_encoding() {
        let profile = RunProfile {
            power_domains: PowerDomains::SYST | PowerDomains::SSE700_AON,
            dcdc_voltage: 825,
            dcdc_mode: DcdcMode::Pwm,
            aon_clk_src: ClockSource::Lfxo,
            run_clk_src: ClockSource::Pll,
            cpu_clk_freq: CpuClockFrequency::Clock160MHz,
            memory_blocks: MemoryBlocks::MRAM,
        };

        let decoded = RunProfile::decode(&profile.encode());

        assert_eq!(decoded, Ok(profile));
    }

    #[test]
    fn off_profile_round_trips_through_wire_encoding() {
        let profile = OffProfile {
            power_domains: PowerDomains::SSE700_AON,
            aon_clk_src: ClockSource::Lfxo,
            stby_clk_src: ClockSource::Hfxo,
            ewic_cfg: EwicSources::RTC_A,
            wakeup_events: WakeupEvents::LPRTC,
            vtor_address: 0x8000_0000,
            memory_blocks: MemoryBlocks::MRAM | MemoryBlocks::SERAM,
        };

        let decoded = OffProfile::decode(&profile.encode());

        assert_eq!(decoded, Ok(profile));
    }

    #[test]
    fn unknown_clock_source_fails_to_decode() {
        let mut words = [0_u32; RunProfile::WORDS];
        words[3] = 99;

        assert_eq!(RunProfile::decode(&words), Err(DecodeError));
    }
}
