// Copyright Claudio Mattera 2024-2025.
//
// Distributed under the MIT License or the Apache 2.0 License at your option.
// See the accompanying files LICENSE-MIT.txt and LICENSE-APACHE-2.0.txt, or
// online at
// https://opensource.org/licenses/MIT
// https://opensource.org/licenses/Apache-2.0

//! Synchronous client for the Secure Enclave power services
//!
//! Every operation is one request/response exchange over a mailbox
//! transport. The first response word is the status code of the call; a
//! non-zero status signals failure. There are no retries.

use crate::profile::DecodeError;
use crate::profile::OffProfile;
use crate::profile::RunProfile;

/// Identifier of a Secure Enclave service call
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServiceId {
    /// Heartbeat, used as the connection handshake
    Heartbeat,

    /// Read the RUN profile
    GetRunProfile,

    /// Write the RUN profile
    SetRunProfile,

    /// Read the OFF profile
    GetOffProfile,

    /// Write the OFF profile
    SetOffProfile,
}

impl ServiceId {
    /// Return the wire identifier of this call
    #[must_use]
    pub fn to_raw(self) -> u16 {
        match self {
            Self::Heartbeat => 0x0001,
            Self::GetRunProfile => 0x4001,
            Self::SetRunProfile => 0x4002,
            Self::GetOffProfile => 0x4003,
            Self::SetOffProfile => 0x4004,
        }
    }
}

/// A failure of the mailbox below the service client
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportError {
    /// The enclave did not answer within the polling budget
    Timeout,

    /// The response channel held a malformed frame
    Protocol,
}

/// A mailbox transport to the Secure Enclave
pub trait Transport {
    /// Perform one synchronous request/response exchange
    ///
    /// The response buffer is filled with the status word followed by the
    /// payload of the reply.
    ///
    /// # Errors
    ///
    /// Returns an error if the exchange itself fails; a service-level
    /// failure is reported through the status word instead.
    fn call(
        &mut self,
        id: ServiceId,
        request: &[u32],
        response: &mut [u32],
    ) -> Result<(), TransportError>;
}

/// An error
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Error {
    /// The mailbox exchange failed
    Transport(TransportError),

    /// The enclave reported a non-zero status code
    Status(i32),

    /// A profile payload could not be decoded
    Encoding,
}

impl From<TransportError> for Error {
    fn from(error: TransportError) -> Self {
        Self::Transport(error)
    }
}

impl From<DecodeError> for Error {
    fn from(_error: DecodeError) -> Self {
        Self::Encoding
    }
}

/// A client for the Secure Enclave power services
pub struct SeService<T: Transport> {
    /// The underlying mailbox transport
    transport: T,
}

impl<T: Transport> SeService<T> {
    /// Create a new client over a transport
    #[must_use]
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Return a reference to the underlying transport
    #[must_use]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Confirm the enclave is answering service calls
    ///
    /// # Errors
    ///
    /// Returns an error if the heartbeat exchange fails
    pub fn sync(&mut self) -> Result<(), Error> {
        let mut response = [0_u32; 1];
        self.exchange(ServiceId::Heartbeat, &[], &mut response)
    }

    /// Read the current RUN profile
    ///
    /// # Errors
    ///
    /// Returns an error if the exchange fails or the reply cannot be
    /// decoded
    pub fn run_profile(&mut self) -> Result<RunProfile, Error> {
        let mut response = [0_u32; 1 + RunProfile::WORDS];
        self.exchange(ServiceId::GetRunProfile, &[], &mut response)?;
        let mut words = [0_u32; RunProfile::WORDS];
        words.copy_from_slice(&response[1..]);
        Ok(RunProfile::decode(&words)?)
    }

    /// Write a RUN profile
    ///
    /// # Errors
    ///
    /// Returns an error if the exchange fails
    pub fn set_run_profile(&mut self, profile: &RunProfile) -> Result<(), Error> {
        let request = profile.encode();
        let mut response = [0_u32; 1];
        self.exchange(ServiceId::SetRunProfile, &request, &mut response)
    }

    /// Read the current OFF profile
    ///
    /// # Errors
    ///
    /// Returns an error if the exchange fails or the reply cannot be
    /// decoded
    pub fn off_profile(&mut self) -> Result<OffProfile, Error> {
        let mut response = [0_u32; 1 + OffProfile::WORDS];
        self.exchange(ServiceId::GetOffProfile, &[], &mut response)?;
        let mut words = [0_u32; OffProfile::WORDS];
        words.copy_from_slice(&response[1..]);
        Ok(OffProfile::decode(&words)?)
    }

    /// Write an OFF profile
    ///
    /// # Errors
    ///
    /// Returns an error if the exchange fails
    pub fn set_off_profile(&mut self, profile: &OffProfile) -> Result<(), Error> {
        let request = profile.encode();
        let mut response = [0_u32; 1];
        self.exchange(ServiceId::SetOffProfile, &request, &mut response)
    }

    /// Exchange one request and check the status word of the reply
    fn exchange(
        &mut self,
        id: ServiceId,
        request: &[u32],
        response: &mut [u32],
    ) -> Result<(), Error> {
        self.transport.call(id, request, response)?;

        #[allow(clippy::cast_possible_wrap, reason = "Status codes are signed on the wire")]
        let status = response[0] as i32;
        if status == 0 {
            Ok(())
        } else {
            Err(Error::Status(status))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::vec::Vec;

    use crate::profile::ClockSource;
    use crate::profile::CpuClockFrequency;
    use crate::profile::DcdcMode;
    use crate::profile::MemoryBlocks;
    use crate::profile::PowerDomains;

    /// A scripted mailbox that records calls
    struct MockTransport {
        /// Calls seen so far
        calls: Vec<ServiceId>,

        /// Status word to report on the next call
        status: u32,

        /// Payload words to report after the status word
        payload: Vec<u32>,

        /// Transport failure to report instead of answering
        failure: Option<TransportError>,
    }

    impl MockTransport {
        /// Create a mailbox answering success with an empty payload
        fn new() -> Self {
            Self {
                calls: Vec::new(),
                status: 0,
                payload: Vec::new(),
                failure: None,
            }
        }
    }

    impl Transport for MockTransport {
        fn call(
            &mut self,
            id: ServiceId,
            _request: &[u32],
            response: &mut [u32],
        ) -> Result<(), TransportError> {
            self.calls.push(id);
            if let Some(failure) = self.failure {
                return Err(failure);
            }
            response[0] = self.status;
            for (slot, word) in response[1..].iter_mut().zip(self.payload.iter()) {
                *slot = *word;
            }
            Ok(())
        }
    }

    #[test]
    fn sync_sends_a_heartbeat() {
        let mut service = SeService::new(MockTransport::new());

        let result = service.sync();

        assert_eq!(result, Ok(()));
        assert_eq!(service.transport.calls, [ServiceId::Heartbeat]);
    }

    #[test]
    fn non_zero_status_maps_to_an_error() {
        let mut transport = MockTransport::new();
        transport.status = 0xffff_fffb;
        let mut service = SeService::new(transport);

        let result = service.sync();

        assert_eq!(result, Err(Error::Status(-5)));
    }

    #[test]
    fn transport_failure_maps_to_an_error() {
        let mut transport = MockTransport::new();
        transport.failure = Some(TransportError::Timeout);
        let mut service = SeService::new(transport);

        let result = service.sync();

        assert_eq!(result, Err(Error::Transport(TransportError::Timeout)));
    }

    #[test]
    fn run_profile_is_decoded_from_the_reply_payload() {
        let profile = RunProfile {
            power_domains: PowerDomains::SYST,
            dcdc_voltage: 750,
            dcdc_mode: DcdcMode::Pfm,
            aon_clk_src: ClockSource::Lfrc,
            run_clk_src: ClockSource::Hfrc,
            cpu_clk_freq: CpuClockFrequency::Clock76MHz,
            memory_blocks: MemoryBlocks::empty(),
        };
        let mut transport = MockTransport::new();
        transport.payload = profile.encode().to_vec();
        let mut service = SeService::new(transport);

        let result = service.run_profile();

        assert_eq!(result, Ok(profile));
        assert_eq!(service.transport.calls, [ServiceId::GetRunProfile]);
    }

    #[test]
    fn garbled_reply_payload_fails_to_decode() {
        let mut transport = MockTransport::new();
        transport.payload = std::vec![0, 0, 99, 0, 0, 0, 0];
        let mut service = SeService::new(transport);

        let result = service.run_profile();

        assert_eq!(result, Err(Error::Encoding));
    }
}
