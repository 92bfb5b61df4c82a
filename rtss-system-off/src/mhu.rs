// Copyright Claudio Mattera 2024.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Mailbox transport to the Secure Enclave
//!
//! Service calls travel over a message handling unit: the request words go
//! into the sender payload window, a doorbell bit notifies the enclave, and
//! the reply is polled from the receiver frame. The exchange is synchronous
//! and bounded; an unresponsive enclave surfaces as a timeout, never as a
//! hang.

use ensemble_pm_rs::ServiceId;
use ensemble_pm_rs::Transport;
use ensemble_pm_rs::TransportError;

use crate::registers;

/// Offset of the channel status register in either frame
const CH_ST: usize = 0x00;

/// Offset of the channel set register in the sender frame
const CH_SET: usize = 0x0c;

/// Offset of the channel clear register in the receiver frame
const CH_CLR: usize = 0x08;

/// Offset of the payload window in either frame
const PAYLOAD: usize = 0x80;

/// Number of words in a payload window
const PAYLOAD_WORDS: usize = 16;

/// Doorbell bit used for service exchanges
const DOORBELL: u32 = 1 << 0;

/// Status register polls before giving up on the enclave
const POLL_BUDGET: u32 = 10_000_000;

/// A mailbox to the Secure Enclave over a sender/receiver frame pair
pub struct SeMailbox {
    /// Base address of the sender frame
    sender: usize,

    /// Base address of the receiver frame
    receiver: usize,
}

impl SeMailbox {
    /// Create a mailbox over a frame pair
    #[must_use]
    pub fn new(sender: usize, receiver: usize) -> Self {
        Self { sender, receiver }
    }
}

impl Transport for SeMailbox {
    fn call(
        &mut self,
        id: ServiceId,
        request: &[u32],
        response: &mut [u32],
    ) -> Result<(), TransportError> {
        if request.len() >= PAYLOAD_WORDS || response.len() >= PAYLOAD_WORDS {
            return Err(TransportError::Protocol);
        }

        // Header word: service identifier and request length.
        #[allow(clippy::cast_possible_truncation, reason = "Length is bounded by the window")]
        let header = u32::from(id.to_raw()) | ((request.len() as u32) << 16);
        registers::write(self.sender + PAYLOAD, header);
        for (index, word) in request.iter().enumerate() {
            registers::write(self.sender + PAYLOAD + 4 * (index + 1), *word);
        }

        registers::write(self.sender + CH_SET, DOORBELL);

        let mut polls = 0_u32;
        while registers::read(self.receiver + CH_ST) & DOORBELL == 0 {
            polls += 1;
            if polls >= POLL_BUDGET {
                return Err(TransportError::Timeout);
            }
        }

        // The enclave echoes the service identifier ahead of the reply.
        let echoed = registers::read(self.receiver + PAYLOAD);
        if echoed & 0xffff != u32::from(id.to_raw()) {
            registers::write(self.receiver + CH_CLR, DOORBELL);
            return Err(TransportError::Protocol);
        }

        for (index, word) in response.iter_mut().enumerate() {
            *word = registers::read(self.receiver + PAYLOAD + 4 * (index + 1));
        }

        registers::write(self.receiver + CH_CLR, DOORBELL);

        Ok(())
    }
}
