// Copyright Claudio Mattera 2024.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Functions for module sleep
//!
//! The commit task stands in for an RTOS idle thread: it stays parked on
//! the sleep-state policy and commits to the subsystem OFF state as soon
//! as the policy allows it. On success the commit never returns and the
//! next thing the core executes is the reset vector.

use log::debug;
use log::info;
use log::warn;

use cortex_m::asm;
use cortex_m::peripheral::SCB;

use ensemble_pm_rs::SleepState;
use ensemble_pm_rs::StatePolicy;

/// Task committing to the subsystem OFF state once the policy allows it
#[embassy_executor::task]
pub async fn commit_task(policy: &'static StatePolicy, mut scb: SCB) {
    policy.allowed(SleepState::SubsystemOff).await;

    debug!("Deepest allowed sleep state is {:?}", policy.deepest_allowed());

    info!("Entering the subsystem OFF state");
    enter_subsystem_off(&mut scb);

    // Still executing, so the subsystem never lost power. The main task
    // notices once its sleep window elapses.
    warn!("Subsystem OFF did not engage");
}

/// Request deep sleep and stop the core
///
/// With the OFF profile committed and the deep-sleep bit set, the enclave
/// powers the subsystem down at the following wait-for-interrupt; the
/// wakeup event later restarts the core through the reset vector. If the
/// enclave vetoes the request, execution continues after the
/// wait-for-interrupt and the deep-sleep bit is cleared again.
fn enter_subsystem_off(scb: &mut SCB) {
    scb.set_sleepdeep();
    asm::dsb();
    asm::wfi();
    scb.clear_sleepdeep();
}
