//! HID/serial relay actuator
//!
//! Drives USB relay boards whose exact model is unknown: the selected device
//! (or every candidate, when no relay number narrows the choice) is tried with
//! each command encoding until one ON, hold, OFF round trip goes through.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::device::{send_command, DeviceOpener};
use super::encoding::{CommandEncoding, ENCODINGS};
use super::fallback::{AttemptOutcome, AttemptState, FailureClass, FallbackPlan};
use super::locks::KeyedLocks;
use super::types::{ActuationResult, DeviceCandidate};
use crate::error::AppError;

/// Index of the device backing a relay request
///
/// Requests past the last discovered device land on the last one, which is
/// what single-board, multi-relay installs rely on.
pub fn select_device_index(requested: Option<u32>, device_count: usize) -> Option<usize> {
    if device_count == 0 {
        return None;
    }
    let index = match requested {
        None => 0,
        Some(relay) => relay.max(1) as usize - 1,
    };
    Some(index.min(device_count - 1))
}

fn failure_class(err: &AppError) -> FailureClass {
    if err.is_permission_denied() {
        FailureClass::PermissionDenied
    } else {
        FailureClass::Io
    }
}

pub struct HidActuator {
    opener: Arc<dyn DeviceOpener>,
    encodings: Vec<CommandEncoding>,
    device_locks: Arc<KeyedLocks>,
}

impl HidActuator {
    pub fn new(opener: Arc<dyn DeviceOpener>) -> Self {
        Self {
            opener,
            encodings: ENCODINGS.to_vec(),
            device_locks: Arc::new(KeyedLocks::new()),
        }
    }

    /// Try candidates × encodings until one ON/OFF round trip succeeds
    pub async fn actuate(
        &self,
        candidates: &[DeviceCandidate],
        requested_relay: Option<u32>,
        hold: Duration,
    ) -> ActuationResult {
        let Some(selected) = select_device_index(requested_relay, candidates.len()) else {
            warn!("No relay device found");
            return ActuationResult::failure(AppError::NoDeviceFound.to_string());
        };

        let targets: Vec<&DeviceCandidate> = match requested_relay {
            Some(_) => candidates.get(selected).into_iter().collect(),
            None => candidates.iter().collect(),
        };
        if let Some(first) = targets.first() {
            info!(
                "Relay device selected: {} (key {}, {} candidate(s))",
                first.path,
                first.stable_key,
                candidates.len()
            );
        }

        let mut plan = FallbackPlan::new(targets.len(), self.encodings.len());
        let mut failures = Vec::new();

        loop {
            match plan.state() {
                AttemptState::Trying { device, encoding } => {
                    let outcome = match (targets.get(device), self.encodings.get(encoding)) {
                        (Some(target), Some(enc)) => {
                            let _guard = self.device_locks.lock(&target.path).await;
                            self.attempt(&target.path, enc, hold, &mut failures).await
                        }
                        _ => AttemptOutcome::OnFailed(FailureClass::Io),
                    };
                    plan.record(outcome);
                }
                AttemptState::ExhaustedDevice { device } => {
                    if let Some(target) = targets.get(device) {
                        warn!("Giving up on relay device {}", target.path);
                    }
                    plan.next_device();
                }
                AttemptState::Succeeded { device, encoding } => {
                    let path = targets
                        .get(device)
                        .map(|t| t.path.clone())
                        .unwrap_or_default();
                    info!(
                        "Relay toggled on {} with encoding {} ({})",
                        path,
                        encoding,
                        self.encodings.get(encoding).map_or("?", |e| e.name)
                    );
                    return ActuationResult::device_success(path, encoding);
                }
                AttemptState::ExhaustedAll => {
                    let summary = format!(
                        "all {} attempt(s) failed: {}",
                        failures.len(),
                        failures.join("; ")
                    );
                    warn!("Relay actuation failed, {}", summary);
                    return ActuationResult::failure(summary);
                }
            }
        }
    }

    /// One ON, hold, OFF sequence; the hold always runs in full once ON fired
    async fn attempt(
        &self,
        path: &str,
        encoding: &CommandEncoding,
        hold: Duration,
        failures: &mut Vec<String>,
    ) -> AttemptOutcome {
        debug!("Trying encoding {} on {}", encoding.name, path);

        if let Err(e) = send_command(self.opener.as_ref(), path, encoding.on) {
            debug!("ON with {} on {} failed: {}", encoding.name, path, e);
            failures.push(format!("{} [{}] on: {}", path, encoding.name, e.failure_kind()));
            return AttemptOutcome::OnFailed(failure_class(&e));
        }
        debug!("Relay ON sent to {}: {:02X?}", path, encoding.on);

        sleep(hold).await;

        if let Err(e) = send_command(self.opener.as_ref(), path, encoding.off) {
            warn!(
                "OFF with {} on {} failed after ON, relay may still be energized: {}",
                encoding.name, path, e
            );
            failures.push(format!("{} [{}] off: {}", path, encoding.name, e.failure_kind()));
            return AttemptOutcome::OffFailed(failure_class(&e));
        }
        debug!("Relay OFF sent to {}: {:02X?}", path, encoding.off);

        AttemptOutcome::Success
    }
}
