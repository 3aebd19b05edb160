//! Device × encoding fallback policy
//!
//! The retry order is a small state machine so it can be tested without any
//! I/O. Devices are walked in order; within a device, encodings are walked in
//! priority order. A permission failure abandons the rest of that device's
//! encodings, any other failure moves on to the next encoding.

/// Position in the attempt sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    /// Next attempt to run
    Trying { device: usize, encoding: usize },
    /// A full ON/OFF round trip succeeded
    Succeeded { device: usize, encoding: usize },
    /// No encodings left for this device
    ExhaustedDevice { device: usize },
    /// Every device and encoding has been tried
    ExhaustedAll,
}

/// How an attempt failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    PermissionDenied,
    Io,
}

/// Result of one ON/hold/OFF attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    /// ON write failed, nothing was energized
    OnFailed(FailureClass),
    /// ON fired but OFF failed
    OffFailed(FailureClass),
}

#[derive(Debug, Clone)]
pub struct FallbackPlan {
    devices: usize,
    encodings: usize,
    state: AttemptState,
}

impl FallbackPlan {
    pub fn new(devices: usize, encodings: usize) -> Self {
        let state = if devices == 0 || encodings == 0 {
            AttemptState::ExhaustedAll
        } else {
            AttemptState::Trying {
                device: 0,
                encoding: 0,
            }
        };
        Self {
            devices,
            encodings,
            state,
        }
    }

    pub fn state(&self) -> AttemptState {
        self.state
    }

    /// Record the outcome of the current `Trying` attempt
    pub fn record(&mut self, outcome: AttemptOutcome) -> AttemptState {
        if let AttemptState::Trying { device, encoding } = self.state {
            let failure = match outcome {
                AttemptOutcome::Success => None,
                AttemptOutcome::OnFailed(class) | AttemptOutcome::OffFailed(class) => Some(class),
            };
            self.state = match failure {
                None => AttemptState::Succeeded { device, encoding },
                Some(FailureClass::PermissionDenied) => AttemptState::ExhaustedDevice { device },
                Some(FailureClass::Io) if encoding + 1 < self.encodings => AttemptState::Trying {
                    device,
                    encoding: encoding + 1,
                },
                Some(FailureClass::Io) => AttemptState::ExhaustedDevice { device },
            };
        }
        self.state
    }

    /// Leave an exhausted device for the next one
    pub fn next_device(&mut self) -> AttemptState {
        if let AttemptState::ExhaustedDevice { device } = self.state {
            self.state = if device + 1 < self.devices {
                AttemptState::Trying {
                    device: device + 1,
                    encoding: 0,
                }
            } else {
                AttemptState::ExhaustedAll
            };
        }
        self.state
    }
}
