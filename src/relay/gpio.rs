//! GPIO relay actuator
//!
//! Pulses a GPIO line high for the hold duration. The line is requested as an
//! output, driven high, held, driven low and released. Release runs on every
//! exit path, including errors mid-pulse and a dropped future, through
//! [`PinGuard`].
//!
//! Backends:
//! - **cdev**: Linux GPIO character device (`/dev/gpiochipN`) via `gpio-cdev`
//! - **simulated**: logs every transition and always succeeds, for hosts
//!   without GPIO hardware

use gpio_cdev::{Chip, LineHandle, LineRequestFlags};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::types::GpioOutcome;
use crate::error::{AppError, Result};

/// Consumer label shown by `gpioinfo`
const CONSUMER: &str = "relayd";

/// A GPIO line held as an output
pub trait OutputLine: Send {
    fn set(&mut self, high: bool) -> Result<()>;

    /// Drive low and give the line back
    fn release(self: Box<Self>) -> Result<()>;
}

/// Capability for acquiring output lines
pub trait GpioBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Request `line` as an output, initially low
    fn request_output(&self, line: u32) -> Result<Box<dyn OutputLine>>;
}

/// Backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GpioBackendKind {
    /// Character device when the chip exists, simulated otherwise
    #[default]
    Auto,
    Cdev,
    Simulated,
}

/// How channel pin numbers are interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PinNumbering {
    /// Physical 40-pin header position
    #[default]
    Board,
    /// Raw line offset on the chip
    Line,
}

/// Physical header pin → line offset on the 40-pin Raspberry Pi layout.
/// Pins absent here are power or ground.
const BOARD_TO_LINE: [(u32, u32); 28] = [
    (3, 2),
    (5, 3),
    (7, 4),
    (8, 14),
    (10, 15),
    (11, 17),
    (12, 18),
    (13, 27),
    (15, 22),
    (16, 23),
    (18, 24),
    (19, 10),
    (21, 9),
    (22, 25),
    (23, 11),
    (24, 8),
    (26, 7),
    (27, 0),
    (28, 1),
    (29, 5),
    (31, 6),
    (32, 12),
    (33, 13),
    (35, 19),
    (36, 16),
    (37, 26),
    (38, 20),
    (40, 21),
];

impl PinNumbering {
    pub fn to_line(self, pin: u32) -> Result<u32> {
        match self {
            Self::Line => Ok(pin),
            Self::Board => BOARD_TO_LINE
                .iter()
                .find(|(board, _)| *board == pin)
                .map(|(_, line)| *line)
                .ok_or_else(|| AppError::Gpio(format!("Board pin {} is not a GPIO", pin))),
        }
    }
}

/// Linux character-device backend
pub struct CdevBackend {
    chip_path: String,
}

impl CdevBackend {
    pub fn new(chip_path: impl Into<String>) -> Self {
        Self {
            chip_path: chip_path.into(),
        }
    }
}

impl GpioBackend for CdevBackend {
    fn name(&self) -> &'static str {
        "cdev"
    }

    fn request_output(&self, line: u32) -> Result<Box<dyn OutputLine>> {
        let mut chip = Chip::new(&self.chip_path)
            .map_err(|e| AppError::Gpio(format!("GPIO chip open failed: {}", e)))?;

        let handle = chip
            .get_line(line)
            .map_err(|e| AppError::Gpio(format!("GPIO line {} failed: {}", line, e)))?
            .request(LineRequestFlags::OUTPUT, 0, CONSUMER)
            .map_err(|e| AppError::Gpio(format!("GPIO request failed: {}", e)))?;

        Ok(Box::new(CdevLine { line, handle }))
    }
}

struct CdevLine {
    line: u32,
    handle: LineHandle,
}

impl OutputLine for CdevLine {
    fn set(&mut self, high: bool) -> Result<()> {
        self.handle
            .set_value(u8::from(high))
            .map_err(|e| AppError::Gpio(format!("GPIO {} set failed: {}", self.line, e)))
    }

    fn release(self: Box<Self>) -> Result<()> {
        // Handle drop returns the line to the kernel
        self.handle
            .set_value(0)
            .map_err(|e| AppError::Gpio(format!("GPIO {} reset failed: {}", self.line, e)))
    }
}

/// Stand-in for hosts without GPIO: every transition is a logged no-op
#[derive(Debug, Default)]
pub struct SimulatedBackend;

impl GpioBackend for SimulatedBackend {
    fn name(&self) -> &'static str {
        "simulated"
    }

    fn request_output(&self, line: u32) -> Result<Box<dyn OutputLine>> {
        info!("[simulated gpio] setup line {} as output", line);
        Ok(Box::new(SimulatedLine { line }))
    }
}

struct SimulatedLine {
    line: u32,
}

impl OutputLine for SimulatedLine {
    fn set(&mut self, high: bool) -> Result<()> {
        info!(
            "[simulated gpio] line {} -> {}",
            self.line,
            if high { "HIGH" } else { "LOW" }
        );
        Ok(())
    }

    fn release(self: Box<Self>) -> Result<()> {
        info!("[simulated gpio] cleanup line {}", self.line);
        Ok(())
    }
}

/// Build the configured backend
pub fn build_backend(kind: GpioBackendKind, chip_path: &str) -> Arc<dyn GpioBackend> {
    match kind {
        GpioBackendKind::Cdev => Arc::new(CdevBackend::new(chip_path)),
        GpioBackendKind::Simulated => Arc::new(SimulatedBackend),
        GpioBackendKind::Auto if Path::new(chip_path).exists() => {
            Arc::new(CdevBackend::new(chip_path))
        }
        GpioBackendKind::Auto => {
            warn!(
                "GPIO chip {} not found, using simulated GPIO backend",
                chip_path
            );
            Arc::new(SimulatedBackend)
        }
    }
}

/// Scoped ownership of an output line; release always runs
pub struct PinGuard {
    line: u32,
    handle: Option<Box<dyn OutputLine>>,
}

impl PinGuard {
    pub fn acquire(backend: &dyn GpioBackend, line: u32) -> Result<Self> {
        let handle = backend.request_output(line)?;
        Ok(Self {
            line,
            handle: Some(handle),
        })
    }

    pub fn set(&mut self, high: bool) -> Result<()> {
        match self.handle.as_mut() {
            Some(handle) => handle.set(high),
            None => Err(AppError::Gpio(format!("GPIO {} already released", self.line))),
        }
    }
}

impl Drop for PinGuard {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            match handle.release() {
                Ok(()) => debug!("GPIO {} cleanup ok", self.line),
                Err(e) => warn!("GPIO {} cleanup failed: {}", self.line, e),
            }
        }
    }
}

pub struct GpioActuator {
    backend: Arc<dyn GpioBackend>,
    numbering: PinNumbering,
}

impl GpioActuator {
    pub fn new(backend: Arc<dyn GpioBackend>, numbering: PinNumbering) -> Self {
        Self { backend, numbering }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Drive `pin` high for `hold`, then low
    pub async fn pulse(&self, pin: u32, hold: Duration) -> Result<()> {
        let line = self.numbering.to_line(pin)?;
        let mut guard = PinGuard::acquire(self.backend.as_ref(), line)?;

        guard.set(true)?;
        debug!("GPIO pin {} (line {}) high", pin, line);

        sleep(hold).await;

        guard.set(false)?;
        debug!("GPIO pin {} (line {}) low", pin, line);
        Ok(())
    }

    /// Pulse and fold the result into a loggable outcome
    pub async fn pulse_outcome(&self, pin: u32, hold: Duration) -> GpioOutcome {
        match self.pulse(pin, hold).await {
            Ok(()) => GpioOutcome {
                pin,
                success: true,
                error: None,
            },
            Err(e) => {
                warn!("GPIO pulse on pin {} failed: {}", pin, e);
                GpioOutcome {
                    pin,
                    success: false,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::testing::{GpioEvent, SpyGpio};

    #[test]
    fn test_board_numbering() {
        assert_eq!(PinNumbering::Board.to_line(16).unwrap(), 23);
        assert_eq!(PinNumbering::Board.to_line(18).unwrap(), 24);
        assert!(PinNumbering::Board.to_line(1).is_err()); // 3V3
        assert!(PinNumbering::Board.to_line(41).is_err());
        assert_eq!(PinNumbering::Line.to_line(16).unwrap(), 16);
    }

    #[test]
    fn test_auto_backend_without_chip_is_simulated() {
        let backend = build_backend(GpioBackendKind::Auto, "/nonexistent/gpiochip9");
        assert_eq!(backend.name(), "simulated");
        assert_eq!(build_backend(GpioBackendKind::Cdev, "/dev/gpiochip0").name(), "cdev");
    }

    #[tokio::test(start_paused = true)]
    async fn test_pulse_sequence() {
        let spy = Arc::new(SpyGpio::default());
        let actuator = GpioActuator::new(spy.clone(), PinNumbering::Line);

        actuator.pulse(16, Duration::from_millis(500)).await.unwrap();

        let events = spy.events();
        assert_eq!(events.len(), 4);
        assert_eq!(events[0], GpioEvent::Requested { line: 16 });
        let (
            GpioEvent::Set {
                high: true,
                at: t_on,
                ..
            },
            GpioEvent::Set {
                high: false,
                at: t_off,
                ..
            },
        ) = (&events[1], &events[2])
        else {
            panic!("unexpected events: {:?}", events);
        };
        assert_eq!(*t_off - *t_on, Duration::from_millis(500));
        assert_eq!(events[3], GpioEvent::Released { line: 16 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_runs_after_failure() {
        let spy = Arc::new(SpyGpio::failing_high());
        let actuator = GpioActuator::new(spy.clone(), PinNumbering::Line);

        let outcome = actuator.pulse_outcome(7, Duration::from_millis(10)).await;
        assert!(!outcome.success);
        assert_eq!(
            spy.events(),
            vec![GpioEvent::Requested { line: 7 }, GpioEvent::Released { line: 7 }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_runs_when_cancelled() {
        let spy = Arc::new(SpyGpio::default());
        let actuator = GpioActuator::new(spy.clone(), PinNumbering::Line);

        let pulse = actuator.pulse(5, Duration::from_secs(10));
        assert!(tokio::time::timeout(Duration::from_millis(10), pulse).await.is_err());
        assert_eq!(spy.events().last(), Some(&GpioEvent::Released { line: 5 }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulated_backend_succeeds() {
        let actuator = GpioActuator::new(Arc::new(SimulatedBackend), PinNumbering::Board);
        let outcome = actuator.pulse_outcome(16, Duration::from_millis(300)).await;
        assert!(outcome.success);
        assert_eq!(actuator.backend_name(), "simulated");
    }
}
