//! Simulated Projector
//!
//! An in-process stand-in for a BenQ projector, for demos and tests without
//! hardware. It implements [`Transport`]: every framed command the engine
//! writes is answered after a configurable latency, the way the real device
//! answers over RS-232 or its LAN control port.
//!
//! Picture settings are blocked (`*Block item#`) while the lamp is off, and
//! an optional drop rate swallows replies so the watchdog path can be
//! exercised.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;
use tokio::runtime::Handle;

use crate::device::{AspectRatio, PictureMode, SourceType};
use crate::protocol::{ProtocolError, ReceiveHandler, Transport, UNAVAILABLE_MARKER};

/// Reply for a command the projector does not understand
pub const ILLEGAL_FORMAT: &str = "*Illegal format#";

#[derive(Debug, Clone)]
struct SimState {
    power: bool,
    aspect_ratio: AspectRatio,
    source: SourceType,
    picture_mode: PictureMode,
    lamp_hours: u32,
    received: Vec<String>,
}

struct SimInner {
    state: Mutex<SimState>,
    handler: RwLock<Option<ReceiveHandler>>,
    rng: Mutex<StdRng>,
    drop_rate: f64,
    latency: Duration,
    runtime: Handle,
}

/// Simulated BenQ projector
#[derive(Clone)]
pub struct SimulatedProjector {
    inner: Arc<SimInner>,
}

/// Builder for [`SimulatedProjector`]
#[derive(Debug, Clone)]
pub struct SimulatorBuilder {
    power: bool,
    lamp_hours: u32,
    drop_rate: f64,
    latency: Duration,
    seed: Option<u64>,
}

impl Default for SimulatorBuilder {
    fn default() -> Self {
        Self {
            power: false,
            lamp_hours: 1200,
            drop_rate: 0.0,
            latency: Duration::from_millis(20),
            seed: None,
        }
    }
}

impl SimulatorBuilder {
    /// Start with the lamp on
    pub fn powered_on(mut self, on: bool) -> Self {
        self.power = on;
        self
    }

    /// Initial lamp-hour counter
    pub fn lamp_hours(mut self, hours: u32) -> Self {
        self.lamp_hours = hours;
        self
    }

    /// Fraction of replies silently dropped (0.0 to 1.0).
    ///
    /// Out-of-range values are clamped; NaN and infinities disable dropping.
    pub fn drop_rate(mut self, rate: f64) -> Self {
        self.drop_rate = if rate.is_finite() {
            rate.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self
    }

    /// Delay before each reply is delivered
    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Seed the drop decisions for reproducible runs
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Build on the current tokio runtime
    pub fn build(self) -> Result<SimulatedProjector, ProtocolError> {
        let runtime = Handle::try_current().map_err(|_| ProtocolError::NoRuntime)?;
        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(SimulatedProjector {
            inner: Arc::new(SimInner {
                state: Mutex::new(SimState {
                    power: self.power,
                    aspect_ratio: AspectRatio::SixteenNine,
                    source: SourceType::Hdmi,
                    picture_mode: PictureMode::Standard,
                    lamp_hours: self.lamp_hours,
                    received: Vec::new(),
                }),
                handler: RwLock::new(None),
                rng: Mutex::new(rng),
                drop_rate: self.drop_rate,
                latency: self.latency,
                runtime,
            }),
        })
    }
}

impl SimulatedProjector {
    /// Start configuring a simulator
    pub fn builder() -> SimulatorBuilder {
        SimulatorBuilder::default()
    }

    /// Simulator with default settings on the current runtime
    pub fn new() -> Result<Self, ProtocolError> {
        Self::builder().build()
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current lamp state
    pub fn is_powered_on(&self) -> bool {
        self.state().power
    }

    /// Current aspect ratio
    pub fn aspect_ratio(&self) -> AspectRatio {
        self.state().aspect_ratio
    }

    /// Current input
    pub fn source(&self) -> SourceType {
        self.state().source
    }

    /// Current picture mode
    pub fn picture_mode(&self) -> PictureMode {
        self.state().picture_mode
    }

    /// Commands received so far, with framing removed
    pub fn received(&self) -> Vec<String> {
        self.state().received.clone()
    }

    /// Advance the lamp-hour counter, as if the lamp had been running
    pub fn run_lamp(&self, hours: u32) {
        let mut state = self.state();
        if state.power {
            state.lamp_hours = state.lamp_hours.saturating_add(hours);
        }
    }

    /// Compute the projector's reply to one unframed command
    fn respond(&self, command: &str) -> String {
        let mut state = self.state();
        state.received.push(command.to_string());

        let Some((key, value)) = command
            .strip_prefix('*')
            .and_then(|c| c.strip_suffix('#'))
            .and_then(|c| c.split_once('='))
        else {
            return ILLEGAL_FORMAT.to_string();
        };

        match (key.to_ascii_uppercase().as_str(), value) {
            ("POW", "?") => power_reply(state.power),
            ("POW", v) if v.eq_ignore_ascii_case("ON") => {
                state.power = true;
                power_reply(true)
            }
            ("POW", v) if v.eq_ignore_ascii_case("OFF") => {
                state.power = false;
                power_reply(false)
            }
            ("LTIM", "?") => format!("*LTIM={}#", state.lamp_hours),
            ("ASP" | "SOUR" | "APPMOD", _) if !state.power => UNAVAILABLE_MARKER.to_string(),
            ("ASP", "?") => format!("*ASP={}#", state.aspect_ratio),
            ("SOUR", "?") => format!("*SOUR={}#", state.source),
            ("APPMOD", "?") => format!("*APPMOD={}#", state.picture_mode),
            ("ASP", v) => match AspectRatio::from_wire(v).filter(|a| !a.is_unknown()) {
                Some(a) => {
                    state.aspect_ratio = a;
                    format!("*ASP={}#", a)
                }
                None => UNAVAILABLE_MARKER.to_string(),
            },
            ("SOUR", v) => match SourceType::from_wire(v).filter(|s| !s.is_unknown()) {
                Some(s) => {
                    state.source = s;
                    format!("*SOUR={}#", s)
                }
                None => UNAVAILABLE_MARKER.to_string(),
            },
            ("APPMOD", v) => match PictureMode::from_wire(v).filter(|m| !m.is_unknown()) {
                Some(m) => {
                    state.picture_mode = m;
                    format!("*APPMOD={}#", m)
                }
                None => UNAVAILABLE_MARKER.to_string(),
            },
            _ => ILLEGAL_FORMAT.to_string(),
        }
    }

    fn should_drop(&self) -> bool {
        if self.inner.drop_rate <= 0.0 {
            return false;
        }
        self.inner
            .rng
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .gen_bool(self.inner.drop_rate)
    }
}

fn power_reply(on: bool) -> String {
    if on {
        "*POW=ON#".to_string()
    } else {
        "*POW=OFF#".to_string()
    }
}

impl Transport for SimulatedProjector {
    fn send(&self, frame: &str) -> Result<(), ProtocolError> {
        let command = frame.trim_matches('\r');
        if command.is_empty() {
            return Ok(());
        }

        let reply = self.respond(command);
        if self.should_drop() {
            tracing::debug!("Simulator dropping reply '{}'", reply);
            return Ok(());
        }

        let inner = Arc::clone(&self.inner);
        self.inner.runtime.spawn(async move {
            if !inner.latency.is_zero() {
                tokio::time::sleep(inner.latency).await;
            }
            let handler = inner.handler.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(handler) = handler.as_ref() {
                handler(reply.as_str());
            }
        });
        Ok(())
    }

    fn on_receive(&self, handler: ReceiveHandler) {
        *self
            .inner
            .handler
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(handler);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn sim(power: bool) -> SimulatedProjector {
        SimulatedProjector::builder()
            .powered_on(power)
            .lamp_hours(500)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_power_commands() {
        let sim = sim(false).await;
        assert_eq!(sim.respond("*POW=?#"), "*POW=OFF#");
        assert_eq!(sim.respond("*pow=on#"), "*POW=ON#");
        assert!(sim.is_powered_on());
        assert_eq!(sim.respond("*POW=OFF#"), "*POW=OFF#");
        assert!(!sim.is_powered_on());
    }

    #[tokio::test]
    async fn test_picture_settings_blocked_when_off() {
        let sim = sim(false).await;
        assert_eq!(sim.respond("*ASP=?#"), UNAVAILABLE_MARKER);
        assert_eq!(sim.respond("*APPMOD=GAME#"), UNAVAILABLE_MARKER);
        assert_eq!(sim.respond("*LTIM=?#"), "*LTIM=500#");
    }

    #[tokio::test]
    async fn test_picture_settings_when_on() {
        let sim = sim(true).await;
        assert_eq!(sim.respond("*ASP=AUTO#"), "*ASP=AUTO#");
        assert_eq!(sim.aspect_ratio(), AspectRatio::Auto);
        assert_eq!(sim.respond("*SOUR=VID#"), "*SOUR=VID#");
        assert_eq!(sim.source(), SourceType::Video);
        assert_eq!(sim.respond("*APPMOD=?#"), "*APPMOD=STD#");
        assert_eq!(sim.respond("*ASP=n/a#"), UNAVAILABLE_MARKER);
    }

    #[tokio::test]
    async fn test_garbage_is_illegal() {
        let sim = sim(true).await;
        assert_eq!(sim.respond("hello"), ILLEGAL_FORMAT);
        assert_eq!(sim.respond("*VOL=+#"), ILLEGAL_FORMAT);
        assert_eq!(sim.received().len(), 2);
    }

    #[tokio::test]
    async fn test_non_finite_drop_rate_never_drops() {
        for rate in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let sim = SimulatedProjector::builder().drop_rate(rate).build().unwrap();
            assert_eq!(sim.inner.drop_rate, 0.0);
            assert!(!sim.should_drop());
            assert!(sim.send("\r*POW=?#\r").is_ok());
        }
        let sim = SimulatedProjector::builder().drop_rate(4.0).build().unwrap();
        assert_eq!(sim.inner.drop_rate, 1.0);
    }

    #[tokio::test]
    async fn test_lamp_only_runs_when_on() {
        let sim = sim(false).await;
        sim.run_lamp(10);
        assert_eq!(sim.respond("*LTIM=?#"), "*LTIM=500#");
        sim.respond("*POW=ON#");
        sim.run_lamp(10);
        assert_eq!(sim.respond("*LTIM=?#"), "*LTIM=510#");
    }
}
