//! Protocol engine
//!
//! Pipelines commands to the projector with at most one round trip on the
//! wire at a time. Callers may queue any number of commands (up to the
//! configured capacity) without blocking; each incoming message is tested
//! against the oldest outstanding matcher, and a match releases the next
//! queued command. A watchdog discards all pending work if the projector
//! stops answering.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tokio::sync::watch;

use super::commands::frame;
use super::matcher::decode_response;
use super::{Command, CorrelationQueue, Matcher, ProtocolError, Transport, Watchdog};
use crate::config::EngineConfig;
use crate::device::{AspectRatio, DeviceChange, DeviceState, PictureMode, SourceType};

/// Queue plus idle flag, shared with the watchdog's expiry task
struct Pipeline {
    queue: CorrelationQueue<String, Matcher>,
    idle: watch::Sender<bool>,
}

impl Pipeline {
    /// Publish whether anything is outstanding. The flag is computed from the
    /// queue inside the watch lock so concurrent refreshes cannot publish a
    /// stale value last.
    fn refresh_idle(&self) {
        self.idle.send_if_modified(|idle| {
            let now = self.queue.is_response_empty();
            if *idle == now {
                return false;
            }
            *idle = now;
            true
        });
    }

    fn on_watchdog_timeout(&self) {
        tracing::warn!(
            "Timeout waiting for command response from projector. Resetting queues ({} pending).",
            self.queue.response_count()
        );
        self.queue.clear();
        self.refresh_idle();
    }
}

/// Command/response engine for one projector link
pub struct ProtocolEngine<T: Transport> {
    transport: T,
    device: Arc<DeviceState>,
    pipeline: Arc<Pipeline>,
    watchdog: Watchdog,
    config: EngineConfig,
}

impl<T: Transport + 'static> ProtocolEngine<T> {
    /// Create an engine on the current tokio runtime and install it as the
    /// transport's receive handler.
    pub fn new(
        transport: T,
        device: Arc<DeviceState>,
        config: EngineConfig,
    ) -> Result<Arc<Self>, ProtocolError> {
        let runtime = Handle::try_current().map_err(|_| ProtocolError::NoRuntime)?;
        Self::with_runtime(transport, device, config, runtime)
    }

    /// Create an engine whose watchdog runs on `runtime`
    pub fn with_runtime(
        transport: T,
        device: Arc<DeviceState>,
        config: EngineConfig,
        runtime: Handle,
    ) -> Result<Arc<Self>, ProtocolError> {
        config
            .validate()
            .map_err(|e| ProtocolError::InvalidValue(e.to_string()))?;

        let (idle, _) = watch::channel(true);
        let pipeline = Arc::new(Pipeline {
            queue: CorrelationQueue::new(config.queue_capacity),
            idle,
        });
        let watchdog = Watchdog::new(config.response_timeout(), runtime);

        Ok(Arc::new_cyclic(|weak: &Weak<Self>| {
            let handler_ref = weak.clone();
            transport.on_receive(Box::new(move |raw: &str| {
                if let Some(engine) = handler_ref.upgrade() {
                    engine.on_message_received(raw);
                }
            }));

            Self {
                transport,
                device,
                pipeline,
                watchdog,
                config,
            }
        }))
    }

    /// The state model this engine updates
    pub fn device(&self) -> &Arc<DeviceState> {
        &self.device
    }

    /// The link this engine writes to
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Settings the engine was built with
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// True when no command is awaiting a response
    pub fn is_idle(&self) -> bool {
        *self.pipeline.idle.borrow()
    }

    /// Watch the idle flag
    pub fn subscribe_idle(&self) -> watch::Receiver<bool> {
        self.pipeline.idle.subscribe()
    }

    /// Commands awaiting a response, including the one on the wire
    pub fn pending_count(&self) -> usize {
        self.pipeline.queue.response_count()
    }

    /// Commands not yet transmitted
    pub fn queued_count(&self) -> usize {
        self.pipeline.queue.command_count()
    }

    /// Check if the response watchdog is running
    pub fn is_watchdog_armed(&self) -> bool {
        self.watchdog.is_armed()
    }

    /// Queue a command and transmit it right away if nothing is in flight.
    ///
    /// Never waits for the projector. Fails only when the queue is full.
    pub fn enqueue_command(
        &self,
        wire_text: impl Into<String>,
        matcher: Matcher,
    ) -> Result<(), ProtocolError> {
        let wire_text = wire_text.into();
        let to_send = self.pipeline.queue.submit(wire_text, matcher)?;
        self.pipeline.refresh_idle();

        if let Some(command) = to_send {
            self.send_command(&command);
        }
        Ok(())
    }

    /// Queue a semantic command
    pub fn issue(&self, command: Command) -> Result<(), ProtocolError> {
        let wire_text = command.wire_text()?;
        self.enqueue_command(wire_text, command.matcher())
    }

    fn send_command(&self, wire_text: &str) {
        // Armed before the write so a fast reply always finds it running
        let pipeline = Arc::clone(&self.pipeline);
        self.watchdog.arm(move || pipeline.on_watchdog_timeout());

        tracing::debug!("TX: {}", wire_text);
        if let Err(e) = self.transport.send(&frame(wire_text)) {
            // The watchdog will reset the queue
            tracing::error!("Failed to send '{}' to projector: {}", wire_text, e);
        }
    }

    /// Handle one delimited message from the transport.
    ///
    /// Never fails: errors and panics are logged and the engine keeps going.
    pub fn on_message_received(&self, raw: &str) {
        if raw.is_empty() {
            return;
        }
        tracing::debug!("RX: {}", raw);

        match panic::catch_unwind(AssertUnwindSafe(|| self.handle_message(raw))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(
                "An error occurred handling projector response '{}': {}",
                raw,
                e
            ),
            Err(_) => tracing::error!(
                "Panic while handling projector response '{}'",
                raw
            ),
        }
    }

    fn handle_message(&self, raw: &str) -> Result<(), ProtocolError> {
        // Any traffic counts as a sign of life
        self.watchdog.disarm();

        let unavailable = raw == self.config.unavailable_marker;
        let resolution = self
            .pipeline
            .queue
            .resolve_front(|expected| unavailable || expected.is_match(raw));

        let Some(resolution) = resolution else {
            if self.pipeline.queue.is_response_empty() {
                tracing::debug!("No command pending, ignoring '{}'", raw);
            } else {
                tracing::debug!("Response '{}' does not match pending command, waiting", raw);
            }
            return Ok(());
        };

        tracing::debug!("Matched '{}', {} still pending", raw, resolution.remaining);

        // A failure here must not stop the next command from going out
        let processed = panic::catch_unwind(AssertUnwindSafe(|| self.process_response(raw)))
            .unwrap_or_else(|_| {
                Err(ProtocolError::InvalidResponse(format!(
                    "panic while processing '{}'",
                    raw
                )))
            });

        if let Some(next) = resolution.next_command {
            self.send_command(&next);
        }
        self.pipeline.refresh_idle();

        processed.map(|_| ())
    }

    /// Decode a response and apply it to the device state.
    ///
    /// Returns the changes that were applied (empty for the unavailable
    /// marker or an unrecognised shape).
    pub fn process_response(&self, raw: &str) -> Result<Vec<DeviceChange>, ProtocolError> {
        tracing::debug!("Processing response: {}", raw);

        if raw == self.config.unavailable_marker {
            return Ok(Vec::new());
        }

        let changes = decode_response(raw)?;
        for change in &changes {
            self.device.set(*change);
        }
        Ok(changes)
    }

    /// Switch the projector on or off
    pub fn set_power_state(&self, on: bool) -> Result<(), ProtocolError> {
        self.issue(Command::SetPowerState(on))
    }

    /// Shorthand for `set_power_state(true)`
    pub fn turn_power_on(&self) -> Result<(), ProtocolError> {
        self.set_power_state(true)
    }

    /// Shorthand for `set_power_state(false)`
    pub fn turn_power_off(&self) -> Result<(), ProtocolError> {
        self.set_power_state(false)
    }

    /// Select an aspect ratio. The placeholder value is rejected.
    pub fn set_aspect_ratio(&self, aspect_ratio: AspectRatio) -> Result<(), ProtocolError> {
        self.issue(Command::SetAspectRatio(aspect_ratio))
    }

    /// Switch the input source
    pub fn set_current_source(&self, source: SourceType) -> Result<(), ProtocolError> {
        self.issue(Command::SetCurrentSource(source))
    }

    /// Select a picture mode
    pub fn set_picture_mode(&self, mode: PictureMode) -> Result<(), ProtocolError> {
        self.issue(Command::SetPictureMode(mode))
    }

    /// Ask for the power state
    pub fn query_power_state(&self) -> Result<(), ProtocolError> {
        self.issue(Command::QueryPowerState)
    }

    /// Ask for the aspect ratio
    pub fn query_aspect_ratio(&self) -> Result<(), ProtocolError> {
        self.issue(Command::QueryAspectRatio)
    }

    /// Ask for the input source
    pub fn query_current_source(&self) -> Result<(), ProtocolError> {
        self.issue(Command::QueryCurrentSource)
    }

    /// Ask for the picture mode
    pub fn query_picture_mode(&self) -> Result<(), ProtocolError> {
        self.issue(Command::QueryPictureMode)
    }

    /// Ask for the lamp-hour counter
    pub fn query_lamp_hours(&self) -> Result<(), ProtocolError> {
        self.issue(Command::QueryLampHours)
    }

    /// Queue a refresh of every field.
    ///
    /// Lamp hours are only asked for until a non-zero value is known; the
    /// picture fields only while the projector is believed to be on.
    pub fn update_status(&self) -> Result<(), ProtocolError> {
        let snapshot = self.device.snapshot();

        self.query_power_state()?;

        if snapshot.lamp_hours == 0 {
            self.query_lamp_hours()?;
        }

        if snapshot.power_state {
            self.query_aspect_ratio()?;
            self.query_current_source()?;
            self.query_picture_mode()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ChannelTransport, ResponseKind};
    use std::time::Duration;
    use tokio::sync::mpsc::UnboundedReceiver;

    type Fixture = (
        Arc<ProtocolEngine<ChannelTransport>>,
        ChannelTransport,
        UnboundedReceiver<String>,
    );

    fn engine() -> Fixture {
        let (transport, rx) = ChannelTransport::new();
        let engine = ProtocolEngine::new(
            transport.clone(),
            Arc::new(DeviceState::new()),
            EngineConfig::default(),
        )
        .unwrap();
        (engine, transport, rx)
    }

    fn drain(rx: &mut UnboundedReceiver<String>) -> Vec<String> {
        let mut sent = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            sent.push(frame);
        }
        sent
    }

    #[tokio::test]
    async fn test_first_command_sent_immediately() {
        let (engine, _transport, mut rx) = engine();
        assert!(engine.is_idle());

        engine.query_power_state().unwrap();
        assert_eq!(drain(&mut rx), vec!["\r*POW=?#\r"]);
        assert!(!engine.is_idle());
        assert!(engine.is_watchdog_armed());
    }

    #[tokio::test]
    async fn test_later_commands_wait_for_response() {
        let (engine, transport, mut rx) = engine();
        engine.query_power_state().unwrap();
        engine.query_lamp_hours().unwrap();
        assert_eq!(drain(&mut rx), vec!["\r*POW=?#\r"]);
        assert_eq!(engine.queued_count(), 1);

        transport.deliver("*POW=ON#");
        assert_eq!(drain(&mut rx), vec!["\r*LTIM=?#\r"]);
        assert!(engine.device().power_state());
        assert!(!engine.is_idle());

        transport.deliver("*LTIM=321#");
        assert!(drain(&mut rx).is_empty());
        assert_eq!(engine.device().lamp_hours(), 321);
        assert!(engine.is_idle());
        assert!(!engine.is_watchdog_armed());
    }

    #[tokio::test]
    async fn test_empty_message_ignored() {
        let (engine, transport, _rx) = engine();
        engine.query_power_state().unwrap();
        transport.deliver("");
        assert!(engine.is_watchdog_armed());
        assert_eq!(engine.pending_count(), 1);
    }

    #[tokio::test]
    async fn test_placeholder_never_reaches_queue() {
        let (engine, _transport, mut rx) = engine();
        let err = engine.set_picture_mode(PictureMode::Unknown).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidValue(_)));
        assert_eq!(engine.pending_count(), 0);
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_queue_full() {
        let (transport, _rx) = ChannelTransport::new();
        let config = EngineConfig {
            queue_capacity: 2,
            ..EngineConfig::default()
        };
        let engine = ProtocolEngine::new(transport, Arc::new(DeviceState::new()), config).unwrap();

        engine.query_power_state().unwrap();
        engine.query_lamp_hours().unwrap();
        assert!(matches!(
            engine.query_aspect_ratio(),
            Err(ProtocolError::QueueFull { capacity: 2 })
        ));
    }

    #[tokio::test]
    async fn test_bad_payload_still_advances() {
        let (engine, transport, mut rx) = engine();
        engine
            .enqueue_command("*LTIM=?#", ResponseKind::LampHours.into())
            .unwrap();
        engine.query_power_state().unwrap();
        drain(&mut rx);

        transport.deliver("*LTIM=99999999999#");
        assert_eq!(drain(&mut rx), vec!["\r*POW=?#\r"]);
        assert_eq!(engine.device().lamp_hours(), 0);
    }

    #[tokio::test]
    async fn test_panicking_observer_is_contained() {
        let (engine, transport, mut rx) = engine();
        engine.device().subscribe(|_| panic!("observer failure"));

        engine.query_power_state().unwrap();
        engine.query_lamp_hours().unwrap();
        drain(&mut rx);

        transport.deliver("*POW=ON#");
        assert_eq!(engine.pending_count(), 1);
        assert_eq!(drain(&mut rx), vec!["\r*LTIM=?#\r"]);
        assert!(engine.is_watchdog_armed());

        // The engine keeps processing later messages
        transport.deliver("*Block item#");
        assert_eq!(engine.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_failure_recovers_via_watchdog() {
        let (engine, transport, _rx) = engine();
        transport.set_failing(true);

        engine.query_power_state().unwrap();
        assert!(engine.is_watchdog_armed());

        tokio::time::sleep(Duration::from_millis(3100)).await;
        assert_eq!(engine.pending_count(), 0);
        assert!(engine.is_idle());
    }

    #[tokio::test]
    async fn test_update_status_when_off() {
        let (engine, _transport, mut rx) = engine();
        engine.update_status().unwrap();
        assert_eq!(engine.pending_count(), 2);
        assert_eq!(drain(&mut rx), vec!["\r*POW=?#\r"]);
    }

    #[tokio::test]
    async fn test_update_status_when_on_with_known_lamp_hours() {
        let (engine, _transport, _rx) = engine();
        engine.device().set(DeviceChange::PowerState(true));
        engine.device().set(DeviceChange::LampHours(1000));

        engine.update_status().unwrap();
        assert_eq!(engine.pending_count(), 4);
    }

    #[test]
    fn test_requires_runtime() {
        let (transport, _rx) = ChannelTransport::new();
        let result = ProtocolEngine::new(
            transport,
            Arc::new(DeviceState::new()),
            EngineConfig::default(),
        );
        assert!(matches!(result, Err(ProtocolError::NoRuntime)));
    }
}
