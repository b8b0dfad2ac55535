//! Fixed-cadence driver for the rig.
//!
//! [`PollLoop`] owns the transport, the receive buffer and the signal router. Each
//! tick pulls whatever bytes the transport already holds, decodes complete records
//! and routes them; nothing ever waits for the device. Commands are encoded and
//! written from the same owner, so reads and writes never race.
//!
//! The synchronous core (`start` / `tick` / `stop` and the command methods) is what
//! tests drive directly. [`spawn`] runs it on a tokio task at a fixed period and
//! exposes a cloneable [`RigHandle`] plus a bounded event channel.
//!
//! ```text
//!   Idle --start--> Running --stop--> Stopped
//!     \______________stop____________/
//! ```

use bytes::BytesMut;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

use crate::adapters::Transport;
use crate::audio::{AudioPlayer, LoggingAudio};
use crate::config::PollConfig;
use crate::device_config::DeviceConfig;
use crate::error::{AppResult, RigError};
use crate::processing::{LeverClassifier, LickClassifier, RewardConverter};
use crate::protocol::{self, Command, ValveDuration};
use crate::router::{RigEvent, RoutedEvents, SignalRouter};
use crate::session::EventRecorder;

/// How long the driver waits for room in the event channel to deliver `Finished`.
pub const FINISHED_SEND_TIMEOUT: Duration = Duration::from_secs(1);

/// Lifecycle of a poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Constructed, not yet polling.
    Idle,
    /// Polling.
    Running,
    /// Terminal.
    Stopped,
}

impl LoopState {
    fn as_str(self) -> &'static str {
        match self {
            LoopState::Idle => "idle",
            LoopState::Running => "running",
            LoopState::Stopped => "stopped",
        }
    }
}

/// Requests accepted by a running loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RigCommand {
    /// Deliver a reward of the given volume.
    GiveWater(f64),
    /// Open the valve.
    StartWater,
    /// Close the valve.
    StopWater,
    /// Emit a TTL pulse and wait for its echo.
    GiveTtl,
    /// Play a sound on the host.
    PlaySound(u32),
    /// Drop buffered input.
    Reset,
    /// Stop the loop.
    Stop,
}

/// Single-owner rig driver.
pub struct PollLoop<T: Transport> {
    transport: T,
    router: SignalRouter,
    reward: RewardConverter,
    audio: Box<dyn AudioPlayer>,
    recorder: Option<Box<dyn EventRecorder>>,
    rx_buffer: BytesMut,
    period: Duration,
    min_segment: usize,
    state: LoopState,
    awaiting_ttl: bool,
}

impl<T: Transport> PollLoop<T> {
    /// Build a loop from a resolved device configuration.
    ///
    /// Fails if any classifier threshold or the poll cadence is invalid.
    pub fn new(transport: T, device: &DeviceConfig, poll: &PollConfig) -> AppResult<Self> {
        if poll.period_ms == 0 {
            return Err(RigError::Configuration(
                "poll.period_ms must be positive".to_string(),
            ));
        }
        if poll.min_segment < protocol::RECORD_SIZE {
            return Err(RigError::Configuration(format!(
                "poll.min_segment must be at least {}",
                protocol::RECORD_SIZE
            )));
        }
        let router = SignalRouter::new(
            LeverClassifier::new(device.lever)?,
            LickClassifier::new(device.lick)?,
        );
        Ok(Self {
            transport,
            router,
            reward: RewardConverter::from_config(&device.reward)?,
            audio: Box::new(LoggingAudio::new()),
            recorder: None,
            rx_buffer: BytesMut::with_capacity(4096),
            period: poll.period(),
            min_segment: poll.min_segment,
            state: LoopState::Idle,
            awaiting_ttl: false,
        })
    }

    /// Use `audio` for sound requests.
    pub fn with_audio(mut self, audio: impl AudioPlayer + 'static) -> Self {
        self.audio = Box::new(audio);
        self
    }

    /// Report events and commands to `recorder`.
    pub fn with_recorder(mut self, recorder: impl EventRecorder + 'static) -> Self {
        self.recorder = Some(Box::new(recorder));
        self
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Tick period.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Whether a TTL echo is expected.
    pub fn awaiting_ttl(&self) -> bool {
        self.awaiting_ttl
    }

    /// The signal router, for classifier state inspection.
    pub fn router(&self) -> &SignalRouter {
        &self.router
    }

    /// Begin polling. Clears stale input on both the driver and the local buffer.
    pub fn start(&mut self) -> AppResult<()> {
        self.require(&[LoopState::Idle], "start")?;
        self.transport.reset_input_buffer()?;
        self.rx_buffer.clear();
        self.state = LoopState::Running;
        info!(transport = %self.transport.describe(), period_ms = self.period.as_millis() as u64, "Poll loop started");
        Ok(())
    }

    /// Run one poll cycle.
    ///
    /// Returns the events of this cycle, empty when too few bytes are buffered.
    pub fn tick(&mut self) -> AppResult<RoutedEvents> {
        self.require(&[LoopState::Running], "tick")?;
        self.transport.read_available(&mut self.rx_buffer)?;
        if self.rx_buffer.len() <= self.min_segment {
            return Ok(RoutedEvents::new());
        }

        let burst = protocol::decode(&mut self.rx_buffer);
        let events = self.router.route(&burst, self.awaiting_ttl);
        if events
            .iter()
            .any(|event| matches!(event, RigEvent::TtlAcknowledged { .. }))
        {
            self.awaiting_ttl = false;
        }
        if let Some(recorder) = self.recorder.as_mut() {
            for event in &events {
                recorder.record_event(event);
            }
        }
        Ok(events)
    }

    /// Stop polling.
    ///
    /// Returns `Finished` on the first call and `None` afterwards. The recorder is
    /// finished exactly once; a failure to save it is logged, not returned, so the
    /// loop always reaches `Stopped`.
    pub fn stop(&mut self) -> Option<RigEvent> {
        if self.state == LoopState::Stopped {
            return None;
        }
        self.state = LoopState::Stopped;
        if let Some(recorder) = self.recorder.as_mut() {
            recorder.record_event(&RigEvent::Finished);
            if let Err(err) = recorder.finish() {
                error!(error = %err, "Failed to save session record");
            }
        }
        info!("Poll loop stopped");
        Some(RigEvent::Finished)
    }

    /// Drop everything buffered on the input side.
    pub fn reset(&mut self) -> AppResult<()> {
        self.require(&[LoopState::Idle, LoopState::Running], "reset")?;
        self.transport.reset_input_buffer()?;
        self.rx_buffer.clear();
        debug!("Input buffers reset");
        Ok(())
    }

    /// Deliver `volume` of water. Returns the valve opening time in milliseconds.
    pub fn give_water(&mut self, volume: f64) -> AppResult<u32> {
        self.require(&[LoopState::Idle, LoopState::Running], "give water")?;
        let duration = ValveDuration::from_millis(self.reward.duration_ms(volume)?)?;
        self.send(Command::GiveWater(duration))?;
        Ok(duration.as_millis())
    }

    /// Open the valve until `stop_water`.
    pub fn start_water(&mut self) -> AppResult<()> {
        self.require(&[LoopState::Idle, LoopState::Running], "start water")?;
        self.send(Command::StartWater)
    }

    /// Close the valve.
    pub fn stop_water(&mut self) -> AppResult<()> {
        self.require(&[LoopState::Idle, LoopState::Running], "stop water")?;
        self.send(Command::StopWater)
    }

    /// Emit a TTL pulse. Its echo is surfaced as `TtlAcknowledged`.
    pub fn give_ttl(&mut self) -> AppResult<()> {
        self.require(&[LoopState::Idle, LoopState::Running], "send TTL")?;
        self.send(Command::SendTtl)?;
        self.awaiting_ttl = true;
        Ok(())
    }

    /// Play a sound through the attached audio player.
    pub fn play_sound(&mut self, sound_id: u32) -> AppResult<()> {
        self.require(&[LoopState::Idle, LoopState::Running], "play sound")?;
        self.audio.play(sound_id)
    }

    /// Apply a queued request. `Stop` yields `Finished`.
    pub fn apply(&mut self, command: RigCommand) -> AppResult<Option<RigEvent>> {
        match command {
            RigCommand::GiveWater(volume) => self.give_water(volume).map(|_| None),
            RigCommand::StartWater => self.start_water().map(|_| None),
            RigCommand::StopWater => self.stop_water().map(|_| None),
            RigCommand::GiveTtl => self.give_ttl().map(|_| None),
            RigCommand::PlaySound(sound_id) => self.play_sound(sound_id).map(|_| None),
            RigCommand::Reset => self.reset().map(|_| None),
            RigCommand::Stop => Ok(self.stop()),
        }
    }

    fn send(&mut self, command: Command) -> AppResult<()> {
        let frame = protocol::encode(command);
        self.transport.write_all(&frame)?;
        debug!(?command, "Sent command");
        if let Some(recorder) = self.recorder.as_mut() {
            recorder.record_command(&command);
        }
        Ok(())
    }

    fn require(&self, allowed: &[LoopState], operation: &'static str) -> AppResult<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(RigError::InvalidState {
                operation,
                state: self.state.as_str(),
            })
        }
    }
}

impl<T: Transport + 'static> PollLoop<T> {
    /// Drive the loop until `Stop` arrives or every handle is dropped.
    ///
    /// Ticks and requests are served from one task, so a request is applied between
    /// ticks, never during one. Events are pushed without waiting; if the consumer
    /// falls behind and the channel is full, events of that tick are dropped with a
    /// warning. A transport error during a tick stops the loop and is returned.
    /// `Finished` waits at most `FINISHED_SEND_TIMEOUT` for room, so an undrained
    /// channel cannot keep the task alive.
    #[instrument(skip_all, name = "poll_loop")]
    pub async fn run(
        mut self,
        mut requests: mpsc::Receiver<Request>,
        events: mpsc::Sender<RigEvent>,
    ) -> AppResult<()> {
        self.start()?;
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut stop_reply = None;
        let mut outcome = Ok(());
        loop {
            tokio::select! {
                biased;
                request = requests.recv() => match request {
                    Some(Request { command: RigCommand::Stop, reply }) => {
                        stop_reply = Some(reply);
                        break;
                    }
                    Some(Request { command, reply }) => {
                        let result = self.apply(command).map(|_| ());
                        if let Err(err) = &result {
                            warn!(?command, error = %err, "Rig command failed");
                        }
                        // requester may have gone away
                        let _ = reply.send(result);
                    }
                    None => break,
                },
                _ = ticker.tick() => match self.tick() {
                    Ok(batch) => {
                        for event in batch {
                            match events.try_send(event) {
                                Ok(()) => {}
                                Err(mpsc::error::TrySendError::Full(event)) => {
                                    warn!(?event, "Event channel full, dropping event");
                                }
                                Err(mpsc::error::TrySendError::Closed(_)) => {
                                    debug!("Event receiver dropped");
                                }
                            }
                        }
                    }
                    Err(err) => {
                        error!(error = %err, "Poll tick failed");
                        outcome = Err(err);
                        break;
                    }
                },
            }
        }

        let finished = self.stop();
        if let Some(reply) = stop_reply {
            let _ = reply.send(Ok(()));
        }
        if let Some(finished) = finished {
            match events.send_timeout(finished, FINISHED_SEND_TIMEOUT).await {
                Ok(()) => {}
                Err(mpsc::error::SendTimeoutError::Timeout(_)) => {
                    warn!("Event channel not drained, dropping Finished");
                }
                Err(mpsc::error::SendTimeoutError::Closed(_)) => {
                    debug!("Event receiver dropped");
                }
            }
        }
        outcome
    }
}

/// A request and the channel its result goes back on.
#[derive(Debug)]
pub struct Request {
    command: RigCommand,
    reply: oneshot::Sender<AppResult<()>>,
}

/// Cloneable handle to a running loop.
#[derive(Debug, Clone)]
pub struct RigHandle {
    requests: mpsc::Sender<Request>,
}

impl RigHandle {
    /// Send a request and wait until the loop applied it.
    pub async fn send(&self, command: RigCommand) -> AppResult<()> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(Request { command, reply })
            .await
            .map_err(|_| RigError::ChannelClosed)?;
        response.await.map_err(|_| RigError::ChannelClosed)?
    }

    /// Deliver a reward of `volume`.
    pub async fn give_water(&self, volume: f64) -> AppResult<()> {
        self.send(RigCommand::GiveWater(volume)).await
    }

    /// Open the valve.
    pub async fn start_water(&self) -> AppResult<()> {
        self.send(RigCommand::StartWater).await
    }

    /// Close the valve.
    pub async fn stop_water(&self) -> AppResult<()> {
        self.send(RigCommand::StopWater).await
    }

    /// Emit a TTL pulse.
    pub async fn give_ttl(&self) -> AppResult<()> {
        self.send(RigCommand::GiveTtl).await
    }

    /// Play a sound.
    pub async fn play_sound(&self, sound_id: u32) -> AppResult<()> {
        self.send(RigCommand::PlaySound(sound_id)).await
    }

    /// Drop buffered input.
    pub async fn reset(&self) -> AppResult<()> {
        self.send(RigCommand::Reset).await
    }

    /// Stop the loop. Resolves once the loop reached `Stopped`; `Finished` follows on
    /// the event stream unless the stream stays full for `FINISHED_SEND_TIMEOUT`.
    pub async fn stop(&self) -> AppResult<()> {
        self.send(RigCommand::Stop).await
    }
}

/// Start `poll_loop` on a tokio task.
///
/// Returns the request handle, the event stream (capacity `event_capacity`) and the
/// task handle, which resolves when the loop stops.
///
/// # Example
///
/// ```
/// use taskrig::adapters::MockTransport;
/// use taskrig::config::PollConfig;
/// use taskrig::device_config::DeviceConfig;
/// use taskrig::poll_loop::{self, PollLoop};
/// use taskrig::RigEvent;
///
/// let device: DeviceConfig = toml::from_str(
///     r#"
///     lever = { min_rise = 40.0, max_flux = 10.0, max_std = 8.0 }
///     lick = { threshold = 200.0 }
///     reward = { time_coef = [48.5, 12.0] }
///     "#,
/// )?;
/// let rig = PollLoop::new(MockTransport::new(), &device, &PollConfig::default())?;
///
/// tokio_test::block_on(async {
///     let (handle, mut events, task) = poll_loop::spawn(rig, 64);
///     handle.give_water(1.0).await?;
///     handle.stop().await?;
///     assert_eq!(events.recv().await, Some(RigEvent::Finished));
///     task.await.map_err(|_| taskrig::RigError::ChannelClosed)?
/// })?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn spawn<T: Transport + 'static>(
    poll_loop: PollLoop<T>,
    event_capacity: usize,
) -> (RigHandle, mpsc::Receiver<RigEvent>, JoinHandle<AppResult<()>>) {
    let (request_tx, request_rx) = mpsc::channel(32);
    let (event_tx, event_rx) = mpsc::channel(event_capacity.max(1));
    let task = tokio::spawn(poll_loop.run(request_rx, event_tx));
    (
        RigHandle {
            requests: request_tx,
        },
        event_rx,
        task,
    )
}
