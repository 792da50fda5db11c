//! Tokio driver for native hosts
//!
//! Runs a [`SourceController`] on a single task: host notifications arrive
//! over an unbounded channel, pending timers are slept on with
//! `tokio::time::sleep_until`, and the observable state is republished on
//! `watch` channels after every step. Nothing is spawned and nothing is
//! locked; the controller never leaves the task that runs [`PlayerRuntime::run`].

use crate::{
    controller::SourceController,
    engine::{EngineEvent, EngineFactory, MediaElement},
    quality::QualitySnapshot,
    storage::KeyValueStore,
    Error, MediaAsset, PlaybackPhase, Result, SessionId,
};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info};

/// Host notification for the runtime
#[derive(Debug)]
pub enum PlayerCommand {
    Open {
        asset: MediaAsset,
        reply: oneshot::Sender<SessionId>,
    },
    Close,
    Unmount,
    EngineEvent {
        session: SessionId,
        event: EngineEvent,
    },
    TimeUpdate,
    Pause,
    Seeking,
    PageHidden,
    PageVisible,
    FullscreenChanged,
    SelectQuality {
        value: String,
        reply: oneshot::Sender<Result<()>>,
    },
    Shutdown,
}

/// Drives one controller until shut down
pub struct PlayerRuntime<F: EngineFactory, M, S> {
    controller: SourceController<F, M, S>,
    commands: mpsc::UnboundedReceiver<PlayerCommand>,
    phase_tx: watch::Sender<PlaybackPhase>,
    session_tx: watch::Sender<Option<SessionId>>,
    quality_tx: watch::Sender<QualitySnapshot>,
}

/// Cloneable sender side of a [`PlayerRuntime`]
#[derive(Debug, Clone)]
pub struct PlayerHandle {
    commands: mpsc::UnboundedSender<PlayerCommand>,
    phase_rx: watch::Receiver<PlaybackPhase>,
    session_rx: watch::Receiver<Option<SessionId>>,
    quality_rx: watch::Receiver<QualitySnapshot>,
}

impl<F, M, S> PlayerRuntime<F, M, S>
where
    F: EngineFactory,
    M: MediaElement,
    S: KeyValueStore,
{
    pub fn new(controller: SourceController<F, M, S>) -> (Self, PlayerHandle) {
        let (commands_tx, commands) = mpsc::unbounded_channel();
        let (phase_tx, phase_rx) = watch::channel(controller.phase());
        let (session_tx, session_rx) = watch::channel(controller.session_id());
        let (quality_tx, quality_rx) = watch::channel(controller.quality().snapshot());

        let runtime = Self {
            controller,
            commands,
            phase_tx,
            session_tx,
            quality_tx,
        };
        let handle = PlayerHandle {
            commands: commands_tx,
            phase_rx,
            session_rx,
            quality_rx,
        };
        (runtime, handle)
    }

    /// Process commands and timers until `Shutdown` or until every handle
    /// is dropped, then hand the controller back.
    pub async fn run(mut self) -> SourceController<F, M, S> {
        info!("Player runtime started");
        loop {
            let deadline = self.controller.next_deadline().map(Instant::from_std);

            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(PlayerCommand::Shutdown) | None => break,
                    Some(command) => self.apply(command),
                },
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.controller.poll_timers(Instant::now().into_std());
                }
            }

            self.publish();
        }
        info!("Player runtime stopped");
        self.controller
    }

    fn apply(&mut self, command: PlayerCommand) {
        let now = Instant::now().into_std();
        match command {
            PlayerCommand::Open { asset, reply } => {
                let session = self.controller.open(asset);
                let _ = reply.send(session);
            }
            PlayerCommand::Close => self.controller.close(),
            PlayerCommand::Unmount => self.controller.unmount(),
            PlayerCommand::EngineEvent { session, event } => {
                self.controller.handle_engine_event(session, event, now)
            }
            PlayerCommand::TimeUpdate => self.controller.on_time_update(),
            PlayerCommand::Pause => self.controller.on_pause(),
            PlayerCommand::Seeking => self.controller.on_seeking(),
            PlayerCommand::PageHidden => self.controller.on_page_hidden(),
            PlayerCommand::PageVisible => self.controller.on_page_visible(now),
            PlayerCommand::FullscreenChanged => self.controller.on_fullscreen_change(now),
            PlayerCommand::SelectQuality { value, reply } => {
                let result = self.controller.select_quality(&value);
                if let Err(ref e) = result {
                    debug!(error = %e, value = %value, "Quality pick rejected");
                }
                let _ = reply.send(result);
            }
            // handled by the loop
            PlayerCommand::Shutdown => {}
        }
    }

    fn publish(&self) {
        let phase = self.controller.phase();
        self.phase_tx.send_if_modified(|current| {
            let changed = *current != phase;
            *current = phase;
            changed
        });

        let session = self.controller.session_id();
        self.session_tx.send_if_modified(|current| {
            let changed = *current != session;
            *current = session;
            changed
        });

        let quality = self.controller.quality().snapshot();
        self.quality_tx.send_if_modified(|current| {
            let changed = *current != quality;
            if changed {
                *current = quality;
            }
            changed
        });
    }
}

impl PlayerHandle {
    fn send(&self, command: PlayerCommand) -> Result<()> {
        self.commands.send(command).map_err(|_| Error::RuntimeStopped)
    }

    /// Open `asset`; resolves to the id engine events must carry
    pub async fn open(&self, asset: MediaAsset) -> Result<SessionId> {
        let (reply, rx) = oneshot::channel();
        self.send(PlayerCommand::Open { asset, reply })?;
        rx.await.map_err(|_| Error::RuntimeStopped)
    }

    pub fn close(&self) -> Result<()> {
        self.send(PlayerCommand::Close)
    }

    pub fn unmount(&self) -> Result<()> {
        self.send(PlayerCommand::Unmount)
    }

    pub fn engine_event(&self, session: SessionId, event: EngineEvent) -> Result<()> {
        self.send(PlayerCommand::EngineEvent { session, event })
    }

    pub fn time_update(&self) -> Result<()> {
        self.send(PlayerCommand::TimeUpdate)
    }

    pub fn pause(&self) -> Result<()> {
        self.send(PlayerCommand::Pause)
    }

    pub fn seeking(&self) -> Result<()> {
        self.send(PlayerCommand::Seeking)
    }

    pub fn page_hidden(&self) -> Result<()> {
        self.send(PlayerCommand::PageHidden)
    }

    pub fn page_visible(&self) -> Result<()> {
        self.send(PlayerCommand::PageVisible)
    }

    pub fn fullscreen_changed(&self) -> Result<()> {
        self.send(PlayerCommand::FullscreenChanged)
    }

    /// Apply a picker value as a user quality choice
    pub async fn select_quality(&self, value: impl Into<String>) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(PlayerCommand::SelectQuality {
            value: value.into(),
            reply,
        })?;
        rx.await.map_err(|_| Error::RuntimeStopped)?
    }

    pub fn shutdown(&self) -> Result<()> {
        self.send(PlayerCommand::Shutdown)
    }

    /// Subscribe to phase changes
    pub fn phase(&self) -> watch::Receiver<PlaybackPhase> {
        self.phase_rx.clone()
    }

    pub fn session(&self) -> watch::Receiver<Option<SessionId>> {
        self.session_rx.clone()
    }

    pub fn quality(&self) -> watch::Receiver<QualitySnapshot> {
        self.quality_rx.clone()
    }

    /// Wait until the runtime reports `phase`
    pub async fn wait_for_phase(&self, phase: PlaybackPhase) -> Result<()> {
        let mut rx = self.phase_rx.clone();
        rx.wait_for(|p| *p == phase)
            .await
            .map(|_| ())
            .map_err(|_| Error::RuntimeStopped)
    }

    /// Wait until a session is open and return its id
    pub async fn wait_for_session(&self) -> Result<SessionId> {
        let mut rx = self.session_rx.clone();
        let session = rx
            .wait_for(|s| s.is_some())
            .await
            .map_err(|_| Error::RuntimeStopped)?;
        (*session).ok_or(Error::RuntimeStopped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        mock::{EngineCall, MockEngineFactory, MockMedia},
        EngineError, EngineErrorKind, LevelInfo, MediaId, MemoryStore, PlayerConfig,
    };
    use std::time::Duration;
    use url::Url;

    fn asset(id: u64) -> MediaAsset {
        MediaAsset {
            id: MediaId::from(id),
            manifest_url: Url::parse(&format!("https://cdn.test/movies/{id}/transcoded/master-manifest")).unwrap(),
            fallback_url: Url::parse(&format!("https://cdn.test/movies/{id}/video-file")).unwrap(),
        }
    }

    fn ladder() -> Vec<LevelInfo> {
        vec![
            LevelInfo::new(480, 800_000),
            LevelInfo::new(720, 2_500_000),
            LevelInfo::new(1080, 5_000_000),
        ]
    }

    #[tokio::test(start_paused = true)]
    async fn test_restores_offset_after_settle() {
        let factory = MockEngineFactory::new();
        let media = MockMedia::new();
        let store = MemoryStore::with_entries([("movie_42_time", "137.5"), ("movie_42_quality", "720")]);
        let controller = SourceController::new(PlayerConfig::default(), factory.clone(), media.clone(), store);
        let (runtime, handle) = PlayerRuntime::new(controller);

        let script = async {
            let session = handle.open(asset(42)).await.unwrap();
            handle.wait_for_phase(PlaybackPhase::Loading).await.unwrap();

            handle.engine_event(session, EngineEvent::MediaAttached).unwrap();
            handle
                .engine_event(session, EngineEvent::ManifestParsed { levels: ladder() })
                .unwrap();
            handle.wait_for_phase(PlaybackPhase::Ready).await.unwrap();

            tokio::time::sleep(Duration::from_millis(150)).await;
            assert!(media.seeks().is_empty());

            tokio::time::sleep(Duration::from_millis(100)).await;
            assert_eq!(media.seeks(), vec![137.5]);

            let quality = handle.quality().borrow().clone();
            assert_eq!(quality.active, 1);
            assert_eq!(quality.renditions.len(), 4);

            handle.shutdown().unwrap();
            session
        };

        let (controller, session) = tokio::join!(runtime.run(), script);
        assert!(factory.calls_for(session).contains(&EngineCall::SetNextLevel(1)));
        assert!(controller.store().backend().writes_to("movie_42_quality").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_other_degrades() {
        let factory = MockEngineFactory::new();
        let media = MockMedia::new();
        let controller =
            SourceController::new(PlayerConfig::default(), factory.clone(), media.clone(), MemoryStore::new());
        let (runtime, handle) = PlayerRuntime::new(controller);

        let script = async {
            let session = handle.open(asset(7)).await.unwrap();
            handle
                .engine_event(session, EngineEvent::ManifestParsed { levels: ladder() })
                .unwrap();
            media.set_position(33.0);
            handle
                .engine_event(session, EngineEvent::Error(EngineError::fatal(EngineErrorKind::Other, "bufferAppendError")))
                .unwrap();
            handle.wait_for_phase(PlaybackPhase::Degraded).await.unwrap();

            assert_eq!(media.source(), Some(asset(7).fallback_url));
            assert_eq!(media.seeks(), vec![33.0]);
            assert!(handle.quality().borrow().renditions.is_empty());
            handle.shutdown().unwrap();
        };

        let (controller, ()) = tokio::join!(runtime.run(), script);
        assert!(!controller.has_engine());
        assert_eq!(factory.live_instances(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_select_quality_reports_errors() {
        let controller = SourceController::new(
            PlayerConfig::default(),
            MockEngineFactory::new(),
            MockMedia::new(),
            MemoryStore::new(),
        );
        let (runtime, handle) = PlayerRuntime::new(controller);

        let script = async {
            let err = tokio_test::assert_err!(handle.select_quality("720").await);
            assert!(matches!(err, Error::EngineUnavailable));

            let session = handle.open(asset(3)).await.unwrap();
            handle
                .engine_event(session, EngineEvent::ManifestParsed { levels: ladder() })
                .unwrap();
            let err = tokio_test::assert_err!(handle.select_quality("2160").await);
            assert!(matches!(err, Error::RenditionUnavailable(_)));
            tokio_test::assert_ok!(handle.select_quality("2").await);
            assert_eq!(handle.quality().borrow().active, 2);
            handle.shutdown().unwrap();
        };

        let (controller, ()) = tokio::join!(runtime.run(), script);
        assert_eq!(
            controller.store().backend().writes_to("movie_3_quality"),
            vec!["1080@5000000".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_when_handles_dropped() {
        let controller = SourceController::new(
            PlayerConfig::default(),
            MockEngineFactory::new(),
            MockMedia::new(),
            MemoryStore::new(),
        );
        let (runtime, handle) = PlayerRuntime::new(controller);
        let phase = handle.phase();
        drop(handle);

        let controller = runtime.run().await;
        assert_eq!(controller.phase(), PlaybackPhase::Uninitialized);
        assert_eq!(*phase.borrow(), PlaybackPhase::Uninitialized);
    }
}
