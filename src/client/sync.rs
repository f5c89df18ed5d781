//! The three poll loops of a client and the screens that own them.
//!
//! - lobby roster poll: refreshes the roster while the session is in the lobby;
//! - transition poll: watches the phase until the race starts (or ends);
//! - race end poll: watches the phase during the race and fetches the results.
//!
//! Transient read failures are logged and retried on the next tick. A terminal
//! failure (the session disappeared) is reported once as
//! [`SyncEvent::SessionLost`] and ends the loop.

use std::{ops::ControlFlow, sync::Arc, time::Duration};

use indexmap::IndexMap;
use tokio::{
    sync::mpsc,
    time::{Interval, MissedTickBehavior, interval},
};
use tracing::{debug, info, warn};

use crate::{
    client::{
        SessionReader,
        context::{ContextSlot, SessionContext},
        poll::PollHandle,
    },
    config::SyncConfig,
    error::ServiceError,
    state::{session::TopicPair, state_machine::SessionPhase},
};

/// Final results shown once the race ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaceResults {
    /// Committed winner.
    pub winner: Option<String>,
    /// Every roster member's trail.
    pub trails: IndexMap<String, Vec<String>>,
}

/// What a client observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// The roster differs from the last one seen.
    RosterChanged(Vec<String>),
    /// The phase differs from the last one seen.
    PhaseChanged(SessionPhase),
    /// The race is in progress with these topics.
    RaceStarted(TopicPair),
    /// The race ended.
    RaceEnded(RaceResults),
    /// The session can no longer be read.
    SessionLost(String),
}

/// Everything a poll loop needs: where to read and where to report.
#[derive(Clone)]
pub struct SyncTarget {
    /// Source of session reads.
    pub reader: Arc<dyn SessionReader>,
    /// Session and player this client represents.
    pub context: SessionContext,
    /// Sink for observations.
    pub events: mpsc::UnboundedSender<SyncEvent>,
}

impl SyncTarget {
    /// Bundle a reader, a context and an event sink.
    pub fn new(
        reader: Arc<dyn SessionReader>,
        context: SessionContext,
        events: mpsc::UnboundedSender<SyncEvent>,
    ) -> Self {
        Self {
            reader,
            context,
            events,
        }
    }

    /// Report an event; breaks when nobody listens anymore.
    fn emit(&self, event: SyncEvent) -> ControlFlow<()> {
        match self.events.send(event) {
            Ok(()) => ControlFlow::Continue(()),
            Err(_) => ControlFlow::Break(()),
        }
    }

    /// Decide whether a failed read is retried or ends the loop.
    fn on_error(&self, poll: &'static str, err: ServiceError) -> ControlFlow<()> {
        if err.is_transient() {
            debug!(poll, error = %err, "poll read failed; retrying next tick");
            return ControlFlow::Continue(());
        }
        warn!(
            poll,
            session_id = %self.context.session_id,
            error = %err,
            "poll read failed permanently; stopping"
        );
        let _ = self.emit(SyncEvent::SessionLost(err.to_string()));
        ControlFlow::Break(())
    }
}

fn ticker(period: Duration) -> Interval {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

/// Await a read raced against the stop signal, then unwrap it or run the error
/// policy: `continue` on transient failures, `break` on terminal ones. A stop
/// request drops the read in flight and breaks out of the loop.
macro_rules! read_or {
    ($target:expr, $stop:expr, $poll:expr, $read:expr) => {{
        let result = tokio::select! {
            biased;
            _ = $stop.stopped() => break,
            result = $read => result,
        };
        if $stop.is_stopped() {
            break;
        }
        match result {
            Ok(value) => value,
            Err(err) => match $target.on_error($poll, err) {
                ControlFlow::Continue(()) => continue,
                ControlFlow::Break(()) => break,
            },
        }
    }};
}

/// Poll the roster every `period` while the session is in the lobby, emitting
/// [`SyncEvent::RosterChanged`] whenever it differs from the last one seen.
pub fn lobby_roster_poll(target: SyncTarget, period: Duration) -> PollHandle {
    const POLL: &str = "lobby roster";
    PollHandle::spawn(POLL, move |mut stop| async move {
        let mut ticker = ticker(period);
        let mut last: Option<Vec<String>> = None;
        loop {
            tokio::select! {
                _ = stop.stopped() => break,
                _ = ticker.tick() => {}
            }

            let phase = read_or!(target, stop, POLL, target.reader.phase(&target.context));
            if phase != SessionPhase::Lobby {
                debug!(%phase, "session left the lobby; roster poll done");
                break;
            }

            let roster = read_or!(target, stop, POLL, target.reader.roster(&target.context));
            if last.as_ref() != Some(&roster) {
                last = Some(roster.clone());
                if target.emit(SyncEvent::RosterChanged(roster)).is_break() {
                    break;
                }
            }
        }
    })
}

/// Poll the phase every `period` until the race starts.
///
/// On `in_progress` the topics are fetched once and [`SyncEvent::RaceStarted`]
/// is emitted. On `ended` (the race finished without this client) the context
/// in `slot` is cleared.
pub fn transition_poll(target: SyncTarget, period: Duration, slot: ContextSlot) -> PollHandle {
    const POLL: &str = "lobby transition";
    PollHandle::spawn(POLL, move |mut stop| async move {
        let mut ticker = ticker(period);
        let mut last: Option<SessionPhase> = None;
        loop {
            tokio::select! {
                _ = stop.stopped() => break,
                _ = ticker.tick() => {}
            }

            let phase = read_or!(target, stop, POLL, target.reader.phase(&target.context));
            if last != Some(phase) {
                last = Some(phase);
                if target.emit(SyncEvent::PhaseChanged(phase)).is_break() {
                    break;
                }
            }

            match phase {
                SessionPhase::Lobby | SessionPhase::Starting => {}
                SessionPhase::InProgress => {
                    let topics =
                        read_or!(target, stop, POLL, target.reader.topics(&target.context));
                    let Some(topics) = topics else {
                        debug!("race in progress but topics not visible yet");
                        continue;
                    };
                    info!(start = %topics.start, target = %topics.target, "race started");
                    let _ = target.emit(SyncEvent::RaceStarted(topics));
                    break;
                }
                SessionPhase::Ended => {
                    info!("session ended before this client joined the race; leaving");
                    slot.leave();
                    break;
                }
            }
        }
    })
}

/// Poll the phase every `period` during the race; once it ended, fetch the
/// winner and trails and emit [`SyncEvent::RaceEnded`] exactly once.
///
/// Reads that already succeeded are kept, so a transient failure only repeats
/// the reads still missing.
pub fn race_end_poll(target: SyncTarget, period: Duration) -> PollHandle {
    const POLL: &str = "race end";
    PollHandle::spawn(POLL, move |mut stop| async move {
        let mut ticker = ticker(period);
        let mut ended = false;
        let mut winner: Option<Option<String>> = None;
        loop {
            tokio::select! {
                _ = stop.stopped() => break,
                _ = ticker.tick() => {}
            }

            if !ended {
                let phase = read_or!(target, stop, POLL, target.reader.phase(&target.context));
                if phase != SessionPhase::Ended {
                    continue;
                }
                ended = true;
            }

            if winner.is_none() {
                winner = Some(read_or!(
                    target,
                    stop,
                    POLL,
                    target.reader.winner(&target.context)
                ));
            }
            let trails = read_or!(target, stop, POLL, target.reader.trails(&target.context));
            let winner = winner.take().flatten();
            info!(winner = ?winner, "race ended");
            let _ = target.emit(SyncEvent::RaceEnded(RaceResults { winner, trails }));
            break;
        }
    })
}

/// Lobby screen: roster refresh plus the watch for the race start.
pub struct LobbyScreen {
    roster: PollHandle,
    transition: PollHandle,
}

impl LobbyScreen {
    /// Start both lobby loops.
    pub fn open(target: SyncTarget, sync: &SyncConfig, slot: ContextSlot) -> Self {
        Self {
            roster: lobby_roster_poll(target.clone(), sync.roster_interval),
            transition: transition_poll(target, sync.transition_interval, slot),
        }
    }

    /// Whether both loops returned on their own.
    pub fn is_finished(&self) -> bool {
        self.roster.is_finished() && self.transition.is_finished()
    }

    /// Stop both loops and wait for them.
    pub async fn close(self) {
        self.roster.stop().await;
        self.transition.stop().await;
    }
}

/// Race screen: watches for the end of the race.
pub struct RaceScreen {
    end: PollHandle,
}

impl RaceScreen {
    /// Start the race end loop.
    pub fn open(target: SyncTarget, sync: &SyncConfig) -> Self {
        Self {
            end: race_end_poll(target, sync.race_interval),
        }
    }

    /// Whether the loop returned on its own.
    pub fn is_finished(&self) -> bool {
        self.end.is_finished()
    }

    /// Stop the loop and wait for it.
    pub async fn close(self) {
        self.end.stop().await;
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io,
        sync::{
            Mutex,
            atomic::{AtomicU32, Ordering},
        },
    };

    use futures::future::BoxFuture;
    use tokio::time::sleep;
    use uuid::Uuid;

    use super::*;
    use crate::{dao::storage::StorageError, state::session::JoinCode};

    #[derive(Default)]
    struct Script {
        phase: Option<SessionPhase>,
        roster: Vec<String>,
        topics: Option<TopicPair>,
        winner: Option<String>,
        trails: IndexMap<String, Vec<String>>,
        failures_left: u32,
        trail_failures: u32,
        missing: bool,
        latency: Option<Duration>,
    }

    /// Reader serving a mutable script; counts every read.
    #[derive(Default)]
    struct ScriptedReader {
        script: Mutex<Script>,
        reads: AtomicU32,
        winner_reads: AtomicU32,
    }

    impl ScriptedReader {
        fn lobby(roster: &[&str]) -> Arc<Self> {
            let reader = Self::default();
            {
                let mut script = reader.script.lock().unwrap();
                script.phase = Some(SessionPhase::Lobby);
                script.roster = roster.iter().map(|name| name.to_string()).collect();
            }
            Arc::new(reader)
        }

        fn edit(&self, change: impl FnOnce(&mut Script)) {
            change(&mut self.script.lock().unwrap());
        }

        fn serve<T: Send + 'static>(
            &self,
            read: impl FnOnce(&Script) -> T,
        ) -> BoxFuture<'static, Result<T, ServiceError>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock().unwrap();
            let result = if script.missing {
                Err(ServiceError::NotFound("session".into()))
            } else if script.failures_left > 0 {
                script.failures_left -= 1;
                Err(unavailable())
            } else {
                Ok(read(&script))
            };
            let latency = script.latency;
            Box::pin(async move {
                if let Some(latency) = latency {
                    sleep(latency).await;
                }
                result
            })
        }
    }

    fn unavailable() -> ServiceError {
        ServiceError::Unavailable(StorageError::unavailable(
            "get".into(),
            io::Error::new(io::ErrorKind::TimedOut, "timeout"),
        ))
    }

    impl SessionReader for ScriptedReader {
        fn phase(
            &self,
            _: &SessionContext,
        ) -> BoxFuture<'static, Result<SessionPhase, ServiceError>> {
            self.serve(|script| script.phase.unwrap_or(SessionPhase::Lobby))
        }

        fn roster(
            &self,
            _: &SessionContext,
        ) -> BoxFuture<'static, Result<Vec<String>, ServiceError>> {
            self.serve(|script| script.roster.clone())
        }

        fn topics(
            &self,
            _: &SessionContext,
        ) -> BoxFuture<'static, Result<Option<TopicPair>, ServiceError>> {
            self.serve(|script| script.topics.clone())
        }

        fn winner(
            &self,
            _: &SessionContext,
        ) -> BoxFuture<'static, Result<Option<String>, ServiceError>> {
            self.winner_reads.fetch_add(1, Ordering::SeqCst);
            self.serve(|script| script.winner.clone())
        }

        fn trails(
            &self,
            _: &SessionContext,
        ) -> BoxFuture<'static, Result<IndexMap<String, Vec<String>>, ServiceError>> {
            {
                let mut script = self.script.lock().unwrap();
                if script.trail_failures > 0 {
                    script.trail_failures -= 1;
                    return Box::pin(async { Err(unavailable()) });
                }
            }
            self.serve(|script| script.trails.clone())
        }
    }

    fn context() -> SessionContext {
        SessionContext::player(Uuid::new_v4(), JoinCode::parse("ABC123").unwrap(), "Ben")
    }

    fn sync_target(
        reader: Arc<ScriptedReader>,
    ) -> (SyncTarget, mpsc::UnboundedReceiver<SyncEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (SyncTarget::new(reader, context(), tx), rx)
    }

    fn dog_to_cat() -> TopicPair {
        TopicPair {
            start: "Dog".into(),
            target: "Cat".into(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn roster_changes_are_emitted_once_each() {
        let reader = ScriptedReader::lobby(&["Ava"]);
        let (target, mut events) = sync_target(reader.clone());
        let handle = lobby_roster_poll(target, Duration::from_secs(2));

        assert_eq!(
            events.recv().await,
            Some(SyncEvent::RosterChanged(vec!["Ava".into()]))
        );
        sleep(Duration::from_secs(5)).await;
        assert!(events.try_recv().is_err());

        reader.edit(|script| script.roster.push("Ben".into()));
        assert_eq!(
            events.recv().await,
            Some(SyncEvent::RosterChanged(vec!["Ava".into(), "Ben".into()]))
        );

        reader.edit(|script| script.phase = Some(SessionPhase::Starting));
        sleep(Duration::from_secs(3)).await;
        assert!(handle.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn transition_poll_emits_topics_and_stops() {
        let reader = ScriptedReader::lobby(&["Ava", "Ben"]);
        let (target, mut events) = sync_target(reader.clone());
        let slot = ContextSlot::new();
        let handle = transition_poll(target, Duration::from_millis(250), slot);

        assert_eq!(
            events.recv().await,
            Some(SyncEvent::PhaseChanged(SessionPhase::Lobby))
        );
        reader.edit(|script| script.phase = Some(SessionPhase::Starting));
        assert_eq!(
            events.recv().await,
            Some(SyncEvent::PhaseChanged(SessionPhase::Starting))
        );
        reader.edit(|script| {
            script.phase = Some(SessionPhase::InProgress);
            script.topics = Some(dog_to_cat());
        });
        assert_eq!(
            events.recv().await,
            Some(SyncEvent::PhaseChanged(SessionPhase::InProgress))
        );
        assert_eq!(events.recv().await, Some(SyncEvent::RaceStarted(dog_to_cat())));

        handle.join().await;
        let reads = reader.reads.load(Ordering::SeqCst);
        sleep(Duration::from_secs(2)).await;
        assert_eq!(reader.reads.load(Ordering::SeqCst), reads);
    }

    #[tokio::test(start_paused = true)]
    async fn ended_session_in_lobby_clears_the_context() {
        let reader = ScriptedReader::lobby(&["Ava"]);
        reader.edit(|script| script.phase = Some(SessionPhase::Ended));
        let (target, mut events) = sync_target(reader);
        let slot = ContextSlot::new();
        slot.enter(target.context.clone());

        transition_poll(target, Duration::from_millis(250), slot.clone())
            .join()
            .await;

        assert_eq!(
            events.recv().await,
            Some(SyncEvent::PhaseChanged(SessionPhase::Ended))
        );
        assert_eq!(slot.current(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn race_end_poll_fetches_results_once() {
        let reader = ScriptedReader::lobby(&["Ava", "Ben"]);
        reader.edit(|script| script.phase = Some(SessionPhase::InProgress));
        let (target, mut events) = sync_target(reader.clone());
        let handle = race_end_poll(target, Duration::from_secs(5));

        sleep(Duration::from_secs(11)).await;
        assert!(events.try_recv().is_err());

        reader.edit(|script| {
            script.phase = Some(SessionPhase::Ended);
            script.winner = Some("Ava".into());
            script
                .trails
                .insert("Ava".into(), vec!["Dog".into(), "Cat".into()]);
            script.trails.insert("Ben".into(), Vec::new());
        });
        let Some(SyncEvent::RaceEnded(results)) = events.recv().await else {
            panic!("expected race results");
        };
        assert_eq!(results.winner.as_deref(), Some("Ava"));
        assert_eq!(results.trails["Ava"], vec!["Dog", "Cat"]);

        handle.join().await;
        assert!(events.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried() {
        let reader = ScriptedReader::lobby(&["Ava"]);
        reader.edit(|script| script.failures_left = 3);
        let (target, mut events) = sync_target(reader.clone());
        let _handle = lobby_roster_poll(target, Duration::from_secs(2));

        assert_eq!(
            events.recv().await,
            Some(SyncEvent::RosterChanged(vec!["Ava".into()]))
        );
        assert!(reader.reads.load(Ordering::SeqCst) >= 5);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_session_is_reported_once_and_stops() {
        let reader = ScriptedReader::lobby(&["Ava"]);
        reader.edit(|script| script.missing = true);
        let (target, mut events) = sync_target(reader.clone());

        race_end_poll(target, Duration::from_secs(5)).join().await;

        assert!(matches!(
            events.recv().await,
            Some(SyncEvent::SessionLost(_))
        ));
        assert!(events.recv().await.is_none());
        assert_eq!(reader.reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn closing_a_screen_stops_its_loops() {
        let reader = ScriptedReader::lobby(&["Ava"]);
        let (target, _events) = sync_target(reader.clone());
        let screen = LobbyScreen::open(target, &SyncConfig::default(), ContextSlot::new());

        sleep(Duration::from_secs(1)).await;
        assert!(!screen.is_finished());
        screen.close().await;

        let reads = reader.reads.load(Ordering::SeqCst);
        sleep(Duration::from_secs(10)).await;
        assert_eq!(reader.reads.load(Ordering::SeqCst), reads);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_a_screen_aborts_its_loop() {
        let reader = ScriptedReader::lobby(&["Ava"]);
        reader.edit(|script| script.phase = Some(SessionPhase::InProgress));
        let (target, _events) = sync_target(reader.clone());
        let screen = RaceScreen::open(target, &SyncConfig::default());

        sleep(Duration::from_secs(1)).await;
        drop(screen);
        tokio::task::yield_now().await;

        let reads = reader.reads.load(Ordering::SeqCst);
        sleep(Duration::from_secs(30)).await;
        assert_eq!(reader.reads.load(Ordering::SeqCst), reads);
    }

    #[tokio::test(start_paused = true)]
    async fn trails_retry_keeps_the_winner_read() {
        let reader = ScriptedReader::lobby(&["Ava", "Ben"]);
        reader.edit(|script| {
            script.phase = Some(SessionPhase::Ended);
            script.winner = Some("Ben".into());
            script.trails.insert("Ben".into(), vec!["Cat".into()]);
            script.trail_failures = 2;
        });
        let (target, mut events) = sync_target(reader.clone());
        let handle = race_end_poll(target, Duration::from_secs(5));

        let Some(SyncEvent::RaceEnded(results)) = events.recv().await else {
            panic!("expected race results");
        };
        assert_eq!(results.winner.as_deref(), Some("Ben"));
        assert_eq!(results.trails["Ben"], vec!["Cat"]);
        assert_eq!(reader.winner_reads.load(Ordering::SeqCst), 1);
        handle.join().await;
    }

    #[tokio::test(start_paused = true)]
    async fn closing_the_lobby_cancels_reads_in_flight() {
        let reader = ScriptedReader::lobby(&["Ava", "Ben"]);
        reader.edit(|script| {
            script.phase = Some(SessionPhase::InProgress);
            script.topics = Some(dog_to_cat());
            script.latency = Some(Duration::from_secs(3));
        });
        let (target, mut events) = sync_target(reader);
        let sync = SyncConfig::default();
        let screen = LobbyScreen::open(target, &sync, ContextSlot::new());

        sleep(Duration::from_millis(100)).await;
        let closing = tokio::time::Instant::now();
        screen.close().await;
        assert!(closing.elapsed() < Duration::from_secs(1));

        sleep(Duration::from_secs(10)).await;
        assert_eq!(events.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_transition_poll_leaves_the_context_alone() {
        let reader = ScriptedReader::lobby(&["Ava"]);
        reader.edit(|script| {
            script.phase = Some(SessionPhase::Ended);
            script.latency = Some(Duration::from_secs(3));
        });
        let (target, mut events) = sync_target(reader);
        let slot = ContextSlot::new();
        slot.enter(target.context.clone());
        let handle = transition_poll(target, Duration::from_millis(250), slot.clone());

        sleep(Duration::from_millis(100)).await;
        handle.stop().await;
        sleep(Duration::from_secs(10)).await;

        assert!(slot.current().is_some());
        assert_eq!(events.recv().await, None);
    }
}
