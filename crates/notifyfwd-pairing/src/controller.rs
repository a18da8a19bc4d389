//! Async driver for a [`PairingSession`]
//!
//! Runs the commands a transition asks for and feeds their results back in.
//! The session lock is never held across an `.await`, so `cancel` can land
//! while a probe or dispatch is still in flight; the late result is then
//! discarded by the session.

use crate::dispatch::{ChallengeDispatcher, HttpChallengeDispatcher};
use crate::probe::{HttpVersionProbe, VersionProbe};
use crate::session::{
    Command, PairingEvent, PairingOutcome, PairingPhase, PairingSession, Transition,
};
use crate::storage::AddressStore;
use notifyfwd_core::{Config, Result};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Result of running one command
enum Effect {
    Event(PairingEvent),
    Outcome(PairingOutcome),
    Done,
}

/// Drives one pairing session against real collaborators
pub struct PairingController {
    session: Arc<Mutex<PairingSession>>,
    probe: Arc<dyn VersionProbe>,
    dispatcher: Arc<dyn ChallengeDispatcher>,
    store: Arc<dyn AddressStore>,
    phase_tx: Arc<watch::Sender<PairingPhase>>,
    close_timer: Mutex<Option<JoinHandle<()>>>,
}

impl PairingController {
    pub fn new(
        session: PairingSession,
        probe: Arc<dyn VersionProbe>,
        dispatcher: Arc<dyn ChallengeDispatcher>,
        store: Arc<dyn AddressStore>,
    ) -> Self {
        let (phase_tx, _) = watch::channel(session.phase());
        Self {
            session: Arc::new(Mutex::new(session)),
            probe,
            dispatcher,
            store,
            phase_tx: Arc::new(phase_tx),
            close_timer: Mutex::new(None),
        }
    }

    /// Controller using the HTTP probe and dispatcher
    pub fn from_config(config: &Config, store: Arc<dyn AddressStore>) -> Result<Self> {
        Ok(Self::new(
            PairingSession::new(config),
            Arc::new(HttpVersionProbe::new(config)?),
            Arc::new(HttpChallengeDispatcher::new(config)?),
            store,
        ))
    }

    /// Start a new attempt against `address`.
    ///
    /// Returns `None` if the request was ignored (a network call is already in
    /// flight) or if the attempt was cancelled before its results arrived.
    pub async fn connect(&self, address: &str) -> Option<PairingOutcome> {
        self.drive(PairingEvent::Connect {
            address: address.to_string(),
        })
        .await
    }

    /// Submit a code typed by the user
    pub async fn submit(&self, code: &str) -> Option<PairingOutcome> {
        self.drive(PairingEvent::Submit {
            code: code.to_string(),
        })
        .await
    }

    /// Abandon the current attempt. No notification is sent to the server.
    pub async fn cancel(&self) -> Option<PairingOutcome> {
        self.drive(PairingEvent::Cancel).await
    }

    pub fn phase(&self) -> PairingPhase {
        self.lock_session().phase()
    }

    /// Code of the outstanding challenge, if one exists
    pub fn challenge_code(&self) -> Option<String> {
        self.lock_session()
            .challenge()
            .map(|challenge| challenge.code().to_string())
    }

    /// Watch phase changes (e.g. to disable inputs while busy)
    pub fn subscribe(&self) -> watch::Receiver<PairingPhase> {
        self.phase_tx.subscribe()
    }

    async fn drive(&self, event: PairingEvent) -> Option<PairingOutcome> {
        let mut pending = VecDeque::from([event]);
        let mut last = None;

        while let Some(event) = pending.pop_front() {
            let transition = self.apply(event);
            if transition.outcome.is_some() {
                last = transition.outcome;
            }
            for command in transition.commands {
                match self.execute(command).await {
                    Effect::Event(next) => pending.push_back(next),
                    Effect::Outcome(outcome) => last = Some(outcome),
                    Effect::Done => {}
                }
            }
        }

        last
    }

    fn apply(&self, event: PairingEvent) -> Transition {
        let mut session = self.lock_session();
        let transition = session.handle(event);
        self.phase_tx.send_replace(session.phase());
        transition
    }

    async fn execute(&self, command: Command) -> Effect {
        match command {
            Command::Probe { attempt, base_url } => {
                let outcome = self.probe.probe(&base_url).await;
                Effect::Event(PairingEvent::VersionChecked { attempt, outcome })
            }
            Command::Dispatch {
                attempt,
                base_url,
                code,
            } => {
                let delivered = self.dispatcher.dispatch(&base_url, &code).await;
                Effect::Event(PairingEvent::Dispatched { attempt, delivered })
            }
            Command::Persist { address } => {
                match self.store.save_server_address(&address).await {
                    Ok(()) => Effect::Done,
                    Err(e) => {
                        error!("Failed to save server address {}: {}", address, e);
                        Effect::Outcome(PairingOutcome::StorageFailure {
                            reason: e.to_string(),
                        })
                    }
                }
            }
            Command::ScheduleClose { attempt, delay } => {
                self.schedule_close(attempt, delay);
                Effect::Done
            }
            Command::CancelClose => {
                self.cancel_close();
                Effect::Done
            }
        }
    }

    fn schedule_close(&self, attempt: u64, delay: Duration) {
        let session = Arc::clone(&self.session);
        let phase_tx = Arc::clone(&self.phase_tx);

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let mut session = session.lock().unwrap_or_else(PoisonError::into_inner);
            let transition = session.handle(PairingEvent::CloseElapsed { attempt });
            phase_tx.send_replace(session.phase());
            if transition.outcome.is_some() {
                info!("Pairing attempt {} closed", attempt);
            }
        });

        let previous = self
            .close_timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    fn cancel_close(&self) {
        let handle = self
            .close_timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            debug!("Cancelling pending close");
            handle.abort();
        }
    }

    fn lock_session(&self) -> MutexGuard<'_, PairingSession> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for PairingController {
    fn drop(&mut self) {
        self.cancel_close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::FixedCode;
    use crate::probe::ProbeOutcome;
    use crate::storage::StorageResult;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    struct FakeProbe {
        outcome: ProbeOutcome,
        gate: Option<Arc<Notify>>,
        calls: AtomicUsize,
    }

    impl FakeProbe {
        fn new(outcome: ProbeOutcome) -> Arc<Self> {
            Arc::new(Self {
                outcome,
                gate: None,
                calls: AtomicUsize::new(0),
            })
        }

        fn gated(outcome: ProbeOutcome, gate: Arc<Notify>) -> Arc<Self> {
            Arc::new(Self {
                outcome,
                gate: Some(gate),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl VersionProbe for FakeProbe {
        async fn probe(&self, _base_url: &str) -> ProbeOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            self.outcome.clone()
        }
    }

    #[derive(Default)]
    struct FakeDispatcher {
        fail: bool,
        gate: Option<Arc<Notify>>,
        sent: Mutex<Vec<(String, String)>>,
    }

    impl FakeDispatcher {
        fn gated(gate: Arc<Notify>) -> Arc<Self> {
            Arc::new(Self {
                gate: Some(gate),
                ..Default::default()
            })
        }
    }

    #[async_trait]
    impl ChallengeDispatcher for FakeDispatcher {
        async fn dispatch(&self, base_url: &str, code: &str) -> bool {
            self.sent
                .lock()
                .unwrap()
                .push((base_url.to_string(), code.to_string()));
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            !self.fail
        }
    }

    #[derive(Default)]
    struct RecordingStore {
        saved: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl AddressStore for RecordingStore {
        async fn save_server_address(&self, address: &str) -> StorageResult<()> {
            self.saved.lock().unwrap().push(address.to_string());
            Ok(())
        }

        async fn server_address(&self) -> Option<String> {
            self.saved.lock().unwrap().last().cloned()
        }

        async fn clear(&self) -> StorageResult<()> {
            self.saved.lock().unwrap().clear();
            Ok(())
        }
    }

    struct FailingStore;

    #[async_trait]
    impl AddressStore for FailingStore {
        async fn save_server_address(&self, _address: &str) -> StorageResult<()> {
            Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only").into())
        }

        async fn server_address(&self) -> Option<String> {
            None
        }

        async fn clear(&self) -> StorageResult<()> {
            Ok(())
        }
    }

    struct Harness {
        controller: PairingController,
        probe: Arc<FakeProbe>,
        dispatcher: Arc<FakeDispatcher>,
        store: Arc<RecordingStore>,
    }

    fn harness_with(probe: Arc<FakeProbe>, close_delay: Duration) -> Harness {
        let config = Config::default().with_confirm_close_delay(close_delay);
        let dispatcher = Arc::new(FakeDispatcher::default());
        let store = Arc::new(RecordingStore::default());
        let session = PairingSession::new(&config).with_generator(FixedCode("123456".into()));
        let controller = PairingController::new(
            session,
            probe.clone(),
            dispatcher.clone(),
            store.clone(),
        );
        Harness {
            controller,
            probe,
            dispatcher,
            store,
        }
    }

    fn harness() -> Harness {
        harness_with(
            FakeProbe::new(ProbeOutcome::Compatible),
            Duration::from_millis(20),
        )
    }

    #[tokio::test]
    async fn test_connect_reaches_awaiting_confirmation() {
        let h = harness();
        let outcome = h.controller.connect("192.168.1.20:19283").await;

        assert_eq!(outcome, Some(PairingOutcome::AwaitingCode));
        assert_eq!(h.controller.phase(), PairingPhase::AwaitingConfirmation);

        let code = h.controller.challenge_code().unwrap();
        assert_eq!(code.len(), 6);
        assert!(code.chars().all(|c| c.is_ascii_digit()));

        let sent = h.dispatcher.sent.lock().unwrap().clone();
        assert_eq!(
            sent,
            vec![("http://192.168.1.20:19283".to_string(), code)]
        );
    }

    #[tokio::test]
    async fn test_exact_code_confirms_and_persists_once() {
        let h = harness();
        h.controller.connect("192.168.1.20:19283").await;

        let outcome = h.controller.submit("123456").await;
        assert_eq!(
            outcome,
            Some(PairingOutcome::Confirmed {
                address: "http://192.168.1.20:19283".to_string()
            })
        );
        assert_eq!(h.controller.phase(), PairingPhase::Confirmed);
        assert_eq!(
            h.store.saved.lock().unwrap().clone(),
            vec!["http://192.168.1.20:19283".to_string()]
        );

        let mut phases = h.controller.subscribe();
        tokio::time::timeout(
            Duration::from_secs(2),
            phases.wait_for(|phase| *phase == PairingPhase::Idle),
        )
        .await
        .expect("session did not close")
        .unwrap();

        assert!(h.controller.challenge_code().is_none());
        assert_eq!(h.store.saved.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_wrong_code_keeps_waiting_without_persisting() {
        let h = harness();
        h.controller.connect("host").await;

        let outcome = h.controller.submit("654321").await;
        assert_eq!(outcome, Some(PairingOutcome::CodeMismatch));
        assert_eq!(h.controller.phase(), PairingPhase::AwaitingConfirmation);
        assert!(h.store.saved.lock().unwrap().is_empty());
        assert_eq!(h.dispatcher.sent.lock().unwrap().len(), 1);

        let outcome = h.controller.submit("123456").await;
        assert!(matches!(outcome, Some(PairingOutcome::Confirmed { .. })));
        assert_eq!(h.dispatcher.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_version_mismatch_sends_no_notification() {
        let h = harness_with(
            FakeProbe::new(ProbeOutcome::Mismatch {
                reported: "0.9".to_string(),
            }),
            Duration::from_millis(20),
        );

        let outcome = h.controller.connect("host").await;
        assert_eq!(
            outcome,
            Some(PairingOutcome::VersionMismatch {
                required: "1.0".to_string()
            })
        );
        assert_eq!(h.controller.phase(), PairingPhase::Idle);
        assert!(h.controller.challenge_code().is_none());
        assert!(h.dispatcher.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_failure_reports_connection_failure() {
        let config = Config::default();
        let dispatcher = Arc::new(FakeDispatcher {
            fail: true,
            ..Default::default()
        });
        let controller = PairingController::new(
            PairingSession::new(&config),
            FakeProbe::new(ProbeOutcome::Compatible),
            dispatcher,
            Arc::new(RecordingStore::default()),
        );

        let outcome = controller.connect("host").await;
        assert_eq!(outcome, Some(PairingOutcome::ConnectionFailure));
        assert_eq!(controller.phase(), PairingPhase::Idle);
        assert!(controller.challenge_code().is_none());
    }

    #[tokio::test]
    async fn test_cancel_while_awaiting() {
        let h = harness();
        h.controller.connect("host").await;

        let outcome = h.controller.cancel().await;
        assert_eq!(outcome, Some(PairingOutcome::Cancelled));
        assert_eq!(h.controller.phase(), PairingPhase::Idle);
        assert!(h.controller.challenge_code().is_none());
        assert_eq!(h.controller.submit("123456").await, None);
        assert!(h.store.saved.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_during_probe_discards_late_result() {
        let gate = Arc::new(Notify::new());
        let h = harness_with(
            FakeProbe::gated(ProbeOutcome::Compatible, gate.clone()),
            Duration::from_millis(20),
        );
        let controller = Arc::new(h.controller);

        let mut phases = controller.subscribe();
        let connecting = {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move { controller.connect("host").await })
        };
        phases
            .wait_for(|phase| *phase == PairingPhase::Probing)
            .await
            .unwrap();

        // Second connect while the probe is outstanding is ignored
        assert_eq!(controller.connect("other").await, None);

        assert_eq!(controller.cancel().await, Some(PairingOutcome::Cancelled));
        gate.notify_one();

        assert_eq!(connecting.await.unwrap(), None);
        assert_eq!(controller.phase(), PairingPhase::Idle);
        assert!(controller.challenge_code().is_none());
        assert!(h.dispatcher.sent.lock().unwrap().is_empty());
        assert_eq!(h.probe.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancel_during_dispatch_discards_late_result() {
        let gate = Arc::new(Notify::new());
        let dispatcher = FakeDispatcher::gated(gate.clone());
        let store = Arc::new(RecordingStore::default());
        let controller = Arc::new(PairingController::new(
            PairingSession::new(&Config::default()).with_generator(FixedCode("123456".into())),
            FakeProbe::new(ProbeOutcome::Compatible),
            dispatcher.clone(),
            store.clone(),
        ));

        let mut phases = controller.subscribe();
        let connecting = {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move { controller.connect("host").await })
        };
        phases
            .wait_for(|phase| *phase == PairingPhase::Dispatching)
            .await
            .unwrap();

        assert_eq!(controller.cancel().await, Some(PairingOutcome::Cancelled));
        gate.notify_one();

        assert_eq!(connecting.await.unwrap(), None);
        assert_eq!(controller.phase(), PairingPhase::Idle);
        assert!(controller.challenge_code().is_none());
        assert_eq!(controller.submit("123456").await, None);
        assert!(store.saved.lock().unwrap().is_empty());
        assert_eq!(dispatcher.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reconnect_after_confirm_is_not_closed_by_old_timer() {
        let h = harness_with(
            FakeProbe::new(ProbeOutcome::Compatible),
            Duration::from_millis(30),
        );
        h.controller.connect("first").await;
        h.controller.submit("123456").await;

        let outcome = h.controller.connect("second").await;
        assert_eq!(outcome, Some(PairingOutcome::AwaitingCode));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(h.controller.phase(), PairingPhase::AwaitingConfirmation);
    }

    #[tokio::test]
    async fn test_storage_failure_is_reported() {
        let config = Config::default();
        let controller = PairingController::new(
            PairingSession::new(&config).with_generator(FixedCode("123456".into())),
            FakeProbe::new(ProbeOutcome::Compatible),
            Arc::new(FakeDispatcher::default()),
            Arc::new(FailingStore),
        );
        controller.connect("host").await;

        let outcome = controller.submit("123456").await;
        assert!(matches!(
            outcome,
            Some(PairingOutcome::StorageFailure { .. })
        ));
        assert_eq!(controller.phase(), PairingPhase::Confirmed);
    }
}
