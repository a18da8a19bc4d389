//! Pairing session state machine
//!
//! The session holds no I/O. Each call to [`PairingSession::handle`] consumes an
//! event, moves to the next phase and returns the commands the caller must run
//! (network calls, persistence, timers) along with any user-facing outcome.
//! Results of those commands come back in as events tagged with the attempt
//! that requested them; anything arriving for an older attempt, or in a phase
//! that no longer expects it, is ignored.
//!
//! ```text
//! Idle --Connect--> Probing --Compatible--> Dispatching --delivered--> AwaitingConfirmation
//!                      |                        |                         |        ^
//!                      +--Mismatch/Unreachable--+--not delivered--> Idle   |  wrong code
//!                                                                         +--------+
//!                                                                         | right code
//!                                                                         v
//!                                                   Idle <--CloseElapsed-- Confirmed
//! ```
//!
//! `Cancel` returns any non-idle phase to `Idle`.

use crate::address::normalize;
use crate::code::{is_well_formed, CodeGenerator, RandomCode};
use crate::probe::ProbeOutcome;
use chrono::{DateTime, Utc};
use notifyfwd_core::Config;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Where the session currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PairingPhase {
    #[default]
    Idle,
    Probing,
    Dispatching,
    AwaitingConfirmation,
    Confirmed,
}

impl PairingPhase {
    /// A network call is outstanding
    pub fn is_busy(&self) -> bool {
        matches!(self, PairingPhase::Probing | PairingPhase::Dispatching)
    }
}

/// Status of an issued challenge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeStatus {
    Pending,
    Confirmed,
    Rejected,
    Expired,
    Cancelled,
}

/// A single-use verification code
#[derive(Debug, Clone, Serialize)]
pub struct PairingChallenge {
    code: String,
    issued_at: DateTime<Utc>,
    status: ChallengeStatus,
}

impl PairingChallenge {
    fn new(code: String, issued_at: DateTime<Utc>) -> Self {
        Self {
            code,
            issued_at,
            status: ChallengeStatus::Pending,
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    pub fn status(&self) -> ChallengeStatus {
        self.status
    }

    fn is_expired(&self, ttl: Option<Duration>, now: DateTime<Utc>) -> bool {
        let Some(ttl) = ttl else {
            return false;
        };
        match (now - self.issued_at).to_std() {
            Ok(age) => age >= ttl,
            Err(_) => false,
        }
    }
}

/// Inputs to the state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingEvent {
    /// User asked to connect to `address`
    Connect { address: String },
    /// Version probe for `attempt` finished
    VersionChecked { attempt: u64, outcome: ProbeOutcome },
    /// Challenge delivery for `attempt` finished
    Dispatched { attempt: u64, delivered: bool },
    /// User submitted a code
    Submit { code: String },
    /// User cancelled
    Cancel,
    /// Post-confirmation display delay for `attempt` ran out
    CloseElapsed { attempt: u64 },
}

/// Work the caller must carry out after a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Probe {
        attempt: u64,
        base_url: String,
    },
    Dispatch {
        attempt: u64,
        base_url: String,
        code: String,
    },
    /// Hand the confirmed address to the persistence collaborator
    Persist { address: String },
    ScheduleClose { attempt: u64, delay: Duration },
    CancelClose,
}

/// User-visible result of a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingOutcome {
    MissingAddress,
    /// Receiver is reachable but speaks another version
    VersionMismatch { required: String },
    /// Network error, timeout or non-200 status
    ConnectionFailure,
    /// Code delivered, waiting for the user to type it back
    AwaitingCode,
    /// Entered code differs; the same code may be retried
    CodeMismatch,
    ChallengeExpired,
    Confirmed { address: String },
    /// Confirmed, but the address could not be stored
    StorageFailure { reason: String },
    Cancelled,
    /// Session returned to idle after a confirmation
    Closed,
}

impl PairingOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            PairingOutcome::MissingAddress
                | PairingOutcome::VersionMismatch { .. }
                | PairingOutcome::ConnectionFailure
                | PairingOutcome::CodeMismatch
                | PairingOutcome::ChallengeExpired
                | PairingOutcome::StorageFailure { .. }
        )
    }
}

impl fmt::Display for PairingOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PairingOutcome::MissingAddress => write!(f, "Please enter a server address first"),
            PairingOutcome::VersionMismatch { required } => write!(
                f,
                "Server version does not match, version {} is required",
                required
            ),
            PairingOutcome::ConnectionFailure => write!(
                f,
                "Cannot reach the server, check that the address is correct"
            ),
            PairingOutcome::AwaitingCode => {
                write!(f, "Enter the verification code shown on the server")
            }
            PairingOutcome::CodeMismatch => {
                write!(f, "Incorrect verification code, please try again")
            }
            PairingOutcome::ChallengeExpired => {
                write!(f, "Verification code expired, please connect again")
            }
            PairingOutcome::Confirmed { address } => {
                write!(f, "Verified, saved server address {}", address)
            }
            PairingOutcome::StorageFailure { reason } => write!(
                f,
                "Verified, but the server address could not be saved: {}",
                reason
            ),
            PairingOutcome::Cancelled => write!(f, "Pairing cancelled"),
            PairingOutcome::Closed => write!(f, "Pairing finished"),
        }
    }
}

/// What a single event did
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Transition {
    pub outcome: Option<PairingOutcome>,
    pub commands: Vec<Command>,
}

impl Transition {
    fn ignored() -> Self {
        Self::default()
    }

    fn outcome(outcome: PairingOutcome) -> Self {
        Self {
            outcome: Some(outcome),
            commands: Vec::new(),
        }
    }

    fn command(mut self, command: Command) -> Self {
        self.commands.push(command);
        self
    }

    /// Whether the event was discarded
    pub fn is_ignored(&self) -> bool {
        self.outcome.is_none() && self.commands.is_empty()
    }
}

/// One pairing attempt at a time
pub struct PairingSession {
    required_version: String,
    confirm_close_delay: Duration,
    challenge_ttl: Option<Duration>,
    generator: Box<dyn CodeGenerator>,
    phase: PairingPhase,
    attempt: u64,
    base_url: Option<String>,
    challenge: Option<PairingChallenge>,
}

impl PairingSession {
    pub fn new(config: &Config) -> Self {
        Self {
            required_version: config.required_version.clone(),
            confirm_close_delay: config.confirm_close_delay,
            challenge_ttl: config.challenge_ttl,
            generator: Box::new(RandomCode),
            phase: PairingPhase::Idle,
            attempt: 0,
            base_url: None,
            challenge: None,
        }
    }

    /// Replace the code source
    pub fn with_generator(mut self, generator: impl CodeGenerator + 'static) -> Self {
        self.generator = Box::new(generator);
        self
    }

    pub fn phase(&self) -> PairingPhase {
        self.phase
    }

    /// Id of the most recent connect
    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    /// Normalized address of the current attempt
    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    pub fn challenge(&self) -> Option<&PairingChallenge> {
        self.challenge.as_ref()
    }

    /// Apply an event using the current time
    pub fn handle(&mut self, event: PairingEvent) -> Transition {
        self.handle_at(event, Utc::now())
    }

    /// Apply an event as if it happened at `now`
    pub fn handle_at(&mut self, event: PairingEvent, now: DateTime<Utc>) -> Transition {
        match event {
            PairingEvent::Connect { address } => self.on_connect(&address),
            PairingEvent::VersionChecked { attempt, outcome } => {
                self.on_version_checked(attempt, outcome, now)
            }
            PairingEvent::Dispatched { attempt, delivered } => {
                self.on_dispatched(attempt, delivered)
            }
            PairingEvent::Submit { code } => self.on_submit(&code, now),
            PairingEvent::Cancel => self.on_cancel(),
            PairingEvent::CloseElapsed { attempt } => self.on_close_elapsed(attempt),
        }
    }

    fn on_connect(&mut self, address: &str) -> Transition {
        if self.phase.is_busy() {
            debug!("Ignoring connect while {:?}", self.phase);
            return Transition::ignored();
        }

        if address.trim().is_empty() {
            return Transition::outcome(PairingOutcome::MissingAddress);
        }

        let mut transition = Transition::default();
        if self.phase == PairingPhase::Confirmed {
            transition = transition.command(Command::CancelClose);
        }
        self.discard_challenge(ChallengeStatus::Cancelled);

        let base_url = normalize(address);
        self.attempt += 1;
        self.phase = PairingPhase::Probing;
        self.base_url = Some(base_url.clone());
        info!("Pairing attempt {} with {}", self.attempt, base_url);

        transition.command(Command::Probe {
            attempt: self.attempt,
            base_url,
        })
    }

    fn on_version_checked(
        &mut self,
        attempt: u64,
        outcome: ProbeOutcome,
        now: DateTime<Utc>,
    ) -> Transition {
        if !self.is_current(attempt, PairingPhase::Probing) {
            return Transition::ignored();
        }

        match outcome {
            ProbeOutcome::Compatible => {
                let Some(base_url) = self.base_url.clone() else {
                    self.reset();
                    return Transition::outcome(PairingOutcome::ConnectionFailure);
                };
                let code = self.generator.generate();
                self.challenge = Some(PairingChallenge::new(code.clone(), now));
                self.phase = PairingPhase::Dispatching;
                Transition::default().command(Command::Dispatch {
                    attempt,
                    base_url,
                    code,
                })
            }
            ProbeOutcome::Mismatch { reported } => {
                warn!(
                    "Server reports version {:?}, {:?} required",
                    reported, self.required_version
                );
                self.reset();
                Transition::outcome(PairingOutcome::VersionMismatch {
                    required: self.required_version.clone(),
                })
            }
            ProbeOutcome::Unreachable { reason } => {
                warn!("Server unreachable: {}", reason);
                self.reset();
                Transition::outcome(PairingOutcome::ConnectionFailure)
            }
        }
    }

    fn on_dispatched(&mut self, attempt: u64, delivered: bool) -> Transition {
        if !self.is_current(attempt, PairingPhase::Dispatching) {
            return Transition::ignored();
        }

        if delivered {
            self.phase = PairingPhase::AwaitingConfirmation;
            Transition::outcome(PairingOutcome::AwaitingCode)
        } else {
            self.discard_challenge(ChallengeStatus::Cancelled);
            self.reset();
            Transition::outcome(PairingOutcome::ConnectionFailure)
        }
    }

    fn on_submit(&mut self, entered: &str, now: DateTime<Utc>) -> Transition {
        if self.phase != PairingPhase::AwaitingConfirmation || !is_well_formed(entered) {
            return Transition::ignored();
        }
        let ttl = self.challenge_ttl;
        let Some(challenge) = self.challenge.as_mut() else {
            return Transition::ignored();
        };

        if challenge.status == ChallengeStatus::Rejected {
            challenge.status = ChallengeStatus::Pending;
        }

        if challenge.is_expired(ttl, now) {
            challenge.status = ChallengeStatus::Expired;
            info!("Verification code for attempt {} expired", self.attempt);
            self.reset();
            return Transition::outcome(PairingOutcome::ChallengeExpired);
        }

        if challenge.status == ChallengeStatus::Pending && challenge.code == entered {
            challenge.status = ChallengeStatus::Confirmed;
            self.phase = PairingPhase::Confirmed;
            let address = self.base_url.clone().unwrap_or_default();
            info!("Pairing with {} confirmed", address);

            Transition::outcome(PairingOutcome::Confirmed {
                address: address.clone(),
            })
            .command(Command::Persist { address })
            .command(Command::ScheduleClose {
                attempt: self.attempt,
                delay: self.confirm_close_delay,
            })
        } else {
            challenge.status = ChallengeStatus::Rejected;
            debug!("Incorrect verification code for attempt {}", self.attempt);
            Transition::outcome(PairingOutcome::CodeMismatch)
        }
    }

    fn on_cancel(&mut self) -> Transition {
        if self.phase == PairingPhase::Idle {
            return Transition::ignored();
        }

        let mut transition = Transition::outcome(PairingOutcome::Cancelled);
        if self.phase == PairingPhase::Confirmed {
            transition = transition.command(Command::CancelClose);
        }
        info!("Pairing attempt {} cancelled", self.attempt);
        self.discard_challenge(ChallengeStatus::Cancelled);
        self.reset();
        transition
    }

    fn on_close_elapsed(&mut self, attempt: u64) -> Transition {
        if !self.is_current(attempt, PairingPhase::Confirmed) {
            return Transition::ignored();
        }
        self.reset();
        Transition::outcome(PairingOutcome::Closed)
    }

    fn is_current(&self, attempt: u64, phase: PairingPhase) -> bool {
        if attempt != self.attempt || self.phase != phase {
            debug!(
                "Discarding stale result for attempt {} (current {} in {:?})",
                attempt, self.attempt, self.phase
            );
            return false;
        }
        true
    }

    /// Drop the challenge unless it already reached a final status
    fn discard_challenge(&mut self, status: ChallengeStatus) {
        if let Some(mut challenge) = self.challenge.take() {
            if matches!(
                challenge.status,
                ChallengeStatus::Pending | ChallengeStatus::Rejected
            ) {
                challenge.status = status;
            }
            debug!("Discarded challenge ({:?})", challenge.status);
        }
    }

    fn reset(&mut self) {
        self.phase = PairingPhase::Idle;
        self.base_url = None;
        self.challenge = None;
    }
}
