//! notifyfwd Pairing - One-time code handshake with a notification receiver
//!
//! Proves that the person setting up this forwarder can see the receiver's
//! screen: a code is generated here, shown there, and typed back here.
//!
//! # Pairing Flow
//!
//! 1. The entered address is normalized into a base URL (`http://` is assumed)
//! 2. `GET /api/version` must report the required version
//! 3. A 6-digit code is generated and sent with `POST /api/notify`
//! 4. The user types the code shown on the receiver back into this device
//! 5. On a match the base URL is handed to an [`AddressStore`]
//!
//! # Example
//!
//! ```no_run
//! use notifyfwd_core::Config;
//! use notifyfwd_pairing::{FileAddressStore, PairingController, PairingOutcome};
//! use std::sync::Arc;
//!
//! async fn example() {
//!     let store = Arc::new(FileAddressStore::new().await.unwrap());
//!     let controller = PairingController::from_config(&Config::default(), store).unwrap();
//!
//!     if controller.connect("192.168.1.20:19283").await == Some(PairingOutcome::AwaitingCode) {
//!         let outcome = controller.submit("123456").await;
//!         println!("{:?}", outcome);
//!     }
//! }
//! ```

pub mod address;
pub mod code;
pub mod controller;
pub mod dispatch;
pub mod http;
pub mod probe;
pub mod session;
pub mod storage;

pub use address::normalize;
pub use code::{generate_code, CodeEntry, CodeGenerator, FixedCode, RandomCode, CODE_LENGTH};
pub use controller::PairingController;
pub use dispatch::{challenge_request, ChallengeDispatcher, HttpChallengeDispatcher};
pub use probe::{HttpVersionProbe, ProbeOutcome, VersionProbe};
pub use session::{
    ChallengeStatus, Command, PairingChallenge, PairingEvent, PairingOutcome, PairingPhase,
    PairingSession, Transition,
};
pub use storage::{AddressStore, FileAddressStore, StorageError, StorageResult};
