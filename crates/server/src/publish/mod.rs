//! The publish pipeline.
//!
//! A publish request flows through these stages:
//! 1. `validator` resolves the bearer key and spends it
//! 2. `decoder` reads the body, hashing exactly the bytes that are uploaded
//! 3. `coordinator` streams those bytes into a multipart upload
//! 4. `version` checks and commits the at-most-once version transition
//!
//! `pipeline` wires the stages together and owns the error taxonomy.

pub mod clock;
pub mod coordinator;
pub mod decoder;
pub mod pipeline;
pub mod validator;
pub mod version;

pub use clock::{Clock, SystemClock};
pub use coordinator::{PendingUpload, UploadCoordinator, UploadResult};
pub use decoder::{DecodedPackage, PackageDecoder};
pub use pipeline::{PublishOutcome, PublishPipeline};
pub use validator::PublishKeyValidator;
pub use version::VersionStateMachine;
