//! Repository traits for metadata operations.

pub mod packages;
pub mod publish_keys;

pub use packages::PackageRepo;
pub use publish_keys::PublishKeyRepo;
