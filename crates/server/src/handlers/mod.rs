//! HTTP request handlers.

pub mod admin;
pub mod health;
pub mod publish;
pub mod site;

pub use admin::*;
pub use health::*;
pub use publish::*;
pub use site::*;
