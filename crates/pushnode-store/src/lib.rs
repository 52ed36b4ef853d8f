//! # pushnode-store
//!
//! Persistence for a push relay node. [`NodeStore`] is the contract the
//! server runs against; [`Database`] implements it over SQLite and
//! [`SecretStore`] derives users from a passphrase for forward-only nodes.

pub mod database;
pub mod devices;
pub mod migrations;
pub mod models;
pub mod options;
pub mod serverless;
pub mod store;
pub mod users;

mod error;

pub use database::Database;
pub use error::{Result, StoreError};
pub use models::*;
pub use serverless::SecretStore;
pub use store::NodeStore;
