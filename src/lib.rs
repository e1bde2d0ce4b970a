#![doc = "The `taskmaster_auth` library crate."]
#![doc = ""]
#![doc = "This crate contains the authentication core of the Task Master application:"]
#![doc = "the credential store, password hashing, session and single-use tokens, OAuth"]
#![doc = "identity resolution, the auth flows, routing configuration, and error handling."]
#![doc = "It is used by the main binary (`main.rs`) to construct and run the application."]

pub mod auth;
pub mod clock;
pub mod config;
pub mod error;
pub mod mail;
pub mod models;
pub mod routes;
pub mod store;

pub use crate::error::AppError;
