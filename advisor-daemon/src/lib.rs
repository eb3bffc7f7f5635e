//! advisord - knowledge sync and agent daemon for financial advisors
//!
//! Keeps each advisor's Gmail, Google Calendar and HubSpot data embedded
//! and searchable, reacts to newly ingested records with an agent that can
//! create tasks, and answers questions over the same knowledge.
//!
//! ## Components
//!
//! - **Config**: clap arguments with environment fallbacks
//! - **Db**: MongoDB persistence with Atlas vector search
//! - **Clients**: Gmail, Google Calendar and HubSpot HTTP clients
//! - **App**: wiring of stores, connectors, sync and agent
//! - **Scheduler**: poll loop and sync event log for `serve`

pub mod app;
pub mod clients;
pub mod config;
pub mod db;
pub mod scheduler;

pub use app::{App, AppSettings, Connectors, Stores};
pub use config::{Args, Command};
