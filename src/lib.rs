pub mod cache;
pub mod client;
pub mod compose;
pub mod config;
pub mod error;
pub mod models;
pub mod mutation;
pub mod notify;
pub mod observe;
pub mod projector;
pub mod registry;
pub mod remote;
pub mod session;
pub mod store;
pub mod view;

pub use client::BmailClient;
pub use error::{Error, Result};
pub use models::{Label, LabelRole, Mail, ViewState};
