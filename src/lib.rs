pub mod audience;
pub mod auth;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod entitlement;
pub mod error;
pub mod generation;
pub mod history;
pub mod mailer;
pub mod models;
pub mod occasion;
pub mod preferences;
pub mod render;
pub mod routes;
pub mod schema;
pub mod state;
pub mod template;
pub mod tone;

pub use dispatch::{DispatchRequest, DispatchSettings, Dispatcher, PassReport};
