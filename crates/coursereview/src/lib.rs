//! Course review service: the questionnaire-backed OTP sign-in handshake,
//! sessions, course and review browsing, and score voting.

pub mod auth;
pub mod catalog;
pub mod config;
pub mod db;
pub mod external;
pub mod server;
pub mod store;
pub mod types;

pub use server::create_router;
pub use types::AppState;
