//! Application session engine for a job board's easy-apply flow.
//!
//! One session logs a user in, crawls paginated search results,
//! screens each listing against keyword and blacklist terms, submits
//! applications with a cataloged resume under hourly rate limits, and
//! records everything in durable per-user history so no job is ever
//! applied to twice.

pub mod crawler;
pub mod credentials;
pub mod driver;
pub mod error;
pub mod filter;
pub mod ledger;
pub mod models;
pub mod rate_limit;
pub mod resumes;
pub mod session;
pub mod store;
pub mod submit;

pub use credentials::{CookieCache, CredentialStore};
pub use driver::{BrowserOptions, Driver, DriverResult, ElementHandle, WebDriverSession};
pub use error::{DriverError, EngineError, StoreError};
pub use session::{RunReport, SessionConfig, SessionEngine, Transcript};
pub use store::DataDir;
