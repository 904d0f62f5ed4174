//! # service-container - Async Dependency Injection by Name
//!
//! A container that maps service names to factories, builds instances on
//! demand, and tells interested parties when the services they need are
//! declared or produced. Independently written modules can wire themselves
//! together without knowing how each other's services are constructed.
//!
//! ## Features
//!
//! - 🏷️ **Name-keyed** - Any string names a service; typed access downcasts
//! - ⏳ **Async factories** - Factories may await, including other services
//! - 🔂 **Deduplicated singletons** - Concurrent `make` calls share one construction
//! - 👀 **Readiness watchers** - Fire once a set of services is declared or resolved
//! - 🧩 **Service providers** - `register` / `boot` hooks for modular wiring
//! - 📊 **Observable** - Optional tracing integration with JSON or pretty output
//!
//! ## Quick Start
//!
//! ```rust
//! use service_container::Container;
//!
//! struct Config {
//!     database_url: String,
//! }
//!
//! struct Database {
//!     url: String,
//! }
//!
//! # futures::executor::block_on(async {
//! let app = Container::new();
//!
//! app.instance("config", Config { database_url: "postgres://localhost".into() });
//!
//! // Shared: built once, on first use
//! app.singleton("db", |app| async move {
//!     let config = app.make::<Config>("config").await?;
//!     Ok(Database { url: config.database_url.clone() })
//! });
//!
//! let db = app.make::<Database>("db").await.unwrap();
//! assert_eq!(db.url, "postgres://localhost");
//! # });
//! ```
//!
//! ## Watchers
//!
//! ```rust
//! use service_container::Container;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let app = Container::new();
//!
//!     // Wait for names that are not declared yet
//!     let ready = app.wait_for(["mailer", "queue"]);
//!
//!     app.singleton_fn("mailer", |_| Ok(String::from("smtp")));
//!     app.singleton_fn("queue", |_| Ok(String::from("redis")));
//!
//!     let services = ready.await.unwrap();
//!     assert_eq!(*services.get::<String>("queue").unwrap(), "redis");
//! }
//! ```
//!
//! ## Providers
//!
//! ```rust
//! use service_container::{Container, ServiceProvider};
//!
//! struct CacheProvider;
//!
//! impl ServiceProvider for CacheProvider {
//!     fn register(&self, app: &Container) {
//!         app.singleton_fn("cache.size", |_| Ok(1024usize));
//!     }
//!
//!     fn boot(&self, app: &Container) {
//!         assert!(app.has("cache.size"));
//!     }
//! }
//!
//! let app = Container::new();
//! app.use_provider(CacheProvider);
//! app.boot();
//! assert!(app.booted());
//! ```

mod binding;
mod container;
mod error;
mod global;
#[cfg(feature = "logging")]
pub mod logging;
mod provider;
mod storage;
mod watcher;

pub use binding::Instance;
pub use container::*;
pub use error::*;
pub use global::*;
pub use provider::*;
pub use watcher::Services;

// Re-export tracing macros for convenience when logging feature is enabled
#[cfg(feature = "logging")]
pub use tracing::{debug, error, info, trace, warn};

// Re-export for convenience
pub use std::sync::Arc;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        Container, DiError, Injectable, Instance, Result, ServiceProvider, Services, global,
        resolve,
    };
    pub use std::sync::Arc;
}
