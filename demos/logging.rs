//! Example demonstrating logging capabilities
//!
//! Run with JSON logging (production):
//! ```bash
//! cargo run --example logging --features logging-json
//! ```
//!
//! Run with pretty logging (development):
//! ```bash
//! cargo run --example logging --features logging-pretty
//! ```

use service_container::{Container, ServiceProvider};

#[allow(dead_code)]
struct Database {
    url: String,
}

#[allow(dead_code)]
struct UserService {
    db: std::sync::Arc<Database>,
}

struct DatabaseProvider;

impl ServiceProvider for DatabaseProvider {
    fn register(&self, app: &Container) {
        app.singleton("db", |_| async {
            Ok(Database {
                url: "postgres://localhost/mydb".into(),
            })
        });
    }

    fn boot(&self, app: &Container) {
        // Logs: "Registered bound watcher" until "users" is bound
        app.on_ready(["db", "users"], |services, _| async move {
            println!("  [App] Ready: {:?}", services);
            Ok(())
        });
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // JSON if logging-json feature enabled, pretty if logging-pretty
    service_container::logging::init();

    println!("=== Service Container Logging Demo ===\n");

    // Logs: "Creating new service container"
    let app = Container::new();

    // Logs: "Using service provider", "Bound service"
    app.use_provider(DatabaseProvider);

    // Logs: "Booting container"
    app.boot();

    // Logs: "Registered resolved watcher"
    app.after_resolving(["users"], |_, _| async {
        println!("  [App] UserService constructed");
        Ok(())
    });

    // Logs: "Bound service", "Dependencies declared, firing bound watcher"
    app.singleton("users", |app| async move {
        Ok(UserService {
            db: app.make::<Database>("db").await?,
        })
    });

    // Logs: "Constructing singleton on first resolve", "Dependencies resolved, firing resolved watchers"
    let _users = app.make::<UserService>("users").await;

    // Logs: "Service resolved from shared cache"
    let _again = app.make::<UserService>("users").await;

    // Logs: "Service not found in container"
    let missing = app.make::<u32>("missing").await;
    assert!(missing.is_err());

    // Logs: "Container locked"
    app.lock();

    // Give the background watcher a turn before exiting
    tokio::task::yield_now().await;

    println!("\n=== Demo Complete ===");
    println!("Tip: Use --features logging-json for production (JSON output)");
    println!("     Use --features logging-pretty for development (colorful output)");
}
