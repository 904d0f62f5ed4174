//! Provider traits
//!
//! [`Injectable`] marks what can live in the container. [`ServiceProvider`]
//! is the hook pair modules implement to wire themselves in.

use crate::Container;

/// Marker trait for types that can be produced by a binding.
///
/// This is automatically implemented for all types that are `Send + Sync + 'static`.
/// You never need to implement this manually.
pub trait Injectable: Send + Sync + 'static {
    /// Returns the type name for debugging
    #[inline]
    fn type_name_of() -> &'static str
    where
        Self: Sized,
    {
        std::any::type_name::<Self>()
    }
}

// Blanket implementation - everything that's Send + Sync + 'static is Injectable
impl<T: Send + Sync + 'static> Injectable for T {}

/// A module that contributes bindings and startup work.
///
/// Both hooks are optional. `register` runs as soon as the provider is
/// passed to [`Container::use_provider`]; `boot` runs when the container
/// boots, or immediately if it already has.
///
/// Providers should only bind in `register`. Resolving belongs in `boot`,
/// once every provider has had the chance to declare its services.
///
/// # Examples
///
/// ```rust
/// use service_container::{Container, ServiceProvider};
///
/// struct DatabaseProvider;
///
/// impl ServiceProvider for DatabaseProvider {
///     fn register(&self, app: &Container) {
///         app.singleton_fn("db.url", |_| Ok(String::from("postgres://localhost")));
///     }
/// }
///
/// let app = Container::new();
/// app.use_provider(DatabaseProvider);
/// assert!(app.has("db.url"));
/// ```
pub trait ServiceProvider: Send + Sync + 'static {
    /// Declare bindings
    fn register(&self, _app: &Container) {}

    /// Start-up work once every provider is registered
    fn boot(&self, _app: &Container) {}

    /// Name used in logs
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}
