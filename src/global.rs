//! The process-wide container and its access functions.

use crate::{Container, Injectable, Result};
use futures::future::BoxFuture;
use once_cell::sync::Lazy;
use std::sync::Arc;

// Created on first access.
static GLOBAL_CONTAINER: Lazy<Container> = Lazy::new(Container::new);

/// The process-wide container.
///
/// Modules that cannot be handed a `Container` can bind into and resolve
/// from this one.
///
/// # Examples
///
/// ```rust
/// use service_container::global;
///
/// # futures::executor::block_on(async {
/// global().instance("docs.global.greeting", String::from("hello"));
///
/// let greeting = service_container::resolve::<String>("docs.global.greeting")
///     .await
///     .unwrap();
/// assert_eq!(*greeting, "hello");
/// # });
/// ```
pub fn global() -> &'static Container {
    &GLOBAL_CONTAINER
}

/// Resolve a service from the process-wide container.
#[inline]
pub fn resolve<T: Injectable>(name: impl Into<String>) -> BoxFuture<'static, Result<Arc<T>>> {
    global().make(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_is_one_instance() {
        global().instance("global.tests.one", 1u8);
        assert!(global().has("global.tests.one"));
    }

    #[tokio::test]
    async fn test_resolve_reads_global() {
        global().singleton_fn("global.tests.port", |_| Ok(8080u16));

        let a = resolve::<u16>("global.tests.port").await.unwrap();
        let b = resolve::<u16>("global.tests.port").await.unwrap();

        assert_eq!(*a, 8080);
        assert!(Arc::ptr_eq(&a, &b));
    }
}
