//! Bindings: how a service name turns into an instance
//!
//! A binding pairs a type-erased factory with a sharing policy. Factories
//! receive a handle to the container so they can resolve their own
//! dependencies, and may complete synchronously or asynchronously.
//!
//! Both flavours are erased to the same shape: a function returning a boxed
//! future of an [`Instance`]. The container never needs to know which one
//! it is calling.

use crate::{Container, Injectable, Result};
use futures::future::{self, BoxFuture, FutureExt};
use std::any::Any;
use std::future::Future;
use std::sync::Arc;

#[cfg(feature = "logging")]
use crate::logging::TARGET;
#[cfg(feature = "logging")]
use tracing::trace;

/// A resolved, type-erased service instance.
///
/// Use [`Container::make`] or [`Services::get`](crate::Services::get) to get
/// a typed `Arc<T>` back.
pub type Instance = Arc<dyn Any + Send + Sync>;

/// Type-erased factory function
pub(crate) type FactoryFn = Arc<dyn Fn(Container) -> BoxFuture<'static, Result<Instance>> + Send + Sync>;

/// Stored association between a service name and how to build it.
///
/// Cloning is cheap: the factory is reference counted, so a resolution can
/// keep using the binding it started with even if the name is rebound
/// while it is running.
#[derive(Clone)]
pub(crate) struct Binding {
    factory: FactoryFn,
    shared: bool,
    synchronous: bool,
    type_name: &'static str,
}

impl Binding {
    /// Wrap an async factory
    pub fn from_async<T, F, Fut>(factory: F, shared: bool) -> Self
    where
        T: Injectable,
        F: Fn(Container) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        Self {
            factory: Arc::new(move |app| {
                factory(app)
                    .map(|result| result.map(|value| Arc::new(value) as Instance))
                    .boxed()
            }),
            shared,
            synchronous: false,
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Wrap a factory that produces its instance without suspending
    pub fn from_fn<T, F>(factory: F, shared: bool) -> Self
    where
        T: Injectable,
        F: Fn(&Container) -> Result<T> + Send + Sync + 'static,
    {
        Self {
            factory: Arc::new(move |app| {
                let result = factory(&app).map(|value| Arc::new(value) as Instance);
                future::ready(result).boxed()
            }),
            shared,
            synchronous: true,
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Bind an already-built value; always shared
    pub fn from_instance<T: Injectable>(value: Arc<T>) -> Self {
        let instance = value as Instance;
        Self {
            factory: Arc::new(move |_| future::ready(Ok(Arc::clone(&instance))).boxed()),
            shared: true,
            synchronous: true,
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Run the factory
    #[inline]
    pub fn invoke(&self, app: Container) -> BoxFuture<'static, Result<Instance>> {
        #[cfg(feature = "logging")]
        trace!(
            target: TARGET,
            produces = self.type_name,
            shared = self.shared,
            "Invoking service factory"
        );

        (self.factory)(app)
    }

    /// Whether the produced instance is cached and reused
    #[inline]
    pub fn is_shared(&self) -> bool {
        self.shared
    }

    /// Whether the factory's future is ready on first poll
    #[inline]
    pub fn is_synchronous(&self) -> bool {
        self.synchronous
    }

    /// Name of the type the factory produces
    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl std::fmt::Debug for Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Binding")
            .field("type_name", &self.type_name)
            .field("shared", &self.shared)
            .field("synchronous", &self.synchronous)
            .finish()
    }
}
