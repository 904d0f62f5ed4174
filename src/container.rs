//! The service container
//!
//! The `Container` owns every table: bindings, cached singletons, in-flight
//! singleton constructions, the two watcher lists and the provider list.
//! It is a cheap `Clone` handle; all clones see the same state.

use crate::binding::{Binding, Instance};
use crate::storage::{ServiceStorage, SharedSlot};
use crate::watcher::{dependency_set, BoundCallback, ResolvedCallback, Services, Watcher, WatcherList};
use crate::{DiError, Injectable, Result, ServiceProvider};
use futures::future::{self, BoxFuture, FutureExt};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;

#[cfg(feature = "logging")]
use crate::logging::TARGET;
#[cfg(feature = "logging")]
use tracing::{debug, error, trace};

struct Inner {
    storage: ServiceStorage,
    bound_watchers: WatcherList<BoundCallback>,
    resolved_watchers: WatcherList<ResolvedCallback>,
    providers: Mutex<Vec<Arc<dyn ServiceProvider>>>,
    booted: AtomicBool,
    locked: AtomicBool,
}

/// Name-keyed dependency injection container.
///
/// Services are declared with [`bind`](Self::bind) (or one of its sugars)
/// and produced on demand with [`make`](Self::make). Shared bindings are
/// constructed at most once, even when many `make` calls race for them.
///
/// # Examples
///
/// ```rust
/// use service_container::Container;
///
/// struct Database {
///     url: String,
/// }
///
/// struct UserService {
///     db: std::sync::Arc<Database>,
/// }
///
/// # futures::executor::block_on(async {
/// let app = Container::new();
///
/// app.singleton_fn("db", |_| Ok(Database { url: "postgres://localhost".into() }))
///     .singleton("users", |app| async move {
///         Ok(UserService { db: app.make::<Database>("db").await? })
///     });
///
/// let users = app.make::<UserService>("users").await.unwrap();
/// assert_eq!(users.db.url, "postgres://localhost");
/// # });
/// ```
#[derive(Clone)]
pub struct Container {
    inner: Arc<Inner>,
}

impl Container {
    /// Create an empty container.
    #[inline]
    pub fn new() -> Self {
        #[cfg(feature = "logging")]
        debug!(target: TARGET, "Creating new service container");

        Self::from_storage(ServiceStorage::new())
    }

    /// Create a container with pre-allocated capacity.
    ///
    /// Use this when you know approximately how many services will be bound.
    #[inline]
    pub fn with_capacity(capacity: usize) -> Self {
        #[cfg(feature = "logging")]
        debug!(
            target: TARGET,
            capacity = capacity,
            "Creating new service container with capacity"
        );

        Self::from_storage(ServiceStorage::with_capacity(capacity))
    }

    fn from_storage(storage: ServiceStorage) -> Self {
        Self {
            inner: Arc::new(Inner {
                storage,
                bound_watchers: WatcherList::new(),
                resolved_watchers: WatcherList::new(),
                providers: Mutex::new(Vec::new()),
                booted: AtomicBool::new(false),
                locked: AtomicBool::new(false),
            }),
        }
    }

    // =========================================================================
    // Binding
    // =========================================================================

    /// Bind a name to an async factory.
    ///
    /// Replaces any earlier binding for the name. If the earlier binding was
    /// shared and already resolved, its cached instance is still what `make`
    /// returns.
    ///
    /// Any [`wait_for`](Self::wait_for) / [`on_ready`](Self::on_ready)
    /// watcher whose names are now all bound is fired in the background: on
    /// the current tokio runtime if there is one, on a helper thread if not.
    ///
    /// # Panics
    ///
    /// Panics if the container is [locked](Self::lock). Use
    /// [`try_bind`](Self::try_bind) to get an error instead.
    pub fn bind<T, F, Fut>(&self, name: impl Into<String>, factory: F, shared: bool) -> &Self
    where
        T: Injectable,
        F: Fn(Container) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let name = name.into();
        self.check_not_locked(&name);
        self.insert_binding(name, Binding::from_async(factory, shared))
    }

    /// Like [`bind`](Self::bind), but fails instead of panicking on a locked container.
    pub fn try_bind<T, F, Fut>(&self, name: impl Into<String>, factory: F, shared: bool) -> Result<&Self>
    where
        T: Injectable,
        F: Fn(Container) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let name = name.into();
        if self.is_locked() {
            return Err(DiError::Locked { name });
        }
        Ok(self.insert_binding(name, Binding::from_async(factory, shared)))
    }

    /// Bind a name to a factory that builds its instance without suspending.
    ///
    /// # Panics
    ///
    /// Panics if the container is locked.
    pub fn bind_fn<T, F>(&self, name: impl Into<String>, factory: F, shared: bool) -> &Self
    where
        T: Injectable,
        F: Fn(&Container) -> Result<T> + Send + Sync + 'static,
    {
        let name = name.into();
        self.check_not_locked(&name);
        self.insert_binding(name, Binding::from_fn(factory, shared))
    }

    /// Bind a shared async factory: constructed once, then cached.
    #[inline]
    pub fn singleton<T, F, Fut>(&self, name: impl Into<String>, factory: F) -> &Self
    where
        T: Injectable,
        F: Fn(Container) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        self.bind(name, factory, true)
    }

    /// Bind a shared synchronous factory.
    #[inline]
    pub fn singleton_fn<T, F>(&self, name: impl Into<String>, factory: F) -> &Self
    where
        T: Injectable,
        F: Fn(&Container) -> Result<T> + Send + Sync + 'static,
    {
        self.bind_fn(name, factory, true)
    }

    /// Bind a non-shared async factory: invoked on every `make`.
    #[inline]
    pub fn transient<T, F, Fut>(&self, name: impl Into<String>, factory: F) -> &Self
    where
        T: Injectable,
        F: Fn(Container) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        self.bind(name, factory, false)
    }

    /// Bind a non-shared synchronous factory.
    #[inline]
    pub fn transient_fn<T, F>(&self, name: impl Into<String>, factory: F) -> &Self
    where
        T: Injectable,
        F: Fn(&Container) -> Result<T> + Send + Sync + 'static,
    {
        self.bind_fn(name, factory, false)
    }

    /// Bind an already-built value as a shared service.
    ///
    /// ```rust
    /// use service_container::Container;
    ///
    /// # futures::executor::block_on(async {
    /// let app = Container::new();
    /// app.instance("name", String::from("my-app"));
    ///
    /// let name = app.make::<String>("name").await.unwrap();
    /// assert_eq!(*name, "my-app");
    /// # });
    /// ```
    pub fn instance<T: Injectable>(&self, name: impl Into<String>, value: T) -> &Self {
        let name = name.into();
        self.check_not_locked(&name);
        self.insert_binding(name, Binding::from_instance(Arc::new(value)))
    }

    fn insert_binding(&self, name: String, binding: Binding) -> &Self {
        #[cfg(feature = "logging")]
        let (shared, produces) = (binding.is_shared(), binding.type_name());

        let _replaced = self.inner.storage.bind(name.clone(), binding);

        #[cfg(feature = "logging")]
        debug!(
            target: TARGET,
            service = %name,
            shared = shared,
            produces = produces,
            replaced = _replaced,
            service_count = self.inner.storage.len(),
            "Bound service"
        );

        self.process_bound_watchers(&name);
        self
    }

    // =========================================================================
    // Resolution
    // =========================================================================

    /// Resolve a service and downcast it to `T`.
    ///
    /// Fails with [`DiError::UndeclaredService`] if nothing is bound under
    /// `name`, and with [`DiError::TypeMismatch`] if the instance is not a `T`.
    /// Factory errors are passed through unchanged.
    ///
    /// The binding lookup and, for shared bindings, joining the in-flight
    /// construction happen when `make` is called, not when the returned
    /// future is first polled.
    pub fn make<T: Injectable>(&self, name: impl Into<String>) -> BoxFuture<'static, Result<Arc<T>>> {
        let name = name.into();
        let pending = self.make_any(name.clone());

        async move {
            pending
                .await?
                .downcast::<T>()
                .map_err(|_| DiError::type_mismatch::<T>(name))
        }
        .boxed()
    }

    /// Resolve a service without downcasting it.
    pub fn make_any(&self, name: impl Into<String>) -> BoxFuture<'static, Result<Instance>> {
        let name = name.into();

        let Some(binding) = self.inner.storage.binding(&name) else {
            #[cfg(feature = "logging")]
            debug!(
                target: TARGET,
                service = %name,
                "Service not found in container"
            );
            return future::ready(Err(DiError::undeclared(name))).boxed();
        };

        if !binding.is_shared() {
            return self.make_instance(name, binding);
        }

        let slot = self
            .inner
            .storage
            .shared_slot(&name, || self.make_singleton(name.clone(), binding));

        match slot {
            SharedSlot::Ready(instance) => {
                #[cfg(feature = "logging")]
                trace!(
                    target: TARGET,
                    service = %name,
                    "Service resolved from shared cache"
                );
                future::ready(Ok(instance)).boxed()
            }
            SharedSlot::Pending(pending) => {
                #[cfg(feature = "logging")]
                trace!(
                    target: TARGET,
                    service = %name,
                    "Awaiting in-flight singleton construction"
                );
                pending.boxed()
            }
        }
    }

    /// Resolve a service without awaiting.
    ///
    /// Works for services bound with [`bind_fn`](Self::bind_fn), its sugars
    /// or [`instance`](Self::instance), and for shared services that are
    /// already cached. Resolved watchers this call fires run inline, so
    /// synchronous code such as [`ServiceProvider::boot`] can resolve
    /// services without an executor.
    ///
    /// Fails with [`DiError::NotSynchronous`] if the binding has an async
    /// factory and nothing is cached, or if the resolution suspends anyway:
    /// a resolved watcher awaited something, or another task is driving the
    /// same construction. Work already started then finishes in the
    /// background.
    ///
    /// ```rust
    /// use service_container::{Container, DiError};
    ///
    /// let app = Container::new();
    /// app.singleton_fn("port", |_| Ok(8080u16));
    /// app.singleton("db", |_| async { Ok(String::from("postgres://localhost")) });
    ///
    /// assert_eq!(*app.make_now::<u16>("port").unwrap(), 8080);
    /// assert_eq!(
    ///     app.make_now::<String>("db").unwrap_err(),
    ///     DiError::not_synchronous("db")
    /// );
    /// ```
    pub fn make_now<T: Injectable>(&self, name: impl Into<String>) -> Result<Arc<T>> {
        let name = name.into();

        if let Some(binding) = self.inner.storage.binding(&name) {
            let cached = binding.is_shared() && self.inner.storage.shared_instance(&name).is_some();
            if !binding.is_synchronous() && !cached {
                #[cfg(feature = "logging")]
                debug!(
                    target: TARGET,
                    service = %name,
                    "Async factory cannot be resolved synchronously"
                );
                return Err(DiError::not_synchronous(name));
            }
        }

        let mut pending = self.make_any(name.clone());
        let instance = match (&mut pending).now_or_never() {
            Some(result) => result?,
            None => {
                #[cfg(feature = "logging")]
                debug!(
                    target: TARGET,
                    service = %name,
                    "Synchronous resolve suspended, finishing in the background"
                );

                self.dispatch(pending.map(|_| ()).boxed());
                return Err(DiError::not_synchronous(name));
            }
        };

        instance
            .downcast::<T>()
            .map_err(|_| DiError::type_mismatch::<T>(name))
    }

    /// Run a factory, then resolved watchers
    fn make_instance(&self, name: String, binding: Binding) -> BoxFuture<'static, Result<Instance>> {
        let app = self.clone();

        async move {
            let instance = binding.invoke(app.clone()).await?;
            app.process_resolved_watchers(&name, &instance).await?;
            Ok(instance)
        }
        .boxed()
    }

    /// Build the in-flight future of a shared binding. Not polled here.
    fn make_singleton(&self, name: String, binding: Binding) -> crate::storage::PendingInstance {
        let app = self.clone();

        async move {
            #[cfg(feature = "logging")]
            debug!(
                target: TARGET,
                service = %name,
                "Constructing singleton on first resolve"
            );

            match binding.invoke(app.clone()).await {
                Ok(instance) => {
                    let instance = app.inner.storage.store_shared(&name, instance);
                    app.process_resolved_watchers(&name, &instance).await?;
                    Ok(instance)
                }
                Err(err) => {
                    #[cfg(feature = "logging")]
                    debug!(
                        target: TARGET,
                        service = %name,
                        error = %err,
                        "Singleton construction failed, next make will retry"
                    );

                    app.inner.storage.abandon(&name);
                    Err(err)
                }
            }
        }
        .boxed()
        .shared()
    }

    /// Resolve every name concurrently into an ordered dependency map
    fn resolve_all(&self, deps: Vec<String>) -> BoxFuture<'static, Result<Services>> {
        let pending: Vec<_> = deps.iter().map(|dep| self.make_any(dep.as_str())).collect();

        async move {
            let instances = future::try_join_all(pending).await?;
            let mut services = Services::with_capacity(deps.len());
            for (name, instance) in deps.into_iter().zip(instances) {
                services.push(name, instance);
            }
            Ok(services)
        }
        .boxed()
    }

    // =========================================================================
    // Watchers
    // =========================================================================

    /// Fire the bound watchers that `name` completed
    fn process_bound_watchers(&self, name: &str) {
        let storage = &self.inner.storage;
        let ready = self
            .inner
            .bound_watchers
            .take_ready(name, |deps| storage.is_bound_all(deps).then_some(()));

        for (watcher, ()) in ready {
            #[cfg(feature = "logging")]
            debug!(
                target: TARGET,
                service = %name,
                deps = ?watcher.deps(),
                "Dependencies declared, firing bound watcher"
            );

            self.dispatch(self.fire_bound(watcher));
        }
    }

    fn fire_bound(&self, watcher: Watcher<BoundCallback>) -> BoxFuture<'static, ()> {
        let app = self.clone();
        let (deps, callback) = watcher.into_parts();

        async move {
            let services = app.resolve_all(deps).await;
            if let Err(_err) = callback(services, app).await {
                #[cfg(feature = "logging")]
                error!(
                    target: TARGET,
                    error = %_err,
                    "Bound watcher failed"
                );
            }
        }
        .boxed()
    }

    /// Drive watcher work that has no caller to await it
    fn dispatch(&self, work: BoxFuture<'static, ()>) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(work);
            }
            Err(_) => {
                #[cfg(feature = "logging")]
                trace!(
                    target: TARGET,
                    "No tokio runtime, driving watcher on a helper thread"
                );

                std::thread::spawn(move || futures::executor::block_on(work));
            }
        }
    }

    /// Fire the resolved watchers that `(name, instance)` completed and wait
    /// for their callbacks.
    async fn process_resolved_watchers(&self, name: &str, instance: &Instance) -> Result<()> {
        let storage = &self.inner.storage;
        let ready = self.inner.resolved_watchers.take_ready(name, |deps| {
            let mut services = Services::with_capacity(deps.len());
            for dep in deps {
                let found = if dep == name {
                    Some(Arc::clone(instance))
                } else {
                    storage.shared_instance(dep)
                };
                services.push(dep.clone(), found?);
            }
            Some(services)
        });

        if ready.is_empty() {
            return Ok(());
        }

        #[cfg(feature = "logging")]
        debug!(
            target: TARGET,
            service = %name,
            watchers = ready.len(),
            "Dependencies resolved, firing resolved watchers"
        );

        let callbacks = ready.into_iter().map(|(watcher, services)| {
            let (_, callback) = watcher.into_parts();
            callback(services, self.clone())
        });

        future::join_all(callbacks).await.into_iter().collect()
    }

    /// Call `callback` once every name in `deps` has been resolved.
    ///
    /// Fires on the first resolution that completes the set: the resolving
    /// service is delivered as just produced, every other one must be a
    /// cached singleton. A non-shared dependency is never cached, so it only
    /// counts in the same resolution that produces it.
    ///
    /// The callback is awaited by the `make` that fired it, and its error is
    /// returned from that `make`.
    ///
    /// ```rust
    /// use service_container::Container;
    /// use std::sync::{Arc, Mutex};
    ///
    /// # futures::executor::block_on(async {
    /// let app = Container::new();
    /// app.singleton_fn("a", |_| Ok(1u8));
    /// app.singleton_fn("b", |_| Ok(2u8));
    ///
    /// let seen = Arc::new(Mutex::new(None));
    /// let sink = Arc::clone(&seen);
    /// app.after_resolving(["a", "b"], move |services, _app| async move {
    ///     let sum = *services.get::<u8>("a")? + *services.get::<u8>("b")?;
    ///     *sink.lock().unwrap() = Some(sum);
    ///     Ok(())
    /// });
    ///
    /// app.make::<u8>("a").await.unwrap();
    /// assert_eq!(*seen.lock().unwrap(), None);
    ///
    /// app.make::<u8>("b").await.unwrap();
    /// assert_eq!(*seen.lock().unwrap(), Some(3));
    /// # });
    /// ```
    pub fn after_resolving<I, S, F, Fut>(&self, deps: I, callback: F)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: FnOnce(Services, Container) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let deps = dependency_set(deps);

        #[cfg(feature = "logging")]
        debug!(
            target: TARGET,
            deps = ?deps,
            "Registered resolved watcher"
        );

        let callback: ResolvedCallback = Box::new(move |services, app| callback(services, app).boxed());
        self.inner.resolved_watchers.push(Watcher::new(deps, callback));
    }

    /// Resolve every name in `deps` once all of them are bound.
    ///
    /// If they are all bound already the services are resolved right away.
    /// Otherwise the future stays pending until the last missing name is
    /// bound; it never completes if that does not happen. The watcher is
    /// registered when `wait_for` is called, not when the future is polled.
    ///
    /// ```rust
    /// use service_container::Container;
    ///
    /// #[tokio::main(flavor = "current_thread")]
    /// async fn main() {
    ///     let app = Container::new();
    ///     let ready = app.wait_for(["config"]);
    ///
    ///     app.instance("config", String::from("debug=true"));
    ///
    ///     let services = ready.await.unwrap();
    ///     assert_eq!(*services.get::<String>("config").unwrap(), "debug=true");
    /// }
    /// ```
    pub fn wait_for<I, S>(&self, deps: I) -> BoxFuture<'static, Result<Services>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let (tx, rx) = oneshot::channel();
        let callback: BoundCallback = Box::new(move |services, _app| {
            let _ = tx.send(services);
            future::ready(Ok(())).boxed()
        });

        match self.register_bound_watcher(dependency_set(deps), callback) {
            Some(watcher) => {
                let (deps, _) = watcher.into_parts();
                self.resolve_all(deps)
            }
            None => async move { rx.await.map_err(|_| DiError::WatcherDropped)? }.boxed(),
        }
    }

    /// Call `callback` with every service in `deps` once all of them are bound.
    ///
    /// Fires in the background right away if they are all bound already.
    /// Errors from resolving the dependencies or from the callback itself
    /// have no caller to return to and are logged.
    pub fn on_ready<I, S, F, Fut>(&self, deps: I, callback: F)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: FnOnce(Services, Container) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let callback: BoundCallback = Box::new(move |services, app| match services {
            Ok(services) => callback(services, app).boxed(),
            Err(err) => future::ready(Err(err)).boxed(),
        });

        if let Some(watcher) = self.register_bound_watcher(dependency_set(deps), callback) {
            self.dispatch(self.fire_bound(watcher));
        }
    }

    /// Park a bound watcher, or hand it back if its names are all bound
    fn register_bound_watcher(
        &self,
        deps: Vec<String>,
        callback: BoundCallback,
    ) -> Option<Watcher<BoundCallback>> {
        let storage = &self.inner.storage;
        let ready = self
            .inner
            .bound_watchers
            .push_unless(Watcher::new(deps, callback), |deps| storage.is_bound_all(deps));

        #[cfg(feature = "logging")]
        {
            if ready.is_none() {
                debug!(
                    target: TARGET,
                    pending_watchers = self.inner.bound_watchers.len(),
                    "Registered bound watcher, waiting for declarations"
                );
            }
        }

        ready
    }

    // =========================================================================
    // Providers
    // =========================================================================

    /// Add a service provider.
    ///
    /// Calls its `register` hook now, and its `boot` hook too if the
    /// container has already booted.
    pub fn use_provider<P: ServiceProvider>(&self, provider: P) {
        let provider: Arc<dyn ServiceProvider> = Arc::new(provider);

        #[cfg(feature = "logging")]
        debug!(
            target: TARGET,
            provider = provider.name(),
            booted = self.booted(),
            "Using service provider"
        );

        provider.register(self);

        if self.booted() {
            provider.boot(self);
        }

        self.inner.providers.lock().push(provider);
    }

    /// Boot the container: call every provider's `boot` hook.
    ///
    /// Providers added afterwards are booted as soon as they are used.
    /// Calling `boot` again runs every hook again.
    pub fn boot(&self) {
        self.inner.booted.store(true, Ordering::Release);

        let providers: Vec<_> = self.inner.providers.lock().clone();

        #[cfg(feature = "logging")]
        debug!(
            target: TARGET,
            providers = providers.len(),
            "Booting container"
        );

        for provider in providers {
            provider.boot(self);
        }
    }

    /// Whether [`boot`](Self::boot) has been called
    #[inline]
    pub fn booted(&self) -> bool {
        self.inner.booted.load(Ordering::Acquire)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Lock the container to prevent further bindings.
    ///
    /// Resolution and watchers keep working.
    #[inline]
    pub fn lock(&self) {
        self.inner.locked.store(true, Ordering::Release);

        #[cfg(feature = "logging")]
        debug!(
            target: TARGET,
            service_count = self.inner.storage.len(),
            "Container locked - no further bindings allowed"
        );
    }

    /// Allow bindings again after [`lock`](Self::lock).
    #[inline]
    pub fn unlock(&self) {
        self.inner.locked.store(false, Ordering::Release);

        #[cfg(feature = "logging")]
        debug!(target: TARGET, "Container unlocked");
    }

    /// Check if the container is locked.
    #[inline]
    pub fn is_locked(&self) -> bool {
        self.inner.locked.load(Ordering::Acquire)
    }

    #[inline]
    fn check_not_locked(&self, name: &str) {
        if self.is_locked() {
            panic!("Cannot bind service \"{name}\": container is locked");
        }
    }

    // =========================================================================
    // Query Methods
    // =========================================================================

    /// Check if a name has a binding
    #[inline]
    pub fn has(&self, name: &str) -> bool {
        self.inner.storage.is_bound(name)
    }

    /// Get the number of bindings
    #[inline]
    pub fn len(&self) -> usize {
        self.inner.storage.len()
    }

    /// Check if nothing is bound
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.storage.is_empty()
    }
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("storage", &self.inner.storage)
            .field("bound_watchers", &self.inner.bound_watchers.len())
            .field("resolved_watchers", &self.inner.resolved_watchers.len())
            .field("providers", &self.inner.providers.lock().len())
            .field("booted", &self.booted())
            .field("locked", &self.is_locked())
            .finish()
    }
}
