//! Readiness watchers
//!
//! A watcher is a set of service names plus a one-shot callback. The
//! container keeps two lists of them:
//!
//! - bound watchers fire once every name has a binding declared
//! - resolved watchers fire once every name has an instance produced
//!
//! Both lists share [`WatcherList`], which only knows how to hand out the
//! watchers that became ready. A watcher leaves the list in the same
//! critical section that finds it ready, so it can never fire twice.

use crate::binding::Instance;
use crate::{Container, DiError, Injectable, Result};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::sync::Arc;

/// Services delivered to a watcher, in the order the watcher declared them.
///
/// # Examples
///
/// ```rust
/// use service_container::Container;
///
/// # futures::executor::block_on(async {
/// let app = Container::new();
/// app.instance("greeting", String::from("hello"));
/// app.instance("port", 8080u16);
///
/// let services = app.wait_for(["greeting", "port"]).await.unwrap();
///
/// assert_eq!(services.names().collect::<Vec<_>>(), ["greeting", "port"]);
/// assert_eq!(*services.get::<u16>("port").unwrap(), 8080);
/// # });
/// ```
#[derive(Clone, Default)]
pub struct Services {
    entries: Vec<(String, Instance)>,
}

impl Services {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    pub(crate) fn push(&mut self, name: String, instance: Instance) {
        self.entries.push((name, instance));
    }

    /// Get a service by name, downcast to `T`
    pub fn get<T: Injectable>(&self, name: &str) -> Result<Arc<T>> {
        let instance = self.get_any(name).ok_or_else(|| DiError::missing(name))?;
        Arc::clone(instance)
            .downcast::<T>()
            .map_err(|_| DiError::type_mismatch::<T>(name))
    }

    /// Get the type-erased instance for a name
    pub fn get_any(&self, name: &str) -> Option<&Instance> {
        self.entries
            .iter()
            .find(|(entry, _)| entry == name)
            .map(|(_, instance)| instance)
    }

    /// Check if a name is part of this set
    pub fn contains(&self, name: &str) -> bool {
        self.get_any(name).is_some()
    }

    /// Names in declared order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    /// Name/instance pairs in declared order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Instance)> {
        self.entries.iter().map(|(name, instance)| (name.as_str(), instance))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// Callback of a bound watcher. Gets the error instead of the services if
/// resolving the dependencies failed.
pub(crate) type BoundCallback =
    Box<dyn FnOnce(Result<Services>, Container) -> BoxFuture<'static, Result<()>> + Send>;

/// Callback of a resolved watcher
pub(crate) type ResolvedCallback =
    Box<dyn FnOnce(Services, Container) -> BoxFuture<'static, Result<()>> + Send>;

/// Collapse a dependency list into a set, keeping first-seen order
pub(crate) fn dependency_set<I, S>(deps: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut set: Vec<String> = Vec::new();
    for dep in deps {
        let dep = dep.into();
        if !set.contains(&dep) {
            set.push(dep);
        }
    }
    set
}

/// A dependency set and the callback to run once it is satisfied
pub(crate) struct Watcher<C> {
    deps: Vec<String>,
    callback: C,
}

impl<C> Watcher<C> {
    pub fn new(deps: Vec<String>, callback: C) -> Self {
        Self { deps, callback }
    }

    #[inline]
    pub fn deps(&self) -> &[String] {
        &self.deps
    }

    #[inline]
    pub fn depends_on(&self, name: &str) -> bool {
        self.deps.iter().any(|dep| dep == name)
    }

    /// Split into dependency set and callback
    pub fn into_parts(self) -> (Vec<String>, C) {
        (self.deps, self.callback)
    }
}

/// Registered watchers waiting for their dependency sets
pub(crate) struct WatcherList<C> {
    watchers: Mutex<Vec<Watcher<C>>>,
}

impl<C> WatcherList<C> {
    pub fn new() -> Self {
        Self {
            watchers: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, watcher: Watcher<C>) {
        self.watchers.lock().push(watcher);
    }

    /// Register a watcher unless `ready` says its dependencies are already
    /// satisfied, in which case the watcher is handed back to the caller.
    ///
    /// `ready` runs under the list lock, so a concurrent `take_ready` either
    /// sees the new watcher or the state `ready` observed.
    pub fn push_unless<F>(&self, watcher: Watcher<C>, ready: F) -> Option<Watcher<C>>
    where
        F: FnOnce(&[String]) -> bool,
    {
        let mut watchers = self.watchers.lock();
        if ready(watcher.deps()) {
            return Some(watcher);
        }
        watchers.push(watcher);
        None
    }

    /// Remove and return every watcher that depends on `name` and for which
    /// `check` produces a value.
    ///
    /// `check` runs under the list lock and must not touch this list.
    pub fn take_ready<R, F>(&self, name: &str, mut check: F) -> Vec<(Watcher<C>, R)>
    where
        F: FnMut(&[String]) -> Option<R>,
    {
        let mut watchers = self.watchers.lock();
        let mut ready = Vec::new();
        let mut index = 0;

        while index < watchers.len() {
            let found = if watchers[index].depends_on(name) {
                check(watchers[index].deps())
            } else {
                None
            };

            match found {
                Some(value) => ready.push((watchers.remove(index), value)),
                None => index += 1,
            }
        }

        ready
    }

    pub fn len(&self) -> usize {
        self.watchers.lock().len()
    }
}

impl<C> Default for WatcherList<C> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn watcher(deps: &[&str]) -> Watcher<()> {
        Watcher::new(dependency_set(deps.iter().copied()), ())
    }

    #[test]
    fn test_dependency_set_dedupes_in_order() {
        let deps = dependency_set(["b", "a", "b", "c", "a"]);
        assert_eq!(deps, ["b", "a", "c"]);
    }

    #[test]
    fn test_take_ready_only_considers_dependents() {
        let list = WatcherList::new();
        list.push(watcher(&["a", "b"]));
        list.push(watcher(&["c"]));

        let mut checked = Vec::new();
        let ready = list.take_ready("a", |deps| {
            checked.push(deps.to_vec());
            Some(())
        });

        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].0.deps(), ["a", "b"]);
        assert_eq!(checked, [vec!["a".to_string(), "b".to_string()]]);
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_take_ready_consumes_once() {
        let list = WatcherList::new();
        list.push(watcher(&["a"]));

        assert_eq!(list.take_ready("a", |_| Some(())).len(), 1);
        assert!(list.take_ready("a", |_| Some(())).is_empty());
    }

    #[test]
    fn test_take_ready_keeps_unsatisfied() {
        let list = WatcherList::new();
        list.push(watcher(&["a", "b"]));

        assert!(list.take_ready("a", |_| None::<()>).is_empty());
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_take_ready_removes_adjacent_matches() {
        let list = WatcherList::new();
        list.push(watcher(&["a"]));
        list.push(watcher(&["a", "x"]));
        list.push(watcher(&["a"]));

        let ready = list.take_ready("a", |deps| (deps.len() == 1).then_some(()));

        assert_eq!(ready.len(), 2);
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_push_unless_ready_hands_back() {
        let list = WatcherList::new();

        assert!(list.push_unless(watcher(&["a"]), |_| true).is_some());
        assert_eq!(list.len(), 0);

        assert!(list.push_unless(watcher(&["a"]), |_| false).is_none());
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_services_lookup() {
        let mut services = Services::with_capacity(2);
        services.push("name".into(), Arc::new(String::from("svc")));
        services.push("port".into(), Arc::new(80u16));

        assert_eq!(services.len(), 2);
        assert!(services.contains("port"));
        assert_eq!(*services.get::<u16>("port").unwrap(), 80);
        assert_eq!(
            services.get::<u32>("port").unwrap_err(),
            DiError::type_mismatch::<u32>("port")
        );
        assert_eq!(
            services.get::<u16>("host").unwrap_err(),
            DiError::missing("host")
        );
        assert_eq!(format!("{services:?}"), r#"["name", "port"]"#);
    }
}
