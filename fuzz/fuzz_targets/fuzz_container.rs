#![no_main]

//! Fuzz target for container operations
//!
//! Drives random sequences of binds, resolutions and watcher registrations
//! over a small name space and checks the container's guarantees:
//! singletons construct once, watchers fire at most once, undeclared names
//! always fail.

use arbitrary::Arbitrary;
use futures::executor::block_on;
use libfuzzer_sys::fuzz_target;
use service_container::{Container, DiError};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

const NAMES: [&str; 4] = ["a", "b", "c", "d"];

fn name(index: u8) -> &'static str {
    NAMES[index as usize % NAMES.len()]
}

/// Operations to perform on the container
#[derive(Debug, Arbitrary)]
enum ContainerOp {
    Singleton(u8, u32),
    Transient(u8, u32),
    Failing(u8),
    Make(u8),
    MakePair(u8, u8),
    AfterResolving(u8, u8),
    WaitForBound(u8, u8),
}

fuzz_target!(|ops: Vec<ContainerOp>| {
    let app = Container::new();
    let constructions = Arc::new(AtomicU32::new(0));
    let fired = Arc::new(AtomicU32::new(0));
    let mut watchers = 0u32;
    let mut bound = HashSet::new();
    // Names a single `Make` saw constructed
    let mut cached = HashSet::new();

    for op in ops.into_iter().take(64) {
        match op {
            ContainerOp::Singleton(n, value) => {
                let counter = Arc::clone(&constructions);
                app.singleton_fn(name(n), move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(value)
                });
                bound.insert(name(n));
            }
            ContainerOp::Transient(n, value) => {
                app.transient_fn(name(n), move |_| Ok(value));
                bound.insert(name(n));
            }
            ContainerOp::Failing(n) => {
                let n = name(n);
                app.transient_fn::<u32, _>(n, move |_| Err(DiError::creation_failed(n, "fuzz")));
                bound.insert(n);
            }
            ContainerOp::Make(n) => {
                let n = name(n);
                let before = constructions.load(Ordering::SeqCst);
                let result = block_on(app.make_any(n));

                if !bound.contains(n) {
                    assert!(matches!(result, Err(DiError::UndeclaredService { .. })));
                }
                if result.is_ok() && constructions.load(Ordering::SeqCst) > before {
                    assert!(cached.insert(n), "singleton {n} constructed twice");
                }
            }
            ContainerOp::MakePair(x, y) => {
                let before = constructions.load(Ordering::SeqCst);
                let (a, b) = block_on(futures::future::join(
                    app.make_any(name(x)),
                    app.make_any(name(y)),
                ));
                if x as usize % NAMES.len() == y as usize % NAMES.len() {
                    if let (Ok(a), Ok(b)) = (&a, &b) {
                        if constructions.load(Ordering::SeqCst) > before {
                            assert!(Arc::ptr_eq(a, b));
                        }
                    }
                }
            }
            ContainerOp::AfterResolving(x, y) => {
                let sink = Arc::clone(&fired);
                app.after_resolving([name(x), name(y)], move |services, _| async move {
                    assert!(!services.is_empty());
                    sink.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                });
                watchers += 1;
            }
            ContainerOp::WaitForBound(x, y) => {
                if bound.contains(name(x)) && bound.contains(name(y)) {
                    let _ = block_on(app.wait_for([name(x), name(y)]));
                }
            }
        }

        assert!(fired.load(Ordering::SeqCst) <= watchers);
    }
});
