//! Thread-safety of commit and wrapper synthesis: racing first uses must
//! produce one materialization pass, one wrapper per (method, scope), and
//! identical results on every thread.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use serde_json::{json, Value};
use weft::{
    BoundArgs, Chain, Concern, EntityType, Middleware, MiddlewareFactory, Result, Scope,
};
use weft_testkit::init_tracing;

const THREADS: usize = 16;

/// Counts chain executions; a stacked (double-synthesized) wrapper would
/// run it more than once per call.
struct CountingMiddleware {
    executions: Arc<AtomicUsize>,
}

impl Middleware for CountingMiddleware {
    fn call(&self, chain: &mut Chain<'_>) -> Result<Value> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        chain.forward()
    }

    fn name(&self) -> &str {
        "counting"
    }
}

fn counting(executions: Arc<AtomicUsize>) -> MiddlewareFactory {
    MiddlewareFactory::with(BoundArgs::new(), move |_bound| CountingMiddleware {
        executions: executions.clone(),
    })
}

struct DoublingConcern {
    applications: Arc<AtomicUsize>,
}

impl Concern for DoublingConcern {
    fn name(&self) -> &str {
        "doubling"
    }

    fn materialize(&self, class: &EntityType) -> Result<()> {
        self.applications.fetch_add(1, Ordering::SeqCst);
        for scope in [Scope::Instance, Scope::Type] {
            class.define_method(scope, "double", |ctx| {
                let n = ctx.arg(0).and_then(Value::as_i64).unwrap_or_default();
                Ok(json!(n * 2))
            })?;
        }
        Ok(())
    }
}

#[test]
fn racing_first_uses_synthesize_at_most_once() {
    init_tracing();
    let applications = Arc::new(AtomicUsize::new(0));
    let executions = Arc::new(AtomicUsize::new(0));

    let class = EntityType::new("raced");
    class
        .register_concern(DoublingConcern {
            applications: applications.clone(),
        })
        .unwrap();
    class
        .register_middleware(Scope::Type, "double", counting(executions.clone()))
        .unwrap();

    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let class = class.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                class.call("double", vec![json!(21)])
            })
        })
        .collect();

    for handle in handles {
        let result = handle.join().expect("worker panicked");
        assert_eq!(result.unwrap(), json!(42));
    }

    assert!(class.is_committed());
    assert_eq!(applications.load(Ordering::SeqCst), 1);
    // One middleware execution per call: the wrapper was not stacked.
    assert_eq!(executions.load(Ordering::SeqCst), THREADS);
}

#[test]
fn concurrent_explicit_commits_materialize_once() {
    let applications = Arc::new(AtomicUsize::new(0));
    let class = EntityType::new("co_committed");
    class
        .register_concern(DoublingConcern {
            applications: applications.clone(),
        })
        .unwrap();

    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let class = class.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                class.commit()
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("worker panicked").unwrap();
    }

    assert!(class.is_committed());
    assert_eq!(applications.load(Ordering::SeqCst), 1);
}

#[test]
fn instance_and_type_scopes_race_independently() {
    let applications = Arc::new(AtomicUsize::new(0));
    let class = EntityType::new("dual_raced");
    class
        .register_concern(DoublingConcern {
            applications: applications.clone(),
        })
        .unwrap();
    let entity = class.instantiate();

    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let class = class.clone();
            let entity = entity.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                if i % 2 == 0 {
                    class.call("double", vec![json!(7)])
                } else {
                    entity.call("double", vec![json!(7)])
                }
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().expect("worker panicked").unwrap(), json!(14));
    }
    assert_eq!(applications.load(Ordering::SeqCst), 1);
}

#[test]
fn calls_racing_an_in_flight_commit_observe_the_committed_state() {
    // One thread commits explicitly while the rest call; every caller must
    // see either the pre-commit direct slot or the finished wrapper, never
    // a half-built one.
    let applications = Arc::new(AtomicUsize::new(0));
    let class = EntityType::new("mid_commit");
    class
        .register_concern(DoublingConcern {
            applications: applications.clone(),
        })
        .unwrap();

    let barrier = Arc::new(Barrier::new(THREADS + 1));
    let committer = {
        let class = class.clone();
        let barrier = barrier.clone();
        thread::spawn(move || {
            barrier.wait();
            class.commit()
        })
    };
    let callers: Vec<_> = (0..THREADS)
        .map(|_| {
            let class = class.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                class.call("double", vec![json!(3)])
            })
        })
        .collect();

    committer.join().expect("committer panicked").unwrap();
    for handle in callers {
        assert_eq!(handle.join().expect("caller panicked").unwrap(), json!(6));
    }
    assert_eq!(applications.load(Ordering::SeqCst), 1);
}
