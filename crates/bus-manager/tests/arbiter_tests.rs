use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use bus_manager::{BusArbiter, BusError, BusFactory, BusId};
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use futures::future::{join_all, pending};
use futures_test::future::FutureTestExt;

// ---------------------------------------------------------------------------
// Mock factory
// ---------------------------------------------------------------------------

/// A mock bus that records the exchanges performed on it.
#[derive(Debug)]
struct MockBus {
    label: u32,
    log: Rc<RefCell<Vec<(usize, &'static str)>>>,
    alive: Rc<Cell<bool>>,
}

impl Drop for MockBus {
    fn drop(&mut self) {
        self.alive.set(false);
    }
}

/// Counters for tracking factory calls.
#[derive(Clone, Default)]
struct MockCounters {
    opened: Arc<AtomicUsize>,
    recovered: Arc<AtomicUsize>,
    /// Recoveries that happened while their bus was still alive.
    recovered_early: Arc<AtomicUsize>,
}

struct MockResources {
    label: u32,
    /// If set, the next `create` call fails and clears the flag.
    fail_next: Arc<AtomicBool>,
    counters: MockCounters,
    log: Rc<RefCell<Vec<(usize, &'static str)>>>,
    alive: Rc<Cell<bool>>,
}

struct MockDestructor(MockResources);

struct MockFactory;

#[derive(Debug, PartialEq)]
struct MockError;

impl BusFactory for MockFactory {
    type Bus = MockBus;
    type Resources = MockResources;
    type Destructor = MockDestructor;
    type Error = MockError;

    fn create(
        resources: Self::Resources,
    ) -> Result<(Self::Bus, Self::Destructor), (Self::Error, Self::Resources)>
    {
        resources.counters.opened.fetch_add(1, Ordering::SeqCst);
        if resources.fail_next.swap(false, Ordering::SeqCst) {
            return Err((MockError, resources));
        }
        resources.alive.set(true);
        let bus = MockBus {
            label: resources.label,
            log: resources.log.clone(),
            alive: resources.alive.clone(),
        };
        Ok((bus, MockDestructor(resources)))
    }

    fn recover(destructor: Self::Destructor) -> Self::Resources {
        let resources = destructor.0;
        resources.counters.recovered.fetch_add(1, Ordering::SeqCst);
        if resources.alive.get() {
            resources.counters.recovered_early.fetch_add(1, Ordering::SeqCst);
        }
        resources
    }
}

type Arbiter = BusArbiter<NoopRawMutex, MockFactory, 2>;

const BUS0: BusId = BusId(0);
const BUS1: BusId = BusId(1);

struct Fixture {
    arbiter: Arbiter,
    counters: MockCounters,
    fail_next: Arc<AtomicBool>,
    log: Rc<RefCell<Vec<(usize, &'static str)>>>,
}

fn fixture(fail_first_open: bool) -> Fixture {
    let counters = MockCounters::default();
    let fail_next = Arc::new(AtomicBool::new(fail_first_open));
    let log = Rc::new(RefCell::new(Vec::new()));
    let mut arbiter = Arbiter::new();
    for (id, label) in [(BUS0, 10), (BUS1, 11)] {
        arbiter
            .register(
                id,
                MockResources {
                    label,
                    fail_next: fail_next.clone(),
                    counters: counters.clone(),
                    log: log.clone(),
                    alive: Rc::new(Cell::new(false)),
                },
            )
            .unwrap();
    }
    Fixture { arbiter, counters, fail_next, log }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[futures_test::test]
async fn acquire_lends_the_open_bus() {
    let fx = fixture(false);
    fx.arbiter.open(BUS1).await.unwrap();

    let guard = fx.arbiter.acquire(BUS1).await.unwrap();
    assert_eq!(guard.label, 11);
    assert_eq!(guard.bus_id(), BUS1);
    assert_eq!(fx.arbiter.holders(BUS1), 1);
    assert_eq!(fx.arbiter.holders(BUS0), 0);

    drop(guard);
    assert_eq!(fx.arbiter.holders(BUS1), 0);
}

#[futures_test::test]
async fn unknown_bus_is_rejected() {
    let fx = fixture(false);
    fx.arbiter.open_all().await.unwrap();

    let result = fx.arbiter.acquire(BusId(7)).await;
    assert!(matches!(result, Err(BusError::InvalidBus(BusId(7)))));
    assert_eq!(fx.arbiter.is_open(BusId(7)), None);
}

#[futures_test::test]
async fn closed_bus_is_not_lent() {
    let fx = fixture(false);

    let result = fx.arbiter.acquire(BUS0).await;
    assert!(matches!(result, Err(BusError::NotOpen(BUS0))));
    assert_eq!(fx.arbiter.is_open(BUS0), Some(false));
}

#[futures_test::test]
async fn registration_rejects_duplicates_and_overflow() {
    let mut fx = fixture(false);
    let resources = |label| MockResources {
        label,
        fail_next: fx.fail_next.clone(),
        counters: fx.counters.clone(),
        log: fx.log.clone(),
        alive: Rc::new(Cell::new(false)),
    };

    let dup = resources(99);
    let extra = resources(98);
    assert_eq!(fx.arbiter.register(BUS0, dup), Err(BusError::DuplicateBus(BUS0)));
    assert_eq!(fx.arbiter.register(BusId(2), extra), Err(BusError::CapacityExceeded));
    assert_eq!(fx.arbiter.bus_ids().collect::<Vec<_>>(), vec![BUS0, BUS1]);
}

#[futures_test::test]
async fn factory_error_preserves_resources() {
    let fx = fixture(true);

    let result = fx.arbiter.open(BUS0).await;
    assert_eq!(result, Err(BusError::FactoryError(MockError)));
    assert_eq!(fx.arbiter.is_open(BUS0), Some(false));

    fx.arbiter.open(BUS0).await.unwrap();
    assert_eq!(fx.arbiter.acquire(BUS0).await.unwrap().label, 10);
    assert_eq!(fx.counters.opened.load(Ordering::SeqCst), 2);
}

#[futures_test::test]
async fn open_is_idempotent() {
    let fx = fixture(false);

    fx.arbiter.open(BUS0).await.unwrap();
    fx.arbiter.open(BUS0).await.unwrap();
    assert_eq!(fx.counters.opened.load(Ordering::SeqCst), 1);
    assert_eq!(fx.arbiter.is_open(BUS0), Some(true));
}

#[futures_test::test]
async fn close_and_reopen_cycles() {
    let fx = fixture(false);

    for _ in 0..3 {
        fx.arbiter.open_all().await.unwrap();
        assert_eq!(fx.arbiter.acquire(BUS0).await.unwrap().label, 10);
        fx.arbiter.close_all().await.unwrap();
        assert!(matches!(
            fx.arbiter.acquire(BUS0).await,
            Err(BusError::NotOpen(BUS0))
        ));
    }

    assert_eq!(fx.counters.opened.load(Ordering::SeqCst), 6);
    assert_eq!(fx.counters.recovered.load(Ordering::SeqCst), 6);
}

#[futures_test::test]
async fn close_recovers_resources_after_the_bus_is_gone() {
    let fx = fixture(false);
    fx.arbiter.open(BUS0).await.unwrap();

    let guard = fx.arbiter.acquire(BUS0).await.unwrap();
    let mut close = Box::pin(fx.arbiter.close(BUS0));
    assert!(futures::poll!(close.as_mut()).is_pending());
    assert_eq!(fx.counters.recovered.load(Ordering::SeqCst), 0);

    drop(guard);
    close.await.unwrap();
    assert_eq!(fx.counters.recovered.load(Ordering::SeqCst), 1);
    assert_eq!(fx.counters.recovered_early.load(Ordering::SeqCst), 0);
    assert_eq!(fx.arbiter.is_open(BUS0), Some(false));
}

#[futures_test::test]
async fn held_bus_reports_busy() {
    let fx = fixture(false);
    fx.arbiter.open(BUS0).await.unwrap();

    let guard = fx.arbiter.acquire(BUS0).await.unwrap();
    assert_eq!(fx.arbiter.is_open(BUS0), None);
    drop(guard);
    assert_eq!(fx.arbiter.is_open(BUS0), Some(true));
}

#[futures_test::test]
async fn concurrent_exchanges_never_interleave() {
    let fx = fixture(false);
    fx.arbiter.open_all().await.unwrap();
    let peak = Cell::new(0usize);

    let tasks = (0..8).map(|task| {
        let arbiter = &fx.arbiter;
        let peak = &peak;
        async move {
            let guard = arbiter.acquire(BUS0).await.unwrap();
            peak.set(peak.get().max(arbiter.holders(BUS0)));
            guard.log.borrow_mut().push((task, "write"));

            // Yield between the two halves of the exchange.
            async {}.pending_once().await;

            peak.set(peak.get().max(arbiter.holders(BUS0)));
            guard.log.borrow_mut().push((task, "read"));
        }
    });
    join_all(tasks).await;

    assert_eq!(peak.get(), 1);
    let log = fx.log.borrow();
    assert_eq!(log.len(), 16);
    for pair in log.chunks(2) {
        assert_eq!(pair[0].0, pair[1].0);
        assert_eq!((pair[0].1, pair[1].1), ("write", "read"));
    }
}

#[futures_test::test]
async fn buses_are_independent() {
    let fx = fixture(false);
    fx.arbiter.open_all().await.unwrap();

    let g0 = fx.arbiter.acquire(BUS0).await.unwrap();
    let g1 = fx.arbiter.acquire(BUS1).await.unwrap();
    assert_eq!((g0.label, g1.label), (10, 11));
    assert_eq!(fx.arbiter.holders(BUS0) + fx.arbiter.holders(BUS1), 2);
}

#[futures_test::test]
async fn cancelled_holder_releases_the_bus() {
    let fx = fixture(false);
    fx.arbiter.open(BUS0).await.unwrap();

    let mut holder = Box::pin(async {
        let _guard = fx.arbiter.acquire(BUS0).await.unwrap();
        pending::<()>().await;
    });
    assert!(futures::poll!(holder.as_mut()).is_pending());
    assert_eq!(fx.arbiter.holders(BUS0), 1);

    drop(holder);
    assert_eq!(fx.arbiter.holders(BUS0), 0);
    assert!(fx.arbiter.acquire(BUS0).await.is_ok());
}
