//! Конкурентные сценарии: exactly-once конструирование и остановка
//!
//! Реестр сериализует мутации одной блокировкой, конструкторы работают
//! без нее. Эти тесты проверяют наблюдаемые следствия: конструктор
//! class-сервиса выполняется ровно один раз при любом числе
//! конкурентных вызовов, а параллельные разрешения не мешают чужим
//! детекторам циклов.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use common::test_utils::{init_test_logging, CallCounter};
use registry::{RegistryError, Service, ServiceRegistry};

#[derive(Debug)]
struct Shared {
    id: usize,
}
impl Service for Shared {}

#[test]
fn constructor_runs_exactly_once_for_fifty_callers() -> anyhow::Result<()> {
    init_test_logging();
    let registry = Arc::new(ServiceRegistry::new());
    let constructions = CallCounter::new();

    let counter = constructions.clone();
    registry.register_class(
        "shared",
        move |_| {
            let id = counter.increment();
            // Медленный конструктор растягивает окно гонки
            thread::sleep(Duration::from_millis(20));
            Ok(Arc::new(Shared { id }) as _)
        },
        vec![],
    )?;

    let callers = 50;
    let barrier = Arc::new(Barrier::new(callers));
    let handles: Vec<_> = (0..callers)
        .map(|_| {
            let registry = Arc::clone(&registry);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || -> Result<Arc<Shared>, RegistryError> {
                barrier.wait();
                registry.get::<Shared>("shared")
            })
        })
        .collect();

    let mut instances = Vec::with_capacity(callers);
    for handle in handles {
        let instance = handle
            .join()
            .expect("caller thread must not panic")
            .expect("every caller gets the shared instance");
        instances.push(instance);
    }

    assert_eq!(constructions.get(), 1, "constructor must run exactly once");
    for instance in &instances[1..] {
        assert!(Arc::ptr_eq(&instances[0], instance));
        assert_eq!(instance.id, 1);
    }
    Ok(())
}

#[test]
fn factories_construct_per_call_under_concurrency() -> anyhow::Result<()> {
    init_test_logging();
    let registry = Arc::new(ServiceRegistry::new());
    let constructions = CallCounter::new();

    let counter = constructions.clone();
    registry.register_factory(
        "session",
        move |_| {
            let id = counter.increment();
            Ok(Arc::new(Shared { id }) as _)
        },
        vec![],
    )?;

    let callers = 16;
    let handles: Vec<_> = (0..callers)
        .map(|_| {
            let registry = Arc::clone(&registry);
            thread::spawn(move || registry.get::<Shared>("session").map(|_| ()))
        })
        .collect();

    for handle in handles {
        handle
            .join()
            .expect("caller thread must not panic")
            .expect("factory resolution succeeds");
    }

    assert_eq!(constructions.get(), callers, "factory runs once per get");
    Ok(())
}

#[test]
fn unrelated_resolutions_do_not_trip_cycle_guard() -> anyhow::Result<()> {
    init_test_logging();
    let registry = Arc::new(ServiceRegistry::new());

    // Две независимые цепочки, конструкторы которых пересекаются во времени
    registry.register_class(
        "left_base",
        |_| {
            thread::sleep(Duration::from_millis(10));
            Ok(Arc::new(Shared { id: 1 }) as _)
        },
        vec![],
    )?;
    registry.register_class(
        "left",
        |deps| deps.service("left_base").map_err(Into::into),
        vec!["left_base".into()],
    )?;
    registry.register_class(
        "right_base",
        |_| {
            thread::sleep(Duration::from_millis(10));
            Ok(Arc::new(Shared { id: 2 }) as _)
        },
        vec![],
    )?;
    registry.register_class(
        "right",
        |deps| deps.service("right_base").map_err(Into::into),
        vec!["right_base".into()],
    )?;

    let registry_left = Arc::clone(&registry);
    let left = thread::spawn(move || registry_left.get::<Shared>("left"));
    let registry_right = Arc::clone(&registry);
    let right = thread::spawn(move || registry_right.get::<Shared>("right"));

    let left = left.join().expect("left thread ok").expect("left resolves");
    let right = right.join().expect("right thread ok").expect("right resolves");
    assert_eq!(left.id, 1);
    assert_eq!(right.id, 2);
    Ok(())
}

#[test]
fn waiters_observe_construction_failure_and_retry() -> anyhow::Result<()> {
    init_test_logging();
    let registry = Arc::new(ServiceRegistry::new());
    let attempts = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&attempts);
    registry.register_class(
        "flaky",
        move |_| {
            let attempt = counter.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(10));
            if attempt == 0 {
                anyhow::bail!("first attempt fails");
            }
            Ok(Arc::new(Shared { id: attempt }) as _)
        },
        vec![],
    )?;

    let callers = 8;
    let barrier = Arc::new(Barrier::new(callers));
    let handles: Vec<_> = (0..callers)
        .map(|_| {
            let registry = Arc::clone(&registry);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                registry.get::<Shared>("flaky")
            })
        })
        .collect();

    let mut successes = 0;
    let mut failures = 0;
    for handle in handles {
        match handle.join().expect("caller thread must not panic") {
            Ok(_) => successes += 1,
            Err(RegistryError::InitializationFailed { .. }) => failures += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    // Ровно одна попытка упала, остальные вызовы в итоге получили сервис
    assert_eq!(failures, 1);
    assert_eq!(successes, callers - 1);
    assert!(attempts.load(Ordering::SeqCst) >= 2);
    Ok(())
}

#[test]
fn get_rejected_after_shutdown_begins() -> anyhow::Result<()> {
    init_test_logging();
    let registry = Arc::new(ServiceRegistry::new());
    registry.register_singleton("config", Arc::new(Shared { id: 1 }))?;

    registry.shutdown_all();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let registry = Arc::clone(&registry);
            thread::spawn(move || registry.get_service("config"))
        })
        .collect();

    for handle in handles {
        let result = handle.join().expect("thread ok");
        assert!(matches!(result, Err(RegistryError::ShuttingDown)));
    }
    Ok(())
}
