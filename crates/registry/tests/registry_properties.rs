//! Интеграционные тесты ключевых свойств реестра
//!
//! Каждый тест - наблюдаемое свойство публичного API: идентичность
//! singleton, свежесть factory, обнаружение циклов, graceful
//! degradation и агрегация health статусов.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use common::test_utils::init_test_logging;
use registry::{
    optional_service, ProbeResult, RegistryError, Service, ServiceRegistry,
};

#[derive(Debug)]
struct Config {
    app_name: &'static str,
}
impl Service for Config {}

#[derive(Debug)]
struct Logger;
impl Service for Logger {}

#[derive(Debug)]
struct Cache;
impl Service for Cache {}

#[test]
fn repeated_get_returns_identical_singleton() -> anyhow::Result<()> {
    init_test_logging();
    let registry = ServiceRegistry::new();
    registry.register_singleton("config", Arc::new(Config { app_name: "app" }))?;

    let first = registry.get::<Config>("config")?;
    let second = registry.get::<Config>("config")?;
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.app_name, "app");

    // Class-сервис после первого успеха ведет себя так же
    registry.register_class("logger", |_| Ok(Arc::new(Logger) as _), vec![])?;
    let first = registry.get::<Logger>("logger")?;
    let second = registry.get::<Logger>("logger")?;
    assert!(Arc::ptr_eq(&first, &second));
    Ok(())
}

#[test]
fn factory_returns_distinct_instances() -> anyhow::Result<()> {
    init_test_logging();
    let registry = ServiceRegistry::new();
    registry.register_factory("session", |_| Ok(Arc::new(Logger) as _), vec![])?;

    let first = registry.get::<Logger>("session")?;
    let second = registry.get::<Logger>("session")?;
    assert!(!Arc::ptr_eq(&first, &second));
    Ok(())
}

#[test]
fn cycle_reported_by_validator_and_at_get() -> anyhow::Result<()> {
    init_test_logging();
    let registry = ServiceRegistry::new();
    registry.register_class(
        "a",
        |deps| deps.service("b").map_err(Into::into),
        vec!["b".into()],
    )?;
    registry.register_class(
        "b",
        |deps| deps.service("a").map_err(Into::into),
        vec!["a".into()],
    )?;

    let problems = registry.validate_dependencies();
    assert!(
        problems.iter().any(|p| p.contains("Circular dependency")),
        "validator must report the cycle: {problems:?}"
    );

    // get не должен рекурсировать бесконечно
    match registry.get_service("a") {
        Err(RegistryError::CircularDependency { chain }) => {
            assert_eq!(chain.first(), chain.last());
        }
        other => panic!("expected CircularDependency, got {:?}", other.map(|_| ())),
    }
    Ok(())
}

#[test]
fn missing_dependency_reported_by_validator_and_at_get() -> anyhow::Result<()> {
    init_test_logging();
    let registry = ServiceRegistry::new();
    registry.register_class(
        "a",
        |deps| deps.service("z").map_err(Into::into),
        vec!["z".into()],
    )?;

    let problems = registry.validate_dependencies();
    assert_eq!(problems.len(), 1);
    assert!(problems[0].contains('a') && problems[0].contains('z'));

    let err = registry.get_service("a").expect_err("dependency is missing");
    assert!(err.to_string().contains('z'), "error must mention 'z': {err}");
    Ok(())
}

#[test]
fn singleton_health_follows_lifecycle() -> anyhow::Result<()> {
    init_test_logging();
    let registry = ServiceRegistry::new();
    registry.register_singleton("config", Arc::new(Config { app_name: "app" }))?;

    let health = registry.health_check(None);
    assert_eq!(health.get("config"), Some(&true), "Initialized => healthy");

    registry.shutdown_all();
    let health = registry.health_check(None);
    assert_eq!(health.get("config"), Some(&false), "Shutdown => unhealthy");
    Ok(())
}

#[test]
fn optional_service_degrades_gracefully() {
    init_test_logging();
    let registry = ServiceRegistry::new();

    // Имя не зарегистрировано, get вернул бы NotFound
    assert!(matches!(
        registry.get_service("missing"),
        Err(RegistryError::ServiceNotFound { .. })
    ));

    let fallback = optional_service(&registry, "missing", Arc::new(Config { app_name: "default" }));
    assert_eq!(fallback.app_name, "default");
}

#[test]
fn probe_failures_become_status_not_errors() -> anyhow::Result<()> {
    struct Flaky {
        healthy: std::sync::atomic::AtomicBool,
    }
    impl Service for Flaky {
        fn probe(&self) -> ProbeResult {
            if self.healthy.load(Ordering::SeqCst) {
                ProbeResult::Healthy
            } else {
                ProbeResult::Unhealthy {
                    message: "backend gone".into(),
                }
            }
        }
    }

    init_test_logging();
    let registry = ServiceRegistry::new();
    let flaky = Arc::new(Flaky {
        healthy: std::sync::atomic::AtomicBool::new(true),
    });
    registry.register_singleton("flaky", Arc::clone(&flaky))?;

    assert_eq!(registry.health_check(None).get("flaky"), Some(&true));

    flaky.healthy.store(false, Ordering::SeqCst);
    assert_eq!(registry.health_check(Some("flaky")).get("flaky"), Some(&false));

    let report = registry.health_report();
    assert_eq!(report["flaky"].message.as_deref(), Some("backend gone"));
    Ok(())
}

/// Сценарий из жизни: config -> logger -> cache, один get верхушки
/// конструирует всю цепочку ровно по одному разу.
#[test]
fn chain_constructed_exactly_once_per_service() -> anyhow::Result<()> {
    init_test_logging();
    let registry = ServiceRegistry::new();

    let logger_calls = Arc::new(AtomicUsize::new(0));
    let cache_calls = Arc::new(AtomicUsize::new(0));

    registry.register_singleton("config", Arc::new(Config { app_name: "app" }))?;

    let counter = Arc::clone(&logger_calls);
    registry.register_class(
        "logger",
        move |deps| {
            deps.get::<Config>("config")?;
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(Logger) as _)
        },
        vec!["config".into()],
    )?;

    let counter = Arc::clone(&cache_calls);
    registry.register_class(
        "cache",
        move |deps| {
            deps.get::<Config>("config")?;
            deps.get::<Logger>("logger")?;
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(Cache) as _)
        },
        vec!["config".into(), "logger".into()],
    )?;

    assert!(registry.validate_dependencies().is_empty());

    let config_before = registry.get::<Config>("config")?;
    registry.get::<Cache>("cache")?;

    assert_eq!(logger_calls.load(Ordering::SeqCst), 1);
    assert_eq!(cache_calls.load(Ordering::SeqCst), 1);

    // Singleton не переконструируется
    let config_after = registry.get::<Config>("config")?;
    assert!(Arc::ptr_eq(&config_before, &config_after));
    Ok(())
}

#[test]
fn has_is_side_effect_free() -> anyhow::Result<()> {
    init_test_logging();
    let registry = ServiceRegistry::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    registry.register_class(
        "lazy",
        move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(Logger) as _)
        },
        vec![],
    )?;

    assert!(registry.has("lazy"));
    assert!(!registry.has("other"));
    assert_eq!(calls.load(Ordering::SeqCst), 0, "has() must not construct");
    Ok(())
}
