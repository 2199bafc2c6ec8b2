//! Внутренняя запись реестра об одном сервисе
//!
//! Дескриптор принадлежит реестру целиком: внешний код никогда не
//! получает к нему доступ и не мутирует его поля напрямую. Все
//! переходы состояния выполняются под блокировкой реестра.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use crate::registry::ServiceRegistry;
use crate::resolved::ResolvedDeps;
use crate::service::Service;

/// Фабричная функция: вызывается заново при каждом `get`
pub type FactoryFn =
    Arc<dyn Fn(&ServiceRegistry) -> anyhow::Result<Arc<dyn Service>> + Send + Sync>;

/// Конструктор class-сервиса: получает разрешенные зависимости по имени
pub type CtorFn = Arc<dyn Fn(&ResolvedDeps) -> anyhow::Result<Arc<dyn Service>> + Send + Sync>;

/// Вид сервиса, определяет стратегию конструирования и кэширования
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ServiceKind {
    /// Готовый экземпляр, кэшируется навсегда
    Singleton,
    /// Фабрика, вызывается заново при каждом запросе, не кэшируется
    Factory,
    /// Ленивое конструирование, кэшируется после первого успеха
    Class,
}

/// Состояние жизненного цикла дескриптора
///
/// `Registered -> Initializing -> Initialized | Failed`, плюс
/// терминальный `Shutdown`. `Failed` не является ядовитым состоянием:
/// следующий `get` попробует сконструировать сервис заново.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LifecycleState {
    Registered,
    Initializing,
    Initialized,
    Failed,
    Shutdown,
}

impl LifecycleState {
    /// Дефолтный health статус при отсутствии probe
    pub fn healthy_by_default(self) -> bool {
        self == LifecycleState::Initialized
    }
}

/// Кэшированный health статус сервиса
#[derive(Debug, Clone)]
pub struct HealthStatus {
    pub healthy: bool,
    pub message: Option<String>,
    pub checked_at: Option<Instant>,
}

impl HealthStatus {
    pub fn unknown() -> Self {
        Self {
            healthy: false,
            message: None,
            checked_at: None,
        }
    }

    pub fn healthy() -> Self {
        Self {
            healthy: true,
            message: None,
            checked_at: Some(Instant::now()),
        }
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self {
            healthy: false,
            message: Some(message.into()),
            checked_at: Some(Instant::now()),
        }
    }
}

/// Источник экземпляра сервиса
pub(crate) enum Provider {
    /// Singleton: экземпляр передан при регистрации
    Instance,
    Factory(FactoryFn),
    Ctor(CtorFn),
}

impl std::fmt::Debug for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provider::Instance => f.write_str("Instance"),
            Provider::Factory(_) => f.write_str("Factory(..)"),
            Provider::Ctor(_) => f.write_str("Ctor(..)"),
        }
    }
}

/// Запись реестра об одном сервисе
pub(crate) struct ServiceDescriptor {
    pub name: String,
    pub kind: ServiceKind,
    /// Имена зависимостей в порядке объявления, без дубликатов
    pub deps: Vec<String>,
    pub state: LifecycleState,
    pub instance: Option<Arc<dyn Service>>,
    pub provider: Provider,
    pub last_error: Option<String>,
    pub health: HealthStatus,
    /// Сколько раз конструктор запускался (для диагностики retry)
    pub init_attempts: u64,
}

impl std::fmt::Debug for ServiceDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceDescriptor")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("deps", &self.deps)
            .field("state", &self.state)
            .field("has_instance", &self.instance.is_some())
            .field("last_error", &self.last_error)
            .field("init_attempts", &self.init_attempts)
            .finish()
    }
}

impl ServiceDescriptor {
    pub fn singleton(name: String, instance: Arc<dyn Service>, deps: Vec<String>) -> Self {
        Self {
            name,
            kind: ServiceKind::Singleton,
            deps: dedup_preserving_order(deps),
            state: LifecycleState::Initialized,
            instance: Some(instance),
            provider: Provider::Instance,
            last_error: None,
            health: HealthStatus::healthy(),
            init_attempts: 0,
        }
    }

    pub fn factory(name: String, factory: FactoryFn, deps: Vec<String>) -> Self {
        Self {
            name,
            kind: ServiceKind::Factory,
            deps: dedup_preserving_order(deps),
            state: LifecycleState::Registered,
            instance: None,
            provider: Provider::Factory(factory),
            last_error: None,
            health: HealthStatus::unknown(),
            init_attempts: 0,
        }
    }

    pub fn class(name: String, ctor: CtorFn, deps: Vec<String>) -> Self {
        Self {
            name,
            kind: ServiceKind::Class,
            deps: dedup_preserving_order(deps),
            state: LifecycleState::Registered,
            instance: None,
            provider: Provider::Ctor(ctor),
            last_error: None,
            health: HealthStatus::unknown(),
            init_attempts: 0,
        }
    }
}

/// Убрать повторы из списка зависимостей, сохранив порядок первых вхождений
fn dedup_preserving_order(deps: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    deps.into_iter().filter(|d| seen.insert(d.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Dummy;
    impl Service for Dummy {}

    #[test]
    fn test_singleton_starts_initialized() {
        let desc = ServiceDescriptor::singleton("config".into(), Arc::new(Dummy), vec![]);
        assert_eq!(desc.kind, ServiceKind::Singleton);
        assert_eq!(desc.state, LifecycleState::Initialized);
        assert!(desc.instance.is_some());
        assert!(desc.health.healthy);
    }

    #[test]
    fn test_class_starts_registered() {
        let ctor: CtorFn = Arc::new(|_| Ok(Arc::new(Dummy) as Arc<dyn Service>));
        let desc = ServiceDescriptor::class("cache".into(), ctor, vec!["config".into()]);
        assert_eq!(desc.state, LifecycleState::Registered);
        assert!(desc.instance.is_none());
        assert!(!desc.health.healthy);
    }

    #[test]
    fn test_deps_deduplicated_in_order() {
        let ctor: CtorFn = Arc::new(|_| Ok(Arc::new(Dummy) as Arc<dyn Service>));
        let desc = ServiceDescriptor::class(
            "svc".into(),
            ctor,
            vec![
                "config".into(),
                "logger".into(),
                "config".into(),
                "cache".into(),
                "logger".into(),
            ],
        );
        assert_eq!(desc.deps, vec!["config", "logger", "cache"]);
    }

    #[test]
    fn test_default_health_follows_state() {
        assert!(LifecycleState::Initialized.healthy_by_default());
        assert!(!LifecycleState::Registered.healthy_by_default());
        assert!(!LifecycleState::Failed.healthy_by_default());
        assert!(!LifecycleState::Shutdown.healthy_by_default());
    }
}
