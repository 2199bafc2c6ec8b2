//! Фасад для кода-потребителя
//!
//! Три идиомы доступа к сервисам: обязательный (`require_service`),
//! опциональный с graceful degradation (`optional_service`) и
//! primary/fallback (`fallback_service`). Подавление ошибок происходит
//! только здесь, никогда внутри ядра реестра.

use std::sync::Arc;

use anyhow::Context;
use tracing::{debug, warn};

use crate::errors::RegistryError;
use crate::registry::ServiceRegistry;
use crate::service::Service;

/// Получить обязательный сервис или упасть с контекстом вызывающего
///
/// `context` попадает в сообщение ошибки, чтобы лог старта называл
/// виновника: "report generation: service 'llm_provider' is required".
pub fn require_service<T: Service>(
    registry: &ServiceRegistry,
    name: &str,
    context: &str,
) -> anyhow::Result<Arc<T>> {
    registry
        .get::<T>(name)
        .with_context(|| format!("{context}: service '{name}' is required"))
}

/// Получить сервис или дефолт, никогда не падая
///
/// Любая ошибка разрешения или конструирования превращается в дефолт.
/// Основная идиома graceful degradation вызывающего кода.
pub fn optional_service<T: Service>(
    registry: &ServiceRegistry,
    name: &str,
    default: Arc<T>,
) -> Arc<T> {
    match registry.try_get::<T>(name) {
        Some(instance) => instance,
        None => {
            debug!(service = %name, "falling back to default instance");
            default
        }
    }
}

/// Первый разрешившийся из пары primary/fallback
///
/// Ошибка только если не разрешился ни один; она называет оба имени.
pub fn fallback_service<T: Service>(
    registry: &ServiceRegistry,
    primary: &str,
    fallback: &str,
) -> Result<Arc<T>, RegistryError> {
    if let Some(instance) = registry.try_get::<T>(primary) {
        return Ok(instance);
    }
    warn!(primary = %primary, fallback = %fallback, "primary unavailable, trying fallback");
    registry
        .try_get::<T>(fallback)
        .ok_or_else(|| RegistryError::ServiceNotFound {
            name: format!("{primary} (fallback: {fallback})"),
        })
}

/// Процессный реестр по умолчанию
///
/// Тонкая обертка для границы входа в процесс. Композиция приложения
/// должна создавать реестр явно и передавать его вниз; глобальный
/// экземпляр существует для main() и интеграционных скриптов.
pub mod global {
    use once_cell::sync::Lazy;
    use parking_lot::RwLock;
    use std::sync::Arc;

    use crate::registry::ServiceRegistry;

    static DEFAULT: Lazy<RwLock<Arc<ServiceRegistry>>> =
        Lazy::new(|| RwLock::new(Arc::new(ServiceRegistry::new())));

    /// Реестр процесса по умолчанию
    pub fn default_registry() -> Arc<ServiceRegistry> {
        DEFAULT.read().clone()
    }

    /// Заменить глобальный реестр свежим. Только для тестов и
    /// перезапуска окружения; конкурентные владельцы старого реестра
    /// продолжают работать со своей копией Arc.
    pub fn reset_default() -> Arc<ServiceRegistry> {
        let fresh = Arc::new(ServiceRegistry::new());
        *DEFAULT.write() = fresh.clone();
        fresh
    }
}
