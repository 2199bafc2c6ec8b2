//! Контракт возможностей сервиса
//!
//! Все методы опциональны: дефолтные реализации означают "возможность
//! отсутствует" и никогда не считаются ошибкой. Реестр хранит сервисы
//! как `Arc<dyn Service>`, типизированный доступ идет через downcast.

use std::any::Any;
use std::sync::Arc;

/// Результат health probe сервиса
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeResult {
    /// Сервис не реализует probe, статус выводится из lifecycle state
    Unsupported,
    Healthy,
    Unhealthy { message: String },
}

/// Upcast `Arc<dyn Service>` до `Arc<dyn Any>` для downcast к конкретному типу
///
/// Blanket реализация покрывает любой конкретный тип, поэтому
/// реализаторам `Service` ничего писать не нужно.
pub trait AsAnyArc {
    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Any + Send + Sync> AsAnyArc for T {
    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Контракт сервиса, управляемого реестром
///
/// Пустая реализация (`impl Service for MyType {}`) полностью валидна:
/// такой сервис не инициализируется явно, не останавливается и
/// отчитывается о здоровье через lifecycle state.
pub trait Service: AsAnyArc + Send + Sync + 'static {
    /// Вызывается один раз сразу после успешного конструирования.
    /// Ошибка считается ошибкой конструирования сервиса.
    fn initialize(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Вызывается при остановке реестра. Ошибки логируются и
    /// проглатываются, остановку остальных сервисов не блокируют.
    fn shutdown(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Самодиагностика работоспособности
    fn probe(&self) -> ProbeResult {
        ProbeResult::Unsupported
    }
}

impl std::fmt::Debug for dyn Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn Service")
    }
}

/// Типизированный downcast для `Arc<dyn Service>`
pub(crate) fn downcast_service<T: Service>(service: Arc<dyn Service>) -> Option<Arc<T>> {
    service.as_any_arc().downcast::<T>().ok()
}
