//! Утилиты для тестов всех crates
//!
//! Общие помощники без привязки к конкретному crate: логирование в
//! тестах и инструментированные счетчики вызовов.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Инициализировать логирование для тестов
///
/// Повторные вызовы безопасны: ошибка "subscriber уже установлен"
/// игнорируется, так как тесты выполняются в одном процессе.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Потокобезопасный счетчик вызовов для инструментированных фабрик
///
/// Клонируется дешево, считает через Arc, поэтому счетчик общий для
/// всех клонов. Используется в тестах exactly-once семантики.
#[derive(Debug, Clone, Default)]
pub struct CallCounter {
    count: Arc<AtomicUsize>,
}

impl CallCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Увеличить счетчик, вернуть новое значение
    pub fn increment(&self) -> usize {
        self.count.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn get(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}
