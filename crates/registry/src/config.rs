//! Конфигурация реестра сервисов

use serde::{Deserialize, Serialize};

/// Конфигурация реестра
///
/// Перерегистрация имени разрешена всегда (last write wins): на этом
/// построены тестовые и environment-специфичные переопределения.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Максимальное количество зарегистрированных сервисов
    pub max_registrations: usize,
    /// Подробное логирование регистраций и разрешений
    pub verbose_logging: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_registrations: 10_000,
            verbose_logging: cfg!(debug_assertions),
        }
    }
}

impl RegistryConfig {
    /// Production пресет
    pub fn production() -> Self {
        Self {
            max_registrations: 50_000,
            verbose_logging: false,
        }
    }

    /// Development пресет с расширенным логированием
    pub fn development() -> Self {
        Self {
            max_registrations: 5_000,
            verbose_logging: true,
        }
    }

    /// Минимальный пресет для тестов
    pub fn minimal() -> Self {
        Self {
            max_registrations: 1_000,
            verbose_logging: false,
        }
    }
}
