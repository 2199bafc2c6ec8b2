//! Ошибки системы регистрации сервисов
//!
//! Единый error type для всех операций реестра. Health check никогда не
//! возвращает ошибку (конвертируется в статус), ошибки shutdown
//! логируются и проглатываются внутри реестра.

use thiserror::Error;

/// Основной error type реестра сервисов
///
/// Первые три варианта соответствуют контракту `get`: NotFound,
/// CircularDependency и InitializationFailed всегда всплывают синхронно.
/// Подавление ошибок происходит слоем выше, в `optional_service`.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Сервис с таким именем не зарегистрирован
    #[error("Service not found: '{name}'")]
    ServiceNotFound { name: String },

    /// Циклическая зависимость, обнаруженная во время разрешения
    #[error("Circular dependency detected: {}", chain.join(" -> "))]
    CircularDependency { chain: Vec<String> },

    /// Конструктор или фабрика сервиса завершились с ошибкой
    #[error("Service '{name}' initialization failed: {source:#}")]
    InitializationFailed {
        name: String,
        source: anyhow::Error,
    },

    /// Зарегистрированный экземпляр имеет другой тип
    #[error("Service '{name}' is not of type {expected}")]
    TypeMismatch {
        name: String,
        expected: &'static str,
    },

    /// Некорректное имя при регистрации
    #[error("Invalid service name: {reason}")]
    InvalidName { reason: String },

    /// Превышен лимит регистраций из конфигурации
    #[error("Registration limit exceeded: {current} of {limit}")]
    RegistrationLimitExceeded { limit: usize, current: usize },

    /// Реестр находится в процессе остановки, новые запросы отклоняются
    #[error("Registry is shutting down, get() rejected")]
    ShuttingDown,
}

impl RegistryError {
    /// Категория ошибки для мониторинга и логов
    pub fn category(&self) -> &'static str {
        match self {
            RegistryError::ServiceNotFound { .. } => "not_found",
            RegistryError::CircularDependency { .. } => "cycle",
            RegistryError::InitializationFailed { .. } => "initialization",
            RegistryError::TypeMismatch { .. } => "type_mismatch",
            RegistryError::InvalidName { .. } => "registration",
            RegistryError::RegistrationLimitExceeded { .. } => "registration",
            RegistryError::ShuttingDown => "lifecycle",
        }
    }

    /// Может ли повторная попытка того же вызова закончиться успехом
    pub fn is_recoverable(&self) -> bool {
        match self {
            // Незарегистрированное имя не появится само
            RegistryError::ServiceNotFound { .. } => false,
            // Цикл в графе требует изменения регистраций
            RegistryError::CircularDependency { .. } => false,
            // Failed дескриптор остается retry-eligible
            RegistryError::InitializationFailed { .. } => true,
            RegistryError::TypeMismatch { .. } => false,
            RegistryError::InvalidName { .. } => false,
            RegistryError::RegistrationLimitExceeded { .. } => false,
            RegistryError::ShuttingDown => false,
        }
    }
}
