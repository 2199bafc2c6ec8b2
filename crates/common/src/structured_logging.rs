//! Структурированное логирование через tracing-subscriber
//!
//! Единая точка инициализации для всего приложения. Уровень берётся из
//! RUST_LOG если переменная установлена, иначе из конфигурации.

use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Конфигурация логирования
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Минимальный уровень логирования
    pub level: Level,
    /// Вывод в JSON формате (production)
    pub json_output: bool,
    /// Цветной вывод (только для non-JSON)
    pub color_output: bool,
    /// Включить файл и номер строки в записи
    pub include_line_numbers: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            json_output: false,
            color_output: true,
            include_line_numbers: cfg!(debug_assertions),
        }
    }
}

impl LoggingConfig {
    /// Production пресет: JSON, без цвета
    pub fn production() -> Self {
        Self {
            level: Level::INFO,
            json_output: true,
            color_output: false,
            include_line_numbers: false,
        }
    }

    /// Development пресет: подробный человекочитаемый вывод
    pub fn development() -> Self {
        Self {
            level: Level::DEBUG,
            json_output: false,
            color_output: true,
            include_line_numbers: true,
        }
    }
}

/// Инициализировать structured logging
///
/// Возвращает ошибку если глобальный subscriber уже установлен.
pub fn init_structured_logging(config: LoggingConfig) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.to_string()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_ansi(config.color_output)
        .with_file(config.include_line_numbers)
        .with_line_number(config.include_line_numbers);

    if config.json_output {
        builder
            .json()
            .try_init()
            .map_err(|e| anyhow::anyhow!("failed to install JSON subscriber: {e}"))?;
    } else {
        builder
            .try_init()
            .map_err(|e| anyhow::anyhow!("failed to install fmt subscriber: {e}"))?;
    }

    Ok(())
}
