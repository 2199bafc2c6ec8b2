//! Общая инфраструктура для всех crates проекта
//!
//! Содержит структурированное логирование и утилиты для тестов.
//! Бизнес-логики здесь нет и быть не должно.

pub mod structured_logging;
pub mod test_utils;

pub use structured_logging::{init_structured_logging, LoggingConfig};
pub use test_utils::{init_test_logging, CallCounter};
