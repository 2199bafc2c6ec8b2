//! Реестр именованных сервисов с ленивым конструированием
//!
//! Dependency-injection контейнер, связывающий подсистемы приложения:
//! регистрация по имени, ленивое конструирование с разрешением графа
//! зависимостей, обнаружение циклов, агрегация health статусов и
//! управляемая остановка.
//!
//! Три вида сервисов:
//! - **Singleton**: готовый экземпляр, кэшируется навсегда;
//! - **Factory**: вызывается заново при каждом `get`, не кэшируется;
//! - **Class**: конструируется лениво один раз, зависимости
//!   передаются конструктору по имени.
//!
//! ```
//! use std::sync::Arc;
//! use registry::{Service, ServiceRegistry};
//!
//! #[derive(Debug)]
//! struct AppConfig { retries: u32 }
//! impl Service for AppConfig {}
//!
//! #[derive(Debug)]
//! struct Logger { retries: u32 }
//! impl Service for Logger {}
//!
//! let registry = ServiceRegistry::new();
//! registry.register_singleton("config", Arc::new(AppConfig { retries: 3 }))?;
//! registry.register_class(
//!     "logger",
//!     |deps| {
//!         let config = deps.get::<AppConfig>("config")?;
//!         Ok(Arc::new(Logger { retries: config.retries }) as _)
//!     },
//!     vec!["config".into()],
//! )?;
//!
//! let logger = registry.get::<Logger>("logger")?;
//! assert_eq!(logger.retries, 3);
//! # Ok::<(), registry::RegistryError>(())
//! ```

mod config;
mod descriptor;
mod errors;
mod facade;
pub mod graph;
mod registry;
mod resolved;
mod service;

pub use config::RegistryConfig;
pub use descriptor::{CtorFn, FactoryFn, HealthStatus, LifecycleState, ServiceKind};
pub use errors::RegistryError;
pub use facade::{fallback_service, global, optional_service, require_service};
pub use registry::{RegistryStats, ServiceRegistry};
pub use resolved::ResolvedDeps;
pub use service::{AsAnyArc, ProbeResult, Service};
