//! Ядро реестра сервисов
//!
//! Владеет картой имя -> дескриптор и сериализует все мутации одной
//! блокировкой. Конструкторы и фабрики выполняются с отпущенной
//! блокировкой, чтобы медленный конструктор не задерживал несвязанные
//! `get`. Claim имени (переход в Initializing) атомарен под
//! блокировкой, ожидание чужого конструирования идет через Condvar.
//!
//! Защита от циклов - thread-local стек текущего пути разрешения:
//! каждый логический путь видит только свои кадры, параллельные
//! разрешения не мешают друг другу.

use std::any::type_name;
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::anyhow;
use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::RegistryConfig;
use crate::descriptor::{
    CtorFn, FactoryFn, HealthStatus, LifecycleState, Provider, ServiceDescriptor, ServiceKind,
};
use crate::errors::RegistryError;
use crate::graph;
use crate::resolved::ResolvedDeps;
use crate::service::{downcast_service, ProbeResult, Service};

thread_local! {
    /// Текущий путь разрешения этого потока
    static RESOLUTION_PATH: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
}

/// RAII-кадр пути разрешения: снимается при любом выходе, включая ошибки
struct PathFrame;

impl PathFrame {
    /// Добавить имя в путь или отчитать цикл полной цепочкой
    fn enter(name: &str) -> Result<Self, RegistryError> {
        RESOLUTION_PATH.with(|cell| {
            let mut path = cell.borrow_mut();
            if let Some(pos) = path.iter().position(|n| n == name) {
                let mut chain: Vec<String> = path[pos..].to_vec();
                chain.push(name.to_string());
                return Err(RegistryError::CircularDependency { chain });
            }
            path.push(name.to_string());
            Ok(PathFrame)
        })
    }
}

impl Drop for PathFrame {
    fn drop(&mut self) {
        RESOLUTION_PATH.with(|cell| {
            cell.borrow_mut().pop();
        });
    }
}

#[derive(Default)]
struct RegistryInner {
    services: HashMap<String, ServiceDescriptor>,
    shutting_down: bool,
}

/// Счетчики разрешений для диагностики
#[derive(Debug, Clone, Serialize)]
pub struct RegistryStats {
    pub services: usize,
    pub singletons: usize,
    pub factories: usize,
    pub classes: usize,
    pub initialized: usize,
    pub failed: usize,
    pub total_resolutions: u64,
    pub failed_resolutions: u64,
}

/// Реестр именованных сервисов с ленивым конструированием
pub struct ServiceRegistry {
    inner: Mutex<RegistryInner>,
    state_changed: Condvar,
    config: RegistryConfig,
    total_resolutions: AtomicU64,
    failed_resolutions: AtomicU64,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            inner: Mutex::new(RegistryInner::default()),
            state_changed: Condvar::new(),
            config,
            total_resolutions: AtomicU64::new(0),
            failed_resolutions: AtomicU64::new(0),
        }
    }

    // === Регистрация ===

    /// Зарегистрировать готовый singleton без зависимостей
    pub fn register_singleton<T: Service>(
        &self,
        name: impl Into<String>,
        instance: Arc<T>,
    ) -> Result<(), RegistryError> {
        self.register_singleton_with_deps(name, instance, Vec::new())
    }

    /// Зарегистрировать singleton с объявленными зависимостями
    ///
    /// Зависимости участвуют только в статической валидации графа:
    /// экземпляр уже сконструирован.
    pub fn register_singleton_with_deps<T: Service>(
        &self,
        name: impl Into<String>,
        instance: Arc<T>,
        deps: Vec<String>,
    ) -> Result<(), RegistryError> {
        let name = validated_name(name.into())?;
        self.insert(ServiceDescriptor::singleton(name, instance, deps))
    }

    /// Зарегистрировать фабрику: вызывается заново при каждом `get`
    ///
    /// Фабрика получает ссылку на реестр и разрешает собственные
    /// зависимости сама. Список `deps` используется только для
    /// статической валидации графа.
    pub fn register_factory<F>(
        &self,
        name: impl Into<String>,
        factory: F,
        deps: Vec<String>,
    ) -> Result<(), RegistryError>
    where
        F: Fn(&ServiceRegistry) -> anyhow::Result<Arc<dyn Service>> + Send + Sync + 'static,
    {
        let name = validated_name(name.into())?;
        let factory: FactoryFn = Arc::new(factory);
        self.insert(ServiceDescriptor::factory(name, factory, deps))
    }

    /// Зарегистрировать class-сервис с явным списком зависимостей
    ///
    /// Конструктор вызывается лениво, один раз; перед вызовом реестр
    /// разрешает все объявленные зависимости и передает их по имени.
    pub fn register_class<F>(
        &self,
        name: impl Into<String>,
        ctor: F,
        deps: Vec<String>,
    ) -> Result<(), RegistryError>
    where
        F: Fn(&ResolvedDeps) -> anyhow::Result<Arc<dyn Service>> + Send + Sync + 'static,
    {
        let name = validated_name(name.into())?;
        let ctor: CtorFn = Arc::new(ctor);
        self.insert(ServiceDescriptor::class(name, ctor, deps))
    }

    fn insert(&self, desc: ServiceDescriptor) -> Result<(), RegistryError> {
        let mut inner = self.inner.lock();
        if !inner.services.contains_key(&desc.name)
            && inner.services.len() >= self.config.max_registrations
        {
            return Err(RegistryError::RegistrationLimitExceeded {
                limit: self.config.max_registrations,
                current: inner.services.len(),
            });
        }

        let name = desc.name.clone();
        let kind = desc.kind;
        if inner.services.insert(name.clone(), desc).is_some() {
            // Last write wins: переопределения для тестов и окружений
            warn!(service = %name, "re-registration overwrites existing service");
            self.state_changed.notify_all();
        } else if self.config.verbose_logging {
            debug!(service = %name, ?kind, "service registered");
        }
        Ok(())
    }

    // === Разрешение ===

    /// Типизированный `get`: разрешить сервис и привести к `T`
    pub fn get<T: Service>(&self, name: &str) -> Result<Arc<T>, RegistryError> {
        let instance = self.get_service(name)?;
        downcast_service::<T>(instance).ok_or_else(|| RegistryError::TypeMismatch {
            name: name.to_string(),
            expected: type_name::<T>(),
        })
    }

    /// Нетипизированный `get`
    pub fn get_service(&self, name: &str) -> Result<Arc<dyn Service>, RegistryError> {
        self.total_resolutions.fetch_add(1, Ordering::Relaxed);
        let result = self.resolve(name);
        if result.is_err() {
            self.failed_resolutions.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    /// Option-вариант `get`: отсутствие сервиса - обычный поток управления
    pub fn try_get<T: Service>(&self, name: &str) -> Option<Arc<T>> {
        match self.get::<T>(name) {
            Ok(instance) => Some(instance),
            Err(e) => {
                debug!(service = %name, error = %e, "optional resolution failed");
                None
            }
        }
    }

    /// Option-вариант нетипизированного `get`
    pub fn try_get_service(&self, name: &str) -> Option<Arc<dyn Service>> {
        self.get_service(name).ok()
    }

    fn resolve(&self, name: &str) -> Result<Arc<dyn Service>, RegistryError> {
        let _frame = PathFrame::enter(name)?;

        loop {
            let mut inner = self.inner.lock();
            if inner.shutting_down {
                return Err(RegistryError::ShuttingDown);
            }

            let desc = inner
                .services
                .get_mut(name)
                .ok_or_else(|| RegistryError::ServiceNotFound {
                    name: name.to_string(),
                })?;

            if desc.kind == ServiceKind::Factory {
                let Provider::Factory(factory) = &desc.provider else {
                    return Err(RegistryError::InitializationFailed {
                        name: name.to_string(),
                        source: anyhow!("factory descriptor without factory provider"),
                    });
                };
                let factory = factory.clone();
                desc.init_attempts += 1;
                drop(inner);
                return self.run_factory(name, factory);
            }

            match desc.state {
                LifecycleState::Initialized => {
                    return desc.instance.clone().ok_or_else(|| {
                        RegistryError::InitializationFailed {
                            name: name.to_string(),
                            source: anyhow!("initialized descriptor lost its instance"),
                        }
                    });
                }
                LifecycleState::Initializing => {
                    // Строит другой поток: наш путь уже проверен PathFrame
                    self.state_changed.wait(&mut inner);
                    continue;
                }
                LifecycleState::Registered | LifecycleState::Failed => {
                    if desc.state == LifecycleState::Failed {
                        warn!(
                            service = %name,
                            attempts = desc.init_attempts,
                            "retrying construction of previously failed service"
                        );
                    }
                    let Provider::Ctor(ctor) = &desc.provider else {
                        desc.state = LifecycleState::Failed;
                        return Err(RegistryError::InitializationFailed {
                            name: name.to_string(),
                            source: anyhow!("descriptor has no constructor"),
                        });
                    };
                    let ctor = ctor.clone();
                    let deps = desc.deps.clone();
                    desc.state = LifecycleState::Initializing;
                    desc.init_attempts += 1;
                    drop(inner);

                    let built = self.construct(name, &ctor, &deps);
                    return self.publish(name, built);
                }
                LifecycleState::Shutdown => return Err(RegistryError::ShuttingDown),
            }
        }
    }

    /// Вызвать фабрику с отпущенной блокировкой; результат не кэшируется
    fn run_factory(
        &self,
        name: &str,
        factory: FactoryFn,
    ) -> Result<Arc<dyn Service>, RegistryError> {
        match factory(self) {
            Ok(instance) => {
                if self.config.verbose_logging {
                    debug!(service = %name, "factory produced a fresh instance");
                }
                Ok(instance)
            }
            Err(source) => {
                let err = RegistryError::InitializationFailed {
                    name: name.to_string(),
                    source,
                };
                let mut inner = self.inner.lock();
                if let Some(desc) = inner.services.get_mut(name) {
                    desc.last_error = Some(err.to_string());
                }
                Err(err)
            }
        }
    }

    /// Разрешить зависимости и вызвать конструктор. Блокировка отпущена.
    fn construct(
        &self,
        name: &str,
        ctor: &CtorFn,
        deps: &[String],
    ) -> Result<Arc<dyn Service>, RegistryError> {
        let mut resolved = HashMap::with_capacity(deps.len());
        for dep in deps {
            match self.get_service(dep) {
                Ok(instance) => {
                    resolved.insert(dep.clone(), instance);
                }
                // Цикл всплывает как есть: цепочка уже полная
                Err(e @ RegistryError::CircularDependency { .. }) => return Err(e),
                Err(e) => {
                    return Err(RegistryError::InitializationFailed {
                        name: name.to_string(),
                        source: anyhow::Error::from(e)
                            .context(format!("failed to resolve dependency '{dep}'")),
                    });
                }
            }
        }

        let deps = ResolvedDeps::new(resolved);
        let instance = ctor(&deps).map_err(|source| RegistryError::InitializationFailed {
            name: name.to_string(),
            source,
        })?;

        // Ошибка initialize() считается ошибкой конструирования
        instance
            .initialize()
            .map_err(|source| RegistryError::InitializationFailed {
                name: name.to_string(),
                source: source.context("initialize() failed"),
            })?;

        Ok(instance)
    }

    /// Записать результат конструирования обратно в дескриптор
    fn publish(
        &self,
        name: &str,
        built: Result<Arc<dyn Service>, RegistryError>,
    ) -> Result<Arc<dyn Service>, RegistryError> {
        let mut inner = self.inner.lock();
        let Some(desc) = inner.services.get_mut(name) else {
            // Дескриптор исчез за время конструирования
            self.state_changed.notify_all();
            return built;
        };

        if desc.state != LifecycleState::Initializing {
            // Перерегистрация или shutdown во время конструирования:
            // экземпляр отдается вызывающему, но не кэшируется
            warn!(service = %name, state = ?desc.state, "descriptor changed during construction");
            self.state_changed.notify_all();
            return built;
        }

        match built {
            Ok(instance) => {
                desc.instance = Some(instance.clone());
                desc.state = LifecycleState::Initialized;
                desc.last_error = None;
                self.state_changed.notify_all();
                drop(inner);

                if self.config.verbose_logging {
                    debug!(service = %name, "service initialized");
                }
                // Разовый probe сразу после успешного конструирования
                self.refresh_health(name, &instance);
                Ok(instance)
            }
            Err(err) => {
                desc.state = LifecycleState::Failed;
                desc.last_error = Some(err.to_string());
                desc.health = HealthStatus::unhealthy(err.to_string());
                self.state_changed.notify_all();
                Err(err)
            }
        }
    }

    fn refresh_health(&self, name: &str, instance: &Arc<dyn Service>) {
        let status = match instance.probe() {
            ProbeResult::Healthy => HealthStatus::healthy(),
            ProbeResult::Unhealthy { message } => HealthStatus::unhealthy(message),
            ProbeResult::Unsupported => HealthStatus::healthy(),
        };
        let mut inner = self.inner.lock();
        if let Some(desc) = inner.services.get_mut(name) {
            desc.health = status;
        }
    }

    // === Интроспекция ===

    /// Зарегистрировано ли имя. O(1), без побочных эффектов.
    pub fn has(&self, name: &str) -> bool {
        self.inner.lock().services.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Отсортированный список зарегистрированных имен
    pub fn registered_services(&self) -> Vec<String> {
        let inner = self.inner.lock();
        let mut names: Vec<String> = inner.services.keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Снимок графа зависимостей: имя -> объявленные зависимости
    pub fn dependency_snapshot(&self) -> HashMap<String, Vec<String>> {
        let inner = self.inner.lock();
        inner
            .services
            .values()
            .map(|desc| (desc.name.clone(), desc.deps.clone()))
            .collect()
    }

    /// Статическая проверка графа без мутаций
    ///
    /// Первый проход находит ссылки на незарегистрированные имена,
    /// второй - циклы. Строки пригодны для стартовых логов.
    pub fn validate_dependencies(&self) -> Vec<String> {
        let snapshot = self.dependency_snapshot();
        let mut problems = Vec::new();

        for (service, dep) in graph::find_missing(&snapshot) {
            problems.push(format!(
                "Service '{service}' depends on unregistered service '{dep}'"
            ));
        }
        for cycle in graph::find_cycles(&snapshot) {
            problems.push(format!(
                "Circular dependency detected: {}",
                cycle.join(" -> ")
            ));
        }

        if !problems.is_empty() {
            warn!(count = problems.len(), "dependency validation found problems");
        }
        problems
    }

    /// Человекочитаемый отчет о графе для диагностики
    pub fn dependency_report(&self) -> String {
        let snapshot = self.dependency_snapshot();
        let stats = graph::graph_stats(&snapshot);
        let problems = self.validate_dependencies();
        let order = match graph::topo_order(&snapshot) {
            Ok(order) => format!("Construction order: {}", order.join(", ")),
            Err(leftover) => format!("No full construction order, blocked: {}", leftover.join(", ")),
        };

        let mut report = format!(
            "=== Dependency Report ===\n\
             Services: {}\n\
             Dependencies: {}\n\
             Average fan-out: {:.2}\n\
             {}\n",
            stats.services, stats.edges, stats.average_fan_out, order
        );
        if problems.is_empty() {
            report.push_str("Problems: none\n");
        } else {
            for problem in &problems {
                report.push_str("Problem: ");
                report.push_str(problem);
                report.push('\n');
            }
        }
        report
    }

    /// Счетчики реестра
    pub fn stats(&self) -> RegistryStats {
        let inner = self.inner.lock();
        let mut stats = RegistryStats {
            services: inner.services.len(),
            singletons: 0,
            factories: 0,
            classes: 0,
            initialized: 0,
            failed: 0,
            total_resolutions: self.total_resolutions.load(Ordering::Relaxed),
            failed_resolutions: self.failed_resolutions.load(Ordering::Relaxed),
        };
        for desc in inner.services.values() {
            match desc.kind {
                ServiceKind::Singleton => stats.singletons += 1,
                ServiceKind::Factory => stats.factories += 1,
                ServiceKind::Class => stats.classes += 1,
            }
            match desc.state {
                LifecycleState::Initialized => stats.initialized += 1,
                LifecycleState::Failed => stats.failed += 1,
                _ => {}
            }
        }
        stats
    }

    /// Последняя ошибка конструирования сервиса, если была
    pub fn last_error(&self, name: &str) -> Option<String> {
        self.inner.lock().services.get(name)?.last_error.clone()
    }

    // === Health ===

    /// Проверить здоровье одного или всех сервисов
    ///
    /// Probe вызывается без блокировки реестра. Сервисы без probe
    /// отчитываются по lifecycle state: здоров тогда и только тогда,
    /// когда Initialized. Результаты кэшируются в дескрипторах.
    pub fn health_check(&self, name: Option<&str>) -> HashMap<String, bool> {
        let snapshot: Vec<(String, Option<Arc<dyn Service>>, LifecycleState)> = {
            let inner = self.inner.lock();
            match name {
                Some(n) => inner
                    .services
                    .get(n)
                    .map(|d| vec![(d.name.clone(), d.instance.clone(), d.state)])
                    .unwrap_or_default(),
                None => inner
                    .services
                    .values()
                    .map(|d| (d.name.clone(), d.instance.clone(), d.state))
                    .collect(),
            }
        };

        let mut results = HashMap::with_capacity(snapshot.len());
        let mut updates = Vec::with_capacity(snapshot.len());
        for (service, instance, state) in snapshot {
            let status = match &instance {
                Some(instance) => match instance.probe() {
                    ProbeResult::Healthy => HealthStatus::healthy(),
                    ProbeResult::Unhealthy { message } => HealthStatus::unhealthy(message),
                    ProbeResult::Unsupported => status_from_state(state),
                },
                None => status_from_state(state),
            };
            if !status.healthy {
                debug!(service = %service, message = ?status.message, "service unhealthy");
            }
            results.insert(service.clone(), status.healthy);
            updates.push((service, status));
        }

        let mut inner = self.inner.lock();
        for (service, status) in updates {
            if let Some(desc) = inner.services.get_mut(&service) {
                desc.health = status;
            }
        }
        results
    }

    /// Кэшированные health статусы с сообщениями
    pub fn health_report(&self) -> HashMap<String, HealthStatus> {
        let inner = self.inner.lock();
        inner
            .services
            .values()
            .map(|desc| (desc.name.clone(), desc.health.clone()))
            .collect()
    }

    // === Shutdown ===

    /// Остановить все сервисы
    ///
    /// Ошибки shutdown-хуков логируются и проглатываются: один сломанный
    /// сервис не блокирует остановку остальных. Новые `get` после начала
    /// остановки отклоняются. Повторный вызов безвреден.
    pub fn shutdown_all(&self) {
        let victims: Vec<(String, Option<Arc<dyn Service>>)> = {
            let mut inner = self.inner.lock();
            inner.shutting_down = true;
            let mut victims: Vec<(String, Option<Arc<dyn Service>>)> = inner
                .services
                .values_mut()
                .map(|desc| {
                    let instance = desc.instance.take();
                    desc.state = LifecycleState::Shutdown;
                    desc.health = HealthStatus::unhealthy("service shut down");
                    (desc.name.clone(), instance)
                })
                .collect();
            victims.sort_by(|a, b| a.0.cmp(&b.0));
            self.state_changed.notify_all();
            victims
        };

        let mut stopped = 0usize;
        for (name, instance) in victims {
            if let Some(instance) = instance {
                if let Err(e) = instance.shutdown() {
                    warn!(service = %name, error = %e, "shutdown hook failed, continuing");
                } else {
                    stopped += 1;
                }
            }
        }
        info!(stopped, "service registry shut down");
    }

    /// Началась ли остановка реестра
    pub fn is_shutting_down(&self) -> bool {
        self.inner.lock().shutting_down
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stats = self.stats();
        f.debug_struct("ServiceRegistry")
            .field("services", &stats.services)
            .field("initialized", &stats.initialized)
            .field("failed", &stats.failed)
            .finish()
    }
}

fn status_from_state(state: LifecycleState) -> HealthStatus {
    if state.healthy_by_default() {
        HealthStatus::healthy()
    } else {
        HealthStatus::unhealthy(format!("lifecycle state {state:?}"))
    }
}

fn validated_name(name: String) -> Result<String, RegistryError> {
    if name.is_empty() {
        return Err(RegistryError::InvalidName {
            reason: "service name must not be empty".to_string(),
        });
    }
    Ok(name)
}
