//! Разрешенные зависимости, передаваемые конструктору class-сервиса

use std::any::type_name;
use std::collections::HashMap;
use std::sync::Arc;

use crate::errors::RegistryError;
use crate::service::{downcast_service, Service};

/// Карта имя -> экземпляр, собранная реестром перед вызовом конструктора
///
/// Конструктор получает ровно те зависимости, которые были объявлены
/// при регистрации, уже сконструированные. Доступ к отсутствующему
/// имени означает расхождение между объявлением и использованием и
/// отчитывается как `ServiceNotFound`.
pub struct ResolvedDeps {
    entries: HashMap<String, Arc<dyn Service>>,
}

impl ResolvedDeps {
    pub(crate) fn new(entries: HashMap<String, Arc<dyn Service>>) -> Self {
        Self { entries }
    }

    /// Типизированный доступ к зависимости
    pub fn get<T: Service>(&self, name: &str) -> Result<Arc<T>, RegistryError> {
        let service = self.service(name)?;
        downcast_service::<T>(service).ok_or_else(|| RegistryError::TypeMismatch {
            name: name.to_string(),
            expected: type_name::<T>(),
        })
    }

    /// Нетипизированный доступ к зависимости
    pub fn service(&self, name: &str) -> Result<Arc<dyn Service>, RegistryError> {
        self.entries
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::ServiceNotFound {
                name: name.to_string(),
            })
    }

    /// Имена доступных зависимостей, отсортированы
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
