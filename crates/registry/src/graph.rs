//! Анализ графа зависимостей
//!
//! Чистые функции над снимком графа `имя -> [имена зависимостей]`.
//! Реестр снимает копию своей карты под блокировкой и анализирует ее
//! без блокировки. Топологический порядок нужен только для диагностики,
//! корректность `get` от него не зависит.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;

/// Цвет узла при обходе в глубину
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    /// Не посещен
    White,
    /// В текущем стеке обхода
    Gray,
    /// Полностью обработан
    Black,
}

/// Пары (сервис, отсутствующая зависимость), отсортированные для
/// детерминированного вывода
pub fn find_missing(graph: &HashMap<String, Vec<String>>) -> Vec<(String, String)> {
    let mut missing: Vec<(String, String)> = graph
        .iter()
        .flat_map(|(service, deps)| {
            deps.iter()
                .filter(|dep| !graph.contains_key(*dep))
                .map(move |dep| (service.clone(), dep.clone()))
        })
        .collect();
    missing.sort();
    missing
}

/// Найти все циклы обходом в глубину с раскраской white/gray/black
///
/// Повторный вход в серый узел замыкает цикл: текущий путь срезается от
/// первого вхождения узла и цепочка закрывается им же, то есть
/// `A -> B -> A`. Каждый узел посещается один раз, поэтому каждый цикл
/// отчитывается однократно. Старт с отсортированных имен дает
/// детерминированный порядок.
pub fn find_cycles(graph: &HashMap<String, Vec<String>>) -> Vec<Vec<String>> {
    let mut colors: HashMap<&str, Color> =
        graph.keys().map(|name| (name.as_str(), Color::White)).collect();
    let mut cycles = Vec::new();
    let mut path: Vec<&str> = Vec::new();

    let mut names: Vec<&str> = graph.keys().map(String::as_str).collect();
    names.sort_unstable();

    for name in names {
        if colors[name] == Color::White {
            dfs_visit(name, graph, &mut colors, &mut path, &mut cycles);
        }
    }

    cycles
}

fn dfs_visit<'a>(
    node: &'a str,
    graph: &'a HashMap<String, Vec<String>>,
    colors: &mut HashMap<&'a str, Color>,
    path: &mut Vec<&'a str>,
    cycles: &mut Vec<Vec<String>>,
) {
    colors.insert(node, Color::Gray);
    path.push(node);

    if let Some(deps) = graph.get(node) {
        for dep in deps {
            // Незарегистрированные зависимости для циклов не ребра:
            // их отчитывает find_missing
            match colors.get(dep.as_str()) {
                Some(Color::White) => dfs_visit(dep, graph, colors, path, cycles),
                Some(Color::Gray) => {
                    if let Some(start) = path.iter().position(|n| *n == dep) {
                        let mut cycle: Vec<String> =
                            path[start..].iter().map(|n| n.to_string()).collect();
                        cycle.push(dep.clone());
                        cycles.push(cycle);
                    }
                }
                Some(Color::Black) | None => {}
            }
        }
    }

    path.pop();
    colors.insert(node, Color::Black);
}

/// Топологический порядок по алгоритму Кана
///
/// Равные кандидаты упорядочиваются лексикографически. При цикле
/// возвращается `Err` с именами сервисов, не вошедшими в порядок.
pub fn topo_order(graph: &HashMap<String, Vec<String>>) -> Result<Vec<String>, Vec<String>> {
    // Количество неупорядоченных зависимостей каждого сервиса.
    // Ребро dep -> service: сервис готов когда все его зависимости в порядке.
    let mut pending: BTreeMap<&str, usize> = BTreeMap::new();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();

    for (service, deps) in graph {
        pending.entry(service.as_str()).or_insert(0);
        for dep in deps {
            if graph.contains_key(dep.as_str()) {
                *pending.entry(service.as_str()).or_insert(0) += 1;
                dependents.entry(dep.as_str()).or_default().push(service.as_str());
            }
        }
    }

    // BTreeSet дает лексикографический минимум на каждом шаге
    let mut ready: std::collections::BTreeSet<&str> = pending
        .iter()
        .filter(|(_, count)| **count == 0)
        .map(|(name, _)| *name)
        .collect();

    let mut order = Vec::with_capacity(pending.len());
    while let Some(&next) = ready.iter().next() {
        ready.remove(next);
        order.push(next.to_string());

        if let Some(children) = dependents.get(next) {
            for &child in children {
                if let Some(count) = pending.get_mut(child) {
                    *count -= 1;
                    if *count == 0 {
                        ready.insert(child);
                    }
                }
            }
        }
    }

    if order.len() == pending.len() {
        Ok(order)
    } else {
        let ordered: HashSet<&str> = order.iter().map(String::as_str).collect();
        let mut leftover: Vec<String> = pending
            .keys()
            .filter(|name| !ordered.contains(**name))
            .map(|name| name.to_string())
            .collect();
        leftover.sort_unstable();
        Err(leftover)
    }
}

/// Сводка по графу для диагностического отчета
#[derive(Debug, Clone, Serialize)]
pub struct GraphStats {
    pub services: usize,
    pub edges: usize,
    pub average_fan_out: f64,
    pub max_fan_out: usize,
    pub most_dependent: Option<String>,
}

pub fn graph_stats(graph: &HashMap<String, Vec<String>>) -> GraphStats {
    let services = graph.len();
    let edges: usize = graph.values().map(Vec::len).sum();

    let mut max_fan_out = 0;
    let mut most_dependent = None;
    let mut names: Vec<&String> = graph.keys().collect();
    names.sort_unstable();
    for name in names {
        let fan_out = graph[name].len();
        if fan_out > max_fan_out {
            max_fan_out = fan_out;
            most_dependent = Some(name.clone());
        }
    }

    GraphStats {
        services,
        edges,
        average_fan_out: if services > 0 {
            edges as f64 / services as f64
        } else {
            0.0
        },
        max_fan_out,
        most_dependent,
    }
}
