//! Граф зависимостей модов и вычисление порядка загрузки.

use std::collections::{HashMap, HashSet};

use log::warn;

/// Зависимость на мод, которого нет в графе.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingDependency {
    /// Кто зависит
    pub dependent: String,
    /// От чего
    pub dependency: String,
}

/// Результат разрешения зависимостей.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Порядок загрузки: каждый узел после всех своих известных зависимостей
    pub order: Vec<String>,
    /// Найденные циклы. Первый и последний элемент совпадают: `a -> b -> a`
    pub cycles: Vec<Vec<String>>,
    /// Рёбра на неизвестные узлы
    pub missing: Vec<MissingDependency>,
}

impl Resolution {
    /// Есть ли что сообщить пользователю.
    pub fn has_issues(&self) -> bool {
        !self.cycles.is_empty() || !self.missing.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Граф зависимостей.
///
/// Ребро `a -> b` означает «`a` требует, чтобы `b` был загружен раньше».
/// Узлы и рёбра хранятся в порядке добавления, от него зависит порядок
/// загрузки независимых модов.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: Vec<String>,
    index: HashMap<String, usize>,
    edges: Vec<(String, String)>,
    edge_set: HashSet<(String, String)>,
}

impl DependencyGraph {
    /// Создать пустой граф.
    pub fn new() -> Self {
        Self::default()
    }

    /// Добавить узел. Повторное добавление ничего не меняет.
    pub fn add_node(&mut self, name: &str) {
        if self.index.contains_key(name) {
            return;
        }
        self.index.insert(name.to_string(), self.nodes.len());
        self.nodes.push(name.to_string());
    }

    /// Добавить ребро `from -> to`. Узел `to` может быть ещё неизвестен.
    pub fn add_edge(&mut self, from: &str, to: &str) {
        let edge = (from.to_string(), to.to_string());
        if !self.edge_set.insert(edge.clone()) {
            return;
        }
        self.edges.push(edge);
    }

    /// Есть ли узел в графе.
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Узлы в порядке добавления.
    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }

    /// Прямые зависимости узла, включая неизвестные.
    pub fn dependencies_of(&self, name: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|(from, _)| from == name)
            .map(|(_, to)| to.as_str())
            .collect()
    }

    /// Количество узлов.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Граф без узлов?
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Порядок загрузки.
    pub fn resolve_dependencies(&self) -> Vec<String> {
        self.resolve().order
    }

    /// Топологическая сортировка с диагностикой.
    ///
    /// Итеративный DFS с тремя состояниями узла. Обратное ребро на узел
    /// в состоянии `InProgress` означает цикл: оно пропускается, цикл
    /// записывается в результат. Рёбра на неизвестные узлы считаются
    /// выполненными.
    pub fn resolve(&self) -> Resolution {
        let mut resolution = Resolution::default();
        let adjacency = self.adjacency(&mut resolution.missing);

        let mut marks = vec![Mark::Unvisited; self.nodes.len()];
        resolution.order.reserve(self.nodes.len());

        for root in 0..self.nodes.len() {
            if marks[root] != Mark::Unvisited {
                continue;
            }

            // (узел, индекс следующей зависимости)
            let mut stack: Vec<(usize, usize)> = vec![(root, 0)];
            marks[root] = Mark::InProgress;

            while let Some(top) = stack.len().checked_sub(1) {
                let (node, cursor) = stack[top];

                let Some(&dependency) = adjacency[node].get(cursor) else {
                    marks[node] = Mark::Done;
                    resolution.order.push(self.nodes[node].clone());
                    stack.pop();
                    continue;
                };
                stack[top].1 += 1;

                match marks[dependency] {
                    Mark::Unvisited => {
                        marks[dependency] = Mark::InProgress;
                        stack.push((dependency, 0));
                    }
                    Mark::InProgress => {
                        let start = stack
                            .iter()
                            .position(|&(n, _)| n == dependency)
                            .unwrap_or(0);
                        let mut cycle: Vec<String> = stack[start..]
                            .iter()
                            .map(|&(n, _)| self.nodes[n].clone())
                            .collect();
                        cycle.push(self.nodes[dependency].clone());
                        resolution.cycles.push(cycle);
                    }
                    Mark::Done => {}
                }
            }
        }

        for missing in &resolution.missing {
            warn!(
                "\"{}\" depends on \"{}\", which is missing or disabled",
                missing.dependent, missing.dependency
            );
        }
        for cycle in &resolution.cycles {
            warn!("dependency cycle detected: {}", cycle.join(" -> "));
        }

        resolution
    }

    /// Списки смежности по индексам, только для известных узлов.
    fn adjacency(&self, missing: &mut Vec<MissingDependency>) -> Vec<Vec<usize>> {
        let mut adjacency = vec![Vec::new(); self.nodes.len()];

        for (from, to) in &self.edges {
            let Some(&from_idx) = self.index.get(from) else {
                continue;
            };
            match self.index.get(to) {
                Some(&to_idx) => adjacency[from_idx].push(to_idx),
                None => missing.push(MissingDependency {
                    dependent: from.clone(),
                    dependency: to.clone(),
                }),
            }
        }

        adjacency
    }
}
