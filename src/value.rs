//! Значения, которыми обмениваются ядро загрузчика и скриптовый движок.
//!
//! Движок динамически типизирован, ядро — нет. На границе любое значение
//! скрипта представляется одним из вариантов [`Value`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::{ScriptError, ScriptResult};

/// Сигнатура нативной функции, вызываемой из скрипта.
pub type NativeFn = dyn Fn(&[Value]) -> ScriptResult<Value> + Send + Sync;

/// Нативная (Rust) функция, видимая скрипту как обычное значение.
#[derive(Clone)]
pub struct NativeFunction {
    name: Arc<str>,
    func: Arc<NativeFn>,
}

impl NativeFunction {
    /// Создать функцию с отладочным именем.
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&[Value]) -> ScriptResult<Value> + Send + Sync + 'static,
    {
        Self {
            name: Arc::from(name.into()),
            func: Arc::new(func),
        }
    }

    /// Отладочное имя функции.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Вызвать функцию.
    pub fn call(&self, args: &[Value]) -> ScriptResult<Value> {
        (self.func)(args)
    }

    /// Это один и тот же экземпляр функции?
    pub fn ptr_eq(&self, other: &NativeFunction) -> bool {
        Arc::ptr_eq(&self.func, &other.func)
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<fn {}>", self.name)
    }
}

impl PartialEq for NativeFunction {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

/// Таблица скрипта: разделяемый изменяемый словарь.
///
/// Клонирование таблицы даёт вторую ссылку на те же данные, как и в движке.
#[derive(Clone, Default)]
pub struct Table(Arc<RwLock<BTreeMap<String, Value>>>);

impl Table {
    /// Создать пустую таблицу.
    pub fn new() -> Self {
        Self::default()
    }

    /// Получить значение поля (`Nil`, если поля нет).
    pub fn get(&self, key: &str) -> Value {
        self.0
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
            .unwrap_or(Value::Nil)
    }

    /// Установить поле, вернуть предыдущее значение.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) -> Value {
        self.0
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value.into())
            .unwrap_or(Value::Nil)
    }

    /// Удалить поле.
    pub fn remove(&self, key: &str) -> Value {
        self.0
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
            .unwrap_or(Value::Nil)
    }

    /// Вернуть вложенную таблицу по ключу, создав её при необходимости.
    pub fn create_named(&self, key: &str) -> Table {
        let mut entries = self.0.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(Value::Table(existing)) = entries.get(key) {
            return existing.clone();
        }
        let table = Table::new();
        entries.insert(key.to_string(), Value::Table(table.clone()));
        table
    }

    /// Есть ли ключ в таблице.
    pub fn contains_key(&self, key: &str) -> bool {
        self.0
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    /// Ключи в порядке сортировки.
    pub fn keys(&self) -> Vec<String> {
        self.0
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.0.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Снимок содержимого таблицы.
    pub fn entries(&self) -> Vec<(String, Value)> {
        self.0
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Одна и та же таблица (не копия).
    pub fn ptr_eq(&self, other: &Table) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Таблицы могут ссылаться сами на себя, поэтому только ключи
        f.debug_set().entries(self.keys()).finish()
    }
}

impl PartialEq for Table {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Table {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let table = Table::new();
        for (key, value) in iter {
            table.set(key, value);
        }
        table
    }
}

/// Представление значений скрипта.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// Отсутствие значения
    #[default]
    Nil,
    /// Булево значение
    Bool(bool),
    /// Целое число
    Int(i64),
    /// Число с плавающей точкой
    Float(f64),
    /// Строка
    String(String),
    /// Массив
    Array(Vec<Value>),
    /// Таблица (разделяемая)
    Table(Table),
    /// Нативная функция
    Function(NativeFunction),
}

impl Value {
    /// Имя типа для сообщений об ошибках.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "boolean",
            Value::Int(_) | Value::Float(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Table(_) => "table",
            Value::Function(_) => "function",
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&Table> {
        match self {
            Value::Table(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&NativeFunction> {
        match self {
            Value::Function(f) => Some(f),
            _ => None,
        }
    }

    /// Получить строку или вернуть ошибку типа.
    pub fn expect_str(&self) -> ScriptResult<&str> {
        self.as_str()
            .ok_or_else(|| ScriptError::TypeError("string", self.type_name().to_string()))
    }

    /// Форматировать значение для вывода (аналог `tostring`).
    pub fn format_display(&self) -> String {
        match self {
            Value::Nil => "nil".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int(n) => n.to_string(),
            Value::Float(f) => f.to_string(),
            Value::String(s) => s.clone(),
            Value::Array(arr) => {
                let items: Vec<String> = arr.iter().map(|v| v.format_display()).collect();
                format!("[{}]", items.join(", "))
            }
            Value::Table(t) => format!("<table {}>", t.len()),
            Value::Function(f) => format!("<fn {}>", f.name()),
        }
    }

    /// Преобразовать в JSON. Функции становятся строками с их именем.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Nil => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(n) => serde_json::Value::from(*n),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Array(arr) => serde_json::Value::Array(arr.iter().map(Value::to_json).collect()),
            Value::Table(t) => serde_json::Value::Object(
                t.entries()
                    .into_iter()
                    .map(|(k, v)| (k, v.to_json()))
                    .collect(),
            ),
            Value::Function(f) => serde_json::Value::String(format!("<fn {}>", f.name())),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format_display())
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Array(v)
    }
}

impl From<Table> for Value {
    fn from(v: Table) -> Self {
        Value::Table(v)
    }
}

impl From<NativeFunction> for Value {
    fn from(v: NativeFunction) -> Self {
        Value::Function(v)
    }
}
