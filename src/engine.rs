//! Граница со встроенным скриптовым движком.
//!
//! Загрузчик не исполняет скрипты сам. Всё, что ему нужно от движка,
//! описано трейтом [`ScriptEngine`]; реализацию предоставляет хост.

use crate::error::ScriptResult;
use crate::value::{NativeFunction, Value};

/// Возможности движка, которыми пользуется ядро.
pub trait ScriptEngine: Send + Sync {
    /// Зарегистрировать нативную функцию как глобальную.
    ///
    /// Повторная регистрация под тем же именем заменяет предыдущую.
    fn register_native(&self, name: &str, function: NativeFunction) -> ScriptResult<()>;

    /// Установить глобальную переменную.
    fn set_global(&self, name: &str, value: Value) -> ScriptResult<()>;

    /// Выполнить исходный код. `chunk` используется в сообщениях об ошибках.
    fn evaluate(&self, source: &str, chunk: &str) -> ScriptResult<Value>;

    /// Вызвать глобальную функцию по имени.
    fn call_global(&self, name: &str, args: &[Value]) -> ScriptResult<Value>;

    /// Исходный механизм импорта модуля по имени, без перехвата.
    fn base_resolve(&self, module: &str) -> ScriptResult<Value>;
}
