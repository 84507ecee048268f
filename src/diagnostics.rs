//! Логирование.
//!
//! Записи уходят в `env_logger` и параллельно копируются в кольцевой буфер,
//! откуда их читают моды через `logger.logs()`.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use log::{Level, Log, Metadata, Record};

use crate::config::LoaderConfig;
use crate::error::LoaderResult;

/// Запись лога.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub level: Level,
    pub message: String,
}

/// Ограниченный буфер последних записей лога.
#[derive(Debug, Clone)]
pub struct LogBuffer {
    entries: Arc<Mutex<VecDeque<LogEntry>>>,
    capacity: usize,
}

impl LogBuffer {
    /// Буфер на `capacity` последних записей. Ноль отключает хранение.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Arc::new(Mutex::new(VecDeque::with_capacity(capacity.min(1024)))),
            capacity,
        }
    }

    /// Добавить запись, вытеснив самую старую при переполнении.
    pub fn push(&self, level: Level, message: impl Into<String>) {
        if self.capacity == 0 {
            return;
        }
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(LogEntry {
            level,
            message: message.into(),
        });
    }

    /// Снимок записей, от старых к новым.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Очистить буфер.
    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new(LoaderConfig::default().log_buffer_capacity)
    }
}

/// Логгер, который пишет через `env_logger` и копирует записи в буфер.
struct BufferedLogger {
    inner: env_logger::Logger,
    buffer: LogBuffer,
}

impl Log for BufferedLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.inner.enabled(metadata)
    }

    fn log(&self, record: &Record) {
        if !self.inner.matches(record) {
            return;
        }
        self.buffer.push(record.level(), record.args().to_string());
        self.inner.log(record);
    }

    fn flush(&self) {
        self.inner.flush();
    }
}

/// Инициализировать глобальный логгер.
///
/// Фильтр берётся из `RUST_LOG` (по умолчанию `info`), `log_filter` из
/// конфигурации имеет приоритет. Повторный вызов возвращает ошибку.
pub fn init_logging(config: &LoaderConfig) -> LoaderResult<LogBuffer> {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if let Some(filter) = &config.log_filter {
        builder.parse_filters(filter);
    }
    let inner = builder.build();
    let max_level = inner.filter();

    let buffer = LogBuffer::new(config.log_buffer_capacity);
    log::set_boxed_logger(Box::new(BufferedLogger {
        inner,
        buffer: buffer.clone(),
    }))?;
    log::set_max_level(max_level);

    Ok(buffer)
}
