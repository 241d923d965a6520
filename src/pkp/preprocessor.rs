//! Препроцессор ядер (PKP)
//!
//! Читает .cl файл с одним или несколькими ядрами и превращает его
//! в таблицу ядер, индексируемую по имени. Вместе с `KernelSource`
//! даёт динамические константы времени компиляции.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, info, warn};

use super::source::{parse_directive, KernelSource, UNDEFINED};
use crate::error::PkpError;

/// Ключевое слово объявления ядра
pub const KERNEL_KEYWORD: &str = "__kernel";

fn function_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\w+)\s*\(").expect("built-in kernel name regex must compile"))
}

/// Строка начинается с `__kernel`
pub fn is_kernel_declaration(line: &str) -> bool {
    line.split_whitespace().next() == Some(KERNEL_KEYWORD)
}

/// Имя функции из строки объявления: первый `identifier(`
pub fn kernel_function_name(line: &str) -> Option<&str> {
    function_name_regex()
        .captures(line)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Пустые строки, строки из пробелов и комментарии отбрасываются
fn is_retained(line: &str) -> bool {
    let trimmed = line.trim_start();
    !trimmed.is_empty() && !trimmed.starts_with("//")
}

#[derive(Debug, Clone, Default)]
pub struct Preprocessor {
    path: Option<PathBuf>,
    prelude: String,
    names: Vec<String>,
    kernels: HashMap<String, KernelSource>,
}

impl Preprocessor {
    /// Разбирает файл ядер
    pub fn parse(path: impl AsRef<Path>) -> Result<Self, PkpError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| PkpError::KernelFile {
            path: path.to_path_buf(),
            source,
        })?;

        let mut pkp = Self::from_source(&text)?;
        pkp.path = Some(path.to_path_buf());
        info!(path = %path.display(), kernels = ?pkp.names, "kernel file parsed");
        Ok(pkp)
    }

    /// Разбирает текст ядер, уже загруженный в память
    pub fn from_source(text: &str) -> Result<Self, PkpError> {
        let mut pkp = Self::default();
        let mut current: Option<(String, String, BTreeMap<String, String>)> = None;

        for (idx, line) in text.lines().enumerate() {
            if is_kernel_declaration(line) {
                if let Some((name, body, config)) = current.take() {
                    pkp.insert(name, body, config)?;
                }
                let name = kernel_function_name(line).ok_or_else(|| PkpError::MissingKernelName {
                    line: idx + 1,
                    text: line.trim().to_string(),
                })?;
                current = Some((name.to_string(), String::new(), BTreeMap::new()));
            }

            if !is_retained(line) {
                continue;
            }

            match current.as_mut() {
                Some((_, body, config)) => {
                    if let Some((constant, default)) = parse_directive(line) {
                        config.insert(constant.to_string(), default.unwrap_or(UNDEFINED).to_string());
                    }
                    body.push_str(line);
                    body.push('\n');
                }
                // до первого ядра: прелюдия файла (расширения, общие #define)
                None => {
                    pkp.prelude.push_str(line);
                    pkp.prelude.push('\n');
                }
            }
        }

        if let Some((name, body, config)) = current.take() {
            pkp.insert(name, body, config)?;
        }
        Ok(pkp)
    }

    fn insert(&mut self, name: String, body: String, config: BTreeMap<String, String>) -> Result<(), PkpError> {
        if self.kernels.contains_key(&name) {
            return Err(PkpError::DuplicateKernel(name));
        }
        debug!(kernel = %name, constants = ?config, "kernel registered");
        self.kernels.insert(name.clone(), KernelSource::new(name.clone(), body, config));
        self.names.push(name);
        Ok(())
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Имена ядер в порядке объявления в файле
    pub fn kernel_names(&self) -> &[String] {
        &self.names
    }

    /// Строки файла до первого ядра
    pub fn prelude(&self) -> &str {
        &self.prelude
    }

    pub fn source_object(&self, kernel: &str) -> Result<&KernelSource, PkpError> {
        self.kernels
            .get(kernel)
            .ok_or_else(|| PkpError::UnknownKernel(kernel.to_string()))
    }

    /// Обновляет константу одного ядра
    ///
    /// Ошибка не фатальна: сообщается в лог и возвращается вызывающему.
    pub fn update_config(&mut self, kernel: &str, constant: &str, value: impl Into<String>) -> Result<(), PkpError> {
        let result = match self.kernels.get_mut(kernel) {
            Some(source) => source.update_config(constant, value),
            None => Err(PkpError::UnknownKernel(kernel.to_string())),
        };
        if let Err(e) = &result {
            warn!("PKP update failed: {e}");
        }
        result
    }

    /// Препроцессор для одного ядра
    pub fn compile(&mut self, kernel: &str) -> Result<&str, PkpError> {
        let source = self
            .kernels
            .get_mut(kernel)
            .ok_or_else(|| PkpError::UnknownKernel(kernel.to_string()))?;
        Ok(source.compile())
    }

    /// Компилирует все ядра в порядке объявления и возвращает дайджест
    pub fn compile_all(&mut self) -> String {
        let mut digest = self.prelude.clone();
        for name in &self.names {
            if let Some(source) = self.kernels.get_mut(name) {
                digest.push_str(source.compile());
            }
        }
        digest
    }

    /// Дайджест по текущим значениям констант, без изменения состояния
    pub fn digest(&self) -> String {
        let mut digest = self.prelude.clone();
        for source in self.names.iter().filter_map(|name| self.kernels.get(name)) {
            digest.push_str(&source.expand());
        }
        digest
    }
}
