//! Исходный код одного ядра и его константы времени компиляции

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::PkpError;

/// Значение константы, объявленной без `__default`
pub const UNDEFINED: &str = "__undefined";

fn directive_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*#pragma\s+PKP\s+(\w+)(?:\s+__default\s+(\S+))?")
            .expect("built-in PKP directive regex must compile")
    })
}

/// Разбирает директиву `#pragma PKP NAME [__default VALUE]`
///
/// Возвращает имя константы и значение по умолчанию, если оно задано.
pub fn parse_directive(line: &str) -> Option<(&str, Option<&str>)> {
    let caps = directive_regex().captures(line)?;
    let name = caps.get(1)?.as_str();
    Some((name, caps.get(2).map(|m| m.as_str())))
}

/// Ядро: исходный текст, таблица констант и развёрнутый текст
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KernelSource {
    name: String,
    source: String,
    config: BTreeMap<String, String>,
    expanded: Option<String>,
}

impl KernelSource {
    pub fn new(name: impl Into<String>, source: impl Into<String>, config: BTreeMap<String, String>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            config,
            expanded: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Исходный текст до препроцессора
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Константы и их текущие значения
    pub fn config(&self) -> &BTreeMap<String, String> {
        &self.config
    }

    pub fn value(&self, constant: &str) -> Option<&str> {
        self.config.get(constant).map(String::as_str)
    }

    /// Текст после последнего `compile()`
    pub fn expanded(&self) -> Option<&str> {
        self.expanded.as_deref()
    }

    /// Обновляет значение известной константы
    pub fn update_config(&mut self, constant: &str, value: impl Into<String>) -> Result<(), PkpError> {
        match self.config.get_mut(constant) {
            Some(slot) => {
                *slot = value.into();
                Ok(())
            }
            None => Err(PkpError::UnknownConstant {
                kernel: self.name.clone(),
                constant: constant.to_string(),
            }),
        }
    }

    /// Разворачивает директивы в `#define` с текущими значениями
    ///
    /// Остальные строки проходят без изменений. Сам объект не меняется.
    pub fn expand(&self) -> String {
        let mut kernel = String::with_capacity(self.source.len());
        for line in self.source.lines() {
            match parse_directive(line) {
                Some((constant, _)) => {
                    let value = self.value(constant).unwrap_or(UNDEFINED);
                    kernel.push_str(&format!("\t#define {constant} {value}"));
                }
                None => kernel.push_str(line),
            }
            kernel.push('\n');
        }
        kernel
    }

    /// Запускает препроцессор и сохраняет результат
    pub fn compile(&mut self) -> &str {
        let expanded = self.expand();
        self.expanded.insert(expanded).as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kernel() -> KernelSource {
        let mut config = BTreeMap::new();
        config.insert("WPT".to_string(), "4".to_string());
        KernelSource::new(
            "f32_demo",
            "__kernel void f32_demo(int x)\n{\n\t#pragma PKP WPT __default 4\n\tx = WPT;\n}\n",
            config,
        )
    }

    #[test]
    fn directive_with_default() {
        assert_eq!(
            parse_directive("\t#pragma PKP WORK_PER_THREAD_N __default 8"),
            Some(("WORK_PER_THREAD_N", Some("8")))
        );
    }

    #[test]
    fn directive_without_default() {
        assert_eq!(parse_directive("#pragma  PKP TS"), Some(("TS", None)));
        assert_eq!(parse_directive("#pragma OPENCL EXTENSION cl_khr_fp64 : enable"), None);
        assert_eq!(parse_directive("int x = 0;"), None);
    }

    #[test]
    fn expand_replaces_directive_line_only() {
        let k = kernel();
        assert_eq!(
            k.expand(),
            "__kernel void f32_demo(int x)\n{\n\t#define WPT 4\n\tx = WPT;\n}\n"
        );
        assert_eq!(k.expanded(), None);
    }

    #[test]
    fn compile_uses_updated_value() {
        let mut k = kernel();
        k.update_config("WPT", "16").unwrap();
        assert!(k.compile().contains("\t#define WPT 16\n"));
        assert!(k.expanded().unwrap().contains("#define WPT 16"));
        assert!(k.source().contains("#pragma PKP WPT"));
    }

    #[test]
    fn unknown_constant_is_rejected() {
        let mut k = kernel();
        let err = k.update_config("TS", "8").unwrap_err();
        assert!(matches!(err, PkpError::UnknownConstant { ref kernel, ref constant }
            if kernel == "f32_demo" && constant == "TS"));
        assert_eq!(k.value("WPT"), Some("4"));
    }
}
