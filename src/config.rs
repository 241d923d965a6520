//! Конфигурация устройства и ядер
//!
//! JSON файл вида:
//! ```json
//! {
//!   "platform_id": 0,
//!   "device_id": 0,
//!   "kernel_file": "kernels/product_f32.cl",
//!   "tile": { "rows": 8, "cols": 8 },
//!   "constants": [
//!     { "kernel": "f32_product_v2", "constant": "WORK_PER_THREAD_N", "value": "8" }
//!   ]
//! }
//! ```
//! Все поля необязательны.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dispatch::Tile;
use crate::error::{ConfigError, PkpError};
use crate::matrix::kernels::{KERNEL_FILE_F32, WORK_PER_THREAD_N};
use crate::pkp::Preprocessor;

/// Переопределение константы PKP одного ядра
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstantOverride {
    pub kernel: String,
    pub constant: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub platform_id: usize,
    pub device_id: usize,
    pub kernel_file: PathBuf,
    pub tile: Tile,
    pub constants: Vec<ConstantOverride>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            platform_id: 0,
            device_id: 0,
            kernel_file: PathBuf::from(KERNEL_FILE_F32),
            tile: Tile::default(),
            constants: Vec::new(),
        }
    }
}

impl DeviceConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        text.parse()
    }

    pub fn with_constant(mut self, kernel: &str, constant: &str, value: impl ToString) -> Self {
        self.constants.push(ConstantOverride {
            kernel: kernel.to_string(),
            constant: constant.to_string(),
            value: value.to_string(),
        });
        self
    }

    /// Применяет константы к препроцессору
    ///
    /// Сначала WORK_PER_THREAD_N каждого ядра, где он объявлен, получает
    /// значение `tile.cols`, затем применяются явные переопределения.
    pub fn apply(&self, pkp: &mut Preprocessor) -> Result<(), PkpError> {
        let reduction_kernels: Vec<String> = pkp
            .kernel_names()
            .iter()
            .filter(|name| {
                pkp.source_object(name)
                    .map(|source| source.value(WORK_PER_THREAD_N).is_some())
                    .unwrap_or(false)
            })
            .cloned()
            .collect();
        for kernel in &reduction_kernels {
            pkp.update_config(kernel, WORK_PER_THREAD_N, self.tile.cols.to_string())?;
        }

        for c in &self.constants {
            debug!(kernel = %c.kernel, constant = %c.constant, value = %c.value, "constant override");
            pkp.update_config(&c.kernel, &c.constant, c.value.as_str())?;
        }
        Ok(())
    }
}

impl FromStr for DeviceConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(serde_json::from_str(s)?)
    }
}
