//! Модуль для работы с OpenCL
//!
//! Содержит низкоуровневые привязки и безопасные обертки для OpenCL:
//! устройство, очередь, буферы и ядра освобождаются в `Drop`.

pub mod bindings;
pub mod callbacks;
pub mod types;
pub mod utils;

mod device;

pub use device::{ClBuffer, ClDevice, ClKernel, ClQueue};
