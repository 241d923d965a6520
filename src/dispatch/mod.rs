//! Диспетчер умножения матриц
//!
//! Предоставляет:
//! - Таблицу стратегий и чистые функции геометрии запуска
//! - Умножение на ускорителе с проверкой операндов

mod engine;
mod strategy;

pub use engine::{dispatch, product, DispatchWarning, Product};
pub use strategy::{Geometry, Strategy, Tile};
