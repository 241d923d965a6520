//! Модуль для работы с матрицами
//!
//! Предоставляет:
//! - Плотную матрицу и CPU-алгоритмы (LU, определитель, обратная)
//! - Типы элементов
//! - Исходники OpenCL ядер умножения
//! - Сверку результатов GPU и CPU

mod dense;
mod types;
pub mod kernels;
pub mod operations;

pub use dense::Matrix;
pub use kernels::{PRODUCT_KERNELS_F32, PRODUCT_KERNELS_F64};
pub use operations::{compare_results, equivalence_report, initialize_matrices, Comparison};
pub use types::{Element, ElementType, MatrixType, Real};
