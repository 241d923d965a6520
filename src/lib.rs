//! Умножение матриц на OpenCL ускорителе
//!
//! Препроцессор ядер (PKP) подставляет константы времени компиляции в
//! исходники .cl, диспетчер выбирает стратегию умножения, считает
//! геометрию запуска и передаёт данные на устройство.

pub mod accelerator;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod matrix;
pub mod pkp;
pub mod utils;

#[cfg(feature = "opencl")]
pub mod opencl;

// Реэкспортируем макросы на уровень крейта
#[cfg(feature = "opencl")]
#[macro_use]
mod macros {
    /// Вызов OpenCL, возвращающий код ошибки
    #[macro_export]
    macro_rules! cl_check {
        ($func:ident($($arg:expr),* $(,)?)) => {{
            let code = unsafe { $crate::opencl::bindings::$func($($arg),*) };
            if code != $crate::opencl::types::CL_SUCCESS {
                Err($crate::error::AcceleratorError::runtime(stringify!($func), code))
            } else {
                Ok(())
            }
        }};
    }

    /// Вызов OpenCL, создающий объект; код ошибки через последний аргумент errcode_ret
    #[macro_export]
    macro_rules! cl_create {
        ($func:ident($($arg:expr),* $(,)?)) => {{
            let mut code: $crate::opencl::types::cl_int = $crate::opencl::types::CL_SUCCESS;
            let obj = unsafe { $crate::opencl::bindings::$func($($arg,)* &mut code) };
            if code != $crate::opencl::types::CL_SUCCESS {
                Err($crate::error::AcceleratorError::runtime(stringify!($func), code))
            } else if obj.is_null() {
                Err($crate::error::AcceleratorError::runtime(stringify!($func), -5))
            } else {
                Ok(obj)
            }
        }};
    }
}

// Реэкспорт основных типов для удобства
pub use accelerator::{configure, Accelerator, HostDevice};
pub use config::DeviceConfig;
pub use dispatch::{dispatch, product, DispatchWarning, Product, Strategy, Tile};
pub use error::{AcceleratorError, ConfigError, DispatchError, MatrixError, PkpError};
pub use matrix::{Element, ElementType, Matrix, MatrixType};
pub use pkp::Preprocessor;

#[cfg(feature = "opencl")]
pub use opencl::ClDevice;
