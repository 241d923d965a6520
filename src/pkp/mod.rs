//! Препроцессор ядер OpenCL
//!
//! Директива `#pragma PKP NAME [__default VALUE]` внутри ядра объявляет
//! константу времени компиляции; при компиляции строка заменяется на
//! `#define NAME VALUE` с текущим значением.

mod preprocessor;
mod source;

pub use preprocessor::{is_kernel_declaration, kernel_function_name, Preprocessor, KERNEL_KEYWORD};
pub use source::{parse_directive, KernelSource, UNDEFINED};
