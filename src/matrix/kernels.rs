//! OpenCL ядра для матричного умножения

use super::types::ElementType;

/// Исходный код ядер умножения (float)
pub static PRODUCT_KERNELS_F32: &str = include_str!("../../kernels/product_f32.cl");

/// Исходный код ядер умножения (double, требует cl_khr_fp64)
pub static PRODUCT_KERNELS_F64: &str = include_str!("../../kernels/product_f64.cl");

/// Путь к файлу ядер по умолчанию (относительно корня репозитория)
pub const KERNEL_FILE_F32: &str = "kernels/product_f32.cl";
pub const KERNEL_FILE_F64: &str = "kernels/product_f64.cl";

/// Константа PKP ядра редукции: сколько элементов строки считает один поток
pub const WORK_PER_THREAD_N: &str = "WORK_PER_THREAD_N";

pub const DEFAULT_BLOCK_SIZE: usize = 8;
pub const MAX_BLOCK_SIZE: usize = 20;

/// Встроенный исходный код ядер для типа элемента
pub fn embedded_source(element: ElementType) -> Option<&'static str> {
    match element {
        ElementType::F32 => Some(PRODUCT_KERNELS_F32),
        ElementType::F64 => Some(PRODUCT_KERNELS_F64),
        ElementType::I32 => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pkp::Preprocessor;
    use std::path::Path;

    #[test]
    fn embedded_sources_match_kernel_files() {
        let root = Path::new(env!("CARGO_MANIFEST_DIR"));
        for (element, file) in [(ElementType::F32, KERNEL_FILE_F32), (ElementType::F64, KERNEL_FILE_F64)] {
            let on_disk = std::fs::read_to_string(root.join(file)).unwrap();
            assert_eq!(embedded_source(element), Some(on_disk.as_str()));
        }
        assert_eq!(embedded_source(ElementType::I32), None);
    }

    #[test]
    fn each_source_declares_every_version() {
        for element in [ElementType::F32, ElementType::F64] {
            let pkp = Preprocessor::from_source(embedded_source(element).unwrap()).unwrap();
            let expected: Vec<String> = (0..3).map(|v| format!("{element}_product_v{v}")).collect();
            assert_eq!(pkp.kernel_names(), expected.as_slice());
            let reduction = pkp.source_object(&expected[2]).unwrap();
            assert_eq!(reduction.value(WORK_PER_THREAD_N), Some("8"));
        }
    }
}
