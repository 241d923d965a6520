//! Вспомогательные функции для OpenCL

use std::ffi::CString;

/// Имя ядра как null-terminated строка для clCreateKernel
///
/// `None`, если имя содержит нулевой байт.
pub fn to_c_string(s: &str) -> Option<CString> {
    CString::new(s).ok()
}

/// Строка из буфера clGet*Info: до первого нулевого байта
pub fn from_info_buffer(buffer: &[u8]) -> String {
    let end = buffer.iter().position(|&b| b == 0).unwrap_or(buffer.len());
    String::from_utf8_lossy(&buffer[..end]).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn info_buffer_stops_at_nul() {
        assert_eq!(from_info_buffer(b"Intel(R) Iris\0\0\0"), "Intel(R) Iris");
        assert_eq!(from_info_buffer(b"no terminator"), "no terminator");
    }

    #[test]
    fn kernel_name_with_nul_is_rejected() {
        assert!(to_c_string("f32_product_v0").is_some());
        assert!(to_c_string("bad\0name").is_none());
    }
}
