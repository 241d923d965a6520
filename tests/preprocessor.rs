//! Препроцессор ядер на файлах

use std::io::Write;
use std::path::Path;

use opencl_mmul::accelerator::{configure, HostDevice};
use opencl_mmul::config::DeviceConfig;
use opencl_mmul::error::{AcceleratorError, ConfigError, PkpError};
use opencl_mmul::matrix::kernels::{KERNEL_FILE_F32, WORK_PER_THREAD_N};
use opencl_mmul::pkp::{Preprocessor, UNDEFINED};
use tempfile::NamedTempFile;

const TWO_KERNELS: &str = "\
// two kernels, one constant each

__kernel void scale(__global float* x)
{
\t#pragma PKP FACTOR __default 2
\tx[get_global_id(0)] *= FACTOR;
}

__kernel void shift(__global float* x)
{
\t#pragma PKP OFFSET
\t// comment inside a kernel body
\tx[get_global_id(0)] += OFFSET;
}
";

fn kernel_file(text: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".cl").tempfile().unwrap();
    file.write_all(text.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

fn repo_file(relative: &str) -> std::path::PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join(relative)
}

#[test]
fn compile_all_keeps_file_order_and_substitutes_values() {
    let file = kernel_file(TWO_KERNELS);
    let mut pkp = Preprocessor::parse(file.path()).unwrap();
    assert_eq!(pkp.path(), Some(file.path()));
    assert_eq!(pkp.kernel_names(), ["scale", "shift"]);

    pkp.update_config("scale", "FACTOR", "3").unwrap();
    pkp.update_config("shift", "OFFSET", "1.5f").unwrap();
    let digest = pkp.compile_all();

    let scale = digest.find("void scale").unwrap();
    let shift = digest.find("void shift").unwrap();
    assert!(scale < shift);
    assert!(digest.contains("\t#define FACTOR 3\n"));
    assert!(digest.contains("\t#define OFFSET 1.5f\n"));
    assert!(!digest.contains("#pragma PKP"));
    assert!(!digest.contains("comment inside"));
    assert!(!digest.contains("\n\n"));
}

#[test]
fn constant_without_default_is_undefined() {
    let file = kernel_file(TWO_KERNELS);
    let pkp = Preprocessor::parse(file.path()).unwrap();
    let shift = pkp.source_object("shift").unwrap();
    assert_eq!(shift.value("OFFSET"), Some(UNDEFINED));
    assert!(pkp.digest().contains(&format!("#define OFFSET {UNDEFINED}")));
}

#[test]
fn product_kernel_file_declares_three_strategies() {
    let pkp = Preprocessor::parse(repo_file(KERNEL_FILE_F32)).unwrap();
    assert_eq!(pkp.kernel_names(), ["f32_product_v0", "f32_product_v1", "f32_product_v2"]);
    let reduction = pkp.source_object("f32_product_v2").unwrap();
    assert_eq!(reduction.value(WORK_PER_THREAD_N), Some("8"));
    assert!(pkp.source_object("f32_product_v0").unwrap().config().is_empty());
}

#[test]
fn missing_kernel_file_is_reported() {
    let err = Preprocessor::parse("kernels/does_not_exist.cl").unwrap_err();
    assert!(matches!(err, PkpError::KernelFile { .. }));
}

#[test]
fn configure_builds_overridden_digest() {
    let file = kernel_file(TWO_KERNELS);
    let config = DeviceConfig {
        kernel_file: file.path().to_path_buf(),
        ..DeviceConfig::default()
    }
    .with_constant("shift", "OFFSET", 4);

    let mut device = HostDevice::new();
    let pkp = configure(&mut device, &config).unwrap();
    assert!(device.is_built());
    assert_eq!(device.kernel_names(), ["scale", "shift"]);
    assert!(pkp.digest().contains("#define OFFSET 4"));
}

#[test]
fn configure_surfaces_build_failure() {
    let file = kernel_file(TWO_KERNELS);
    let config = DeviceConfig {
        kernel_file: file.path().to_path_buf(),
        ..DeviceConfig::default()
    };

    let mut device = HostDevice::new();
    let err = configure(&mut device, &config).unwrap_err();
    assert!(matches!(
        err,
        ConfigError::Accelerator(AcceleratorError::Build { ref log, .. }) if log.contains("OFFSET")
    ));
    assert!(!device.is_built());
}

#[test]
fn configure_rejects_unknown_override() {
    let config = DeviceConfig {
        kernel_file: repo_file(KERNEL_FILE_F32),
        ..DeviceConfig::default()
    }
    .with_constant("f32_product_v9", WORK_PER_THREAD_N, 4);

    let mut device = HostDevice::new();
    let err = configure(&mut device, &config).unwrap_err();
    assert!(matches!(err, ConfigError::Pkp(PkpError::UnknownKernel(_))));
}

#[test]
fn config_file_round_trip() {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{ "tile": {{ "rows": 4, "cols": 4 }}, "constants": [{{ "kernel": "scale", "constant": "FACTOR", "value": "5" }}] }}"#
    )
    .unwrap();
    file.flush().unwrap();

    let config = DeviceConfig::from_file(file.path()).unwrap();
    assert_eq!(config.tile.rows, 4);
    assert_eq!(config.constants.len(), 1);
    assert_eq!(config.kernel_file, Path::new(KERNEL_FILE_F32));
}
