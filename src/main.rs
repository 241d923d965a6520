//! Сравнение стратегий умножения матриц на GPU
//!
//! Каждое ядро из файла запускается по очереди в порядке объявления,
//! результат сверяется с умножением на CPU.

use anyhow::{ensure, Context, Result};
use prettytable::{row, Table};
use tracing_subscriber::EnvFilter;

use opencl_mmul::{
    accelerator::{configure, Accelerator},
    config::DeviceConfig,
    dispatch::product,
    matrix::{equivalence_report, initialize_matrices, kernels::MAX_BLOCK_SIZE, MatrixType},
    opencl::ClDevice,
    utils::{measure_time, speedup},
};

const M: usize = 512;
const K: usize = 256;
const N: usize = 512;
const EPSILON: f64 = 1e-2;
/// Путь к JSON конфигурации устройства
const CONFIG_ENV: &str = "MMUL_CONFIG";

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match std::env::var_os(CONFIG_ENV) {
        Some(path) => DeviceConfig::from_file(&path)
            .with_context(|| format!("Не удалось загрузить конфигурацию {}", path.to_string_lossy()))?,
        None => DeviceConfig::default(),
    };
    let tile = config.tile;
    ensure!(
        tile.rows <= MAX_BLOCK_SIZE && tile.cols <= MAX_BLOCK_SIZE,
        "Размер тайла {tile} больше допустимого {MAX_BLOCK_SIZE}"
    );

    println!("Умножение матриц A({M}x{K}) * B({K}x{N})");
    println!("Размер тайла: {tile}");
    println!("Файл ядер: {}", config.kernel_file.display());

    let mut device = ClDevice::from_config(&config).context("Не удалось инициализировать OpenCL")?;
    println!("Устройство: {}", device.description());
    println!("Максимальный размер рабочей группы: {}", device.max_work_group_size()?);

    let pkp = configure(&mut device, &config).context("Не удалось собрать ядра")?;

    let (a, b) = initialize_matrices::<f32>(
        MatrixType::Random {
            low: 1,
            high: 10,
            norm: 10,
        },
        M,
        K,
        N,
    );

    println!("\nВычисления на CPU...");
    let (cpu, cpu_duration) = measure_time(|| a.product(&b));
    let cpu = cpu?;

    let mut results = Vec::new();
    let mut durations = Vec::new();
    for name in pkp.kernel_names() {
        println!("Вычисления на GPU: {name}...");
        let (c, duration) = measure_time(|| product(&a, &b, &device, name, tile));
        let c = c.with_context(|| format!("Ядро {name} завершилось с ошибкой"))?;
        results.push((name.clone(), c.into_matrix()));
        durations.push(duration);
    }

    let report = equivalence_report(&results, Some(&cpu), EPSILON);

    let mut table = Table::new();
    table.add_row(row!["Ядро", "Время", "Ускорение", "Расхождений", "Макс. разница", "Результат"]);
    table.add_row(row!["cpu", format!("{cpu_duration:?}"), "1.00", "-", "-", "эталон"]);
    for ((name, cmp), duration) in report.iter().zip(&durations) {
        let verdict = if cmp.is_match() { "совпадает" } else { "различается" };
        table.add_row(row![
            name,
            format!("{duration:?}"),
            format!("{:.2}", speedup(cpu_duration, *duration)),
            cmp.mismatches,
            format!("{:.6}", cmp.max_diff),
            verdict
        ]);
    }

    println!("\nИтоговая статистика:");
    table.printstd();

    Ok(())
}
