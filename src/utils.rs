//! Вспомогательные функции и утилиты

use std::time::{Duration, Instant};

/// Измеряет время выполнения функции
pub fn measure_time<F, T>(f: F) -> (T, Duration)
where
    F: FnOnce() -> T,
{
    let start = Instant::now();
    let result = f();
    (result, start.elapsed())
}

/// Во сколько раз `measured` быстрее `reference`
pub fn speedup(reference: Duration, measured: Duration) -> f64 {
    let measured = measured.as_secs_f64();
    if measured == 0.0 {
        return f64::INFINITY;
    }
    reference.as_secs_f64() / measured
}
