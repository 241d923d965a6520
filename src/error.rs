//! Типы ошибок библиотеки

use std::path::PathBuf;

use thiserror::Error;

/// Ошибки препроцессора ядер (PKP)
#[derive(Debug, Error)]
pub enum PkpError {
    /// Файл с ядрами не найден или не читается
    #[error("kernel file ({}) not found: {source}", path.display())]
    KernelFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Строка `__kernel` без имени функции
    #[error("kernel declaration without a function name at line {line}: {text}")]
    MissingKernelName { line: usize, text: String },

    /// Ядро с таким именем уже объявлено в файле
    #[error("kernel ({0}) declared more than once")]
    DuplicateKernel(String),

    #[error("kernel ({0}) not found")]
    UnknownKernel(String),

    #[error("constant ({constant}) not found in kernel ({kernel})")]
    UnknownConstant { kernel: String, constant: String },
}

/// Ошибки операций над матрицами
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MatrixError {
    /// Длина буфера не равна m*n
    #[error("buffer of {len} elements cannot back a {m}(rows) x {n}(cols) matrix")]
    BufferLength { m: usize, n: usize, len: usize },

    #[error("unable to broadcast row(len={len}) into matrix {m}(rows) x {n}(cols)")]
    RowBroadcast { len: usize, m: usize, n: usize },

    #[error("unable to broadcast col(len={len}) into matrix {m}(rows) x {n}(cols)")]
    ColBroadcast { len: usize, m: usize, n: usize },

    #[error("unable to broadcast shape {0}(rows) x {1}(cols) into {2}(rows) x {3}(cols)")]
    Shape(usize, usize, usize, usize),

    #[error("operation undefined for non-square matrix {0}(rows) x {1}(cols)")]
    NotSquare(usize, usize),
}

/// Ошибки ускорителя (OpenCL или эмулятор)
#[derive(Debug, Error)]
pub enum AcceleratorError {
    #[error("no OpenCL platforms found, check OpenCL installation")]
    NoPlatform,

    #[error("device index ({device}) not available on platform ({platform})")]
    NoDevice { platform: usize, device: usize },

    /// Вызов OpenCL вернул код ошибки
    #[error("runtime error({code}) in {call}: {name}")]
    Runtime {
        call: &'static str,
        code: i32,
        name: &'static str,
    },

    /// Компиляция дайджеста не удалась; содержит лог компиляции
    #[error("build error({code}): {log}")]
    Build { code: i32, log: String },

    #[error("kernel ({0}) not found in built program")]
    KernelNotFound(String),

    #[error("program has not been built")]
    NotBuilt,

    #[error("emulation error: {0}")]
    Emulation(String),
}

impl AcceleratorError {
    /// Ошибка времени выполнения с символическим именем кода
    pub fn runtime(call: &'static str, code: i32) -> Self {
        AcceleratorError::Runtime {
            call,
            code,
            name: error_name(code),
        }
    }
}

/// Ошибки диспетчера умножения
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("unknown strategy ({0})")]
    UnknownStrategy(String),

    /// Размер тайла не делит размерности задачи
    #[error("unaligned tiling ({rows}, {cols}) for {strategy}: {reason}")]
    UnalignedTile {
        strategy: &'static str,
        rows: usize,
        cols: usize,
        reason: String,
    },

    #[error("strategy {strategy} failed: {source}")]
    Accelerator {
        strategy: &'static str,
        #[source]
        source: AcceleratorError,
    },

    #[error(transparent)]
    Matrix(#[from] MatrixError),
}

/// Ошибки загрузки конфигурации
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read config ({}): {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Pkp(#[from] PkpError),

    #[error(transparent)]
    Accelerator(#[from] AcceleratorError),
}

/// Символическое имя кода ошибки OpenCL
pub fn error_name(code: i32) -> &'static str {
    match code {
        0 => "CL_SUCCESS",
        -1 => "CL_DEVICE_NOT_FOUND",
        -2 => "CL_DEVICE_NOT_AVAILABLE",
        -3 => "CL_COMPILER_NOT_AVAILABLE",
        -4 => "CL_MEM_OBJECT_ALLOCATION_FAILURE",
        -5 => "CL_OUT_OF_RESOURCES",
        -6 => "CL_OUT_OF_HOST_MEMORY",
        -7 => "CL_PROFILING_INFO_NOT_AVAILABLE",
        -8 => "CL_MEM_COPY_OVERLAP",
        -11 => "CL_BUILD_PROGRAM_FAILURE",
        -12 => "CL_MAP_FAILURE",
        -30 => "CL_INVALID_VALUE",
        -31 => "CL_INVALID_DEVICE_TYPE",
        -32 => "CL_INVALID_PLATFORM",
        -33 => "CL_INVALID_DEVICE",
        -34 => "CL_INVALID_CONTEXT",
        -36 => "CL_INVALID_COMMAND_QUEUE",
        -38 => "CL_INVALID_MEM_OBJECT",
        -44 => "CL_INVALID_PROGRAM",
        -45 => "CL_INVALID_PROGRAM_EXECUTABLE",
        -46 => "CL_INVALID_KERNEL_NAME",
        -48 => "CL_INVALID_KERNEL",
        -49 => "CL_INVALID_ARG_INDEX",
        -50 => "CL_INVALID_ARG_VALUE",
        -51 => "CL_INVALID_ARG_SIZE",
        -52 => "CL_INVALID_KERNEL_ARGS",
        -53 => "CL_INVALID_WORK_DIMENSION",
        -54 => "CL_INVALID_WORK_GROUP_SIZE",
        -55 => "CL_INVALID_WORK_ITEM_SIZE",
        -56 => "CL_INVALID_GLOBAL_OFFSET",
        -61 => "CL_INVALID_BUFFER_SIZE",
        -63 => "CL_INVALID_GLOBAL_WORK_SIZE",
        _ => "Unknown OpenCL error",
    }
}
