//! Интерфейс ускорителя
//!
//! Ядро библиотеки видит устройство только через эти трейты: сборка
//! дайджеста, поиск скомпилированного ядра по имени, очередь команд и
//! буферы. Буферы, ядра и очереди освобождают ресурсы устройства в `Drop`.

mod host;

pub use host::{HostBuffer, HostDevice, HostKernel, HostQueue, HostStats};

use tracing::info;

use crate::config::DeviceConfig;
use crate::error::{AcceleratorError, ConfigError};
use crate::pkp::Preprocessor;

/// Доступ ядра к буферу
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferAccess {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

/// Аргумент ядра
#[derive(Debug)]
pub enum KernelArg<'b, B> {
    Int(i32),
    Buffer(&'b B),
    /// Буфер __local памяти заданного размера в байтах
    Local(usize),
}

/// Двумерный NDRange: глобальный размер и размер рабочей группы
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NdRange {
    pub global: [usize; 2],
    pub local: [usize; 2],
}

impl NdRange {
    pub fn new(global: [usize; 2], local: [usize; 2]) -> Self {
        Self { global, local }
    }

    /// Глобальный размер делится на размер группы покомпонентно
    pub fn is_aligned(&self) -> bool {
        self.global
            .iter()
            .zip(self.local.iter())
            .all(|(&g, &l)| l != 0 && g % l == 0)
    }

    pub fn groups(&self) -> [usize; 2] {
        [self.global[0] / self.local[0], self.global[1] / self.local[1]]
    }
}

/// Устройство: долгоживущий контекст и собранная программа
pub trait Accelerator {
    type Buffer;
    type Kernel;
    type Queue<'q>: CommandQueue<'q, Buffer = Self::Buffer, Kernel = Self::Kernel>
    where
        Self: 'q;

    /// Человекочитаемое имя устройства
    fn description(&self) -> String;

    /// Компилирует дайджест; при ошибке возвращает лог компиляции
    fn build(&mut self, digest: &str) -> Result<(), AcceleratorError>;

    /// Скомпилированное ядро по имени
    fn kernel(&self, name: &str) -> Result<Self::Kernel, AcceleratorError>;

    fn create_queue(&self) -> Result<Self::Queue<'_>, AcceleratorError>;

    fn create_buffer(&self, access: BufferAccess, bytes: usize) -> Result<Self::Buffer, AcceleratorError>;
}

/// Очередь команд, выполняемых строго по порядку
///
/// Данные неблокирующей записи заимствуются на время жизни очереди:
/// очередь дожидается завершения команд перед освобождением.
pub trait CommandQueue<'q> {
    type Buffer;
    type Kernel;

    /// Неблокирующая запись в буфер устройства
    fn write(&self, buffer: &Self::Buffer, data: &'q [u8]) -> Result<(), AcceleratorError>;

    fn launch(
        &self,
        kernel: &Self::Kernel,
        args: &[KernelArg<'_, Self::Buffer>],
        range: &NdRange,
    ) -> Result<(), AcceleratorError>;

    /// Блокирующее чтение: возвращается после выполнения всех команд очереди
    fn read(&self, buffer: &Self::Buffer, out: &mut [u8]) -> Result<(), AcceleratorError>;

    fn finish(&self) -> Result<(), AcceleratorError>;
}

/// Компилирует все ядра препроцессора и передаёт дайджест устройству
pub fn build_sources<A: Accelerator>(device: &mut A, pkp: &mut Preprocessor) -> Result<(), AcceleratorError> {
    let digest = pkp.compile_all();
    info!(
        device = %device.description(),
        kernels = pkp.kernel_names().len(),
        bytes = digest.len(),
        "building kernel digest"
    );
    device.build(&digest)
}

/// Загружает файл ядер из конфигурации, применяет константы и собирает программу
///
/// Возвращает препроцессор: порядок его ядер задаёт порядок стратегий.
pub fn configure<A: Accelerator>(device: &mut A, config: &DeviceConfig) -> Result<Preprocessor, ConfigError> {
    let mut pkp = Preprocessor::parse(&config.kernel_file)?;
    config.apply(&mut pkp)?;
    build_sources(device, &mut pkp)?;
    Ok(pkp)
}
