//! Программный ускоритель
//!
//! Выполняет ядра умножения на CPU рабочая группа за рабочей группой,
//! повторяя индексацию из kernels/*.cl. "Сборка" программы находит в
//! дайджесте объявления ядер и их `#define` константы, поэтому значения,
//! выставленные через PKP, влияют на исполнение так же, как на GPU.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use bytemuck::allocation::pod_collect_to_vec;
use tracing::debug;

use super::{Accelerator, BufferAccess, CommandQueue, KernelArg, NdRange};
use crate::error::AcceleratorError;
use crate::matrix::kernels::WORK_PER_THREAD_N;
use crate::matrix::{Element, ElementType};
use crate::pkp::{is_kernel_declaration, kernel_function_name, UNDEFINED};

const CL_BUILD_PROGRAM_FAILURE: i32 = -11;
const CL_INVALID_VALUE: i32 = -30;
const CL_INVALID_ARG_VALUE: i32 = -50;
const CL_INVALID_KERNEL_ARGS: i32 = -52;
const CL_INVALID_WORK_GROUP_SIZE: i32 = -54;
const CL_INVALID_BUFFER_SIZE: i32 = -61;

#[derive(Debug, Default)]
struct Counters {
    created: Cell<usize>,
    live: Cell<usize>,
    launches: Cell<usize>,
}

/// Счётчики эмулятора
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HostStats {
    pub buffers_created: usize,
    /// Буферы, ещё не освобождённые через Drop
    pub live_buffers: usize,
    pub launches: usize,
}

/// Константы одного ядра после сборки
type KernelDefines = HashMap<String, String>;

#[derive(Debug, Default)]
pub struct HostDevice {
    program: Option<HashMap<String, KernelDefines>>,
    counters: Rc<Counters>,
}

impl HostDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_built(&self) -> bool {
        self.program.is_some()
    }

    pub fn stats(&self) -> HostStats {
        HostStats {
            buffers_created: self.counters.created.get(),
            live_buffers: self.counters.live.get(),
            launches: self.counters.launches.get(),
        }
    }

    /// Имена собранных ядер
    pub fn kernel_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .program
            .as_ref()
            .map(|program| program.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }
}

fn build_error(log: String) -> AcceleratorError {
    AcceleratorError::Build {
        code: CL_BUILD_PROGRAM_FAILURE,
        log,
    }
}

/// Находит ядра и `#define` внутри каждого из них
fn scan_digest(digest: &str) -> Result<HashMap<String, KernelDefines>, AcceleratorError> {
    let mut program: HashMap<String, KernelDefines> = HashMap::new();
    let mut current: Option<String> = None;

    for (idx, line) in digest.lines().enumerate() {
        if is_kernel_declaration(line) {
            let name = kernel_function_name(line)
                .ok_or_else(|| build_error(format!("line {}: expected kernel function name", idx + 1)))?;
            if program.insert(name.to_string(), KernelDefines::new()).is_some() {
                return Err(build_error(format!("line {}: redefinition of '{name}'", idx + 1)));
            }
            current = Some(name.to_string());
            continue;
        }

        let Some(kernel) = current.as_ref() else { continue };
        let mut tokens = line.split_whitespace();
        if tokens.next() != Some("#define") {
            continue;
        }
        let Some(constant) = tokens.next() else {
            return Err(build_error(format!("line {}: macro name missing", idx + 1)));
        };
        let value = tokens.collect::<Vec<_>>().join(" ");
        if value == UNDEFINED {
            return Err(build_error(format!(
                "line {}: use of undeclared identifier '{UNDEFINED}' ({constant} in {kernel})",
                idx + 1
            )));
        }
        if let Some(defines) = program.get_mut(kernel) {
            defines.insert(constant.to_string(), value);
        }
    }

    if program.is_empty() {
        return Err(build_error("no kernels found in program source".to_string()));
    }
    Ok(program)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Body {
    Naive,
    LocalTiled,
    ReductionTiled,
}

#[derive(Debug, Clone)]
pub struct HostKernel {
    name: String,
    element: ElementType,
    body: Body,
    work_per_thread: Option<usize>,
}

impl HostKernel {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn element_type(&self) -> ElementType {
        self.element
    }
}

#[derive(Debug)]
pub struct HostBuffer {
    access: BufferAccess,
    data: RefCell<Vec<u8>>,
    counters: Rc<Counters>,
}

impl HostBuffer {
    pub fn access(&self) -> BufferAccess {
        self.access
    }

    /// Размер в байтах
    pub fn len(&self) -> usize {
        self.data.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for HostBuffer {
    fn drop(&mut self) {
        self.counters.live.set(self.counters.live.get().saturating_sub(1));
    }
}

/// Очередь эмулятора выполняет команды сразу при постановке
#[derive(Debug)]
pub struct HostQueue<'q> {
    device: &'q HostDevice,
}

impl Accelerator for HostDevice {
    type Buffer = HostBuffer;
    type Kernel = HostKernel;
    type Queue<'q> = HostQueue<'q>;

    fn description(&self) -> String {
        "host emulator".to_string()
    }

    fn build(&mut self, digest: &str) -> Result<(), AcceleratorError> {
        let program = scan_digest(digest)?;
        debug!(kernels = program.len(), "host program built");
        self.program = Some(program);
        Ok(())
    }

    fn kernel(&self, name: &str) -> Result<HostKernel, AcceleratorError> {
        let program = self.program.as_ref().ok_or(AcceleratorError::NotBuilt)?;
        let defines = program
            .get(name)
            .ok_or_else(|| AcceleratorError::KernelNotFound(name.to_string()))?;

        let unsupported = || AcceleratorError::Emulation(format!("no host implementation for kernel ({name})"));
        let (prefix, rest) = name.split_once('_').ok_or_else(unsupported)?;
        let element = ElementType::from_prefix(prefix).ok_or_else(unsupported)?;
        let body = match rest {
            "product_v0" => Body::Naive,
            "product_v1" => Body::LocalTiled,
            "product_v2" => Body::ReductionTiled,
            _ => return Err(unsupported()),
        };

        let work_per_thread = match defines.get(WORK_PER_THREAD_N) {
            Some(value) => Some(value.parse::<usize>().map_err(|_| {
                AcceleratorError::Emulation(format!("{WORK_PER_THREAD_N} ({value}) is not a positive integer"))
            })?),
            None => None,
        };

        Ok(HostKernel {
            name: name.to_string(),
            element,
            body,
            work_per_thread,
        })
    }

    fn create_queue(&self) -> Result<HostQueue<'_>, AcceleratorError> {
        Ok(HostQueue { device: self })
    }

    fn create_buffer(&self, access: BufferAccess, bytes: usize) -> Result<HostBuffer, AcceleratorError> {
        if bytes == 0 {
            return Err(AcceleratorError::runtime("clCreateBuffer", CL_INVALID_BUFFER_SIZE));
        }
        let counters = &self.counters;
        counters.created.set(counters.created.get() + 1);
        counters.live.set(counters.live.get() + 1);
        Ok(HostBuffer {
            access,
            data: RefCell::new(vec![0u8; bytes]),
            counters: Rc::clone(counters),
        })
    }
}

impl<'q> CommandQueue<'q> for HostQueue<'q> {
    type Buffer = HostBuffer;
    type Kernel = HostKernel;

    fn write(&self, buffer: &HostBuffer, data: &'q [u8]) -> Result<(), AcceleratorError> {
        let mut dst = buffer.data.borrow_mut();
        if data.len() > dst.len() {
            return Err(AcceleratorError::runtime("clEnqueueWriteBuffer", CL_INVALID_VALUE));
        }
        dst[..data.len()].copy_from_slice(data);
        Ok(())
    }

    fn launch(
        &self,
        kernel: &HostKernel,
        args: &[KernelArg<'_, HostBuffer>],
        range: &NdRange,
    ) -> Result<(), AcceleratorError> {
        if !range.is_aligned() {
            return Err(AcceleratorError::runtime("clEnqueueNDRangeKernel", CL_INVALID_WORK_GROUP_SIZE));
        }
        let launch = Launch::from_args(kernel, args, *range)?;
        let counters = &self.device.counters;
        counters.launches.set(counters.launches.get() + 1);
        debug!(kernel = %kernel.name, global = ?range.global, local = ?range.local, "host launch");

        match kernel.element {
            ElementType::F32 => launch.execute::<f32>(),
            ElementType::F64 => launch.execute::<f64>(),
            ElementType::I32 => launch.execute::<i32>(),
        }
    }

    fn read(&self, buffer: &HostBuffer, out: &mut [u8]) -> Result<(), AcceleratorError> {
        let src = buffer.data.borrow();
        if out.len() > src.len() {
            return Err(AcceleratorError::runtime("clEnqueueReadBuffer", CL_INVALID_VALUE));
        }
        out.copy_from_slice(&src[..out.len()]);
        Ok(())
    }

    fn finish(&self) -> Result<(), AcceleratorError> {
        Ok(())
    }
}

/// Разобранные аргументы одного запуска
struct Launch<'a> {
    kernel: &'a HostKernel,
    m: usize,
    n: usize,
    k: usize,
    a: &'a HostBuffer,
    b: &'a HostBuffer,
    c: &'a HostBuffer,
    scratch: Vec<usize>,
    range: NdRange,
}

fn dimension(value: i32) -> Result<usize, AcceleratorError> {
    usize::try_from(value).map_err(|_| AcceleratorError::runtime("clSetKernelArg", CL_INVALID_ARG_VALUE))
}

fn load<T: Copy>(data: &[T], idx: usize, what: &str) -> Result<T, AcceleratorError> {
    data.get(idx)
        .copied()
        .ok_or_else(|| AcceleratorError::Emulation(format!("out-of-bounds read {what}[{idx}]")))
}

fn store<T>(data: &mut [T], idx: usize, value: T) -> Result<(), AcceleratorError> {
    let len = data.len();
    let slot = data
        .get_mut(idx)
        .ok_or_else(|| AcceleratorError::Emulation(format!("out-of-bounds write C[{idx}] (len {len})")))?;
    *slot = value;
    Ok(())
}

impl<'a> Launch<'a> {
    fn from_args(
        kernel: &'a HostKernel,
        args: &[KernelArg<'a, HostBuffer>],
        range: NdRange,
    ) -> Result<Self, AcceleratorError> {
        let invalid = || AcceleratorError::runtime("clEnqueueNDRangeKernel", CL_INVALID_KERNEL_ARGS);
        let (m, n, k, a, b, c, rest) = match args {
            [KernelArg::Int(m), KernelArg::Int(n), KernelArg::Int(k), KernelArg::Buffer(a), KernelArg::Buffer(b), KernelArg::Buffer(c), rest @ ..] => {
                (*m, *n, *k, *a, *b, *c, rest)
            }
            _ => return Err(invalid()),
        };

        let scratch = rest
            .iter()
            .map(|arg| match arg {
                KernelArg::Local(bytes) => Ok(*bytes),
                _ => Err(invalid()),
            })
            .collect::<Result<Vec<_>, _>>()?;
        let expected = if kernel.body == Body::Naive { 0 } else { 2 };
        if scratch.len() != expected {
            return Err(invalid());
        }
        if c.access == BufferAccess::ReadOnly {
            return Err(AcceleratorError::Emulation("output buffer is read-only".to_string()));
        }

        Ok(Self {
            kernel,
            m: dimension(m)?,
            n: dimension(n)?,
            k: dimension(k)?,
            a,
            b,
            c,
            scratch,
            range,
        })
    }

    fn check_scratch<T>(&self, elements: usize) -> Result<(), AcceleratorError> {
        let need = elements * std::mem::size_of::<T>();
        match self.scratch.iter().find(|&&bytes| bytes < need) {
            Some(bytes) => Err(AcceleratorError::Emulation(format!(
                "local buffer of {bytes} bytes, kernel needs {need}"
            ))),
            None => Ok(()),
        }
    }

    fn execute<T: Element>(&self) -> Result<(), AcceleratorError> {
        let a: Vec<T> = pod_collect_to_vec::<u8, T>(self.a.data.borrow().as_slice());
        let b: Vec<T> = pod_collect_to_vec::<u8, T>(self.b.data.borrow().as_slice());
        let mut c: Vec<T> = pod_collect_to_vec::<u8, T>(self.c.data.borrow().as_slice());

        match self.kernel.body {
            Body::Naive => self.naive(&a, &b, &mut c)?,
            Body::LocalTiled => self.local_tiled(&a, &b, &mut c)?,
            Body::ReductionTiled => self.reduction_tiled(&a, &b, &mut c)?,
        }

        let bytes: &[u8] = bytemuck::cast_slice(&c);
        let mut dst = self.c.data.borrow_mut();
        let len = dst.len().min(bytes.len());
        dst[..len].copy_from_slice(&bytes[..len]);
        Ok(())
    }

    fn naive<T: Element>(&self, a: &[T], b: &[T], c: &mut [T]) -> Result<(), AcceleratorError> {
        let (n, k) = (self.n, self.k);
        for row in 0..self.range.global[0] {
            for col in 0..self.range.global[1] {
                let mut acc = T::zero();
                for i in 0..k {
                    acc += load(a, row * k + i, "A")? * load(b, i * n + col, "B")?;
                }
                store(c, row * n + col, acc)?;
            }
        }
        Ok(())
    }

    fn local_tiled<T: Element>(&self, a: &[T], b: &[T], c: &mut [T]) -> Result<(), AcceleratorError> {
        let (n, k) = (self.n, self.k);
        let ts = self.range.local[0];
        if self.range.local[1] != ts {
            return Err(AcceleratorError::Emulation(format!(
                "{} expects a square work-group, got {:?}",
                self.kernel.name, self.range.local
            )));
        }
        self.check_scratch::<T>(ts * ts)?;

        let [group_rows, group_cols] = self.range.groups();
        let mut asub = vec![T::zero(); ts * ts];
        let mut bsub = vec![T::zero(); ts * ts];
        for gr in 0..group_rows {
            for gc in 0..group_cols {
                let mut acc = vec![T::zero(); ts * ts];
                for t in 0..k / ts {
                    for row in 0..ts {
                        for col in 0..ts {
                            asub[row * ts + col] = load(a, (gr * ts + row) * k + t * ts + col, "A")?;
                            bsub[row * ts + col] = load(b, (t * ts + row) * n + gc * ts + col, "B")?;
                        }
                    }
                    // barrier
                    for row in 0..ts {
                        for col in 0..ts {
                            for i in 0..ts {
                                acc[row * ts + col] += asub[row * ts + i] * bsub[i * ts + col];
                            }
                        }
                    }
                }
                for row in 0..ts {
                    for col in 0..ts {
                        store(c, (gr * ts + row) * n + gc * ts + col, acc[row * ts + col])?;
                    }
                }
            }
        }
        Ok(())
    }

    fn reduction_tiled<T: Element>(&self, a: &[T], b: &[T], c: &mut [T]) -> Result<(), AcceleratorError> {
        let (n, k) = (self.n, self.k);
        let [ts, rts] = self.range.local;
        let wpt = self.kernel.work_per_thread.ok_or_else(|| {
            AcceleratorError::Emulation(format!("{WORK_PER_THREAD_N} is not defined for {}", self.kernel.name))
        })?;
        if rts * wpt != ts {
            return Err(AcceleratorError::Emulation(format!(
                "work-group ({ts}, {rts}) with {WORK_PER_THREAD_N}={wpt} does not cover a {ts}x{ts} tile"
            )));
        }
        self.check_scratch::<T>(ts * ts)?;

        let [group_rows, group_cols] = self.range.groups();
        let mut asub = vec![T::zero(); ts * ts];
        let mut bsub = vec![T::zero(); ts * ts];
        for gr in 0..group_rows {
            for gc in 0..group_cols {
                // acc[w] потока (row, col) лежит в позиции row*TS + col + w*RTS
                let mut acc = vec![T::zero(); ts * ts];
                for t in 0..k / ts {
                    for row in 0..ts {
                        for col in 0..rts {
                            for w in 0..wpt {
                                let local = row * ts + col + w * rts;
                                asub[local] = load(a, (gr * ts + row) * k + t * ts + col + w * rts, "A")?;
                                bsub[local] = load(b, (t * ts + row) * n + gc * ts + col + w * rts, "B")?;
                            }
                        }
                    }
                    // barrier
                    for row in 0..ts {
                        for col in 0..rts {
                            for i in 0..ts {
                                let x = asub[row * ts + i];
                                for w in 0..wpt {
                                    acc[row * ts + col + w * rts] += x * bsub[i * ts + col + w * rts];
                                }
                            }
                        }
                    }
                }
                for row in 0..ts {
                    for col in 0..rts {
                        for w in 0..wpt {
                            let offset = col + w * rts;
                            store(c, (gr * ts + row) * n + gc * ts + offset, acc[row * ts + offset])?;
                        }
                    }
                }
            }
        }
        Ok(())
    }
}
