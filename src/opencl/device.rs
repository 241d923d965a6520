//! OpenCL устройство, реализующее интерфейс ускорителя

use std::ffi::{c_char, c_void};
use std::marker::PhantomData;
use std::ptr;

use tracing::{debug, error, info};

use super::bindings::*;
use super::callbacks::log_context_error;
use super::types::*;
use super::utils::{from_info_buffer, to_c_string};
use crate::accelerator::{Accelerator, BufferAccess, CommandQueue, KernelArg, NdRange};
use crate::config::DeviceConfig;
use crate::error::AcceleratorError;
use crate::{cl_check, cl_create};

/// GPU устройство: контекст и собранная программа
pub struct ClDevice {
    device: cl_device_id,
    context: cl_context,
    program: Option<cl_program>,
    name: String,
}

impl ClDevice {
    /// Выбирает GPU устройство по индексу платформы и устройства
    pub fn new(platform_index: usize, device_index: usize) -> Result<Self, AcceleratorError> {
        let not_found = AcceleratorError::NoDevice {
            platform: platform_index,
            device: device_index,
        };

        let mut num_platforms: cl_uint = 0;
        cl_check!(clGetPlatformIDs(0, ptr::null_mut(), &mut num_platforms))?;
        if num_platforms == 0 {
            return Err(AcceleratorError::NoPlatform);
        }
        let mut platforms = vec![ptr::null_mut(); num_platforms as usize];
        cl_check!(clGetPlatformIDs(num_platforms, platforms.as_mut_ptr(), ptr::null_mut()))?;
        let platform = *platforms.get(platform_index).ok_or(not_found)?;

        // Поиск GPU устройства
        let mut num_devices: cl_uint = 0;
        match cl_check!(clGetDeviceIDs(platform, CL_DEVICE_TYPE_GPU, 0, ptr::null_mut(), &mut num_devices)) {
            Err(AcceleratorError::Runtime { code: CL_DEVICE_NOT_FOUND, .. }) => {
                return Err(AcceleratorError::NoDevice {
                    platform: platform_index,
                    device: device_index,
                })
            }
            other => other?,
        }
        let mut devices = vec![ptr::null_mut(); num_devices as usize];
        cl_check!(clGetDeviceIDs(
            platform,
            CL_DEVICE_TYPE_GPU,
            num_devices,
            devices.as_mut_ptr(),
            ptr::null_mut()
        ))?;
        let device = *devices.get(device_index).ok_or(AcceleratorError::NoDevice {
            platform: platform_index,
            device: device_index,
        })?;

        let platform_name = platform_info_string(platform, CL_PLATFORM_NAME)?;
        let name = device_info_string(device, CL_DEVICE_NAME)?;
        info!(platform = %platform_name, device = %name, "OpenCL device selected");

        let context = cl_create!(clCreateContext(
            ptr::null(),
            1,
            &device,
            Some(log_context_error),
            ptr::null_mut()
        ))?;

        Ok(Self {
            device,
            context,
            program: None,
            name,
        })
    }

    pub fn from_config(config: &DeviceConfig) -> Result<Self, AcceleratorError> {
        Self::new(config.platform_id, config.device_id)
    }

    /// Максимальный размер рабочей группы
    pub fn max_work_group_size(&self) -> Result<usize, AcceleratorError> {
        let mut size = 0usize;
        cl_check!(clGetDeviceInfo(
            self.device,
            CL_DEVICE_MAX_WORK_GROUP_SIZE,
            std::mem::size_of::<usize>(),
            &mut size as *mut usize as *mut c_void,
            ptr::null_mut()
        ))?;
        Ok(size)
    }

    /// Размер __local памяти в байтах
    pub fn local_mem_size(&self) -> Result<u64, AcceleratorError> {
        let mut size = 0u64;
        cl_check!(clGetDeviceInfo(
            self.device,
            CL_DEVICE_LOCAL_MEM_SIZE,
            std::mem::size_of::<u64>(),
            &mut size as *mut u64 as *mut c_void,
            ptr::null_mut()
        ))?;
        Ok(size)
    }

    fn build_log(&self, program: cl_program) -> String {
        let mut log_size = 0usize;
        if let Err(e) = cl_check!(clGetProgramBuildInfo(
            program,
            self.device,
            CL_PROGRAM_BUILD_LOG,
            0,
            ptr::null_mut(),
            &mut log_size
        )) {
            return format!("build log unavailable: {e}");
        }

        let mut log = vec![0u8; log_size];
        match cl_check!(clGetProgramBuildInfo(
            program,
            self.device,
            CL_PROGRAM_BUILD_LOG,
            log_size,
            log.as_mut_ptr() as *mut c_void,
            ptr::null_mut()
        )) {
            Ok(()) => from_info_buffer(&log),
            Err(e) => format!("build log unavailable: {e}"),
        }
    }
}

fn platform_info_string(platform: cl_platform_id, param: cl_platform_info) -> Result<String, AcceleratorError> {
    let mut size = 0usize;
    cl_check!(clGetPlatformInfo(platform, param, 0, ptr::null_mut(), &mut size))?;
    let mut buffer = vec![0u8; size];
    cl_check!(clGetPlatformInfo(
        platform,
        param,
        size,
        buffer.as_mut_ptr() as *mut c_void,
        ptr::null_mut()
    ))?;
    Ok(from_info_buffer(&buffer))
}

fn device_info_string(device: cl_device_id, param: cl_device_info) -> Result<String, AcceleratorError> {
    let mut size = 0usize;
    cl_check!(clGetDeviceInfo(device, param, 0, ptr::null_mut(), &mut size))?;
    let mut buffer = vec![0u8; size];
    cl_check!(clGetDeviceInfo(
        device,
        param,
        size,
        buffer.as_mut_ptr() as *mut c_void,
        ptr::null_mut()
    ))?;
    Ok(from_info_buffer(&buffer))
}

impl Drop for ClDevice {
    fn drop(&mut self) {
        unsafe {
            if let Some(program) = self.program.take() {
                clReleaseProgram(program);
            }
            clReleaseContext(self.context);
        }
    }
}

pub struct ClKernel {
    kernel: cl_kernel,
    name: String,
}

impl ClKernel {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for ClKernel {
    fn drop(&mut self) {
        unsafe {
            clReleaseKernel(self.kernel);
        }
    }
}

pub struct ClBuffer {
    mem: cl_mem,
    size: usize,
}

impl ClBuffer {
    /// Размер в байтах
    pub fn size(&self) -> usize {
        self.size
    }
}

impl Drop for ClBuffer {
    fn drop(&mut self) {
        unsafe {
            clReleaseMemObject(self.mem);
        }
    }
}

/// Очередь команд; перед освобождением дожидается выполнения всех команд,
/// поэтому данные неблокирующей записи должны жить не меньше очереди
pub struct ClQueue<'q> {
    queue: cl_command_queue,
    _borrow: PhantomData<&'q [u8]>,
}

impl Drop for ClQueue<'_> {
    fn drop(&mut self) {
        unsafe {
            clFinish(self.queue);
            clReleaseCommandQueue(self.queue);
        }
    }
}

impl Accelerator for ClDevice {
    type Buffer = ClBuffer;
    type Kernel = ClKernel;
    type Queue<'q> = ClQueue<'q>;

    fn description(&self) -> String {
        self.name.clone()
    }

    fn build(&mut self, digest: &str) -> Result<(), AcceleratorError> {
        let source = digest.as_ptr() as *const c_char;
        let length = digest.len();
        let program = cl_create!(clCreateProgramWithSource(self.context, 1, &source, &length))?;

        if let Err(e) = cl_check!(clBuildProgram(program, 1, &self.device, ptr::null(), None, ptr::null_mut())) {
            // В случае ошибки выводим лог компиляции
            let log = self.build_log(program);
            error!("OpenCL compilation error ({e}):\n{log}");
            unsafe {
                clReleaseProgram(program);
            }
            let code = match e {
                AcceleratorError::Runtime { code, .. } => code,
                _ => -11,
            };
            return Err(AcceleratorError::Build { code, log });
        }

        if let Some(old) = self.program.replace(program) {
            unsafe {
                clReleaseProgram(old);
            }
        }
        debug!(device = %self.name, bytes = length, "program built");
        Ok(())
    }

    fn kernel(&self, name: &str) -> Result<ClKernel, AcceleratorError> {
        let program = self.program.ok_or(AcceleratorError::NotBuilt)?;
        let c_name = to_c_string(name).ok_or_else(|| AcceleratorError::KernelNotFound(name.to_string()))?;
        let kernel = cl_create!(clCreateKernel(program, c_name.as_ptr())).map_err(|e| match e {
            AcceleratorError::Runtime {
                code: CL_INVALID_KERNEL_NAME,
                ..
            } => AcceleratorError::KernelNotFound(name.to_string()),
            e => e,
        })?;
        Ok(ClKernel {
            kernel,
            name: name.to_string(),
        })
    }

    fn create_queue(&self) -> Result<ClQueue<'_>, AcceleratorError> {
        let queue = cl_create!(clCreateCommandQueue(self.context, self.device, 0))?;
        Ok(ClQueue {
            queue,
            _borrow: PhantomData,
        })
    }

    fn create_buffer(&self, access: BufferAccess, bytes: usize) -> Result<ClBuffer, AcceleratorError> {
        let flags = match access {
            BufferAccess::ReadOnly => CL_MEM_READ_ONLY,
            BufferAccess::WriteOnly => CL_MEM_WRITE_ONLY,
            BufferAccess::ReadWrite => CL_MEM_READ_WRITE,
        };
        let mem = cl_create!(clCreateBuffer(self.context, flags, bytes, ptr::null_mut()))?;
        Ok(ClBuffer { mem, size: bytes })
    }
}

impl<'q> CommandQueue<'q> for ClQueue<'q> {
    type Buffer = ClBuffer;
    type Kernel = ClKernel;

    fn write(&self, buffer: &ClBuffer, data: &'q [u8]) -> Result<(), AcceleratorError> {
        cl_check!(clEnqueueWriteBuffer(
            self.queue,
            buffer.mem,
            CL_FALSE,
            0,
            data.len(),
            data.as_ptr() as *const c_void,
            0,
            ptr::null(),
            ptr::null_mut()
        ))
    }

    fn launch(
        &self,
        kernel: &ClKernel,
        args: &[KernelArg<'_, ClBuffer>],
        range: &NdRange,
    ) -> Result<(), AcceleratorError> {
        for (index, arg) in args.iter().enumerate() {
            let index = index as cl_uint;
            match arg {
                KernelArg::Int(value) => cl_check!(clSetKernelArg(
                    kernel.kernel,
                    index,
                    std::mem::size_of::<cl_int>(),
                    value as *const i32 as *const c_void
                ))?,
                KernelArg::Buffer(buffer) => cl_check!(clSetKernelArg(
                    kernel.kernel,
                    index,
                    std::mem::size_of::<cl_mem>(),
                    &buffer.mem as *const cl_mem as *const c_void
                ))?,
                KernelArg::Local(bytes) => cl_check!(clSetKernelArg(kernel.kernel, index, *bytes, ptr::null()))?,
            }
        }

        cl_check!(clEnqueueNDRangeKernel(
            self.queue,
            kernel.kernel,
            2,
            ptr::null(),
            range.global.as_ptr(),
            range.local.as_ptr(),
            0,
            ptr::null(),
            ptr::null_mut()
        ))
    }

    fn read(&self, buffer: &ClBuffer, out: &mut [u8]) -> Result<(), AcceleratorError> {
        cl_check!(clEnqueueReadBuffer(
            self.queue,
            buffer.mem,
            CL_TRUE,
            0,
            out.len(),
            out.as_mut_ptr() as *mut c_void,
            0,
            ptr::null(),
            ptr::null_mut()
        ))
    }

    fn finish(&self) -> Result<(), AcceleratorError> {
        cl_check!(clFinish(self.queue))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accelerator::build_sources;
    use crate::dispatch::{dispatch, Strategy, Tile};
    use crate::matrix::{Matrix, PRODUCT_KERNELS_F32};
    use crate::pkp::Preprocessor;

    #[test]
    #[ignore = "requires an OpenCL GPU"]
    fn gpu_matches_cpu_for_every_strategy() {
        let tile = Tile::square(4);
        let mut pkp = Preprocessor::from_source(PRODUCT_KERNELS_F32).unwrap();
        pkp.update_config("f32_product_v2", "WORK_PER_THREAD_N", "4").unwrap();
        let mut device = ClDevice::new(0, 0).unwrap();
        build_sources(&mut device, &mut pkp).unwrap();

        let mut a = Matrix::<f32>::new(16, 16);
        let mut b = Matrix::<f32>::new(16, 16);
        a.fill_ints();
        b.fill_ints();
        let expected = a.product(&b).unwrap();
        for strategy in Strategy::ALL {
            let c = dispatch(&a, &b, &device, strategy, tile).unwrap();
            assert!(c.matrix.approx_eq(&expected, 1e-3), "{strategy}");
        }
    }

    #[test]
    #[ignore = "requires an OpenCL GPU"]
    fn build_error_carries_log() {
        let mut device = ClDevice::new(0, 0).unwrap();
        let err = device.build("__kernel void broken( {").unwrap_err();
        assert!(matches!(err, AcceleratorError::Build { .. }));
    }
}
