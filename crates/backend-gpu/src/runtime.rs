//! Kernel execution on wgpu: compile, bind, dispatch, blocking readback.

use crate::error::{CompileError, LaunchError, RuntimeError};
use bytemuck::cast_slice;
use pollster::block_on;
use puzzleforge_kernel::{
    c_strides, ArraySpec, AssembledKernel, HostArray, LaunchGeometry, ParamKind,
};
use std::collections::HashMap;
use std::sync::mpsc;
use tracing::{debug, info, warn};
use wgpu::util::DeviceExt;

/// The compute capability the harness is written against. One call
/// compiles the kernel (or fetches it from the runtime's cache), binds the
/// inputs plus derived metadata plus freshly allocated outputs in the
/// assembler's parameter order, dispatches, blocks until the device signals
/// completion, and reads the outputs back.
pub trait ComputeRuntime {
    fn execute(
        &mut self,
        kernel: &AssembledKernel,
        inputs: &[HostArray],
        outputs: &[ArraySpec],
        geometry: &LaunchGeometry,
    ) -> Result<Vec<HostArray>, RuntimeError>;
}

/// Reject geometries the device cannot dispatch, before any device work.
pub fn validate_geometry(
    geometry: &LaunchGeometry,
    limits: &wgpu::Limits,
) -> Result<(), LaunchError> {
    if !geometry.has_positive_extents() {
        return Err(LaunchError::NonPositiveExtent {
            grid: geometry.grid,
            threadgroup: geometry.threadgroup,
        });
    }
    let (tx, ty, tz) = geometry.threadgroup;
    let axes = [
        ("x", tx, limits.max_compute_workgroup_size_x),
        ("y", ty, limits.max_compute_workgroup_size_y),
        ("z", tz, limits.max_compute_workgroup_size_z),
    ];
    for (axis, extent, limit) in axes {
        if extent > limit {
            return Err(LaunchError::AxisTooLarge {
                axis,
                extent,
                limit,
            });
        }
    }
    let invocations = geometry.group_invocations();
    if invocations > limits.max_compute_invocations_per_workgroup {
        return Err(LaunchError::GroupTooLarge {
            invocations,
            limit: limits.max_compute_invocations_per_workgroup,
        });
    }
    Ok(())
}

/// Information about the adapter backing a [`WgpuRuntime`].
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub name: String,
    pub backend: String,
}

struct CachedPipeline {
    pipeline: wgpu::ComputePipeline,
    layout: wgpu::BindGroupLayout,
}

/// wgpu-backed [`ComputeRuntime`].
///
/// Owns the device, the queue, and the compiled-pipeline cache. The cache
/// key is `(kernel name, source hash)`: a kernel name reappearing with
/// different assembled source recompiles rather than reusing a stale
/// pipeline.
pub struct WgpuRuntime {
    device: wgpu::Device,
    queue: wgpu::Queue,
    device_info: DeviceInfo,
    pipelines: HashMap<(String, u64), CachedPipeline>,
    compiled: usize,
}

impl WgpuRuntime {
    pub fn new() -> Result<Self, RuntimeError> {
        let instance = wgpu::Instance::default();
        let adapter = block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .ok_or_else(|| RuntimeError::Device("no suitable GPU adapter found".into()))?;

        let adapter_info = adapter.get_info();
        let (device, queue) = block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("PuzzleForge GPU Device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
            },
            None,
        ))
        .map_err(|err| RuntimeError::Device(format!("failed to create device: {err}")))?;

        let device_info = DeviceInfo {
            name: adapter_info.name.clone(),
            backend: format!("{:?}", adapter_info.backend),
        };
        info!(
            adapter = %device_info.name,
            backend = %device_info.backend,
            "GPU runtime ready"
        );

        Ok(Self {
            device,
            queue,
            device_info,
            pipelines: HashMap::new(),
            compiled: 0,
        })
    }

    /// Whether any usable adapter is present on this machine.
    pub fn is_available() -> bool {
        let instance = wgpu::Instance::default();
        block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .is_some()
    }

    pub fn device_info(&self) -> &DeviceInfo {
        &self.device_info
    }

    /// Number of pipelines compiled so far (cache misses).
    pub fn compiled_kernel_count(&self) -> usize {
        self.compiled
    }

    fn ensure_pipeline(&mut self, kernel: &AssembledKernel) -> Result<(), RuntimeError> {
        let key = (kernel.name.clone(), kernel.source_hash());
        if self.pipelines.contains_key(&key) {
            debug!(kernel = %kernel.name, "pipeline cache hit");
            return Ok(());
        }

        let entries: Vec<wgpu::BindGroupLayoutEntry> = kernel
            .params
            .iter()
            .map(|param| wgpu::BindGroupLayoutEntry {
                binding: param.binding,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: match param.kind {
                        ParamKind::Input { .. }
                        | ParamKind::Shape { .. }
                        | ParamKind::Strides { .. } => {
                            wgpu::BufferBindingType::Storage { read_only: true }
                        }
                        ParamKind::Ndim { .. } => wgpu::BufferBindingType::Uniform,
                        ParamKind::Output { .. } => {
                            wgpu::BufferBindingType::Storage { read_only: false }
                        }
                    },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            })
            .collect();

        let layout = self
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(&format!("{}_layout", kernel.name)),
                entries: &entries,
            });
        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(&format!("{}_pipeline_layout", kernel.name)),
                bind_group_layouts: &[&layout],
                push_constant_ranges: &[],
            });

        // Compile inside a validation error scope so a naga rejection
        // surfaces as CompileError instead of an uncaptured device error.
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&kernel.name),
                source: wgpu::ShaderSource::Wgsl(kernel.source.as_str().into()),
            });
        let pipeline = self
            .device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(&format!("{}_pipeline", kernel.name)),
                layout: Some(&pipeline_layout),
                module: &module,
                entry_point: "main",
            });
        if let Some(err) = block_on(self.device.pop_error_scope()) {
            warn!(kernel = %kernel.name, "shader compilation failed");
            return Err(CompileError {
                kernel: kernel.name.clone(),
                diagnostic: err.to_string(),
                body_line: kernel.body_line,
            }
            .into());
        }

        info!(
            kernel = %kernel.name,
            source_hash = key.1,
            "compiled compute pipeline"
        );
        self.compiled += 1;
        self.pipelines.insert(key, CachedPipeline { pipeline, layout });
        Ok(())
    }

    fn readback(&self, staging: &wgpu::Buffer) -> Result<Vec<u8>, RuntimeError> {
        let slice = staging.slice(..);
        let (sender, receiver) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |res| {
            let _ = sender.send(res);
        });
        self.device.poll(wgpu::Maintain::Wait);
        receiver
            .recv()
            .map_err(|_| RuntimeError::Device("failed to receive GPU map signal".into()))?
            .map_err(|err| RuntimeError::Device(format!("buffer map failed: {err}")))?;
        let data = slice.get_mapped_range();
        let bytes = data.to_vec();
        drop(data);
        staging.unmap();
        Ok(bytes)
    }
}

impl ComputeRuntime for WgpuRuntime {
    fn execute(
        &mut self,
        kernel: &AssembledKernel,
        inputs: &[HostArray],
        outputs: &[ArraySpec],
        geometry: &LaunchGeometry,
    ) -> Result<Vec<HostArray>, RuntimeError> {
        validate_geometry(geometry, &self.device.limits())?;
        check_bindable(kernel, inputs, outputs)?;
        self.ensure_pipeline(kernel)?;

        let key = (kernel.name.clone(), kernel.source_hash());
        let cached = self
            .pipelines
            .get(&key)
            .ok_or_else(|| RuntimeError::Device("pipeline missing after compilation".into()))?;

        // One buffer per formal parameter, in assembler order. Outputs also
        // record their buffer position for the staging copy.
        let mut buffers: Vec<wgpu::Buffer> = Vec::with_capacity(kernel.params.len());
        let mut output_buffers: Vec<(usize, usize, u64)> = Vec::new();
        for param in &kernel.params {
            let buffer = match param.kind {
                ParamKind::Input { index, .. } => {
                    self.device
                        .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                            label: Some(&param.name),
                            contents: &inputs[index].to_bytes(),
                            usage: wgpu::BufferUsages::STORAGE,
                        })
                }
                ParamKind::Shape { input } => {
                    let dims = nonempty_u32(inputs[input].shape().iter().map(|&d| d as u32));
                    self.device
                        .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                            label: Some(&param.name),
                            contents: cast_slice(&dims),
                            usage: wgpu::BufferUsages::STORAGE,
                        })
                }
                ParamKind::Strides { input } => {
                    let strides = nonempty_u32(c_strides(inputs[input].shape()).into_iter());
                    self.device
                        .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                            label: Some(&param.name),
                            contents: cast_slice(&strides),
                            usage: wgpu::BufferUsages::STORAGE,
                        })
                }
                ParamKind::Ndim { input } => {
                    let ndim = inputs[input].ndim() as u32;
                    self.device
                        .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                            label: Some(&param.name),
                            contents: cast_slice(&[ndim]),
                            usage: wgpu::BufferUsages::UNIFORM,
                        })
                }
                ParamKind::Output { index, .. } => {
                    let size = outputs[index].byte_len() as u64;
                    output_buffers.push((index, buffers.len(), size));
                    // New wgpu buffers are zero-initialized, matching the
                    // zero-filled output arrays the reference side starts
                    // from.
                    self.device.create_buffer(&wgpu::BufferDescriptor {
                        label: Some(&param.name),
                        size,
                        usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
                        mapped_at_creation: false,
                    })
                }
            };
            buffers.push(buffer);
        }

        let entries: Vec<wgpu::BindGroupEntry> = kernel
            .params
            .iter()
            .zip(&buffers)
            .map(|(param, buffer)| wgpu::BindGroupEntry {
                binding: param.binding,
                resource: buffer.as_entire_binding(),
            })
            .collect();
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("{}_bind_group", kernel.name)),
            layout: &cached.layout,
            entries: &entries,
        });

        let staging: Vec<wgpu::Buffer> = output_buffers
            .iter()
            .map(|&(index, _, size)| {
                self.device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some(&format!("{}_staging_{index}", kernel.name)),
                    size,
                    usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                })
            })
            .collect();

        let (wx, wy, wz) = geometry.workgroup_count();
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(&format!("{}_encoder", kernel.name)),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(&format!("{}_pass", kernel.name)),
                timestamp_writes: None,
            });
            pass.set_pipeline(&cached.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(wx, wy, wz);
        }
        for (staging_buffer, &(_, position, size)) in staging.iter().zip(&output_buffers) {
            encoder.copy_buffer_to_buffer(&buffers[position], 0, staging_buffer, 0, size);
        }

        self.queue.submit(Some(encoder.finish()));
        self.device.poll(wgpu::Maintain::Wait);
        info!(
            kernel = %kernel.name,
            grid = ?geometry.grid,
            threadgroup = ?geometry.threadgroup,
            workgroups = ?(wx, wy, wz),
            "dispatch complete"
        );

        let mut results: Vec<(usize, HostArray)> = Vec::with_capacity(output_buffers.len());
        for (staging_buffer, &(index, _, _)) in staging.iter().zip(&output_buffers) {
            let bytes = self.readback(staging_buffer)?;
            let spec = &outputs[index];
            let array = HostArray::from_bytes(spec.dtype, &spec.shape, &bytes)
                .map_err(|err| RuntimeError::Device(format!("readback failed: {err}")))?;
            results.push((index, array));
        }
        results.sort_by_key(|&(index, _)| index);
        Ok(results.into_iter().map(|(_, array)| array).collect())
    }
}

/// A `_shape` or `_strides` buffer for a 0-d array still needs one element;
/// wgpu rejects zero-sized bindings.
fn nonempty_u32(values: impl Iterator<Item = u32>) -> Vec<u32> {
    let collected: Vec<u32> = values.collect();
    if collected.is_empty() {
        vec![1]
    } else {
        collected
    }
}

/// The kernel's parameter indices must resolve within the arrays the caller
/// actually bound.
fn check_bindable(
    kernel: &AssembledKernel,
    inputs: &[HostArray],
    outputs: &[ArraySpec],
) -> Result<(), RuntimeError> {
    for param in &kernel.params {
        let ok = match param.kind {
            ParamKind::Input { index, .. } => index < inputs.len(),
            ParamKind::Shape { input }
            | ParamKind::Strides { input }
            | ParamKind::Ndim { input } => input < inputs.len(),
            ParamKind::Output { index, .. } => index < outputs.len() && !outputs[index].is_empty(),
        };
        if !ok {
            return Err(RuntimeError::Device(format!(
                "kernel `{}` parameter `{}` cannot be bound with {} input(s) and {} output(s)",
                kernel.name,
                param.name,
                inputs.len(),
                outputs.len()
            )));
        }
    }
    Ok(())
}
