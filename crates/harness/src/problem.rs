//! A problem binds a kernel spec to concrete inputs, a launch geometry, and
//! a host reference function, and can check itself against a runtime.

use crate::trace;
use crate::verify::{compare, CheckReport, Tolerance, VerificationError};
use puzzleforge_backend_gpu::{ComputeRuntime, RuntimeError};
use puzzleforge_kernel::{
    assemble, ArraySpec, AssembledKernel, AssemblyError, HostArray, KernelSpec, LaunchGeometry,
};
use std::fmt::Write;
use thiserror::Error;
use tracing::info;

pub type Reference = Box<dyn Fn(&[HostArray]) -> HostArray>;

#[derive(Debug, Error)]
pub enum CheckError {
    #[error(transparent)]
    Assembly(#[from] AssemblyError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error(transparent)]
    Verification(#[from] VerificationError),
}

pub struct Problem {
    name: String,
    kernel: KernelSpec,
    inputs: Vec<HostArray>,
    output: ArraySpec,
    geometry: LaunchGeometry,
    reference: Reference,
    tolerance: Tolerance,
}

impl Problem {
    pub fn new(
        name: impl Into<String>,
        kernel: KernelSpec,
        inputs: Vec<HostArray>,
        output: ArraySpec,
        geometry: LaunchGeometry,
        reference: Reference,
    ) -> Self {
        Self {
            name: name.into(),
            kernel,
            inputs,
            output,
            geometry,
            reference,
            tolerance: Tolerance::default(),
        }
    }

    pub fn with_tolerance(mut self, tolerance: Tolerance) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn geometry(&self) -> &LaunchGeometry {
        &self.geometry
    }

    /// Assembles the kernel against this problem's input and output specs.
    /// Deterministic: the same problem always yields the same source.
    pub fn assemble(&self) -> Result<AssembledKernel, AssemblyError> {
        let input_specs: Vec<ArraySpec> = self.inputs.iter().map(HostArray::spec).collect();
        assemble(
            &self.kernel,
            &input_specs,
            std::slice::from_ref(&self.output),
            self.geometry.threadgroup,
        )
    }

    /// Assembled source, parameter list, and launch layout, without touching
    /// any device. Inspecting a problem never mutates it.
    pub fn show(&self) -> Result<String, AssemblyError> {
        let kernel = self.assemble()?;
        let mut out = String::new();
        let _ = writeln!(out, "problem: {}", self.name);
        let _ = writeln!(out, "params:  {}", kernel.param_names().join(", "));
        let _ = writeln!(
            out,
            "grid:    {:?}  threadgroup: {:?}",
            self.geometry.grid, self.geometry.threadgroup
        );
        let _ = writeln!(out);
        out.push_str(&trace::render_source(&kernel));
        let _ = writeln!(out);
        out.push_str(&trace::thread_map(&self.geometry));
        Ok(out)
    }

    /// Runs the kernel on `runtime` and compares its output against the
    /// reference function applied to the same inputs.
    pub fn check(&self, runtime: &mut dyn ComputeRuntime) -> Result<CheckReport, CheckError> {
        let kernel = self.assemble()?;
        info!(problem = %self.name, params = ?kernel.param_names(), "checking");

        let mut results = runtime.execute(
            &kernel,
            &self.inputs,
            std::slice::from_ref(&self.output),
            &self.geometry,
        )?;
        let actual = results
            .pop()
            .ok_or_else(|| RuntimeError::Device("runtime returned no output arrays".into()))?;
        let expected = (self.reference)(&self.inputs);
        let report = compare(&self.name, &expected, &actual, &self.tolerance)?;
        info!(
            problem = %self.name,
            max_abs_error = report.max_abs_error,
            "check passed"
        );
        Ok(report)
    }
}
