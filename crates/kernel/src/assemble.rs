//! WGSL assembly: a [`KernelSpec`] plus bound-array metadata becomes one
//! complete compute shader and an ordered parameter list.
//!
//! Parameter order is fixed: each input buffer, immediately followed by its
//! referenced derived parameters (shape, strides, ndim), then each output
//! buffer. Binding indices follow that order, so the backend can bind
//! buffers positionally.
//!
//! The entry point exposes the thread-indexing builtins under their
//! Metal-style names (`thread_position_in_grid` and friends), which is the
//! vocabulary puzzle bodies are written against.

use crate::array::{ArraySpec, Dtype};
use crate::scan::{scan_derived, DerivedKind};
use crate::spec::{AssemblyError, KernelSpec};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// What a formal parameter binds to at dispatch time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// Read-only storage buffer holding input `index`'s elements.
    Input { index: usize, dtype: Dtype },
    /// Read-only `array<u32>` of input `input`'s per-dimension extents.
    Shape { input: usize },
    /// Read-only `array<u32>` of input `input`'s element strides.
    Strides { input: usize },
    /// Uniform `u32` rank of input `input`.
    Ndim { input: usize },
    /// Read-write storage buffer for output `index`.
    Output { index: usize, dtype: Dtype },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelParam {
    pub name: String,
    pub binding: u32,
    pub kind: ParamKind,
}

/// A fully assembled kernel: compilable WGSL plus everything the backend
/// needs to bind and launch it.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledKernel {
    pub name: String,
    pub source: String,
    pub params: Vec<KernelParam>,
    pub workgroup_size: (u32, u32, u32),
    /// 1-based line of `source` at which the author's body begins. Compile
    /// diagnostics carry this so learners can map native line numbers back
    /// to their own code.
    pub body_line: usize,
}

impl AssembledKernel {
    /// Content hash of the assembled source. Together with `name` this is
    /// the pipeline-cache key: assembly is deterministic, so equal inputs
    /// hash equal, and a name reused with different source hashes apart.
    pub fn source_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.source.hash(&mut hasher);
        hasher.finish()
    }

    pub fn param_names(&self) -> Vec<&str> {
        self.params.iter().map(|p| p.name.as_str()).collect()
    }
}

/// Assemble `spec` against the arrays that will be bound at dispatch time.
///
/// Pure and deterministic: the same spec, array dtypes/ranks, and
/// thread-group extent always produce byte-identical source.
pub fn assemble(
    spec: &KernelSpec,
    inputs: &[ArraySpec],
    outputs: &[ArraySpec],
    threadgroup: (u32, u32, u32),
) -> Result<AssembledKernel, AssemblyError> {
    spec.validate()?;
    if inputs.len() != spec.input_names.len() {
        return Err(AssemblyError::ArityMismatch {
            kernel: spec.name.clone(),
            role: "input",
            declared: spec.input_names.len(),
            bound: inputs.len(),
        });
    }
    if outputs.len() != spec.output_names.len() {
        return Err(AssemblyError::ArityMismatch {
            kernel: spec.name.clone(),
            role: "output",
            declared: spec.output_names.len(),
            bound: outputs.len(),
        });
    }

    let derived = scan_derived(spec)?;

    let mut params: Vec<KernelParam> = Vec::new();
    for (index, name) in spec.input_names.iter().enumerate() {
        params.push(KernelParam {
            name: name.clone(),
            binding: params.len() as u32,
            kind: ParamKind::Input {
                index,
                dtype: inputs[index].dtype,
            },
        });
        for kind in DerivedKind::ALL {
            if derived.contains(&(index, kind)) {
                params.push(KernelParam {
                    name: kind.param_name(name),
                    binding: params.len() as u32,
                    kind: match kind {
                        DerivedKind::Shape => ParamKind::Shape { input: index },
                        DerivedKind::Strides => ParamKind::Strides { input: index },
                        DerivedKind::Ndim => ParamKind::Ndim { input: index },
                    },
                });
            }
        }
    }
    for (index, name) in spec.output_names.iter().enumerate() {
        params.push(KernelParam {
            name: name.clone(),
            binding: params.len() as u32,
            kind: ParamKind::Output {
                index,
                dtype: outputs[index].dtype,
            },
        });
    }

    let (source, body_line) = render(spec, &params, threadgroup);

    Ok(AssembledKernel {
        name: spec.name.clone(),
        source,
        params,
        workgroup_size: threadgroup,
        body_line,
    })
}

fn render(
    spec: &KernelSpec,
    params: &[KernelParam],
    threadgroup: (u32, u32, u32),
) -> (String, usize) {
    let mut src = String::new();

    for param in params {
        let decl = match param.kind {
            ParamKind::Input { dtype, .. } => format!(
                "var<storage, read> {}: array<{}>;",
                param.name,
                dtype.wgsl_name()
            ),
            ParamKind::Shape { .. } | ParamKind::Strides { .. } => {
                format!("var<storage, read> {}: array<u32>;", param.name)
            }
            ParamKind::Ndim { .. } => format!("var<uniform> {}: u32;", param.name),
            ParamKind::Output { dtype, .. } => format!(
                "var<storage, read_write> {}: array<{}>;",
                param.name,
                dtype.wgsl_name()
            ),
        };
        src.push_str(&format!(
            "@group(0) @binding({}) {}\n",
            param.binding, decl
        ));
    }

    if !spec.header.trim().is_empty() {
        src.push('\n');
        for line in dedent(&spec.header) {
            src.push_str(&line);
            src.push('\n');
        }
    }

    let (tx, ty, tz) = threadgroup;
    src.push('\n');
    src.push_str(&format!("@compute @workgroup_size({tx}, {ty}, {tz})\n"));
    src.push_str("fn main(\n");
    src.push_str("    @builtin(global_invocation_id) thread_position_in_grid: vec3<u32>,\n");
    src.push_str("    @builtin(workgroup_id) threadgroup_position_in_grid: vec3<u32>,\n");
    src.push_str("    @builtin(local_invocation_id) thread_position_in_threadgroup: vec3<u32>,\n");
    src.push_str(") {\n");
    src.push_str(&format!(
        "    let threads_per_threadgroup = vec3<u32>({tx}u, {ty}u, {tz}u);\n"
    ));
    let body_line = src.lines().count() + 1;
    for line in dedent(&spec.source) {
        if line.is_empty() {
            src.push('\n');
        } else {
            src.push_str("    ");
            src.push_str(&line);
            src.push('\n');
        }
    }
    src.push_str("}\n");
    (src, body_line)
}

/// Strip the common leading indentation of a block of author-supplied text,
/// preserving relative indentation, and drop blank leading/trailing lines.
fn dedent(text: &str) -> Vec<String> {
    let lines: Vec<&str> = text.lines().collect();
    let margin = lines
        .iter()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start().len())
        .min()
        .unwrap_or(0);

    let mut out: Vec<String> = lines
        .iter()
        .map(|line| {
            if line.trim().is_empty() {
                String::new()
            } else {
                line[margin..].trim_end().to_string()
            }
        })
        .collect();
    while out.first().is_some_and(|l| l.is_empty()) {
        out.remove(0);
    }
    while out.last().is_some_and(|l| l.is_empty()) {
        out.pop();
    }
    out
}
