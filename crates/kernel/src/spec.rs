//! Kernel descriptions as supplied by puzzle content.

use thiserror::Error;

/// Errors raised while turning a [`KernelSpec`] into a compilable shader.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AssemblyError {
    #[error("`{0}` is not a valid parameter identifier")]
    InvalidIdentifier(String),
    #[error("`{0}` is declared more than once")]
    DuplicateName(String),
    #[error("`{0}` appears in both input_names and output_names")]
    InputOutputOverlap(String),
    #[error("kernel `{kernel}` declares no outputs")]
    NoOutputs { kernel: String },
    #[error("derived parameter `{reference}` refers to `{base}`, which is not an input")]
    UnknownDerivedBase { reference: String, base: String },
    #[error("kernel `{kernel}` declares {declared} {role} name(s) but {bound} array(s) were bound")]
    ArityMismatch {
        kernel: String,
        role: &'static str,
        declared: usize,
        bound: usize,
    },
}

/// Immutable description of a kernel to compile: a body, an optional
/// module-scope header, and the named arrays the body reads and writes.
///
/// The body may also reference, for any input `x`, the derived parameters
/// `x_shape`, `x_strides`, and `x_ndim`; the assembler supplies those
/// automatically when (and only when) the text mentions them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelSpec {
    pub name: String,
    pub input_names: Vec<String>,
    pub output_names: Vec<String>,
    pub header: String,
    pub source: String,
}

impl KernelSpec {
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            input_names: Vec::new(),
            output_names: Vec::new(),
            header: String::new(),
            source: source.into(),
        }
    }

    pub fn with_inputs<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.input_names = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_outputs<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_names = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_header(mut self, header: impl Into<String>) -> Self {
        self.header = header.into();
        self
    }

    /// Structural checks that do not depend on bound arrays: identifier
    /// validity, uniqueness within each set, and disjointness across sets.
    pub fn validate(&self) -> Result<(), AssemblyError> {
        if !is_identifier(&self.name) {
            return Err(AssemblyError::InvalidIdentifier(self.name.clone()));
        }
        if self.output_names.is_empty() {
            return Err(AssemblyError::NoOutputs {
                kernel: self.name.clone(),
            });
        }
        let mut seen: Vec<&str> = Vec::new();
        for name in self.input_names.iter().chain(&self.output_names) {
            if !is_identifier(name) {
                return Err(AssemblyError::InvalidIdentifier(name.clone()));
            }
            if seen.contains(&name.as_str()) {
                if self.input_names.iter().any(|n| n == name)
                    && self.output_names.iter().any(|n| n == name)
                {
                    return Err(AssemblyError::InputOutputOverlap(name.clone()));
                }
                return Err(AssemblyError::DuplicateName(name.clone()));
            }
            seen.push(name);
        }
        Ok(())
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
