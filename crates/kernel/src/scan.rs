//! Static scan of kernel text for derived `_shape` / `_strides` / `_ndim`
//! parameter references.
//!
//! The scan is a word-boundary token search over `header` + `source`. It is
//! deliberately a separate step from code generation so that the error
//! conditions (a derived reference whose base is not a declared input) are
//! unit-testable on their own.

use crate::spec::{AssemblyError, KernelSpec};
use regex::Regex;

/// The three auto-derived metadata parameters an input can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DerivedKind {
    Shape,
    Strides,
    Ndim,
}

impl DerivedKind {
    /// Stable emission order: shape, then strides, then ndim.
    pub const ALL: [DerivedKind; 3] = [DerivedKind::Shape, DerivedKind::Strides, DerivedKind::Ndim];

    pub fn suffix(&self) -> &'static str {
        match self {
            DerivedKind::Shape => "shape",
            DerivedKind::Strides => "strides",
            DerivedKind::Ndim => "ndim",
        }
    }

    pub fn param_name(&self, base: &str) -> String {
        format!("{base}_{}", self.suffix())
    }
}

/// Find every derived-parameter reference in the kernel text.
///
/// Returns `(input_index, kind)` pairs, deduplicated and ordered by input
/// declaration order then [`DerivedKind::ALL`] order. Any token of the form
/// `<ident>_shape|_strides|_ndim` whose base is not a declared input is an
/// error.
pub fn scan_derived(spec: &KernelSpec) -> Result<Vec<(usize, DerivedKind)>, AssemblyError> {
    let pattern = Regex::new(r"\b([A-Za-z_][A-Za-z0-9_]*)_(shape|strides|ndim)\b")
        .expect("derived-reference pattern is valid");
    let text = format!("{}\n{}", spec.header, spec.source);

    let mut referenced: Vec<(usize, DerivedKind)> = Vec::new();
    for caps in pattern.captures_iter(&text) {
        let base = &caps[1];
        let kind = match &caps[2] {
            "shape" => DerivedKind::Shape,
            "strides" => DerivedKind::Strides,
            _ => DerivedKind::Ndim,
        };
        let index = spec
            .input_names
            .iter()
            .position(|name| name == base)
            .ok_or_else(|| AssemblyError::UnknownDerivedBase {
                reference: caps[0].to_string(),
                base: base.to_string(),
            })?;
        if !referenced.contains(&(index, kind)) {
            referenced.push((index, kind));
        }
    }

    referenced.sort_by_key(|&(index, kind)| (index, kind));
    Ok(referenced)
}
