//! Pluggable analysis pipelines and coordinate transforms.
//!
//! Pipelines and transforms are chosen by name at runtime from registries.
//! Loading validates the parameter arity up front; a failed load leaves the
//! previously loaded selection untouched.

use std::any::Any;
use std::collections::BTreeMap;

use etscan_core::{BinaryMask, Frame};
use nalgebra::Point2;

use etscan_calib::TransformCoeffs;

/// Opaque pipeline-carried state, threaded through successive calls.
///
/// The runner never inspects the contents; a pipeline downcasts to its own
/// type.
pub type ExtraInfo = Box<dyn Any + Send>;

/// Everything a pipeline invocation receives.
pub struct PipelineInput<'a> {
    pub frame: &'a Frame,
    /// Most recently settled frame; updated only on non-event cycles.
    pub background: Option<&'a Frame>,
    pub mask: Option<&'a BinaryMask>,
    /// True in the test run modes; pipelines should return a preview image.
    pub test_mode: bool,
    /// Carried-forward state from the previous invocation.
    pub exinfo: Option<ExtraInfo>,
    /// Ordered parameter values, positionally matching the pipeline spec.
    pub params: &'a [f64],
}

/// Pipeline result for one frame.
pub struct PipelineOutput {
    /// Detected coordinates in fast-imaging units; empty means no event.
    pub coords: Vec<Point2<f64>>,
    /// Updated carried state for the next invocation.
    pub exinfo: Option<ExtraInfo>,
    /// Annotated preview image; expected in test modes only.
    pub preview: Option<Frame>,
}

impl PipelineOutput {
    /// The representative detection: always the first reported coordinate,
    /// no ranking applied.
    pub fn representative(&self) -> Option<Point2<f64>> {
        self.coords.first().copied()
    }
}

/// Analysis pipeline entry point.
pub type PipelineFn = fn(PipelineInput<'_>) -> PipelineOutput;

/// Pure coordinate transform entry point.
pub type TransformFn = fn(Point2<f64>, &TransformCoeffs) -> Point2<f64>;

/// One named numeric parameter with its default.
#[derive(Clone, Debug, PartialEq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub default: f64,
}

/// Declared interface of a registered pipeline.
#[derive(Clone, Debug, PartialEq)]
pub struct PipelineSpec {
    pub name: &'static str,
    pub params: Vec<ParamSpec>,
}

impl PipelineSpec {
    pub fn defaults(&self) -> Vec<f64> {
        self.params.iter().map(|p| p.default).collect()
    }
}

#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error("unknown pipeline {0:?}")]
    UnknownPipeline(String),

    #[error("unknown transform {0:?}")]
    UnknownTransform(String),

    #[error("pipeline {name:?} already registered")]
    Duplicate { name: String },

    #[error("pipeline {name:?} expects {expected} parameter values, got {got}")]
    ParamArity {
        name: String,
        expected: usize,
        got: usize,
    },

    #[error("malformed value {text:?} for parameter {name:?}")]
    BadParamValue { name: String, text: String },
}

/// A pipeline bound to concrete parameter values, ready to run.
#[derive(Clone)]
pub struct LoadedPipeline {
    pub spec: PipelineSpec,
    pub func: PipelineFn,
    pub param_values: Vec<f64>,
}

/// String id to pipeline mapping.
pub struct PipelineRegistry {
    entries: BTreeMap<&'static str, (PipelineSpec, PipelineFn)>,
}

impl Default for PipelineRegistry {
    fn default() -> Self {
        let mut registry = Self {
            entries: BTreeMap::new(),
        };
        let (spec, func) = crate::pipelines::intensity_peaks_entry();
        registry.entries.insert(spec.name, (spec, func));
        registry
    }
}

impl PipelineRegistry {
    /// Registry without the built-in entries.
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    pub fn register(&mut self, spec: PipelineSpec, func: PipelineFn) -> Result<(), LoadError> {
        if self.entries.contains_key(spec.name) {
            return Err(LoadError::Duplicate {
                name: spec.name.to_owned(),
            });
        }
        self.entries.insert(spec.name, (spec, func));
        Ok(())
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.keys().copied()
    }

    pub fn spec(&self, name: &str) -> Option<&PipelineSpec> {
        self.entries.get(name).map(|(spec, _)| spec)
    }

    /// Bind a pipeline to parameter values, validating arity.
    pub fn load(&self, name: &str, param_values: &[f64]) -> Result<LoadedPipeline, LoadError> {
        let (spec, func) = self
            .entries
            .get(name)
            .ok_or_else(|| LoadError::UnknownPipeline(name.to_owned()))?;
        if param_values.len() != spec.params.len() {
            return Err(LoadError::ParamArity {
                name: name.to_owned(),
                expected: spec.params.len(),
                got: param_values.len(),
            });
        }
        Ok(LoadedPipeline {
            spec: spec.clone(),
            func: *func,
            param_values: param_values.to_vec(),
        })
    }

    /// Parse operator-entered parameter text against a pipeline's spec.
    ///
    /// Malformed numerics fail fast; nothing is silently defaulted.
    pub fn parse_param_values(&self, name: &str, texts: &[&str]) -> Result<Vec<f64>, LoadError> {
        let spec = self
            .spec(name)
            .ok_or_else(|| LoadError::UnknownPipeline(name.to_owned()))?;
        if texts.len() != spec.params.len() {
            return Err(LoadError::ParamArity {
                name: name.to_owned(),
                expected: spec.params.len(),
                got: texts.len(),
            });
        }
        spec.params
            .iter()
            .zip(texts)
            .map(|(param, text)| {
                text.trim()
                    .parse::<f64>()
                    .map_err(|_| LoadError::BadParamValue {
                        name: param.name.to_owned(),
                        text: (*text).to_owned(),
                    })
            })
            .collect()
    }
}

/// String id to transform mapping.
pub struct TransformRegistry {
    entries: BTreeMap<&'static str, TransformFn>,
}

/// Name of the built-in cubic polynomial transform.
pub const POLY_CUBIC: &str = "poly_cubic";

pub(crate) fn poly_cubic(p: Point2<f64>, coeffs: &TransformCoeffs) -> Point2<f64> {
    coeffs.apply(p)
}

impl Default for TransformRegistry {
    fn default() -> Self {
        let mut entries: BTreeMap<&'static str, TransformFn> = BTreeMap::new();
        entries.insert(POLY_CUBIC, poly_cubic);
        Self { entries }
    }
}

impl TransformRegistry {
    pub fn register(&mut self, name: &'static str, func: TransformFn) -> Result<(), LoadError> {
        if self.entries.contains_key(name) {
            return Err(LoadError::Duplicate {
                name: name.to_owned(),
            });
        }
        self.entries.insert(name, func);
        Ok(())
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.keys().copied()
    }

    pub fn load(&self, name: &str) -> Result<TransformFn, LoadError> {
        self.entries
            .get(name)
            .copied()
            .ok_or_else(|| LoadError::UnknownTransform(name.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(input: PipelineInput<'_>) -> PipelineOutput {
        PipelineOutput {
            coords: Vec::new(),
            exinfo: input.exinfo,
            preview: None,
        }
    }

    fn two_param_spec() -> PipelineSpec {
        PipelineSpec {
            name: "noop",
            params: vec![
                ParamSpec {
                    name: "threshold",
                    default: 1.0,
                },
                ParamSpec {
                    name: "gain",
                    default: 0.5,
                },
            ],
        }
    }

    #[test]
    fn load_validates_arity() {
        let mut registry = PipelineRegistry::empty();
        registry.register(two_param_spec(), noop).unwrap();
        assert!(registry.load("noop", &[1.0, 2.0]).is_ok());
        assert!(matches!(
            registry.load("noop", &[1.0]),
            Err(LoadError::ParamArity {
                expected: 2,
                got: 1,
                ..
            })
        ));
        assert!(matches!(
            registry.load("missing", &[]),
            Err(LoadError::UnknownPipeline(_))
        ));
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = PipelineRegistry::empty();
        registry.register(two_param_spec(), noop).unwrap();
        assert!(matches!(
            registry.register(two_param_spec(), noop),
            Err(LoadError::Duplicate { .. })
        ));
    }

    #[test]
    fn param_text_parses_or_fails_fast() {
        let mut registry = PipelineRegistry::empty();
        registry.register(two_param_spec(), noop).unwrap();
        let values = registry
            .parse_param_values("noop", &[" 2.5", "7"])
            .unwrap();
        assert_eq!(values, vec![2.5, 7.0]);
        assert!(matches!(
            registry.parse_param_values("noop", &["2.5", "abc"]),
            Err(LoadError::BadParamValue { .. })
        ));
    }

    #[test]
    fn builtin_transform_is_the_cubic() {
        let registry = TransformRegistry::default();
        let transform = registry.load(POLY_CUBIC).unwrap();
        let p = Point2::new(4.0, -2.0);
        let q = transform(p, &TransformCoeffs::unit());
        assert_eq!(q, p);
        assert!(matches!(
            registry.load("missing"),
            Err(LoadError::UnknownTransform(_))
        ));
    }

    #[test]
    fn representative_is_the_first_detection() {
        let out = PipelineOutput {
            coords: vec![Point2::new(1.0, 2.0), Point2::new(9.0, 9.0)],
            exinfo: None,
            preview: None,
        };
        assert_eq!(out.representative(), Some(Point2::new(1.0, 2.0)));
    }
}
