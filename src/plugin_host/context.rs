//! Evaluation context
//!
//! Carries the time, optional region of interest and named context variables
//! for one evaluation. The `image:defaultFormat` variable overrides the
//! host's default format for everything evaluated under that context.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::types::{Format, Rect};

/// Context variable that overrides the default format
pub const DEFAULT_FORMAT_VARIABLE: &str = "image:defaultFormat";

/// A typed context variable
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ContextValue {
    Int(i64),
    Double(f64),
    String(String),
    Format(Format),
}

/// Evaluation context for geometry queries and renders
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvaluationContext {
    /// Frame time
    pub time: f64,
    /// Region to compute; `None` means the whole project
    pub region: Option<Rect>,
    variables: BTreeMap<String, ContextValue>,
}

impl Default for EvaluationContext {
    fn default() -> Self {
        Self::at_time(0.0)
    }
}

impl EvaluationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn at_time(time: f64) -> Self {
        Self {
            time,
            region: None,
            variables: BTreeMap::new(),
        }
    }

    pub fn with_region(mut self, region: Rect) -> Self {
        self.region = Some(region);
        self
    }

    pub fn with_variable(mut self, name: &str, value: ContextValue) -> Self {
        self.set(name, value);
        self
    }

    /// Convenience for the default-format override
    pub fn with_default_format(self, format: Format) -> Self {
        self.with_variable(DEFAULT_FORMAT_VARIABLE, ContextValue::Format(format))
    }

    pub fn set(&mut self, name: &str, value: ContextValue) {
        self.variables.insert(name.to_string(), value);
    }

    pub fn remove(&mut self, name: &str) -> Option<ContextValue> {
        self.variables.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&ContextValue> {
        self.variables.get(name)
    }

    /// The default-format override, if set to a format value
    pub fn default_format(&self) -> Option<Format> {
        match self.get(DEFAULT_FORMAT_VARIABLE) {
            Some(ContextValue::Format(format)) => Some(*format),
            _ => None,
        }
    }
}
