use glob::Pattern;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::engine::invocation::StepDefinition;
use crate::utils::{
    config::{CorpusSection, StepDefaults},
    error::{GateError, GateResult, MatrixError},
};

/// Matrix shipped with the binary, mirroring the upstream CI workflow
pub const BUILTIN_MATRIX: &str = include_str!("../../matrices/multiqc.toml");

/// Ordered list of invocations plus the corpus they run against
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct InvocationMatrix {
    #[serde(default)]
    pub corpus: CorpusSection,
    #[serde(default)]
    pub defaults: StepDefaults,
    #[serde(default, rename = "step")]
    pub steps: Vec<StepDefinition>,
}

impl InvocationMatrix {
    /// Parse and validate a matrix from TOML text
    pub fn from_toml_str(content: &str) -> GateResult<Self> {
        let matrix: InvocationMatrix =
            toml::from_str(content).map_err(|e| MatrixError::Parse(e.to_string()))?;
        matrix.validate()?;
        Ok(matrix)
    }

    /// Read a matrix file from disk
    pub fn load(path: &Path) -> GateResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| MatrixError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml_str(&content)
    }

    /// The matrix embedded in the binary
    pub fn builtin() -> GateResult<Self> {
        Self::from_toml_str(BUILTIN_MATRIX)
    }

    /// Check step names and per-step fields
    pub fn validate(&self) -> Result<(), MatrixError> {
        if self.steps.is_empty() {
            return Err(MatrixError::Validation("matrix defines no steps".to_string()));
        }

        let mut seen = HashSet::new();
        for step in &self.steps {
            step.validate()?;
            if !seen.insert(step.name.as_str()) {
                return Err(MatrixError::Validation(format!("duplicate step name '{}'", step.name)));
            }
        }
        Ok(())
    }

    /// Steps matching the `only` globs and none of the `skip` globs, in matrix order
    pub fn select(&self, only: &[String], skip: &[String]) -> GateResult<Vec<&StepDefinition>> {
        let only = compile_patterns(only)?;
        let skip = compile_patterns(skip)?;

        let selected: Vec<&StepDefinition> = self
            .steps
            .iter()
            .filter(|step| only.is_empty() || only.iter().any(|p| p.matches(&step.name)))
            .filter(|step| !skip.iter().any(|p| p.matches(&step.name)))
            .collect();

        if !only.is_empty() && selected.is_empty() {
            return Err(MatrixError::NoStepsSelected.into());
        }
        Ok(selected)
    }
}

fn compile_patterns(patterns: &[String]) -> GateResult<Vec<Pattern>> {
    patterns
        .iter()
        .map(|p| {
            Pattern::new(p).map_err(|e| {
                GateError::from(MatrixError::Validation(format!("invalid step filter '{}': {}", p, e)))
            })
        })
        .collect()
}
