//! Static batch definitions.
//!
//! A batch is either generated from a single input file (`encoding1..encodingN`)
//! or loaded from a TOML/JSON file holding a `jobs` array. Membership is fixed
//! once the definition is built.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::BatchError;

/// One unit of work: what to encode, where to write it, and how to call it in logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSpec {
    pub name: String,
    pub input_path: String,
    pub output_path: String,
}

impl JobSpec {
    pub fn new(
        name: impl Into<String>,
        input_path: impl Into<String>,
        output_path: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            input_path: input_path.into(),
            output_path: output_path.into(),
        }
    }
}

// File form: `output_path` is optional and defaults to the job name.
#[derive(Debug, Deserialize)]
struct RawJob {
    name: String,
    input_path: String,
    #[serde(default)]
    output_path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawBatch {
    jobs: Vec<RawJob>,
}

/// Validated, ordered list of job specs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchDefinition {
    jobs: Vec<JobSpec>,
}

impl BatchDefinition {
    pub fn new(jobs: Vec<JobSpec>) -> Result<Self, BatchError> {
        if jobs.is_empty() {
            return Err(BatchError::InvalidBatch("the batch contains no jobs".into()));
        }

        let mut seen = HashSet::new();
        for job in &jobs {
            if job.name.trim().is_empty() {
                return Err(BatchError::InvalidBatch("job names must not be blank".into()));
            }
            if job.input_path.trim().is_empty() {
                return Err(BatchError::InvalidBatch(format!(
                    "job '{}' has no input path",
                    job.name
                )));
            }
            if !seen.insert(job.name.as_str()) {
                return Err(BatchError::InvalidBatch(format!(
                    "duplicate job name '{}'",
                    job.name
                )));
            }
        }

        Ok(Self { jobs })
    }

    /// `count` jobs named `encoding1..encodingN`, all reading `input_path`.
    pub fn generate(input_path: &str, count: usize) -> Result<Self, BatchError> {
        let jobs = (1..=count)
            .map(|i| {
                let name = format!("encoding{i}");
                JobSpec::new(name.clone(), input_path, name)
            })
            .collect();
        Self::new(jobs)
    }

    /// Load a definition from a `.toml` or `.json` file.
    pub fn load(path: &Path) -> Result<Self, BatchError> {
        let contents = std::fs::read_to_string(path)?;
        let raw: RawBatch = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&contents)?,
            Some("toml") => toml::from_str(&contents)?,
            _ => {
                return Err(BatchError::InvalidBatch(format!(
                    "unsupported batch file '{}': expected a .toml or .json extension",
                    path.display()
                )));
            }
        };

        let jobs = raw
            .jobs
            .into_iter()
            .map(|raw| {
                let output_path = raw.output_path.unwrap_or_else(|| raw.name.clone());
                JobSpec {
                    name: raw.name,
                    input_path: raw.input_path,
                    output_path,
                }
            })
            .collect();
        Self::new(jobs)
    }

    pub fn jobs(&self) -> &[JobSpec] {
        &self.jobs
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn into_jobs(self) -> Vec<JobSpec> {
        self.jobs
    }
}
