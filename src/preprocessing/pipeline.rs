use super::operation::Operation;
use super::steps::border::BorderMode;
use crate::error::CaptchaError;
use crate::raster::RasterBuffer;
use serde::Serialize;
use serde_json::{Map, Value};
use std::time::Instant;

/// A validated operation together with how it was written in the configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineStep {
    label: String,
    parameters: String,
    operation: Operation,
}

impl PipelineStep {
    pub fn new(operation: Operation) -> Self {
        Self {
            label: operation.name().to_string(),
            parameters: format!("{:?}", operation),
            operation,
        }
    }

    /// Parse one `"name": [params...]` entry of a `functions` list.
    pub fn from_config(label: &str, params: &Value) -> Result<Self, CaptchaError> {
        let values: &[Value] = match params {
            Value::Array(values) => values,
            Value::Null => &[],
            other => {
                return Err(CaptchaError::invalid_operation(
                    label,
                    other.to_string(),
                    "parameters must be a list",
                ))
            }
        };

        let operation = Operation::parse(label, values)
            .map_err(|cause| CaptchaError::invalid_operation(label, params.to_string(), cause))?;

        Ok(Self {
            label: label.to_string(),
            parameters: params.to_string(),
            operation,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn operation(&self) -> &Operation {
        &self.operation
    }
}

/// Timing information for a single pipeline step
#[derive(Debug, Clone, Serialize)]
pub struct StepTiming {
    pub name: String,
    pub time_ms: u64,
}

/// Result of running a pipeline including timing stats
#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    /// Processed buffer (not serialized)
    #[serde(skip)]
    pub buffer: RasterBuffer,
    /// Total processing time in milliseconds
    pub total_time_ms: u64,
    /// Individual step timings
    pub steps: Vec<StepTiming>,
}

/// Ordered list of raster operations applied to one buffer at a time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pipeline {
    steps: Vec<PipelineStep>,
}

impl Pipeline {
    pub fn new(steps: Vec<PipelineStep>) -> Self {
        Self { steps }
    }

    pub fn from_operations(operations: impl IntoIterator<Item = Operation>) -> Self {
        Self::new(operations.into_iter().map(PipelineStep::new).collect())
    }

    /// Build from a style's `functions` list: single-key objects applied in
    /// list order (keys within one object in file order).
    pub fn from_config(functions: &[Map<String, Value>]) -> Result<Self, CaptchaError> {
        let mut steps = Vec::new();
        for function in functions {
            for (label, params) in function {
                steps.push(PipelineStep::from_config(label, params)?);
            }
        }
        Ok(Self::new(steps))
    }

    /// Clean-up applied to an already cleaned image before contour analysis:
    /// binarise everything non-black, add a margin so glyphs never touch the
    /// edge, and fill enclosed holes.
    pub fn pre_segmentation() -> Self {
        Self::from_operations([
            Operation::Grey,
            Operation::Threshold {
                level: 0,
                inverted: false,
            },
            Operation::Border {
                vertical: 4,
                horizontal: 4,
                mode: BorderMode::Constant([0, 0, 0]),
            },
            Operation::FillHoles,
        ])
    }

    pub fn steps(&self) -> &[PipelineStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Run every step in order. A failing step aborts the run; steps
    /// already applied are not undone.
    pub fn process(&self, buffer: RasterBuffer) -> Result<PipelineResult, CaptchaError> {
        let start = Instant::now();
        let mut steps_timing = Vec::with_capacity(self.steps.len());

        let mut buffer = buffer;
        for step in &self.steps {
            buffer = self.run_step(step, buffer, &mut steps_timing)?;
        }

        let result = PipelineResult {
            buffer,
            total_time_ms: start.elapsed().as_millis() as u64,
            steps: steps_timing,
        };

        tracing::debug!(
            steps = result.steps.len(),
            total_time_ms = result.total_time_ms,
            "Pipeline finished"
        );

        Ok(result)
    }

    /// Like [`Pipeline::process`] without the timing report.
    pub fn run(&self, buffer: RasterBuffer) -> Result<RasterBuffer, CaptchaError> {
        self.process(buffer).map(|result| result.buffer)
    }

    fn run_step(
        &self,
        step: &PipelineStep,
        buffer: RasterBuffer,
        timings: &mut Vec<StepTiming>,
    ) -> Result<RasterBuffer, CaptchaError> {
        let step_start = Instant::now();
        let result = step.operation.apply(buffer).map_err(|cause| {
            CaptchaError::invalid_operation(&step.label, &step.parameters, cause)
        })?;
        timings.push(StepTiming {
            name: step.label.clone(),
            time_ms: step_start.elapsed().as_millis() as u64,
        });
        Ok(result)
    }
}
