use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::core::error::{ExecutionError, Result};
use crate::core::value::Params;

/// A single input or output of an execution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub description: String,
    /// Only meaningful for inputs.
    pub optional: bool,
}

impl Field {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            optional: false,
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

/// The declared inputs and outputs of an execution type.
///
/// Outputs listed here (plus `progress`, `error` and `result`) are the only
/// keys the execution may publish.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecutionSchema {
    pub inputs: Vec<Field>,
    pub outputs: Vec<Field>,
}

impl ExecutionSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a required input.
    pub fn input(mut self, name: impl Into<String>, description: impl Into<String>) -> Self {
        self.inputs.push(Field::new(name, description));
        self
    }

    pub fn optional_input(
        mut self,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        self.inputs.push(Field::new(name, description).optional());
        self
    }

    pub fn output(mut self, name: impl Into<String>, description: impl Into<String>) -> Self {
        self.outputs.push(Field::new(name, description));
        self
    }

    pub fn output_keys(&self) -> impl Iterator<Item = &str> {
        self.outputs.iter().map(|f| f.name.as_str())
    }

    /// Checks that every required input is present.
    pub fn validate_params(&self, params: &Params) -> Result<()> {
        for field in self.inputs.iter().filter(|f| !f.optional) {
            if !params.contains(&field.name) {
                return Err(ExecutionError::invalid_input(
                    &field.name,
                    "missing required input",
                ));
            }
        }
        Ok(())
    }
}

impl FromStr for ExecutionSchema {
    type Err = String;

    /// Parses shorthand syntax: "length, interval? -> cursor". A trailing `?`
    /// marks an input as optional.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split("->").collect();
        if parts.len() != 2 {
            return Err("Schema must contain exactly one '->'".to_string());
        }

        let parse_fields = |part: &str| {
            part.split(',')
                .map(|f| f.trim())
                .filter(|f| !f.is_empty())
                .map(|f| match f.strip_suffix('?') {
                    Some(name) => Field::new(name.trim(), "").optional(),
                    None => Field::new(f, ""),
                })
                .collect::<Vec<Field>>()
        };

        Ok(ExecutionSchema {
            inputs: parse_fields(parts[0]),
            outputs: parse_fields(parts[1]),
        })
    }
}

/// Macro for rapid schema creation: schema!("video_path -> render")
#[macro_export]
macro_rules! schema {
    ($s:expr) => {
        $s.parse::<$crate::ExecutionSchema>()
            .expect("Invalid schema shorthand")
    };
}
