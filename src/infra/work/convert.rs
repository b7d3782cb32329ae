//! Action converter substituting execution variables.

use std::sync::Arc;

use serde_json::Value;

use crate::core::definition::{TaskDefinition, TaskType, Variable};
use crate::core::executor::{ActionConverter, ConverterRegistry};
use crate::core::WorkError;

/// Replaces variable names in every string of the action payload.
/// Longer names are replaced first so `%%ODATE` does not clobber
/// `%%ODATEX`.
#[derive(Debug, Clone, Copy, Default)]
pub struct VariableConverter;

impl VariableConverter {
    fn substitute(value: &mut Value, vars: &[&Variable]) {
        match value {
            Value::String(s) => {
                for var in vars {
                    if s.contains(var.name.as_str()) {
                        *s = s.replace(var.name.as_str(), &var.value);
                    }
                }
            }
            Value::Array(items) => items.iter_mut().for_each(|v| Self::substitute(v, vars)),
            Value::Object(map) => map.values_mut().for_each(|v| Self::substitute(v, vars)),
            _ => {}
        }
    }
}

impl ActionConverter for VariableConverter {
    fn convert(&self, definition: &TaskDefinition, variables: &[Variable]) -> Result<Value, WorkError> {
        if definition.task_type != TaskType::Dummy && definition.action.is_null() {
            return Err(WorkError::Conversion(format!("{}: action is missing", definition.name)));
        }
        let mut vars: Vec<&Variable> = variables.iter().collect();
        vars.sort_by(|a, b| b.name.len().cmp(&a.name.len()));
        let mut action = definition.action.clone();
        Self::substitute(&mut action, &vars);
        Ok(action)
    }
}

/// Registry with [`VariableConverter`] for every task type.
pub fn default_converters() -> ConverterRegistry {
    let converter: Arc<dyn ActionConverter> = Arc::new(VariableConverter);
    let mut registry = ConverterRegistry::new();
    registry
        .register(TaskType::Dummy, Arc::clone(&converter))
        .register(TaskType::Os, Arc::clone(&converter))
        .register(TaskType::Aws, converter);
    registry
}
