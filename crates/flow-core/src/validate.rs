use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub field: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Validation<T> {
    Valid(T),
    Invalid(Vec<ValidationIssue>),
}

impl<T> Validation<T> {
    pub fn into_result(self) -> Result<T, Vec<ValidationIssue>> {
        match self {
            Validation::Valid(value) => Ok(value),
            Validation::Invalid(issues) => Err(issues),
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Validation::Valid(_))
    }
}

/// Field-level rules beyond what deserialization enforces.
pub trait Validate {
    fn validate(&self, issues: &mut Issues);
}

/// Collects rule violations for one value.
#[derive(Debug, Default)]
pub struct Issues {
    items: Vec<ValidationIssue>,
}

impl Issues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, field: &str, message: impl Into<String>) {
        self.items.push(ValidationIssue::new(field, message));
    }

    pub fn non_empty(&mut self, field: &str, value: &str) {
        if value.trim().is_empty() {
            self.push(field, "must not be empty");
        }
    }

    pub fn max_chars(&mut self, field: &str, value: &str, max: usize) {
        let count = value.chars().count();
        if count > max {
            self.push(field, format!("must be at most {max} characters (got {count})"));
        }
    }

    pub fn max_items<T>(&mut self, field: &str, items: &[T], max: usize) {
        if items.len() > max {
            self.push(
                field,
                format!("must contain at most {max} items (got {})", items.len()),
            );
        }
    }

    pub fn range<N>(&mut self, field: &str, value: N, min: N, max: N)
    where
        N: PartialOrd + fmt::Display + Copy,
    {
        if value < min || value > max {
            self.push(field, format!("must be between {min} and {max} (got {value})"));
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn into_vec(self) -> Vec<ValidationIssue> {
        self.items
    }
}

/// Deserializes `value` into `T` and runs its rules. Unknown fields are ignored.
pub fn validate_value<T>(value: &Value) -> Validation<T>
where
    T: DeserializeOwned + Validate,
{
    let typed: T = match T::deserialize(value) {
        Ok(typed) => typed,
        Err(err) => {
            return Validation::Invalid(vec![ValidationIssue::new(
                issue_field(&err.to_string()),
                err.to_string(),
            )])
        }
    };
    let mut issues = Issues::new();
    typed.validate(&mut issues);
    if issues.is_empty() {
        Validation::Valid(typed)
    } else {
        Validation::Invalid(issues.into_vec())
    }
}

// serde_json reports missing fields as "missing field `name`".
fn issue_field(message: &str) -> String {
    message
        .split('`')
        .nth(1)
        .map(str::to_string)
        .unwrap_or_else(|| "body".to_string())
}
