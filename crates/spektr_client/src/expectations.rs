//! Response expectations.
//!
//! A [`RequestSpec`] collects at most one status expectation (the last one
//! declared wins) and any number of JSON-path expectations. Verification
//! reports every expectation that failed, not just the first.

use jsonpath_lib::select;
use serde_json::Value;

#[cfg(test)]
#[path = "expectations_tests.rs"]
mod tests;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusExpectation {
    Ok,
    Created,
    NoContent,
    Code(u16),
}

impl StatusExpectation {
    pub fn code(&self) -> u16 {
        match self {
            Self::Ok => 200,
            Self::Created => 201,
            Self::NoContent => 204,
            Self::Code(code) => *code,
        }
    }

    /// Describe the mismatch, if any.
    pub fn check(&self, actual: u16) -> Result<(), String> {
        if actual == self.code() {
            Ok(())
        } else {
            Err(format!("expected status {} but was {}", self.code(), actual))
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum JsonPathCheck {
    ValueEquals(Value),
    Exists,
    DoesNotExist,
    /// Missing, `null`, `""`, `[]` or `{}`.
    IsEmpty,
    IsNotEmpty,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JsonPathExpectation {
    pub expression: String,
    pub check: JsonPathCheck,
}

impl JsonPathExpectation {
    /// Evaluate against a parsed response body.
    pub fn evaluate(&self, document: &Value) -> Result<(), String> {
        let selected = select_value(document, &self.expression)?;
        let expression = &self.expression;

        match (&self.check, selected) {
            (JsonPathCheck::ValueEquals(expected), Some(actual)) if actual == *expected => Ok(()),
            (JsonPathCheck::ValueEquals(expected), Some(actual)) => Err(format!(
                "JSON path '{expression}': expected {expected} but was {actual}"
            )),
            (JsonPathCheck::ValueEquals(expected), None) => Err(format!(
                "JSON path '{expression}': expected {expected} but no value was found"
            )),
            (JsonPathCheck::Exists, Some(value)) if !value.is_null() => Ok(()),
            (JsonPathCheck::Exists, _) => {
                Err(format!("JSON path '{expression}': expected a value but none exists"))
            }
            (JsonPathCheck::DoesNotExist, Some(value)) if !value.is_null() => Err(format!(
                "JSON path '{expression}': expected no value but found {value}"
            )),
            (JsonPathCheck::DoesNotExist, _) => Ok(()),
            (JsonPathCheck::IsEmpty, value) if is_empty(value.as_ref()) => Ok(()),
            (JsonPathCheck::IsEmpty, value) => Err(format!(
                "JSON path '{expression}': expected an empty value but was {}",
                value.unwrap_or(Value::Null)
            )),
            (JsonPathCheck::IsNotEmpty, value) if !is_empty(value.as_ref()) => Ok(()),
            (JsonPathCheck::IsNotEmpty, _) => Err(format!(
                "JSON path '{expression}': expected a non-empty value"
            )),
        }
    }
}

/// Expectations declared for one request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestSpec {
    status: Option<StatusExpectation>,
    json_paths: Vec<JsonPathExpectation>,
}

impl RequestSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare expectations on the response.
    pub fn expect(&mut self, scope: impl FnOnce(&mut ExpectationSpec<'_>)) {
        let mut expectations = ExpectationSpec { spec: self };
        scope(&mut expectations);
    }

    pub fn status(&self) -> Option<StatusExpectation> {
        self.status
    }

    pub fn json_paths(&self) -> &[JsonPathExpectation] {
        &self.json_paths
    }

    /// Every failed expectation for a response, in declaration order.
    pub fn verify(&self, status: u16, body: &str) -> Vec<String> {
        let mut failures = Vec::new();

        if let Some(expected) = &self.status {
            if let Err(failure) = expected.check(status) {
                failures.push(failure);
            }
        }

        if self.json_paths.is_empty() {
            return failures;
        }

        match serde_json::from_str::<Value>(body) {
            Ok(document) => failures.extend(
                self.json_paths
                    .iter()
                    .filter_map(|expectation| expectation.evaluate(&document).err()),
            ),
            Err(e) => failures.extend(self.json_paths.iter().map(|expectation| {
                format!(
                    "JSON path '{}': response body is not JSON ({e})",
                    expectation.expression
                )
            })),
        }

        failures
    }
}

/// Builder handed to [`RequestSpec::expect`].
pub struct ExpectationSpec<'a> {
    spec: &'a mut RequestSpec,
}

impl ExpectationSpec<'_> {
    pub fn has_ok_status(&mut self) -> &mut Self {
        self.has(StatusExpectation::Ok)
    }

    pub fn has_created_status(&mut self) -> &mut Self {
        self.has(StatusExpectation::Created)
    }

    pub fn has_no_content_status(&mut self) -> &mut Self {
        self.has(StatusExpectation::NoContent)
    }

    pub fn has_status(&mut self, code: u16) -> &mut Self {
        self.has(StatusExpectation::Code(code))
    }

    fn has(&mut self, status: StatusExpectation) -> &mut Self {
        self.spec.status = Some(status);
        self
    }

    /// Start an expectation on the value(s) selected by `expression`.
    pub fn json_path(&mut self, expression: impl Into<String>) -> JsonPathAssertion<'_> {
        JsonPathAssertion {
            spec: &mut *self.spec,
            expression: expression.into(),
        }
    }
}

/// Pending expectation on one JSON path.
pub struct JsonPathAssertion<'a> {
    spec: &'a mut RequestSpec,
    expression: String,
}

impl JsonPathAssertion<'_> {
    pub fn value_equals(self, expected: impl Into<Value>) {
        self.push(JsonPathCheck::ValueEquals(expected.into()));
    }

    pub fn exists(self) {
        self.push(JsonPathCheck::Exists);
    }

    pub fn does_not_exist(self) {
        self.push(JsonPathCheck::DoesNotExist);
    }

    pub fn is_empty(self) {
        self.push(JsonPathCheck::IsEmpty);
    }

    pub fn is_not_empty(self) {
        self.push(JsonPathCheck::IsNotEmpty);
    }

    fn push(self, check: JsonPathCheck) {
        self.spec.json_paths.push(JsonPathExpectation {
            expression: self.expression,
            check,
        });
    }
}

/// A single match is returned as-is; several are collected into an array.
fn select_value(document: &Value, expression: &str) -> Result<Option<Value>, String> {
    let matches = select(document, expression)
        .map_err(|e| format!("JSON path '{expression}' is invalid: {e:?}"))?;
    Ok(match matches.len() {
        0 => None,
        1 => Some(matches[0].clone()),
        _ => Some(Value::Array(matches.into_iter().cloned().collect())),
    })
}

fn is_empty(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        Some(Value::Object(fields)) => fields.is_empty(),
        Some(Value::Bool(_) | Value::Number(_)) => false,
    }
}
