use std::rc::Rc;

use crate::entry::Entry;
use crate::error::{ArborError, Result};
use crate::kind::Kind;
use crate::schema::{Comparator, Outcome, Schema, structural_eq};
use crate::value::{Value, mismatch};

type Transform = Rc<dyn Fn(&Value) -> Result<Value>>;
type Validate = Rc<dyn Fn(&Value) -> std::result::Result<(), String>>;

/// A leaf holding one value, compared against its default to decide whether
/// it is populated.
///
/// Writes of a different type than a non-null default fail with
/// `TypeMismatch`, writes refused by the validator with `Rejected`. Writes
/// equal to the current value are dropped.
#[derive(Clone)]
pub struct Scalar {
    default: Value,
    eq: Comparator,
    transform: Option<Transform>,
    validate: Option<Validate>,
}

impl Scalar {
    pub fn new(default: impl Into<Value>) -> Self {
        Self {
            default: default.into(),
            eq: structural_eq(),
            transform: None,
            validate: None,
        }
    }

    pub fn with_eq(mut self, eq: impl Fn(&Value, &Value) -> bool + 'static) -> Self {
        self.eq = Rc::new(eq);
        self
    }

    /// Normalizes writes before they are compared and stored.
    pub fn with_transform(mut self, f: impl Fn(&Value) -> Result<Value> + 'static) -> Self {
        self.transform = Some(Rc::new(f));
        self
    }

    /// Runs after the transform; `Err(reason)` refuses the write.
    pub fn with_validate(
        mut self,
        f: impl Fn(&Value) -> std::result::Result<(), String> + 'static,
    ) -> Self {
        self.validate = Some(Rc::new(f));
        self
    }

    pub fn default_value(&self) -> &Value {
        &self.default
    }
}

impl Schema for Scalar {
    fn kind(&self) -> Kind {
        Kind::Scalar
    }

    fn name(&self) -> &'static str {
        "scalar"
    }

    fn compute(&self, _entry: &Entry, current: Option<&Value>) -> Result<Outcome> {
        Ok(Outcome::Value(
            current.cloned().unwrap_or_else(|| self.default.clone()),
        ))
    }

    fn change(&self, entry: &Entry, proposed: Value, previous: Option<&Value>) -> Result<Outcome> {
        let proposed = match &self.transform {
            Some(f) => f(&proposed)?,
            None => proposed,
        };
        if !self.default.is_null()
            && !proposed.is_null()
            && self.default.type_name() != proposed.type_name()
        {
            return Err(mismatch(
                &entry.path()?,
                self.default.type_name(),
                &proposed,
            ));
        }
        if let Some(validate) = &self.validate
            && let Err(reason) = validate(&proposed)
        {
            return Err(ArborError::Rejected {
                path: entry.path_string(),
                reason,
            });
        }
        let previous = previous.unwrap_or(&self.default);
        if (self.eq)(previous, &proposed) {
            return Ok(Outcome::Keep);
        }
        entry.invalidate()?;
        Ok(Outcome::Value(proposed))
    }

    fn compute_default(&self) -> Result<Value> {
        Ok(self.default.clone())
    }

    fn has_value(&self, _entry: &Entry, current: Option<&Value>) -> Result<bool> {
        Ok(current.is_some_and(|v| !(self.eq)(v, &self.default)))
    }

    fn unset(&self, entry: &Entry) -> Result<()> {
        if entry.has_value()? {
            entry.invalidate()?;
        }
        entry.clear_cached()
    }
}
