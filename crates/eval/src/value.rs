//! Runtime values of the dynamic strategy.

use std::cell::RefCell;
use std::rc::Rc;

use eigenscript_engine::TrackedValue;

use crate::error::{Error, Result};

/// Shared, host-reclaimed tracked record.
pub type Handle = Rc<RefCell<TrackedValue>>;

pub fn new_handle(initial: f64) -> Handle {
    Rc::new(RefCell::new(TrackedValue::new(initial)))
}

/// A value produced by expression evaluation. Booleans are `1.0` / `0.0`
/// scalars; text only arises from identity interrogatives.
#[derive(Debug, Clone)]
pub enum Value {
    Scalar(f64),
    Text(String),
    /// A tracked binding returned by name from a function: the dynamic
    /// analogue of record escape, handing the caller the live handle.
    Tracked(Handle),
    List(Rc<RefCell<Vec<f64>>>),
}

impl Value {
    pub fn as_scalar(&self) -> Result<f64> {
        match self {
            Value::Scalar(v) => Ok(*v),
            Value::Tracked(handle) => Ok(handle.borrow().value()),
            Value::Text(_) | Value::List(_) => Err(Error::NotScalar),
        }
    }

    pub fn truthy(&self) -> Result<bool> {
        Ok(self.as_scalar()? != 0.0)
    }

    pub fn bool(flag: bool) -> Value {
        Value::Scalar(if flag { 1.0 } else { 0.0 })
    }
}
