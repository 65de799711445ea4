//! Stock schemas.
//!
//! Free functions build each schema with its defaults; the returned structs
//! have chained `with_*` methods for the rest.

mod array;
mod derived;
mod extend;
mod map;
mod object;
mod scalar;
mod set;
mod synced;

pub use array::Array;
pub use derived::Derived;
pub use extend::Extended;
pub use map::Map;
pub use object::Object;
pub use scalar::Scalar;
pub use set::Set;
pub use synced::Synced;

use crate::error::Result;
use crate::schema::IntoSchema;
use crate::value::Value;

pub fn scalar(default: impl Into<Value>) -> Scalar {
    Scalar::new(default)
}

pub fn derived(read: impl Fn(&Value) -> Result<Value> + 'static) -> Derived {
    Derived::new(read)
}

pub fn object() -> Object {
    Object::new()
}

pub fn array(element: impl IntoSchema) -> Array {
    Array::new(element)
}

pub fn map(value: impl IntoSchema) -> Map {
    Map::new(value)
}

pub fn set() -> Set {
    Set::new()
}

pub fn synced(
    read: impl Fn() -> Result<Value> + 'static,
    write: impl Fn(Value) -> Result<()> + 'static,
) -> Synced {
    Synced::new(read, write)
}

pub fn extend(base: impl IntoSchema) -> Extended {
    Extended::new(base)
}
