use crate::entry::Entry;
use crate::error::Result;
use crate::kind::Kind;
use crate::schema::{IntoSchema, Mutations, Outcome, Schema, SchemaRef, argument, bind};
use crate::value::{Key, Value, mismatch};

/// Text keys mapped to values of one schema.
///
/// A key is present while its entry holds a value; a slot holding the element
/// default reads as absent. Writes are additive; remove keys with the `delete`
/// and `clear` mutations. Also offers `has(key) -> bool` and `keys() -> list`.
#[derive(Clone)]
pub struct Map {
    value: SchemaRef,
}

impl Map {
    pub fn new(value: impl IntoSchema) -> Self {
        Self {
            value: value.into_schema(),
        }
    }
}

fn present(entry: &Entry) -> Result<Vec<(Key, Entry)>> {
    let mut out = Vec::new();
    for (key, child) in entry.children()? {
        if child.has_value()? {
            out.push((key, child));
        }
    }
    Ok(out)
}

fn existing(entry: &Entry, key: &Key) -> Result<Option<Entry>> {
    Ok(entry
        .children()?
        .into_iter()
        .find(|(k, _)| k == key)
        .map(|(_, child)| child))
}

impl Schema for Map {
    fn kind(&self) -> Kind {
        Kind::Widening
    }

    fn name(&self) -> &'static str {
        "map"
    }

    fn compute(&self, entry: &Entry, _current: Option<&Value>) -> Result<Outcome> {
        let out = Value::empty_object();
        for (key, child) in present(entry)? {
            out.insert(key.to_string(), child.get()?)?;
        }
        Ok(Outcome::Value(out))
    }

    fn change(&self, entry: &Entry, proposed: Value, _previous: Option<&Value>) -> Result<Outcome> {
        let Value::Object(_) = &proposed else {
            return Err(mismatch(&entry.path()?, "object", &proposed));
        };
        for (name, value) in proposed.fields() {
            entry.member(name)?.set(value)?;
        }
        Ok(Outcome::Keep)
    }

    fn compute_default(&self) -> Result<Value> {
        Ok(Value::empty_object())
    }

    fn member(&self, key: &Key) -> Option<SchemaRef> {
        key.as_name().map(|_| self.value.clone())
    }

    fn is_collectable(&self, _key: &Key) -> bool {
        true
    }

    fn mutations(&self, entry: &Entry) -> Mutations {
        Mutations::new()
            .with(
                "delete",
                bind(entry, |entry, args| {
                    let key = Key::name_from_value(argument(args, 0, "delete")?)?;
                    let Some(child) = existing(entry, &key)? else {
                        return Ok(Value::Bool(false));
                    };
                    let had = child.has_value()?;
                    child.unset()?;
                    Ok(Value::Bool(had))
                }),
            )
            .with(
                "clear",
                bind(entry, |entry, _| {
                    for (_, child) in entry.children()? {
                        child.unset()?;
                    }
                    Ok(Value::Null)
                }),
            )
            .with(
                "has",
                bind(entry, |entry, args| {
                    let key = Key::name_from_value(argument(args, 0, "has")?)?;
                    let has = match existing(entry, &key)? {
                        Some(child) => child.has_value()?,
                        None => false,
                    };
                    Ok(Value::Bool(has))
                }),
            )
            .with(
                "keys",
                bind(entry, |entry, _| {
                    let keys = present(entry)?.into_iter().map(|(k, _)| k.to_value());
                    Ok(Value::list(keys))
                }),
            )
    }
}
