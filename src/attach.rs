//! Collection attachment strategies
//!
//! A child completed inside a collection container is handed to the object
//! owning that container. The container schema decides how: an `add` hook,
//! or a list/map found through its `collection` attribute (defaulting to the
//! container's own name), keyed by its `key` selector when map-backed.

use tracing::debug;

use crate::error::{BuildError, Result};
use crate::hooks::Accessor;
use crate::schema::{SchemaId, SchemaStore};
use crate::target::{BuildTarget, CollectionKind, CollectionMut};
use crate::value::Value;

const ADD_ATTR: &str = "add";
const KEY_ATTR: &str = "key";
const COLLECTION_ATTR: &str = "collection";

/// Attach `child` to `owner` through the collection container `container`
pub fn add_to_collection(
    store: &SchemaStore,
    container: SchemaId,
    owner: &Value,
    child: &Value,
) -> Result<()> {
    let name = store.name(container);
    let attr = |key: &str| store.attribute(container, key).filter(|v| !v.is_null());
    let key_attr = attr(KEY_ATTR);

    let Value::Object(owner_obj) = owner else {
        return Err(BuildError::collection(
            name,
            format!("cannot add to a {} parent", owner.kind()),
        ));
    };

    let key = match key_attr {
        Some(selector) => Some(derive_key(name, selector, child)?),
        None => None,
    };

    if let Some(add) = attr(ADD_ATTR) {
        debug!(collection = name, "Attaching through add hook");
        return match add {
            Value::Callable(hook) if hook.arity() == 3 => {
                let key = key.ok_or_else(|| {
                    BuildError::collection(name, "a three argument add requires a key")
                })?;
                hook.call(vec![owner.clone(), key, child.clone()])
                    .map(drop)
                    .map_err(|e| hook_error(name, e))
            }
            Value::Callable(hook) if hook.arity() == 2 => hook
                .call(vec![owner.clone(), child.clone()])
                .map(drop)
                .map_err(|e| hook_error(name, e)),
            Value::Str(method) => {
                let args = match key {
                    Some(key) => vec![key, child.clone()],
                    None => vec![child.clone()],
                };
                let mut target = borrow(name, owner_obj)?;
                let result = target.invoke(method, args);
                result.map(drop).map_err(|e| hook_error(name, e))
            }
            other => Err(BuildError::collection(
                name,
                format!("unsupported add attribute of kind {}", other.kind()),
            )),
        };
    }

    let hint = if key_attr.is_some() {
        CollectionKind::Map
    } else {
        CollectionKind::List
    };
    let mut target = borrow(name, owner_obj)?;
    match attr(COLLECTION_ATTR) {
        None => insert_named(name, &mut *target, name, hint, key, child),
        Some(Value::Str(collection)) => {
            insert_named(name, &mut *target, collection, hint, key, child)
        }
        Some(Value::Accessor(accessor)) => insert_accessed(name, &mut *target, accessor, key, child),
        Some(other) => Err(BuildError::collection(
            name,
            format!("unsupported collection attribute of kind {}", other.kind()),
        )),
    }
}

fn borrow<'a>(
    name: &str,
    owner: &'a crate::target::ObjectRef,
) -> Result<std::cell::RefMut<'a, dyn BuildTarget + 'static>> {
    owner
        .try_borrow_mut()
        .map_err(|_| BuildError::collection(name, "parent is already borrowed"))
}

fn hook_error(name: &str, err: anyhow::Error) -> BuildError {
    BuildError::from_hook(err, |msg| BuildError::collection(name, msg))
}

fn derive_key(name: &str, selector: &Value, child: &Value) -> Result<Value> {
    match selector {
        Value::Str(property) => Ok(match child {
            Value::Object(obj) => obj
                .try_borrow()
                .map_err(|_| BuildError::collection(name, "child is already borrowed"))?
                .property(property)
                .unwrap_or(Value::Null),
            Value::Map(map) => map.get(property).cloned().unwrap_or(Value::Null),
            _ => Value::Null,
        }),
        Value::Callable(hook) if hook.arity() == 1 => hook
            .call(vec![child.clone()])
            .map_err(|e| hook_error(name, e)),
        other => Err(BuildError::collection(
            name,
            format!("unsupported key attribute of kind {}", other.kind()),
        )),
    }
}

fn insert(name: &str, collection: CollectionMut<'_>, key: Option<Value>, child: &Value) -> Result<()> {
    match collection {
        CollectionMut::List(items) => {
            items.push(child.clone());
            Ok(())
        }
        CollectionMut::Map(map) => {
            let key = key.ok_or_else(|| BuildError::collection(name, "map collection requires a key"))?;
            let key = key.to_key().ok_or_else(|| {
                BuildError::collection(name, format!("cannot use a {} as a map key", key.kind()))
            })?;
            map.insert(key, child.clone());
            Ok(())
        }
    }
}

fn insert_named(
    name: &str,
    target: &mut dyn BuildTarget,
    collection: &str,
    hint: CollectionKind,
    key: Option<Value>,
    child: &Value,
) -> Result<()> {
    if let Some(found) = target.collection(collection, hint) {
        debug!(collection, ?hint, "Attaching to collection");
        return insert(name, found, key, child);
    }
    debug!(collection, "No collection found, setting property");
    target
        .set_property(collection, child.clone())
        .map_err(|e| hook_error(name, e))
}

fn insert_accessed(
    name: &str,
    target: &mut dyn BuildTarget,
    accessor: &Accessor,
    key: Option<Value>,
    child: &Value,
) -> Result<()> {
    match accessor.access(target) {
        Some(found) => insert(name, found, key, child),
        None => Err(BuildError::collection(name, "accessor returned no collection")),
    }
}
