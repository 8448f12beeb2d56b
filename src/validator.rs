//! Property validation and assignment
//!
//! A supplied value is matched to its merged declaration, checked against
//! `min`/`max` and `check`, then written to the node either under its
//! (possibly renamed) property name or through a setter hook.

use tracing::trace;

use crate::error::{
    BuildError, Result, NOT_COMPARABLE, PROPERTY_UNKNOWN, VALUE_INVALID,
};
use crate::hooks::{Callable, Check};
use crate::registry::suggest;
use crate::resolver::Resolver;
use crate::schema::{PropertyDecl, SchemaId, SchemaStore};
use crate::value::Value;

const MIN_FAILED: &str = "min check failed";
const MAX_FAILED: &str = "max check failed";
const BAD_PROPERTY_ATTR: &str =
    "'property' attribute of schema does not specify a string or closure";

/// How a validated value reaches its node
#[derive(Debug, Clone)]
pub enum Assignment {
    /// Set under this property name
    Named(String),
    /// Invoke `(node, value)`
    Setter(Callable),
}

/// Find the declaration for `name` on `schema`
///
/// Undeclared names are rejected unless the schema or an ancestor declares a
/// wildcard property.
pub fn lookup(resolver: &Resolver<'_>, schema: SchemaId, name: &str, suggestions: bool) -> Result<PropertyDecl> {
    if let Some(decl) = resolver.property_decl(schema, name)? {
        return Ok(decl);
    }
    let mut reason = PROPERTY_UNKNOWN.to_string();
    if suggestions {
        let merged = resolver.merged_properties(schema)?;
        if let Some(candidate) = suggest(name, merged.keys().map(String::as_str)) {
            reason.push_str(&format!(" (did you mean '{}'?)", candidate));
        }
    }
    Err(BuildError::property(name, reason))
}

/// Run the bounds then the `check` rule of `decl` against `value`
pub fn validate(decl: &PropertyDecl, name: &str, value: &Value) -> Result<()> {
    let min = decl.attribute("min");
    let max = decl.attribute("max");
    if !value.is_null() && (min.is_some() || max.is_some()) {
        let ordinal = value
            .ordinal()
            .ok_or_else(|| BuildError::property(name, NOT_COMPARABLE))?;
        if let Some(min) = min {
            let min = bound(name, "min", min)?;
            if min > ordinal {
                return Err(BuildError::property(name, MIN_FAILED));
            }
        }
        if let Some(max) = max {
            let max = bound(name, "max", max)?;
            if max < ordinal {
                return Err(BuildError::property(name, MAX_FAILED));
            }
        }
    }

    if let Some(rule) = decl.attribute("check") {
        let passed = Check::from_value(rule)
            .evaluate(value)
            .map_err(|e| BuildError::from_hook(e, |msg| BuildError::property(name, msg)))?;
        if !passed {
            return Err(BuildError::property(name, VALUE_INVALID));
        }
    }
    Ok(())
}

fn bound(name: &str, which: &str, value: &Value) -> Result<f64> {
    value
        .as_f64()
        .ok_or_else(|| BuildError::property(name, format!("{} must be a number", which)))
}

/// Resolve the `property` attribute of `decl` for a value supplied as `name`
pub fn assignment(decl: &PropertyDecl, name: &str) -> Result<Assignment> {
    match decl.attribute("property") {
        None => Ok(Assignment::Named(name.to_string())),
        Some(Value::Str(target)) => Ok(Assignment::Named(target.clone())),
        Some(Value::Callable(setter)) if setter.arity() == 2 => Ok(Assignment::Setter(setter.clone())),
        Some(_) => Err(BuildError::property(name, BAD_PROPERTY_ATTR)),
    }
}

/// Write `value` to `node`
///
/// Schema nodes receive it as a schema attribute; domain objects through
/// [`BuildTarget::set_property`](crate::target::BuildTarget::set_property).
pub fn assign(
    store: &mut SchemaStore,
    node: &Value,
    name: &str,
    assignment: Assignment,
    value: Value,
) -> Result<()> {
    let wrap = |msg: String| BuildError::property(name, msg);
    match assignment {
        Assignment::Setter(setter) => {
            setter
                .call(vec![node.clone(), value])
                .map_err(|e| BuildError::from_hook(e, wrap))?;
            Ok(())
        }
        Assignment::Named(target) => match node {
            Value::Schema(id) => {
                store.set_attribute(*id, target, value);
                Ok(())
            }
            Value::Object(obj) => {
                let mut obj = obj
                    .try_borrow_mut()
                    .map_err(|_| BuildError::property(name, "node is already borrowed"))?;
                let result = obj.set_property(&target, value);
                result.map_err(|e| BuildError::from_hook(e, wrap))
            }
            other => Err(BuildError::property(
                name,
                format!("cannot set a property on a {} node", other.kind()),
            )),
        },
    }
}

/// Look up and validate one supplied value, returning how to assign it
pub fn prepare(
    resolver: &Resolver<'_>,
    schema: SchemaId,
    name: &str,
    value: &Value,
    suggestions: bool,
) -> Result<Assignment> {
    let decl = lookup(resolver, schema, name, suggestions)?;
    validate(&decl, name, value)?;
    trace!(property = name, declared = %decl.name, "Validated property");
    assignment(&decl, name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::registry::SchemaRegistry;
    use crate::schema::{SchemaKind, SchemaNode, PROPERTIES};
    use crate::target::{object, GenericNode};
    use crate::value::Attributes;

    fn decl(pairs: &[(&str, Value)]) -> PropertyDecl {
        PropertyDecl {
            name: "p".into(),
            declared_by: SchemaStore::new().insert(SchemaNode::new("p", SchemaKind::Node)),
            attributes: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        }
    }

    #[test]
    fn test_min_max_on_string_length() {
        let d = decl(&[("min", Value::Int(2)), ("max", Value::Int(3))]);
        assert!(validate(&d, "p", &"ab".into()).is_ok());
        let err = validate(&d, "p", &"a".into()).unwrap_err();
        assert_eq!(err.reason(), Some(MIN_FAILED));
        let err = validate(&d, "p", &"abcd".into()).unwrap_err();
        assert_eq!(err.reason(), Some(MAX_FAILED));
    }

    #[test]
    fn test_bounds_skip_null_but_reject_incomparable() {
        let d = decl(&[("min", Value::Int(1))]);
        assert!(validate(&d, "p", &Value::Null).is_ok());
        let err = validate(&d, "p", &Value::Bool(true)).unwrap_err();
        assert_eq!(err.reason(), Some(NOT_COMPARABLE));
    }

    #[test]
    fn test_check_runs_after_bounds() {
        let d = decl(&[
            ("max", Value::Int(10)),
            ("check", Value::List(vec![Value::Int(1), Value::Int(2)])),
        ]);
        assert!(validate(&d, "p", &Value::Int(2)).is_ok());
        assert_eq!(
            validate(&d, "p", &Value::Int(3)).unwrap_err().reason(),
            Some(VALUE_INVALID)
        );
        assert_eq!(
            validate(&d, "p", &Value::Int(11)).unwrap_err().reason(),
            Some(MAX_FAILED)
        );
    }

    #[test]
    fn test_assignment_forms() {
        let d = decl(&[("property", "renamed".into())]);
        assert!(matches!(assignment(&d, "p").unwrap(), Assignment::Named(n) if n == "renamed"));
        let d = decl(&[("property", Value::Int(1))]);
        assert_eq!(assignment(&d, "p").unwrap_err().reason(), Some(BAD_PROPERTY_ATTR));
        let d = decl(&[]);
        assert!(matches!(assignment(&d, "p").unwrap(), Assignment::Named(n) if n == "p"));
    }

    #[test]
    fn test_assign_to_object_and_schema() {
        let mut store = SchemaStore::new();
        let schema = store.insert(SchemaNode::new("s", SchemaKind::Node));
        assign(
            &mut store,
            &Value::Schema(schema),
            "req",
            Assignment::Named("req".into()),
            Value::Bool(true),
        )
        .unwrap();
        assert_eq!(store.attribute(schema, "req"), Some(&Value::Bool(true)));

        let node = Value::Object(object(GenericNode::new("n")));
        assign(&mut store, &node, "x", Assignment::Named("y".into()), Value::Int(1)).unwrap();
        let obj = node.as_object().unwrap().borrow();
        assert_eq!(obj.property("y"), Some(Value::Int(1)));

        let err = assign(&mut store, &Value::Int(3), "x", Assignment::Named("x".into()), Value::Null)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Property);
    }

    #[test]
    fn test_lookup_unknown_suggests() {
        let mut store = SchemaStore::new();
        let registry = SchemaRegistry::new();
        let root = store.insert(SchemaNode::new("item", SchemaKind::Node));
        let props = store.add_child(root, PROPERTIES, SchemaKind::Node, Attributes::new());
        store.add_child(props, "quantity", SchemaKind::Node, Attributes::new());
        let resolver = Resolver::new(&store, &registry, "%");
        let err = lookup(&resolver, root, "quantty", true).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Property 'quantty': property unknown (did you mean 'quantity'?)"
        );
        let err = lookup(&resolver, root, "zzz", false).unwrap_err();
        assert_eq!(err.reason(), Some(PROPERTY_UNKNOWN));
    }
}
