//! User-supplied hooks: callables, value checks and collection accessors

use std::fmt;
use std::rc::Rc;

use anyhow::bail;
use regex::Regex;

use crate::target::{BuildTarget, CollectionMut};
use crate::value::{Value, ValueKind};

type Fn0 = dyn Fn() -> anyhow::Result<Value>;
type Fn1 = dyn Fn(Value) -> anyhow::Result<Value>;
type Fn2 = dyn Fn(Value, Value) -> anyhow::Result<Value>;
type Fn3 = dyn Fn(Value, Value, Value) -> anyhow::Result<Value>;

// ============================================================================
// Callable
// ============================================================================

/// A user function with a fixed arity of zero to three arguments
///
/// Hooks inspect their arity before being invoked, e.g. a one-argument
/// factory receives the call name and a two-argument one also the value.
#[derive(Clone)]
pub enum Callable {
    Zero(Rc<Fn0>),
    One(Rc<Fn1>),
    Two(Rc<Fn2>),
    Three(Rc<Fn3>),
}

impl Callable {
    pub fn new0(f: impl Fn() -> anyhow::Result<Value> + 'static) -> Self {
        Callable::Zero(Rc::new(f))
    }

    pub fn new1(f: impl Fn(Value) -> anyhow::Result<Value> + 'static) -> Self {
        Callable::One(Rc::new(f))
    }

    pub fn new2(f: impl Fn(Value, Value) -> anyhow::Result<Value> + 'static) -> Self {
        Callable::Two(Rc::new(f))
    }

    pub fn new3(f: impl Fn(Value, Value, Value) -> anyhow::Result<Value> + 'static) -> Self {
        Callable::Three(Rc::new(f))
    }

    pub fn arity(&self) -> usize {
        match self {
            Callable::Zero(_) => 0,
            Callable::One(_) => 1,
            Callable::Two(_) => 2,
            Callable::Three(_) => 3,
        }
    }

    /// Invoke with exactly `arity()` arguments
    pub fn call(&self, args: Vec<Value>) -> anyhow::Result<Value> {
        if args.len() != self.arity() {
            bail!(
                "callable expects {} argument(s), got {}",
                self.arity(),
                args.len()
            );
        }
        let mut it = args.into_iter();
        let mut next = || it.next().unwrap_or(Value::Null);
        match self {
            Callable::Zero(f) => f(),
            Callable::One(f) => f(next()),
            Callable::Two(f) => {
                let a = next();
                f(a, next())
            }
            Callable::Three(f) => {
                let a = next();
                let b = next();
                f(a, b, next())
            }
        }
    }

    pub fn ptr_eq(&self, other: &Callable) -> bool {
        fn addr<T: ?Sized>(rc: &Rc<T>) -> *const () {
            Rc::as_ptr(rc) as *const ()
        }
        match (self, other) {
            (Callable::Zero(a), Callable::Zero(b)) => addr(a) == addr(b),
            (Callable::One(a), Callable::One(b)) => addr(a) == addr(b),
            (Callable::Two(a), Callable::Two(b)) => addr(a) == addr(b),
            (Callable::Three(a), Callable::Three(b)) => addr(a) == addr(b),
            _ => false,
        }
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Callable/{}", self.arity())
    }
}

// ============================================================================
// Check
// ============================================================================

/// Rule evaluated by a property's `check` attribute
pub enum CheckRule {
    /// Truthiness of a one-argument callable
    Predicate(Callable),
    /// Full match of a regular expression against the value's string form
    Pattern { source: String, regex: Regex },
    /// Membership in a list
    OneOf(Vec<Value>),
    /// Inclusive ordinal range
    Range { min: Option<f64>, max: Option<f64> },
    /// Value kind membership
    Kinds(Vec<ValueKind>),
    /// Plain equality
    Equals(Value),
}

/// A shareable value check
#[derive(Clone)]
pub struct Check {
    rule: Rc<CheckRule>,
}

impl Check {
    fn from_rule(rule: CheckRule) -> Self {
        Self {
            rule: Rc::new(rule),
        }
    }

    pub fn predicate(callable: Callable) -> Self {
        Self::from_rule(CheckRule::Predicate(callable))
    }

    /// Regex check; the pattern must match the whole string
    pub fn pattern(source: &str) -> Result<Self, regex::Error> {
        let regex = Regex::new(&format!("^(?:{})$", source))?;
        Ok(Self::from_rule(CheckRule::Pattern {
            source: source.to_string(),
            regex,
        }))
    }

    pub fn one_of(values: Vec<Value>) -> Self {
        Self::from_rule(CheckRule::OneOf(values))
    }

    pub fn range(min: Option<f64>, max: Option<f64>) -> Self {
        Self::from_rule(CheckRule::Range { min, max })
    }

    pub fn kinds(kinds: Vec<ValueKind>) -> Self {
        Self::from_rule(CheckRule::Kinds(kinds))
    }

    pub fn equals(value: Value) -> Self {
        Self::from_rule(CheckRule::Equals(value))
    }

    /// Interpret a `check` attribute value
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Check(c) => c.clone(),
            Value::Callable(c) => Self::predicate(c.clone()),
            Value::List(items) => Self::one_of(items.clone()),
            other => Self::equals(other.clone()),
        }
    }

    pub fn rule(&self) -> &CheckRule {
        &self.rule
    }

    pub fn evaluate(&self, value: &Value) -> anyhow::Result<bool> {
        Ok(match self.rule.as_ref() {
            CheckRule::Predicate(callable) => match callable.arity() {
                0 => callable.call(vec![])?.is_truthy(),
                1 => callable.call(vec![value.clone()])?.is_truthy(),
                n => bail!("check callable must take one argument, takes {}", n),
            },
            CheckRule::Pattern { regex, .. } => match value.to_key() {
                Some(s) => regex.is_match(&s),
                None => false,
            },
            CheckRule::OneOf(items) => items.contains(value),
            CheckRule::Range { min, max } => match value.ordinal() {
                Some(n) => min.map_or(true, |m| n >= m) && max.map_or(true, |m| n <= m),
                None => false,
            },
            CheckRule::Kinds(kinds) => {
                let kind = value.kind();
                kinds.contains(&kind)
                    || (kind == ValueKind::Int && kinds.contains(&ValueKind::Float))
            }
            CheckRule::Equals(expected) => expected == value,
        })
    }

    pub fn ptr_eq(&self, other: &Check) -> bool {
        Rc::ptr_eq(&self.rule, &other.rule)
    }
}

impl fmt::Display for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.rule.as_ref() {
            CheckRule::Predicate(c) => write!(f, "predicate/{}", c.arity()),
            CheckRule::Pattern { source, .. } => write!(f, "/{}/", source),
            CheckRule::OneOf(items) => write!(f, "one of {:?}", items),
            CheckRule::Range { min, max } => write!(f, "range {:?}..={:?}", min, max),
            CheckRule::Kinds(kinds) => {
                let names: Vec<String> = kinds.iter().map(|k| k.to_string()).collect();
                write!(f, "kind in [{}]", names.join(", "))
            }
            CheckRule::Equals(v) => write!(f, "== {:?}", v),
        }
    }
}

impl fmt::Debug for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Check({})", self)
    }
}

// ============================================================================
// Accessor
// ============================================================================

type AccessFn = dyn for<'a> Fn(&'a mut dyn BuildTarget) -> Option<CollectionMut<'a>>;

/// Returns a mutable view of a collection held by a domain object
#[derive(Clone)]
pub struct Accessor(Rc<AccessFn>);

impl Accessor {
    pub fn new(
        f: impl for<'a> Fn(&'a mut dyn BuildTarget) -> Option<CollectionMut<'a>> + 'static,
    ) -> Self {
        Accessor(Rc::new(f))
    }

    pub fn access<'a>(&self, target: &'a mut dyn BuildTarget) -> Option<CollectionMut<'a>> {
        (self.0)(target)
    }

    pub fn ptr_eq(&self, other: &Accessor) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Accessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Accessor")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_callable_arity_mismatch() {
        let c = Callable::new2(|a, _| Ok(a));
        assert_eq!(c.arity(), 2);
        assert!(c.call(vec![Value::Null]).is_err());
        assert_eq!(c.call(vec![Value::Int(1), Value::Int(2)]).unwrap(), Value::Int(1));
    }

    #[test]
    fn test_pattern_is_anchored() {
        let check = Check::pattern(r"\d+").unwrap();
        assert!(check.evaluate(&Value::from("123")).unwrap());
        assert!(!check.evaluate(&Value::from("12a")).unwrap());
        assert!(check.evaluate(&Value::Int(42)).unwrap());
        assert!(!check.evaluate(&Value::Null).unwrap());
    }

    #[test]
    fn test_from_value_dispatch() {
        let list = Check::from_value(&Value::List(vec!["a".into(), "b".into()]));
        assert!(list.evaluate(&"b".into()).unwrap());
        assert!(!list.evaluate(&"c".into()).unwrap());

        let pred = Check::from_value(&Value::Callable(Callable::new1(|v| {
            Ok(Value::Bool(v.as_i64().unwrap_or(0) > 3))
        })));
        assert!(pred.evaluate(&Value::Int(4)).unwrap());
        assert!(!pred.evaluate(&Value::Int(3)).unwrap());

        let eq = Check::from_value(&Value::Int(7));
        assert!(eq.evaluate(&Value::Int(7)).unwrap());
    }

    #[test]
    fn test_range_and_kinds() {
        let range = Check::range(Some(2.0), Some(4.0));
        assert!(range.evaluate(&"abc".into()).unwrap());
        assert!(!range.evaluate(&"abcde".into()).unwrap());

        let kinds = Check::kinds(vec![ValueKind::Float, ValueKind::Null]);
        assert!(kinds.evaluate(&Value::Int(1)).unwrap());
        assert!(kinds.evaluate(&Value::Null).unwrap());
        assert!(!kinds.evaluate(&"x".into()).unwrap());
    }

    #[test]
    fn test_predicate_error_propagates() {
        let check = Check::predicate(Callable::new1(|_| bail!("nope")));
        assert!(check.evaluate(&Value::Null).is_err());
    }
}
