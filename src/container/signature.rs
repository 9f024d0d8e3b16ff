//! Parameter lists and argument packs.
//!
//! A [`Signature`] is the declared parameter list of a constructor or method.
//! The container walks it in order to build an [`Arguments`] pack:
//!
//! ```text
//! for each Param, in declared order:
//!     caller supplied a value under that name   → use it, remove it from the pool
//!     Param has a default                       → produce the default
//!     Param is a Service(abstract)              → container.make(abstract)
//!     otherwise                                 → BindingResolution error
//! leftover named values, then positional values → appended as extras
//! ```

use std::any::{Any, type_name};
use std::fmt;
use std::sync::Arc;

use super::{Injectable, Instance};
use crate::error::{Error, Result};

type Producer = Arc<dyn Fn() -> Instance + Send + Sync>;

/// How a single parameter may be satisfied when the caller does not name it.
#[derive(Clone)]
pub enum ParamKind {
    /// A non-primitive dependency the container can build.
    Service(String),
    /// A primitive with no default. Only an explicit value satisfies it.
    Value,
    /// A primitive with a declared default.
    Default(Producer),
}

impl fmt::Debug for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Service(name) => f.debug_tuple("Service").field(name).finish(),
            Self::Value => f.write_str("Value"),
            Self::Default(_) => f.write_str("Default(..)"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Param {
    name: String,
    kind: ParamKind,
}

impl Param {
    pub fn name(&self) -> &str { &self.name }
    pub fn kind(&self) -> &ParamKind { &self.kind }
}

/// Ordered parameter list. Built with chained calls:
///
/// ```rust
/// use trellis::container::Signature;
///
/// let sig = Signature::new()
///     .service_named("config", "config")
///     .value("table")
///     .default_value("limit", 10_u64);
/// assert_eq!(sig.len(), 3);
/// ```
#[derive(Clone, Debug, Default)]
pub struct Signature {
    params: Vec<Param>,
}

impl Signature {
    pub fn new() -> Self {
        Self::default()
    }

    /// A dependency on an [`Injectable`] type, resolved under its class name.
    pub fn service<T: Injectable>(self, name: &str) -> Self {
        self.service_named(name, T::NAME)
    }

    /// A dependency on an arbitrary abstract.
    pub fn service_named(self, name: &str, abstract_: &str) -> Self {
        self.push(name, ParamKind::Service(abstract_.to_owned()))
    }

    pub fn value(self, name: &str) -> Self {
        self.push(name, ParamKind::Value)
    }

    pub fn default_value<T>(self, name: &str, value: T) -> Self
    where
        T: Any + Clone + Send + Sync,
    {
        let producer: Producer = Arc::new(move || Arc::new(value.clone()) as Instance);
        self.push(name, ParamKind::Default(producer))
    }

    pub fn params(&self) -> &[Param] { &self.params }
    pub fn len(&self) -> usize { self.params.len() }
    pub fn is_empty(&self) -> bool { self.params.is_empty() }

    fn push(mut self, name: &str, kind: ParamKind) -> Self {
        self.params.push(Param { name: name.to_owned(), kind });
        self
    }
}

// ── Caller-supplied parameters ────────────────────────────────────────────────

/// Values a caller passes to `make_with` / `call_with`.
///
/// Named values match parameters by name. Whatever is left over is appended
/// after the matched arguments: named leftovers first, in insertion order,
/// then positional values.
#[derive(Clone, Default)]
pub struct Parameters {
    named: Vec<(String, Instance)>,
    positional: Vec<Instance>,
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<T: Any + Send + Sync>(self, name: &str, value: T) -> Self {
        self.with_instance(name, Arc::new(value))
    }

    /// Replaces an earlier value registered under the same name.
    pub fn with_instance(mut self, name: &str, value: Instance) -> Self {
        match self.named.iter_mut().find(|(k, _)| k == name) {
            Some(slot) => slot.1 = value,
            None => self.named.push((name.to_owned(), value)),
        }
        self
    }

    pub fn push<T: Any + Send + Sync>(mut self, value: T) -> Self {
        self.positional.push(Arc::new(value));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.named.is_empty() && self.positional.is_empty()
    }

    pub(crate) fn take(&mut self, name: &str) -> Option<Instance> {
        let idx = self.named.iter().position(|(k, _)| k == name)?;
        Some(self.named.remove(idx).1)
    }

    pub(crate) fn into_remaining(self) -> Vec<Instance> {
        self.named.into_iter().map(|(_, v)| v).chain(self.positional).collect()
    }
}

impl fmt::Debug for Parameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Parameters")
            .field("named", &self.named.iter().map(|(k, _)| k).collect::<Vec<_>>())
            .field("positional", &self.positional.len())
            .finish()
    }
}

// ── Resolved arguments ────────────────────────────────────────────────────────

/// The resolved argument pack handed to a constructor or method body.
pub struct Arguments {
    owner: String,
    matched: Vec<(String, Instance)>,
    extra: Vec<Instance>,
}

impl Arguments {
    pub(crate) fn new(owner: &str, matched: Vec<(String, Instance)>, extra: Vec<Instance>) -> Self {
        Self { owner: owner.to_owned(), matched, extra }
    }

    /// The raw resolved value for a declared parameter.
    pub fn instance(&self, name: &str) -> Result<Instance> {
        self.matched
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| Arc::clone(v))
            .ok_or_else(|| Error::unresolvable(name, &self.owner))
    }

    /// A shared dependency, downcast to its concrete type.
    pub fn service<T: Any + Send + Sync>(&self, name: &str) -> Result<Arc<T>> {
        self.instance(name)?
            .downcast::<T>()
            .map_err(|_| self.mismatch::<T>(name))
    }

    /// A cloned primitive value.
    pub fn value<T: Any + Clone>(&self, name: &str) -> Result<T> {
        let instance = self.instance(name)?;
        (*instance)
            .downcast_ref::<T>()
            .cloned()
            .ok_or_else(|| self.mismatch::<T>(name))
    }

    /// Values that did not match any declared parameter, in order.
    pub fn extra(&self) -> &[Instance] { &self.extra }

    /// Every argument in call order: matched ones, then extras.
    pub fn positional(&self) -> impl Iterator<Item = &Instance> {
        self.matched.iter().map(|(_, v)| v).chain(self.extra.iter())
    }

    pub fn len(&self) -> usize { self.matched.len() + self.extra.len() }
    pub fn is_empty(&self) -> bool { self.len() == 0 }

    fn mismatch<T>(&self, name: &str) -> Error {
        Error::BindingResolution(format!(
            "parameter [{name}] of {} is not a {}",
            self.owner,
            type_name::<T>(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_removes_named_value() {
        let mut params = Parameters::new().with("a", 1_i32).with("b", 2_i32);
        assert!(params.take("a").is_some());
        assert!(params.take("a").is_none());
        assert_eq!(params.into_remaining().len(), 1);
    }

    #[test]
    fn with_instance_replaces_same_name() {
        let params = Parameters::new().with("a", 1_i32).with("a", 5_i32);
        let rest = params.into_remaining();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].downcast_ref::<i32>(), Some(&5));
    }

    #[test]
    fn remaining_keeps_named_before_positional() {
        let params = Parameters::new().push("pos").with("named", "n");
        let rest = params.into_remaining();
        assert_eq!(rest[0].downcast_ref::<&str>(), Some(&"n"));
        assert_eq!(rest[1].downcast_ref::<&str>(), Some(&"pos"));
    }

    #[test]
    fn value_reports_type_mismatch() {
        let args = Arguments::new(
            "Widget",
            vec![("size".to_owned(), Arc::new(3_u8) as Instance)],
            Vec::new(),
        );
        assert_eq!(args.value::<u8>("size").unwrap(), 3);
        let err = args.value::<String>("size").unwrap_err();
        assert!(matches!(err, Error::BindingResolution(_)));
        assert!(args.instance("missing").is_err());
    }
}
