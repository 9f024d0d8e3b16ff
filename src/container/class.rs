//! Class table entries.
//!
//! Rust has no runtime reflection, so every constructible type is described
//! up front: its name, whether it can be instantiated, the [`Signature`] of its
//! constructor, and the methods [`Callable`](super::Callable)s may target.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use super::{Arguments, Container, Instance, Signature};
use crate::error::{Error, Result};

/// Method name used when a bare class is called without a default method.
pub const INVOKE: &str = "invoke";

type Constructor = Arc<dyn Fn(Arguments) -> Result<Instance> + Send + Sync>;
type MethodBody =
    Arc<dyn Fn(&Container, Option<&Instance>, Arguments) -> Result<Instance> + Send + Sync>;

/// A type the container can build on its own.
///
/// ```rust
/// use std::sync::Arc;
/// use trellis::container::{Arguments, Container, Injectable, Signature};
///
/// struct Mailer { from: String }
///
/// impl Injectable for Mailer {
///     const NAME: &'static str = "Mailer";
///
///     fn signature() -> Signature {
///         Signature::new().default_value("from", String::from("noreply@example.com"))
///     }
///
///     fn construct(args: Arguments) -> trellis::Result<Self> {
///         Ok(Self { from: args.value("from")? })
///     }
/// }
///
/// let container = Container::new();
/// container.register::<Mailer>();
/// let mailer: Arc<Mailer> = container.get::<Mailer>().unwrap();
/// assert_eq!(mailer.from, "noreply@example.com");
/// ```
pub trait Injectable: Any + Send + Sync + Sized {
    /// The class name this type is registered and requested under.
    const NAME: &'static str;

    fn signature() -> Signature {
        Signature::new()
    }

    fn construct(args: Arguments) -> Result<Self>;

    /// Attach callable methods. Defaults to none.
    fn methods(class: Class) -> Class {
        class
    }
}

#[derive(Clone)]
pub(crate) struct ClassMethod {
    pub(crate) signature: Signature,
    pub(crate) is_static: bool,
    pub(crate) body: MethodBody,
}

#[derive(Clone)]
enum Kind {
    Interface,
    Concrete { signature: Signature, constructor: Constructor },
}

/// One entry in the container's class table.
#[derive(Clone)]
pub struct Class {
    name: String,
    kind: Kind,
    methods: HashMap<String, ClassMethod>,
}

impl Class {
    /// A concrete class with an explicit constructor.
    pub fn new<T, F>(name: &str, signature: Signature, constructor: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(Arguments) -> Result<T> + Send + Sync + 'static,
    {
        let constructor: Constructor =
            Arc::new(move |args: Arguments| constructor(args).map(|v| Arc::new(v) as Instance));
        Self {
            name: name.to_owned(),
            kind: Kind::Concrete { signature, constructor },
            methods: HashMap::new(),
        }
    }

    /// A name that can be bound but never built directly.
    pub fn interface(name: &str) -> Self {
        Self { name: name.to_owned(), kind: Kind::Interface, methods: HashMap::new() }
    }

    pub fn of<T: Injectable>() -> Self {
        T::methods(Self::new(T::NAME, T::signature(), T::construct))
    }

    /// Adds an instance method. The receiver is the value the container
    /// builds for this class.
    pub fn method<T, R, F>(mut self, name: &str, signature: Signature, body: F) -> Self
    where
        T: Any + Send + Sync,
        R: Any + Send + Sync,
        F: Fn(&T, Arguments) -> Result<R> + Send + Sync + 'static,
    {
        let class = self.name.clone();
        let body: MethodBody =
            Arc::new(move |_: &Container, receiver: Option<&Instance>, args: Arguments| {
                let receiver = receiver
                    .and_then(|r| (**r).downcast_ref::<T>())
                    .ok_or_else(|| {
                        Error::BindingResolution(format!(
                            "[{class}] has no receiver of the expected type"
                        ))
                    })?;
                body(receiver, args).map(|v| Arc::new(v) as Instance)
            });
        self.methods.insert(name.to_owned(), ClassMethod { signature, is_static: false, body });
        self
    }

    /// Adds a method that needs no receiver. It gets the container instead.
    pub fn static_method<R, F>(mut self, name: &str, signature: Signature, body: F) -> Self
    where
        R: Any + Send + Sync,
        F: Fn(&Container, Arguments) -> Result<R> + Send + Sync + 'static,
    {
        let body: MethodBody =
            Arc::new(move |container: &Container, _: Option<&Instance>, args: Arguments| {
                body(container, args).map(|v| Arc::new(v) as Instance)
            });
        self.methods.insert(name.to_owned(), ClassMethod { signature, is_static: true, body });
        self
    }

    pub fn name(&self) -> &str { &self.name }

    pub fn is_instantiable(&self) -> bool {
        matches!(self.kind, Kind::Concrete { .. })
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    pub(crate) fn method_entry(&self, name: &str) -> Option<&ClassMethod> {
        self.methods.get(name)
    }

    pub(crate) fn constructor(&self) -> Result<(&Signature, &Constructor)> {
        match &self.kind {
            Kind::Concrete { signature, constructor } => Ok((signature, constructor)),
            Kind::Interface => Err(Error::BindingResolution(format!(
                "The class \"{}\" is not instantiable",
                self.name
            ))),
        }
    }
}
