//! Callable targets for [`Container::call`](super::Container::call).
//!
//! A target is decided once, when it is built, never re-parsed per call:
//!
//! | Built from            | Variant                          | Receiver                    |
//! |-----------------------|----------------------------------|-----------------------------|
//! | `Function::new(..)`   | `Callable::Function`             | none                        |
//! | `"Class@method"`      | `Callable::Method`               | `container.make("Class")`   |
//! | `"Class"`             | `Callable::Method` (`invoke`)    | `container.make("Class")`   |
//! | `"Class::method"`     | `Callable::Static`               | none                        |

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use super::class::INVOKE;
use super::{Arguments, Container, Instance, Signature};
use crate::error::{Error, Result};

type FunctionBody = Arc<dyn Fn(&Container, Arguments) -> Result<Instance> + Send + Sync>;

/// A free-standing closure with an explicit parameter list.
pub struct Function {
    signature: Signature,
    body: FunctionBody,
}

impl Function {
    pub fn new<R, F>(signature: Signature, body: F) -> Self
    where
        R: Any + Send + Sync,
        F: Fn(&Container, Arguments) -> Result<R> + Send + Sync + 'static,
    {
        let body: FunctionBody = Arc::new(move |container: &Container, args: Arguments| {
            body(container, args).map(|v| Arc::new(v) as Instance)
        });
        Self { signature, body }
    }

    pub fn signature(&self) -> &Signature { &self.signature }

    pub(crate) fn invoke(&self, container: &Container, args: Arguments) -> Result<Instance> {
        (self.body)(container, args)
    }
}

/// Something the container can invoke with injected arguments.
#[derive(Clone)]
pub enum Callable {
    Function(Arc<Function>),
    /// An instance method. The receiver is resolved through the container.
    Method { class: String, method: String },
    /// A method called without constructing a receiver.
    Static { class: String, method: String },
}

impl Callable {
    pub fn function<R, F>(signature: Signature, body: F) -> Self
    where
        R: Any + Send + Sync,
        F: Fn(&Container, Arguments) -> Result<R> + Send + Sync + 'static,
    {
        Self::Function(Arc::new(Function::new(signature, body)))
    }

    pub fn method(class: &str, method: &str) -> Self {
        Self::Method { class: class.to_owned(), method: method.to_owned() }
    }

    pub fn static_method(class: &str, method: &str) -> Self {
        Self::Static { class: class.to_owned(), method: method.to_owned() }
    }

    /// Parses `Class::method`, `Class@method` or a bare `Class`.
    ///
    /// A bare class calls `default_method`, or [`INVOKE`] when none is given.
    /// Whether the class really defines that method is checked at call time.
    pub fn parse(target: &str, default_method: Option<&str>) -> Result<Self> {
        let target = target.trim();

        let (class, method, is_static) = if let Some((class, method)) = target.rsplit_once("::") {
            (class, method, true)
        } else if let Some((class, method)) = target.rsplit_once('@') {
            (class, method, false)
        } else {
            (target, default_method.unwrap_or(INVOKE), false)
        };

        if class.is_empty() {
            return Err(Error::InvalidArgument(format!("No class provided in [{target}].")));
        }
        if method.is_empty() {
            return Err(Error::InvalidArgument(format!("Method not provided in [{target}].")));
        }

        Ok(if is_static {
            Self::static_method(class, method)
        } else {
            Self::method(class, method)
        })
    }

    /// Like [`parse`](Self::parse), but prefixes the class with `namespace`.
    pub fn parse_in(namespace: &str, target: &str) -> Result<Self> {
        let callable = Self::parse(target, None)?;
        if namespace.is_empty() {
            return Ok(callable);
        }
        Ok(match callable {
            Self::Method { class, method } => Self::Method { class: format!("{namespace}.{class}"), method },
            Self::Static { class, method } => Self::Static { class: format!("{namespace}.{class}"), method },
            function => function,
        })
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Function(_) => f.write_str("Closure"),
            Self::Method { class, method } => write!(f, "{class}@{method}"),
            Self::Static { class, method } => write!(f, "{class}::{method}"),
        }
    }
}

impl TryFrom<&str> for Callable {
    type Error = Error;

    fn try_from(target: &str) -> Result<Self> {
        Self::parse(target, None)
    }
}

impl From<Function> for Callable {
    fn from(function: Function) -> Self {
        Self::Function(Arc::new(function))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_instance_method() {
        let c = Callable::parse("HomeController@index", None).unwrap();
        assert!(matches!(c, Callable::Method { ref class, ref method }
            if class == "HomeController" && method == "index"));
    }

    #[test]
    fn parses_static_method() {
        let c = Callable::parse("Clock::now", None).unwrap();
        assert!(matches!(c, Callable::Static { ref class, ref method }
            if class == "Clock" && method == "now"));
    }

    #[test]
    fn bare_class_uses_default_then_invoke() {
        let c = Callable::parse("Handler", Some("handle")).unwrap();
        assert!(matches!(c, Callable::Method { ref method, .. } if method == "handle"));

        let c = Callable::parse("Handler", None).unwrap();
        assert!(matches!(c, Callable::Method { ref method, .. } if method == INVOKE));
    }

    #[test]
    fn rejects_missing_segments() {
        assert!(matches!(Callable::parse("Home@", None), Err(Error::InvalidArgument(_))));
        assert!(matches!(Callable::parse("::now", None), Err(Error::InvalidArgument(_))));
        assert!(matches!(Callable::parse("", None), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn namespace_prefixes_class() {
        let c = Callable::parse_in("controllers", "Home@index").unwrap();
        assert_eq!(format!("{c:?}"), "controllers.Home@index");
    }
}
