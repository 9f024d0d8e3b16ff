//! The service container.
//!
//! Abstracts are plain string identifiers. Each one has at most one
//! [`Binding`](Container::bindings) and at most one cached instance:
//!
//! ```text
//! make("Foo")
//!   ├─ cached and no parameters?         → cached instance
//!   ├─ not bound?                        → build class "Foo"
//!   ├─ bound to a factory                → factory(&container)
//!   └─ bound to class "Bar"              → build class "Bar"
//!   then, if shared and no parameters    → cache the result
//! ```
//!
//! Building a class walks its constructor [`Signature`] (see the
//! [`signature`] module docs) and resolves each dependency through `make`.
//!
//! The container is `Send + Sync`. Locks are held only to read or write the
//! tables, never while a constructor or factory runs, so constructors may
//! resolve further dependencies freely.

mod bound_method;
mod class;
mod signature;

use std::any::{Any, type_name};
use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::{Mutex, RwLock};
use tracing::trace;

use crate::error::{Error, Result};

pub use bound_method::{Callable, Function};
pub use class::{Class, INVOKE, Injectable};
pub use signature::{Arguments, Param, ParamKind, Parameters, Signature};

/// A resolved value. Concrete types are recovered with `downcast`.
pub type Instance = Arc<dyn Any + Send + Sync>;

type FactoryFn = Arc<dyn Fn(&Container) -> Result<Instance> + Send + Sync>;

/// An abstract id derived from a Rust type, for bindings that are not
/// [`Injectable`] classes.
pub fn abstract_of<T: ?Sized>() -> &'static str {
    type_name::<T>()
}

#[derive(Clone)]
enum Concrete {
    Class(String),
    Factory(FactoryFn),
}

#[derive(Clone)]
struct Binding {
    concrete: Concrete,
    shared: bool,
}

#[derive(Default)]
pub struct Container {
    bindings: RwLock<HashMap<String, Binding>>,
    instances: RwLock<HashMap<String, Instance>>,
    classes: RwLock<HashMap<String, Arc<Class>>>,
    // Per-thread stack of abstracts under construction.
    building: Mutex<HashMap<ThreadId, Vec<String>>>,
}

impl Container {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Class table ──────────────────────────────────────────────────────────

    /// Adds or replaces a class in the class table.
    pub fn register_class(&self, class: Class) {
        trace!(class = class.name(), "class registered");
        self.classes.write().insert(class.name().to_owned(), Arc::new(class));
    }

    pub fn register<T: Injectable>(&self) {
        self.register_class(Class::of::<T>());
    }

    pub fn has_class(&self, name: &str) -> bool {
        self.classes.read().contains_key(name)
    }

    fn class(&self, name: &str) -> Result<Arc<Class>> {
        self.classes
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::BindingResolution(format!("Target class [{name}] does not exist.")))
    }

    // ── Registration ─────────────────────────────────────────────────────────

    /// Binds `abstract_` to a class. `None` binds the abstract to itself.
    pub fn bind(&self, abstract_: &str, concrete: Option<&str>) {
        let concrete = Concrete::Class(concrete.unwrap_or(abstract_).to_owned());
        self.insert_binding(abstract_, concrete, false);
    }

    /// Like [`bind`](Self::bind), but resolved once and cached.
    pub fn singleton(&self, abstract_: &str, concrete: Option<&str>) {
        let concrete = Concrete::Class(concrete.unwrap_or(abstract_).to_owned());
        self.insert_binding(abstract_, concrete, true);
    }

    pub fn bind_if(&self, abstract_: &str, concrete: Option<&str>) {
        if !self.bound(abstract_) {
            self.bind(abstract_, concrete);
        }
    }

    pub fn singleton_if(&self, abstract_: &str, concrete: Option<&str>) {
        if !self.bound(abstract_) {
            self.singleton(abstract_, concrete);
        }
    }

    /// Binds `abstract_` to a factory that receives the container.
    pub fn bind_factory<T, F>(&self, abstract_: &str, factory: F)
    where
        T: Any + Send + Sync,
        F: Fn(&Container) -> Result<T> + Send + Sync + 'static,
    {
        self.insert_binding(abstract_, Concrete::Factory(wrap_factory(factory)), false);
    }

    pub fn singleton_factory<T, F>(&self, abstract_: &str, factory: F)
    where
        T: Any + Send + Sync,
        F: Fn(&Container) -> Result<T> + Send + Sync + 'static,
    {
        self.insert_binding(abstract_, Concrete::Factory(wrap_factory(factory)), true);
    }

    /// Makes `alias` resolve to whatever `abstract_` resolves to.
    ///
    /// The alias itself is not shared; caching follows `abstract_`.
    pub fn alias(&self, alias: &str, abstract_: &str) {
        let target = abstract_.to_owned();
        let factory: FactoryFn = Arc::new(move |c: &Container| c.make(&target));
        self.insert_binding(alias, Concrete::Factory(factory), false);
    }

    /// Stores `value` as the cached instance, bypassing resolution.
    pub fn instance<T: Any + Send + Sync>(&self, abstract_: &str, value: Arc<T>) -> Arc<T> {
        trace!(id = abstract_, "instance stored");
        self.instances
            .write()
            .insert(abstract_.to_owned(), Arc::clone(&value) as Instance);
        value
    }

    fn insert_binding(&self, abstract_: &str, concrete: Concrete, shared: bool) {
        self.forget_instance(abstract_);
        trace!(id = abstract_, shared, "binding registered");
        self.bindings
            .write()
            .insert(abstract_.to_owned(), Binding { concrete, shared });
    }

    // ── Queries ──────────────────────────────────────────────────────────────

    pub fn bound(&self, abstract_: &str) -> bool {
        self.bindings.read().contains_key(abstract_) || self.instances.read().contains_key(abstract_)
    }

    pub fn has(&self, abstract_: &str) -> bool {
        self.bound(abstract_)
    }

    pub fn is_shared(&self, abstract_: &str) -> bool {
        self.instances.read().contains_key(abstract_)
            || self.bindings.read().get(abstract_).is_some_and(|b| b.shared)
    }

    /// Every binding as `(abstract, shared)`, sorted by abstract.
    pub fn bindings(&self) -> Vec<(String, bool)> {
        let mut out: Vec<_> = self
            .bindings
            .read()
            .iter()
            .map(|(k, b)| (k.clone(), b.shared))
            .collect();
        out.sort();
        out
    }

    // ── Resolution ───────────────────────────────────────────────────────────

    pub fn make(&self, abstract_: &str) -> Result<Instance> {
        self.make_with(abstract_, Parameters::new())
    }

    /// Resolves `abstract_`, handing `parameters` to the constructor.
    ///
    /// Explicit parameters bypass the instance cache in both directions:
    /// a cached value is not returned and the result is not cached.
    pub fn make_with(&self, abstract_: &str, parameters: Parameters) -> Result<Instance> {
        let use_cache = parameters.is_empty();

        if use_cache {
            if let Some(instance) = self.instances.read().get(abstract_) {
                return Ok(Arc::clone(instance));
            }
        }

        let _guard = self.enter(abstract_)?;
        trace!(id = abstract_, "resolving");

        let binding = self.bindings.read().get(abstract_).cloned();
        let instance = match binding.map(|b| b.concrete) {
            Some(Concrete::Factory(factory)) => factory(self)?,
            Some(Concrete::Class(class)) => self.build(&class, parameters)?,
            None => self.build(abstract_, parameters)?,
        };

        if use_cache && self.is_shared(abstract_) {
            // A concurrent first resolution may have cached its value while
            // this one was building. The first cached value wins.
            let mut instances = self.instances.write();
            let cached = instances.entry(abstract_.to_owned()).or_insert(instance);
            return Ok(Arc::clone(cached));
        }

        Ok(instance)
    }

    /// Resolves and downcasts in one step.
    pub fn make_as<T: Any + Send + Sync>(&self, abstract_: &str) -> Result<Arc<T>> {
        self.make(abstract_)?.downcast::<T>().map_err(|_| {
            Error::BindingResolution(format!(
                "[{abstract_}] did not resolve to {}",
                type_name::<T>()
            ))
        })
    }

    /// Resolves an [`Injectable`] under its own class name.
    pub fn get<T: Injectable>(&self) -> Result<Arc<T>> {
        self.make_as::<T>(T::NAME)
    }

    /// A closure that resolves `abstract_` each time it is called.
    pub fn factory<'a>(&'a self, abstract_: &str) -> impl Fn() -> Result<Instance> + use<'a> {
        let abstract_ = abstract_.to_owned();
        move || self.make(&abstract_)
    }

    /// Builds a class straight from the class table.
    fn build(&self, name: &str, parameters: Parameters) -> Result<Instance> {
        let class = self.class(name)?;
        let (signature, constructor) = class.constructor()?;
        let args = self.resolve_arguments(signature, parameters, name)?;
        constructor(args)
    }

    fn resolve_arguments(
        &self,
        signature: &Signature,
        mut parameters: Parameters,
        owner: &str,
    ) -> Result<Arguments> {
        let mut matched = Vec::with_capacity(signature.len());

        for param in signature.params() {
            let value = if let Some(value) = parameters.take(param.name()) {
                value
            } else {
                match param.kind() {
                    ParamKind::Default(produce) => produce(),
                    ParamKind::Service(abstract_) => self.make(abstract_)?,
                    ParamKind::Value => return Err(Error::unresolvable(param.name(), owner)),
                }
            };
            matched.push((param.name().to_owned(), value));
        }

        Ok(Arguments::new(owner, matched, parameters.into_remaining()))
    }

    // ── Calling ──────────────────────────────────────────────────────────────

    pub fn call(&self, target: &Callable) -> Result<Instance> {
        self.call_with(target, Parameters::new())
    }

    /// Invokes `target`, injecting its declared parameters.
    pub fn call_with(&self, target: &Callable, parameters: Parameters) -> Result<Instance> {
        trace!(callable = ?target, "calling");
        match target {
            Callable::Function(function) => {
                let args = self.resolve_arguments(function.signature(), parameters, "Closure")?;
                function.invoke(self, args)
            }
            Callable::Method { class, method } => {
                let entry = self.method(class, method)?;
                let receiver = if entry.is_static { None } else { Some(self.make(class)?) };
                let owner = format!("{class}@{method}");
                let args = self.resolve_arguments(&entry.signature, parameters, &owner)?;
                (entry.body)(self, receiver.as_ref(), args)
            }
            Callable::Static { class, method } => {
                let entry = self.method(class, method)?;
                if !entry.is_static {
                    return Err(Error::InvalidArgument(format!(
                        "Non-static method [{class}@{method}] cannot be called statically."
                    )));
                }
                let owner = format!("{class}::{method}");
                let args = self.resolve_arguments(&entry.signature, parameters, &owner)?;
                (entry.body)(self, None, args)
            }
        }
    }

    /// Parses `target` and calls it.
    ///
    /// A bare class name falls back to `default_method`, or to [`INVOKE`] when
    /// the class defines it.
    pub fn call_str(
        &self,
        target: &str,
        parameters: Parameters,
        default_method: Option<&str>,
    ) -> Result<Instance> {
        self.call_with(&Callable::parse(target, default_method)?, parameters)
    }

    fn method(&self, class: &str, method: &str) -> Result<class::ClassMethod> {
        let entry = self.class(class)?;
        entry.method_entry(method).cloned().ok_or_else(|| {
            if method == INVOKE {
                Error::InvalidArgument(format!("Method not provided for [{class}]."))
            } else {
                Error::InvalidArgument(format!("Method [{class}@{method}] does not exist."))
            }
        })
    }

    // ── Cache management ─────────────────────────────────────────────────────

    pub fn forget_instance(&self, abstract_: &str) {
        self.instances.write().remove(abstract_);
    }

    pub fn forget_instances(&self) {
        self.instances.write().clear();
    }

    /// Drops every binding and cached instance. The class table is kept.
    pub fn flush(&self) {
        self.bindings.write().clear();
        self.instances.write().clear();
    }

    // ── Cycle detection ──────────────────────────────────────────────────────

    fn enter(&self, abstract_: &str) -> Result<BuildGuard<'_>> {
        let thread = thread::current().id();
        let mut building = self.building.lock();
        let stack = building.entry(thread).or_default();

        if stack.iter().any(|a| a == abstract_) {
            let mut chain = stack.join(" -> ");
            chain.push_str(" -> ");
            chain.push_str(abstract_);
            return Err(Error::BindingResolution(format!("circular dependency: {chain}")));
        }

        stack.push(abstract_.to_owned());
        Ok(BuildGuard { container: self, thread })
    }
}

/// Pops the build stack when a resolution finishes, successfully or not.
struct BuildGuard<'a> {
    container: &'a Container,
    thread: ThreadId,
}

impl Drop for BuildGuard<'_> {
    fn drop(&mut self) {
        let mut building = self.container.building.lock();
        if let Some(stack) = building.get_mut(&self.thread) {
            stack.pop();
            if stack.is_empty() {
                building.remove(&self.thread);
            }
        }
    }
}

fn wrap_factory<T, F>(factory: F) -> FactoryFn
where
    T: Any + Send + Sync,
    F: Fn(&Container) -> Result<T> + Send + Sync + 'static,
{
    Arc::new(move |c: &Container| factory(c).map(|v| Arc::new(v) as Instance))
}
