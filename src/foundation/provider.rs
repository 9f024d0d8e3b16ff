//! Service providers and their lifecycle records.
//!
//! ```text
//!  declared ──► registered ──► booted
//!     │             │            │
//!  record added  register()    boot()
//! ```
//!
//! Every transition happens at most once per record. Records are never
//! removed.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::container::{Container, Injectable};
use crate::error::{Error, Result};

use super::Application;

/// A unit that binds services into the application and sets them up.
///
/// `register` runs for every provider before any `boot`, so `boot` may rely
/// on bindings made by other providers.
pub trait ServiceProvider: Send + Sync {
    fn register(&self, _app: &Application) -> Result<()> {
        Ok(())
    }

    fn boot(&self, _app: &Application) -> Result<()> {
        Ok(())
    }
}

pub(crate) type Resolver =
    Arc<dyn Fn(&Container) -> Result<Arc<dyn ServiceProvider>> + Send + Sync>;

/// Lifecycle state for one provider id.
#[derive(Clone)]
pub struct ProviderRecord {
    id: String,
    instance: Option<Arc<dyn ServiceProvider>>,
    registered: bool,
    booted: bool,
}

impl ProviderRecord {
    fn new(id: &str) -> Self {
        Self { id: id.to_owned(), instance: None, registered: false, booted: false }
    }

    pub fn id(&self) -> &str { &self.id }
    pub fn is_resolved(&self) -> bool { self.instance.is_some() }
    pub fn is_registered(&self) -> bool { self.registered }
    pub fn is_booted(&self) -> bool { self.booted }
}

impl fmt::Debug for ProviderRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRecord")
            .field("id", &self.id)
            .field("resolved", &self.instance.is_some())
            .field("registered", &self.registered)
            .field("booted", &self.booted)
            .finish()
    }
}

/// The next lifecycle step the bootstrap loop should take.
pub(crate) enum Step {
    Register(String),
    Boot(String),
    Done,
}

/// Known provider types plus the records of declared providers, in
/// declaration order.
#[derive(Default)]
pub(crate) struct Providers {
    catalog: HashMap<String, Resolver>,
    records: Vec<ProviderRecord>,
}

impl Providers {
    pub(crate) fn catalog<P: ServiceProvider + Injectable>(&mut self) {
        let resolver: Resolver = Arc::new(|container: &Container| {
            let provider: Arc<dyn ServiceProvider> = container.get::<P>()?;
            Ok(provider)
        });
        self.catalog.insert(P::NAME.to_owned(), resolver);
    }

    pub(crate) fn is_known(&self, id: &str) -> bool {
        self.catalog.contains_key(id) || self.records.iter().any(|r| r.id == id)
    }

    pub(crate) fn resolver(&self, id: &str) -> Result<Resolver> {
        self.catalog
            .get(id)
            .cloned()
            .ok_or_else(|| Error::BindingResolution(format!("Service provider [{id}] is not known.")))
    }

    /// Adds a record for `id` unless one exists. Returns whether it was added.
    pub(crate) fn declare(&mut self, id: &str) -> bool {
        if self.records.iter().any(|r| r.id == id) {
            return false;
        }
        self.records.push(ProviderRecord::new(id));
        true
    }

    /// Adds a record with an already built provider.
    pub(crate) fn declare_instance(&mut self, id: &str, provider: Arc<dyn ServiceProvider>) -> bool {
        if !self.declare(id) {
            return false;
        }
        if let Some(record) = self.record_mut(id) {
            record.instance = Some(provider);
        }
        true
    }

    pub(crate) fn record(&self, id: &str) -> Option<&ProviderRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    fn record_mut(&mut self, id: &str) -> Option<&mut ProviderRecord> {
        self.records.iter_mut().find(|r| r.id == id)
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    pub(crate) fn records(&self) -> Vec<ProviderRecord> {
        self.records.clone()
    }

    pub(crate) fn instance(&self, id: &str) -> Option<Arc<dyn ServiceProvider>> {
        self.record(id).and_then(|r| r.instance.clone())
    }

    /// Stores `provider` unless the record already has an instance, and
    /// returns whichever instance the record ends up with.
    pub(crate) fn set_instance(&mut self, id: &str, provider: Arc<dyn ServiceProvider>) -> Arc<dyn ServiceProvider> {
        match self.record_mut(id) {
            Some(record) => Arc::clone(record.instance.get_or_insert(provider)),
            None => provider,
        }
    }

    /// Flags `id` as registered. Returns `false` if it already was.
    pub(crate) fn mark_registered(&mut self, id: &str) -> bool {
        match self.record_mut(id) {
            Some(record) if !record.registered => {
                record.registered = true;
                true
            }
            _ => false,
        }
    }

    /// Flags `id` as booted. Returns `false` if it already was.
    pub(crate) fn mark_booted(&mut self, id: &str) -> bool {
        match self.record_mut(id) {
            Some(record) if !record.booted => {
                record.booted = true;
                true
            }
            _ => false,
        }
    }

    /// Clears the flag set by [`mark_registered`](Self::mark_registered)
    /// when the hook failed, so the next bootstrap runs it again.
    pub(crate) fn unmark_registered(&mut self, id: &str) {
        if let Some(record) = self.record_mut(id) {
            record.registered = false;
        }
    }

    pub(crate) fn unmark_booted(&mut self, id: &str) {
        if let Some(record) = self.record_mut(id) {
            record.booted = false;
        }
    }

    /// Unregistered records come first so every `register` runs before the
    /// `boot` that follows it.
    pub(crate) fn next_step(&self) -> Step {
        if let Some(r) = self.records.iter().find(|r| !r.registered) {
            return Step::Register(r.id.clone());
        }
        if let Some(r) = self.records.iter().find(|r| !r.booted) {
            return Step::Boot(r.id.clone());
        }
        Step::Done
    }
}
