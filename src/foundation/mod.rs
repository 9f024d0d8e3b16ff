//! Application bootstrap: base bindings and the service provider lifecycle.

mod application;
mod provider;

pub use application::{Application, ids};
pub use provider::{ProviderRecord, ServiceProvider};
