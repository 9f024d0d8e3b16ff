//! # trellis
//!
//! A small web-application framework built around a service container.
//!
//! ## The pieces
//!
//! ```text
//! Server (hyper)
//!   └─ Application::handle
//!        ├─ boot: providers register, then boot (once)
//!        └─ Router: exact (method, path) lookup
//!             ├─ "Controller@method" → Container::call → handler output
//!             └─ View                 → ViewFactory::render
//! ```
//!
//! - [`container`]: bindings, singletons, aliases and dependency injection
//!   driven by declared [`Signature`](container::Signature)s.
//! - [`foundation`]: the [`Application`] and its [`ServiceProvider`]
//!   lifecycle.
//! - [`config`] and [`env`]: TOML configuration with dotted keys, and
//!   `.env` files.
//! - [`database`]: a fluent query builder over pooled connections.
//! - [`view`]: templates with layouts and named slots.
//! - [`support`]: HTML helpers, random strings and retry.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use trellis::container::{Arguments, Injectable};
//! use trellis::view::View;
//! use trellis::{Application, Server, ServiceProvider};
//!
//! struct RouteServiceProvider;
//!
//! impl Injectable for RouteServiceProvider {
//!     const NAME: &'static str = "RouteServiceProvider";
//!
//!     fn construct(_: Arguments) -> trellis::Result<Self> {
//!         Ok(Self)
//!     }
//! }
//!
//! impl ServiceProvider for RouteServiceProvider {
//!     fn boot(&self, app: &Application) -> trellis::Result<()> {
//!         app.router().view("/", View::new("home").layout("layouts.app"));
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> trellis::Result<()> {
//!     let app = Application::new(".")?;
//!     trellis::logging::init(app.config())?;
//!     app.provider::<RouteServiceProvider>()
//!         .register_provider(RouteServiceProvider::NAME)?;
//!
//!     Server::from_config(app.config()).serve(Arc::new(app)).await
//! }
//! ```

mod error;
mod handler;
mod method;
mod request;
mod response;
mod router;
mod server;
mod status;

pub mod config;
pub mod container;
pub mod database;
pub mod env;
pub mod foundation;
pub mod logging;
pub mod support;
pub mod view;

pub use error::{Error, Result};
pub use foundation::{Application, ServiceProvider};
pub use handler::{Action, IntoAction};
pub use method::Method;
pub use request::Request;
pub use response::{ContentType, IntoResponse, Response, ResponseBuilder};
pub use router::{NOT_FOUND_VIEW, Router};
pub use server::{DEFAULT_ADDRESS, Server};
pub use status::Status;
