//! Exact-match request router.
//!
//! One flat table keyed by `(method, path)`. No path parameters, no pattern
//! matching: a request either names a registered path exactly or gets a 404.
//!
//! Routes are usually registered by a service provider during boot:
//!
//! ```rust
//! use trellis::{Method, Router};
//! use trellis::view::View;
//!
//! let router = Router::new();
//! router.set_namespace("controllers");
//! router.get("/", "HomeController@index").unwrap();
//! router.view("/about", View::new("about"));
//!
//! assert!(router.has(Method::Get, "/about"));
//! ```

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::{debug, error, warn};

use crate::container::Parameters;
use crate::error::Result;
use crate::foundation::Application;
use crate::handler::{Action, IntoAction, respond};
use crate::method::Method;
use crate::request::Request;
use crate::response::Response;
use crate::status::Status;
use crate::view::View;

/// The view rendered for unmatched routes, when it exists.
pub const NOT_FOUND_VIEW: &str = "errors.404";

#[derive(Default)]
pub struct Router {
    routes: RwLock<HashMap<(Method, String), Action>>,
    namespace: RwLock<String>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prefix for controller strings registered from now on.
    pub fn set_namespace(&self, namespace: &str) {
        *self.namespace.write() = namespace.trim_matches('.').to_owned();
    }

    pub fn namespace(&self) -> String {
        self.namespace.read().clone()
    }

    /// Registers `action` for `method` and `path`, replacing any previous
    /// route for the pair.
    pub fn on(&self, method: Method, path: &str, action: impl IntoAction) -> Result<&Self> {
        let action = action.into_action(&self.namespace.read())?;
        let path = normalize(path);
        debug!(%method, path = %path, ?action, "route registered");
        self.routes.write().insert((method, path), action);
        Ok(self)
    }

    pub fn get(&self, path: &str, action: impl IntoAction) -> Result<&Self> {
        self.on(Method::Get, path, action)
    }

    pub fn post(&self, path: &str, action: impl IntoAction) -> Result<&Self> {
        self.on(Method::Post, path, action)
    }

    pub fn put(&self, path: &str, action: impl IntoAction) -> Result<&Self> {
        self.on(Method::Put, path, action)
    }

    pub fn patch(&self, path: &str, action: impl IntoAction) -> Result<&Self> {
        self.on(Method::Patch, path, action)
    }

    pub fn delete(&self, path: &str, action: impl IntoAction) -> Result<&Self> {
        self.on(Method::Delete, path, action)
    }

    /// A `GET` route that renders `view` without a controller.
    pub fn view(&self, path: &str, view: View) -> &Self {
        self.routes.write().insert((Method::Get, normalize(path)), Action::View(view));
        self
    }

    pub fn has(&self, method: Method, path: &str) -> bool {
        self.routes.read().contains_key(&(method, normalize(path)))
    }

    /// Every registered `(method, path)`, sorted.
    pub fn routes(&self) -> Vec<(Method, String)> {
        let mut routes: Vec<_> = self.routes.read().keys().cloned().collect();
        routes.sort();
        routes
    }

    /// Runs the route matching `request`.
    ///
    /// A controller or closure is called through the container with the
    /// request available as the `request` parameter. Failures become `500`,
    /// misses become `404`.
    pub fn resolve(&self, app: &Application, request: &Request) -> Response {
        let key = (request.method(), normalize(request.path()));
        let action = self.routes.read().get(&key).cloned();

        let Some(action) = action else {
            return not_found(app, request);
        };

        let result = match action {
            Action::View(view) => view.render(app.views()).map(Response::html),
            Action::Call(callable) => {
                let parameters = Parameters::new().with("request", request.clone());
                app.container()
                    .call_with(&callable, parameters)
                    .and_then(|output| respond(output, app.views()))
            }
        };

        result.unwrap_or_else(|err| {
            error!(method = %request.method(), path = request.path(), error = %err, "request failed");
            Response::builder()
                .status(Status::InternalServerError)
                .text(Status::InternalServerError.reason())
        })
    }
}

fn not_found(app: &Application, request: &Request) -> Response {
    debug!(method = %request.method(), path = request.path(), "no route");

    let views = app.views();
    if views.exists(NOT_FOUND_VIEW) {
        match View::new(NOT_FOUND_VIEW).with("path", request.path()).render(views) {
            Ok(html) => return Response::builder().status(Status::NotFound).html(html),
            Err(err) => warn!(error = %err, "404 view failed to render"),
        }
    }
    Response::builder().status(Status::NotFound).text(Status::NotFound.reason())
}

/// `users/` and `/users` are both `/users`. The root stays `/`.
fn normalize(path: &str) -> String {
    let trimmed = path.trim().trim_matches('/');
    format!("/{trimmed}")
}
