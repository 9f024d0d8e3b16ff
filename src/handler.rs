//! Route actions and handler output.
//!
//! # What a route can point at
//!
//! The route table stores one type, [`Action`]. Everything a route may be
//! registered with converts into it through the sealed [`IntoAction`] trait,
//! once, at registration time:
//!
//! ```text
//! router.get("/", "HomeController@index")    → Action::Call(Callable::Method)
//! router.get("/ping", Callable::function(..)) → Action::Call(Callable::Function)
//! router.view("/about", View::new("about"))   → Action::View
//! ```
//!
//! # What a handler can return
//!
//! A called action produces an [`Instance`]. [`respond`] turns the types the
//! framework knows into a [`Response`]:
//!
//! | Output                     | Response                      |
//! |----------------------------|-------------------------------|
//! | [`Response`]               | as-is                         |
//! | [`View`]                   | rendered, `text/html`         |
//! | `serde_json::Value`        | `application/json`            |
//! | `String`, `&'static str`   | `text/plain`                  |
//! | [`Status`]                 | empty body with that status   |
//! | `()`                       | `204 No Content`              |

use std::any::type_name;

use serde_json::Value;

use crate::container::{Callable, Function, Instance};
use crate::error::{Error, Result};
use crate::response::{IntoResponse, Response};
use crate::status::Status;
use crate::view::{View, ViewFactory};

/// What a route runs.
#[derive(Clone, Debug)]
pub enum Action {
    /// Invoked through the container with injected arguments.
    Call(Callable),
    /// Rendered directly.
    View(View),
}

/// Implemented for everything a route can be registered with.
///
/// `namespace` is the router's controller namespace. Only controller
/// strings are affected by it.
pub trait IntoAction: private::Sealed {
    fn into_action(self, namespace: &str) -> Result<Action>;
}

mod private {
    pub trait Sealed {}

    impl Sealed for &str {}
    impl Sealed for String {}
    impl Sealed for crate::container::Callable {}
    impl Sealed for crate::container::Function {}
    impl Sealed for crate::view::View {}
    impl Sealed for super::Action {}
}

impl IntoAction for &str {
    fn into_action(self, namespace: &str) -> Result<Action> {
        Callable::parse_in(namespace, self).map(Action::Call)
    }
}

impl IntoAction for String {
    fn into_action(self, namespace: &str) -> Result<Action> {
        self.as_str().into_action(namespace)
    }
}

impl IntoAction for Callable {
    fn into_action(self, _: &str) -> Result<Action> {
        Ok(Action::Call(self))
    }
}

impl IntoAction for Function {
    fn into_action(self, _: &str) -> Result<Action> {
        Ok(Action::Call(self.into()))
    }
}

impl IntoAction for View {
    fn into_action(self, _: &str) -> Result<Action> {
        Ok(Action::View(self))
    }
}

impl IntoAction for Action {
    fn into_action(self, _: &str) -> Result<Action> {
        Ok(self)
    }
}

/// Converts a handler's output into a response.
///
/// Unknown output types are an error, which the router answers with `500`.
pub(crate) fn respond(output: Instance, views: &ViewFactory) -> Result<Response> {
    let output = match output.downcast::<Response>() {
        Ok(response) => return Ok((*response).clone()),
        Err(output) => output,
    };
    let output = match output.downcast::<View>() {
        Ok(view) => return view.render(views).map(Response::html),
        Err(output) => output,
    };
    let output = match output.downcast::<Value>() {
        Ok(value) => return Ok((*value).clone().into_response()),
        Err(output) => output,
    };
    let output = match output.downcast::<String>() {
        Ok(text) => return Ok(Response::text(text.as_str())),
        Err(output) => output,
    };
    let output = match output.downcast::<&'static str>() {
        Ok(text) => return Ok(Response::text(*text)),
        Err(output) => output,
    };
    let output = match output.downcast::<Status>() {
        Ok(status) => return Ok(status.into_response()),
        Err(output) => output,
    };
    if output.downcast::<()>().is_ok() {
        return Ok(().into_response());
    }

    Err(Error::InvalidArgument(format!(
        "handler output is not a response type (expected one of {}, {}, {}, String, &str, Status or ())",
        type_name::<Response>(),
        type_name::<View>(),
        type_name::<Value>(),
    )))
}
