//! A small trellis application: a controller, a route provider, views with
//! a layout and a named slot.
//!
//! Run with:
//!   TRELLIS_LOG=debug cargo run --example basic
//!
//! Try:
//!   curl http://localhost:8000/?name=alice
//!   curl http://localhost:8000/about
//!   curl http://localhost:8000/status
//!   curl -X POST http://localhost:8000/echo -d 'hello'
//!   curl http://localhost:8000/missing

use std::sync::Arc;

use serde_json::json;
use trellis::container::{Arguments, Callable, Class, Injectable, Signature};
use trellis::env::DotEnv;
use trellis::foundation::ids;
use trellis::support::str::random;
use trellis::view::View;
use trellis::{Application, Request, Response, Server, ServiceProvider, Status, logging};

// ── Controller ────────────────────────────────────────────────────────────────

struct HomeController {
    env: Arc<DotEnv>,
}

impl Injectable for HomeController {
    const NAME: &'static str = "controllers.HomeController";

    fn signature() -> Signature {
        Signature::new().service_named("env", ids::ENV)
    }

    fn construct(args: Arguments) -> trellis::Result<Self> {
        Ok(Self { env: args.service("env")? })
    }

    fn methods(class: Class) -> Class {
        class
            .method("index", Signature::new().value("request"), |c: &HomeController, args| {
                let request: Request = args.value("request")?;
                c.index(&request)
            })
            .method("status", Signature::new(), |c: &HomeController, _| Ok(c.status()))
    }
}

impl HomeController {
    fn index(&self, request: &Request) -> trellis::Result<View> {
        View::new("home")
            .with("title", self.env.get_or("APP_NAME", "trellis"))
            .with("greeting", self.env.get_or("GREETING", "Hi"))
            .with("name", request.query_param("name").unwrap_or("stranger"))
            .with("token", random(16)?)
            .layout("layouts.app")
            .slot("nav", View::new("partials.nav"))
    }

    fn status(&self) -> serde_json::Value {
        json!({ "app": self.env.get("APP_NAME"), "ok": true })
    }
}

// ── Routes ────────────────────────────────────────────────────────────────────

struct RouteServiceProvider;

impl Injectable for RouteServiceProvider {
    const NAME: &'static str = "RouteServiceProvider";

    fn construct(_: Arguments) -> trellis::Result<Self> {
        Ok(Self)
    }
}

impl ServiceProvider for RouteServiceProvider {
    fn register(&self, app: &Application) -> trellis::Result<()> {
        app.container().register::<HomeController>();
        Ok(())
    }

    fn boot(&self, app: &Application) -> trellis::Result<()> {
        let router = app.router();
        router.set_namespace("controllers");

        router
            .get("/", "HomeController@index")?
            .get("/status", "HomeController@status")?
            .post("/echo", Callable::function(Signature::new().value("request"), |_, args| {
                let request: Request = args.value("request")?;
                Ok(Response::builder()
                    .status(Status::Ok)
                    .text(String::from_utf8_lossy(request.body()).into_owned()))
            }))?;

        router.view(
            "/about",
            View::new("about").with("title", "About").slot("nav", View::new("partials.nav"))?,
        );
        Ok(())
    }
}

#[tokio::main]
async fn main() -> trellis::Result<()> {
    let app = Application::new(concat!(env!("CARGO_MANIFEST_DIR"), "/demos/app"))?;
    logging::init(app.config())?;

    app.provider::<RouteServiceProvider>()
        .register_provider(RouteServiceProvider::NAME)?;

    Server::from_config(app.config()).serve(Arc::new(app)).await
}
