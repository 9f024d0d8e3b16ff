//! End-to-end: an application directory on disk, providers from config,
//! controllers, views and a database driver, driven through `handle`.

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tempfile::TempDir;
use trellis::container::{Arguments, Callable, Class, Injectable, Signature};
use trellis::database::{Connection, DatabaseManager, Grammar, Row};
use trellis::view::View;
use trellis::{Application, Method, Request, ServiceProvider};

// ── Fixtures ──────────────────────────────────────────────────────────────────

fn write(base: &Path, relative: &str, contents: &str) {
    let path = base.join(relative);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
}

fn site() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path();

    write(base, ".env", "APP_NAME=\"Blog\"\nGREETING=Welcome\n");
    write(
        base,
        "config/app.toml",
        r#"
name = "Blog"
providers = ["BlogServiceProvider"]
"#,
    );
    write(
        base,
        "config/database.toml",
        r#"
default = "memory"

[connections.memory]
driver = "memory"
"#,
    );
    write(
        base,
        "resources/views/layouts/app.html",
        "<title>{{ title }}</title><aside>@slot(sidebar)</aside><main>@slot</main>",
    );
    write(base, "resources/views/home.html", "<h1>{{ greeting }}</h1>");
    write(base, "resources/views/sidebar.html", "<ul><li>{{ title }}</li></ul>");
    write(base, "resources/views/errors/404.html", "gone: {{ path }}");
    dir
}

/// Records statements and answers every select with the same rows.
#[derive(Default)]
struct Memory {
    log: Mutex<Vec<(String, Vec<Value>)>>,
}

impl Connection for Memory {
    fn grammar(&self) -> Grammar {
        Grammar::MySql
    }

    fn select(&self, sql: &str, bindings: &[Value]) -> trellis::Result<Vec<Row>> {
        self.log.lock().push((sql.to_owned(), bindings.to_vec()));
        let row = json!({ "id": 1, "title": "First post" });
        Ok(vec![row.as_object().cloned().unwrap_or_default()])
    }

    fn statement(&self, sql: &str, bindings: &[Value]) -> trellis::Result<u64> {
        self.log.lock().push((sql.to_owned(), bindings.to_vec()));
        Ok(1)
    }
}

struct PostController {
    db: Arc<DatabaseManager>,
}

impl Injectable for PostController {
    const NAME: &'static str = "controllers.PostController";

    fn signature() -> Signature {
        Signature::new().service::<DatabaseManager>("db")
    }

    fn construct(args: Arguments) -> trellis::Result<Self> {
        Ok(Self { db: args.service("db")? })
    }

    fn methods(class: Class) -> Class {
        class
            .method("index", Signature::new(), |c: &PostController, _| {
                let rows = c.db.table("posts")?.where_eq("published", true).get()?;
                Ok(Value::Array(rows.into_iter().map(Value::Object).collect()))
            })
            .method("store", Signature::new().value("request"), |c: &PostController, args| {
                let request: Request = args.value("request")?;
                let post: Value = serde_json::from_slice(request.body())?;
                c.db.table("posts")?.insert(post)?;
                Ok(trellis::Status::Created)
            })
    }
}

struct BlogServiceProvider {
    memory: Arc<Memory>,
}

impl Injectable for BlogServiceProvider {
    const NAME: &'static str = "BlogServiceProvider";

    fn signature() -> Signature {
        Signature::new().service_named("memory", "memory")
    }

    fn construct(args: Arguments) -> trellis::Result<Self> {
        Ok(Self { memory: args.service("memory")? })
    }
}

impl ServiceProvider for BlogServiceProvider {
    fn register(&self, app: &Application) -> trellis::Result<()> {
        let memory = Arc::clone(&self.memory);
        app.container()
            .get::<DatabaseManager>()?
            .extend("memory", move |_, _| Ok(Arc::clone(&memory) as Arc<dyn Connection>));
        app.container().register::<PostController>();
        Ok(())
    }

    fn boot(&self, app: &Application) -> trellis::Result<()> {
        let router = app.router();
        router.set_namespace("controllers");
        router.get("/posts", "PostController@index")?.post("/posts", "PostController@store")?;

        let greeting = app.env().get_or("GREETING", "Hi");
        router.view(
            "/",
            View::new("home")
                .with("title", "Blog")
                .with("greeting", greeting)
                .layout("layouts.app")
                .slot("sidebar", View::new("sidebar").with("title", "Archive"))?,
        );
        router.get(
            "/config",
            Callable::function(Signature::new().service_named("config", "config"), |_, args| {
                let config: Arc<trellis::config::Repository> = args.service("config")?;
                Ok(json!({ "name": config.get("app.name") }))
            }),
        )?;
        Ok(())
    }
}

fn boot(dir: &TempDir) -> (Application, Arc<Memory>) {
    let app = Application::new(dir.path()).unwrap();
    let memory = Arc::new(Memory::default());
    app.container().instance("memory", Arc::clone(&memory));
    app.provider::<BlogServiceProvider>();
    app.boot().unwrap();
    (app, memory)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[test]
fn configured_providers_register_and_boot() {
    let dir = site();
    let (app, _) = boot(&dir);

    let ids: Vec<_> = app.providers().iter().map(|p| p.id().to_owned()).collect();
    assert_eq!(ids, ["DatabaseServiceProvider", "BlogServiceProvider"]);
    assert!(app.providers().iter().all(|p| p.is_registered() && p.is_booted()));
    assert!(app.router().has(Method::Get, "/posts"));
}

#[test]
fn view_route_renders_layout_and_slots() {
    let dir = site();
    let (app, _) = boot(&dir);

    let res = app.handle(Request::get("/"));
    assert_eq!(res.status_code(), 200);
    assert_eq!(
        res.text_body(),
        "<title>Blog</title><aside><ul><li>Archive</li></ul></aside><main><h1>Welcome</h1></main>"
    );
}

#[test]
fn controller_queries_the_configured_connection() {
    let dir = site();
    let (app, memory) = boot(&dir);

    let res = app.handle(Request::get("/posts"));
    assert_eq!(res.header("content-type"), Some("application/json"));
    assert_eq!(res.text_body(), r#"[{"id":1,"title":"First post"}]"#);

    let log = memory.log.lock().clone();
    assert_eq!(log, [("SELECT * FROM `posts` WHERE `published` = ?".to_owned(), vec![json!(true)])]);
}

#[test]
fn controller_receives_the_request() {
    let dir = site();
    let (app, memory) = boot(&dir);

    let req = Request::new(Method::Post, "/posts").with_body(r#"{"title":"Second"}"#);
    assert_eq!(app.handle(req).status_code(), 201);

    let log = memory.log.lock().clone();
    assert_eq!(log[0].0, "INSERT INTO `posts` (`title`) VALUES (?)");
    assert_eq!(log[0].1, [json!("Second")]);
}

#[test]
fn bad_request_body_is_a_server_error() {
    let dir = site();
    let (app, _) = boot(&dir);

    let req = Request::new(Method::Post, "/posts").with_body("not json");
    assert_eq!(app.handle(req).status_code(), 500);
}

#[test]
fn closures_receive_injected_services() {
    let dir = site();
    let (app, _) = boot(&dir);
    assert_eq!(app.handle(Request::get("/config")).text_body(), r#"{"name":"Blog"}"#);
}

#[test]
fn unknown_paths_render_the_404_view() {
    let dir = site();
    let (app, _) = boot(&dir);

    let res = app.handle(Request::get("/nope"));
    assert_eq!(res.status_code(), 404);
    assert_eq!(res.text_body(), "gone: /nope");
}

#[test]
fn unknown_configured_provider_fails_every_request() {
    let dir = site();
    write(dir.path(), "config/app.toml", "providers = [\"Nope\"]\n");

    let app = Application::new(dir.path()).unwrap();
    assert!(app.boot().is_err());
    assert!(!app.is_booted());
    assert_eq!(app.handle(Request::get("/")).status_code(), 500);
}
