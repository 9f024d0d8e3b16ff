//! Server-side views with layouts and slots.
//!
//! ```text
//! resources/views/layouts/app.html      resources/views/home.html
//! ┌──────────────────────────────┐      ┌──────────────────────────┐
//! │ <title>{{ title }}</title>   │      │ <h1>{{ message }}</h1>   │
//! │ <main>@slot</main>           │ ◄──  └──────────────────────────┘
//! │ <nav>@slot(nav)</nav>        │ ◄──  View::new("menu")
//! └──────────────────────────────┘
//!
//! View::new("home").with("message", "hi").layout("layouts.app").slot("nav", menu)?
//! ```
//!
//! Rendering a view renders its slot views, then its own template, then, if
//! it has a layout (set in code or with `@extends(..)` in the template),
//! renders the layout with the child's output in the default slot. The
//! child's data stays visible in the layout. Layouts may extend further
//! layouts.

mod template;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use parking_lot::RwLock;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::trace;

use crate::error::{Error, Result};

pub use template::{Node, Template};

/// The slot a layout's child output is rendered into.
pub const DEFAULT_SLOT: &str = "slot";

const MAX_LAYOUT_DEPTH: usize = 32;

static SLOT_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_-]*$").expect("valid slot pattern"));

/// A named template plus the data, layout and slots to render it with.
#[derive(Clone, Debug, Default)]
pub struct View {
    name: String,
    data: Map<String, Value>,
    layout: Option<String>,
    slots: Vec<(String, View)>,
}

impl View {
    pub fn new(name: &str) -> Self {
        Self { name: name.to_owned(), ..Self::default() }
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.data.insert(key.to_owned(), value.into());
        self
    }

    pub fn with_data(mut self, data: Map<String, Value>) -> Self {
        self.data.extend(data);
        self
    }

    pub fn layout(mut self, name: &str) -> Self {
        self.layout = Some(name.to_owned());
        self
    }

    /// Fills the slot `name` with another view's output.
    pub fn slot(mut self, name: &str, view: View) -> Result<Self> {
        if !SLOT_NAME.is_match(name) {
            return Err(Error::InvalidArgument(format!("The slot name [{name}] is not valid")));
        }
        match self.slots.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = view,
            None => self.slots.push((name.to_owned(), view)),
        }
        Ok(self)
    }

    pub fn name(&self) -> &str { &self.name }
    pub fn data(&self) -> &Map<String, Value> { &self.data }

    pub fn render(&self, views: &ViewFactory) -> Result<String> {
        self.render_into(views, HashMap::new(), 0)
    }

    fn render_into(
        &self,
        views: &ViewFactory,
        mut slots: HashMap<String, String>,
        depth: usize,
    ) -> Result<String> {
        if depth > MAX_LAYOUT_DEPTH {
            return Err(Error::InvalidArgument(format!(
                "layout nesting deeper than {MAX_LAYOUT_DEPTH} at [{}]",
                self.name
            )));
        }

        for (name, view) in &self.slots {
            slots.insert(name.clone(), view.render(views)?);
        }

        let template = views.template(&self.name)?;
        let data = views.scope(&self.data);
        let output = template.render(&data, &slots);
        trace!(view = %self.name, depth, "view rendered");

        let Some(layout) = self.layout.as_deref().or(template.extends()) else {
            return Ok(output);
        };

        slots.insert(DEFAULT_SLOT.to_owned(), output);
        let parent = View { name: layout.to_owned(), data: self.data.clone(), ..View::default() };
        parent.render_into(views, slots, depth + 1)
    }
}

/// Locates templates on disk and holds data shared by every view.
#[derive(Debug)]
pub struct ViewFactory {
    root: PathBuf,
    extension: String,
    shared: RwLock<Map<String, Value>>,
}

impl ViewFactory {
    /// Templates live under `root`. `layouts.app` maps to `root/layouts/app.html`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            extension: "html".to_owned(),
            shared: RwLock::new(Map::new()),
        }
    }

    pub fn with_extension(mut self, extension: &str) -> Self {
        self.extension = extension.trim_start_matches('.').to_owned();
        self
    }

    pub fn root(&self) -> &Path { &self.root }

    pub fn path_for(&self, name: &str) -> PathBuf {
        let mut path = self.root.join(name.replace('.', "/"));
        path.set_extension(&self.extension);
        path
    }

    pub fn exists(&self, name: &str) -> bool {
        self.path_for(name).is_file()
    }

    pub fn template(&self, name: &str) -> Result<Template> {
        let path = self.path_for(name);
        if !path.is_file() {
            return Err(Error::FileNotFound(path));
        }
        Ok(Template::parse(&std::fs::read_to_string(&path)?))
    }

    /// Makes `key` available to every view. View data wins on conflicts.
    pub fn share(&self, key: &str, value: impl Into<Value>) {
        self.shared.write().insert(key.to_owned(), value.into());
    }

    pub fn make(&self, name: &str) -> View {
        View::new(name)
    }

    pub fn render(&self, view: &View) -> Result<String> {
        view.render(self)
    }

    fn scope(&self, data: &Map<String, Value>) -> Value {
        let mut merged = self.shared.read().clone();
        merged.extend(data.iter().map(|(k, v)| (k.clone(), v.clone())));
        Value::Object(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn views(files: &[(&str, &str)]) -> (tempfile::TempDir, ViewFactory) {
        let dir = tempfile::tempdir().unwrap();
        for (name, body) in files {
            let path = dir.path().join(name);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, body).unwrap();
        }
        let factory = ViewFactory::new(dir.path());
        (dir, factory)
    }

    #[test]
    fn renders_plain_view() {
        let (_dir, f) = views(&[("home.html", "<h1>{{ message }}</h1>")]);
        let out = View::new("home").with("message", "hi").render(&f).unwrap();
        assert_eq!(out, "<h1>hi</h1>");
    }

    #[test]
    fn child_output_fills_layout_default_slot() {
        let (_dir, f) = views(&[
            ("home.html", "<p>{{ message }}</p>"),
            ("layouts/app.html", "<title>{{ message }}</title><main>@slot</main>"),
        ]);
        let out = View::new("home")
            .with("message", "hello")
            .layout("layouts.app")
            .render(&f)
            .unwrap();
        assert_eq!(out, "<title>hello</title><main><p>hello</p></main>");
    }

    #[test]
    fn named_slot_view_lands_at_marker() {
        let (_dir, f) = views(&[
            ("page.html", "body"),
            ("partials/menu.html", "<a>{{ item }}</a>"),
            ("layouts/app.html", "<nav>@slot(content)</nav>|@slot"),
        ]);
        let menu = View::new("partials.menu").with("item", "Home");
        let out = View::new("page")
            .layout("layouts.app")
            .slot("content", menu)
            .unwrap()
            .render(&f)
            .unwrap();
        assert_eq!(out, "<nav><a>Home</a></nav>|body");
    }

    #[test]
    fn nested_layouts_via_extends() {
        let (_dir, f) = views(&[
            ("home.html", "@extends(layouts.app)home"),
            ("layouts/app.html", "@extends(layouts.base)<div>@slot</div>"),
            ("layouts/base.html", "<body>@slot</body>"),
        ]);
        assert_eq!(View::new("home").render(&f).unwrap(), "<body><div>home</div></body>");
    }

    #[test]
    fn self_extending_layout_is_an_error() {
        let (_dir, f) = views(&[("loop.html", "@extends(loop)x")]);
        assert!(matches!(View::new("loop").render(&f), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn missing_template_is_file_not_found() {
        let (_dir, f) = views(&[]);
        match View::new("nope.missing").render(&f) {
            Err(Error::FileNotFound(path)) => assert!(path.ends_with("nope/missing.html")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn invalid_slot_names_are_rejected() {
        assert!(View::new("a").slot("9lives", View::new("b")).is_err());
        assert!(View::new("a").slot("has space", View::new("b")).is_err());
        assert!(View::new("a").slot("x", View::new("b")).is_ok());
        assert!(View::new("a").slot("side-bar_2", View::new("b")).is_ok());
    }

    #[test]
    fn shared_data_is_overridden_by_view_data() {
        let (_dir, f) = views(&[("t.html", "{{ app }}/{{ who }}")]);
        f.share("app", "trellis");
        f.share("who", "shared");
        assert_eq!(View::new("t").with("who", "view").render(&f).unwrap(), "trellis/view");
    }
}
