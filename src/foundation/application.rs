//! The application: a container plus the core services every app needs,
//! and the provider bootstrap.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, ReentrantMutex};
use tracing::{debug, error, info};

use crate::config::Repository;
use crate::container::{Container, Injectable};
use crate::database::DatabaseServiceProvider;
use crate::env::DotEnv;
use crate::error::{Error, Result};
use crate::request::Request;
use crate::response::Response;
use crate::router::Router;
use crate::status::Status;
use crate::view::ViewFactory;

use super::provider::{ProviderRecord, Providers, ServiceProvider, Step};

/// Container ids the application binds on construction.
pub mod ids {
    pub const BASE_PATH: &str = "base_path";
    pub const CONFIG: &str = "config";
    pub const ENV: &str = "env";
    pub const ROUTER: &str = "router";
    pub const VIEW: &str = "view";
}

/// An application rooted at a base directory:
///
/// ```text
/// <base>/.env
/// <base>/config/*.toml
/// <base>/resources/views/**/*.html
/// ```
///
/// Construct it, make provider types known with [`provider`](Self::provider),
/// then [`boot`](Self::boot). Providers listed under `app.providers` in the
/// configuration are declared during boot.
pub struct Application {
    base_path: PathBuf,
    container: Container,
    config: Arc<Repository>,
    env: Arc<DotEnv>,
    views: Arc<ViewFactory>,
    router: Arc<Router>,
    providers: Mutex<Providers>,
    bootstrapping: ReentrantMutex<()>,
    booted: AtomicBool,
}

impl Application {
    /// Loads `.env` and `config/` from `base_path`.
    pub fn new(base_path: impl Into<PathBuf>) -> Result<Self> {
        let base_path = base_path.into();
        let env = DotEnv::load(&base_path)?;
        let config = Repository::load(&base_path.join("config"))?;
        Ok(Self::from_parts(base_path, config, env))
    }

    /// Uses `config` as given. No files are read.
    pub fn with_config(base_path: impl Into<PathBuf>, config: Repository) -> Self {
        Self::from_parts(base_path.into(), config, DotEnv::default())
    }

    fn from_parts(base_path: PathBuf, config: Repository, env: DotEnv) -> Self {
        let views = ViewFactory::new(base_path.join("resources").join("views"));
        let app = Self {
            container: Container::new(),
            config: Arc::new(config),
            env: Arc::new(env),
            views: Arc::new(views),
            router: Arc::new(Router::new()),
            providers: Mutex::new(Providers::default()),
            bootstrapping: ReentrantMutex::new(()),
            booted: AtomicBool::new(false),
            base_path,
        };
        app.register_base_bindings();
        app.register_base_providers();
        app
    }

    fn register_base_bindings(&self) {
        let c = &self.container;
        c.instance(ids::BASE_PATH, Arc::new(self.base_path.clone()));
        c.instance(ids::CONFIG, Arc::clone(&self.config));
        c.instance(ids::ENV, Arc::clone(&self.env));
        c.instance(ids::VIEW, Arc::clone(&self.views));
        c.instance(ids::ROUTER, Arc::clone(&self.router));
    }

    fn register_base_providers(&self) {
        self.container.register::<DatabaseServiceProvider>();
        let mut providers = self.providers.lock();
        providers.catalog::<DatabaseServiceProvider>();
        providers.declare(DatabaseServiceProvider::NAME);
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    pub fn base_path(&self) -> &Path { &self.base_path }

    /// `relative` joined onto the base path.
    pub fn path(&self, relative: &str) -> PathBuf {
        self.base_path.join(relative)
    }

    pub fn container(&self) -> &Container { &self.container }
    pub fn config(&self) -> &Repository { &self.config }
    pub fn env(&self) -> &DotEnv { &self.env }
    pub fn views(&self) -> &ViewFactory { &self.views }
    pub fn router(&self) -> &Router { &self.router }

    pub fn is_booted(&self) -> bool {
        self.booted.load(Ordering::Acquire)
    }

    // ── Providers ────────────────────────────────────────────────────────────

    /// Makes provider type `P` known under `P::NAME`, so it can be declared
    /// by id in configuration or through [`register_provider`](Self::register_provider).
    /// Its instance is built by the container.
    pub fn provider<P: ServiceProvider + Injectable>(&self) -> &Self {
        self.container.register::<P>();
        self.providers.lock().catalog::<P>();
        self
    }

    /// Declares a known provider.
    ///
    /// Safe to call from inside another provider's `register` or `boot`: the
    /// running bootstrap picks the new record up. After the application has
    /// booted, the provider is registered and booted immediately.
    pub fn register_provider(&self, id: &str) -> Result<()> {
        {
            let mut providers = self.providers.lock();
            if !providers.is_known(id) {
                return Err(Error::BindingResolution(format!("Service provider [{id}] is not known.")));
            }
            if !providers.declare(id) {
                return Ok(());
            }
        }
        debug!(provider = id, "provider declared");

        if self.is_booted() {
            self.run_providers()?;
        }
        Ok(())
    }

    /// Declares an already built provider under `id`.
    pub fn register_provider_instance(&self, id: &str, provider: Arc<dyn ServiceProvider>) -> Result<()> {
        if !self.providers.lock().declare_instance(id, provider) {
            return Ok(());
        }
        debug!(provider = id, "provider declared");

        if self.is_booted() {
            self.run_providers()?;
        }
        Ok(())
    }

    /// Registers then boots `id`, skipping whichever step already happened.
    pub fn boot_provider(&self, id: &str) -> Result<()> {
        if self.providers.lock().record(id).is_none() {
            self.register_provider(id)?;
        }
        self.register_record(id)?;
        self.boot_record(id)
    }

    /// A snapshot of every declared provider, in declaration order.
    pub fn providers(&self) -> Vec<ProviderRecord> {
        self.providers.lock().records()
    }

    pub fn provider_record(&self, id: &str) -> Option<ProviderRecord> {
        self.providers.lock().record(id).cloned()
    }

    /// Declares the configured providers, registers every provider, then
    /// boots them. Repeats until no record is left unregistered or unbooted,
    /// so providers declared from inside `register` or `boot` are handled too.
    ///
    /// Calling it again after a successful boot does nothing.
    pub fn boot(&self) -> Result<()> {
        if self.is_booted() {
            return Ok(());
        }
        let _bootstrapping = self.bootstrapping.lock();
        if self.is_booted() {
            return Ok(());
        }

        for id in self.configured_providers()? {
            self.providers.lock().declare(&id);
        }

        self.run_providers()?;
        self.booted.store(true, Ordering::Release);
        info!(providers = self.providers.lock().len(), "application booted");
        Ok(())
    }

    fn configured_providers(&self) -> Result<Vec<String>> {
        Ok(self
            .config
            .get_as::<Vec<String>>("app.providers")
            .map_err(|e| Error::Config(format!("app.providers: {e}")))?
            .unwrap_or_default())
    }

    fn run_providers(&self) -> Result<()> {
        loop {
            let step = self.providers.lock().next_step();
            match step {
                Step::Register(id) => self.register_record(&id)?,
                Step::Boot(id)     => self.boot_record(&id)?,
                Step::Done         => return Ok(()),
            }
        }
    }

    fn register_record(&self, id: &str) -> Result<()> {
        let provider = self.resolve_provider(id)?;
        if !self.providers.lock().mark_registered(id) {
            return Ok(());
        }
        debug!(provider = id, "registering provider");
        provider.register(self).inspect_err(|_| {
            self.providers.lock().unmark_registered(id);
        })
    }

    fn boot_record(&self, id: &str) -> Result<()> {
        let provider = self.resolve_provider(id)?;
        if !self.providers.lock().mark_booted(id) {
            return Ok(());
        }
        debug!(provider = id, "booting provider");
        provider.boot(self).inspect_err(|_| {
            self.providers.lock().unmark_booted(id);
        })
    }

    /// The record's instance, resolving it through the container on first use.
    fn resolve_provider(&self, id: &str) -> Result<Arc<dyn ServiceProvider>> {
        let resolver = {
            let providers = self.providers.lock();
            if let Some(instance) = providers.instance(id) {
                return Ok(instance);
            }
            providers.resolver(id)?
        };

        // No lock held: the provider's constructor may use the application.
        let instance = resolver(&self.container)?;
        Ok(self.providers.lock().set_instance(id, instance))
    }

    // ── Requests ─────────────────────────────────────────────────────────────

    /// Routes one request to completion. Boots the application first if
    /// needed.
    pub fn handle(&self, request: Request) -> Response {
        if let Err(err) = self.boot() {
            error!(error = %err, "application failed to boot");
            return Response::builder()
                .status(Status::InternalServerError)
                .text(Status::InternalServerError.reason());
        }

        let response = self.router.resolve(self, &request);
        debug!(
            method = %request.method(),
            path = request.path(),
            status = response.status_code(),
            "request handled"
        );
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    use crate::container::{Arguments, Signature};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[derive(Default)]
    struct Log(Mutex<Vec<String>>);

    impl Log {
        fn push(&self, entry: &str) {
            self.0.lock().push(entry.to_owned());
        }

        fn entries(&self) -> Vec<String> {
            self.0.lock().clone()
        }
    }

    /// A provider that logs its hooks and optionally declares another
    /// provider from `register` or `boot`.
    macro_rules! provider {
        ($ty:ident $(, register => $on_register:expr)? $(, boot => $on_boot:expr)?) => {
            struct $ty {
                log: Arc<Log>,
            }

            impl Injectable for $ty {
                const NAME: &'static str = stringify!($ty);

                fn signature() -> Signature {
                    Signature::new().service_named("log", "log")
                }

                fn construct(args: Arguments) -> Result<Self> {
                    Ok(Self { log: args.service("log")? })
                }
            }

            impl ServiceProvider for $ty {
                fn register(&self, app: &Application) -> Result<()> {
                    self.log.push(concat!(stringify!($ty), ".register"));
                    $( app.register_provider($on_register)?; )?
                    Ok(())
                }

                fn boot(&self, app: &Application) -> Result<()> {
                    self.log.push(concat!(stringify!($ty), ".boot"));
                    $( app.register_provider($on_boot)?; )?
                    Ok(())
                }
            }
        };
    }

    provider!(Alpha);
    provider!(Beta, register => "Gamma");
    provider!(Gamma);
    provider!(Delta, boot => "Gamma");

    fn setup(providers: &[&str]) -> (Application, Arc<Log>) {
        let config = Repository::from_value(json!({ "app": { "providers": providers } }));
        let app = Application::with_config("/nonexistent", config);
        let log = app.container().instance("log", Arc::new(Log::default()));
        app.provider::<Alpha>()
            .provider::<Beta>()
            .provider::<Gamma>()
            .provider::<Delta>();
        (app, log)
    }

    #[test]
    fn registers_all_before_booting_any() {
        let (app, log) = setup(&["Alpha", "Gamma"]);
        app.boot().unwrap();
        assert_eq!(
            log.entries(),
            ["Alpha.register", "Gamma.register", "Alpha.boot", "Gamma.boot"]
        );
        assert!(app.is_booted());
    }

    #[test]
    fn provider_declared_during_register_is_picked_up() {
        let (app, log) = setup(&["Beta"]);
        app.boot().unwrap();
        assert_eq!(
            log.entries(),
            ["Beta.register", "Gamma.register", "Beta.boot", "Gamma.boot"]
        );
        let gamma = app.provider_record("Gamma").unwrap();
        assert!(gamma.is_registered() && gamma.is_booted());
    }

    #[test]
    fn provider_declared_during_boot_is_registered_and_booted() {
        let (app, log) = setup(&["Delta"]);
        app.boot().unwrap();
        assert_eq!(
            log.entries(),
            ["Delta.register", "Delta.boot", "Gamma.register", "Gamma.boot"]
        );
    }

    #[test]
    fn hooks_run_once() {
        let (app, log) = setup(&["Alpha"]);
        app.boot().unwrap();
        app.boot().unwrap();
        app.boot_provider("Alpha").unwrap();
        app.register_provider("Alpha").unwrap();
        assert_eq!(log.entries(), ["Alpha.register", "Alpha.boot"]);
    }

    #[test]
    fn boot_provider_before_boot_registers_first() {
        let (app, log) = setup(&[]);
        app.boot_provider("Gamma").unwrap();
        app.boot_provider("Gamma").unwrap();
        assert_eq!(log.entries(), ["Gamma.register", "Gamma.boot"]);
    }

    #[test]
    fn provider_declared_after_boot_runs_immediately() {
        let (app, log) = setup(&[]);
        app.boot().unwrap();
        app.register_provider("Alpha").unwrap();
        assert_eq!(log.entries(), ["Alpha.register", "Alpha.boot"]);
    }

    #[test]
    fn unknown_providers_are_errors() {
        let (app, _) = setup(&["Missing"]);
        assert!(matches!(app.boot(), Err(Error::BindingResolution(_))));

        let (app, _) = setup(&[]);
        assert!(matches!(app.register_provider("Missing"), Err(Error::BindingResolution(_))));
    }

    #[test]
    fn records_keep_declaration_order() {
        let (app, _) = setup(&["Gamma", "Alpha"]);
        app.boot().unwrap();
        let ids: Vec<_> = app.providers().iter().map(|r| r.id().to_owned()).collect();
        assert_eq!(ids, [DatabaseServiceProvider::NAME, "Gamma", "Alpha"]);
    }

    #[test]
    fn base_bindings_resolve() {
        let (app, _) = setup(&[]);
        let config = app.container().make_as::<Repository>(ids::CONFIG).unwrap();
        assert!(Arc::ptr_eq(&config, &app.config));
        assert!(app.container().make_as::<ViewFactory>(ids::VIEW).is_ok());
        assert!(app.container().make_as::<Router>(ids::ROUTER).is_ok());
        assert_eq!(
            *app.container().make_as::<PathBuf>(ids::BASE_PATH).unwrap(),
            PathBuf::from("/nonexistent")
        );
    }

    #[test]
    fn database_provider_is_a_base_provider() {
        let (app, _) = setup(&[]);
        app.boot().unwrap();
        let db = app.container().make_as::<crate::database::DatabaseManager>("database");
        assert!(db.is_ok());
    }

    /// Fails `failing_hook` on its first call only.
    struct Flaky {
        failing_hook: &'static str,
        failures: AtomicUsize,
    }

    impl Flaky {
        fn attempt(&self, hook: &str, app: &Application) -> Result<()> {
            if hook == self.failing_hook && self.failures.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(Error::Config(format!("{hook} failed")));
            }
            app.container().instance(&format!("flaky.{hook}"), Arc::new(()));
            Ok(())
        }
    }

    impl ServiceProvider for Flaky {
        fn register(&self, app: &Application) -> Result<()> {
            self.attempt("register", app)
        }

        fn boot(&self, app: &Application) -> Result<()> {
            self.attempt("boot", app)
        }
    }

    #[test]
    fn failed_hooks_run_again_on_the_next_boot() {
        for hook in ["register", "boot"] {
            let (app, _) = setup(&[]);
            let flaky = Arc::new(Flaky { failing_hook: hook, failures: AtomicUsize::new(0) });
            app.register_provider_instance("Flaky", Arc::clone(&flaky) as Arc<dyn ServiceProvider>)
                .unwrap();

            assert!(matches!(app.boot(), Err(Error::Config(_))));
            assert!(!app.is_booted());
            let record = app.provider_record("Flaky").unwrap();
            assert!(!record.is_booted());
            assert_eq!(record.is_registered(), hook == "boot");

            app.boot().unwrap();
            assert_eq!(flaky.failures.load(Ordering::SeqCst), 2);
            assert!(app.container().bound("flaky.register"));
            assert!(app.container().bound("flaky.boot"));
            let record = app.provider_record("Flaky").unwrap();
            assert!(record.is_registered() && record.is_booted());
        }
    }
}
