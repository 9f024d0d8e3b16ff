use crate::container::{Arguments, Injectable};
use crate::error::Result;
use crate::foundation::{Application, ServiceProvider};

use super::DatabaseManager;

/// Binds [`DatabaseManager`] as a shared service, also reachable as
/// `database`.
pub struct DatabaseServiceProvider;

impl Injectable for DatabaseServiceProvider {
    const NAME: &'static str = "DatabaseServiceProvider";

    fn construct(_: Arguments) -> Result<Self> {
        Ok(Self)
    }
}

impl ServiceProvider for DatabaseServiceProvider {
    fn register(&self, app: &Application) -> Result<()> {
        let container = app.container();
        container.register::<DatabaseManager>();
        container.singleton(DatabaseManager::NAME, None);
        container.alias("database", DatabaseManager::NAME);
        Ok(())
    }
}
