//! Operating mode supervisor

use super::Application;
use crate::error::{ErrorClass, UplinkResult};
use tracing::{error, info, warn};

/// Builds a fresh application for one operating mode
pub type AppFactory = Box<dyn FnMut() -> UplinkResult<Application>>;

/// Cycles through application factories
///
/// When the running application fails, it is dropped along with everything it
/// owns and the next factory builds a replacement on the following pass.
pub struct AppRotator {
    factories: Vec<AppFactory>,
    next_index: usize,
    current: Option<Application>,
    rotations: u32,
}

impl AppRotator {
    pub fn new(factories: Vec<AppFactory>) -> Self {
        Self {
            factories,
            next_index: 0,
            current: None,
            rotations: 0,
        }
    }

    /// Number of applications built so far
    pub fn rotations(&self) -> u32 {
        self.rotations
    }

    pub fn current(&self) -> Option<&Application> {
        self.current.as_ref()
    }

    /// One pass: tick the running application, or replace it.
    ///
    /// Fails only when building an application hits a configuration error,
    /// which a rebuild cannot fix.
    pub fn tick(&mut self) -> UplinkResult<()> {
        if let Some(app) = self.current.as_mut() {
            match app.tick() {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!(app = %app.name(), error = %e, class = ?e.class(), "Application stopped");
                    self.current = None;
                }
            }
        }

        if self.factories.is_empty() {
            return Ok(());
        }

        let index = self.next_index % self.factories.len();
        self.next_index = self.next_index.wrapping_add(1);
        self.rotations += 1;

        let _span = crate::lifecycle_span!(factory = index, rotation = self.rotations).entered();
        let factory = &mut self.factories[index];
        let built = factory().and_then(|mut app| {
            app.init()?;
            Ok(app)
        });

        match built {
            Ok(app) => {
                info!(app = %app.name(), rotation = self.rotations, "Application started");
                self.current = Some(app);
                Ok(())
            }
            Err(e) if e.class() == ErrorClass::Configuration => {
                error!(factory = index, error = %e, "Application cannot start with this configuration");
                Err(e)
            }
            Err(e) => {
                warn!(factory = index, error = %e, class = ?e.class(), "Application failed to start");
                Ok(())
            }
        }
    }
}
