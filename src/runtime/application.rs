//! A set of components forming one operating mode

use super::{Component, ComponentState};
use crate::error::UplinkResult;
use crate::safe_list::{EntryId, SafeList};
use tracing::{debug, info, warn};

struct Slot {
    component: Box<dyn Component>,
    state: ComponentState,
}

/// Drives its components through the lifecycle
///
/// Components added or removed while ticking are merged between passes.
pub struct Application {
    name: String,
    components: SafeList<Slot>,
}

impl Application {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            components: SafeList::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queue a component; it joins the lifecycle on the next pass.
    pub fn add_component(&mut self, component: Box<dyn Component>) -> EntryId {
        self.components.queue_add(Slot {
            component,
            state: ComponentState::NotInitialized,
        })
    }

    pub fn remove_component(&mut self, id: EntryId) {
        self.components.queue_remove(id);
    }

    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    pub fn component_states(&self) -> Vec<(String, ComponentState)> {
        self.components
            .iter()
            .map(|(_, slot)| (slot.component.name().to_string(), slot.state))
            .collect()
    }

    /// Initialize every queued component, then post-initialize them.
    pub fn init(&mut self) -> UplinkResult<()> {
        self.components.synchronize();

        for (_, slot) in self.components.iter_mut() {
            if slot.state == ComponentState::NotInitialized {
                init_slot(slot)?;
            }
        }
        for (_, slot) in self.components.iter_mut() {
            if slot.state == ComponentState::Initialized {
                post_init_slot(slot)?;
            }
        }

        info!(app = %self.name, components = self.components.len(), "Application initialized");
        Ok(())
    }

    /// One scheduler pass over every component.
    pub fn tick(&mut self) -> UplinkResult<()> {
        self.components.synchronize();

        let mut finished = Vec::new();
        let mut result = Ok(());
        for (id, slot) in self.components.iter_mut() {
            let step = match slot.state {
                ComponentState::NotInitialized => init_slot(slot),
                ComponentState::Initialized => post_init_slot(slot),
                ComponentState::Active => tick_slot(slot),
                ComponentState::ToRemove => Ok(()),
            };
            if let Err(e) = step {
                warn!(app = %self.name, component = slot.component.name(), error = %e, "Component failed");
                result = Err(e);
                break;
            }
            if slot.state == ComponentState::ToRemove {
                finished.push(id);
            }
        }

        for id in finished {
            self.components.queue_remove(id);
        }
        for slot in self.components.synchronize() {
            debug!(component = slot.component.name(), "Component removed");
        }

        result
    }
}

fn init_slot(slot: &mut Slot) -> UplinkResult<()> {
    slot.component.init()?;
    slot.state = ComponentState::Initialized;
    Ok(())
}

fn post_init_slot(slot: &mut Slot) -> UplinkResult<()> {
    slot.component.post_init()?;
    slot.state = ComponentState::Active;
    Ok(())
}

fn tick_slot(slot: &mut Slot) -> UplinkResult<()> {
    slot.component.tick()?;
    if slot.component.wants_removal() {
        slot.state = ComponentState::ToRemove;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UplinkError;
    use std::cell::RefCell;
    use std::rc::Rc;

    type Log = Rc<RefCell<Vec<String>>>;

    struct Recorder {
        name: &'static str,
        log: Log,
        fail_tick_at: Option<usize>,
        remove_after: Option<usize>,
        ticks: usize,
    }

    impl Recorder {
        fn boxed(name: &'static str, log: &Log) -> Box<Self> {
            Box::new(Self {
                name,
                log: log.clone(),
                fail_tick_at: None,
                remove_after: None,
                ticks: 0,
            })
        }
    }

    impl Component for Recorder {
        fn name(&self) -> &str {
            self.name
        }

        fn init(&mut self) -> UplinkResult<()> {
            self.log.borrow_mut().push(format!("{}:init", self.name));
            Ok(())
        }

        fn post_init(&mut self) -> UplinkResult<()> {
            self.log.borrow_mut().push(format!("{}:post_init", self.name));
            Ok(())
        }

        fn tick(&mut self) -> UplinkResult<()> {
            self.ticks += 1;
            self.log.borrow_mut().push(format!("{}:tick", self.name));
            if self.fail_tick_at == Some(self.ticks) {
                return Err(UplinkError::aborted("recorder failed"));
            }
            Ok(())
        }

        fn wants_removal(&self) -> bool {
            self.remove_after.is_some_and(|n| self.ticks >= n)
        }
    }

    #[test]
    fn test_init_runs_all_inits_before_post_inits() {
        let log: Log = Rc::default();
        let mut app = Application::new("test");
        app.add_component(Recorder::boxed("a", &log));
        app.add_component(Recorder::boxed("b", &log));

        app.init().unwrap();

        assert_eq!(
            *log.borrow(),
            vec!["a:init", "b:init", "a:post_init", "b:post_init"]
        );
        assert!(app
            .component_states()
            .iter()
            .all(|(_, s)| *s == ComponentState::Active));
    }

    #[test]
    fn test_late_component_walks_lifecycle_across_ticks() {
        let log: Log = Rc::default();
        let mut app = Application::new("test");
        app.init().unwrap();

        app.add_component(Recorder::boxed("late", &log));
        app.tick().unwrap();
        app.tick().unwrap();
        app.tick().unwrap();

        assert_eq!(
            *log.borrow(),
            vec!["late:init", "late:post_init", "late:tick"]
        );
    }

    #[test]
    fn test_tick_error_aborts_pass() {
        let log: Log = Rc::default();
        let mut app = Application::new("test");
        let mut failing = Recorder::boxed("a", &log);
        failing.fail_tick_at = Some(2);
        app.add_component(failing);
        app.add_component(Recorder::boxed("b", &log));
        app.init().unwrap();

        app.tick().unwrap();
        log.borrow_mut().clear();

        assert!(app.tick().is_err());
        assert_eq!(*log.borrow(), vec!["a:tick"]);
    }

    #[test]
    fn test_component_removed_when_it_asks() {
        let log: Log = Rc::default();
        let mut app = Application::new("test");
        let mut temporary = Recorder::boxed("tmp", &log);
        temporary.remove_after = Some(1);
        app.add_component(temporary);
        app.add_component(Recorder::boxed("keep", &log));
        app.init().unwrap();

        app.tick().unwrap();
        assert_eq!(app.component_count(), 1);
        assert_eq!(app.component_states()[0].0, "keep");
    }

    #[test]
    fn test_explicit_removal() {
        let log: Log = Rc::default();
        let mut app = Application::new("test");
        let id = app.add_component(Recorder::boxed("a", &log));
        app.init().unwrap();
        assert_eq!(app.component_count(), 1);

        app.remove_component(id);
        app.tick().unwrap();
        assert_eq!(app.component_count(), 0);
    }
}
