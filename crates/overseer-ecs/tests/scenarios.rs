//! End-to-end scenarios against the public API.

use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use overseer_ecs::prelude::*;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

struct Position;

impl ComponentKind for Position {
    type State = [f32; 3];
    const NAME: &'static str = "position";

    fn initialize() -> [f32; 3] {
        [0.0; 3]
    }
}

type Log = Rc<RefCell<Vec<String>>>;

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

#[test]
fn second_component_of_a_kind_replaces_the_first() {
    init_tracing();
    let mut manager = Manager::new();
    manager.add_entity("e1").unwrap();

    let first = manager.create_component::<Position>("e1").unwrap();
    let second = manager.create_component::<Position>("e1").unwrap();

    assert!(manager.has_component_of::<Position>("e1"));
    assert_eq!(manager.get_component_of::<Position>("e1").unwrap().id(), &second);
    assert!(manager.get_component(&first).is_none());
    assert_eq!(manager.world().components_of("e1").count(), 1);
}

#[test]
fn component_state_versions_track_writes() {
    let mut manager = Manager::new();
    manager.add_entity("e1").unwrap();
    let id = manager.create_component::<Position>("e1").unwrap();

    let mut component = manager.get_component_mut(&id).unwrap();
    let seen = component.version();
    component.set_state::<Position>([1.0, 2.0, 3.0]).unwrap();
    component
        .update_state::<Position, _>(|p| p[2] = 0.0)
        .unwrap();

    let component = manager.get_component(&id).unwrap();
    assert!(component.changed_since(seen));
    assert_eq!(component.version(), seen + 2);
    assert_eq!(component.state::<Position>(), Some(&[1.0, 2.0, 0.0]));
}

#[test]
fn entity_metadata_is_indexed() {
    let mut manager = Manager::new();
    for id in ["a", "b", "c"] {
        manager.add_entity(id).unwrap();
    }
    let entities = manager.world_mut().entities_mut();
    entities.set_name_of("a", "lamp").unwrap();
    entities.set_name_of("b", "lamp").unwrap();
    entities.add_tags_to("b", ["light", "selected"]).unwrap();
    entities.add_tags_to("c", ["light"]).unwrap();

    let entities = manager.world().entities();
    assert_eq!(entities.entities_named("lamp").count(), 2);
    assert_eq!(entities.entities_named(DEFAULT_ENTITY_NAME).collect::<Vec<_>>(), vec!["c"]);
    assert_eq!(entities.entities_tagged("light").collect::<Vec<_>>(), vec!["b", "c"]);

    manager.delete_entity("b");
    let entities = manager.world().entities();
    assert_eq!(entities.entities_named("lamp").collect::<Vec<_>>(), vec!["a"]);
    assert_eq!(entities.entities_tagged("light").collect::<Vec<_>>(), vec!["c"]);
    assert_eq!(entities.entities_tagged("selected").count(), 0);
}

#[test]
fn metadata_writes_on_unknown_entities_fail() {
    let mut manager = Manager::new();
    let err = manager
        .world_mut()
        .entities_mut()
        .set_name_of("ghost", "boo")
        .unwrap_err();
    assert_eq!(
        err,
        EcsError::UnknownEntity {
            entity: Identifier::from("ghost"),
        }
    );
    assert_eq!(manager.world().entities().tags("ghost").count(), 0);
}

// ---------------------------------------------------------------------------
// Hooks
// ---------------------------------------------------------------------------

struct Observer {
    name: &'static str,
    log: Log,
}

impl System for Observer {
    fn name(&self) -> &str {
        self.name
    }

    fn initialize(&mut self, _: &World) {
        self.log.borrow_mut().push(format!("{} initialize", self.name));
    }

    fn destroy(&mut self, _: &World) {
        self.log.borrow_mut().push(format!("{} destroy", self.name));
    }

    fn manager_will_add_entity(&mut self, _: &World, entity: &Identifier) {
        self.log.borrow_mut().push(format!("{} will_add {entity}", self.name));
    }

    fn manager_did_add_entity(&mut self, _: &World, entity: &Identifier) {
        self.log.borrow_mut().push(format!("{} did_add {entity}", self.name));
    }

    fn manager_will_delete_component(&mut self, _: &World, component: &Component) {
        self.log
            .borrow_mut()
            .push(format!("{} will_delete {}", self.name, component.kind()));
    }

    fn manager_did_delete_component(&mut self, _: &World, component: &Component) {
        self.log
            .borrow_mut()
            .push(format!("{} did_delete {}", self.name, component.kind()));
    }
}

#[test]
fn every_will_hook_precedes_every_did_hook() {
    init_tracing();
    let log = Log::default();
    let mut manager = Manager::new();
    for name in ["first", "second"] {
        manager
            .add_system(Observer {
                name,
                log: Rc::clone(&log),
            })
            .unwrap();
    }
    log.borrow_mut().clear();

    manager.add_entity("e1").unwrap();
    manager.create_component::<Position>("e1").unwrap();
    manager.delete_component_of::<Position>("e1").unwrap();

    assert_eq!(
        *log.borrow(),
        vec![
            "first will_add e1",
            "second will_add e1",
            "first did_add e1",
            "second did_add e1",
            "first will_delete position",
            "second will_delete position",
            "first did_delete position",
            "second did_delete position",
        ]
    );
}

#[test]
fn systems_are_initialized_and_destroyed_exactly_once() {
    let log = Log::default();
    let mut manager = Manager::new();
    let id = manager
        .add_system(Observer {
            name: "watcher",
            log: Rc::clone(&log),
        })
        .unwrap();
    manager.update(1.0).unwrap();
    manager.update(1.0).unwrap();
    manager.delete_system(id).unwrap();
    manager.delete_system(id).unwrap();

    assert_eq!(*log.borrow(), vec!["watcher initialize", "watcher destroy"]);
}

// ---------------------------------------------------------------------------
// Scheduling
// ---------------------------------------------------------------------------

/// Keeps the default type-derived name.
struct Ticker {
    ticks: Rc<RefCell<u32>>,
}

impl System for Ticker {
    fn update(&mut self, _: &mut UpdateContext<'_>) -> Result<(), EcsError> {
        *self.ticks.borrow_mut() += 1;
        Ok(())
    }
}

#[test]
fn two_instances_of_one_system_type_coexist() {
    let ticks = Rc::new(RefCell::new(0));
    let mut manager = Manager::new();
    let first = manager
        .add_system(Ticker {
            ticks: Rc::clone(&ticks),
        })
        .unwrap();
    let second = manager
        .add_system(Ticker {
            ticks: Rc::clone(&ticks),
        })
        .unwrap();
    assert_ne!(first, second);
    assert_eq!(manager.systems().name(first), manager.systems().name(second));

    manager.update(1.0).unwrap();
    assert_eq!(*ticks.borrow(), 2);
    assert_eq!(manager.last_diagnostics().order.len(), 2);

    assert!(manager.delete_system(first).unwrap().is_some());
    manager.update(1.0).unwrap();
    assert_eq!(*ticks.borrow(), 3);
    assert!(manager.has_system(second));
}

const CLOCK: ServiceKey<f64> = ServiceKey::new("clock");

struct Clock {
    elapsed: f64,
    log: Log,
}

impl System for Clock {
    fn name(&self) -> &str {
        "A"
    }

    fn services(&self) -> Vec<ServiceId> {
        vec![CLOCK.id()]
    }

    fn service(&self, service: ServiceId) -> Option<ServiceValue> {
        (service == CLOCK.id()).then(|| CLOCK.provide(self.elapsed))
    }

    fn update(&mut self, ctx: &mut UpdateContext<'_>) -> Result<(), EcsError> {
        self.elapsed += ctx.delta();
        self.log.borrow_mut().push("A update".to_owned());
        Ok(())
    }
}

struct Reader {
    seen: Rc<RefCell<Vec<f64>>>,
    log: Log,
}

impl System for Reader {
    fn name(&self) -> &str {
        "B"
    }

    fn update(&mut self, ctx: &mut UpdateContext<'_>) -> Result<(), EcsError> {
        let clock = ctx.service(&CLOCK)?;
        self.seen.borrow_mut().push(*clock);
        self.log.borrow_mut().push("B update".to_owned());
        Ok(())
    }
}

#[test]
fn consumer_pulls_clock_provider() {
    init_tracing();
    for provider_first in [true, false] {
        let log = Log::default();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut manager = Manager::new();
        let clock = Clock {
            elapsed: 0.0,
            log: Rc::clone(&log),
        };
        let reader = Reader {
            seen: Rc::clone(&seen),
            log: Rc::clone(&log),
        };
        let (a, b) = if provider_first {
            let a = manager.add_system(clock).unwrap();
            (a, manager.add_system(reader).unwrap())
        } else {
            let b = manager.add_system(reader).unwrap();
            (manager.add_system(clock).unwrap(), b)
        };

        manager.update(1.0).unwrap();

        assert_eq!(manager.systems().state(a), Some(SystemState::Updated));
        assert_eq!(manager.systems().state(b), Some(SystemState::Updated));
        assert_eq!(*log.borrow(), vec!["A update", "B update"]);
        assert_eq!(*seen.borrow(), vec![1.0]);
        assert_eq!(manager.last_diagnostics().order, vec!["A", "B"]);
        assert_eq!(*manager.service(&CLOCK).unwrap(), 1.0);
    }
}

#[test]
fn duplicate_providers_are_rejected() {
    let mut manager = Manager::new();
    manager
        .add_system(Clock {
            elapsed: 0.0,
            log: Log::default(),
        })
        .unwrap();

    struct OtherClock;

    impl System for OtherClock {
        fn services(&self) -> Vec<ServiceId> {
            vec![CLOCK.id()]
        }
    }

    let err = manager.add_system(OtherClock).unwrap_err();
    assert!(matches!(
        err,
        EcsError::DuplicatedService {
            service: "clock",
            ..
        }
    ));
    assert_eq!(manager.systems().len(), 1);
}

#[test]
fn mistyped_service_key_is_a_mismatch() {
    const WRONG: ServiceKey<u32> = ServiceKey::new("clock");

    let mut manager = Manager::new();
    manager
        .add_system(Clock {
            elapsed: 0.0,
            log: Log::default(),
        })
        .unwrap();
    manager.update(1.0).unwrap();

    let err = manager.service(&WRONG).unwrap_err();
    assert_eq!(
        err,
        EcsError::ServiceTypeMismatch {
            service: "clock",
            expected: "u32",
        }
    );
}

struct Panicker;

impl System for Panicker {
    fn name(&self) -> &str {
        "panicker"
    }

    fn update(&mut self, _: &mut UpdateContext<'_>) -> Result<(), EcsError> {
        panic!("update blew up");
    }
}

struct Quiet;

impl System for Quiet {
    fn name(&self) -> &str {
        "quiet"
    }
}

#[test]
fn structural_changes_fail_after_a_panicking_pass_until_the_next_one() {
    init_tracing();
    let mut manager = Manager::new();
    let quiet = manager.add_system(Quiet).unwrap();
    let panicker = manager.add_system(Panicker).unwrap();

    let unwound = panic::catch_unwind(AssertUnwindSafe(|| manager.update(1.0)));
    assert!(unwound.is_err());
    assert!(manager.systems().is_updating());
    assert_eq!(manager.systems().state(panicker), Some(SystemState::Updating));

    let err = manager.add_system(Clock {
        elapsed: 0.0,
        log: Log::default(),
    });
    assert_eq!(
        err.unwrap_err(),
        EcsError::MutationDuringPass {
            action: "add",
            system: "A".to_owned(),
        }
    );
    assert!(matches!(
        manager.delete_system(quiet),
        Err(EcsError::MutationDuringPass { action: "delete", .. })
    ));
    assert_eq!(
        manager.delete_system(SystemId(999)).unwrap_err(),
        EcsError::MutationDuringPass {
            action: "delete",
            system: "system#999".to_owned(),
        }
    );

    // The next pass drops the system that went down with the panic.
    manager.update(1.0).unwrap();
    assert!(!manager.has_system(panicker));
    assert!(manager.has_system(quiet));
    assert!(manager.delete_system(quiet).unwrap().is_some());
}

// ---------------------------------------------------------------------------
// Deferred commands
// ---------------------------------------------------------------------------

struct Reaper;

impl System for Reaper {
    fn name(&self) -> &str {
        "reaper"
    }

    fn update(&mut self, ctx: &mut UpdateContext<'_>) -> Result<(), EcsError> {
        let doomed: Vec<Identifier> = ctx.world().entities().entities_tagged("doomed").cloned().collect();
        for entity in doomed {
            ctx.commands().delete_entity(entity);
        }
        // Still visible until the pass is over.
        assert_eq!(ctx.world().entities().entities_tagged("doomed").count(), 1);
        Ok(())
    }
}

#[test]
fn deferred_deletes_apply_after_the_pass() {
    init_tracing();
    let mut manager = Manager::new();
    manager.add_entity("e1").unwrap();
    manager.add_entity("e2").unwrap();
    manager.create_component::<Position>("e1").unwrap();
    manager
        .world_mut()
        .entities_mut()
        .add_tags_to("e1", ["doomed"])
        .unwrap();
    manager.add_system(Reaper).unwrap();

    manager.update(1.0).unwrap();

    assert!(!manager.has_entity("e1"));
    assert!(manager.has_entity("e2"));
    assert_eq!(manager.world().component_count(), 0);
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[test]
fn config_deserializes_with_defaults() {
    let config: ManagerConfig = serde_json::from_str(r#"{ "id_seed": 9 }"#).unwrap();
    assert_eq!(config.default_entity_name, DEFAULT_ENTITY_NAME);
    assert_eq!(config.max_id_attempts, 8);
    assert_eq!(config.id_seed, Some(9));

    let mut a = Manager::with_config(config.clone());
    let mut b = Manager::with_config(config);
    assert_eq!(a.create_entity().unwrap(), b.create_entity().unwrap());
}
