//! Simulation runner: one world's state, systems and step loop.
//!
//! Every step:
//!
//! 1. Apply worlds injected since the last step.
//! 2. Apply a pending reset.
//! 3. If unpaused (or a paused step was forced): run every system's
//!    `pre_update`, `update` and `post_update` in attachment order, apply
//!    queued entity removals, then advance the iteration counter and sim time.
//! 4. Publish [`WorldStatistics`] and apply events emitted by systems.
//!
//! A server steps all of its runners on one thread through [`drive`]; the
//! runner's control methods may be called from any thread at any time.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde_json::{Value, json};
use sim_ecs::components::{PHYSICS, WORLD};
use sim_ecs::{Entity, EntityComponentManager};
use sim_msgs::{MessageBus, WorldStatistics, topics};
use sim_system::{EventManager, LoadedSystem, SimEvent, System, SystemLoader, UpdateInfo};
use sim_world::{EntityDescription, PhysicsDescription, PluginDescription, WorldSpec};
use tracing::{debug, info, warn};

/// How long [`drive`] sleeps when no runner is due and none made progress.
const IDLE_SLEEP: Duration = Duration::from_millis(1);

/// Used when a world's step size cannot be represented.
const FALLBACK_STEP_SIZE: Duration = Duration::from_millis(1);

/// Whether a runner is inside [`drive`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    Stopped,
    Running,
}

struct AttachedSystem {
    name: String,
    system: Box<dyn System>,
}

/// A system loaded while running, attached once the run ends.
struct DeferredSystem {
    entity: Entity,
    loaded: LoadedSystem,
}

struct Pacing {
    period: Duration,
    overridden: bool,
}

struct SimState {
    ecm: EntityComponentManager,
    world_entity: Entity,
    systems: Vec<AttachedSystem>,
    deferred: Vec<DeferredSystem>,
    pending_worlds: Vec<WorldSpec>,
    step_size: Duration,
    sim_time: Duration,
    real_time: Duration,
    reset_requested: bool,
}

/// One world's simulation.
pub struct Runner {
    name: String,
    state: Mutex<RunnerState>,
    paused: AtomicBool,
    stop_requested: AtomicBool,
    blocking_paused_step: AtomicBool,
    fetched_all_includes: AtomicBool,
    iterations: AtomicU64,
    pacing: Mutex<Pacing>,
    sim: Mutex<SimState>,
    events: EventManager,
    uri_map: DashMap<PathBuf, String>,
    bus: MessageBus,
    loader: Arc<SystemLoader>,
}

impl Runner {
    /// Build the world's entities and attach its systems: the world's own
    /// plugins, then entity plugins in document order, then
    /// `server_plugins`. Plugins that fail to load are logged and skipped.
    #[must_use]
    pub fn new(
        world: &WorldSpec,
        server_plugins: &[PluginDescription],
        bus: MessageBus,
        loader: Arc<SystemLoader>,
    ) -> Self {
        let mut ecm = EntityComponentManager::new();
        let world_entity = ecm.create_root(world.name.clone());

        let runner = Self {
            name: world.name.clone(),
            state: Mutex::new(RunnerState::Stopped),
            paused: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
            blocking_paused_step: AtomicBool::new(false),
            fetched_all_includes: AtomicBool::new(false),
            iterations: AtomicU64::new(0),
            pacing: Mutex::new(Pacing {
                period: period_for(&world.name, &world.physics),
                overridden: false,
            }),
            sim: Mutex::new(SimState {
                ecm,
                world_entity,
                systems: Vec::new(),
                deferred: Vec::new(),
                pending_worlds: Vec::new(),
                step_size: step_size_for(&world.name, &world.physics),
                sim_time: Duration::ZERO,
                real_time: Duration::ZERO,
                reset_requested: false,
            }),
            events: EventManager::new(),
            uri_map: DashMap::new(),
            bus,
            loader,
        };

        {
            let mut sim = runner.lock_sim();
            set_physics(&mut sim, &world.physics);
            if let Err(e) = sim.ecm.set_component(world_entity, WORLD, json!({})) {
                warn!(world = %runner.name, error = %e, "failed to tag world entity");
            }
            runner.inject_world(&mut sim, world, false);
            for plugin in server_plugins {
                if let Some(loaded) = runner.load(plugin) {
                    runner.attach(&mut sim, world_entity, loaded);
                }
            }
            info!(
                world = %runner.name,
                entities = sim.ecm.entity_count(),
                systems = sim.systems.len(),
                "runner created"
            );
        }
        runner
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    // -- Run state --

    #[must_use]
    pub fn running(&self) -> bool {
        *self.lock_state() == RunnerState::Running
    }

    #[must_use]
    pub fn state(&self) -> RunnerState {
        *self.lock_state()
    }

    pub fn set_paused(&self, paused: bool) {
        let was = self.paused.swap(paused, Ordering::SeqCst);
        if was != paused {
            debug!(world = %self.name, paused, "pause state changed");
        }
    }

    #[must_use]
    pub fn paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Ask the loop to exit after the current step.
    pub fn stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    /// Force the next step to run even while paused.
    pub fn set_next_step_as_blocking_paused(&self, forced: bool) {
        self.blocking_paused_step.store(forced, Ordering::SeqCst);
    }

    /// Queue a reset for the next step boundary. Every system's `reset` is
    /// called and sim time returns to zero; the iteration count is kept.
    pub fn reset(&self) {
        self.lock_sim().reset_requested = true;
    }

    // -- Pacing --

    /// Wall-clock time between steps.
    #[must_use]
    pub fn update_period(&self) -> Duration {
        self.lock_pacing().period
    }

    /// Override the period derived from the world's physics settings.
    pub fn set_update_period(&self, period: Duration) {
        let mut pacing = self.lock_pacing();
        pacing.period = period;
        pacing.overridden = true;
    }

    // -- Counters --

    #[must_use]
    pub fn iteration_count(&self) -> u64 {
        self.iterations.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn sim_time(&self) -> Duration {
        self.lock_sim().sim_time
    }

    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.lock_sim().ecm.entity_count()
    }

    #[must_use]
    pub fn system_count(&self) -> usize {
        self.lock_sim().systems.len()
    }

    /// Names of attached systems, in attachment order.
    #[must_use]
    pub fn system_names(&self) -> Vec<String> {
        self.lock_sim().systems.iter().map(|s| s.name.clone()).collect()
    }

    // -- Entities --

    #[must_use]
    pub fn world_entity(&self) -> Entity {
        self.lock_sim().world_entity
    }

    #[must_use]
    pub fn has_entity(&self, name: &str) -> bool {
        self.entity_by_name(name).is_some()
    }

    #[must_use]
    pub fn entity_by_name(&self, name: &str) -> Option<Entity> {
        self.lock_sim().ecm.entity_by_name(name)
    }

    /// Queue removal of the entity called `name`. Applied during the next
    /// unpaused step. Returns `false` for unknown names and for the world
    /// entity itself.
    pub fn request_remove_entity_by_name(&self, name: &str, recursive: bool) -> bool {
        let mut sim = self.lock_sim();
        match sim.ecm.entity_by_name(name) {
            Some(entity) => request_remove(&mut sim, entity, recursive),
            None => false,
        }
    }

    /// Same as [`request_remove_entity_by_name`](Self::request_remove_entity_by_name),
    /// by handle.
    pub fn request_remove_entity(&self, entity: Entity, recursive: bool) -> bool {
        request_remove(&mut self.lock_sim(), entity, recursive)
    }

    /// Run `f` against the entity-component state. The runner stays locked
    /// while `f` runs, so `f` must not call back into it.
    pub fn with_ecm<R>(&self, f: impl FnOnce(&EntityComponentManager) -> R) -> R {
        f(&self.lock_sim().ecm)
    }

    // -- Systems --

    /// Configure `system` against the world entity and append it.
    ///
    /// Returns `false`, dropping the system, while the runner is running.
    pub fn add_system(&self, system: Box<dyn System>, config: Value) -> bool {
        let state = self.lock_state();
        if *state == RunnerState::Running {
            warn!(world = %self.name, system = system.name(), "cannot add a system while running");
            return false;
        }
        let mut sim = self.lock_sim();
        let entity = sim.world_entity;
        let loaded = LoadedSystem {
            name: system.name().to_string(),
            system,
            config,
        };
        self.attach(&mut sim, entity, loaded);
        true
    }

    /// Load a system by name and attach it like [`add_system`](Self::add_system).
    pub fn add_system_by_name(&self, plugin: &PluginDescription) -> bool {
        match self.loader.load(plugin) {
            Ok(loaded) => self.add_system(loaded.system, loaded.config),
            Err(e) => {
                warn!(world = %self.name, error = %e, "failed to load system");
                false
            }
        }
    }

    // -- World injection --

    /// Merge a resolved world into this runner.
    ///
    /// Top-level entities whose names are already present are skipped.
    /// While running, the merge happens at the next step boundary and any
    /// systems it brings are attached once the run ends.
    pub fn add_world(&self, world: WorldSpec) {
        let state = self.lock_state();
        let mut sim = self.lock_sim();
        if *state == RunnerState::Running {
            sim.pending_worlds.push(world);
        } else {
            self.inject_world(&mut sim, &world, false);
        }
    }

    #[must_use]
    pub fn fetched_all_includes(&self) -> bool {
        self.fetched_all_includes.load(Ordering::SeqCst)
    }

    pub fn set_fetched_all_includes(&self, fetched: bool) {
        self.fetched_all_includes.store(fetched, Ordering::SeqCst);
    }

    pub fn add_to_uri_map(&self, path: impl Into<PathBuf>, uri: impl Into<String>) {
        self.uri_map.insert(path.into(), uri.into());
    }

    #[must_use]
    pub fn uri_for_path(&self, path: &Path) -> Option<String> {
        self.uri_map.get(path).map(|uri| uri.value().clone())
    }

    // -- Stepping --

    /// Enter the running state. Clears any stale stop request.
    pub(crate) fn begin_run(&self) {
        *self.lock_state() = RunnerState::Running;
        self.stop_requested.store(false, Ordering::SeqCst);
    }

    /// Leave the running state and attach systems deferred during the run.
    pub(crate) fn end_run(&self) {
        let mut state = self.lock_state();
        let mut sim = self.lock_sim();
        let deferred = std::mem::take(&mut sim.deferred);
        for DeferredSystem { entity, loaded } in deferred {
            self.attach(&mut sim, entity, loaded);
        }
        *state = RunnerState::Stopped;
    }

    /// Take one step after `wall` time since the previous one. Returns
    /// `true` if the step advanced the simulation.
    pub(crate) fn step(&self, wall: Duration) -> bool {
        let forced = self.blocking_paused_step.swap(false, Ordering::SeqCst);
        let advance = forced || !self.paused();

        let stats = {
            let mut sim = self.lock_sim();
            let sim = &mut *sim;

            for world in std::mem::take(&mut sim.pending_worlds) {
                self.inject_world(sim, &world, true);
            }
            if sim.reset_requested {
                self.apply_reset(sim);
            }

            sim.real_time += wall;
            if advance {
                let info = UpdateInfo {
                    iterations: self.iteration_count(),
                    sim_time: sim.sim_time,
                    real_time: sim.real_time,
                    dt: sim.step_size,
                    paused: false,
                };
                for attached in &mut sim.systems {
                    attached.system.pre_update(&info, &mut sim.ecm);
                }
                for attached in &mut sim.systems {
                    attached.system.update(&info, &mut sim.ecm);
                }
                for attached in &mut sim.systems {
                    attached.system.post_update(&info, &sim.ecm);
                }
                sim.ecm.process_removals();
                sim.sim_time += sim.step_size;
                self.iterations.fetch_add(1, Ordering::SeqCst);
            }

            WorldStatistics {
                world: self.name.clone(),
                iterations: self.iteration_count(),
                sim_time: sim.sim_time.as_secs_f64(),
                real_time: sim.real_time.as_secs_f64(),
                paused: self.paused(),
            }
        };

        if let Err(e) = self.bus.publish(&topics::world_stats(&self.name), &stats) {
            warn!(world = %self.name, error = %e, "failed to publish world statistics");
        }
        self.apply_events();
        advance
    }

    fn apply_events(&self) {
        for event in self.events.drain() {
            match event {
                SimEvent::Pause(paused) => self.set_paused(paused),
                SimEvent::Stop => self.stop(),
                SimEvent::Reset => self.reset(),
                SimEvent::Custom { name, data } => {
                    info!(world = %self.name, event = %name, %data, "system event");
                }
            }
        }
    }

    fn apply_reset(&self, sim: &mut SimState) {
        sim.reset_requested = false;
        sim.sim_time = Duration::ZERO;
        let info = UpdateInfo {
            iterations: self.iteration_count(),
            dt: sim.step_size,
            paused: self.paused(),
            ..UpdateInfo::default()
        };
        for attached in &mut sim.systems {
            attached.system.reset(&info, &mut sim.ecm);
        }
        info!(world = %self.name, "world reset");
    }

    // -- Construction helpers --

    fn inject_world(&self, sim: &mut SimState, world: &WorldSpec, defer_systems: bool) {
        let root = sim.world_entity;
        let mut plugins: Vec<(Entity, &PluginDescription)> = Vec::new();

        let attached: Vec<String> = sim.systems.iter().map(|s| s.name.clone()).collect();
        for plugin in &world.plugins {
            if attached.iter().any(|name| *name == plugin.name) {
                debug!(world = %self.name, system = %plugin.name, "world system already attached");
                continue;
            }
            plugins.push((root, plugin));
        }

        for entity in &world.entities {
            if sim.ecm.child_by_name(root, &entity.name).is_some() {
                debug!(world = %self.name, entity = %entity.name, "entity already present");
                continue;
            }
            spawn(&mut sim.ecm, entity, root, &mut plugins);
        }

        if world.name == self.name {
            let mut pacing = self.lock_pacing();
            if !pacing.overridden {
                pacing.period = period_for(&world.name, &world.physics);
            }
            drop(pacing);
            sim.step_size = step_size_for(&world.name, &world.physics);
            set_physics(sim, &world.physics);
        }

        for (entity, plugin) in plugins {
            let Some(loaded) = self.load(plugin) else {
                continue;
            };
            if defer_systems {
                debug!(world = %self.name, system = %loaded.name, "system deferred until the run ends");
                sim.deferred.push(DeferredSystem { entity, loaded });
            } else {
                self.attach(sim, entity, loaded);
            }
        }
    }

    fn load(&self, plugin: &PluginDescription) -> Option<LoadedSystem> {
        match self.loader.load(plugin) {
            Ok(loaded) => Some(loaded),
            Err(e) => {
                warn!(world = %self.name, error = %e, "failed to load system");
                None
            }
        }
    }

    fn attach(&self, sim: &mut SimState, entity: Entity, loaded: LoadedSystem) {
        let LoadedSystem {
            name,
            mut system,
            config,
        } = loaded;
        system.configure(entity, &config, &mut sim.ecm, &self.events);
        debug!(world = %self.name, system = %name, %entity, "system attached");
        sim.systems.push(AttachedSystem { name, system });
    }

    // -- Locks --

    fn lock_state(&self) -> MutexGuard<'_, RunnerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_sim(&self) -> MutexGuard<'_, SimState> {
        self.sim.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_pacing(&self) -> MutexGuard<'_, Pacing> {
        self.pacing.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("name", &self.name())
            .field("state", &self.state())
            .field("iterations", &self.iteration_count())
            .finish_non_exhaustive()
    }
}

fn step_size_for(world: &str, physics: &PhysicsDescription) -> Duration {
    match Duration::try_from_secs_f64(physics.max_step_size) {
        Ok(step) if !step.is_zero() => step,
        _ => {
            warn!(
                world,
                max_step_size = physics.max_step_size,
                "unusable step size, using the fallback"
            );
            FALLBACK_STEP_SIZE
        }
    }
}

/// Wall time per step: `step / rtf`, or zero (unthrottled) for a
/// non-positive factor.
fn period_for(world: &str, physics: &PhysicsDescription) -> Duration {
    let rtf = physics.real_time_factor;
    if rtf.is_nan() || rtf <= 0.0 {
        return Duration::ZERO;
    }
    match Duration::try_from_secs_f64(physics.max_step_size / rtf) {
        Ok(period) => period,
        Err(_) => {
            warn!(
                world,
                max_step_size = physics.max_step_size,
                real_time_factor = rtf,
                "unusable update period, pacing at the step size"
            );
            step_size_for(world, physics)
        }
    }
}

fn set_physics(sim: &mut SimState, physics: &PhysicsDescription) {
    match serde_json::to_value(physics) {
        Ok(value) => {
            let root = sim.world_entity;
            if let Err(e) = sim.ecm.set_component(root, PHYSICS, value) {
                warn!(error = %e, "failed to store physics settings");
            }
        }
        Err(e) => warn!(error = %e, "failed to encode physics settings"),
    }
}

fn request_remove(sim: &mut SimState, entity: Entity, recursive: bool) -> bool {
    if entity == sim.world_entity {
        warn!(%entity, "the world entity cannot be removed");
        return false;
    }
    sim.ecm.request_remove(entity, recursive)
}

fn spawn<'a>(
    ecm: &mut EntityComponentManager,
    desc: &'a EntityDescription,
    parent: Entity,
    plugins: &mut Vec<(Entity, &'a PluginDescription)>,
) {
    let entity = match ecm.create_entity(desc.name.clone(), Some(parent)) {
        Ok(entity) => entity,
        Err(e) => {
            warn!(entity = %desc.name, error = %e, "failed to create entity");
            return;
        }
    };
    for (name, value) in &desc.components {
        if let Err(e) = ecm.set_component(entity, name, value.clone()) {
            warn!(entity = %desc.name, component = %name, error = %e, "failed to set component");
        }
    }
    plugins.extend(desc.plugins.iter().map(|p| (entity, p)));
    for child in &desc.children {
        spawn(ecm, child, entity, plugins);
    }
}

/// Step `runners` round-robin until each has completed `iterations`
/// advancing steps (`0` = unbounded) or has been asked to stop.
///
/// Each runner keeps its own deadline, so worlds with different update
/// periods advance independently. The caller brackets this with
/// `begin_run` / `end_run`.
pub(crate) fn drive(runners: &[Arc<Runner>], iterations: u64) {
    let start = Instant::now();
    let mut deadlines = vec![start; runners.len()];
    let mut last_step = vec![start; runners.len()];
    let mut completed = vec![0u64; runners.len()];

    info!(worlds = runners.len(), iterations, "simulation loop starting");

    loop {
        let mut active = false;
        let mut progressed = false;
        let mut next_due: Option<Instant> = None;

        for (i, runner) in runners.iter().enumerate() {
            if runner.stop_requested() || (iterations > 0 && completed[i] >= iterations) {
                continue;
            }
            active = true;

            let now = Instant::now();
            if now >= deadlines[i] {
                let wall = now - last_step[i];
                last_step[i] = now;
                if runner.step(wall) {
                    completed[i] += 1;
                    progressed = true;
                }

                let period = runner.update_period();
                let next = deadlines[i] + period;
                let after = Instant::now();
                deadlines[i] = if next < after {
                    if !period.is_zero() {
                        debug!(
                            world = %runner.name(),
                            elapsed_ms = (after - now).as_millis() as u64,
                            budget_ms = period.as_millis() as u64,
                            "step exceeded time budget"
                        );
                    }
                    after
                } else {
                    next
                };
            }

            next_due = Some(next_due.map_or(deadlines[i], |d| d.min(deadlines[i])));
        }

        if !active {
            break;
        }

        let now = Instant::now();
        match next_due {
            Some(due) if due > now => thread::sleep(due - now),
            _ if !progressed => thread::sleep(IDLE_SLEEP),
            _ => {}
        }
    }

    info!(
        worlds = runners.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "simulation loop finished"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use sim_ecs::{LinearVelocity, Pose};
    use sim_system::builtin::VELOCITY_INTEGRATOR;

    fn runner_for(world: &WorldSpec) -> Arc<Runner> {
        Arc::new(Runner::new(
            world,
            &[],
            MessageBus::new(),
            Arc::new(SystemLoader::default()),
        ))
    }

    fn run(runner: &Arc<Runner>, iterations: u64) {
        runner.begin_run();
        drive(std::slice::from_ref(runner), iterations);
        runner.end_run();
    }

    fn fast_world(name: &str) -> WorldSpec {
        WorldSpec::new(name).with_physics(PhysicsDescription {
            max_step_size: 0.001,
            real_time_factor: 0.0,
        })
    }

    fn moving_box() -> EntityDescription {
        EntityDescription::new("box")
            .with_component("pose", json!({"position": [0.0, 0.0, 0.0]}))
            .with_component("linear_velocity", json!([1.0, 0.0, 0.0]))
            .with_child(EntityDescription::new("lid"))
    }

    /// Appends `<tag>:<phase>` to a shared log for every callback.
    struct Recorder {
        log: Arc<Mutex<Vec<String>>>,
        tag: &'static str,
    }

    impl Recorder {
        fn boxed(log: &Arc<Mutex<Vec<String>>>, tag: &'static str) -> Box<dyn System> {
            Box::new(Self {
                log: Arc::clone(log),
                tag,
            })
        }

        fn push(&self, phase: &str) {
            self.log.lock().unwrap().push(format!("{}:{phase}", self.tag));
        }
    }

    impl System for Recorder {
        fn name(&self) -> &str {
            self.tag
        }

        fn configure(
            &mut self,
            _entity: Entity,
            _config: &Value,
            _ecm: &mut EntityComponentManager,
            _events: &EventManager,
        ) {
            self.push("configure");
        }

        fn pre_update(&mut self, _info: &UpdateInfo, _ecm: &mut EntityComponentManager) {
            self.push("pre");
        }

        fn update(&mut self, _info: &UpdateInfo, _ecm: &mut EntityComponentManager) {
            self.push("update");
        }

        fn post_update(&mut self, _info: &UpdateInfo, _ecm: &EntityComponentManager) {
            self.push("post");
        }

        fn reset(&mut self, _info: &UpdateInfo, _ecm: &mut EntityComponentManager) {
            self.push("reset");
        }
    }

    /// Emits `event` from `update` once `after` updates have run.
    struct Emitter {
        events: Option<EventManager>,
        event: SimEvent,
        after: u64,
        seen: u64,
    }

    impl Emitter {
        fn boxed(event: SimEvent, after: u64) -> Box<dyn System> {
            Box::new(Self {
                events: None,
                event,
                after,
                seen: 0,
            })
        }
    }

    impl System for Emitter {
        fn name(&self) -> &str {
            "emitter"
        }

        fn configure(
            &mut self,
            _entity: Entity,
            _config: &Value,
            _ecm: &mut EntityComponentManager,
            events: &EventManager,
        ) {
            self.events = Some(events.clone());
        }

        fn update(&mut self, _info: &UpdateInfo, _ecm: &mut EntityComponentManager) {
            self.seen += 1;
            if self.seen == self.after {
                if let Some(events) = &self.events {
                    events.emit(self.event.clone());
                }
            }
        }
    }

    #[test]
    fn test_construction() {
        let world = fast_world("shapes")
            .with_entity(moving_box())
            .with_plugin(PluginDescription::new(VELOCITY_INTEGRATOR))
            .with_plugin(PluginDescription::new("no_such_system"));
        let runner = runner_for(&world);

        assert_eq!(runner.name(), "shapes");
        assert_eq!(runner.entity_count(), 3);
        assert_eq!(runner.system_names(), vec![VELOCITY_INTEGRATOR.to_string()]);
        assert!(runner.has_entity("lid"));
        assert!(!runner.running());
        assert_eq!(runner.state(), RunnerState::Stopped);
        assert_eq!(runner.iteration_count(), 0);
        let root = runner.world_entity();
        runner.with_ecm(|ecm| {
            assert!(ecm.has_component(root, WORLD));
            assert_eq!(ecm.component(root, PHYSICS).unwrap()["max_step_size"], json!(0.001));
        });
    }

    #[test]
    fn test_systems_run_in_attachment_order() {
        let runner = runner_for(&fast_world("w"));
        let log = Arc::new(Mutex::new(Vec::new()));
        assert!(runner.add_system(Recorder::boxed(&log, "a"), Value::Null));
        assert!(runner.add_system(Recorder::boxed(&log, "b"), Value::Null));
        run(&runner, 1);

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "a:configure", "b:configure", "a:pre", "b:pre", "a:update", "b:update", "a:post",
                "b:post"
            ]
        );
        assert_eq!(runner.iteration_count(), 1);
    }

    #[test]
    fn test_bounded_run_integrates_motion() {
        let world = fast_world("w")
            .with_entity(moving_box())
            .with_plugin(PluginDescription::new(VELOCITY_INTEGRATOR));
        let runner = runner_for(&world);
        run(&runner, 5);

        assert_eq!(runner.iteration_count(), 5);
        assert_eq!(runner.sim_time(), Duration::from_millis(5));
        let pose: Pose = runner.with_ecm(|ecm| {
            let e = ecm.entity_by_name("box").unwrap();
            ecm.get(e).unwrap().unwrap()
        });
        assert!((pose.position.x - 0.005).abs() < 1e-6);
        let velocity: Option<LinearVelocity> =
            runner.with_ecm(|ecm| ecm.get(ecm.entity_by_name("box").unwrap()).unwrap());
        assert_eq!(velocity, Some(LinearVelocity(Vec3::X)));
    }

    #[test]
    fn test_paused_steps_only_advance_when_forced() {
        let runner = runner_for(&fast_world("w"));
        runner.set_paused(true);
        assert!(!runner.step(Duration::ZERO));
        assert_eq!(runner.iteration_count(), 0);

        runner.set_next_step_as_blocking_paused(true);
        assert!(runner.step(Duration::ZERO));
        assert_eq!(runner.iteration_count(), 1);
        assert!(runner.paused());

        assert!(!runner.step(Duration::ZERO));
        assert_eq!(runner.iteration_count(), 1);
    }

    #[test]
    fn test_removal_waits_for_unpaused_step() {
        let runner = runner_for(&fast_world("w").with_entity(moving_box()));
        assert_eq!(runner.entity_count(), 3);

        assert!(!runner.request_remove_entity_by_name("ghost", true));
        assert!(!runner.request_remove_entity_by_name("w", true));
        assert!(!runner.request_remove_entity(runner.world_entity(), false));
        assert!(runner.request_remove_entity_by_name("box", true));
        assert_eq!(runner.entity_count(), 3);

        runner.set_paused(true);
        runner.step(Duration::ZERO);
        assert_eq!(runner.entity_count(), 3);

        runner.set_paused(false);
        runner.step(Duration::ZERO);
        assert_eq!(runner.entity_count(), 1);
        assert!(!runner.has_entity("lid"));
    }

    #[test]
    fn test_add_system_rejected_while_running() {
        let runner = runner_for(&fast_world("w"));
        let log = Arc::new(Mutex::new(Vec::new()));
        runner.begin_run();
        assert!(!runner.add_system(Recorder::boxed(&log, "late"), Value::Null));
        assert_eq!(runner.system_count(), 0);
        runner.end_run();
        assert!(runner.add_system(Recorder::boxed(&log, "late"), Value::Null));
        assert_eq!(runner.system_count(), 1);
        assert!(runner.add_system_by_name(&PluginDescription::new(VELOCITY_INTEGRATOR)));
        assert!(!runner.add_system_by_name(&PluginDescription::new("missing")));
        assert_eq!(runner.system_count(), 2);
    }

    #[test]
    fn test_statistics_are_published() {
        let bus = MessageBus::new();
        let mut stats = bus.subscribe(&topics::world_stats("w"));
        let runner = Runner::new(&fast_world("w"), &[], bus, Arc::new(SystemLoader::default()));
        runner.step(Duration::from_millis(3));

        let msg: WorldStatistics = stats.try_recv().unwrap().unwrap();
        assert_eq!(msg.world, "w");
        assert_eq!(msg.iterations, 1);
        assert!((msg.sim_time - 0.001).abs() < 1e-9);
        assert!((msg.real_time - 0.003).abs() < 1e-9);
        assert!(!msg.paused);
    }

    #[test]
    fn test_stop_event_ends_unbounded_run() {
        let runner = runner_for(&fast_world("w"));
        assert!(runner.add_system(Emitter::boxed(SimEvent::Stop, 3), Value::Null));
        run(&runner, 0);
        assert_eq!(runner.iteration_count(), 3);
        assert!(!runner.running());
    }

    #[test]
    fn test_pause_event() {
        let runner = runner_for(&fast_world("w"));
        assert!(runner.add_system(Emitter::boxed(SimEvent::Pause(true), 1), Value::Null));
        runner.step(Duration::ZERO);
        assert!(runner.paused());
    }

    #[test]
    fn test_reset_keeps_iterations() {
        let runner = runner_for(&fast_world("w"));
        let log = Arc::new(Mutex::new(Vec::new()));
        assert!(runner.add_system(Recorder::boxed(&log, "r"), Value::Null));
        runner.step(Duration::ZERO);
        runner.step(Duration::ZERO);
        assert_eq!(runner.sim_time(), Duration::from_millis(2));

        runner.reset();
        runner.step(Duration::ZERO);
        assert_eq!(runner.sim_time(), Duration::from_millis(1));
        assert_eq!(runner.iteration_count(), 3);
        assert!(log.lock().unwrap().contains(&"r:reset".to_string()));
    }

    #[test]
    fn test_add_world_while_stopped() {
        let runner = runner_for(&WorldSpec::new("w").with_entity(EntityDescription::new("a")));
        let full = WorldSpec::new("w")
            .with_physics(PhysicsDescription {
                max_step_size: 0.002,
                real_time_factor: 2.0,
            })
            .with_entity(EntityDescription::new("a").with_child(EntityDescription::new("ignored")))
            .with_entity(EntityDescription::new("b"))
            .with_plugin(PluginDescription::new(VELOCITY_INTEGRATOR));
        runner.add_world(full);

        assert_eq!(runner.entity_count(), 3);
        assert!(!runner.has_entity("ignored"));
        assert_eq!(runner.system_count(), 1);
        assert_eq!(runner.update_period(), Duration::from_millis(1));
    }

    #[test]
    fn test_add_world_while_running_defers_systems() {
        let runner = runner_for(&fast_world("w"));
        runner.begin_run();
        runner.add_world(
            fast_world("w")
                .with_entity(EntityDescription::new("late"))
                .with_plugin(PluginDescription::new(VELOCITY_INTEGRATOR)),
        );
        assert!(!runner.has_entity("late"));

        runner.step(Duration::ZERO);
        assert!(runner.has_entity("late"));
        assert_eq!(runner.system_count(), 0);

        runner.end_run();
        assert_eq!(runner.system_count(), 1);
    }

    #[test]
    fn test_update_period_override_survives_injection() {
        let runner = runner_for(&WorldSpec::new("w"));
        assert_eq!(runner.update_period(), Duration::from_millis(1));
        runner.set_update_period(Duration::from_millis(20));
        runner.add_world(fast_world("w"));
        assert_eq!(runner.update_period(), Duration::from_millis(20));
    }

    #[test]
    fn test_unrepresentable_physics_falls_back() {
        let runner = runner_for(&WorldSpec::new("huge").with_physics(PhysicsDescription {
            max_step_size: 1e300,
            real_time_factor: 1.0,
        }));
        assert_eq!(runner.update_period(), FALLBACK_STEP_SIZE);

        let slow = runner_for(&WorldSpec::new("slow").with_physics(PhysicsDescription {
            max_step_size: 0.002,
            real_time_factor: 1e-300,
        }));
        assert_eq!(slow.update_period(), Duration::from_millis(2));

        let broken = runner_for(&WorldSpec::new("nan").with_physics(PhysicsDescription {
            max_step_size: f64::NAN,
            real_time_factor: f64::NAN,
        }));
        assert_eq!(broken.update_period(), Duration::ZERO);
        run(&broken, 3);
        assert_eq!(broken.iteration_count(), 3);
        assert_eq!(broken.sim_time(), FALLBACK_STEP_SIZE * 3);
    }

    #[test]
    fn test_uri_map_and_include_flag() {
        let runner = runner_for(&WorldSpec::new("w"));
        assert!(!runner.fetched_all_includes());
        runner.set_fetched_all_includes(true);
        assert!(runner.fetched_all_includes());

        runner.add_to_uri_map("/cache/https/host/rover.json", "https://host/rover.json");
        assert_eq!(
            runner.uri_for_path(Path::new("/cache/https/host/rover.json")),
            Some("https://host/rover.json".to_string())
        );
        assert!(runner.uri_for_path(Path::new("/other")).is_none());
    }
}
