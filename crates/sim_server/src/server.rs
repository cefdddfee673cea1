//! The simulation server.
//!
//! A [`Server`] moves through `Constructed → Initialized → Running →
//! Stopped`. Construction resolves the configured world source and builds
//! one [`Runner`] per world; if that fails the server stays `Constructed`
//! and every control operation is a no-op. From `Stopped` another blocking
//! run may be started, but a server spawns at most one control thread in
//! its lifetime, so only the first non-blocking run succeeds.
//!
//! All runners of a server are stepped on a single simulation thread:
//! the caller's thread for a blocking run, or the `sim-server-run` control
//! thread otherwise.

use std::path::PathBuf;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde_json::{Value, json};
use sim_ecs::Entity;
use sim_msgs::{MessageBus, ServerControl, StringList, Subscription, topics};
use sim_system::builtin::LOG_RECORD;
use sim_system::{System, SystemLoader};
use sim_world::{PluginDescription, WorldDescription, world_names_from_file};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::{ServerConfig, WorldSource};
use crate::download::{self, DownloadOutcome, DownloadTask, RunnerHandoff};
use crate::resolver::{ResolveError, resolve};
use crate::resources::ResourceContext;
use crate::runner::{self, Runner};
use crate::signals::SignalHandler;

/// Lifecycle phase of a [`Server`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerPhase {
    /// Initialization failed; the server has no worlds.
    Constructed,
    /// Worlds are built and no run has started yet.
    Initialized,
    Running,
    /// The last run has ended.
    Stopped,
}

struct RunState {
    phase: ServerPhase,
    running: bool,
    /// A control thread has been spawned but has not reported in yet.
    starting: bool,
    /// Set for good once a control thread has been spawned.
    control_spawned: bool,
    runs_started: u64,
}

/// State shared with the control thread and the signal handler.
struct ServerShared {
    state: Mutex<RunState>,
    started: Condvar,
    runners: Vec<Arc<Runner>>,
}

impl ServerShared {
    fn lock(&self) -> MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn stop(&self) {
        for runner in &self.runners {
            runner.stop();
        }
    }

    fn begin(&self, state: &mut RunState) {
        state.starting = false;
        state.running = true;
        state.phase = ServerPhase::Running;
        state.runs_started += 1;
        for runner in &self.runners {
            runner.begin_run();
        }
    }

    fn finish(&self) {
        for runner in &self.runners {
            runner.end_run();
        }
        let mut state = self.lock();
        state.running = false;
        state.phase = ServerPhase::Stopped;
        self.started.notify_all();
        info!("simulation stopped");
    }
}

/// Marks the run finished when dropped, including on panic.
struct FinishGuard<'a>(&'a ServerShared);

impl Drop for FinishGuard<'_> {
    fn drop(&mut self) {
        self.0.finish();
    }
}

/// Owns the runners for every world and controls how they run.
pub struct Server {
    id: Uuid,
    config: ServerConfig,
    resources: Arc<ResourceContext>,
    bus: MessageBus,
    shared: Arc<ServerShared>,
    control_thread: Mutex<Option<JoinHandle<()>>>,
    download: Mutex<Option<DownloadTask>>,
    control: Mutex<Subscription>,
    signals: Option<SignalHandler>,
}

impl Server {
    /// Resolve the configured worlds and build their runners.
    ///
    /// Failures are logged; check [`initialized`](Self::initialized).
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        let id = Uuid::new_v4();
        let bus = MessageBus::new();
        let control = bus.subscribe(topics::SERVER_CONTROL);
        let resources = Arc::new(ResourceContext::from_config(&config));
        info!(server = %id, "creating server");

        let (runners, download) = bootstrap(&config, &resources, &bus).unwrap_or_default();
        let phase = if runners.is_empty() {
            error!(server = %id, "server initialization failed");
            ServerPhase::Constructed
        } else {
            info!(server = %id, worlds = runners.len(), "server initialized");
            ServerPhase::Initialized
        };

        let shared = Arc::new(ServerShared {
            state: Mutex::new(RunState {
                phase,
                running: false,
                starting: false,
                control_spawned: false,
                runs_started: 0,
            }),
            started: Condvar::new(),
            runners,
        });

        let weak = Arc::downgrade(&shared);
        let signals = match SignalHandler::arm(move || {
            if let Some(shared) = weak.upgrade() {
                shared.stop();
            }
        }) {
            Ok(handler) => Some(handler),
            Err(e) => {
                error!(server = %id, error = %e, "failed to arm signal handler");
                None
            }
        };

        Self {
            id,
            config,
            resources,
            bus,
            shared,
            control_thread: Mutex::new(None),
            download: Mutex::new(download),
            control: Mutex::new(control),
            signals,
        }
    }

    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    #[must_use]
    pub fn phase(&self) -> ServerPhase {
        self.shared.lock().phase
    }

    #[must_use]
    pub fn initialized(&self) -> bool {
        self.phase() != ServerPhase::Constructed
    }

    /// Whether a run is in progress.
    #[must_use]
    pub fn running(&self) -> bool {
        self.shared.lock().running
    }

    /// The bus carrying world statistics and resource-path updates.
    #[must_use]
    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    // -- Run control --

    /// Start simulating.
    ///
    /// Every world is first set to `paused`, even if the run is then
    /// rejected. A blocking run steps on the
    /// calling thread and returns when the run ends; a non-blocking run
    /// returns once the control thread has started. `iterations` bounds
    /// the number of unpaused steps per world; `0` runs until stopped.
    ///
    /// Returns `false` if the server is not initialized, is already
    /// running, has no armed signal handler, or (non-blocking) has already
    /// spawned its control thread.
    pub fn run(&self, blocking: bool, iterations: u64, paused: bool) -> bool {
        self.start(blocking, iterations, paused, false)
    }

    /// Take exactly one step in every world, blocking, even when `paused`.
    pub fn run_once(&self, paused: bool) -> bool {
        self.start(true, 1, paused, paused)
    }

    /// Ask every world to stop after its current step.
    pub fn stop(&self) {
        info!(server = %self.id, "stop requested");
        self.shared.stop();
    }

    /// Wait for the control thread of a non-blocking run to exit.
    pub fn wait(&self) {
        let handle = self.lock_control_thread().take();
        if let Some(handle) = handle
            && handle.join().is_err()
        {
            error!(server = %self.id, "control thread panicked");
        }
    }

    fn start(&self, blocking: bool, iterations: u64, paused: bool, force_step: bool) -> bool {
        for runner in &self.shared.runners {
            runner.set_paused(paused);
        }

        let mut state = self.shared.lock();
        if state.phase == ServerPhase::Constructed {
            warn!(server = %self.id, "server is not initialized");
            return false;
        }
        if state.running || state.starting {
            warn!(server = %self.id, "server is already running");
            return false;
        }
        if !blocking && state.control_spawned {
            warn!(server = %self.id, "server already has a control thread");
            return false;
        }

        if force_step {
            for runner in &self.shared.runners {
                runner.set_next_step_as_blocking_paused(true);
            }
        }

        if !self.signals.as_ref().is_some_and(SignalHandler::initialized) {
            error!(server = %self.id, "signal handler is not initialized");
            return false;
        }

        if blocking {
            self.shared.begin(&mut state);
            drop(state);
            let _finish = FinishGuard(&self.shared);
            runner::drive(&self.shared.runners, iterations);
            return true;
        }

        let before = state.runs_started;
        state.starting = true;
        {
            let mut slot = self.lock_control_thread();
            let shared = Arc::clone(&self.shared);
            let spawned = thread::Builder::new()
                .name("sim-server-run".into())
                .spawn(move || {
                    let mut state = shared.lock();
                    shared.begin(&mut state);
                    shared.started.notify_all();
                    drop(state);
                    let _finish = FinishGuard(&shared);
                    runner::drive(&shared.runners, iterations);
                });
            match spawned {
                Ok(handle) => {
                    *slot = Some(handle);
                    state.control_spawned = true;
                }
                Err(e) => {
                    error!(server = %self.id, error = %e, "failed to spawn control thread");
                    state.starting = false;
                    return false;
                }
            }
        }

        let _state = self
            .shared
            .started
            .wait_while(state, |s| s.runs_started == before)
            .unwrap_or_else(PoisonError::into_inner);
        info!(server = %self.id, iterations, "simulation running in the background");
        true
    }

    // -- Requests --

    /// Act on a server-control request. Only `stop` is supported.
    pub fn handle_control(&self, request: &ServerControl) -> bool {
        if request.stop {
            self.stop();
            return true;
        }
        if request.clone || request.new_world {
            warn!(server = %self.id, "clone and new-world requests are not implemented");
        } else if !request.open_filename.is_empty() {
            warn!(server = %self.id, file = %request.open_filename, "opening worlds is not implemented");
        } else if !request.save_world_name.is_empty() {
            warn!(server = %self.id, world = %request.save_world_name, "saving worlds is not implemented");
        }
        false
    }

    /// Handle every request received on [`topics::SERVER_CONTROL`] since the
    /// last call. Returns the number of requests acted upon.
    pub fn poll_control(&self) -> usize {
        let requests = {
            let mut control = self.control.lock().unwrap_or_else(PoisonError::into_inner);
            match control.drain::<ServerControl>() {
                Ok(requests) => requests,
                Err(e) => {
                    warn!(server = %self.id, error = %e, "failed to read control requests");
                    return 0;
                }
            }
        };
        requests
            .iter()
            .filter(|request| self.handle_control(request))
            .count()
    }

    /// Add resource search paths and publish the resulting list on
    /// [`topics::RESOURCE_PATHS`].
    pub fn add_resource_paths(&self, paths: Vec<PathBuf>) -> Vec<PathBuf> {
        let all = self.resources.add_search_paths(paths);
        let list = StringList::new(all.iter().map(|p| p.display().to_string()));
        if let Err(e) = self.bus.publish(topics::RESOURCE_PATHS, &list) {
            warn!(server = %self.id, error = %e, "failed to publish resource paths");
        }
        all
    }

    #[must_use]
    pub fn resource_paths(&self) -> Vec<PathBuf> {
        self.resources.search_paths()
    }

    /// Wait for background resolution to finish. `None` if there was none
    /// or it has already been waited for.
    pub fn wait_for_downloads(&self) -> Option<DownloadOutcome> {
        let task = self
            .download
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        task.map(DownloadTask::join)
    }

    // -- Worlds --

    #[must_use]
    pub fn world_count(&self) -> usize {
        self.shared.runners.len()
    }

    #[must_use]
    pub fn world_names(&self) -> Vec<String> {
        self.shared
            .runners
            .iter()
            .map(|r| r.name().to_string())
            .collect()
    }

    /// Publish the world names on [`topics::WORLDS`].
    pub fn publish_world_names(&self) -> Vec<String> {
        let names = self.world_names();
        if let Err(e) = self.bus.publish(topics::WORLDS, &StringList::new(names.iter().cloned())) {
            warn!(server = %self.id, error = %e, "failed to publish world names");
        }
        names
    }

    #[must_use]
    pub fn runner(&self, index: usize) -> Option<Arc<Runner>> {
        self.shared.runners.get(index).cloned()
    }

    /// Attach `system` to a world. `None` for an unknown index,
    /// `Some(false)` while the server is running.
    pub fn add_system(&self, index: usize, system: Box<dyn System>, config: Value) -> Option<bool> {
        let runner = self.shared.runners.get(index)?;
        let state = self.shared.lock();
        if state.running || state.starting {
            warn!(server = %self.id, world = %runner.name(), "cannot add a system while running");
            return Some(false);
        }
        Some(runner.add_system(system, config))
    }

    /// Load a system by name and attach it like [`add_system`](Self::add_system).
    pub fn add_system_by_name(&self, index: usize, plugin: &PluginDescription) -> Option<bool> {
        let runner = self.shared.runners.get(index)?;
        let state = self.shared.lock();
        if state.running || state.starting {
            warn!(server = %self.id, world = %runner.name(), "cannot add a system while running");
            return Some(false);
        }
        Some(runner.add_system_by_name(plugin))
    }

    pub fn request_remove_entity_by_name(&self, index: usize, name: &str, recursive: bool) -> bool {
        self.shared
            .runners
            .get(index)
            .is_some_and(|r| r.request_remove_entity_by_name(name, recursive))
    }

    pub fn request_remove_entity(&self, index: usize, entity: Entity, recursive: bool) -> bool {
        self.shared
            .runners
            .get(index)
            .is_some_and(|r| r.request_remove_entity(entity, recursive))
    }

    #[must_use]
    pub fn has_entity(&self, index: usize, name: &str) -> bool {
        self.shared
            .runners
            .get(index)
            .is_some_and(|r| r.has_entity(name))
    }

    #[must_use]
    pub fn entity_by_name(&self, index: usize, name: &str) -> Option<Entity> {
        self.shared.runners.get(index)?.entity_by_name(name)
    }

    pub fn set_paused(&self, index: usize, paused: bool) -> bool {
        let Some(runner) = self.shared.runners.get(index) else {
            return false;
        };
        runner.set_paused(paused);
        true
    }

    #[must_use]
    pub fn paused(&self, index: usize) -> Option<bool> {
        self.shared.runners.get(index).map(|r| r.paused())
    }

    /// Whether the world at `index` is currently being stepped.
    #[must_use]
    pub fn running_world(&self, index: usize) -> Option<bool> {
        self.shared.runners.get(index).map(|r| r.running())
    }

    #[must_use]
    pub fn iteration_count(&self, index: usize) -> Option<u64> {
        self.shared.runners.get(index).map(|r| r.iteration_count())
    }

    #[must_use]
    pub fn entity_count(&self, index: usize) -> Option<usize> {
        self.shared.runners.get(index).map(|r| r.entity_count())
    }

    #[must_use]
    pub fn system_count(&self, index: usize) -> Option<usize> {
        self.shared.runners.get(index).map(|r| r.system_count())
    }

    #[must_use]
    pub fn sim_time(&self, index: usize) -> Option<Duration> {
        self.shared.runners.get(index).map(|r| r.sim_time())
    }

    pub fn set_update_period(&self, index: usize, period: Duration) -> bool {
        let Some(runner) = self.shared.runners.get(index) else {
            return false;
        };
        runner.set_update_period(period);
        true
    }

    /// Whether background resolution has finished for the world at `index`.
    #[must_use]
    pub fn downloads_complete(&self, index: usize) -> Option<bool> {
        self.shared
            .runners
            .get(index)
            .map(|r| r.fetched_all_includes())
    }

    fn lock_control_thread(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.control_thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.shared.stop();
        self.wait();
        if let Some(outcome) = self.wait_for_downloads() {
            info!(server = %self.id, ?outcome, "download thread joined");
        }
    }
}

type Bootstrap = (Vec<Arc<Runner>>, Option<DownloadTask>);

/// Resolve the worlds and build their runners. `None` if initialization
/// failed.
fn bootstrap(
    config: &ServerConfig,
    resources: &Arc<ResourceContext>,
    bus: &MessageBus,
) -> Option<Bootstrap> {
    let mut handoff: Option<RunnerHandoff> = None;
    let mut task: Option<DownloadTask> = None;

    let mut description = match config.source_file() {
        Some(path) if config.download_in_parallel => {
            let Some(file) = resources.resolve_world_file(path) else {
                ResolveError::NotFound(path.to_path_buf()).log();
                return None;
            };
            let names = match world_names_from_file(&file) {
                Ok(names) => names,
                Err(e) => {
                    error!(path = %file.display(), error = %e, "failed to read world names");
                    return None;
                }
            };
            let Some(first) = names.into_iter().next().filter(|n| !n.is_empty()) else {
                error!(path = %file.display(), "world file names no worlds");
                return None;
            };
            match download::spawn(file, Arc::clone(resources)) {
                Ok((spawned, sender)) => {
                    task = Some(spawned);
                    handoff = Some(sender);
                    info!(world = %first, "starting with the world name while resources download");
                    WorldDescription::single(first)
                }
                Err(e) => {
                    warn!(error = %e, "failed to start download thread, resolving synchronously");
                    resolve_now(&config.source, resources)?
                }
            }
        }
        _ => {
            if config.download_in_parallel {
                info!("parallel download only applies to file sources");
            }
            resolve_now(&config.source, resources)?
        }
    };

    if matches!(config.source, WorldSource::File(_)) && description.world_count() > 1 {
        warn!(
            worlds = description.world_count(),
            "only the first world of a file is loaded"
        );
        description.worlds.truncate(1);
    }
    if description.worlds.is_empty() {
        error!("world description contains no worlds");
        return None;
    }
    if config.use_log_record {
        add_log_record(&mut description, config);
    }

    let loader = Arc::new(SystemLoader::default());
    let runners: Vec<Arc<Runner>> = description
        .worlds
        .iter()
        .map(|world| {
            Arc::new(Runner::new(
                world,
                &config.plugins,
                bus.clone(),
                Arc::clone(&loader),
            ))
        })
        .collect();

    for runner in &runners {
        if let Some(period) = config.update_period {
            runner.set_update_period(period);
        }
        if handoff.is_none() {
            for (local, uri) in resources.uri_map() {
                runner.add_to_uri_map(local, uri);
            }
            runner.set_fetched_all_includes(true);
        }
    }

    if let Some(sender) = handoff
        && !sender.deliver(runners.clone())
    {
        warn!("download thread exited before the runners were ready");
    }

    Some((runners, task))
}

fn resolve_now(
    source: &WorldSource,
    resources: &ResourceContext,
) -> Option<WorldDescription> {
    match resolve(source, resources) {
        Ok(description) => Some(description),
        Err(e) => {
            e.log();
            None
        }
    }
}

/// Make sure every world records itself. An explicit path in the config
/// wins over one declared in the world.
fn add_log_record(description: &mut WorldDescription, config: &ServerConfig) {
    let configured = config
        .log_record_path
        .as_ref()
        .map(|p| p.to_string_lossy().into_owned());
    let fallback = ServerConfig::default_log_record_path()
        .to_string_lossy()
        .into_owned();

    for world in &mut description.worlds {
        match world.plugins.iter_mut().find(|p| p.name == LOG_RECORD) {
            Some(declared) => {
                if !declared.config.is_object() {
                    declared.config = json!({});
                }
                match &configured {
                    Some(path) => declared.config["path"] = json!(path),
                    None if declared.config.get("path").is_none() => {
                        declared.config["path"] = json!(fallback);
                    }
                    None => {}
                }
            }
            None => {
                let path = configured.clone().unwrap_or_else(|| fallback.clone());
                world
                    .plugins
                    .push(PluginDescription::new(LOG_RECORD).with_config(json!({ "path": path })));
            }
        }
    }
}
