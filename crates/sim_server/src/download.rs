//! Background resolution of file sources.
//!
//! With parallel download enabled the server bootstraps each runner from
//! the world name alone while this thread resolves the full description.
//! The thread then blocks on a one-shot handoff until the server delivers
//! its runners, merges the resolved first world into each of them and marks
//! them as having all includes.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tokio::sync::oneshot;
use tracing::{error, info, warn};

use crate::config::WorldSource;
use crate::resolver::resolve;
use crate::resources::ResourceContext;
use crate::runner::Runner;

/// How a download thread ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// The world was merged into this many runners.
    Completed { runners: usize },
    /// Resolution failed or produced no worlds.
    Failed,
    /// The server never delivered its runners.
    Abandoned,
}

/// Handle to the background thread.
#[derive(Debug)]
pub struct DownloadTask {
    handle: JoinHandle<DownloadOutcome>,
}

impl DownloadTask {
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the thread. A panicked thread counts as failed.
    pub fn join(self) -> DownloadOutcome {
        self.handle.join().unwrap_or_else(|_| {
            error!("download thread panicked");
            DownloadOutcome::Failed
        })
    }
}

/// The server's end of the runner handoff.
#[derive(Debug)]
pub struct RunnerHandoff {
    sender: oneshot::Sender<Vec<Arc<Runner>>>,
}

impl RunnerHandoff {
    /// Hand the constructed runners to the download thread. Returns `false`
    /// if the thread has already given up.
    pub fn deliver(self, runners: Vec<Arc<Runner>>) -> bool {
        self.sender.send(runners).is_ok()
    }
}

/// Start resolving `path` on the `sim-server-download` thread.
///
/// Dropping the returned [`RunnerHandoff`] without delivering makes the
/// thread exit with [`DownloadOutcome::Abandoned`].
///
/// # Errors
///
/// Returns the I/O error if the thread cannot be spawned.
pub fn spawn(
    path: PathBuf,
    resources: Arc<ResourceContext>,
) -> std::io::Result<(DownloadTask, RunnerHandoff)> {
    let (sender, receiver) = oneshot::channel();
    let handle = thread::Builder::new()
        .name("sim-server-download".into())
        .spawn(move || download(&path, &resources, receiver))?;
    Ok((DownloadTask { handle }, RunnerHandoff { sender }))
}

fn download(
    path: &std::path::Path,
    resources: &ResourceContext,
    runners: oneshot::Receiver<Vec<Arc<Runner>>>,
) -> DownloadOutcome {
    info!(path = %path.display(), "resolving world in the background");
    let description = match resolve(&WorldSource::File(path.to_path_buf()), resources) {
        Ok(description) => description,
        Err(e) => {
            e.log();
            error!(path = %path.display(), "background resolution failed, worlds stay incomplete");
            return DownloadOutcome::Failed;
        }
    };
    let Some(world) = description.worlds.into_iter().next() else {
        error!(path = %path.display(), "background resolution produced no worlds");
        return DownloadOutcome::Failed;
    };

    let Ok(runners) = runners.blocking_recv() else {
        warn!("server initialization ended without runners, discarding download");
        return DownloadOutcome::Abandoned;
    };

    let uri_map = resources.uri_map();
    for runner in &runners {
        runner.add_world(world.clone());
        for (local, uri) in &uri_map {
            runner.add_to_uri_map(local.clone(), uri.clone());
        }
        runner.set_fetched_all_includes(true);
    }
    info!(world = %world.name, runners = runners.len(), "background resolution complete");
    DownloadOutcome::Completed {
        runners: runners.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sim_msgs::MessageBus;
    use sim_system::SystemLoader;
    use sim_world::WorldSpec;
    use std::fs;

    fn write_world(dir: &std::path::Path) -> PathBuf {
        fs::write(dir.join("crate.json"), r#"{"name": "crate"}"#).unwrap();
        let path = dir.join("yard.json");
        fs::write(
            &path,
            r#"{"worlds": [{"name": "yard", "entities": [{"name": "fence"}], "includes": [{"uri": "crate.json"}]}]}"#,
        )
        .unwrap();
        path
    }

    #[test]
    fn test_download_merges_into_delivered_runners() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_world(dir.path());
        let resources = Arc::new(ResourceContext::new(None, Vec::new()));

        let (task, handoff) = spawn(path, resources).unwrap();
        let runner = Arc::new(Runner::new(
            &WorldSpec::new("yard"),
            &[],
            MessageBus::new(),
            Arc::new(SystemLoader::default()),
        ));
        assert_eq!(runner.entity_count(), 1);
        assert!(handoff.deliver(vec![Arc::clone(&runner)]));

        assert_eq!(task.join(), DownloadOutcome::Completed { runners: 1 });
        assert!(runner.fetched_all_includes());
        assert!(runner.has_entity("fence"));
        assert!(runner.has_entity("crate"));
        assert_eq!(runner.entity_count(), 3);
    }

    #[test]
    fn test_dropped_handoff_abandons() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_world(dir.path());
        let (task, handoff) = spawn(path, Arc::new(ResourceContext::new(None, Vec::new()))).unwrap();
        drop(handoff);
        assert_eq!(task.join(), DownloadOutcome::Abandoned);
    }

    #[test]
    fn test_unresolvable_file_fails() {
        let (task, handoff) = spawn(
            PathBuf::from("/nonexistent/world.json"),
            Arc::new(ResourceContext::new(None, Vec::new())),
        )
        .unwrap();
        assert_eq!(task.join(), DownloadOutcome::Failed);
        assert!(!handoff.deliver(Vec::new()));
    }
}
