//! Groups instances by test and by browser context so they can be torn down together.

use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::{
    collections::{BTreeSet, HashMap},
    fmt,
    future::Future,
    time::{Duration, Instant},
};

/// A set of instances that is cleaned up as one.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum IsolationGroup {
    Test(String),
    Context(String),
}

impl fmt::Display for IsolationGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Test(id) => write!(f, "test `{id}`"),
            Self::Context(id) => write!(f, "context `{id}`"),
        }
    }
}

/// A single failure during a group cleanup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CleanupFailure {
    /// `None` for failed cleanup handlers.
    pub instance_id: Option<String>,
    pub message: String,
}

/// Outcome of cleaning up a group.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CleanupSummary {
    pub cleaned_up_instances: Vec<String>,
    pub errors: Vec<CleanupFailure>,
    pub duration: Duration,
}

impl CleanupSummary {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    pub(crate) fn merge(&mut self, other: Self) {
        self.cleaned_up_instances.extend(other.cleaned_up_instances);
        self.errors.extend(other.errors);
        self.duration += other.duration;
    }
}

type CleanupHandler = Box<dyn FnOnce() -> BoxFuture<'static, eyre::Result<()>> + Send>;

#[derive(Default)]
struct Groups {
    by_test: HashMap<String, BTreeSet<String>>,
    by_context: HashMap<String, BTreeSet<String>>,
    handlers: HashMap<IsolationGroup, Vec<CleanupHandler>>,
}

impl Groups {
    fn map_mut<'a, 'g>(
        &'a mut self,
        group: &'g IsolationGroup,
    ) -> (&'a mut HashMap<String, BTreeSet<String>>, &'g str) {
        match group {
            IsolationGroup::Test(id) => (&mut self.by_test, id),
            IsolationGroup::Context(id) => (&mut self.by_context, id),
        }
    }

    fn unregister(&mut self, instance_id: &str) {
        for map in [&mut self.by_test, &mut self.by_context] {
            map.retain(|_, ids| {
                ids.remove(instance_id);
                !ids.is_empty()
            });
        }
    }
}

/// Tracks which test and which context every instance belongs to.
#[derive(Default)]
pub struct IsolationManager {
    groups: Mutex<Groups>,
}

impl IsolationManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `instance_id` to its context group and, if given, its test group.
    pub fn register(&self, instance_id: &str, test_id: Option<&str>, context_id: &str) {
        let mut groups = self.groups.lock();
        if let Some(test_id) = test_id {
            groups.by_test.entry(test_id.to_string()).or_default().insert(instance_id.to_string());
        }
        groups.by_context.entry(context_id.to_string()).or_default().insert(instance_id.to_string());
    }

    /// Removes `instance_id` from every group. Groups left empty are dropped.
    pub fn unregister(&self, instance_id: &str) {
        self.groups.lock().unregister(instance_id);
    }

    /// Sorted instance ids of `group`.
    pub fn instances(&self, group: &IsolationGroup) -> Vec<String> {
        let mut groups = self.groups.lock();
        let (map, id) = groups.map_mut(group);
        map.get(id).map(|ids| ids.iter().cloned().collect()).unwrap_or_default()
    }

    /// Every group with instances or cleanup handlers, test groups first.
    pub fn groups(&self) -> Vec<IsolationGroup> {
        let groups = self.groups.lock();
        let mut all: Vec<_> = groups
            .by_test
            .keys()
            .cloned()
            .map(IsolationGroup::Test)
            .chain(groups.by_context.keys().cloned().map(IsolationGroup::Context))
            .collect();
        for group in groups.handlers.keys() {
            if !all.contains(group) {
                all.push(group.clone());
            }
        }
        all.sort_by_key(|group| matches!(group, IsolationGroup::Context(_)));
        all
    }

    pub fn group_count(&self) -> usize {
        let groups = self.groups.lock();
        groups.by_test.len() + groups.by_context.len()
    }

    /// Runs `handler` when `group` is cleaned up.
    pub fn add_cleanup_handler<F, Fut>(&self, group: IsolationGroup, handler: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = eyre::Result<()>> + Send + 'static,
    {
        let handler: CleanupHandler = Box::new(move || Box::pin(handler()));
        self.groups.lock().handlers.entry(group).or_default().push(handler);
    }

    /// Removes every instance of `group` through `remove` and runs the group's cleanup handlers.
    ///
    /// Failures don't stop the cleanup, they are collected in the summary. The group is gone
    /// afterwards, so a second call returns an empty summary.
    pub async fn cleanup<F, Fut, E>(&self, group: &IsolationGroup, remove: F) -> CleanupSummary
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: fmt::Display,
    {
        let started = Instant::now();
        let (instance_ids, handlers) = {
            let mut groups = self.groups.lock();
            let (map, id) = groups.map_mut(group);
            let ids: Vec<_> = map.remove(id).map(|ids| ids.into_iter().collect()).unwrap_or_default();
            for instance_id in &ids {
                groups.unregister(instance_id);
            }
            (ids, groups.handlers.remove(group).unwrap_or_default())
        };

        let mut summary = CleanupSummary::default();
        for instance_id in instance_ids {
            match remove(instance_id.clone()).await {
                Ok(()) => summary.cleaned_up_instances.push(instance_id),
                Err(err) => {
                    error!(target: "bridge::isolation", %group, %instance_id, %err, "failed to clean up instance");
                    summary.errors.push(CleanupFailure {
                        instance_id: Some(instance_id),
                        message: err.to_string(),
                    });
                }
            }
        }
        for handler in handlers {
            if let Err(err) = handler().await {
                error!(target: "bridge::isolation", %group, %err, "cleanup handler failed");
                summary.errors.push(CleanupFailure { instance_id: None, message: err.to_string() });
            }
        }
        summary.duration = started.elapsed();
        debug!(target: "bridge::isolation", %group, cleaned = summary.cleaned_up_instances.len(), errors = summary.errors.len(), "cleaned up group");
        summary
    }
}

impl fmt::Debug for IsolationManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let groups = self.groups.lock();
        f.debug_struct("IsolationManager")
            .field("by_test", &groups.by_test)
            .field("by_context", &groups.by_context)
            .field("handlers", &groups.handlers.values().map(Vec::len).sum::<usize>())
            .finish()
    }
}
