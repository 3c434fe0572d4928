use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, Weak};

use serde_json::Value;

use crate::controller::{FormResult, read_lock, write_lock};
use crate::path::{FieldPath, IntoFieldPath};

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum WatchTarget {
    All,
    Path(FieldPath),
}

impl WatchTarget {
    pub fn parse(input: &str) -> FormResult<Self> {
        if input == "*" {
            Ok(WatchTarget::All)
        } else {
            Ok(WatchTarget::Path(input.into_field_path()?))
        }
    }
}

impl From<FieldPath> for WatchTarget {
    fn from(path: FieldPath) -> Self {
        WatchTarget::Path(path)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct WatchEvent {
    pub target: WatchTarget,
    pub value: Option<Value>,
}

pub type WatchCallback = Arc<dyn Fn(&WatchEvent) + Send + Sync>;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ChangeSet {
    Everything,
    Paths(Vec<FieldPath>),
}

impl ChangeSet {
    pub fn single(path: FieldPath) -> Self {
        ChangeSet::Paths(vec![path])
    }

    fn touches(&self, target: &FieldPath) -> bool {
        match self {
            ChangeSet::Everything => true,
            ChangeSet::Paths(paths) => paths.iter().any(|path| path.is_related_to(target)),
        }
    }

    fn is_empty(&self) -> bool {
        matches!(self, ChangeSet::Paths(paths) if paths.is_empty())
    }
}

struct Subscriber {
    target: WatchTarget,
    callback: WatchCallback,
}

#[derive(Default)]
struct WatcherInner {
    next_id: u64,
    subscribers: BTreeMap<u64, Subscriber>,
}

#[derive(Clone, Default)]
pub struct Watcher {
    inner: Arc<RwLock<WatcherInner>>,
}

pub struct WatchSubscription {
    id: u64,
    inner: Weak<RwLock<WatcherInner>>,
}

impl WatchSubscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns false when the subscription was already detached.
    pub fn unsubscribe(self) -> FormResult<bool> {
        let Some(inner) = self.inner.upgrade() else {
            return Ok(false);
        };
        let mut inner = write_lock(&inner, "removing watch subscription")?;
        Ok(inner.subscribers.remove(&self.id).is_some())
    }
}

impl Watcher {
    pub fn subscribe(
        &self,
        target: WatchTarget,
        callback: impl Fn(&WatchEvent) + Send + Sync + 'static,
    ) -> FormResult<WatchSubscription> {
        let mut inner = write_lock(&self.inner, "adding watch subscription")?;
        inner.next_id += 1;
        let id = inner.next_id;
        inner.subscribers.insert(
            id,
            Subscriber {
                target,
                callback: Arc::new(callback),
            },
        );
        Ok(WatchSubscription {
            id,
            inner: Arc::downgrade(&self.inner),
        })
    }

    /// Drops subscriptions watching `path` or anything below it.
    pub fn detach(&self, path: &FieldPath) -> FormResult<usize> {
        let mut inner = write_lock(&self.inner, "detaching watch subscriptions")?;
        let before = inner.subscribers.len();
        inner.subscribers.retain(|_, subscriber| {
            !matches!(&subscriber.target, WatchTarget::Path(target) if path.is_prefix_of(target))
        });
        Ok(before - inner.subscribers.len())
    }

    pub fn len(&self) -> FormResult<usize> {
        Ok(read_lock(&self.inner, "counting watch subscriptions")?
            .subscribers
            .len())
    }

    pub fn is_empty(&self) -> FormResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Subscribers affected by `changes`, deepest paths first so a parent
    /// sees its children already settled; `*` subscribers come last.
    pub(crate) fn plan(&self, changes: &ChangeSet) -> FormResult<Vec<(WatchTarget, WatchCallback)>> {
        if changes.is_empty() {
            return Ok(Vec::new());
        }
        let inner = read_lock(&self.inner, "planning watch notifications")?;
        let mut paths = Vec::new();
        let mut everything = Vec::new();
        for subscriber in inner.subscribers.values() {
            match &subscriber.target {
                WatchTarget::All => everything.push(subscriber.callback.clone()),
                WatchTarget::Path(path) if changes.touches(path) => {
                    paths.push((path.clone(), subscriber.callback.clone()));
                }
                WatchTarget::Path(_) => {}
            }
        }
        paths.sort_by(|(left, _), (right, _)| right.depth().cmp(&left.depth()));

        Ok(paths
            .into_iter()
            .map(|(path, callback)| (WatchTarget::Path(path), callback))
            .chain(everything.into_iter().map(|callback| (WatchTarget::All, callback)))
            .collect())
    }
}
