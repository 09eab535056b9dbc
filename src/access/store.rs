//! The store session: bootstrap, revision lookup and transaction gates.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::data::{DefaultNodeFactory, KeyLayout, Node, NodeFactory, NodeKey};
use crate::hash::self_hash;
use crate::store::{
    Backend, CommittedPage, FileBackend, MemoryBackend, MetricsSnapshot, PageError, PageLocator,
    PageSource, PageView, StoreMetrics, StoreSettings, UberPage,
};

use super::config::StoreConfig;
use super::cursor::NodeReader;
use super::error::{Result, TrxError};
use super::read_trx::ReadTrx;
use super::reader::descend;
use super::trx_log::TrxLog;
use super::write_trx::WriteTrx;

pub(crate) struct StoreInner {
    pub source: PageSource,
    pub config: StoreConfig,
    pub settings: StoreSettings,
    metrics: Arc<StoreMetrics>,
    /// Latest committed uber page.
    committed: RwLock<CommittedPage>,
    writer_active: AtomicBool,
    /// Highest node key ever allocated, including aborted allocations.
    key_watermark: AtomicU64,
}

impl StoreInner {
    pub fn node_layout(&self) -> &KeyLayout {
        &self.settings.node_layout
    }

    pub fn committed_uber(&self) -> CommittedPage {
        self.committed.read().clone()
    }

    pub fn key_watermark(&self) -> u64 {
        self.key_watermark.load(Ordering::Acquire)
    }

    pub fn raise_key_watermark(&self, key: u64) {
        self.key_watermark.fetch_max(key, Ordering::AcqRel);
    }

    pub fn release_writer(&self) {
        self.writer_active.store(false, Ordering::Release);
    }

    /// Loads the revision root of `revision` reachable from `uber`.
    pub fn load_revision_root(&self, uber: &CommittedPage, revision: u64) -> Result<CommittedPage> {
        let uber_page = uber.as_uber()?;
        let latest = uber_page.revision_number();
        if revision > latest {
            return Err(TrxError::RevisionOutOfRange {
                requested: revision,
                latest,
            });
        }
        let path = self.settings.revision_layout.path(revision).map_err(PageError::from)?;
        let view = descend(&self.source, None, &uber_page.references()[0], &path.offsets)?;
        let root = match view {
            Some(PageView::Committed(page)) => page,
            _ => {
                return Err(PageError::Corrupted(format!("revision {revision} is missing")).into())
            }
        };
        if root.as_revision_root()?.revision() != revision {
            return Err(PageError::Corrupted(format!(
                "revision tree slot {revision} holds revision {}",
                root.as_revision_root()?.revision()
            ))
            .into());
        }
        Ok(root)
    }

    /// Makes a written uber page the committed root.
    pub fn publish(&self, locator: PageLocator) -> Result<CommittedPage> {
        let uber = self.source.load(&locator)?;
        uber.as_uber()?;
        if self.config.sync_on_commit {
            self.source.sync()?;
        }
        self.source.write_root(&locator)?;
        *self.committed.write() = uber.clone();
        self.metrics.inc_revisions_committed();
        Ok(uber)
    }

    pub fn metrics(&self) -> &StoreMetrics {
        &self.metrics
    }
}

/// An open store. Cheap to clone; clones share one session.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl Store {
    /// Opens a store on `backend`, bootstrapping it when empty.
    pub fn open(backend: Arc<dyn Backend>, config: StoreConfig) -> Result<Self> {
        Self::open_with_factory(backend, config, Arc::new(DefaultNodeFactory))
    }

    /// Opens a store with a custom node payload factory.
    pub fn open_with_factory(
        backend: Arc<dyn Backend>,
        config: StoreConfig,
        factory: Arc<dyn NodeFactory>,
    ) -> Result<Self> {
        config.validate()?;
        let metrics = Arc::new(StoreMetrics::new());
        let source = PageSource::new(
            backend,
            factory,
            config.page_cache_capacity,
            Arc::clone(&metrics),
        );
        let settings = StoreSettings {
            hash_kind: config.hash_kind,
            node_layout: config.node_layout.clone(),
            revision_layout: config.revision_layout.clone(),
        };

        let (uber, locator) = match source.read_root()? {
            Some(locator) => (source.load(&locator)?, locator),
            None => {
                let locator = bootstrap(&source, &settings)?;
                if config.sync_on_commit {
                    source.sync()?;
                }
                source.write_root(&locator)?;
                (source.load(&locator)?, locator)
            }
        };
        check_settings(uber.as_uber()?.settings(), &settings)?;

        let inner = Arc::new(StoreInner {
            source,
            config,
            settings,
            metrics,
            committed: RwLock::new(uber.clone()),
            writer_active: AtomicBool::new(false),
            key_watermark: AtomicU64::new(0),
        });
        let latest = uber.as_uber()?.revision_number();
        let root = inner.load_revision_root(&uber, latest)?;
        inner.raise_key_watermark(root.as_revision_root()?.max_node_key());
        info!(
            revision = latest,
            storage_key = locator.storage_key,
            hash_kind = %inner.settings.hash_kind,
            "store opened"
        );
        Ok(Self { inner })
    }

    /// Opens an ephemeral in-memory store.
    pub fn in_memory(config: StoreConfig) -> Result<Self> {
        Self::open(Arc::new(MemoryBackend::new()), config)
    }

    /// Opens or creates a store in a directory.
    pub fn open_dir<P: AsRef<Path>>(dir: P, config: StoreConfig) -> Result<Self> {
        Self::open(Arc::new(FileBackend::open(dir)?), config)
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// Newest readable revision. Revision 0 is the bootstrap revision.
    pub fn latest_revision(&self) -> Result<u64> {
        Ok(self.inner.committed_uber().as_uber()?.revision_number())
    }

    /// Newest revision produced by a commit, `None` before the first one.
    pub fn last_committed_revision(&self) -> Result<Option<u64>> {
        let uber = self.inner.committed_uber();
        let uber = uber.as_uber()?;
        Ok((!uber.is_bootstrap()).then(|| uber.revision_number()))
    }

    /// Opens a read transaction on the latest revision.
    pub fn begin_read(&self) -> Result<ReadTrx> {
        let latest = self.latest_revision()?;
        self.begin_read_at(latest)
    }

    /// Opens a read transaction on `revision`.
    pub fn begin_read_at(&self, revision: u64) -> Result<ReadTrx> {
        let uber = self.inner.committed_uber();
        let root = self.inner.load_revision_root(&uber, revision)?;
        ReadTrx::new(Arc::clone(&self.inner), root)
    }

    /// Opens the write transaction. Only one may be open at a time.
    pub fn begin_write(&self) -> Result<WriteTrx> {
        if self
            .inner
            .writer_active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(TrxError::WriterBusy);
        }
        match WriteTrx::new(Arc::clone(&self.inner)) {
            Ok(trx) => {
                debug!(revision = trx.revision_number(), "write transaction opened");
                Ok(trx)
            }
            Err(e) => {
                self.inner.release_writer();
                Err(e)
            }
        }
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics().snapshot()
    }
}

fn check_settings(stored: &StoreSettings, requested: &StoreSettings) -> Result<()> {
    if stored.hash_kind != requested.hash_kind {
        return Err(TrxError::ConfigMismatch(format!(
            "store uses {} hashing, configuration asks for {}",
            stored.hash_kind, requested.hash_kind
        )));
    }
    if stored.node_layout != requested.node_layout {
        return Err(TrxError::ConfigMismatch("node key layout differs".into()));
    }
    if stored.revision_layout != requested.revision_layout {
        return Err(TrxError::ConfigMismatch("revision layout differs".into()));
    }
    Ok(())
}

/// Writes revision 0: one document root node with key 0.
fn bootstrap(source: &PageSource, settings: &StoreSettings) -> Result<PageLocator> {
    let mut log = TrxLog::bootstrap(source, UberPage::bootstrap(settings.clone()))?;

    let mut root = Node::document_root();
    if settings.hash_kind.is_enabled() {
        root.hash = self_hash(&root);
    }
    let path = settings
        .node_layout
        .path(NodeKey::DOCUMENT_ROOT.0)
        .map_err(PageError::from)?;
    let handle = log.prepare_node_page(source, &settings.node_layout, &path)?;
    log.page_mut(handle)?.as_node_mut()?.set(path.slot, root)?;

    let locator = log.persist(source)?;
    info!(hash_kind = %settings.hash_kind, "bootstrapped empty store");
    Ok(locator)
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}
