use crate::context::RequestMetadata;
use crate::dsn::Dsn;
use crate::event::Breadcrumb;
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

/// Number of breadcrumbs a submission context keeps unless configured.
pub const DEFAULT_BREADCRUMB_LIMIT: usize = 5;

/// Process-wide, read-only submission settings shared by every context.
#[derive(Debug, Clone)]
pub struct BaseConfig {
    pub dsn: Option<Dsn>,
    pub environment: Option<String>,
    pub release: Option<String>,
    pub tags: BTreeMap<String, String>,
    pub breadcrumb_limit: usize,
}

impl Default for BaseConfig {
    fn default() -> Self {
        Self {
            dsn: None,
            environment: None,
            release: None,
            tags: BTreeMap::new(),
            breadcrumb_limit: DEFAULT_BREADCRUMB_LIMIT,
        }
    }
}

/// Isolated dispatch context: the shared base configuration plus a private
/// breadcrumb trail.
///
/// Clones share the same trail. Use [`SubmissionContext::new`] or
/// [`SubmissionContext::fork`] to get a context whose breadcrumbs are not
/// observable anywhere else.
#[derive(Clone)]
pub struct SubmissionContext {
    inner: Arc<ScopeInner>,
}

struct ScopeInner {
    base: Arc<BaseConfig>,
    tags: BTreeMap<String, String>,
    request: Option<Arc<RequestMetadata>>,
    breadcrumbs: Mutex<VecDeque<Breadcrumb>>,
}

impl SubmissionContext {
    pub fn new(base: Arc<BaseConfig>) -> Self {
        Self::with_parts(base, BTreeMap::new(), None)
    }

    pub fn with_parts(
        base: Arc<BaseConfig>,
        tags: BTreeMap<String, String>,
        request: Option<Arc<RequestMetadata>>,
    ) -> Self {
        let capacity = base.breadcrumb_limit;
        Self {
            inner: Arc::new(ScopeInner {
                base,
                tags,
                request,
                breadcrumbs: Mutex::new(VecDeque::with_capacity(capacity)),
            }),
        }
    }

    /// New context with the same base, tags and request but an empty trail.
    pub fn fork(&self) -> Self {
        Self::with_parts(
            Arc::clone(&self.inner.base),
            self.inner.tags.clone(),
            self.inner.request.clone(),
        )
    }

    pub fn base(&self) -> &BaseConfig {
        &self.inner.base
    }

    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.inner.tags
    }

    pub fn request(&self) -> Option<&RequestMetadata> {
        self.inner.request.as_deref()
    }

    pub fn capacity(&self) -> usize {
        self.inner.base.breadcrumb_limit
    }

    /// Append a breadcrumb, evicting the oldest ones beyond capacity.
    pub fn add_breadcrumb(&self, breadcrumb: Breadcrumb) {
        let capacity = self.capacity();
        if capacity == 0 {
            return;
        }
        let mut trail = self.inner.breadcrumbs.lock();
        while trail.len() >= capacity {
            trail.pop_front();
        }
        trail.push_back(breadcrumb);
    }

    /// Snapshot of the trail, oldest first.
    pub fn breadcrumbs(&self) -> Vec<Breadcrumb> {
        self.inner.breadcrumbs.lock().iter().cloned().collect()
    }

    /// Whether both handles refer to the same trail.
    pub fn same_as(&self, other: &SubmissionContext) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for SubmissionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubmissionContext")
            .field("tags", &self.inner.tags)
            .field("request", &self.inner.request)
            .field("breadcrumbs", &self.inner.breadcrumbs.lock().len())
            .finish()
    }
}
