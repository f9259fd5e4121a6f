use async_trait::async_trait;
use thiserror::Error;

/// Opaque handle to a "collapsed" affordance (a tree arrow, a "show more" row).
pub type AffordanceId = String;

/// Snapshot of the scroll container taken after an advance.
///
/// Two measurements are stationary when the item count and marker match and
/// the offsets (when both sides have one) differ by less than the tolerance.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Measurement {
    pub item_count: usize,
    /// Position fingerprint such as a transform offset in pixels.
    pub offset: Option<i64>,
    /// Identity of an edge item, e.g. the last rendered row.
    pub marker: Option<String>,
}

impl Measurement {
    pub fn count(item_count: usize) -> Self {
        Self {
            item_count,
            ..Self::default()
        }
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn with_marker(mut self, marker: impl Into<String>) -> Self {
        self.marker = Some(marker.into());
        self
    }

    pub fn is_stationary(&self, previous: &Measurement, offset_tolerance: i64) -> bool {
        if self.item_count != previous.item_count || self.marker != previous.marker {
            return false;
        }
        match (self.offset, previous.offset) {
            (Some(current), Some(before)) => (current - before).abs() < offset_tolerance,
            (None, None) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SurfaceError {
    #[error("target surface detached: {0}")]
    Detached(String),
    #[error("invalid selector `{0}`")]
    Selector(String),
    #[error("{0}")]
    Other(String),
}

/// The scrollable page region a sweep operates against.
///
/// Implementations wrap a live page (through a browser driver) or a recorded
/// one; the sweep never sees DOM positions, only nodes and measurements.
#[async_trait]
pub trait Surface: Send + Sync {
    type Node: Send + Sync;

    async fn container_present(&self) -> Result<bool, SurfaceError>;

    /// Moves straight to the logical beginning of the list.
    async fn jump_to_start(&self) -> Result<(), SurfaceError>;

    /// Scrolls by `delta` pixels; negative values move toward the start.
    async fn scroll_by(&self, delta: i64) -> Result<(), SurfaceError>;

    async fn measure(&self) -> Result<Measurement, SurfaceError>;

    async fn visible_nodes(&self) -> Result<Vec<Self::Node>, SurfaceError>;

    async fn collapsed_affordances(&self) -> Result<Vec<AffordanceId>, SurfaceError> {
        Ok(Vec::new())
    }

    /// Expands one affordance. Returns false if it vanished or was already open.
    async fn trigger(&self, _affordance: &AffordanceId) -> Result<bool, SurfaceError> {
        Ok(false)
    }
}
