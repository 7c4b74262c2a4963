//! The view-side surface a sync channel is bound to.

/// Position on a surface, both relative and absolute.
///
/// `percent_*` are fractions (`0.0..=1.0`) of the movable range; `px_*` are
/// offsets in pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Position {
    pub percent_x: f64,
    pub percent_y: f64,
    pub px_x: f64,
    pub px_y: f64,
}

impl Position {
    /// Position from fractions, with pixels derived from `extent`.
    #[must_use]
    pub fn from_fractions(percent_x: f64, percent_y: f64, extent: Extent) -> Self {
        let percent_x = percent_x.clamp(0.0, 1.0);
        let percent_y = percent_y.clamp(0.0, 1.0);
        Self {
            percent_x,
            percent_y,
            px_x: percent_x * extent.range(),
            px_y: percent_y * extent.range(),
        }
    }

    /// Largest per-axis pixel distance to `other`.
    #[must_use]
    pub fn px_distance(&self, other: &Self) -> f64 {
        (self.px_x - other.px_x)
            .abs()
            .max((self.px_y - other.px_y).abs())
    }

    /// Straight-line distance to `other` in fraction units.
    #[must_use]
    pub fn fraction_distance(&self, other: &Self) -> f64 {
        (self.percent_x - other.percent_x).hypot(self.percent_y - other.percent_y)
    }
}

/// Dimensions of a scrollable surface.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Extent {
    /// Total content height.
    pub scroll_height: f64,
    /// Visible height.
    pub client_height: f64,
}

impl Extent {
    /// Movable range: content height minus the visible height.
    #[must_use]
    pub fn range(&self) -> f64 { (self.scroll_height - self.client_height).max(0.0) }

    /// Whether pixel offsets on `self` and `other` can be used
    /// interchangeably, given a relative `tolerance`.
    #[must_use]
    pub fn is_comparable(&self, other: &Self, tolerance: f64) -> bool {
        within(self.scroll_height, other.scroll_height, tolerance)
            && within(self.client_height, other.client_height, tolerance)
    }
}

fn within(local: f64, remote: f64, tolerance: f64) -> bool {
    let scale = local.abs().max(remote.abs()).max(1.0);
    (local - remote).abs() <= tolerance * scale
}

/// How a target position should be reached.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApplyMode {
    /// Animate towards the target.
    Smooth,
    /// Jump to the target.
    Immediate,
}

/// State of a surface at one instant.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SurfaceSnapshot {
    pub ready: bool,
    pub extent: Extent,
    pub position: Position,
}

/// Capability the view layer provides for one synchronized surface.
///
/// Implementations are called from the engine's tasks and must not block.
pub trait Surface: Send + Sync + 'static {
    /// Whether the surface is laid out and can accept positions. Updates
    /// arriving while this is `false` are dropped.
    fn is_ready(&self) -> bool { true }

    /// Current dimensions.
    fn extent(&self) -> Extent;

    /// Current position.
    fn position(&self) -> Position;

    /// Move to `target`.
    fn apply(&self, target: Position, mode: ApplyMode);

    /// Capture readiness, extent and position together.
    fn snapshot(&self) -> SurfaceSnapshot {
        SurfaceSnapshot {
            ready: self.is_ready(),
            extent: self.extent(),
            position: self.position(),
        }
    }
}
