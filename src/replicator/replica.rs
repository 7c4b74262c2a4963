//! Clock-explicit replication state for one channel.
//!
//! [`Replicator`] decides, for each local change, whether to send now, defer
//! to a trailing flush, or stay quiet; and for each remote update, whether
//! to apply it and how. It never sleeps or spawns: callers pass the current
//! monotonic instant (for pacing) and wall-clock milliseconds (for wire
//! timestamps and staleness).

use std::time::Duration;

use tokio::time::Instant;

use super::{
    ApplyMode,
    Position,
    RejectedUpdate,
    ReplicationConfig,
    SourceId,
    SurfaceSnapshot,
    SyncUpdate,
};
use crate::message::Role;

/// What to do with a local change.
#[derive(Clone, Debug, PartialEq)]
pub enum Outbound {
    /// Send this update now.
    Send(SyncUpdate),
    /// The interval has not elapsed; the update is held until `due_at`.
    Deferred { due_at: Instant },
    /// The change follows a remote update just applied and is not
    /// replicated back.
    Suppressed,
}

/// Which of the update's values the target was derived from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApplyBasis {
    /// Pixel offsets, used when both surfaces have comparable extents.
    Absolute,
    /// Fractions of the movable range, rescaled to the local extent.
    Relative,
}

/// How an accepted remote update should be applied.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ApplyPlan {
    pub target: Position,
    pub mode: ApplyMode,
    pub basis: ApplyBasis,
}

#[derive(Clone, Copy, Debug)]
struct Sample {
    at: Instant,
    position: Position,
}

#[derive(Clone, Debug)]
struct Pending {
    update: SyncUpdate,
    due_at: Instant,
}

/// Replication state for one bound surface.
#[derive(Debug)]
pub struct Replicator {
    container_id: String,
    source_id: SourceId,
    role: Role,
    config: ReplicationConfig,
    velocity: f64,
    last_sample: Option<Sample>,
    last_sent_at: Option<Instant>,
    pending: Option<Pending>,
    last_applied_ts: Option<u64>,
    suppress_until: Option<Instant>,
}

impl Replicator {
    /// Create replication state for `container_id`.
    #[must_use]
    pub fn new(
        container_id: impl Into<String>,
        source_id: SourceId,
        role: Role,
        config: ReplicationConfig,
    ) -> Self {
        Self {
            container_id: container_id.into(),
            source_id,
            role,
            config: config.normalized(),
            velocity: 0.0,
            last_sample: None,
            last_sent_at: None,
            pending: None,
            last_applied_ts: None,
            suppress_until: None,
        }
    }

    #[must_use]
    pub fn container_id(&self) -> &str { &self.container_id }

    #[must_use]
    pub fn source_id(&self) -> &SourceId { &self.source_id }

    /// Most recent velocity estimate, in surface fractions per second.
    #[must_use]
    pub fn velocity(&self) -> f64 { self.velocity }

    /// Instant at which a deferred update becomes due, if one is held.
    #[must_use]
    pub fn next_due(&self) -> Option<Instant> { self.pending.as_ref().map(|p| p.due_at) }

    /// Timestamp of the last remote update applied.
    #[must_use]
    pub fn last_applied_ts(&self) -> Option<u64> { self.last_applied_ts }

    /// Handle a local change of the bound surface.
    pub fn on_local_change(
        &mut self,
        surface: &SurfaceSnapshot,
        now: Instant,
        wall_ms: u64,
    ) -> Outbound {
        self.observe(surface.position, now);
        if self.suppress_until.is_some_and(|until| now < until) {
            self.pending = None;
            return Outbound::Suppressed;
        }

        let update = self.build(surface, wall_ms);
        let interval = self.config.interval_for(self.velocity);
        match self.last_sent_at {
            Some(sent) if now < sent + interval => {
                let due_at = sent + interval;
                self.pending = Some(Pending { update, due_at });
                Outbound::Deferred { due_at }
            }
            _ => {
                self.pending = None;
                self.last_sent_at = Some(now);
                Outbound::Send(update)
            }
        }
    }

    /// Release the deferred update if it is due at `now`.
    pub fn take_due(&mut self, now: Instant) -> Option<SyncUpdate> {
        let pending = self.pending.take_if(|pending| pending.due_at <= now)?;
        self.last_sent_at = Some(now);
        Some(pending.update)
    }

    /// Decide whether and how to apply a remote update.
    ///
    /// Checks run in order: container, echo, staleness, supersession,
    /// surface readiness. An accepted update opens the local suppression
    /// window and discards any deferred local update.
    ///
    /// # Errors
    ///
    /// Returns the [`RejectedUpdate`] reason when the update must not be
    /// applied. Rejections leave the state untouched.
    pub fn on_remote(
        &mut self,
        update: &SyncUpdate,
        surface: &SurfaceSnapshot,
        now: Instant,
        wall_ms: u64,
    ) -> Result<ApplyPlan, RejectedUpdate> {
        if update.container_id != self.container_id {
            return Err(RejectedUpdate::ChannelMismatch {
                expected: self.container_id.clone(),
                found: update.container_id.clone(),
            });
        }
        if update.source_id == self.source_id {
            return Err(RejectedUpdate::Echo);
        }
        // Future-dated updates (peer clock ahead) have age zero.
        let age_ms = wall_ms.saturating_sub(update.ts);
        if age_ms > millis(self.config.freshness_window) {
            return Err(RejectedUpdate::Stale { age_ms });
        }
        if let Some(last_applied) = self.last_applied_ts {
            if update.ts <= last_applied {
                return Err(RejectedUpdate::Superseded {
                    ts: update.ts,
                    last_applied,
                });
            }
        }
        if !surface.ready {
            return Err(RejectedUpdate::SurfaceNotReady);
        }

        let plan = self.plan(update, surface);
        self.last_applied_ts = Some(update.ts);
        self.suppress_until = Some(now + self.config.suppress_window);
        self.pending = None;
        Ok(plan)
    }

    fn observe(&mut self, position: Position, now: Instant) {
        if let Some(previous) = self.last_sample {
            let elapsed = now.saturating_duration_since(previous.at).as_secs_f64();
            if elapsed > 0.0 {
                self.velocity = position.fraction_distance(&previous.position) / elapsed;
            }
        }
        self.last_sample = Some(Sample { at: now, position });
    }

    fn build(&self, surface: &SurfaceSnapshot, wall_ms: u64) -> SyncUpdate {
        let position = surface.position;
        SyncUpdate {
            container_id: self.container_id.clone(),
            percent_y: position.percent_y,
            percent_x: position.percent_x,
            px_y: position.px_y,
            px_x: position.px_x,
            scroll_height: surface.extent.scroll_height,
            client_height: surface.extent.client_height,
            velocity: self.velocity,
            source_id: self.source_id.clone(),
            user_type: self.role,
            ts: wall_ms,
        }
    }

    fn plan(&self, update: &SyncUpdate, surface: &SurfaceSnapshot) -> ApplyPlan {
        let (basis, target) = if surface
            .extent
            .is_comparable(&update.extent(), self.config.extent_tolerance)
        {
            (ApplyBasis::Absolute, update.position())
        } else {
            let target =
                Position::from_fractions(update.percent_x, update.percent_y, surface.extent);
            (ApplyBasis::Relative, target)
        };
        let mode = if target.px_distance(&surface.position) <= self.config.smooth_threshold_px {
            ApplyMode::Smooth
        } else {
            ApplyMode::Immediate
        };
        ApplyPlan { target, mode, basis }
    }
}

fn millis(duration: Duration) -> u64 { u64::try_from(duration.as_millis()).unwrap_or(u64::MAX) }
