mod animation;
mod editor;
mod outcome;

use std::time::Duration;

use chrono::{DateTime, Utc};
use wheelsync_core::{DocumentStore, Update};

use crate::{CollabContext, CollabError, Config, Connection, Result, WheelData, WheelItem};

pub use animation::*;
pub use editor::*;
pub use outcome::*;

/// Mirrors one wheel document and decides when to animate a spin.
///
/// The spin signal is a change of `latestSpinTime`. The first timestamp
/// observed is taken as the baseline, so joining a room never replays the
/// spin that happened before.
#[derive(Debug, Clone)]
pub struct WheelSync {
    config: Config,
    items: Vec<WheelItem>,
    rotation: f64,
    /// The spin time the last animation was started for
    last_animated: Option<DateTime<Utc>>,
    spinning: bool,
    /// A spin was requested locally and hasn't been observed yet
    requested: bool,
}

/// A wheel as it should be displayed at one instant
#[derive(Debug, Clone, PartialEq)]
pub struct WheelView {
    pub items: Vec<WheelItem>,
    /// The displayed rotation, which moves while a spin is animating
    pub rotation: f64,
    pub spinning: bool,
    /// False while the wheel is empty, spinning, or waiting for a requested spin
    pub can_spin: bool,
}

/// A spin animation every client in the room plays the same way
#[derive(Debug, Clone, PartialEq)]
pub struct SpinPlan {
    pub winner_index: usize,
    pub winner: WheelItem,
    /// The resting rotation after the animation
    pub rotation: f64,
    /// The total rotation the animation covers
    pub target_rotation: f64,
    pub duration: Duration,
}

impl WheelSync {
    pub fn new(config: &Config) -> Self {
        Self {
            config: config.clone(),
            items: Vec::new(),
            rotation: 0.,
            last_animated: None,
            spinning: false,
            requested: false,
        }
    }

    /// Mirrors a wheel snapshot. Returns a plan if it carries a spin that
    /// hasn't been animated yet.
    pub fn apply(&mut self, wheel: WheelData) -> Option<SpinPlan> {
        self.items = wheel.items;
        self.rotation = wheel.rotation;

        let spin_time = wheel.latest_spin_time?;

        let Some(last_animated) = self.last_animated else {
            // A request sent before the baseline may already be part of it
            self.last_animated = Some(spin_time);
            self.requested = false;
            return None;
        };

        if last_animated == spin_time {
            return None;
        }

        self.last_animated = Some(spin_time);
        self.requested = false;

        let winner_index = spin_outcome(&self.items, self.rotation)?;
        self.spinning = true;

        Some(SpinPlan {
            winner_index,
            winner: self.items[winner_index].clone(),
            rotation: self.rotation,
            target_rotation: self.config.spin_offset() + self.rotation,
            duration: self.config.spin_duration,
        })
    }

    /// Marks the animation of a plan as done
    pub fn finish(&mut self) {
        self.spinning = false;
    }

    pub fn can_spin(&self) -> bool {
        !self.items.is_empty() && !self.spinning && !self.requested
    }

    /// Marks a local spin request as sent. Returns false while a spin is
    /// animating or an earlier request hasn't been observed yet.
    pub fn begin_request(&mut self) -> bool {
        if self.spinning || self.requested {
            return false;
        }

        self.requested = true;
        true
    }

    /// Forgets a request whose write failed
    pub fn cancel_request(&mut self) {
        self.requested = false;
    }

    pub fn items(&self) -> &[WheelItem] {
        &self.items
    }

    /// The rotation the wheel rests at
    pub fn rotation(&self) -> f64 {
        self.rotation
    }

    pub fn is_spinning(&self) -> bool {
        self.spinning
    }
}

impl SpinPlan {
    /// The displayed rotation `elapsed` into the animation
    pub fn rotation_at(&self, elapsed: Duration) -> f64 {
        if elapsed >= self.duration {
            return self.target_rotation;
        }

        let progress = elapsed.as_secs_f64() / self.duration.as_secs_f64();
        SPIN_EASING.ease(progress) * self.target_rotation
    }
}

/// Fails unless the wheel of the room exists and has options to land on
pub async fn ensure_spinnable<Db>(context: &CollabContext<Db>, connection: &Connection) -> Result<()>
where
    Db: DocumentStore,
{
    let path = connection.wheel_path()?;
    let snapshot = context.store.get(&path).await?;
    let wheel = WheelData::from_snapshot(&snapshot)?
        .ok_or_else(|| CollabError::StaleReference(path.to_string()))?;

    if wheel.items.is_empty() {
        return Err(CollabError::InvalidInput("the wheel has no options"));
    }

    Ok(())
}

/// Writes a new rotation together with a fresh spin time, which every
/// subscribed client picks up as a spin.
pub async fn request_spin<Db>(context: &CollabContext<Db>, connection: &Connection, rotation: f64) -> Result<()>
where
    Db: DocumentStore,
{
    let update = Update::new()
        .set("rotation", rotation)
        .server_timestamp("latestSpinTime");

    context.store.update(&connection.wheel_path()?, update).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::Duration as TimeDelta;

    use super::*;
    use crate::Color;

    fn wheel(rotation: f64, spin_time: Option<DateTime<Utc>>) -> WheelData {
        WheelData {
            items: vec![
                WheelItem::new("A", Color::Slate800, Some(1)),
                WheelItem::new("B", Color::Slate700, Some(1)),
                WheelItem::new("C", Color::Slate400, Some(2)),
            ],
            rotation,
            latest_spin_time: spin_time,
        }
    }

    #[test]
    fn first_spin_time_is_the_baseline() {
        let mut sync = WheelSync::new(&Config::default());
        let t0 = Utc::now();

        assert_eq!(sync.apply(wheel(0., None)), None);
        assert_eq!(sync.apply(wheel(0., Some(t0))), None);
        assert!(sync.can_spin());

        let plan = sync.apply(wheel(0., Some(t0 + TimeDelta::seconds(1)))).unwrap();
        assert_eq!(plan.winner.option_name, "C");
        assert_eq!(plan.target_rotation, 3600.);
        assert_eq!(plan.duration, Duration::from_secs(2));
        assert!(!sync.can_spin());

        sync.finish();
        assert!(sync.can_spin());
    }

    #[test]
    fn same_spin_time_animates_once() {
        let mut sync = WheelSync::new(&Config::default());
        let t0 = Utc::now();
        let t1 = t0 + TimeDelta::seconds(3);

        sync.apply(wheel(0., Some(t0)));

        assert!(sync.apply(wheel(200., Some(t1))).is_some());
        sync.finish();
        assert!(sync.apply(wheel(200., Some(t1))).is_none());

        // A snapshot without a resolved time is never a new spin
        assert!(sync.apply(wheel(200., None)).is_none());
        assert!(sync.apply(wheel(200., Some(t1))).is_none());
    }

    #[test]
    fn empty_wheel_never_spins() {
        let mut sync = WheelSync::new(&Config::default());
        let t0 = Utc::now();
        let empty = |time| WheelData {
            items: vec![],
            rotation: 10.,
            latest_spin_time: Some(time),
        };

        sync.apply(empty(t0));
        assert!(!sync.can_spin());
        assert!(sync.apply(empty(t0 + TimeDelta::seconds(1))).is_none());
    }

    #[test]
    fn local_request_blocks_until_observed() {
        let mut sync = WheelSync::new(&Config::default());
        let t0 = Utc::now();
        sync.apply(wheel(0., Some(t0)));

        assert!(sync.begin_request());
        assert!(!sync.begin_request());
        assert!(!sync.can_spin());

        assert!(sync.apply(wheel(45., Some(t0 + TimeDelta::seconds(1)))).is_some());
        assert!(!sync.begin_request());
        sync.finish();
        assert!(sync.can_spin());

        assert!(sync.begin_request());
        sync.cancel_request();
        assert!(sync.can_spin());
    }

    #[test]
    fn request_before_baseline_is_released() {
        let mut sync = WheelSync::new(&Config::default());

        assert!(sync.begin_request());
        assert!(sync.apply(wheel(45., Some(Utc::now()))).is_none());
        assert!(sync.can_spin());
    }

    #[test]
    fn plan_eases_towards_target() {
        let mut sync = WheelSync::new(&Config::default());
        let t0 = Utc::now();
        sync.apply(wheel(0., Some(t0)));

        let plan = sync.apply(wheel(90., Some(t0 + TimeDelta::seconds(1)))).unwrap();

        assert_eq!(plan.rotation_at(Duration::ZERO), 0.);
        assert!(plan.rotation_at(Duration::from_secs(1)) > plan.target_rotation / 2.);
        assert_eq!(plan.rotation_at(Duration::from_secs(5)), 3690.);
    }
}
