//! Pod stack layout.
//!
//! Everything here is a pure projection of (order, focus, geometry) into
//! per-pod targets; rendering is left to whatever toolkit consumes the
//! [`LayoutFrame`].

use serde::{Deserialize, Serialize};

use super::focus::Direction;
use crate::config::LayoutSettings;
use crate::constants::{POD_EXIT_MS, POD_MOVE_MS, POD_SLIDE_DISTANCE};
use crate::models::{PodKey, PodTarget};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LayoutGeometry {
    pub container_width: f32,
    pub pod_width: f32,
    pub pod_overlap: f32,
}

impl LayoutGeometry {
    pub fn new(container_width: f32, pod_width: f32, pod_overlap: f32) -> Self {
        Self {
            container_width,
            pod_width,
            pod_overlap,
        }
    }

    pub fn from_settings(settings: &LayoutSettings) -> Self {
        Self::new(
            settings.container_width as f32,
            settings.pod_width as f32,
            settings.pod_overlap as f32,
        )
    }

    /// Horizontal distance between neighbouring pods
    pub fn step(&self) -> f32 {
        (self.pod_width - self.pod_overlap).max(1.0)
    }

    /// Pods shown at once: every one that fits, the focused one included,
    /// plus one partially visible overflow pod.
    pub fn capacity(&self) -> usize {
        let room = (self.container_width - self.pod_width).max(0.0);
        (room / self.step()).floor() as usize + 2
    }

    fn offstage_offset(&self) -> f32 {
        self.capacity() as f32 * self.step() + POD_SLIDE_DISTANCE
    }
}

/// Edge of the stack a pod slides from or to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Edge {
    Leading,
    Trailing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Motion {
    /// Plain inward (enter) or outward (exit) transform
    Default,
    Slide(Edge),
}

impl Motion {
    /// Entrance/exit bias after a rotation
    pub fn for_direction(direction: Option<Direction>) -> Self {
        match direction {
            Some(Direction::Forward) => Self::Slide(Edge::Trailing),
            Some(Direction::Backward) => Self::Slide(Edge::Leading),
            None => Self::Default,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnimationKind {
    Enter(Motion),
    Move,
    Hide,
    Exit(Motion),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Animation {
    pub key: PodKey,
    pub kind: AnimationKind,
    pub target: PodTarget,
    pub duration_ms: u64,
}

/// Master detail panel shown for the focused pod
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DetailPanel {
    #[default]
    Hidden,
    Shown(PodKey),
    /// Fading out ahead of its pod's removal
    Closing(PodKey),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodPlacement {
    pub key: PodKey,
    pub target: PodTarget,
    pub focused: bool,
}

/// Everything a renderer needs for one relayout
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LayoutFrame {
    pub placements: Vec<PodPlacement>,
    pub animations: Vec<Animation>,
    pub detail: DetailPanel,
}

impl LayoutFrame {
    pub fn placement(&self, key: &PodKey) -> Option<&PodPlacement> {
        self.placements.iter().find(|p| &p.key == key)
    }
}

/// Target of every pod in `order` (oldest first).
///
/// The focused pod sits at the anchor with the highest z-index; the pile
/// follows newest first, one step further out each.
pub fn compute_placements(
    order: &[PodKey],
    focused: Option<&PodKey>,
    geometry: &LayoutGeometry,
) -> Vec<PodPlacement> {
    let count = order.len() as i32;
    let capacity = geometry.capacity();
    let mut placements = Vec::with_capacity(order.len());

    if let Some(focused) = focused.filter(|key| order.contains(key)) {
        placements.push(PodPlacement {
            key: focused.clone(),
            target: PodTarget {
                offset_x: 0.0,
                opacity: 1.0,
                z_index: count + 1,
            },
            focused: true,
        });
    }

    let shown_before = placements.len();
    let pile = order.iter().rev().filter(|key| Some(*key) != focused);
    for (index, key) in pile.enumerate() {
        let slot = shown_before + index;
        let target = if slot < capacity {
            PodTarget {
                offset_x: slot as f32 * geometry.step(),
                opacity: 1.0,
                z_index: count - index as i32,
            }
        } else {
            PodTarget {
                offset_x: geometry.offstage_offset(),
                opacity: 0.0,
                z_index: 0,
            }
        };
        placements.push(PodPlacement {
            key: key.clone(),
            target,
            focused: false,
        });
    }

    placements
}

/// Animations needed to move from each pod's last-applied target to its
/// new one. Pods whose target did not change are skipped.
pub fn plan_animations<F>(
    placements: &[PodPlacement],
    previous: F,
    direction: Option<Direction>,
) -> Vec<Animation>
where
    F: Fn(&PodKey) -> Option<PodTarget>,
{
    placements
        .iter()
        .filter_map(|placement| {
            let kind = match previous(&placement.key) {
                Some(last) if last == placement.target => return None,
                // Never shown and still hidden
                None if !placement.target.is_shown() => return None,
                None => AnimationKind::Enter(Motion::for_direction(direction)),
                Some(last) if last.is_shown() && !placement.target.is_shown() => {
                    AnimationKind::Hide
                }
                Some(last) if !last.is_shown() => {
                    AnimationKind::Enter(Motion::for_direction(direction))
                }
                Some(_) => AnimationKind::Move,
            };
            Some(Animation {
                key: placement.key.clone(),
                kind,
                target: placement.target,
                duration_ms: POD_MOVE_MS,
            })
        })
        .collect()
}

/// Slide-out for a pod leaving the stack
pub fn exit_animation(key: PodKey, last: Option<PodTarget>, direction: Option<Direction>) -> Animation {
    let from = last.map(|t| t.offset_x).unwrap_or(0.0);
    let motion = Motion::for_direction(direction);
    let offset_x = match motion {
        Motion::Slide(Edge::Leading) => from - POD_SLIDE_DISTANCE,
        Motion::Slide(Edge::Trailing) | Motion::Default => from + POD_SLIDE_DISTANCE,
    };

    Animation {
        key,
        kind: AnimationKind::Exit(motion),
        target: PodTarget {
            offset_x,
            opacity: 0.0,
            z_index: last.map(|t| t.z_index).unwrap_or(0),
        },
        duration_ms: POD_EXIT_MS,
    }
}
