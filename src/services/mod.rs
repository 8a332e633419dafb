pub mod autohide;
pub mod focus;
pub mod identity;
pub mod layout;
pub mod preview;
pub mod registry;
pub mod rename;
pub mod session;
pub mod throttle;

pub use autohide::{AutohideFired, AutohideScheduler};
pub use focus::{Direction, FocusController};
pub use identity::IdentityResolver;
pub use layout::{
    Animation, AnimationKind, DetailPanel, Edge, LayoutFrame, LayoutGeometry, Motion,
    PodPlacement, compute_placements, exit_animation, plan_animations,
};
pub use preview::PreviewResolver;
pub use registry::{PodRegistry, UpdateOrigin, Upserted};
pub use rename::{
    RenameFailure, RenameOutcome, RenamePipeline, RenameRequest, RenameStage, RenameTicket,
};
pub use session::{Session, SessionInput, SessionSnapshot};
pub use throttle::UpdateThrottle;
