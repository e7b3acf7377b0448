pub mod destinations;
pub mod target;

pub use destinations::{RoundRobinCursor, RouteDestinations, RoutingDestinationSet};
pub use target::{ResolvedTarget, TargetCluster, resolve};
