//! Route rendering
//!
//! A [`RouteDescriptor`] (car, walk, transit or nothing) is turned into
//! `CLEAR_ROUTE` followed by the matching draw message on the map bridge.

mod model;
mod renderer;

pub use model::{
    PathRoute, PathSegment, RouteDescriptor, RouteKind, RouteStop, SegmentKind, StopMarker,
    StopRole, TransitItinerary, TransitLeg, TransitMode, TransitPlace, TransitPlan,
};
pub use renderer::RouteRenderer;
