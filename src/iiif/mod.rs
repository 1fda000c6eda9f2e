pub mod params;
pub mod planner;
pub mod profile;

pub use params::{
    QualitySpec, RegionSpec, RotationSpec, SizeSpec, TransformDescriptor,
};
pub use planner::{plan, render, Maxima, TransformPlan};
