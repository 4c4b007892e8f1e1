//! Multi-plane image containers
//!
//! One generic owner type, [`MultiPlaneImage`], backs every image in the
//! pipeline. Color spaces are aliases over it plus free functions in
//! [`crate::color_pipeline::convert`].

pub(crate) mod multi_plane;
pub mod types;

pub use multi_plane::{MultiPlaneImage, Sample};
pub use types::{
    CalibratedImage, FlatFieldImage, LabImage, RawFrame, RgbImage, XyzImage, X_PLANE, Y_PLANE,
    Z_PLANE,
};
