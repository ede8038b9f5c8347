//! Box geometry shared by the dataset and inspection stages.
//!
//! Boxes carry a zero-sized marker for their coordinate space so that pixel
//! boxes read from annotations cannot be written out as normalized labels
//! (or the reverse) without an explicit conversion.

mod bbox;
mod space;

pub use bbox::BBoxXYXY;
pub use space::{Normalized, Pixel};
