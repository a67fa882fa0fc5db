//! Export formats for segmentation results.

mod geojson;
