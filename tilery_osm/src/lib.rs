//! OpenStreetMap and coastline import.
//!
//! The import runs two passes over the OSM source: pass one builds the
//! hybrid node index and collects multipolygon relations, pass two decodes
//! and classifies objects on a bounded parallel pipeline and assembles
//! relation geometries in order. Coastline shapefiles turn into the
//! fully-seaside tree plus land polygon features.

mod feature_handler;
mod hybrid_node_idx;
mod inserter;
mod load_coastlines;
mod load_osm;
mod pending_feature;
mod profile;

pub use feature_handler::FeatureHandler;
pub use hybrid_node_idx::{HybridNodeIdx, HybridNodeIdxBuilder};
pub use inserter::FeatureInserter;
pub use load_coastlines::load_coastlines;
pub use load_osm::load_osm;
pub use pending_feature::PendingFeature;
pub use profile::{DefaultProfile, Profile};
