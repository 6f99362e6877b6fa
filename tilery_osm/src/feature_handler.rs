use crate::{FeatureInserter, PendingFeature, Profile};
use anyhow::{Context, Result};
use tilery_geometry::fixed::{FixedGeometry, FixedXy, SimplePolygon};
use tilery_storage::db::{LayerNamesBuilder, SharedMetadataBuilder};
use tilery_storage::feature::Feature;

/// Turns classified OSM objects into stored features: runs the profile,
/// resolves the layer id, records metadata frequencies and hands the
/// feature to the inserter. Each import worker owns one handler.
pub struct FeatureHandler<'a> {
	profile: &'a dyn Profile,
	inserter: &'a FeatureInserter<'a>,
	layer_names: &'a LayerNamesBuilder,
	shared_metadata: &'a SharedMetadataBuilder,
}

impl<'a> FeatureHandler<'a> {
	pub fn new(
		profile: &'a dyn Profile,
		inserter: &'a FeatureInserter<'a>,
		layer_names: &'a LayerNamesBuilder,
		shared_metadata: &'a SharedMetadataBuilder,
	) -> FeatureHandler<'a> {
		FeatureHandler {
			profile,
			inserter,
			layer_names,
			shared_metadata,
		}
	}

	pub fn handle_node(&self, id: i64, tags: &[(String, String)], position: FixedXy) -> Result<()> {
		let mut pending =
			PendingFeature::new(id, tags, move || Ok(FixedGeometry::Point(vec![position])));
		self.profile.process_node(&mut pending)?;
		self.finish(pending)
	}

	pub fn handle_way(&self, id: i64, tags: &[(String, String)], line: Vec<FixedXy>) -> Result<()> {
		if line.len() < 2 {
			return Ok(());
		}

		// closed ways with area semantics become polygons
		if line.first() == line.last() && line.len() >= 4 && has_area_tags(tags) {
			let polygon = FixedGeometry::Polygon(vec![SimplePolygon {
				outer: line,
				inners: vec![],
			}]);
			let mut pending = PendingFeature::new(id, tags, move || Ok(polygon));
			self.profile.process_area(&mut pending)?;
			return self.finish(pending);
		}

		let mut pending =
			PendingFeature::new(id, tags, move || Ok(FixedGeometry::Polyline(vec![line])));
		self.profile.process_way(&mut pending)?;
		self.finish(pending)
	}

	pub fn handle_multipolygon(
		&self,
		id: i64,
		tags: &[(String, String)],
		polygons: Vec<SimplePolygon>,
	) -> Result<()> {
		if polygons.is_empty() {
			return Ok(());
		}
		let mut pending =
			PendingFeature::new(id, tags, move || Ok(FixedGeometry::Polygon(polygons)));
		self.profile.process_area(&mut pending)?;
		self.finish(pending)
	}

	fn finish(&self, pending: PendingFeature) -> Result<()> {
		if !pending.approved {
			return Ok(());
		}
		let Some(layer) = pending.target_layer.clone() else {
			return Ok(());
		};

		let id = pending.id().unsigned_abs();
		let zoom_levels = pending.zoom_levels;
		let meta = pending.metadata.clone();
		let geometry = pending
			.into_geometry()
			.with_context(|| format!("failed to read geometry of object {id}"))?;
		if geometry.is_null() {
			return Ok(());
		}

		for (key, value) in &meta {
			self.shared_metadata.record(key, value);
		}

		self.inserter.insert(&Feature {
			id,
			layer: self.layer_names.layer_id(&layer),
			zoom_levels,
			meta,
			geometry,
		})
	}
}

/// Tags that make a closed way an area rather than a ring road.
fn has_area_tags(tags: &[(String, String)]) -> bool {
	if tags.iter().any(|(k, v)| k == "area" && v == "yes") {
		return true;
	}
	tags.iter().any(|(key, _)| {
		matches!(
			key.as_str(),
			"building" | "landuse" | "natural" | "leisure" | "amenity" | "water"
		)
	})
}
