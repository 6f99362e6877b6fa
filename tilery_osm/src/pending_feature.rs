use anyhow::Result;
use tilery_geometry::fixed::{area, FixedCoord, FixedGeometry, MAX_ZOOM};
use tilery_storage::feature::EncodedValue;

/// A feature under classification: the profile inspects tags, approves a
/// zoom range, chooses a layer and attaches metadata. Geometry is read
/// lazily, only classifications based on area force it.
pub struct PendingFeature<'a> {
	id: i64,
	tags: &'a [(String, String)],
	read_geometry: Box<dyn FnOnce() -> Result<FixedGeometry> + 'a>,
	geometry: Option<FixedGeometry>,
	pub approved: bool,
	pub zoom_levels: (u32, u32),
	pub target_layer: Option<String>,
	pub metadata: Vec<(String, EncodedValue)>,
}

impl<'a> PendingFeature<'a> {
	pub fn new(
		id: i64,
		tags: &'a [(String, String)],
		read_geometry: impl FnOnce() -> Result<FixedGeometry> + 'a,
	) -> PendingFeature<'a> {
		PendingFeature {
			id,
			tags,
			read_geometry: Box::new(read_geometry),
			geometry: None,
			approved: false,
			zoom_levels: (0, MAX_ZOOM + 1),
			target_layer: None,
			metadata: Vec::new(),
		}
	}

	pub fn id(&self) -> i64 {
		self.id
	}

	pub fn tag(&self, key: &str) -> &str {
		self.tags
			.iter()
			.find(|(k, _)| k == key)
			.map_or("", |(_, v)| v.as_str())
	}

	pub fn has_tag(&self, key: &str, value: &str) -> bool {
		self.tag(key) == value
	}

	/// With values: whether the tag carries any of them. Without values:
	/// whether the tag is present at all.
	pub fn has_any_tag(&self, key: &str, values: &[&str]) -> bool {
		if values.is_empty() {
			return self.tags.iter().any(|(k, _)| k == key);
		}
		let actual = self.tag(key);
		values.iter().any(|value| *value == actual)
	}

	pub fn set_approved(&mut self, min: u32, max: u32) {
		self.approved = true;
		self.zoom_levels = (min, max);
	}

	pub fn set_approved_min(&mut self, min: u32) {
		self.set_approved(min, MAX_ZOOM + 1);
	}

	pub fn set_approved_full(&mut self) {
		self.set_approved(0, MAX_ZOOM + 1);
	}

	/// Approves from the first `(zoom, max_area)` pair matching the
	/// feature's area; a limit of `-1` always matches. Forces geometry
	/// computation.
	pub fn set_approved_min_by_area(&mut self, pairs: &[(u32, FixedCoord)]) -> Result<()> {
		let feature_area = area(self.geometry()?);
		for (zoom, limit) in pairs {
			if *limit == -1 || feature_area < *limit {
				self.set_approved_min(*zoom);
				break;
			}
		}
		Ok(())
	}

	pub fn set_target_layer(&mut self, layer: &str) {
		self.target_layer = Some(layer.to_string());
	}

	pub fn add_bool(&mut self, key: &str, value: bool) {
		self.metadata.push((key.to_string(), EncodedValue::Bool(value)));
	}

	pub fn add_string(&mut self, key: &str, value: &str) {
		self
			.metadata
			.push((key.to_string(), EncodedValue::String(value.to_string())));
	}

	pub fn add_integer(&mut self, key: &str, value: i64) {
		self
			.metadata
			.push((key.to_string(), EncodedValue::Integer(value)));
	}

	pub fn add_numeric(&mut self, key: &str, value: f64) {
		self
			.metadata
			.push((key.to_string(), EncodedValue::Numeric(value)));
	}

	/// The feature geometry, computed on first access.
	pub fn geometry(&mut self) -> Result<&FixedGeometry> {
		if self.geometry.is_none() {
			let read = std::mem::replace(&mut self.read_geometry, Box::new(|| Ok(FixedGeometry::Null)));
			self.geometry = Some(read()?);
		}
		Ok(self.geometry.as_ref().unwrap())
	}

	pub fn into_geometry(mut self) -> Result<FixedGeometry> {
		self.geometry()?;
		Ok(self.geometry.unwrap())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::cell::Cell;
	use tilery_geometry::fixed::{FixedXy, SimplePolygon};

	fn tags(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
		pairs
			.iter()
			.map(|(k, v)| (k.to_string(), v.to_string()))
			.collect()
	}

	fn square(size: i64) -> FixedGeometry {
		FixedGeometry::Polygon(vec![SimplePolygon {
			outer: vec![
				FixedXy::new(0, 0),
				FixedXy::new(size, 0),
				FixedXy::new(size, size),
				FixedXy::new(0, size),
				FixedXy::new(0, 0),
			],
			inners: vec![],
		}])
	}

	#[test]
	fn tag_queries() {
		let tags = tags(&[("highway", "primary"), ("name", "B3")]);
		let feature = PendingFeature::new(1, &tags, || Ok(FixedGeometry::Null));

		assert!(feature.has_tag("highway", "primary"));
		assert!(!feature.has_tag("highway", "motorway"));
		assert_eq!(feature.tag("name"), "B3");
		assert_eq!(feature.tag("missing"), "");
		assert!(feature.has_any_tag("highway", &["motorway", "primary"]));
		assert!(!feature.has_any_tag("highway", &["motorway", "trunk"]));
		assert!(feature.has_any_tag("name", &[]));
		assert!(!feature.has_any_tag("ref", &[]));
	}

	#[test]
	fn approval_shorthands() {
		let tags = vec![];
		let mut feature = PendingFeature::new(1, &tags, || Ok(FixedGeometry::Null));
		assert!(!feature.approved);

		feature.set_approved_min(9);
		assert!(feature.approved);
		assert_eq!(feature.zoom_levels, (9, MAX_ZOOM + 1));

		feature.set_approved_full();
		assert_eq!(feature.zoom_levels, (0, MAX_ZOOM + 1));

		feature.set_approved(3, 12);
		assert_eq!(feature.zoom_levels, (3, 12));
	}

	#[test]
	fn area_banded_approval() -> Result<()> {
		// 100 x 100 square, area 10000
		let tags = vec![];
		let mut feature = PendingFeature::new(1, &tags, || Ok(square(100)));
		feature.set_approved_min_by_area(&[(8, 20_000), (12, -1)])?;
		assert_eq!(feature.zoom_levels.0, 8);

		let mut feature = PendingFeature::new(1, &tags, || Ok(square(1000)));
		feature.set_approved_min_by_area(&[(8, 20_000), (12, -1)])?;
		assert_eq!(feature.zoom_levels.0, 12);
		Ok(())
	}

	#[test]
	fn geometry_is_read_once() -> Result<()> {
		let calls = Cell::new(0);
		let tags = vec![];
		let mut feature = PendingFeature::new(1, &tags, || {
			calls.set(calls.get() + 1);
			Ok(square(10))
		});

		feature.set_approved_min_by_area(&[(10, -1)])?;
		assert!(!feature.geometry()?.is_null());
		assert_eq!(calls.get(), 1);
		Ok(())
	}
}
