use crate::PendingFeature;
use anyhow::Result;

/// Classifies OSM objects into layers and zoom bands. The boundary is a
/// plain trait so alternative rule sets (or an embedded scripting host)
/// can be swapped in without touching the import pipeline.
pub trait Profile: Send + Sync {
	fn process_node(&self, feature: &mut PendingFeature) -> Result<()>;
	fn process_way(&self, feature: &mut PendingFeature) -> Result<()>;
	fn process_area(&self, feature: &mut PendingFeature) -> Result<()>;
}

// area thresholds in fixed units squared; one km^2 is roughly 4.5e11 at the
// equator (674 fixed units per meter)
const AREA_SQKM: i64 = 454_000_000_000;

/// The built-in general purpose map profile.
#[derive(Default)]
pub struct DefaultProfile;

impl DefaultProfile {
	pub fn new() -> DefaultProfile {
		DefaultProfile
	}

	fn add_name(&self, feature: &mut PendingFeature) {
		let name = feature.tag("name").to_string();
		if !name.is_empty() {
			feature.add_string("name", &name);
		}
	}
}

impl Profile for DefaultProfile {
	fn process_node(&self, feature: &mut PendingFeature) -> Result<()> {
		let place = feature.tag("place").to_string();
		match place.as_str() {
			"city" => feature.set_approved_min(4),
			"town" => feature.set_approved_min(8),
			"village" => feature.set_approved_min(11),
			"hamlet" | "suburb" => feature.set_approved_min(13),
			_ => {}
		}
		if feature.approved {
			feature.set_target_layer("place");
			feature.add_string("kind", &place);
			if let Ok(population) = feature.tag("population").parse::<i64>() {
				feature.add_integer("population", population);
			}
			self.add_name(feature);
			return Ok(());
		}

		if feature.has_any_tag("railway", &["station", "halt"]) {
			feature.set_approved_min(12);
			feature.set_target_layer("station");
			self.add_name(feature);
			return Ok(());
		}

		if feature.has_any_tag("amenity", &[]) || feature.has_any_tag("shop", &[]) {
			feature.set_approved_min(16);
			feature.set_target_layer("poi");
			let kind = feature.tag("amenity").to_string();
			if kind.is_empty() {
				feature.add_string("kind", "shop");
			} else {
				feature.add_string("kind", &kind);
			}
			self.add_name(feature);
		}
		Ok(())
	}

	fn process_way(&self, feature: &mut PendingFeature) -> Result<()> {
		let highway = feature.tag("highway").to_string();
		let min_zoom = match highway.as_str() {
			"motorway" | "motorway_link" | "trunk" | "trunk_link" => Some(5),
			"primary" | "primary_link" => Some(8),
			"secondary" | "secondary_link" => Some(9),
			"tertiary" | "tertiary_link" => Some(11),
			"residential" | "unclassified" | "living_street" => Some(12),
			"service" | "track" | "pedestrian" => Some(14),
			"footway" | "path" | "cycleway" | "steps" => Some(15),
			_ => None,
		};
		if let Some(min_zoom) = min_zoom {
			feature.set_approved_min(min_zoom);
			feature.set_target_layer("road");
			feature.add_string("kind", &highway);
			if feature.has_tag("oneway", "yes") {
				feature.add_bool("oneway", true);
			}
			let reference = feature.tag("ref").to_string();
			if !reference.is_empty() {
				feature.add_string("ref", &reference);
			}
			self.add_name(feature);
			return Ok(());
		}

		if feature.has_any_tag("railway", &["rail", "light_rail", "subway", "tram"]) {
			feature.set_approved_min(8);
			feature.set_target_layer("rail");
			feature.add_string("kind", feature.tag("railway").to_string().as_str());
			self.add_name(feature);
			return Ok(());
		}

		let waterway = feature.tag("waterway").to_string();
		match waterway.as_str() {
			"river" | "canal" => feature.set_approved_min(8),
			"stream" | "ditch" | "drain" => feature.set_approved_min(13),
			_ => {}
		}
		if feature.approved {
			feature.set_target_layer("waterway");
			feature.add_string("kind", &waterway);
			self.add_name(feature);
			return Ok(());
		}

		if feature.has_any_tag("boundary", &["administrative"]) {
			let admin_level = feature.tag("admin_level").parse::<i64>().unwrap_or(11);
			if admin_level <= 4 {
				feature.set_approved_min(2);
			} else if admin_level <= 8 {
				feature.set_approved_min(10);
			} else {
				return Ok(());
			}
			feature.set_target_layer("boundary");
			feature.add_integer("admin_level", admin_level);
		}
		Ok(())
	}

	fn process_area(&self, feature: &mut PendingFeature) -> Result<()> {
		if feature.has_any_tag("building", &[]) {
			// growing area limits, sinking zoom levels
			feature.set_approved_min_by_area(&[(14, AREA_SQKM / 100), (13, -1)])?;
			feature.set_target_layer("building");
			self.add_name(feature);
			return Ok(());
		}

		if feature.has_any_tag("natural", &["water", "bay"])
			|| feature.has_any_tag("waterway", &["riverbank"])
			|| feature.has_any_tag("landuse", &["reservoir", "basin"])
		{
			feature.set_approved_min_by_area(&[
				(10, AREA_SQKM),
				(8, 10 * AREA_SQKM),
				(6, 100 * AREA_SQKM),
				(4, -1),
			])?;
			feature.set_target_layer("water");
			self.add_name(feature);
			return Ok(());
		}

		if feature.has_any_tag("leisure", &["park", "nature_reserve", "garden"])
			|| feature.has_any_tag("landuse", &["forest", "meadow", "grass", "recreation_ground"])
			|| feature.has_any_tag("natural", &["wood", "scrub", "heath"])
		{
			feature.set_approved_min_by_area(&[(11, AREA_SQKM), (9, 10 * AREA_SQKM), (6, -1)])?;
			feature.set_target_layer("landuse");
			feature.add_string(
				"kind",
				if feature.has_any_tag("leisure", &[]) {
					"park"
				} else {
					"green"
				},
			);
			self.add_name(feature);
			return Ok(());
		}

		if feature.has_any_tag(
			"landuse",
			&["residential", "commercial", "industrial", "retail", "farmland"],
		) {
			feature.set_approved_min_by_area(&[(11, 10 * AREA_SQKM), (9, -1)])?;
			feature.set_target_layer("landuse");
			feature.add_string("kind", feature.tag("landuse").to_string().as_str());
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tilery_geometry::fixed::{FixedGeometry, FixedXy, SimplePolygon};

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
	fn motorways_appear_early() -> Result<()> {
		let profile = DefaultProfile::new();
		let tags = tags(&[("highway", "motorway"), ("ref", "A5")]);
		let mut feature = PendingFeature::new(1, &tags, || Ok(FixedGeometry::Null));
		profile.process_way(&mut feature)?;

		assert!(feature.approved);
		assert_eq!(feature.zoom_levels.0, 5);
		assert_eq!(feature.target_layer.as_deref(), Some("road"));
		assert!(feature
			.metadata
			.iter()
			.any(|(key, _)| key == "ref"));
		Ok(())
	}

	#[test]
	fn untagged_ways_stay_unapproved() -> Result<()> {
		let profile = DefaultProfile::new();
		let tags = tags(&[("source", "survey")]);
		let mut feature = PendingFeature::new(1, &tags, || Ok(FixedGeometry::Null));
		profile.process_way(&mut feature)?;
		assert!(!feature.approved);
		Ok(())
	}

	#[test]
	fn small_lakes_appear_late() -> Result<()> {
		let profile = DefaultProfile::new();
		let tags = tags(&[("natural", "water")]);

		let mut small = PendingFeature::new(1, &tags, || Ok(square(1000)));
		profile.process_area(&mut small)?;
		assert_eq!(small.zoom_levels.0, 10);
		assert_eq!(small.target_layer.as_deref(), Some("water"));

		let huge_edge = 20_000_000; // area 4e14, beyond 100 km^2
		let mut huge = PendingFeature::new(2, &tags, || Ok(square(huge_edge)));
		profile.process_area(&mut huge)?;
		assert_eq!(huge.zoom_levels.0, 4);
		Ok(())
	}

	#[test]
	fn cities_carry_population() -> Result<()> {
		let profile = DefaultProfile::new();
		let tags = tags(&[
			("place", "city"),
			("name", "Darmstadt"),
			("population", "160000"),
		]);
		let mut feature = PendingFeature::new(1, &tags, || Ok(FixedGeometry::Null));
		profile.process_node(&mut feature)?;

		assert!(feature.approved);
		assert_eq!(feature.target_layer.as_deref(), Some("place"));
		assert!(feature
			.metadata
			.iter()
			.any(|(key, value)| key == "population"
				&& *value == tilery_storage::feature::EncodedValue::Integer(160_000)));
		Ok(())
	}
}
