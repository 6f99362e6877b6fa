use super::{EncodedValue, Feature};
use tilery_geometry::fixed::{union_polygons, FixedGeometry, FixedPolygon, FixedXy};

/// Joins polyline features that share endpoints into longer strings.
///
/// Features are grouped by layer and metadata; within a group, strings are
/// joined greedily (in feature id order, so the result is deterministic)
/// until no pair of strings shares an endpoint. Each group collapses into
/// one feature carrying `id`; non-polyline features pass through untouched.
pub fn aggregate_line_features(features: Vec<Feature>, id: u64) -> Vec<Feature> {
	let mut result = Vec::new();
	let mut groups: Vec<(u32, Vec<(String, EncodedValue)>, (u32, u32), Vec<Vec<FixedXy>>)> =
		Vec::new();

	let mut sorted = features;
	sorted.sort_by_key(|feature| feature.id);

	for feature in sorted {
		let Feature {
			id: feature_id,
			layer,
			zoom_levels,
			meta,
			geometry,
		} = feature;
		match geometry {
			FixedGeometry::Polyline(lines) => {
				let group = groups.iter_mut().find(|(group_layer, group_meta, group_zooms, _)| {
					*group_layer == layer && *group_meta == meta && *group_zooms == zoom_levels
				});
				match group {
					Some((_, _, _, strings)) => strings.extend(lines),
					None => groups.push((layer, meta, zoom_levels, lines)),
				}
			}
			geometry => result.push(Feature {
				id: feature_id,
				layer,
				zoom_levels,
				meta,
				geometry,
			}),
		}
	}

	for (layer, meta, zoom_levels, mut strings) in groups {
		join_strings(&mut strings);
		result.push(Feature {
			id,
			layer,
			zoom_levels,
			meta,
			geometry: FixedGeometry::Polyline(strings),
		});
	}
	result
}

/// Unions touching polygon features, grouped by layer and metadata like
/// [`aggregate_line_features`]. Each group collapses into one feature
/// carrying `id`; non-polygon features pass through untouched.
pub fn aggregate_polygon_features(features: Vec<Feature>, id: u64) -> Vec<Feature> {
	let mut result = Vec::new();
	let mut groups: Vec<(u32, Vec<(String, EncodedValue)>, (u32, u32), FixedPolygon)> = Vec::new();

	let mut sorted = features;
	sorted.sort_by_key(|feature| feature.id);

	for feature in sorted {
		let Feature {
			id: feature_id,
			layer,
			zoom_levels,
			meta,
			geometry,
		} = feature;
		match geometry {
			FixedGeometry::Polygon(polygons) => {
				let group = groups.iter_mut().find(|(group_layer, group_meta, group_zooms, _)| {
					*group_layer == layer && *group_meta == meta && *group_zooms == zoom_levels
				});
				match group {
					Some((_, _, _, merged)) => *merged = union_polygons(merged, &polygons),
					None => groups.push((layer, meta, zoom_levels, polygons)),
				}
			}
			geometry => result.push(Feature {
				id: feature_id,
				layer,
				zoom_levels,
				meta,
				geometry,
			}),
		}
	}

	for (layer, meta, zoom_levels, merged) in groups {
		if merged.is_empty() {
			continue;
		}
		result.push(Feature {
			id,
			layer,
			zoom_levels,
			meta,
			geometry: FixedGeometry::Polygon(merged),
		});
	}
	result
}

/// Repeatedly joins the first pair of strings sharing an endpoint, in any
/// of the four tail/head orientations, until a fixed point is reached.
fn join_strings(strings: &mut Vec<Vec<FixedXy>>) {
	loop {
		let mut joined = false;

		'search: for i in 0..strings.len() {
			for j in (i + 1)..strings.len() {
				if let Some(merged) = join_pair(&strings[i], &strings[j]) {
					strings[i] = merged;
					strings.remove(j);
					joined = true;
					break 'search;
				}
			}
		}

		if !joined {
			return;
		}
	}
}

fn join_pair(a: &[FixedXy], b: &[FixedXy]) -> Option<Vec<FixedXy>> {
	let (a_head, a_tail) = (*a.first()?, *a.last()?);
	let (b_head, b_tail) = (*b.first()?, *b.last()?);

	let mut merged;
	if a_tail == b_head {
		// tail to head: extend
		merged = a.to_vec();
		merged.extend_from_slice(&b[1..]);
	} else if a_tail == b_tail {
		// tail to tail: reverse the second string
		merged = a.to_vec();
		merged.extend(b[..b.len() - 1].iter().rev());
	} else if a_head == b_tail {
		// head to tail: prepend
		merged = b.to_vec();
		merged.extend_from_slice(&a[1..]);
	} else if a_head == b_head {
		// head to head: reverse the second string, then prepend
		merged = b.iter().rev().copied().collect();
		merged.extend_from_slice(&a[1..]);
	} else {
		return None;
	}
	Some(merged)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn line(id: u64, points: &[(i64, i64)]) -> Feature {
		Feature {
			id,
			layer: 1,
			zoom_levels: (0, 20),
			meta: vec![],
			geometry: FixedGeometry::Polyline(vec![points
				.iter()
				.map(|(x, y)| FixedXy::new(*x, *y))
				.collect()]),
		}
	}

	fn single_string(features: Vec<Feature>) -> Vec<FixedXy> {
		let result = aggregate_line_features(features, 99);
		assert_eq!(result.len(), 1);
		match &result[0].geometry {
			FixedGeometry::Polyline(strings) => {
				assert_eq!(strings.len(), 1);
				strings[0].clone()
			}
			other => panic!("expected polyline, got {other:?}"),
		}
	}

	#[test]
	fn tail_to_head() {
		let merged = single_string(vec![
			line(1, &[(10, 10), (11, 11)]),
			line(2, &[(11, 11), (12, 12)]),
		]);
		assert_eq!(
			merged,
			vec![FixedXy::new(10, 10), FixedXy::new(11, 11), FixedXy::new(12, 12)]
		);
	}

	#[test]
	fn tail_to_tail() {
		let merged = single_string(vec![
			line(1, &[(10, 10), (11, 11)]),
			line(2, &[(12, 12), (11, 11)]),
		]);
		assert_eq!(
			merged,
			vec![FixedXy::new(10, 10), FixedXy::new(11, 11), FixedXy::new(12, 12)]
		);
	}

	#[test]
	fn head_to_tail() {
		let merged = single_string(vec![
			line(1, &[(10, 10), (11, 11)]),
			line(2, &[(12, 12), (10, 10)]),
		]);
		assert_eq!(
			merged,
			vec![FixedXy::new(12, 12), FixedXy::new(10, 10), FixedXy::new(11, 11)]
		);
	}

	#[test]
	fn head_to_head() {
		let merged = single_string(vec![
			line(1, &[(10, 10), (11, 11)]),
			line(2, &[(10, 10), (12, 12)]),
		]);
		assert_eq!(
			merged,
			vec![FixedXy::new(12, 12), FixedXy::new(10, 10), FixedXy::new(11, 11)]
		);
	}

	#[test]
	fn chain_of_three() {
		let merged = single_string(vec![
			line(1, &[(10, 10), (11, 11)]),
			line(2, &[(11, 11), (12, 12)]),
			line(3, &[(12, 12), (13, 13)]),
		]);
		assert_eq!(
			merged,
			vec![
				FixedXy::new(10, 10),
				FixedXy::new(11, 11),
				FixedXy::new(12, 12),
				FixedXy::new(13, 13)
			]
		);
	}

	#[test]
	fn disjoint_strings_stay_separate() {
		let result = aggregate_line_features(
			vec![
				line(1, &[(0, 0), (1, 1)]),
				line(2, &[(100, 100), (101, 101)]),
			],
			99,
		);
		assert_eq!(result.len(), 1);
		match &result[0].geometry {
			FixedGeometry::Polyline(strings) => assert_eq!(strings.len(), 2),
			other => panic!("expected polyline, got {other:?}"),
		}
	}

	#[test]
	fn distinct_metadata_is_not_merged() {
		let mut tagged = line(2, &[(11, 11), (12, 12)]);
		tagged.meta = vec![("name".to_string(), EncodedValue::String("B1".to_string()))];

		let result = aggregate_line_features(vec![line(1, &[(10, 10), (11, 11)]), tagged], 99);
		assert_eq!(result.len(), 2);
	}
}
