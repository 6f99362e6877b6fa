use super::{PerfCounter, RenderCtx};
use crate::db::{
	key_to_tile, tile_to_key, unpack_features_overlapping, walk_quad_tree, FeaturePack,
	PackHandle, PackRecord, TileDatabase, TABLE_TILES,
};
use crate::feature::{
	aggregate_line_features, aggregate_polygon_features, parse_feature, EncodedValue, Feature,
};
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use tilery_core::{compress_deflate, decompress_deflate, Blob, Tile};
use tilery_geometry::fixed::{area, clip, FixedGeometry};
use tilery_geometry::mvt::{MvtLayer, MvtTile, MvtValue};
use tilery_geometry::TileSpec;

/// Renders one tile: feature lookup through the key order and the embedded
/// quad trees, per-zoom simplification, clipping, optional aggregation and
/// MVT encoding. Returns `None` for tiles without any features.
pub fn get_tile(
	db: &TileDatabase,
	pack: &PackHandle,
	ctx: &RenderCtx,
	tile: Tile,
	pc: &mut PerfCounter,
) -> Result<Option<Blob>> {
	let spec = TileSpec::new(tile)?;

	if ctx.seaside_tree.contains(&tile) {
		return Ok(Some(ctx.water_tile().clone()));
	}

	if !ctx.ignore_prepared {
		if let Some(max_prepared) = ctx.max_prepared_zoom {
			if tile.z <= max_prepared {
				// prepared levels are complete: a missing entry is an empty tile
				return match db.get_value(TABLE_TILES, tile_to_key(&tile, 0))? {
					Some(stored) if ctx.compress_result => Ok(Some(Blob::from(stored))),
					Some(stored) => Ok(Some(decompress_deflate(&Blob::from(stored))?)),
					None => Ok(None),
				};
			}
		}
	}

	let mut features: Vec<Feature> = Vec::new();
	pc.measure("collect", || collect_features(db, pack, ctx, &spec, &mut features))?;
	if features.is_empty() {
		return Ok(None);
	}

	let mut by_layer: BTreeMap<u32, Vec<Feature>> = BTreeMap::new();
	for feature in features {
		by_layer.entry(feature.layer).or_default().push(feature);
	}

	let mvt = pc.measure("encode", || -> Result<MvtTile> {
		let mut mvt = MvtTile::new();
		for (layer_id, mut group) in by_layer {
			group.sort_by_key(|feature| feature.id);

			if spec.z_str() == "mid" {
				if ctx.drop_subpixel_polygons {
					let subpixel = 1i64 << (2 * spec.delta_z);
					group.retain(|feature| match &feature.geometry {
						FixedGeometry::Polygon(_) => area(&feature.geometry) >= subpixel,
						_ => true,
					});
				}
				if ctx.aggregate_polygons {
					group = aggregate_polygon_features(group, 0);
				}
				if ctx.aggregate_lines {
					group = aggregate_line_features(group, 0);
				}
			}

			let mut layer = MvtLayer::new(ctx.layer_name(layer_id));
			for feature in group {
				let properties: Vec<(String, MvtValue)> = feature
					.meta
					.iter()
					.map(|(key, value)| (key.clone(), to_mvt_value(value)))
					.collect();
				layer
					.add_feature(feature.id, &spec, &feature.geometry, &properties)
					.with_context(|| format!("failed to encode feature {}", feature.id))?;
			}
			mvt.add_layer(layer);
		}
		Ok(mvt)
	})?;

	if mvt.is_empty() {
		return Ok(None);
	}

	let blob = mvt.to_blob();
	if ctx.compress_result {
		Ok(Some(pc.measure("compress", || compress_deflate(&blob))?))
	} else {
		Ok(Some(blob))
	}
}

/// Fetches, decodes and clips every feature relevant for the tile.
fn collect_features(
	db: &TileDatabase,
	pack: &PackHandle,
	ctx: &RenderCtx,
	spec: &TileSpec,
	features: &mut Vec<Feature>,
) -> Result<()> {
	let tile = spec.tile;
	db.scan_features_covering(&tile, |key, value| {
		let parsed = FeaturePack::parse(&value)
			.with_context(|| format!("corrupt feature pack at {:?}", key_to_tile(key)))?;

		if parsed.has_segments() {
			if !parsed.quad_tree.is_empty() {
				let root = key_to_tile(key);
				let mut spans = Vec::new();
				walk_quad_tree(parsed.quad_tree, root, tile, |offset, size| {
					spans.push((offset, size));
				})?;
				for (offset, size) in spans {
					let sub_pack =
						pack.read(&PackRecord::new(parsed.index_base + u64::from(offset), size))?;
					FeaturePack::parse(&sub_pack)?.for_each_feature(&mut |bytes| {
						push_feature(bytes, ctx, spec, features);
						Ok(())
					})?;
				}
			}
			// inline sub-packs of segmented packs
			unpack_features_overlapping(&value, &tile, |bytes| {
				push_feature(bytes, ctx, spec, features);
			})?;
		} else {
			parsed.for_each_feature(&mut |bytes| {
				push_feature(bytes, ctx, spec, features);
				Ok(())
			})?;
		}
		Ok(())
	})
}

/// Decodes one serialized feature; failures are logged and the feature is
/// skipped, a single broken feature never kills the tile.
fn push_feature(bytes: &[u8], ctx: &RenderCtx, spec: &TileSpec, features: &mut Vec<Feature>) {
	match decode_feature(bytes, ctx, spec) {
		Ok(Some(feature)) => features.push(feature),
		Ok(None) => {}
		Err(error) => log::warn!("skipping broken feature in {}: {error:#}", spec.tile),
	}
}

fn decode_feature(bytes: &[u8], ctx: &RenderCtx, spec: &TileSpec) -> Result<Option<Feature>> {
	let parsed = parse_feature(bytes)?;

	let z = spec.tile.z;
	if z < parsed.zoom_levels.0 || z > parsed.zoom_levels.1 {
		return Ok(None);
	}
	if !parsed.bbox.intersects(&spec.overdraw_bounds) {
		return Ok(None);
	}

	let geometry = parsed.decode_geometry(Some(z))?;
	let clipped = clip(&geometry, &spec.overdraw_bounds);
	if clipped.is_null() {
		return Ok(None);
	}

	Ok(Some(Feature {
		id: parsed.id,
		layer: parsed.layer,
		zoom_levels: parsed.zoom_levels,
		meta: parsed.decode_meta(&ctx.meta_coding)?,
		geometry: clipped,
	}))
}

fn to_mvt_value(value: &EncodedValue) -> MvtValue {
	match value {
		EncodedValue::Bool(v) => MvtValue::Bool(*v),
		EncodedValue::String(v) => MvtValue::String(v.clone()),
		EncodedValue::Integer(v) => MvtValue::Int(*v),
		EncodedValue::Numeric(v) => MvtValue::Double(*v),
	}
}
