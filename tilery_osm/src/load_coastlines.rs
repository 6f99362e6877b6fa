use crate::FeatureInserter;
use anyhow::{bail, Context, Result};
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::Path;
use tilery_core::{ScopedTimer, Tile};
use tilery_geometry::fixed::{
	area, clip, latlng_to_fixed, FixedGeometry, FixedPolygon, SimplePolygon,
};
use tilery_geometry::TileSpec;
use tilery_storage::db::{make_bq_tree, LayerNamesBuilder, TileDatabase, META_KEY_FULLY_SEASIDE_TREE};
use tilery_storage::feature::Feature;

/// Tiles are classified down to this zoom; partially covered tiles at the
/// limit store their clipped land polygons as features.
const COASTLINE_MAX_ZOOM: u32 = 10;

pub const COASTLINE_LAYER: &str = "coastline";

/// Loads land polygons from a zipped shapefile, stores clipped land
/// features in the coastline layer and persists the fully-seaside tree
/// marking tiles without any land.
pub fn load_coastlines(
	db: &TileDatabase,
	inserter: &FeatureInserter,
	layer_names: &LayerNamesBuilder,
	path: &Path,
) -> Result<()> {
	let _timer = ScopedTimer::new("load coastlines");

	let polygons = read_land_polygons(path)?;
	log::info!("loaded {} land polygons", polygons.len());

	let layer = layer_names.layer_id(COASTLINE_LAYER);
	let mut state = CoastlineState {
		inserter,
		layer,
		seaside: Vec::new(),
		next_id: 1,
	};
	process_tile(Tile::new(0, 0, 0), polygons, &mut state)?;

	log::info!("{} tiles are fully seaside", state.seaside.len());
	db.put_meta(
		META_KEY_FULLY_SEASIDE_TREE,
		&make_bq_tree(&state.seaside).to_blob(),
	)?;
	Ok(())
}

struct CoastlineState<'a> {
	inserter: &'a FeatureInserter<'a>,
	layer: u32,
	seaside: Vec<Tile>,
	next_id: u64,
}

/// Recursive descent over the tile pyramid: tiles without land are
/// collected for the seaside tree, fully covered tiles store one square,
/// partially covered tiles descend until the zoom limit.
fn process_tile(tile: Tile, polygons: FixedPolygon, state: &mut CoastlineState) -> Result<()> {
	let spec = TileSpec::new(tile)?;

	let clipped = clip(&FixedGeometry::Polygon(polygons), &spec.overdraw_bounds);
	let FixedGeometry::Polygon(clipped) = clipped else {
		state.seaside.push(tile);
		return Ok(());
	};

	let tile_area =
		i128::from(spec.overdraw_bounds.width()) * i128::from(spec.overdraw_bounds.height());
	let fully_land = i128::from(area(&FixedGeometry::Polygon(clipped.clone()))) >= tile_area;
	if fully_land || tile.z == COASTLINE_MAX_ZOOM {
		emit_land(state, clipped)?;
		return Ok(());
	}

	for child in tile.children() {
		process_tile(child, clipped.clone(), state)?;
	}
	Ok(())
}

fn emit_land(state: &mut CoastlineState, polygons: FixedPolygon) -> Result<()> {
	let feature = Feature {
		id: state.next_id,
		layer: state.layer,
		zoom_levels: (0, 20),
		meta: vec![],
		geometry: FixedGeometry::Polygon(polygons),
	};
	state.next_id += 1;
	state.inserter.insert(&feature)
}

/// Extracts the `.shp` member of the archive and reads its polygons.
fn read_land_polygons(path: &Path) -> Result<FixedPolygon> {
	let file = File::open(path).with_context(|| format!("failed to open {path:?}"))?;
	let mut archive = zip::ZipArchive::new(file).context("coastline file is not a zip archive")?;

	let shp_name = (0..archive.len())
		.filter_map(|i| archive.by_index(i).ok().map(|f| f.name().to_string()))
		.find(|name| name.ends_with(".shp"))
		.context("zip archive contains no .shp file")?;

	let mut buffer = Vec::new();
	archive
		.by_name(&shp_name)?
		.read_to_end(&mut buffer)
		.context("failed to extract shapefile")?;

	read_shapefile(&buffer)
}

fn read_shapefile(buffer: &[u8]) -> Result<FixedPolygon> {
	let mut reader = shapefile::ShapeReader::new(Cursor::new(buffer))
		.context("failed to parse shapefile")?;

	let mut polygons = FixedPolygon::new();
	for shape in reader.iter_shapes() {
		match shape? {
			shapefile::Shape::Polygon(polygon) => {
				for ring in polygon.rings() {
					let convert = |points: &[shapefile::Point]| {
						points
							.iter()
							.map(|p| latlng_to_fixed(p.y, p.x))
							.collect::<Vec<_>>()
					};
					match ring {
						shapefile::PolygonRing::Outer(points) => {
							polygons.push(SimplePolygon {
								outer: convert(points),
								inners: vec![],
							});
						}
						shapefile::PolygonRing::Inner(points) => {
							// holes follow their outer ring
							match polygons.last_mut() {
								Some(last) => last.inners.push(convert(points)),
								None => bail!("shapefile hole without an outer ring"),
							}
						}
					}
				}
			}
			shapefile::Shape::NullShape => {}
			other => bail!("unsupported shape type {}", other.shapetype()),
		}
	}
	Ok(polygons)
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;
	use tilery_storage::db::{open_tile_database, TABLE_FEATURES};
	use tilery_storage::render::make_render_ctx;

	/// Builds a minimal zipped shapefile with one triangular island.
	fn write_test_zip(path: &Path) {
		let mut shp: Vec<u8> = Vec::new();

		// record: one polygon, one ring, four points (closed triangle,
		// clockwise so it classifies as an outer ring)
		let points: [(f64, f64); 4] = [(0.0, 0.0), (0.0, 10.0), (10.0, 0.0), (0.0, 0.0)];
		let mut record: Vec<u8> = Vec::new();
		record.extend_from_slice(&5i32.to_le_bytes()); // polygon
		for _ in 0..4 {
			record.extend_from_slice(&0f64.to_le_bytes()); // bbox, unchecked
		}
		record.extend_from_slice(&1i32.to_le_bytes()); // one part
		record.extend_from_slice(&(points.len() as i32).to_le_bytes());
		record.extend_from_slice(&0i32.to_le_bytes()); // part offset
		for (x, y) in points {
			record.extend_from_slice(&x.to_le_bytes());
			record.extend_from_slice(&y.to_le_bytes());
		}

		// main file header, lengths in 16 bit words
		let file_len_words = (100 + 8 + record.len()) / 2;
		shp.extend_from_slice(&9994i32.to_be_bytes());
		shp.extend_from_slice(&[0u8; 20]);
		shp.extend_from_slice(&(file_len_words as i32).to_be_bytes());
		shp.extend_from_slice(&1000i32.to_le_bytes());
		shp.extend_from_slice(&5i32.to_le_bytes()); // polygon
		for _ in 0..8 {
			shp.extend_from_slice(&0f64.to_le_bytes()); // bbox
		}
		shp.extend_from_slice(&1i32.to_be_bytes()); // record number
		shp.extend_from_slice(&((record.len() / 2) as i32).to_be_bytes());
		shp.extend_from_slice(&record);

		let file = File::create(path).unwrap();
		let mut zip = zip::ZipWriter::new(file);
		zip
			.start_file("land_polygons.shp", zip::write::SimpleFileOptions::default())
			.unwrap();
		zip.write_all(&shp).unwrap();
		zip.finish().unwrap();
	}

	#[test]
	fn imports_land_and_marks_seaside_tiles() -> Result<()> {
		let dir = tempfile::tempdir()?;
		let zip_path = dir.path().join("coastlines.zip");
		write_test_zip(&zip_path);

		let db = open_tile_database(&dir.path().join("t.db"))?;
		let inserter = FeatureInserter::new(&db);
		let layer_names = LayerNamesBuilder::new();
		load_coastlines(&db, &inserter, &layer_names, &zip_path)?;
		inserter.flush()?;
		layer_names.store(&db)?;

		// land features were stored
		assert!(!db.keys(TABLE_FEATURES)?.is_empty());

		let ctx = make_render_ctx(&db)?;
		// the island is near (0, 0); the opposite corner of the world is sea
		assert!(ctx.seaside_tree.contains(&Tile::new(0, 0, 3)));
		let land_tile = Tile::new(1 << 9, (1 << 9) - 1, 10);
		assert!(!ctx.seaside_tree.contains(&land_tile));
		Ok(())
	}
}
