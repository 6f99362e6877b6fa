use crate::hybrid_node_idx::{HybridNodeIdx, HybridNodeIdxBuilder, X_OFFSET, Y_OFFSET};
use crate::{FeatureHandler, FeatureInserter, Profile};
use anyhow::{Context, Result};
use crossbeam_channel::bounded;
use osmpbf::{BlobDecode, BlobReader, PrimitiveBlock};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Mutex;
use tilery_core::ScopedTimer;
use tilery_geometry::fixed::{latlng_to_fixed, FixedPolygon, FixedXy, SimplePolygon};
use tilery_storage::db::{LayerNamesBuilder, SharedMetadataBuilder, TileDatabase};

struct MpRelation {
	id: i64,
	tags: Vec<(String, String)>,
	members: Vec<(i64, bool)>, // way id, is inner
}

/// Imports an OSM PBF extract in two passes.
///
/// Pass one streams nodes into the hybrid node index and collects
/// multipolygon relations. Pass two decodes and classifies objects on a
/// bounded pipeline: one reader stage keeps up to four blobs per worker in
/// flight, the workers classify ways and tagged nodes in parallel (each
/// with its own feature handler), and multipolygon assembly runs serially
/// in relation order once the member geometries are complete.
pub fn load_osm(
	db: &TileDatabase,
	inserter: &FeatureInserter,
	profile: &dyn Profile,
	layer_names: &LayerNamesBuilder,
	shared_metadata: &SharedMetadataBuilder,
	osm_path: &Path,
	tmp_dir: &Path,
) -> Result<()> {
	let idx_file = tempfile::Builder::new()
		.prefix("idx")
		.suffix(".bin")
		.tempfile_in(tmp_dir)
		.context("failed to create node index scratch file")?;
	let dat_file = tempfile::Builder::new()
		.prefix("dat")
		.suffix(".bin")
		.tempfile_in(tmp_dir)
		.context("failed to create node data scratch file")?;

	let mut relations = Vec::new();
	let mut member_ways = HashSet::new();
	{
		let _timer = ScopedTimer::new("load OSM / pass 1");
		let mut builder = HybridNodeIdxBuilder::new(idx_file.reopen()?, dat_file.reopen()?);

		let reader = BlobReader::from_path(osm_path)
			.with_context(|| format!("failed to open {osm_path:?}"))?;
		for blob in reader {
			let blob = blob?;
			if let BlobDecode::OsmData(block) = blob.decode()? {
				pass_one_block(&block, &mut builder, &mut relations, &mut member_ways)?;
			}
		}
		builder.finish()?;
		builder.dump_stats();
		log::info!("collected {} multipolygon relations", relations.len());
	}
	let node_idx = HybridNodeIdx::open(idx_file.path(), dat_file.path())?;

	let way_geometries: Mutex<HashMap<i64, Vec<FixedXy>>> = Mutex::new(HashMap::new());
	{
		let _timer = ScopedTimer::new("load OSM / pass 2");
		let worker_count = std::cmp::max(2, num_cpus::get());
		let (blob_tx, blob_rx) = bounded(worker_count * 4);

		let node_idx_ref = &node_idx;
		let member_ways_ref = &member_ways;
		let way_geometries_ref = &way_geometries;

		std::thread::scope(|scope| -> Result<()> {
			let reader_handle = scope.spawn(move || -> Result<()> {
				let reader = BlobReader::from_path(osm_path)?;
				for blob in reader {
					if blob_tx.send(blob?).is_err() {
						break; // all workers gone, their error wins
					}
				}
				Ok(())
			});

			let mut workers = Vec::with_capacity(worker_count);
			for _ in 0..worker_count {
				let blob_rx = blob_rx.clone();
				workers.push(scope.spawn(move || -> Result<()> {
					let handler =
						FeatureHandler::new(profile, inserter, layer_names, shared_metadata);
					while let Ok(blob) = blob_rx.recv() {
						if let BlobDecode::OsmData(block) = blob.decode()? {
							pass_two_block(
								&block,
								&handler,
								node_idx_ref,
								member_ways_ref,
								way_geometries_ref,
							)?;
						}
					}
					Ok(())
				}));
			}
			drop(blob_rx);

			let mut first_error = None;
			for worker in workers {
				if let Err(error) = worker.join().expect("worker panicked") {
					first_error.get_or_insert(error);
				}
			}
			let reader_result = reader_handle.join().expect("reader panicked");
			match first_error {
				Some(error) => Err(error),
				None => reader_result,
			}
		})?;

		// final serial stage: multipolygon assembly in relation order
		let geometries = way_geometries.into_inner().unwrap();
		let handler = FeatureHandler::new(profile, inserter, layer_names, shared_metadata);
		let mut assembled = 0usize;
		for relation in &relations {
			if let Some(polygons) = assemble_multipolygon(relation, &geometries) {
				handler.handle_multipolygon(relation.id, &relation.tags, polygons)?;
				assembled += 1;
			}
		}
		log::info!("assembled {assembled} of {} multipolygons", relations.len());
	}

	inserter.flush()?;
	layer_names.store(db)?;
	shared_metadata.store(db)?;
	Ok(())
}

fn pass_one_block(
	block: &PrimitiveBlock,
	builder: &mut HybridNodeIdxBuilder,
	relations: &mut Vec<MpRelation>,
	member_ways: &mut HashSet<i64>,
) -> Result<()> {
	for group in block.groups() {
		for node in group.nodes() {
			builder.push(
				node.id(),
				i64::from(node.decimicro_lon()) + X_OFFSET,
				i64::from(node.decimicro_lat()) + Y_OFFSET,
			)?;
		}
		for node in group.dense_nodes() {
			builder.push(
				node.id(),
				i64::from(node.decimicro_lon()) + X_OFFSET,
				i64::from(node.decimicro_lat()) + Y_OFFSET,
			)?;
		}

		for relation in group.relations() {
			let tags: Vec<(String, String)> = relation
				.tags()
				.map(|(k, v)| (k.to_string(), v.to_string()))
				.collect();
			let is_multipolygon = tags
				.iter()
				.any(|(k, v)| k == "type" && (v == "multipolygon" || v == "boundary"));
			if !is_multipolygon {
				continue;
			}

			let members: Vec<(i64, bool)> = relation
				.members()
				.filter(|member| member.member_type == osmpbf::RelMemberType::Way)
				.map(|member| {
					let inner = member.role().map(|role| role == "inner").unwrap_or(false);
					(member.member_id, inner)
				})
				.collect();
			if members.is_empty() {
				continue;
			}
			for (way_id, _) in &members {
				member_ways.insert(*way_id);
			}
			relations.push(MpRelation {
				id: relation.id(),
				tags,
				members,
			});
		}
	}
	Ok(())
}

fn pass_two_block(
	block: &PrimitiveBlock,
	handler: &FeatureHandler,
	node_idx: &HybridNodeIdx,
	member_ways: &HashSet<i64>,
	way_geometries: &Mutex<HashMap<i64, Vec<FixedXy>>>,
) -> Result<()> {
	for group in block.groups() {
		for node in group.nodes() {
			let tags: Vec<(String, String)> = node
				.tags()
				.map(|(k, v)| (k.to_string(), v.to_string()))
				.collect();
			if !tags.is_empty() {
				handler.handle_node(node.id(), &tags, latlng_to_fixed(node.lat(), node.lon()))?;
			}
		}
		for node in group.dense_nodes() {
			let tags: Vec<(String, String)> = node
				.tags()
				.map(|(k, v)| (k.to_string(), v.to_string()))
				.collect();
			if !tags.is_empty() {
				handler.handle_node(node.id(), &tags, latlng_to_fixed(node.lat(), node.lon()))?;
			}
		}

		for way in group.ways() {
			let refs: Vec<i64> = way.refs().collect();
			let mut queries: Vec<(i64, Option<(i64, i64)>)> =
				refs.iter().map(|id| (*id, None)).collect();
			node_idx.get_batch(&mut queries)?;

			let coords: Vec<FixedXy> = queries
				.iter()
				.filter_map(|(_, location)| location.map(raw_to_fixed))
				.collect();
			if coords.len() < refs.len() {
				log::debug!("way {} references missing nodes, skipped", way.id());
				continue;
			}

			if member_ways.contains(&way.id()) {
				way_geometries.lock().unwrap().insert(way.id(), coords.clone());
			}

			let tags: Vec<(String, String)> = way
				.tags()
				.map(|(k, v)| (k.to_string(), v.to_string()))
				.collect();
			if !tags.is_empty() {
				handler.handle_way(way.id(), &tags, coords)?;
			}
		}
	}
	Ok(())
}

fn raw_to_fixed((x, y): (i64, i64)) -> FixedXy {
	let lng = (x - X_OFFSET) as f64 / 1e7;
	let lat = (y - Y_OFFSET) as f64 / 1e7;
	latlng_to_fixed(lat, lng)
}

/// Joins member ways into closed rings and matches holes to their outer
/// rings by bounding box containment.
fn assemble_multipolygon(
	relation: &MpRelation,
	way_geometries: &HashMap<i64, Vec<FixedXy>>,
) -> Option<FixedPolygon> {
	let mut outers = Vec::new();
	let mut inners = Vec::new();
	for (way_id, is_inner) in &relation.members {
		let Some(geometry) = way_geometries.get(way_id) else {
			continue;
		};
		if *is_inner {
			inners.push(geometry.clone());
		} else {
			outers.push(geometry.clone());
		}
	}

	let mut polygons: FixedPolygon = build_rings(outers)
		.into_iter()
		.map(|outer| SimplePolygon {
			outer,
			inners: vec![],
		})
		.collect();
	if polygons.is_empty() {
		return None;
	}

	for inner in build_rings(inners) {
		let inner_bbox = ring_bbox(&inner);
		let target = polygons.iter_mut().find(|polygon| {
			let outer_bbox = ring_bbox(&polygon.outer);
			outer_bbox.0.x <= inner_bbox.0.x
				&& outer_bbox.0.y <= inner_bbox.0.y
				&& outer_bbox.1.x >= inner_bbox.1.x
				&& outer_bbox.1.y >= inner_bbox.1.y
		});
		if let Some(polygon) = target {
			polygon.inners.push(inner);
		}
	}
	Some(polygons)
}

/// Joins open way strings on shared endpoints and keeps the closed rings.
fn build_rings(mut strings: Vec<Vec<FixedXy>>) -> Vec<Vec<FixedXy>> {
	loop {
		let mut joined = false;
		'search: for i in 0..strings.len() {
			if is_closed(&strings[i]) {
				continue;
			}
			for j in (i + 1)..strings.len() {
				if is_closed(&strings[j]) {
					continue;
				}
				if let Some(merged) = join_open_strings(&strings[i], &strings[j]) {
					strings[i] = merged;
					strings.remove(j);
					joined = true;
					break 'search;
				}
			}
		}
		if !joined {
			break;
		}
	}

	strings
		.into_iter()
		.filter(|ring| is_closed(ring) && ring.len() >= 4)
		.collect()
}

fn is_closed(ring: &[FixedXy]) -> bool {
	ring.len() >= 3 && ring.first() == ring.last()
}

fn join_open_strings(a: &[FixedXy], b: &[FixedXy]) -> Option<Vec<FixedXy>> {
	let (a_head, a_tail) = (*a.first()?, *a.last()?);
	let (b_head, b_tail) = (*b.first()?, *b.last()?);

	let mut merged;
	if a_tail == b_head {
		merged = a.to_vec();
		merged.extend_from_slice(&b[1..]);
	} else if a_tail == b_tail {
		merged = a.to_vec();
		merged.extend(b[..b.len() - 1].iter().rev());
	} else if a_head == b_tail {
		merged = b.to_vec();
		merged.extend_from_slice(&a[1..]);
	} else if a_head == b_head {
		merged = b.iter().rev().copied().collect();
		merged.extend_from_slice(&a[1..]);
	} else {
		return None;
	}
	Some(merged)
}

fn ring_bbox(ring: &[FixedXy]) -> (FixedXy, FixedXy) {
	let mut min = FixedXy::new(i64::MAX, i64::MAX);
	let mut max = FixedXy::new(i64::MIN, i64::MIN);
	for point in ring {
		min.x = min.x.min(point.x);
		min.y = min.y.min(point.y);
		max.x = max.x.max(point.x);
		max.y = max.y.max(point.y);
	}
	(min, max)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn xy(x: i64, y: i64) -> FixedXy {
		FixedXy::new(x, y)
	}

	#[test]
	fn rings_from_way_fragments() {
		// two half rings forming a square
		let rings = build_rings(vec![
			vec![xy(0, 0), xy(10, 0), xy(10, 10)],
			vec![xy(10, 10), xy(0, 10), xy(0, 0)],
		]);
		assert_eq!(rings.len(), 1);
		assert_eq!(rings[0].first(), rings[0].last());
		assert_eq!(rings[0].len(), 5);
	}

	#[test]
	fn reversed_fragments_join_too() {
		let rings = build_rings(vec![
			vec![xy(0, 0), xy(10, 0), xy(10, 10)],
			vec![xy(0, 0), xy(0, 10), xy(10, 10)],
		]);
		assert_eq!(rings.len(), 1);
	}

	#[test]
	fn open_fragments_are_dropped() {
		let rings = build_rings(vec![vec![xy(0, 0), xy(10, 0)]]);
		assert!(rings.is_empty());
	}

	#[test]
	fn holes_attach_to_their_outer_ring() {
		let outer = vec![xy(0, 0), xy(100, 0), xy(100, 100), xy(0, 100), xy(0, 0)];
		let hole = vec![xy(40, 40), xy(60, 40), xy(60, 60), xy(40, 60), xy(40, 40)];
		let far_outer = vec![
			xy(1000, 1000),
			xy(1100, 1000),
			xy(1100, 1100),
			xy(1000, 1100),
			xy(1000, 1000),
		];

		let mut geometries = HashMap::new();
		geometries.insert(1i64, outer);
		geometries.insert(2, hole);
		geometries.insert(3, far_outer);

		let relation = MpRelation {
			id: 9,
			tags: vec![("type".to_string(), "multipolygon".to_string())],
			members: vec![(1, false), (2, true), (3, false)],
		};
		let polygons = assemble_multipolygon(&relation, &geometries).unwrap();
		assert_eq!(polygons.len(), 2);

		let with_hole = polygons
			.iter()
			.find(|polygon| !polygon.inners.is_empty())
			.unwrap();
		assert_eq!(with_hole.outer[0], xy(0, 0));
		assert_eq!(with_hole.inners.len(), 1);
	}

	#[test]
	fn missing_members_are_tolerated() {
		let relation = MpRelation {
			id: 9,
			tags: vec![],
			members: vec![(1, false)],
		};
		assert!(assemble_multipolygon(&relation, &HashMap::new()).is_none());
	}
}
