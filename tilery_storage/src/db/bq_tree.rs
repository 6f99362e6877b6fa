use anyhow::{ensure, Result};
use tilery_core::io::{ValueReader, ValueWriter};
use tilery_core::{Blob, Tile};

const BQ_EMPTY: u32 = 0;
const BQ_FULL: u32 = 1;
const BQ_INNER_BIT: u32 = 1 << 31;

/// A bit-quadtree over the tile pyramid: a compact set of tiles each of
/// which is entirely inside some region. Membership propagates downwards,
/// so `contains` is true for every descendant of a stored tile.
///
/// Stored as a flat array of nodes of four `u32` words, one per quadrant:
/// `EMPTY`, `FULL`, or a child node index with the `INNER` bit set. Four
/// `FULL` quadrants collapse into a `FULL` parent during construction; only
/// the root node may keep all four, which stands for the whole world.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BqTree {
	nodes: Vec<u32>,
}

enum Cell {
	Empty,
	Full,
	Node(Box<[Cell; 4]>),
}

fn empty_cells() -> Box<[Cell; 4]> {
	Box::new([Cell::Empty, Cell::Empty, Cell::Empty, Cell::Empty])
}

/// Builds a [`BqTree`] from tiles fully inside the region.
pub fn make_bq_tree(tiles: &[Tile]) -> BqTree {
	let mut root = empty_cells();
	for tile in tiles {
		if tile.z == 0 {
			*root = [Cell::Full, Cell::Full, Cell::Full, Cell::Full];
		} else {
			insert(&mut root, tile, 1);
		}
	}

	// breadth-first layout, root node first
	let mut nodes = Vec::new();
	let mut queue: Vec<&[Cell; 4]> = vec![&root];
	let mut next = 1u32;
	let mut i = 0;
	while i < queue.len() {
		let cells = queue[i];
		for cell in cells.iter() {
			nodes.push(match cell {
				Cell::Empty => BQ_EMPTY,
				Cell::Full => BQ_FULL,
				Cell::Node(sub) => {
					queue.push(sub);
					let word = BQ_INNER_BIT | next;
					next += 1;
					word
				}
			});
		}
		i += 1;
	}

	BqTree { nodes }
}

fn insert(cells: &mut [Cell; 4], tile: &Tile, depth: u32) {
	let q = tile.quadrant_at(0, depth) as usize;
	if depth == tile.z {
		cells[q] = Cell::Full;
		return;
	}

	match &mut cells[q] {
		Cell::Full => return, // an ancestor already covers this tile
		Cell::Empty => cells[q] = Cell::Node(empty_cells()),
		Cell::Node(_) => {}
	}
	if let Cell::Node(sub) = &mut cells[q] {
		insert(sub, tile, depth + 1);
		if sub.iter().all(|cell| matches!(cell, Cell::Full)) {
			cells[q] = Cell::Full;
		}
	}
}

impl BqTree {
	pub fn new_empty() -> BqTree {
		BqTree {
			nodes: vec![BQ_EMPTY; 4],
		}
	}

	pub fn node_count(&self) -> usize {
		self.nodes.len() / 4
	}

	fn word(&self, node: usize, quadrant: usize) -> u32 {
		self.nodes.get(node * 4 + quadrant).copied().unwrap_or(BQ_EMPTY)
	}

	/// Whether `tile` lies entirely inside the region.
	pub fn contains(&self, tile: &Tile) -> bool {
		if self.nodes.is_empty() {
			return false;
		}
		if tile.z == 0 {
			return (0..4).all(|q| self.word(0, q) == BQ_FULL);
		}

		let mut node = 0usize;
		for depth in 1..=tile.z {
			match self.word(node, tile.quadrant_at(0, depth) as usize) {
				BQ_FULL => return true,
				BQ_EMPTY => return false,
				word => node = (word & !BQ_INNER_BIT) as usize,
			}
		}
		// an inner node at the tile itself: collapsing guarantees at least
		// one of its descendants is not FULL
		false
	}

	/// Every stored leaf at or below `query`. Walking below a stored leaf
	/// yields the query itself.
	pub fn all_leafs(&self, query: Tile) -> Vec<Tile> {
		let mut result = Vec::new();
		if self.nodes.is_empty() {
			return result;
		}

		if query.z == 0 {
			if self.contains(&query) {
				return vec![query];
			}
			self.collect(0, query, &mut result);
			return result;
		}

		let mut node = 0usize;
		for depth in 1..=query.z {
			match self.word(node, query.quadrant_at(0, depth) as usize) {
				BQ_FULL => {
					result.push(query);
					return result;
				}
				BQ_EMPTY => return result,
				word => node = (word & !BQ_INNER_BIT) as usize,
			}
		}
		self.collect(node, query, &mut result);
		result
	}

	fn collect(&self, node: usize, tile: Tile, result: &mut Vec<Tile>) {
		for (q, child) in tile.children().iter().enumerate() {
			match self.word(node, q) {
				BQ_EMPTY => {}
				BQ_FULL => result.push(*child),
				word => self.collect((word & !BQ_INNER_BIT) as usize, *child, result),
			}
		}
	}

	pub fn to_blob(&self) -> Blob {
		let mut writer = ValueWriter::new();
		for word in &self.nodes {
			writer.write_u32(*word);
		}
		writer.into_blob()
	}

	pub fn from_blob(blob: &Blob) -> Result<BqTree> {
		ensure!(
			blob.len() % 16 == 0 && !blob.is_empty(),
			"invalid bq tree size {}",
			blob.len()
		);
		let mut reader = ValueReader::new(blob.as_slice());
		let mut nodes = Vec::with_capacity(blob.len() as usize / 4);
		while reader.has_remaining() {
			nodes.push(reader.read_u32()?);
		}
		Ok(BqTree { nodes })
	}
}
