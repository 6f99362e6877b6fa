use anyhow::{bail, ensure, Result};
use byteorder::{ByteOrder, LittleEndian};
use tilery_core::io::ValueWriter;
use tilery_core::Tile;

/// One entry for quad tree construction: a byte range of the pack file
/// associated with a tile inside the root's subtree.
#[derive(Clone, Copy, Debug)]
pub struct QuadTreeInput {
	pub tile: Tile,
	pub offset: u32,
	pub size: u32,
}

// Flat tree of 16 byte nodes (four u32 cells):
//   cell 0: child existence mask (top 4 bits) | index of the first child node
//   cell 1: offset of the subtree's byte span (equals the node's own entry,
//           entries are laid out in pre-order)
//   cell 2: total size of the subtree's byte span
//   cell 3: size of the node's own entry, zero if the node has none
//
// Children of one node are stored contiguously; the mask selects which of
// the four quadrants exist.
const NODE_CELLS: usize = 4;
const CHILD_MASK_SHIFT: u32 = 28;
const CHILD_INDEX_MASK: u32 = (1 << CHILD_MASK_SHIFT) - 1;

#[derive(Default)]
struct BuildNode {
	own: Option<(u32, u32)>,
	children: [Option<Box<BuildNode>>; 4],
	span_offset: u32,
	span_end: u32,
}

/// Builds a quad tree over `root` from entries lying inside its subtree.
///
/// Fails for entries outside the subtree and for colliding entries on the
/// same tile (unless their byte ranges are adjacent and can be merged).
pub fn make_quad_tree(root: Tile, inputs: &[QuadTreeInput]) -> Result<Vec<u8>> {
	let mut tree = BuildNode::default();

	for input in inputs {
		ensure!(
			root.is_ancestor_of(&input.tile),
			"quad tree input {:?} outside the subtree of {root:?}",
			input.tile
		);
		insert(&mut tree, root, input)?;
	}
	finish_spans(&mut tree);

	// breadth-first allocation keeps each node's children contiguous
	let mut order: Vec<&BuildNode> = vec![&tree];
	let mut first_child: Vec<u32> = Vec::new();
	let mut next = 1u32;
	let mut i = 0;
	while i < order.len() {
		let node = order[i];
		first_child.push(next);
		for child in node.children.iter().flatten() {
			order.push(child);
			next += 1;
		}
		i += 1;
	}

	let mut writer = ValueWriter::new();
	for (node, first) in order.iter().zip(first_child) {
		let mut mask = 0u32;
		for (q, child) in node.children.iter().enumerate() {
			if child.is_some() {
				mask |= 1 << q;
			}
		}
		ensure!(first <= CHILD_INDEX_MASK, "quad tree too large");
		if let Some((own_offset, _)) = node.own {
			// the walk reports entries at the subtree span start; inputs
			// must arrive with ancestors at lower offsets than descendants
			ensure!(
				own_offset == node.span_offset,
				"quad tree entries out of pack order at {own_offset}"
			);
		}
		writer.write_u32((mask << CHILD_MASK_SHIFT) | if mask == 0 { 0 } else { first });
		writer.write_u32(node.span_offset);
		writer.write_u32(node.span_end - node.span_offset);
		writer.write_u32(node.own.map_or(0, |(_, size)| size));
	}
	Ok(writer.into_vec())
}

fn insert(node: &mut BuildNode, node_tile: Tile, input: &QuadTreeInput) -> Result<()> {
	if input.tile == node_tile {
		match &mut node.own {
			None => node.own = Some((input.offset, input.size)),
			Some((offset, size)) => {
				// adjacent ranges on the same tile collapse into one entry
				if *offset + *size == input.offset {
					*size += input.size;
				} else {
					bail!("colliding quad tree entries for {node_tile:?}");
				}
			}
		}
		return Ok(());
	}

	let q = input.tile.quadrant_at(node_tile.z, 1) as usize;
	let child = node.children[q].get_or_insert_with(Default::default);

	let child_tile = Tile::new(
		(node_tile.x << 1) | ((q as u32) & 1),
		(node_tile.y << 1) | ((q as u32) >> 1),
		node_tile.z + 1,
	);
	insert(child, child_tile, input)
}

fn finish_spans(node: &mut BuildNode) {
	let mut offset = u32::MAX;
	let mut end = 0u32;
	if let Some((own_offset, own_size)) = node.own {
		offset = own_offset;
		end = own_offset + own_size;
	}
	for child in node.children.iter_mut().flatten() {
		finish_spans(child);
		if child.span_end > child.span_offset {
			offset = offset.min(child.span_offset);
			end = end.max(child.span_end);
		}
	}
	if end == 0 {
		offset = 0;
	}
	node.span_offset = offset;
	node.span_end = end;
}

/// Walks the tree for `query`, emitting `(offset, size)` byte ranges.
///
/// Queries at or above the root yield the whole stored span once. Below the
/// root, the walk descends towards `query`, emitting the entry of every node
/// passed through; reaching `query` (or running out of nodes below it)
/// yields the remaining subtree span.
pub fn walk_quad_tree(
	tree: &[u8],
	root: Tile,
	query: Tile,
	mut emit: impl FnMut(u32, u32),
) -> Result<()> {
	ensure!(
		!tree.is_empty() && tree.len() % (NODE_CELLS * 4) == 0,
		"invalid quad tree size {}",
		tree.len()
	);
	let cell = |node: usize, i: usize| -> u32 {
		LittleEndian::read_u32(&tree[(node * NODE_CELLS + i) * 4..])
	};
	let node_count = tree.len() / (NODE_CELLS * 4);

	if query.is_ancestor_of(&root) {
		if cell(0, 2) > 0 {
			emit(cell(0, 1), cell(0, 2));
		}
		return Ok(());
	}
	if !root.is_ancestor_of(&query) {
		return Ok(());
	}

	let mut node = 0usize;
	let mut tile = root;
	loop {
		if tile == query {
			if cell(node, 2) > 0 {
				emit(cell(node, 1), cell(node, 2));
			}
			return Ok(());
		}

		if cell(node, 3) > 0 {
			emit(cell(node, 1), cell(node, 3));
		}

		let q = query.quadrant_at(tile.z, 1) as usize;
		let info = cell(node, 0);
		let mask = info >> CHILD_MASK_SHIFT;
		if mask & (1 << q) == 0 {
			return Ok(());
		}
		let skipped = (mask & ((1 << q) - 1)).count_ones() as usize;
		node = (info & CHILD_INDEX_MASK) as usize + skipped;
		ensure!(node < node_count, "quad tree child index out of bounds");

		let shift = query.z - tile.z - 1;
		tile = Tile::new(
			(tile.x << 1) | ((query.x >> shift) & 1),
			(tile.y << 1) | ((query.y >> shift) & 1),
			tile.z + 1,
		);
	}
}
