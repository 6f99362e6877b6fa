//! Little-endian binary readers and writers with varint and protobuf-style
//! framing helpers. All persisted structures of the workspace (node index,
//! feature packs, trees, vector tiles) go through these two types, which
//! keeps the formats position-independent and host-independent.

mod value_reader;
mod value_writer;

pub use value_reader::ValueReader;
pub use value_writer::ValueWriter;
