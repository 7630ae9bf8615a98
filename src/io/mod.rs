//! I/O layer: the `mapper` collaborator that fetches raw file bytes, and the
//! `xml` adapter that turns them into decoded documents.
pub mod mapper;
pub use mapper::{DirMapper, Mapper};

pub mod xml;
pub use xml::{decode_xml, decode_xml_document, select};
