//! Configuration persistence.

pub mod xml;

pub use xml::XmlNode;
