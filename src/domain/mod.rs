//! Grid specific structures built on top of the messaging [`library`](crate::library)

pub mod directory;
pub mod node;
