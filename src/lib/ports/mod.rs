pub mod events;
pub mod node_store;
