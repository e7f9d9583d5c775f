pub mod abi;
pub mod ethereum;
pub mod json_file;
pub mod memory_store;
pub mod mock_chain;
