pub mod assembler;
pub mod codec;
pub mod composer;
pub mod constants;
pub mod error;
pub mod format;
pub mod layout;
pub mod reader;
pub mod schema;
pub mod value;
