//! Reference server for the remote key-value table that Shopkeep clients
//! mirror their slots to.

pub mod server;
