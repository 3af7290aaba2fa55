//! Logging utilities.
//!
//! Every diagnostic in the engine goes through the `log` facade. Compile and
//! link logs are emitted at `error`, missing properties and type mismatches at
//! `warn`, reload results at `info` and `debug`.

mod init;

pub use init::{init_logging, LoggingConfig};
