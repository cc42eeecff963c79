pub mod common;

pub use common::{init_logging, BackendKind, DataPathArgs, DataPathOpts};
