mod harness;

#[cfg(unix)]
pub use harness::install_fake_engine;
pub use harness::{RunResult, run_cli, write_file};
