//! Re-running the current test binary as a child process
//!
//! For behaviour that ends the process (guard faults, debug aborts). The
//! child runs exactly one test, picked by name, with a scenario name in the
//! environment; that test returns immediately when the variable is unset.

use std::process::{Command, ExitStatus};

pub fn rerun_single(test: &str, env_key: &str, scenario: &str) -> ExitStatus {
    let exe = std::env::current_exe().expect("test binary path");
    Command::new(exe)
        .args([test, "--exact", "--nocapture", "--test-threads=1"])
        .env(env_key, scenario)
        .output()
        .expect("spawn child")
        .status
}
