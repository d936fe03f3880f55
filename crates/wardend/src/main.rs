use std::ffi::OsString;
use std::io::{self, Write};
use std::process::ExitCode;

use ortho_config::OrthoConfig;
use warden_config::Config;
use wardend::{DaemonConfig, LaunchError, LaunchMode, run_daemon};

fn main() -> ExitCode {
    let (mode, args) = LaunchMode::from_args(std::env::args_os());
    if mode == LaunchMode::Debug {
        // SAFETY: no other threads exist yet.
        unsafe { std::env::set_var("RUST_LIB_BACKTRACE", "1") };
    }
    match launch(mode, args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            let mut stderr = io::stderr().lock();
            writeln!(stderr, "error: {error}").ok();
            ExitCode::FAILURE
        }
    }
}

fn launch(mode: LaunchMode, args: Vec<OsString>) -> Result<(), LaunchError> {
    let config = Config::load_from_iter(args)?;
    run_daemon(DaemonConfig::new(config, mode))
}
