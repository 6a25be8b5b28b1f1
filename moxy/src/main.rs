//! `moxy`: expose this process's stdio and exit status through
//! `<home>/moxecutable/<program>/<pid>/`.
//!
//! Arguments are not interpreted; they are recorded in `context.json`. The
//! process exits with the code a controller writes to `mox_exit`.

use moxy::exit_codes;
use moxy::shim::run_current_process;

fn main() {
    moxy::logging::init();
    match run_current_process() {
        Ok(Some(code)) => std::process::exit(code),
        Ok(None) => std::process::exit(exit_codes::NO_EXIT_TOKEN),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::STARTUP_FAILURE);
        }
    }
}
