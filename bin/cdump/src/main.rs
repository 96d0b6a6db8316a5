#![deny(unsafe_code)]

use std::io;
use std::{env, process};

fn main() {
    let mut stdout = io::stdout().lock();
    let mut stderr = io::stderr().lock();
    let exit_code = cdump_cli::run(env::args_os(), &mut stdout, &mut stderr);
    process::exit(exit_code.as_i32());
}
