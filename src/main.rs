use std::io;
use std::process::ExitCode;

use log::{error, info};

use fat32sh::logging;
use fat32sh::prelude::*;
use fat32sh::shell;

fn main() -> ExitCode {
    if let Err(e) = logging::init() {
        eprintln!("logger unavailable: {}", e);
    }

    let args: Vec<String> = std::env::args().collect();
    let [_, image] = args.as_slice() else {
        eprintln!("usage: fat32sh <image>");
        return ExitCode::FAILURE;
    };

    let mut volume = match Volume::open(image) {
        Ok(volume) => volume,
        Err(e) => {
            eprintln!("{}: {}", image, e);
            return ExitCode::FAILURE;
        }
    };
    info!("mounted {}", image);

    match shell::run(&mut volume, io::stdin().lock(), io::stdout()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("session aborted: {}", e);
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}
