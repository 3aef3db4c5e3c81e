// Groovedeck command line - analyse a WAV file against the groove library

use groovedeck_lib::{init_logging, run, RunOptions};

#[tokio::main]
async fn main() {
    init_logging();

    let Some(options) = RunOptions::from_args(std::env::args().skip(1)) else {
        eprintln!("Usage: groovedeck <audio.wav> [library-root] [--export]");
        std::process::exit(2);
    };

    if let Err(e) = run(options).await {
        log::error!("{}", e);
        std::process::exit(1);
    }
}
