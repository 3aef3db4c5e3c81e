// Groovedeck - drum groove playback, composition and audio-to-groove matching
// Module declarations and the command-line entry point

pub mod analysis;
pub mod audio;
pub mod composer;
pub mod config;
pub mod engine;
pub mod groove;
pub mod library;
pub mod playback;
pub mod storage;

use std::path::PathBuf;

pub use config::{ConfigError, EngineConfig};
pub use engine::{EngineError, GrooveEngine};

/// Environment variable naming a JSON config file
pub const CONFIG_ENV: &str = "GROOVEDECK_CONFIG";

/// Install the env_logger backend (`info` unless `RUST_LOG` says otherwise)
///
/// Safe to call more than once; later calls leave the first logger in place.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .try_init();
}

/// Parsed command line: `groovedeck <audio.wav> [library-root] [--export]`
#[derive(Debug, Clone, PartialEq)]
pub struct RunOptions {
    pub audio: PathBuf,
    pub library_root: Option<PathBuf>,
    pub export: bool,
}

impl RunOptions {
    /// Parse arguments after the program name; `None` when the audio path is missing
    pub fn from_args(args: impl IntoIterator<Item = String>) -> Option<Self> {
        let mut export = false;
        let mut positional = Vec::new();
        for arg in args {
            if arg == "--export" {
                export = true;
            } else {
                positional.push(PathBuf::from(arg));
            }
        }

        let mut positional = positional.into_iter();
        let audio = positional.next()?;
        Some(RunOptions {
            audio,
            library_root: positional.next(),
            export,
        })
    }
}

/// Config from `GROOVEDECK_CONFIG` if set, defaults otherwise
pub fn load_config() -> Result<EngineConfig, ConfigError> {
    match std::env::var_os(CONFIG_ENV) {
        Some(path) => EngineConfig::from_file(&PathBuf::from(path)),
        None => Ok(EngineConfig::default()),
    }
}

/// Analyse one audio file against the library and print the ranked matches
pub async fn run(options: RunOptions) -> Result<(), EngineError> {
    let mut config = load_config()?;
    if options.library_root.is_some() {
        config.library_root = options.library_root.clone();
    }

    let engine = GrooveEngine::new(config)?;
    let report = engine.analyze_file(&options.audio).await?;

    println!(
        "{}: {:.1} bpm ({:?}, confidence {:.2}), {} onsets",
        options.audio.display(),
        report.rhythm.bpm,
        report.rhythm.tempo_source,
        report.rhythm.confidence,
        report.rhythm.onset_beats.len()
    );
    for (rank, m) in report.matches.iter().enumerate() {
        println!(
            "{:>3}. {:>5.1}  {}/{}  ({:+.1} bpm)",
            rank + 1,
            m.match_score,
            m.category_name,
            m.pattern_name,
            m.bpm_delta
        );
    }

    if options.export {
        let Some(best) = report.matches.first() else {
            log::warn!("No matches to export");
            return Ok(());
        };
        engine.add_item(best.pattern.category, best.pattern.pattern, 0)?;
        let path = engine.export_composition_file(&composer::MidiExportOptions {
            bpm: report.rhythm.bpm,
            ..Default::default()
        })?;
        println!("Exported {}", path.display());
    }

    Ok(())
}
