use env_logger::Env;
use log::LevelFilter;

/// Logs go to stderr; stdout carries only the matched path.
/// `RUST_LOG` wins over `-v` when set.
pub fn init(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    let _ = env_logger::Builder::from_env(Env::default().default_filter_or(level.as_str()))
        .format_timestamp(None)
        .try_init();
}
