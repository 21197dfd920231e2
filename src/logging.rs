//! Log sink setup for the binaries

use log::LevelFilter;

/// Map the `--log-level` verbosity to a filter.
///
/// `0` keeps whatever `RUST_LOG` asks for (default: warnings only).
pub fn level_filter(level: u8) -> Option<LevelFilter> {
    match level {
        0 => None,
        1 => Some(LevelFilter::Info),
        _ => Some(LevelFilter::Debug),
    }
}

/// Install the stderr logger once. A second call is a no-op.
pub fn init(level: u8) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    if let Some(filter) = level_filter(level) {
        builder.filter_level(filter);
    }
    let _ = builder.target(env_logger::Target::Stderr).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_filter() {
        assert_eq!(level_filter(0), None);
        assert_eq!(level_filter(1), Some(LevelFilter::Info));
        assert_eq!(level_filter(2), Some(LevelFilter::Debug));
        assert_eq!(level_filter(9), Some(LevelFilter::Debug));
    }

    #[test]
    fn test_init_twice() {
        init(2);
        init(0);
        log::debug!("logger installed");
    }
}
