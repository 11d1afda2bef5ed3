use tracing::Level;

/// Pick the log level from the command-line switches.
///
/// `--ddebug` turns on hex dumps of every command, so it implies `--debug`.
pub fn level_for(debug: bool, ddebug: bool) -> Level {
    if ddebug {
        Level::TRACE
    } else if debug {
        Level::DEBUG
    } else {
        Level::INFO
    }
}

/// Install the global subscriber. The target names the component
/// (`ax206usb`, `output`, `dispatch`, ...).
pub fn init(level: Level) {
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(true)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_selection() {
        assert_eq!(level_for(false, false), Level::INFO);
        assert_eq!(level_for(true, false), Level::DEBUG);
        assert_eq!(level_for(false, true), Level::TRACE);
        assert_eq!(level_for(true, true), Level::TRACE);
    }
}
