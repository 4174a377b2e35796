use env_logger::Env;

/// `info` unless `RUST_LOG` says otherwise. Logs go to stderr; stdout
/// carries the event stream.
pub fn init() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}
