/// Logging initialization: tracing-subscriber::fmt → stderr.
///
/// Called once at the start of `ChatApp::new()`, before anything else.
/// Repeated calls are harmless (`try_init` ignores an existing subscriber),
/// which matters for integration tests that build several apps per process.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "grange_core=debug,grange_api=debug,info".into()),
        )
        .try_init();
}
