//! Shared setup for midiroute-core integration tests.

/// Routes engine logs to the test writer. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("midiroute_core=debug")),
        )
        .with_test_writer()
        .try_init();
}
