//! Helpers shared by the unit tests

use crate::runtime::Runtime;
use std::sync::Once;

static INIT_LOGGING: Once = Once::new();


/// Route tracing output through the test harness, so that it is only shown
/// for failing tests
///
/// The first call wins, later calls are no-ops.
///
pub(crate) fn init_test_logging() {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .with_thread_names(true)
            .with_target(true)
            .with_ansi(false)
            .try_init();
    });
}


/// Fresh runtime with small worker pools, so that tests do not share threads
pub(crate) fn test_runtime() -> Runtime {
    let mut builder = Runtime::builder().thread_name_prefix("test");
    for &priority in crate::executor::Priority::ALL.iter() {
        builder = builder.worker_threads(priority, 2);
    }
    match builder.build() {
        Ok(runtime) => runtime,
        Err(error) => panic!("test runtime configuration rejected: {}", error),
    }
}
