mod fixtures;
mod recording;

pub use fixtures::{
    customers, items, orders, seeded_context, Customer, CustomerArchive, CustomerSummary,
    CustomerView, Item, Order,
};
pub use recording::{RecordingContext, TransactionCounts};

/// Install a test-friendly tracing subscriber once per process.
///
/// Output goes through the test harness capture; `RUST_LOG` selects levels.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}
