use dboe::config::DatasetConfig;
use dboe::tuple::TripleTable;
use dboe::txn::TxnMode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dboe=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment variables
    let config = match DatasetConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!(
        "Loaded configuration: directory={}, block_size={}, cache_blocks={}, checking={}",
        config.directory.display(),
        config.block_size,
        config.cache_blocks,
        config.checking
    );

    // Opening runs journal recovery if the last process did not shut down
    // cleanly.
    let (table, recovery) = match TripleTable::open(&config) {
        Ok(opened) => opened,
        Err(e) => {
            tracing::error!("Failed to open dataset: {e}");
            std::process::exit(1);
        }
    };
    tracing::info!(
        "Recovery: entries={}, replayed={}, discarded={}, blocks={}, torn_bytes={}",
        recovery.entries_scanned,
        recovery.transactions_replayed,
        recovery.transactions_discarded,
        recovery.blocks_replayed,
        recovery.torn_bytes
    );

    let txn = match table.begin(TxnMode::Read) {
        Ok(txn) => txn,
        Err(e) => {
            tracing::error!("Failed to begin read transaction: {e}");
            std::process::exit(1);
        }
    };

    let mut healthy = true;
    for index in table.indexes() {
        match (dboe::index::Index::check(index.index(), &txn), index.size(&txn)) {
            (Ok(()), Ok(size)) => {
                let cache = index.index().inner().cache_stats();
                tracing::info!(
                    index = index.name(),
                    size,
                    cache_hits = cache.hits,
                    cache_misses = cache.misses,
                    "index ok"
                );
            }
            (Err(e), _) => {
                healthy = false;
                tracing::error!(index = index.name(), "check failed: {e}");
            }
            (_, Err(e)) => {
                healthy = false;
                tracing::error!(index = index.name(), "size failed: {e}");
            }
        }
    }
    drop(txn);

    let stats = table.coordinator().stats();
    tracing::info!(
        data_version = stats.data_version,
        committed = stats.committed,
        "dataset checked"
    );
    if !healthy {
        std::process::exit(1);
    }
}
