use std::sync::Arc;

use btb_blinko::BlinkoClient;
use btb_core::{
    config::Config,
    correlation::CorrelationStore,
    notes::NoteClient,
    storage,
    vault::{CipherKey, CredentialVault},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    btb_core::logging::init("btb")?;

    let cfg = Arc::new(Config::load()?);

    let pool = storage::open(&cfg.database_path).await?;
    let key = CipherKey::load_or_generate(&cfg)?;

    let vault = CredentialVault::new(pool.clone(), key);
    let store = CorrelationStore::new(pool);
    let notes: Arc<dyn NoteClient> = Arc::new(BlinkoClient::new(&cfg)?);

    btb_telegram::router::run_polling(cfg, vault, store, notes).await
}
