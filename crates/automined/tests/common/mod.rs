//! Shared fixtures for the daemon integration tests.

#![allow(dead_code)]

use automine_shared::Address;
use automined::{
    Clock, Config, FakeChainClient, MemoryStore, RecordingListener, StateStore, SwitchEngine,
    SystemClock,
};
use std::sync::Arc;

pub const PRIMARY: &str = "0x1111111111111111111111111111111111111111";
pub const SECONDARY: &str = "0x2222222222222222222222222222222222222222";

pub fn primary() -> Address {
    Address::parse(PRIMARY).unwrap()
}

pub fn secondary() -> Address {
    Address::parse(SECONDARY).unwrap()
}

pub fn config() -> Config {
    let toml_str = format!(
        r#"
[targets.primary]
address = "{}"
label = "Dragon Mine"

[targets.secondary]
address = "{}"
label = "Crystal Mine"
"#,
        PRIMARY, SECONDARY
    );
    toml::from_str(&toml_str).unwrap()
}

/// Engine plus the handles tests need to inspect it
pub struct Harness {
    pub engine: Arc<SwitchEngine>,
    pub fake: Arc<FakeChainClient>,
    pub store: Arc<dyn StateStore>,
    pub events: Arc<RecordingListener>,
}

pub async fn harness(fake: FakeChainClient) -> Harness {
    harness_with(config(), fake, Arc::new(MemoryStore::new()), Arc::new(SystemClock)).await
}

pub async fn harness_with(
    config: Config,
    fake: FakeChainClient,
    store: Arc<dyn StateStore>,
    clock: Arc<dyn Clock>,
) -> Harness {
    let fake = Arc::new(fake);
    let events = Arc::new(RecordingListener::new());
    let engine = SwitchEngine::new(
        &config,
        fake.clone(),
        Arc::clone(&store),
        events.clone(),
        clock,
    )
    .await
    .unwrap();

    Harness {
        engine: Arc::new(engine),
        fake,
        store,
        events,
    }
}

/// Chain where the current target is primary with the given availabilities
pub fn chain(primary_up: bool, secondary_up: bool) -> automined::FakeChainClientBuilder {
    FakeChainClient::builder(primary())
        .available(&primary(), primary_up)
        .available(&secondary(), secondary_up)
}
