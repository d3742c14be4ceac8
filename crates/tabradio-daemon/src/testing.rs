//! Test doubles shared by the unit tests.

use std::collections::BTreeMap;

use tabradio_proto::catalog::{Catalog, CatalogKind};

use crate::player::{Playback, PlayerError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Start { url: String, volume: u8 },
    Stop,
}

impl Call {
    pub fn start(url: &str, volume: u8) -> Self {
        Call::Start {
            url: url.to_string(),
            volume,
        }
    }
}

/// Records what the session asked for; never launches anything.
#[derive(Debug, Default)]
pub struct FakePlayer {
    pub calls: Vec<Call>,
    no_backend: bool,
}

impl FakePlayer {
    pub fn without_backend() -> Self {
        Self {
            no_backend: true,
            ..Self::default()
        }
    }
}

impl Playback for FakePlayer {
    async fn start(&mut self, url: &str, volume: u8) -> Result<(), PlayerError> {
        if self.no_backend {
            return Err(PlayerError::NoBackend);
        }
        self.calls.push(Call::start(url, volume));
        Ok(())
    }

    async fn stop(&mut self) {
        self.calls.push(Call::Stop);
    }
}

pub fn catalog(kind: CatalogKind, entries: &[(&str, &str)]) -> Catalog {
    let entries: BTreeMap<String, String> = entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    Catalog::new(kind, entries)
}
