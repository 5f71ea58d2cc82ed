//! Test fixtures for generating test data.

use bytes::Bytes;
use futures::Stream;
use packyard_core::PackageVersionKey;
use packyard_server::Clock;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};
use time::OffsetDateTime;

/// Counter for generating unique package names.
static PACKAGE_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Generate deterministic test data based on a seed.
pub fn seeded_bytes(seed: u64, len: usize) -> Bytes {
    let mut data = vec![0u8; len];
    let mut state = seed;

    for chunk in data.chunks_mut(8) {
        // Simple LCG for deterministic data
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        let bytes = state.to_le_bytes();
        for (i, byte) in chunk.iter_mut().enumerate() {
            *byte = bytes[i % 8];
        }
    }

    Bytes::from(data)
}

/// Compute SHA-256 hash of data as hex string.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub fn sha256_hash(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Generate a version key with a package name unique to this test run.
#[allow(dead_code)]
pub fn unique_version(version_number: &str) -> PackageVersionKey {
    let counter = PACKAGE_COUNTER.fetch_add(1, Ordering::Relaxed);
    PackageVersionKey::new(
        "node",
        "gulp",
        format!("widget-{counter}"),
        version_number,
    )
    .expect("valid test coordinates")
}

/// Split `data` into a body stream of `frame`-sized chunks.
#[allow(dead_code)]
pub fn chunked_body(
    data: Bytes,
    frame: usize,
) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static {
    let frames: Vec<Result<Bytes, std::io::Error>> = (0..data.len())
        .step_by(frame.max(1))
        .map(|start| Ok(data.slice(start..(start + frame).min(data.len()))))
        .collect();
    futures::stream::iter(frames)
}

/// Clock pinned to a single instant.
#[derive(Clone, Copy, Debug)]
pub struct FixedClock(pub OffsetDateTime);

impl FixedClock {
    #[allow(dead_code)]
    pub fn at_unix(seconds: i64) -> Self {
        Self(OffsetDateTime::from_unix_timestamp(seconds).expect("valid timestamp"))
    }
}

impl Clock for FixedClock {
    fn now(&self) -> OffsetDateTime {
        self.0
    }
}
