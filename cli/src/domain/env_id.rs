//! Environment identifiers.
//!
//! Generated IDs look like `bbl-env-<adjective>-<noun>-<YYYY-MM-DD>t<HH-MM>z`.
//! User-supplied names (`bbl up --name`) are validated instead.

use std::sync::LazyLock;

use anyhow::Result;
use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use regex::Regex;

use crate::domain::error::BblError;

const ADJECTIVES: &[&str] = &[
    "amber", "ancient", "autumn", "billowing", "bitter", "bold", "calm", "crimson", "dawn",
    "delicate", "divine", "dry", "empty", "falling", "fragrant", "frosty", "gentle", "hidden",
    "icy", "lingering", "little", "lively", "misty", "morning", "muddy", "nameless", "old",
    "patient", "polished", "proud", "quiet", "restless", "rough", "shy", "silent", "small",
    "snowy", "solitary", "sparkling", "still", "summer", "twilight", "wandering", "weathered",
    "white", "wild", "winter", "wispy", "withered", "young",
];

const NOUNS: &[&str] = &[
    "bird", "breeze", "brook", "bush", "butterfly", "cherry", "cloud", "darkness", "dawn", "dew",
    "dream", "dust", "feather", "field", "fire", "firefly", "flower", "fog", "forest", "frog",
    "frost", "glade", "glitter", "grass", "haze", "hill", "lake", "leaf", "meadow", "moon",
    "morning", "mountain", "night", "paper", "pine", "pond", "rain", "resonance", "river", "sea",
    "shadow", "shape", "silence", "sky", "smoke", "snow", "sound", "star", "sun", "sunset",
    "surf", "thunder", "tree", "violet", "voice", "water", "waterfall", "wave", "wildflower",
    "wind", "wood",
];

static GENERATED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^bbl-env-[a-z]+-(?:[a-z]+-)?\d{4}-\d{2}-\d{2}t\d{2}-\d{2}z$")
        .unwrap_or_else(|e| unreachable!("static regex: {e}"))
});

static USER_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z][a-z0-9-]{0,39}$").unwrap_or_else(|e| unreachable!("static regex: {e}"))
});

/// Generate a fresh environment identifier stamped with `now`.
#[must_use]
pub fn generate(now: DateTime<Utc>) -> String {
    let mut rng = rand::thread_rng();
    let adjective = ADJECTIVES.choose(&mut rng).copied().unwrap_or("bold");
    let noun = NOUNS.choose(&mut rng).copied().unwrap_or("lake");
    format!(
        "bbl-env-{adjective}-{noun}-{}",
        now.format("%Y-%m-%dt%H-%Mz")
    )
}

/// True when `id` has the shape of a generated identifier.
#[must_use]
pub fn is_generated(id: &str) -> bool {
    GENERATED.is_match(id)
}

/// Validate a user-supplied environment name.
///
/// # Errors
///
/// Returns `BblError::InvalidEnvId` if the name cannot be used in cloud resource names.
pub fn validate_name(name: &str) -> Result<()> {
    if !USER_NAME.is_match(name) {
        return Err(BblError::InvalidEnvId(name.to_string()).into());
    }
    Ok(())
}
