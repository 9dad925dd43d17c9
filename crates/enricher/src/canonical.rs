use std::collections::HashMap;

use common::{AppError, Result as AppResult};
use db::{DbError, Repositories};
use tracing::{debug, info, instrument};

pub use db::ENTITY_SUBSTITUTION;

lazy_regex!(NON_ALNUM_RE = r"[^a-zA-Z0-9 ]+");

const MAX_PASSES: usize = 8;

/// Company-type suffixes, compared after punctuation is stripped (`B.V.` is `BV`).
const NOISE_WORDS: &[&str] = &[
    "LLC", "INC", "CORP", "LTD", "GMBH", "PVT", "SE", "CO", "COMPANY", "CORPORATION", "GROUP",
    "BV", "LC", "PC", "PA", "SC", "SA", "CHTD", "SCA", "SCO", "SCP", "SCS", "SCV", "CDL",
];

const BUILTIN_ALIASES: &[(&str, &str)] = &[("INTERNATIONAL BUSINESS MACHINES", "IBM")];

/// Maps free-form company names onto one uppercase entity name.
#[derive(Debug, Clone)]
pub struct Canonicalizer {
    substitutions: HashMap<String, String>,
}

impl Default for Canonicalizer {
    fn default() -> Self {
        Self::new(std::iter::empty::<(&str, &str)>())
    }
}

impl Canonicalizer {
    /// Built-in aliases overlaid with `user` substitutions.
    pub fn new<I, K, V>(user: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut substitutions: HashMap<String, String> = BUILTIN_ALIASES
            .iter()
            .map(|(old, new)| (old.to_string(), new.to_string()))
            .collect();
        for (old, new) in user {
            let key = old.as_ref().trim().to_uppercase();
            if !key.is_empty() {
                substitutions.insert(key, new.as_ref().trim().to_string());
            }
        }
        Self { substitutions }
    }

    /// Built-ins plus every stored entity substitution.
    pub async fn load(store: &dyn Repositories) -> Result<Self, DbError> {
        let rows = store.substitutions().list().await?;
        let user: Vec<(String, String)> = rows
            .into_iter()
            .filter(|row| row.kind == ENTITY_SUBSTITUTION)
            .map(|row| (row.old, row.new))
            .collect();
        debug!(substitutions = user.len(), "canonicalizer loaded");
        Ok(Self::new(user))
    }

    pub fn canonicalize(&self, raw: &str) -> String {
        let mut current = self.pass(raw);
        for _ in 1..MAX_PASSES {
            let next = self.pass(&current);
            if next == current {
                break;
            }
            current = next;
        }
        current
    }

    fn substitute<'a>(&'a self, value: &'a str) -> &'a str {
        self.substitutions.get(value).map(String::as_str).unwrap_or(value)
    }

    fn pass(&self, raw: &str) -> String {
        let upper = raw.trim().to_uppercase();
        let replaced = self.substitute(&upper).to_uppercase();
        let stripped = NON_ALNUM_RE.replace_all(&replaced, "");
        let joined = stripped
            .split_whitespace()
            .filter(|token| !NOISE_WORDS.contains(token))
            .collect::<Vec<_>>()
            .join(" ");
        self.substitute(&joined).to_string()
    }
}

/// Records `old -> new` and rewrites matching developers right away.
///
/// Both names are stored in canonical form, so `old` matches stored entities
/// regardless of how it was typed and `new` is already a valid entity.
#[instrument(skip(store))]
pub async fn substitute(store: &dyn Repositories, kind: &str, old: &str, new: &str) -> AppResult<u64> {
    if kind != ENTITY_SUBSTITUTION {
        return Err(AppError::invalid(format!(
            "unsupported substitution type `{kind}`, expected `{ENTITY_SUBSTITUTION}`"
        )));
    }
    let canon = Canonicalizer::default();
    let (old, new) = (canon.canonicalize(old), canon.canonicalize(new));
    if old.is_empty() || new.is_empty() {
        return Err(AppError::invalid("substitution needs both --old and --new"));
    }
    let updated = store
        .substitutions()
        .save_and_apply(kind, &old, &new)
        .await
        .map_err(AppError::db)?;
    info!(%old, %new, updated, "entity substitution applied");
    Ok(updated)
}

/// Reruns every stored substitution in insertion order.
pub async fn apply_substitutions(store: &dyn Repositories) -> Result<u64, DbError> {
    let updated = store.substitutions().apply_all().await?;
    info!(updated, "stored substitutions reapplied");
    Ok(updated)
}
