macro_rules! lazy_regex {
    ($name:ident = $pattern:expr) => {
        static $name: once_cell::sync::Lazy<regex::Regex> =
            once_cell::sync::Lazy::new(|| regex::Regex::new($pattern).expect("invalid regex"));
    };
}

pub mod affiliation;
pub mod canonical;
pub mod download;
pub mod roster;

pub use affiliation::{merge_developer, AffiliationMerger, EnrichSummary, MergeError};
pub use canonical::{apply_substitutions, substitute, Canonicalizer, ENTITY_SUBSTITUTION};
pub use download::{download_rosters, HttpRosterSource, RosterSource};
pub use roster::{parse_roster, to_text, Affiliation, RosterDeveloper};
