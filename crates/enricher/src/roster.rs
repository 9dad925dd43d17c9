//! Line-based affiliation roster format:
//!
//! ```text
//! username: email1!example.com, email2!example.com
//!     Acme Corp from 2019-01-01 until 2021-06-30
//!     Initech from 2021-07-01
//!
//! next-user: ...
//! ```

use serde::Serialize;

lazy_regex!(AFFILIATION_RE = r"^(?P<entity>.+?)(?:\s+from\s+(?P<from>\d{4}-\d{2}-\d{2}))?(?:\s+until\s+(?P<until>\d{4}-\d{2}-\d{2}))?\s*$");

const NOREPLY_DOMAIN: &str = "users.noreply.github.com";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Affiliation {
    pub entity: String,
    pub from: Option<String>,
    pub until: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RosterDeveloper {
    pub username: String,
    pub identities: Vec<String>,
    pub affiliations: Vec<Affiliation>,
}

impl RosterDeveloper {
    /// Affiliation with the highest `from` date; undated entries rank lowest
    /// and later lines win ties.
    pub fn latest_affiliation(&self) -> Option<&Affiliation> {
        let mut best: Option<&Affiliation> = None;
        for affiliation in &self.affiliations {
            let newer = match best {
                None => true,
                Some(current) => affiliation.from.as_deref().unwrap_or("") >= current.from.as_deref().unwrap_or(""),
            };
            if newer {
                best = Some(affiliation);
            }
        }
        best
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    BetweenUsers,
    InIdentities,
    InAffiliations,
}

/// `username: ids` when the part before the colon is a single token.
fn header(line: &str) -> Option<(&str, &str)> {
    let (user, rest) = line.split_once(':')?;
    let user = user.trim();
    if user.is_empty() || user.contains(char::is_whitespace) {
        return None;
    }
    Some((user, rest))
}

fn identities(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|id| id.trim().replace('!', "@"))
        .filter(|id| !id.is_empty() && !id.to_ascii_lowercase().contains(NOREPLY_DOMAIN))
        .collect()
}

/// Continuation line holding only identities.
fn is_identity_line(line: &str) -> bool {
    line.split(',')
        .map(str::trim)
        .all(|id| !id.is_empty() && !id.contains(char::is_whitespace) && (id.contains('!') || id.contains('@')))
}

fn affiliation(line: &str) -> Option<Affiliation> {
    let caps = AFFILIATION_RE.captures(line)?;
    let entity = caps.name("entity")?.as_str().trim().to_string();
    if entity.is_empty() {
        return None;
    }
    Some(Affiliation {
        entity,
        from: caps.name("from").map(|m| m.as_str().to_string()),
        until: caps.name("until").map(|m| m.as_str().to_string()),
    })
}

pub fn parse_roster(text: &str) -> Vec<RosterDeveloper> {
    let mut developers = Vec::new();
    let mut current: Option<RosterDeveloper> = None;
    let mut state = ParseState::BetweenUsers;

    for raw in text.lines() {
        let line = raw.trim();
        if line.starts_with('#') {
            continue;
        }
        if line.is_empty() {
            developers.extend(current.take());
            state = ParseState::BetweenUsers;
            continue;
        }

        if let Some((user, ids)) = header(line) {
            developers.extend(current.take());
            current = Some(RosterDeveloper {
                username: user.trim_start_matches('@').to_string(),
                identities: identities(ids),
                affiliations: Vec::new(),
            });
            state = ParseState::InIdentities;
            continue;
        }

        match (state, current.as_mut()) {
            (ParseState::InIdentities, Some(dev)) if is_identity_line(line) => {
                dev.identities.extend(identities(line));
            }
            (ParseState::InIdentities | ParseState::InAffiliations, Some(dev)) => {
                if let Some(affiliation) = affiliation(line) {
                    dev.affiliations.push(affiliation);
                }
                state = ParseState::InAffiliations;
            }
            _ => {}
        }
    }
    developers.extend(current);
    developers
}

/// Serializes back into the roster format; `parse_roster(to_text(x)) == x`.
pub fn to_text(developers: &[RosterDeveloper]) -> String {
    let mut out = String::new();
    for dev in developers {
        let ids: Vec<String> = dev.identities.iter().map(|id| id.replace('@', "!")).collect();
        out.push_str(&format!("{}: {}\n", dev.username, ids.join(", ")));
        for affiliation in &dev.affiliations {
            out.push('\t');
            out.push_str(&affiliation.entity);
            if let Some(from) = &affiliation.from {
                out.push_str(&format!(" from {from}"));
            }
            if let Some(until) = &affiliation.until {
                out.push_str(&format!(" until {until}"));
            }
            out.push('\n');
        }
        out.push('\n');
    }
    out
}
