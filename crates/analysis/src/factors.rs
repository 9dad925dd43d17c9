use db::NamedCount;
use serde::Serialize;

pub const OTHERS_BUCKET: &str = "ALL OTHERS";
pub const TOP_SHARES: usize = 9;

/// Smallest number of leading contributors covering half of all events.
///
/// `counts` may arrive in any order; a contributor is counted while the
/// cumulative sum before it is still below half of the total.
pub fn concentration_factor(counts: &[NamedCount]) -> i64 {
    let mut values: Vec<i64> = counts.iter().map(|c| c.count).filter(|c| *c > 0).collect();
    values.sort_unstable_by(|a, b| b.cmp(a));
    let half = values.iter().sum::<i64>() as f64 * 0.5;

    let mut cumulative = 0i64;
    let mut factor = 0;
    for value in values {
        if (cumulative as f64) >= half {
            break;
        }
        factor += 1;
        cumulative += value;
    }
    factor
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Share {
    pub name: String,
    pub count: i64,
    pub percent: f64,
}

/// Top shares by count with the remainder folded into `ALL OTHERS`.
/// Names in `exclude` (case-insensitive) are dropped before ranking.
pub fn top_shares(counts: &[NamedCount], exclude: &[String]) -> Vec<Share> {
    let mut kept: Vec<&NamedCount> = counts
        .iter()
        .filter(|c| c.count > 0)
        .filter(|c| !exclude.iter().any(|x| x.eq_ignore_ascii_case(&c.name)))
        .collect();
    kept.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));

    let total: i64 = kept.iter().map(|c| c.count).sum();
    let percent = |count: i64| {
        if total == 0 {
            0.0
        } else {
            (count as f64 * 10_000.0 / total as f64).round() / 100.0
        }
    };

    let mut shares: Vec<Share> = kept
        .iter()
        .take(TOP_SHARES)
        .map(|c| Share {
            name: c.name.clone(),
            count: c.count,
            percent: percent(c.count),
        })
        .collect();
    let rest: i64 = kept.iter().skip(TOP_SHARES).map(|c| c.count).sum();
    if rest > 0 {
        shares.push(Share {
            name: OTHERS_BUCKET.to_string(),
            count: rest,
            percent: percent(rest),
        });
    }
    shares
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(values: &[(&str, i64)]) -> Vec<NamedCount> {
        values
            .iter()
            .map(|(name, count)| NamedCount {
                name: name.to_string(),
                count: *count,
            })
            .collect()
    }

    #[test]
    fn single_dominant_contributor() {
        assert_eq!(concentration_factor(&counts(&[("bob", 30), ("alice", 50), ("carol", 20)])), 1);
    }

    #[test]
    fn even_split_needs_half() {
        let even = counts(&[("a", 10), ("b", 10), ("c", 10), ("d", 10)]);
        assert_eq!(concentration_factor(&even), 2);
        assert_eq!(concentration_factor(&[]), 0);
    }

    #[test]
    fn shares_fold_tail_and_honor_exclusions() {
        let mut values: Vec<(String, i64)> = (0..12).map(|i| (format!("e{i:02}"), 12 - i)).collect();
        values.push(("INDEPENDENT".into(), 100));
        let rows: Vec<NamedCount> = values
            .into_iter()
            .map(|(name, count)| NamedCount { name, count })
            .collect();

        let shares = top_shares(&rows, &["independent".to_string()]);
        assert_eq!(shares.len(), TOP_SHARES + 1);
        assert_eq!(shares[0].name, "e00");
        let others = shares.last().unwrap();
        assert_eq!(others.name, OTHERS_BUCKET);
        assert_eq!(others.count, 3 + 2 + 1);
        let total: f64 = shares.iter().map(|s| s.percent).sum();
        assert!((total - 100.0).abs() < 0.1);
    }
}
