// tally-core/src/domain/scan/metric.rs

// Static metric registry: known metric types, metric groups and the
// closure algorithm that expands a declared metric set into a consistent one.

use std::collections::BTreeSet;

pub const ROW_COUNT: &str = "row_count";

pub const MISSING_COUNT: &str = "missing_count";
pub const MISSING_PERCENTAGE: &str = "missing_percentage";
pub const VALUES_COUNT: &str = "values_count";
pub const VALUES_PERCENTAGE: &str = "values_percentage";

pub const VALID_COUNT: &str = "valid_count";
pub const VALID_PERCENTAGE: &str = "valid_percentage";
pub const INVALID_COUNT: &str = "invalid_count";
pub const INVALID_PERCENTAGE: &str = "invalid_percentage";

pub const DISTINCT: &str = "distinct";
pub const UNIQUE_COUNT: &str = "unique_count";
pub const UNIQUENESS: &str = "uniqueness";
pub const DUPLICATE_COUNT: &str = "duplicate_count";

pub const MIN_LENGTH: &str = "min_length";
pub const MAX_LENGTH: &str = "max_length";
pub const AVG_LENGTH: &str = "avg_length";

pub const MINS: &str = "mins";
pub const MAXS: &str = "maxs";
pub const FREQUENT_VALUES: &str = "frequent_values";
pub const HISTOGRAM: &str = "histogram";

pub const MIN: &str = "min";
pub const MAX: &str = "max";
pub const AVG: &str = "avg";
pub const SUM: &str = "sum";
pub const VARIANCE: &str = "variance";
pub const STDDEV: &str = "stddev";

pub const GROUP_ALL: &str = "all";
pub const GROUP_MISSING: &str = "missing";
pub const GROUP_VALIDITY: &str = "validity";
pub const GROUP_DUPLICATES: &str = "duplicates";
pub const GROUP_LENGTH: &str = "length";
pub const GROUP_PROFILING: &str = "profiling";
pub const GROUP_STATISTICS: &str = "statistics";

pub const MISSING_METRICS: &[&str] = &[
    MISSING_COUNT,
    MISSING_PERCENTAGE,
    VALUES_COUNT,
    VALUES_PERCENTAGE,
];

pub const VALIDITY_METRICS: &[&str] = &[
    VALID_COUNT,
    VALID_PERCENTAGE,
    INVALID_COUNT,
    INVALID_PERCENTAGE,
];

pub const DUPLICATES_METRICS: &[&str] = &[DISTINCT, UNIQUE_COUNT, UNIQUENESS, DUPLICATE_COUNT];

pub const LENGTH_METRICS: &[&str] = &[MIN_LENGTH, MAX_LENGTH, AVG_LENGTH];

pub const PROFILING_METRICS: &[&str] = &[MINS, MAXS, FREQUENT_VALUES, HISTOGRAM];

pub const STATISTICS_METRICS: &[&str] = &[MIN, MAX, AVG, SUM, VARIANCE, STDDEV];

/// Named metric bundles, in a fixed order so expansion is deterministic.
pub const METRIC_GROUPS: &[(&str, &[&str])] = &[
    (GROUP_MISSING, MISSING_METRICS),
    (GROUP_VALIDITY, VALIDITY_METRICS),
    (GROUP_DUPLICATES, DUPLICATES_METRICS),
    (GROUP_LENGTH, LENGTH_METRICS),
    (GROUP_PROFILING, PROFILING_METRICS),
    (GROUP_STATISTICS, STATISTICS_METRICS),
];

/// Every metric type the resolver accepts.
pub fn metric_types() -> impl Iterator<Item = &'static str> {
    std::iter::once(ROW_COUNT).chain(
        METRIC_GROUPS
            .iter()
            .flat_map(|(_, members)| members.iter().copied()),
    )
}

pub fn is_metric_type(name: &str) -> bool {
    metric_types().any(|m| m == name)
}

pub fn group_members(group: &str) -> Option<&'static [&'static str]> {
    METRIC_GROUPS
        .iter()
        .find(|(name, _)| *name == group)
        .map(|(_, members)| *members)
}

/// True when the metric set contains any member of `category`.
pub fn is_category_enabled(metrics: &BTreeSet<String>, category: &[&str]) -> bool {
    category.iter().any(|m| metrics.contains(*m))
}

/// Validity fields are computed iff any validity metric is enabled.
pub fn is_validity_enabled(metrics: &BTreeSet<String>) -> bool {
    is_category_enabled(metrics, VALIDITY_METRICS)
}

/// Validity always needs the missing classification to define "valid".
pub fn is_missing_enabled(metrics: &BTreeSet<String>) -> bool {
    is_validity_enabled(metrics) || is_category_enabled(metrics, MISSING_METRICS)
}

/// Enabled metrics that need a grouped query (duplicates, profiling); the
/// single-pass aggregation does not compute them.
pub fn grouped_metrics(metrics: &BTreeSet<String>) -> Vec<&'static str> {
    DUPLICATES_METRICS
        .iter()
        .chain(PROFILING_METRICS)
        .copied()
        .filter(|m| metrics.contains(*m))
        .collect()
}

/// Outcome of [`metric_closure`]: the expanded set plus anything it could not place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricClosure {
    pub metrics: BTreeSet<String>,
    pub unknown_groups: Vec<String>,
    pub unknown_metrics: Vec<String>,
}

/// Expands declared metrics and groups into the full set of metrics to compute.
///
/// `all` short-circuits to the whole registry. Otherwise groups are inferred back
/// from their members, `validity` pulls in `missing`, `missing` pulls in
/// `row_count`, every active group contributes its members and `histogram`
/// pulls in its `min`/`max` bounds. Unknown names are reported, never dropped
/// silently; unknown metrics stay out of the returned set.
pub fn metric_closure<'a, M, G>(metrics: M, groups: G) -> MetricClosure
where
    M: IntoIterator<Item = &'a str>,
    G: IntoIterator<Item = &'a str>,
{
    let mut set: BTreeSet<String> = metrics.into_iter().map(str::to_string).collect();
    let mut active: BTreeSet<String> = groups.into_iter().map(str::to_string).collect();
    let mut unknown_groups = Vec::new();

    if active.contains(GROUP_ALL) {
        set.extend(metric_types().map(str::to_string));
    } else {
        // histogram bounds can activate another group, so expand to a fixed point
        loop {
            let before = set.len();

            for (group, members) in METRIC_GROUPS {
                if members.iter().any(|m| set.contains(*m)) {
                    active.insert((*group).to_string());
                }
            }

            if active.contains(GROUP_VALIDITY) {
                active.insert(GROUP_MISSING.to_string());
            }

            if active.contains(GROUP_MISSING) {
                set.insert(ROW_COUNT.to_string());
            }

            for group in &active {
                match group_members(group) {
                    Some(members) => set.extend(members.iter().map(|m| (*m).to_string())),
                    None if !unknown_groups.contains(group) => unknown_groups.push(group.clone()),
                    None => {}
                }
            }

            if set.contains(HISTOGRAM) {
                set.insert(MIN.to_string());
                set.insert(MAX.to_string());
            }

            if set.len() == before {
                break;
            }
        }
    }

    let unknown_metrics: Vec<String> = set
        .iter()
        .filter(|m| !is_metric_type(m))
        .cloned()
        .collect();
    for unknown in &unknown_metrics {
        set.remove(unknown);
    }

    MetricClosure {
        metrics: set,
        unknown_groups,
        unknown_metrics,
    }
}
