//! Manager metric catalog and trigger/performance classification

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::MetricSeries;

/// Per-partition marker carried by partition-scoped metric names.
pub const PARTITION_MARKER: &str = "P1";

/// Which panel group a manager metric belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetricClass {
    /// Partition-scoped trigger rate
    Trigger,
    /// Farm-wide performance counter
    Performance,
    /// Partition-scoped but not a trigger (e.g. activity, missed buffers)
    Unclassified,
}

impl MetricClass {
    /// Fixed classification contract for manager metric names.
    pub fn of(name: &str) -> Self {
        if !name.contains(PARTITION_MARKER) {
            return MetricClass::Performance;
        }
        let trigger_category = name.contains("Data Driven") || name.contains("Trigger");
        if trigger_category && !name.contains("Activity") && !name.contains("prescale") {
            MetricClass::Trigger
        } else {
            MetricClass::Unclassified
        }
    }
}

impl std::fmt::Display for MetricClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricClass::Trigger => write!(f, "trigger"),
            MetricClass::Performance => write!(f, "performance"),
            MetricClass::Unclassified => write!(f, "unclassified"),
        }
    }
}

/// All manager metrics from one `/mgrData` fetch, partitioned by class.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MetricCatalog {
    pub trigger: BTreeMap<String, MetricSeries>,
    pub performance: BTreeMap<String, MetricSeries>,
    pub unclassified: BTreeMap<String, MetricSeries>,
}

impl MetricCatalog {
    pub fn partition(series: impl IntoIterator<Item = MetricSeries>) -> Self {
        let mut catalog = Self::default();
        for s in series {
            let name = s.name().to_string();
            let group = match MetricClass::of(&name) {
                MetricClass::Trigger => &mut catalog.trigger,
                MetricClass::Performance => &mut catalog.performance,
                MetricClass::Unclassified => &mut catalog.unclassified,
            };
            group.insert(name, s);
        }
        catalog
    }

    /// Look a metric up regardless of its class.
    pub fn get(&self, name: &str) -> Option<&MetricSeries> {
        self.trigger
            .get(name)
            .or_else(|| self.performance.get(name))
            .or_else(|| self.unclassified.get(name))
    }

    pub fn len(&self) -> usize {
        self.trigger.len() + self.performance.len() + self.unclassified.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
