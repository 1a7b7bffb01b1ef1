//! Evolution Ledger
//!
//! Per-feature record of which upstream identifiers each output identifier
//! came from. An output with no sources was created by the feature.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::id::{FeatureId, Identifier};

/// An upstream identifier, qualified by the feature that owns it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Source {
    pub feature: FeatureId,
    pub id: Identifier,
}

impl Source {
    pub fn new(feature: FeatureId, id: Identifier) -> Self {
        Self { feature, id }
    }
}

/// Output identifier -> upstream sources
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvolutionLedger {
    entries: BTreeMap<Identifier, Vec<Source>>,
}

impl EvolutionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `out` evolved from `source`
    pub fn record(&mut self, out: Identifier, source: Source) {
        let sources = self.entries.entry(out).or_default();
        if !sources.contains(&source) {
            sources.push(source);
        }
    }

    /// Record that `out` was created here from nothing upstream
    pub fn record_creation(&mut self, out: Identifier) {
        self.entries.entry(out).or_default();
    }

    pub fn contains(&self, out: Identifier) -> bool {
        self.entries.contains_key(&out)
    }

    pub fn sources_of(&self, out: Identifier) -> &[Source] {
        self.entries.get(&out).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Outputs that evolved from `source`
    pub fn outputs_from(&self, source: Source) -> Vec<Identifier> {
        self.entries
            .iter()
            .filter(|(_, sources)| sources.contains(&source))
            .map(|(out, _)| *out)
            .collect()
    }

    /// (output, sources) pairs sorted by output
    pub fn iter(&self) -> impl Iterator<Item = (Identifier, &[Source])> {
        self.entries.iter().map(|(out, s)| (*out, s.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_record_and_query() {
        let upstream = Uuid::new_v4();
        let a = Identifier::new_random();
        let b = Identifier::new_random();
        let out1 = Identifier::new_random();
        let out2 = Identifier::new_random();
        let created = Identifier::new_random();

        let mut ledger = EvolutionLedger::new();
        ledger.record(out1, Source::new(upstream, a));
        ledger.record(out1, Source::new(upstream, a));
        ledger.record(out2, Source::new(upstream, a));
        ledger.record(out2, Source::new(upstream, b));
        ledger.record_creation(created);

        assert_eq!(ledger.len(), 3);
        assert_eq!(ledger.sources_of(out1), &[Source::new(upstream, a)]);
        assert_eq!(ledger.sources_of(out2).len(), 2);
        assert!(ledger.contains(created));
        assert!(ledger.sources_of(created).is_empty());

        let mut from_a = ledger.outputs_from(Source::new(upstream, a));
        from_a.sort();
        let mut expected = vec![out1, out2];
        expected.sort();
        assert_eq!(from_a, expected);

        ledger.clear();
        assert!(ledger.is_empty());
    }
}
