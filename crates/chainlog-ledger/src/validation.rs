use std::collections::HashSet;

use chainlog_crypto::RecordHasher;
use chainlog_types::{Record, GENESIS_SEQUENCE};
use serde::Serialize;

/// Result of full-chain validation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub record_count: u64,
    pub tail_count: u64,
    pub hash_chain_valid: bool,
    pub sequence_contiguous: bool,
    pub violations: Vec<Violation>,
}

impl ValidationReport {
    /// Returns `true` if all checks passed.
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }

    /// The first violation found, in sequence order.
    pub fn first_violation(&self) -> Option<&Violation> {
        self.violations.first()
    }
}

/// A specific integrity violation detected during validation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub sequence: u64,
    pub kind: ViolationKind,
    pub description: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    MissingGenesis,
    SequenceGap,
    BackwardLinkBreak,
    ForwardLinkBreak,
    MultipleTails,
    MissingTail,
    HashMismatch,
    DuplicateHash,
}

/// Collects every integrity violation in a chain.
///
/// Unlike [`chainlog_crypto::ChainVerifier`], which stops at the first
/// failure, this walks the whole chain and reports everything it finds.
#[derive(Clone, Copy, Debug, Default)]
pub struct ChainValidator {
    hasher: RecordHasher,
}

impl ChainValidator {
    pub fn new(hasher: RecordHasher) -> Self {
        Self { hasher }
    }

    /// Validate records ordered by sequence.
    pub fn validate(&self, records: &[Record]) -> ValidationReport {
        let mut violations = Vec::new();
        let mut hash_chain_valid = true;
        let mut sequence_contiguous = true;
        let mut seen_hashes = HashSet::with_capacity(records.len());

        match records.first() {
            None => violations.push(Violation {
                sequence: GENESIS_SEQUENCE,
                kind: ViolationKind::MissingGenesis,
                description: "chain is empty".into(),
            }),
            Some(first) if first.sequence != GENESIS_SEQUENCE || !first.is_genesis() => {
                violations.push(Violation {
                    sequence: first.sequence,
                    kind: ViolationKind::MissingGenesis,
                    description: format!(
                        "first record has seq {} and {} backward link",
                        first.sequence,
                        if first.is_genesis() { "no" } else { "a" }
                    ),
                });
            }
            Some(_) => {}
        }

        let last = records.len().saturating_sub(1);
        for (index, record) in records.iter().enumerate() {
            if index > 0 {
                let prev = &records[index - 1];
                if record.sequence != prev.sequence + 1 {
                    sequence_contiguous = false;
                    violations.push(Violation {
                        sequence: record.sequence,
                        kind: ViolationKind::SequenceGap,
                        description: format!(
                            "expected seq {}, got {}",
                            prev.sequence + 1,
                            record.sequence
                        ),
                    });
                }

                if record.backward_link != Some(prev.self_hash) {
                    hash_chain_valid = false;
                    violations.push(Violation {
                        sequence: record.sequence,
                        kind: ViolationKind::BackwardLinkBreak,
                        description: format!(
                            "backward link does not match hash of seq {}",
                            prev.sequence
                        ),
                    });
                }
            }

            // Unsealed non-final records are reported as extra tails below.
            let successor = records.get(index + 1);
            match (record.forward_link, successor) {
                (Some(link), Some(next)) if link != next.self_hash => {
                    hash_chain_valid = false;
                    violations.push(Violation {
                        sequence: record.sequence,
                        kind: ViolationKind::ForwardLinkBreak,
                        description: format!(
                            "forward link does not match hash of seq {}",
                            next.sequence
                        ),
                    });
                }
                (Some(_), None) => {
                    hash_chain_valid = false;
                    violations.push(Violation {
                        sequence: record.sequence,
                        kind: ViolationKind::ForwardLinkBreak,
                        description: "last record points to a missing successor".into(),
                    });
                }
                _ => {}
            }

            if !self.hasher.verify(record) {
                hash_chain_valid = false;
                violations.push(Violation {
                    sequence: record.sequence,
                    kind: ViolationKind::HashMismatch,
                    description: "stored hash does not match computed".into(),
                });
            }

            if !seen_hashes.insert(record.self_hash) {
                hash_chain_valid = false;
                violations.push(Violation {
                    sequence: record.sequence,
                    kind: ViolationKind::DuplicateHash,
                    description: format!("hash {} appears twice", record.self_hash.short_hex()),
                });
            }
        }

        let tails: Vec<u64> = records
            .iter()
            .filter(|r| r.is_tail())
            .map(|r| r.sequence)
            .collect();
        if !records.is_empty() {
            match tails.len() {
                0 => violations.push(Violation {
                    sequence: records[last].sequence,
                    kind: ViolationKind::MissingTail,
                    description: "no record has an empty forward link".into(),
                }),
                1 => {}
                n => violations.push(Violation {
                    sequence: tails[0],
                    kind: ViolationKind::MultipleTails,
                    description: format!("{n} tail records at sequences {tails:?}"),
                }),
            }
        }

        violations.sort_by_key(|v| v.sequence);

        ValidationReport {
            record_count: records.len() as u64,
            tail_count: tails.len() as u64,
            hash_chain_valid,
            sequence_contiguous,
            violations,
        }
    }
}
