use chainlog_types::{Record, RecordHash};

/// Bytes fed to the record hasher.
///
/// Layout: `sequence (u64 BE) || link flag (0/1) || predecessor hash (32
/// bytes, only when the flag is 1) || payload`. The sequence and the
/// predecessor hash make the material unique per chain position, so the
/// same payload appended twice never yields the same digest.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HashMaterial(Vec<u8>);

impl HashMaterial {
    pub fn new(sequence: u64, backward_link: Option<&RecordHash>, payload: &str) -> Self {
        let mut bytes = Vec::with_capacity(8 + 1 + 32 + payload.len());
        bytes.extend_from_slice(&sequence.to_be_bytes());
        match backward_link {
            Some(prev) => {
                bytes.push(1);
                bytes.extend_from_slice(prev.as_bytes());
            }
            None => bytes.push(0),
        }
        bytes.extend_from_slice(payload.as_bytes());
        Self(bytes)
    }

    /// Material for an existing record, rebuilt from its stored fields.
    pub fn of_record(record: &Record) -> Self {
        Self::new(
            record.sequence,
            record.backward_link.as_ref(),
            &record.payload,
        )
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Domain-separated BLAKE3 hasher for chain records.
///
/// The domain tag is prepended to every computation, so a record digest can
/// never collide with a digest produced for another purpose.
#[derive(Clone, Copy, Debug)]
pub struct RecordHasher {
    domain: &'static str,
}

impl RecordHasher {
    /// Hasher for chain records.
    pub const RECORD: Self = Self {
        domain: "chainlog-record-v1",
    };

    /// Create a hasher with a custom domain tag.
    pub const fn new(domain: &'static str) -> Self {
        Self { domain }
    }

    /// Hash raw material. Pure and deterministic.
    pub fn compute(&self, material: &[u8]) -> RecordHash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        hasher.update(material);
        RecordHash::from_bytes(*hasher.finalize().as_bytes())
    }

    /// Digest of a record at `sequence` following `backward_link`.
    pub fn record_hash(
        &self,
        sequence: u64,
        backward_link: Option<&RecordHash>,
        payload: &str,
    ) -> RecordHash {
        self.compute(HashMaterial::new(sequence, backward_link, payload).as_bytes())
    }

    /// Recompute a stored record's digest and compare it with `self_hash`.
    pub fn verify(&self, record: &Record) -> bool {
        self.compute(HashMaterial::of_record(record).as_bytes()) == record.self_hash
    }

    /// The domain tag used by this hasher.
    pub fn domain(&self) -> &str {
        self.domain
    }
}

impl Default for RecordHasher {
    fn default() -> Self {
        Self::RECORD
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic() {
        let a = RecordHasher::RECORD.record_hash(1, None, "Block 0");
        let b = RecordHasher::RECORD.record_hash(1, None, "Block 0");
        assert_eq!(a, b);
        assert_eq!(a.to_hex().len(), RecordHash::HEX_LEN);
    }

    #[test]
    fn same_payload_at_different_positions_differs() {
        let genesis = RecordHasher::RECORD.record_hash(1, None, "Block 0");
        let first = RecordHasher::RECORD.record_hash(2, Some(&genesis), "hello");
        let second = RecordHasher::RECORD.record_hash(3, Some(&first), "hello");
        assert_ne!(first, second);
    }

    #[test]
    fn predecessor_is_part_of_material() {
        let a = RecordHasher::RECORD.record_hash(2, Some(&RecordHash::from_bytes([1; 32])), "m");
        let b = RecordHasher::RECORD.record_hash(2, Some(&RecordHash::from_bytes([2; 32])), "m");
        assert_ne!(a, b);
    }

    #[test]
    fn missing_link_differs_from_present_link() {
        let none = HashMaterial::new(5, None, "m");
        let some = HashMaterial::new(5, Some(&RecordHash::from_bytes([0; 32])), "m");
        assert_ne!(none, some);
    }

    #[test]
    fn verify_detects_tampered_payload() {
        let self_hash = RecordHasher::RECORD.record_hash(1, None, "Block 0");
        let mut record = Record {
            sequence: 1,
            payload: "Block 0".into(),
            self_hash,
            backward_link: None,
            forward_link: None,
        };
        assert!(RecordHasher::RECORD.verify(&record));

        record.payload = "Block 1".into();
        assert!(!RecordHasher::RECORD.verify(&record));
    }

    #[test]
    fn forward_link_is_not_hashed() {
        let self_hash = RecordHasher::RECORD.record_hash(1, None, "Block 0");
        let record = Record {
            sequence: 1,
            payload: "Block 0".into(),
            self_hash,
            backward_link: None,
            forward_link: Some(RecordHash::from_bytes([3; 32])),
        };
        assert!(RecordHasher::RECORD.verify(&record));
    }

    #[test]
    fn custom_domain_separates() {
        let custom = RecordHasher::new("other-v1");
        assert_eq!(custom.domain(), "other-v1");
        assert_ne!(
            custom.compute(b"data"),
            RecordHasher::RECORD.compute(b"data")
        );
    }
}
