//! Stable hashing helpers for plans and profiles.

use blake3::Hasher;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    pub fn to_hex(&self) -> String {
        let mut s = String::with_capacity(64);
        for b in &self.0 {
            use std::fmt::Write as _;
            let _ = write!(&mut s, "{:02x}", b);
        }
        s
    }
}

impl std::fmt::Display for Hash256 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

pub fn hash_bytes(bytes: &[u8]) -> Hash256 {
    let mut h = Hasher::new();
    h.update(bytes);
    Hash256(h.finalize().into())
}

/// Hash any serde-serializable value deterministically (via JSON).
///
/// Plan trees serialize with sorted object keys (values are `BTreeMap`
/// backed), so equal plans hash equal.
pub fn hash_serde<T: Serialize>(v: &T) -> Result<Hash256, crate::error::Error> {
    let bytes = serde_json::to_vec(v)?;
    Ok(hash_bytes(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{PlanNode, PlanOp};

    #[test]
    fn equal_plans_hash_equal() {
        let a = PlanNode::new(PlanOp::DummyScan);
        let b = PlanNode::new(PlanOp::DummyScan);
        assert_eq!(hash_serde(&a).unwrap(), hash_serde(&b).unwrap());
        assert_eq!(hash_serde(&a).unwrap().to_hex().len(), 64);

        let c = PlanNode::new(PlanOp::DummyScan).with_estimates(1.0, 1.0);
        assert_ne!(hash_serde(&a).unwrap(), hash_serde(&c).unwrap());
    }
}
