use std::fmt;

/// Canonical identity token for a principal (admin, teacher, or student).
///
/// The canonical form is `0x` followed by 40 lowercase hex digits. All
/// lookups and stored values use this form, so two addresses differing only
/// in case compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address(String);

#[derive(Debug, Clone, PartialEq)]
pub struct AddressParseError {
    raw: String,
}

impl fmt::Display for AddressParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid address {:?}: expected 0x followed by 40 hex digits",
            self.raw
        )
    }
}

impl std::error::Error for AddressParseError {}

impl Address {
    pub fn parse(raw: &str) -> Result<Address, AddressParseError> {
        let t = raw.trim();
        let bad = || AddressParseError { raw: raw.to_string() };
        let hex = t.strip_prefix("0x").or_else(|| t.strip_prefix("0X"));
        let Some(hex) = hex else {
            return Err(bad());
        };
        if hex.len() != 40 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(bad());
        }
        Ok(Address(format!("0x{}", hex.to_ascii_lowercase())))
    }

    /// Wraps a value read back from storage. Stored addresses are already
    /// canonical; this avoids re-validating on every row.
    pub fn from_canonical(s: String) -> Address {
        Address(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// De-duplicates a roster while preserving first-occurrence order.
pub fn dedup_preserving_order(addresses: Vec<Address>) -> Vec<Address> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::with_capacity(addresses.len());
    for a in addresses {
        if seen.insert(a.clone()) {
            out.push(a);
        }
    }
    out
}
