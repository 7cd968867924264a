//! Segment naming.
//!
//! ```text
//! ordinary:  <base36-millis>-<uuid>
//! before:    .before.<base36-millis>-<uuid>
//! cube:      .cube.<uuid>
//! ```

use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use uuid::Uuid;

pub const CUBE_PREFIX: &str = ".cube.";
pub const BEFORE_PREFIX: &str = ".before.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentKind {
    /// A flushed batch whose adds replace prior documents.
    Ordinary,
    /// A flushed batch whose adds never replace prior documents.
    Before,
    /// Output of a merge.
    Cube,
}

/// A parsed segment directory name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SegmentName {
    pub name: String,
    pub kind: SegmentKind,
    /// Creation stamp in epoch millis. None for cubes.
    pub stamp: Option<u64>,
}

impl SegmentName {
    /// Parse a directory name. Returns None for names outside the grammar.
    pub fn parse(name: &str) -> Option<Self> {
        if let Some(rest) = name.strip_prefix(CUBE_PREFIX) {
            return (!rest.is_empty()).then(|| Self {
                name: name.to_string(),
                kind: SegmentKind::Cube,
                stamp: None,
            });
        }
        let (kind, rest) = match name.strip_prefix(BEFORE_PREFIX) {
            Some(rest) => (SegmentKind::Before, rest),
            None => (SegmentKind::Ordinary, name),
        };
        let (stamp, uuid) = rest.split_once('-')?;
        if uuid.is_empty() {
            return None;
        }
        Some(Self {
            name: name.to_string(),
            kind,
            stamp: Some(from_base36(stamp)?),
        })
    }

    pub fn is_cube(&self) -> bool {
        self.kind == SegmentKind::Cube
    }

    /// Creation order: cubes first, then stamped segments oldest first.
    pub fn creation_cmp(&self, other: &Self) -> CmpOrdering {
        self.stamp
            .unwrap_or(0)
            .cmp(&other.stamp.unwrap_or(0))
            .then_with(|| other.is_cube().cmp(&self.is_cube()))
            .then_with(|| self.name.cmp(&other.name))
    }
}

// ── Id Generation ──────────────────────────────────────────────────

/// Generates segment names with strictly increasing stamps within a process.
#[derive(Debug, Default)]
pub struct SegmentIdGenerator {
    last_stamp: AtomicU64,
}

impl SegmentIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Name for a new write. `overwrite = false` yields a `.before.` name.
    pub fn next(&self, overwrite: bool) -> String {
        let stamp = self.next_stamp();
        let prefix = if overwrite { "" } else { BEFORE_PREFIX };
        format!("{}{}-{}", prefix, to_base36(stamp), Uuid::new_v4())
    }

    /// Name for a new cube.
    pub fn next_cube(&self) -> String {
        format!("{}{}", CUBE_PREFIX, Uuid::new_v4())
    }

    fn next_stamp(&self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        let mut last = self.last_stamp.load(Ordering::SeqCst);
        loop {
            let next = now.max(last + 1);
            match self
                .last_stamp
                .compare_exchange(last, next, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return next,
                Err(actual) => last = actual,
            }
        }
    }
}

// ── Base36 ─────────────────────────────────────────────────────────

const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

pub fn to_base36(mut n: u64) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

pub fn from_base36(s: &str) -> Option<u64> {
    if s.is_empty() {
        return None;
    }
    u64::from_str_radix(s, 36).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base36_roundtrip() {
        for n in [0u64, 1, 35, 36, 1_707_826_800_000] {
            assert_eq!(from_base36(&to_base36(n)), Some(n));
        }
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
    }

    #[test]
    fn test_parse_kinds() {
        let gen = SegmentIdGenerator::new();
        let ordinary = SegmentName::parse(&gen.next(true)).unwrap();
        assert_eq!(ordinary.kind, SegmentKind::Ordinary);

        let before = SegmentName::parse(&gen.next(false)).unwrap();
        assert_eq!(before.kind, SegmentKind::Before);
        assert!(before.name.starts_with(BEFORE_PREFIX));

        let cube = SegmentName::parse(&gen.next_cube()).unwrap();
        assert!(cube.is_cube());
        assert_eq!(cube.stamp, None);
    }

    #[test]
    fn test_parse_rejects_foreign_names() {
        assert!(SegmentName::parse("tmp").is_none());
        assert!(SegmentName::parse(".cube.").is_none());
        assert!(SegmentName::parse("!!-abc").is_none());
    }

    #[test]
    fn test_stamps_strictly_increase() {
        let gen = SegmentIdGenerator::new();
        let names: Vec<SegmentName> = (0..50)
            .map(|_| SegmentName::parse(&gen.next(true)).unwrap())
            .collect();
        for pair in names.windows(2) {
            assert!(pair[0].stamp < pair[1].stamp);
        }
    }

    #[test]
    fn test_creation_order_puts_cube_first() {
        let gen = SegmentIdGenerator::new();
        let a = SegmentName::parse(&gen.next(true)).unwrap();
        let b = SegmentName::parse(&gen.next(false)).unwrap();
        let cube = SegmentName::parse(&gen.next_cube()).unwrap();

        let mut all = vec![b.clone(), cube.clone(), a.clone()];
        all.sort_by(|x, y| x.creation_cmp(y));
        assert_eq!(all, vec![cube, a, b]);
    }
}
