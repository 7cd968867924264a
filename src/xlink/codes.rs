//! Global group codes.
//!
//! One table is shared across every x-shard scanned for an aggregation
//! item. Codes are assigned in first-seen order and never change, so the
//! same group name maps to the same code no matter which x-shard saw it.

use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodeTable {
    codes: HashMap<String, u32>,
    names: Vec<String>,
}

impl CodeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Code of a name, assigning the next code on first sight.
    pub fn code(&mut self, name: &str) -> u32 {
        if let Some(&code) = self.codes.get(name) {
            return code;
        }
        let code = self.names.len() as u32;
        self.codes.insert(name.to_string(), code);
        self.names.push(name.to_string());
        code
    }

    /// Map local group numbers (indices into `local_names`) to global codes.
    pub fn remap(&mut self, local_names: &[String]) -> Vec<u32> {
        local_names.iter().map(|name| self.code(name)).collect()
    }

    pub fn lookup(&self, name: &str) -> Option<u32> {
        self.codes.get(name).copied()
    }

    pub fn name(&self, code: u32) -> Option<&str> {
        self.names.get(code as usize).map(String::as_str)
    }

    /// Names in code order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_seen_codes() {
        let mut table = CodeTable::new();
        assert_eq!(table.remap(&["foo".to_string()]), vec![0]);
        assert_eq!(table.remap(&["bar".to_string(), "foo".to_string()]), vec![1, 0]);
        assert_eq!(table.name(1), Some("bar"));
        assert_eq!(table.lookup("baz"), None);
        assert_eq!(table.names(), &["foo".to_string(), "bar".to_string()]);
    }
}
