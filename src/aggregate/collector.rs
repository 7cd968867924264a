//! Link-free grouping collector.
//!
//! Scans one field of one table and numbers its distinct values in
//! first-seen order (document order). XLink resolution runs it on each
//! x-shard and remaps the local numbers into a shared `CodeTable`.

use std::collections::HashMap;

use crate::error::Result;
use crate::query::DocSet;
use crate::searcher::TableSearcher;

/// Groups of one scan: local group names and, per document, its local
/// group numbers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalGroups {
    pub names: Vec<String>,
    pub docs: HashMap<u32, Vec<u32>>,
}

pub struct GroupCollector<'f> {
    field: &'f str,
}

impl<'f> GroupCollector<'f> {
    pub fn new(field: &'f str) -> Self {
        Self { field }
    }

    pub fn collect(&self, table: &TableSearcher<'_>, docs: &DocSet) -> Result<LocalGroups> {
        let column = table.column(self.field)?;
        let mut numbers: HashMap<String, u32> = HashMap::new();
        let mut groups = LocalGroups::default();

        for doc in docs.iter() {
            let Some(value) = column.get(doc) else {
                continue;
            };
            let mut doc_groups: Vec<u32> = Vec::new();
            for scalar in value.scalars() {
                let name = scalar.to_string();
                let number = match numbers.get(&name) {
                    Some(&n) => n,
                    None => {
                        let n = groups.names.len() as u32;
                        numbers.insert(name.clone(), n);
                        groups.names.push(name);
                        n
                    }
                };
                if !doc_groups.contains(&number) {
                    doc_groups.push(number);
                }
            }
            if !doc_groups.is_empty() {
                groups.docs.insert(doc, doc_groups);
            }
        }
        Ok(groups)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::FieldCache;
    use crate::searcher::CubeSearcher;
    use crate::storage::columnar::{write_cube, CubeContent};
    use crate::storage::SegmentStore;
    use crate::types::{Document, SegmentBatch, Value};
    use std::sync::Arc;
    use tempfile::tempdir;

    #[test]
    fn test_first_seen_numbering() {
        let dir = tempdir().unwrap();
        let store = Arc::new(SegmentStore::open_fs(dir.path()));
        let mut content = CubeContent::default();
        content.apply_batch(
            &SegmentBatch::new().add(
                "t",
                vec![
                    Document::new("a").with("color", "red"),
                    Document::new("b").with("color", Value::List(vec!["blue".into(), "red".into()])),
                    Document::new("c"),
                    Document::new("d").with("color", "blue"),
                ],
            ),
            true,
        );
        let path = store.begin_segment("app", "s", ".cube.x").unwrap();
        write_cube(store.directory(), &path, &content).unwrap();
        let cube =
            CubeSearcher::open(store, Arc::new(FieldCache::new(1 << 20)), "app", "s", ".cube.x").unwrap();
        let table = cube.table("t");

        let groups = GroupCollector::new("color")
            .collect(&table, &DocSet::full(4))
            .unwrap();
        assert_eq!(groups.names, vec!["red", "blue"]);
        assert_eq!(groups.docs[&0], vec![0]);
        assert_eq!(groups.docs[&1], vec![1, 0]);
        assert!(!groups.docs.contains_key(&2));
        assert_eq!(groups.docs[&3], vec![1]);
    }
}
