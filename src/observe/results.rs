use crate::core::{IndexPath, ObjectId, Value};
use crate::entity::Record;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Name and size of one section, as shown to callers.
#[derive(Debug, Clone, PartialEq)]
pub struct SectionInfo {
    /// Grouping value; `None` when results are not sectioned.
    pub name: Option<Value>,
    pub number_of_objects: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Section {
    pub(crate) key: Option<Value>,
    pub(crate) records: Vec<Arc<Record>>,
}

/// Ordered, sectioned view of a fetch result.
#[derive(Debug, Clone, Default)]
pub struct ResultsSnapshot {
    sections: Vec<Section>,
    positions: HashMap<ObjectId, IndexPath>,
}

impl ResultsSnapshot {
    /// Groups already-ordered records.
    ///
    /// Without a section key the result is exactly one section, possibly
    /// empty. With one, every distinct value of the key gets a section,
    /// sections follow the value order and keep record order inside.
    pub fn build(records: Vec<Arc<Record>>, section_key: Option<&str>) -> Self {
        let sections = match section_key {
            None => vec![Section { key: None, records }],
            Some(key_path) => {
                let mut groups: BTreeMap<Value, Vec<Arc<Record>>> = BTreeMap::new();
                for record in records {
                    groups.entry(record.value(key_path)).or_default().push(record);
                }
                groups
                    .into_iter()
                    .map(|(key, records)| Section {
                        key: Some(key),
                        records,
                    })
                    .collect()
            }
        };

        let mut positions = HashMap::new();
        for (section_index, section) in sections.iter().enumerate() {
            for (row, record) in section.records.iter().enumerate() {
                positions.insert(record.id(), IndexPath::new(section_index, row));
            }
        }

        Self {
            sections,
            positions,
        }
    }

    pub fn number_of_sections(&self) -> usize {
        self.sections.len()
    }

    pub fn number_of_objects(&self, section: usize) -> usize {
        self.sections
            .get(section)
            .map(|section| section.records.len())
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn sections(&self) -> Vec<SectionInfo> {
        self.sections
            .iter()
            .map(|section| SectionInfo {
                name: section.key.clone(),
                number_of_objects: section.records.len(),
            })
            .collect()
    }

    pub fn object_at(&self, path: IndexPath) -> Option<&Arc<Record>> {
        self.sections.get(path.section)?.records.get(path.row)
    }

    pub fn index_path_of(&self, id: ObjectId) -> Option<IndexPath> {
        self.positions.get(&id).copied()
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.positions.contains_key(&id)
    }

    /// Every record, section by section.
    pub fn records(&self) -> impl Iterator<Item = &Arc<Record>> {
        self.sections.iter().flat_map(|section| section.records.iter())
    }

    pub(crate) fn section_key(&self, section: usize) -> Option<&Option<Value>> {
        self.sections.get(section).map(|section| &section.key)
    }

    pub(crate) fn section_index(&self, key: &Option<Value>) -> Option<usize> {
        self.sections.iter().position(|section| &section.key == key)
    }

    pub(crate) fn section_keys(&self) -> impl Iterator<Item = &Option<Value>> {
        self.sections.iter().map(|section| &section.key)
    }
}
