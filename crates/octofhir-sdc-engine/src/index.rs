//! Item index: linkId lookup and structural position maps
//!
//! Built once per questionnaire load in a single traversal. Positions are
//! the declared order in the questionnaire definition; the response
//! synchroniser uses them to keep response children ordered while
//! conditionally hidden items come and go.

use indexmap::IndexMap;
use log::warn;

use octofhir_sdc_diagnostics::{Issue, IssueSource};
use octofhir_sdc_model::{ItemType, Questionnaire, QuestionnaireItem};

/// Flattened metadata for one questionnaire item
#[derive(Debug, Clone)]
pub struct ItemEntry {
    pub link_id: String,
    pub item_type: ItemType,
    pub text: Option<String>,
    pub required: bool,
    pub repeats: bool,
    pub read_only: bool,
    pub max_length: Option<i32>,
    /// linkId of the parent item, `None` for top-level items
    pub parent: Option<String>,
    /// Position among the parent's children in the definition
    pub position: usize,
    /// Child linkIds in declared order
    pub children: Vec<String>,
}

/// linkId → item lookup over the flattened questionnaire tree
#[derive(Debug, Clone, Default)]
pub struct ItemIndex {
    entries: IndexMap<String, ItemEntry>,
    /// Top-level linkIds in declared order
    roots: Vec<String>,
}

impl ItemIndex {
    /// Flatten the questionnaire's item tree.
    ///
    /// Duplicate linkIds keep the first definition and produce a warning
    /// issue; the questionnaire still loads.
    pub fn build(questionnaire: &Questionnaire, issues: &mut Vec<Issue>) -> Self {
        let mut index = Self::default();
        for (position, item) in questionnaire.item.iter().enumerate() {
            index.roots.push(item.link_id.clone());
            index.insert(item, None, position, issues);
        }
        index
    }

    fn insert(
        &mut self,
        item: &QuestionnaireItem,
        parent: Option<&str>,
        position: usize,
        issues: &mut Vec<Issue>,
    ) {
        if self.entries.contains_key(&item.link_id) {
            warn!("duplicate linkId {} in questionnaire", item.link_id);
            issues.push(
                Issue::warning(
                    IssueSource::Extraction,
                    format!("Duplicate linkId '{}', keeping the first definition", item.link_id),
                )
                .with_link_id(&item.link_id),
            );
            return;
        }

        self.entries.insert(
            item.link_id.clone(),
            ItemEntry {
                link_id: item.link_id.clone(),
                item_type: item.item_type,
                text: item.text.clone(),
                required: item.is_required(),
                repeats: item.is_repeating(),
                read_only: item.read_only.unwrap_or(false),
                max_length: item.max_length,
                parent: parent.map(str::to_string),
                position,
                children: item.item.iter().map(|c| c.link_id.clone()).collect(),
            },
        );

        for (child_position, child) in item.item.iter().enumerate() {
            self.insert(child, Some(&item.link_id), child_position, issues);
        }
    }

    /// Look up an item by linkId
    pub fn get(&self, link_id: &str) -> Option<&ItemEntry> {
        self.entries.get(link_id)
    }

    /// Whether a linkId exists in the questionnaire
    pub fn contains(&self, link_id: &str) -> bool {
        self.entries.contains_key(link_id)
    }

    /// Top-level linkIds in declared order
    pub fn roots(&self) -> &[String] {
        &self.roots
    }

    /// All linkIds in definition order
    pub fn link_ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// The declared position of every child of `parent` (`None` for the
    /// top level), keyed by linkId — the index map the synchroniser merges
    /// against
    pub fn child_positions(&self, parent: Option<&str>) -> IndexMap<String, usize> {
        let children: &[String] = match parent {
            Some(link_id) => match self.entries.get(link_id) {
                Some(entry) => &entry.children,
                None => return IndexMap::new(),
            },
            None => &self.roots,
        };
        children
            .iter()
            .enumerate()
            .map(|(position, link_id)| (link_id.clone(), position))
            .collect()
    }

    /// Ancestor chain of a linkId, nearest first
    pub fn ancestors<'a>(&'a self, link_id: &str) -> Vec<&'a str> {
        let mut out = Vec::new();
        let mut current = self.entries.get(link_id).and_then(|e| e.parent.as_deref());
        while let Some(parent) = current {
            out.push(parent);
            current = self.entries.get(parent).and_then(|e| e.parent.as_deref());
        }
        out
    }

    /// The path from a top-level item down to `link_id`, inclusive
    pub fn path_to(&self, link_id: &str) -> Option<Vec<String>> {
        if !self.contains(link_id) {
            return None;
        }
        let mut path: Vec<String> = self
            .ancestors(link_id)
            .into_iter()
            .map(str::to_string)
            .collect();
        path.reverse();
        path.push(link_id.to_string());
        Some(path)
    }

    /// Every descendant linkId of `link_id`, depth first
    pub fn descendants<'a>(&'a self, link_id: &str) -> Vec<&'a str> {
        let mut out = Vec::new();
        let mut stack: Vec<&str> = match self.entries.get(link_id) {
            Some(entry) => entry.children.iter().map(String::as_str).rev().collect(),
            None => return out,
        };
        while let Some(current) = stack.pop() {
            out.push(current);
            if let Some(entry) = self.entries.get(current) {
                stack.extend(entry.children.iter().map(String::as_str).rev());
            }
        }
        out
    }

    /// The top-level ancestor containing `link_id` (itself, if top-level)
    pub fn root_of<'a>(&'a self, link_id: &str) -> Option<&'a str> {
        let entry = self.entries.get(link_id)?;
        match &entry.parent {
            None => Some(&entry.link_id),
            Some(parent) => self.root_of(parent),
        }
    }
}
