use std::collections::BTreeSet;
use crate::core::types::{CopyStatus, MotherId};
use crate::index::builder::IndexSet;

/// Index-only lookup combining a search term with category and status
/// filters.
///
/// The term matches a name-index key (first title character) or an
/// author exactly. Each filter narrows the candidate set; an absent term
/// starts from every indexed mother.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexQuery {
    pub term: Option<String>,
    pub category: Option<String>,
    pub status: Option<CopyStatus>,
}

impl IndexQuery {
    pub fn new() -> Self {
        IndexQuery::default()
    }

    pub fn term(mut self, term: impl Into<String>) -> Self {
        let term = term.into();
        let term = term.trim();
        self.term = (!term.is_empty()).then(|| term.to_string());
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn status(mut self, status: CopyStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Matching mother IDs in natural order.
    pub fn execute(&self, indexes: &IndexSet) -> Vec<MotherId> {
        let mut candidates: BTreeSet<MotherId> = match &self.term {
            Some(term) => indexes
                .name
                .get(term)
                .iter()
                .chain(indexes.author.get(term))
                .cloned()
                .collect(),
            None => indexes.all_mother_ids().into_iter().collect(),
        };

        if let Some(category) = &self.category {
            let in_category: BTreeSet<&MotherId> = indexes.category.get(category).iter().collect();
            candidates.retain(|id| in_category.contains(id));
        }

        if let Some(status) = &self.status {
            let with_status: BTreeSet<&MotherId> = indexes
                .status
                .get(status.as_str())
                .iter()
                .map(|copy| copy.mother_id())
                .collect();
            candidates.retain(|id| with_status.contains(id));
        }

        candidates.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::CopyId;

    fn mid(s: &str) -> MotherId {
        s.parse().unwrap()
    }

    fn cid(s: &str) -> CopyId {
        s.parse().unwrap()
    }

    fn indexes() -> IndexSet {
        let mut set = IndexSet::default();
        set.name.add("三", mid("1-1-001"));
        set.name.add("百", mid("1-1-002"));
        set.name.add("三", mid("1-1-003"));
        set.author.add("罗贯中", mid("1-1-001"));
        set.author.add("三", mid("1-1-002"));
        set.category.add("小说", mid("1-1-001"));
        set.category.add("历史", mid("1-1-002"));
        set.category.add("小说", mid("1-1-003"));
        set.status.add("正常", cid("1-1-001-1"));
        set.status.add("借出", cid("1-1-003-1"));
        set.status.add("借出", cid("1-1-003-2"));
        set
    }

    #[test]
    fn term_matches_title_prefix_or_author() {
        let ids = IndexQuery::new().term("三").execute(&indexes());
        assert_eq!(ids, vec![mid("1-1-001"), mid("1-1-002"), mid("1-1-003")]);
    }

    #[test]
    fn filters_intersect() {
        let ids = IndexQuery::new()
            .term("三")
            .category("小说")
            .status(CopyStatus::Loaned)
            .execute(&indexes());
        assert_eq!(ids, vec![mid("1-1-003")]);
    }

    #[test]
    fn no_term_starts_from_everything() {
        let ids = IndexQuery::new().category("历史").execute(&indexes());
        assert_eq!(ids, vec![mid("1-1-002")]);
        assert_eq!(IndexQuery::new().execute(&indexes()).len(), 3);
    }

    #[test]
    fn unknown_term_finds_nothing() {
        assert!(IndexQuery::new().term("无").execute(&indexes()).is_empty());
    }
}
