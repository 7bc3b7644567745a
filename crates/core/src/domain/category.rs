use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CategoryId(pub i64);

impl fmt::Display for CategoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub description: Option<String>,
}

impl Category {
    pub fn new(id: CategoryId, name: impl Into<String>) -> Self {
        Self { id, name: name.into(), description: None }
    }
}

/// Ordered snapshot of the store's categories, resolved by exact name.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CategoryCatalog {
    categories: Vec<Category>,
}

impl CategoryCatalog {
    pub fn new(categories: Vec<Category>) -> Self {
        Self { categories }
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.categories.iter().map(|category| category.name.clone()).collect()
    }

    /// Byte-for-byte name lookup; no trimming or case folding.
    pub fn resolve(&self, name: &str) -> Option<&Category> {
        self.categories.iter().find(|category| category.name == name)
    }

    pub fn name_to_id(&self) -> BTreeMap<String, CategoryId> {
        self.categories.iter().map(|category| (category.name.clone(), category.id)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{Category, CategoryCatalog, CategoryId};

    fn catalog() -> CategoryCatalog {
        CategoryCatalog::new(vec![
            Category::new(CategoryId(1), "Bug"),
            Category::new(CategoryId(2), "Access"),
            Category::new(CategoryId(3), "Data"),
        ])
    }

    #[test]
    fn resolve_requires_exact_match() {
        let catalog = catalog();
        assert_eq!(catalog.resolve("Access").map(|c| c.id), Some(CategoryId(2)));
        assert!(catalog.resolve("access").is_none());
        assert!(catalog.resolve("Access ").is_none());
    }

    #[test]
    fn names_keep_store_order() {
        assert_eq!(catalog().names(), vec!["Bug", "Access", "Data"]);
        assert_eq!(catalog().name_to_id().get("Data"), Some(&CategoryId(3)));
    }
}
