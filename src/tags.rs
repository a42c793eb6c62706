/// a single tag (array of strings); the first entry is the tag identifier
pub type Tag = Vec<String>;

/// collection of tags, order-preserving
#[derive(Debug, Default, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Tags(pub Vec<Tag>);

impl Tags {
    /// find the first tag with the given identifier that has at least one value
    pub fn find(&self, key: &str) -> Option<&Tag> {
        self.0
            .iter()
            .find(|&tag| tag.len() >= 2 && tag[0] == key)
            .map(|v| v as _)
    }

    /// find all tags with the given identifier that have at least one value
    pub fn find_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a Tag> {
        self.0
            .iter()
            .filter(move |tag| tag.len() >= 2 && tag[0] == key)
    }

    /// check if tags contain any of the given values for a tag identifier
    pub fn contains_any(&self, tag_name: &str, values: &[String]) -> bool {
        for tag in &self.0 {
            if tag.len() < 2 || tag[0] != tag_name {
                continue;
            }
            if values.contains(&tag[1]) {
                return true;
            }
        }
        false
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Tag> {
        self.0.iter()
    }
}

impl IntoIterator for Tags {
    type Item = Tag;
    type IntoIter = std::vec::IntoIter<Tag>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl std::fmt::Display for Tags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match serde_json::to_string(self) {
            Ok(json) => write!(f, "{json}"),
            Err(err) => write!(f, "Tags({err})"),
        }
    }
}

impl From<Vec<Tag>> for Tags {
    fn from(tags: Vec<Tag>) -> Self {
        Self(tags)
    }
}

impl From<Tags> for Vec<Tag> {
    fn from(tags: Tags) -> Self {
        tags.0
    }
}
