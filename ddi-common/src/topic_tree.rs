//! Topic tree of a study
//!
//! The whole tree is loaded with one query per table (topics, concept links,
//! concepts) and traversed in memory breadth-first, so the number of round
//! trips does not grow with the depth of the tree.

use crate::db::store::{Filter, Store};
use crate::models::{Concept, ConceptTopic, Entity, Topic};
use crate::Result;
use indexmap::{IndexMap, IndexSet};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use uuid::Uuid;

/// Display language
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    En,
    De,
}

impl Language {
    /// `de` selects German, anything else English
    pub fn parse(code: &str) -> Self {
        if code.eq_ignore_ascii_case("de") {
            Language::De
        } else {
            Language::En
        }
    }

    /// Pick the label for this language, falling back to English then name
    pub fn pick<'a>(self, label: &'a str, label_de: &'a str, name: &'a str) -> &'a str {
        match self {
            Language::De if !label_de.is_empty() => label_de,
            _ if !label.is_empty() => label,
            _ => name,
        }
    }
}

/// In-memory topic tree with attached concepts
#[derive(Debug, Clone, Default)]
pub struct TopicTree {
    topics: IndexMap<Uuid, Topic>,
    children: HashMap<Uuid, Vec<Uuid>>,
    roots: Vec<Uuid>,
    concepts: HashMap<Uuid, Vec<Concept>>,
}

impl TopicTree {
    /// Load all topics of `study_id` and their concepts
    pub async fn load(store: &dyn Store, study_id: Uuid) -> Result<Self> {
        let topics: Vec<Topic> = store
            .select(Topic::table(), &Filter::new().eq("study_id", study_id).order_by("name"))
            .await?
            .into_iter()
            .map(Topic::from_record)
            .collect::<Result<_>>()?;

        let topic_ids: Vec<Uuid> = topics.iter().map(|t| t.id).collect();
        let links: Vec<ConceptTopic> = store
            .select(ConceptTopic::table(), &Filter::new().any_of("topic_id", topic_ids))
            .await?
            .into_iter()
            .map(ConceptTopic::from_record)
            .collect::<Result<_>>()?;

        let concept_ids: IndexSet<Uuid> = links.iter().map(|l| l.concept_id).collect();
        let concepts: HashMap<Uuid, Concept> = store
            .select(
                Concept::table(),
                &Filter::new().any_of("id", concept_ids).order_by("name"),
            )
            .await?
            .into_iter()
            .map(|r| Concept::from_record(r).map(|c| (c.id, c)))
            .collect::<Result<_>>()?;

        let mut tree = Self::from_topics(topics);
        for link in links {
            if let Some(concept) = concepts.get(&link.concept_id) {
                tree.concepts
                    .entry(link.topic_id)
                    .or_default()
                    .push(concept.clone());
            }
        }
        for list in tree.concepts.values_mut() {
            list.sort_by(|a, b| a.name.cmp(&b.name));
        }

        Ok(tree)
    }

    /// Build from an already-fetched topic list
    ///
    /// Topics whose parent is missing from the list count as roots.
    pub fn from_topics(topics: Vec<Topic>) -> Self {
        let topics: IndexMap<Uuid, Topic> = topics.into_iter().map(|t| (t.id, t)).collect();
        let mut children: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        let mut roots = Vec::new();

        for topic in topics.values() {
            match topic.parent_id.filter(|p| topics.contains_key(p) && *p != topic.id) {
                Some(parent) => children.entry(parent).or_default().push(topic.id),
                None => roots.push(topic.id),
            }
        }

        Self {
            topics,
            children,
            roots,
            concepts: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    pub fn get(&self, id: Uuid) -> Option<&Topic> {
        self.topics.get(&id)
    }

    /// Find a topic by name
    pub fn find(&self, name: &str) -> Option<&Topic> {
        self.topics.values().find(|t| t.name == name)
    }

    pub fn roots(&self) -> impl Iterator<Item = &Topic> {
        self.roots.iter().filter_map(|id| self.topics.get(id))
    }

    pub fn children(&self, id: Uuid) -> impl Iterator<Item = &Topic> {
        self.children
            .get(&id)
            .into_iter()
            .flatten()
            .filter_map(|c| self.topics.get(c))
    }

    /// Concepts attached directly to a topic
    pub fn concepts(&self, id: Uuid) -> &[Concept] {
        self.concepts.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// `id` and all its descendants in breadth-first order
    pub fn closure(&self, id: Uuid) -> Vec<Uuid> {
        if !self.topics.contains_key(&id) {
            return Vec::new();
        }

        let mut visited: IndexSet<Uuid> = IndexSet::new();
        let mut queue = VecDeque::from([id]);

        while let Some(current) = queue.pop_front() {
            if !visited.insert(current) {
                continue;
            }
            if let Some(children) = self.children.get(&current) {
                queue.extend(children.iter().copied().filter(|c| !visited.contains(c)));
            }
        }

        visited.into_iter().collect()
    }

    /// Concept ids attached anywhere in the subtree of `id`
    pub fn concept_closure(&self, id: Uuid) -> Vec<Uuid> {
        let mut seen = IndexSet::new();
        for topic in self.closure(id) {
            for concept in self.concepts(topic) {
                seen.insert(concept.id);
            }
        }
        seen.into_iter().collect()
    }

    /// Nested JSON for tree widgets: topics with child topics then concepts
    pub fn to_json(&self, language: Language) -> Vec<Value> {
        let mut visited = IndexSet::new();
        self.roots
            .iter()
            .filter_map(|id| self.node_json(*id, language, &mut visited))
            .collect()
    }

    fn node_json(&self, id: Uuid, language: Language, visited: &mut IndexSet<Uuid>) -> Option<Value> {
        if !visited.insert(id) {
            return None;
        }
        let topic = self.topics.get(&id)?;

        let mut children: Vec<Value> = self
            .children
            .get(&id)
            .into_iter()
            .flatten()
            .filter_map(|child| self.node_json(*child, language, visited))
            .collect();

        children.extend(self.concepts(id).iter().map(|concept| {
            json!({
                "key": format!("concept_{}", concept.name),
                "name": concept.name,
                "title": language.pick(&concept.label, &concept.label_de, &concept.name),
                "type": "concept",
            })
        }));

        Some(json!({
            "key": format!("topic_{}", topic.name),
            "name": topic.name,
            "title": language.pick(&topic.label, &topic.label_de, &topic.name),
            "type": "topic",
            "children": children,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryStore;
    use crate::db::repository::Repository;
    use crate::models::Study;
    use crate::IdDeriver;
    use std::sync::Arc;

    fn topic(ids: &IdDeriver, study: Uuid, name: &str, parent: Option<&Topic>) -> Topic {
        let mut t = Topic::new(ids, study, name);
        t.label = name.to_uppercase();
        t.parent_id = parent.map(|p| p.id);
        t
    }

    #[test]
    fn test_closure_is_breadth_first() {
        let ids = IdDeriver::new(Uuid::new_v4());
        let study = Uuid::new_v4();
        let root = topic(&ids, study, "root", None);
        let a = topic(&ids, study, "a", Some(&root));
        let b = topic(&ids, study, "b", Some(&root));
        let a1 = topic(&ids, study, "a1", Some(&a));
        let other = topic(&ids, study, "other", None);

        let tree = TopicTree::from_topics(vec![
            root.clone(),
            a.clone(),
            b.clone(),
            a1.clone(),
            other.clone(),
        ]);

        assert_eq!(tree.closure(root.id), vec![root.id, a.id, b.id, a1.id]);
        assert_eq!(tree.closure(a.id), vec![a.id, a1.id]);
        assert_eq!(tree.roots().count(), 2);
        assert!(tree.closure(Uuid::new_v4()).is_empty());
    }

    #[test]
    fn test_cycle_terminates() {
        let ids = IdDeriver::new(Uuid::new_v4());
        let study = Uuid::new_v4();
        let mut a = topic(&ids, study, "a", None);
        let b = topic(&ids, study, "b", Some(&a));
        a.parent_id = Some(b.id);

        let tree = TopicTree::from_topics(vec![a.clone(), b.clone()]);
        let closure = tree.closure(a.id);
        assert_eq!(closure.len(), 2);
    }

    #[tokio::test]
    async fn test_load_attaches_concepts() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let ids = IdDeriver::new(Uuid::new_v4());
        let study = Study::new(&ids, "soep-test");
        Repository::<Study>::new(store.clone()).upsert(&study).await.unwrap();

        let root = topic(&ids, study.id, "health", None);
        let child = topic(&ids, study.id, "sleep", Some(&root));
        Repository::<Topic>::new(store.clone())
            .upsert_many(&[root.clone(), child.clone()])
            .await
            .unwrap();

        let mut concept = Concept::new(&ids, "hours-of-sleep");
        concept.label_de = "Schlafdauer".into();
        Repository::<Concept>::new(store.clone()).upsert(&concept).await.unwrap();
        Repository::<ConceptTopic>::new(store.clone())
            .upsert(&ConceptTopic::new(&ids, concept.id, child.id))
            .await
            .unwrap();

        let tree = TopicTree::load(store.as_ref(), study.id).await.unwrap();
        assert_eq!(tree.len(), 2);
        assert_eq!(tree.concept_closure(root.id), vec![concept.id]);

        let json = tree.to_json(Language::De);
        assert_eq!(json.len(), 1);
        assert_eq!(json[0]["key"], "topic_health");
        let leaf = &json[0]["children"][0]["children"][0];
        assert_eq!(leaf["type"], "concept");
        assert_eq!(leaf["title"], "Schlafdauer");
    }
}
