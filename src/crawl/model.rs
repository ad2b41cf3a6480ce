//! Entities harvested by a crawl.
//!
//! Every entity is identified by a provider id (OpenAlex URL, MeSH
//! descriptor, czi id, ...) and is emitted at most once per run. Relations
//! between entities are embedded as [`EntityRef`] lists rather than stored
//! separately.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityKind {
    Paper,
    Person,
    Institution,
    Project,
    Concept,
    Domain,
    #[serde(rename = "SDG")]
    Sdg,
}

impl EntityKind {
    pub const ALL: [EntityKind; 7] = [
        EntityKind::Paper,
        EntityKind::Person,
        EntityKind::Institution,
        EntityKind::Project,
        EntityKind::Concept,
        EntityKind::Domain,
        EntityKind::Sdg,
    ];

    /// Value written to the `Label` column.
    pub fn label(self) -> &'static str {
        match self {
            EntityKind::Paper => "Paper",
            EntityKind::Person => "Person",
            EntityKind::Institution => "Institution",
            EntityKind::Project => "Project",
            EntityKind::Concept => "Concept",
            EntityKind::Domain => "Domain",
            EntityKind::Sdg => "SDG",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.label() == label)
    }

    /// Plural used in grouped JSON keys and per-kind file names.
    pub fn plural(self) -> &'static str {
        match self {
            EntityKind::Paper => "papers",
            EntityKind::Person => "persons",
            EntityKind::Institution => "institutions",
            EntityKind::Project => "projects",
            EntityKind::Concept => "concepts",
            EntityKind::Domain => "domains",
            EntityKind::Sdg => "sdgs",
        }
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Foreign key to another entity, carrying its display name for flat output.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub id: String,
    pub name: String,
}

impl EntityRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub ecosystem: String,
    pub name: String,
    pub homepage: Option<String>,
    pub repository_url: Option<String>,
}

impl Project {
    /// `ecosystem:name`, e.g. `pypi:keras`.
    pub fn display_name(&self) -> String {
        format!("{}:{}", self.ecosystem, self.name)
    }

    pub fn to_ref(&self) -> EntityRef {
        EntityRef::new(self.id.clone(), self.display_name())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Paper {
    pub id: String,
    pub title: Option<String>,
    pub doi: Option<String>,
    pub authors: Vec<EntityRef>,
    /// Projects co-mentioned by this paper; only filled when recursing.
    pub cited_projects: Vec<EntityRef>,
    pub concepts: Vec<EntityRef>,
    pub domains: Vec<EntityRef>,
    pub sdgs: Vec<EntityRef>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub id: String,
    pub display_name: String,
    pub orcid: Option<String>,
    pub affiliated_institutions: Vec<EntityRef>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Institution {
    pub id: String,
    pub display_name: String,
    pub ror: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Concept {
    pub id: String,
    pub display_name: String,
    pub wikidata: Option<String>,
    pub level: Option<u32>,
    pub score: Option<f64>,
}

/// MeSH descriptor attached to a paper.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Domain {
    pub id: String,
    pub display_name: String,
    pub is_major_topic: Option<bool>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sdg {
    pub id: String,
    pub display_name: String,
    pub score: Option<f64>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Entity {
    Paper(Paper),
    Person(Person),
    Institution(Institution),
    Project(Project),
    Concept(Concept),
    Domain(Domain),
    Sdg(Sdg),
}

impl Entity {
    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::Paper(_) => EntityKind::Paper,
            Entity::Person(_) => EntityKind::Person,
            Entity::Institution(_) => EntityKind::Institution,
            Entity::Project(_) => EntityKind::Project,
            Entity::Concept(_) => EntityKind::Concept,
            Entity::Domain(_) => EntityKind::Domain,
            Entity::Sdg(_) => EntityKind::Sdg,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Entity::Paper(e) => &e.id,
            Entity::Person(e) => &e.id,
            Entity::Institution(e) => &e.id,
            Entity::Project(e) => &e.id,
            Entity::Concept(e) => &e.id,
            Entity::Domain(e) => &e.id,
            Entity::Sdg(e) => &e.id,
        }
    }

    /// Value written to the `Name` column.
    pub fn display_name(&self) -> String {
        match self {
            Entity::Paper(e) => e.title.clone().unwrap_or_default(),
            Entity::Person(e) => e.display_name.clone(),
            Entity::Institution(e) => e.display_name.clone(),
            Entity::Project(e) => e.display_name(),
            Entity::Concept(e) => e.display_name.clone(),
            Entity::Domain(e) => e.display_name.clone(),
            Entity::Sdg(e) => e.display_name.clone(),
        }
    }
}

/// Entities bucketed by kind; the shape of the JSON output document.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityGroups {
    #[serde(default)]
    pub papers: Vec<Paper>,
    #[serde(default)]
    pub persons: Vec<Person>,
    #[serde(default)]
    pub institutions: Vec<Institution>,
    #[serde(default)]
    pub projects: Vec<Project>,
    #[serde(default)]
    pub concepts: Vec<Concept>,
    #[serde(default)]
    pub domains: Vec<Domain>,
    #[serde(default)]
    pub sdgs: Vec<Sdg>,
}

impl EntityGroups {
    pub fn push(&mut self, entity: Entity) {
        match entity {
            Entity::Paper(e) => self.papers.push(e),
            Entity::Person(e) => self.persons.push(e),
            Entity::Institution(e) => self.institutions.push(e),
            Entity::Project(e) => self.projects.push(e),
            Entity::Concept(e) => self.concepts.push(e),
            Entity::Domain(e) => self.domains.push(e),
            Entity::Sdg(e) => self.sdgs.push(e),
        }
    }

    pub fn len(&self) -> usize {
        self.papers.len()
            + self.persons.len()
            + self.institutions.len()
            + self.projects.len()
            + self.concepts.len()
            + self.domains.len()
            + self.sdgs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flatten back into entities, grouped in kind order.
    pub fn into_entities(self) -> Vec<Entity> {
        let mut out = Vec::with_capacity(self.len());
        out.extend(self.papers.into_iter().map(Entity::Paper));
        out.extend(self.persons.into_iter().map(Entity::Person));
        out.extend(self.institutions.into_iter().map(Entity::Institution));
        out.extend(self.projects.into_iter().map(Entity::Project));
        out.extend(self.concepts.into_iter().map(Entity::Concept));
        out.extend(self.domains.into_iter().map(Entity::Domain));
        out.extend(self.sdgs.into_iter().map(Entity::Sdg));
        out
    }
}

impl FromIterator<Entity> for EntityGroups {
    fn from_iter<I: IntoIterator<Item = Entity>>(iter: I) -> Self {
        let mut groups = EntityGroups::default();
        for entity in iter {
            groups.push(entity);
        }
        groups
    }
}
