//! Flat row shape shared by the CSV and Parquet writers.
//!
//! Every kind uses the same superset of columns; the `Label` column says
//! which kind a row is. Multi-valued fields hold the referenced entities'
//! names joined with [`LIST_SEPARATOR`].

use crate::crawl::model::{Entity, EntityKind, EntityRef};
use serde::{Deserialize, Serialize};

pub const LIST_SEPARATOR: &str = "; ";

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRow {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Label")]
    pub label: String,
    #[serde(rename = "Name")]
    pub name: Option<String>,
    #[serde(rename = "ORCID")]
    pub orcid: Option<String>,
    #[serde(rename = "Persons Affiliated Institutions")]
    pub affiliated_institutions: Option<String>,
    #[serde(rename = "ROR")]
    pub ror: Option<String>,
    #[serde(rename = "DOI")]
    pub doi: Option<String>,
    #[serde(rename = "Projects/Packages Cited")]
    pub cited_projects: Option<String>,
    #[serde(rename = "Authors")]
    pub authors: Option<String>,
    #[serde(rename = "Homepage")]
    pub homepage: Option<String>,
    #[serde(rename = "repository_url")]
    pub repository_url: Option<String>,
    #[serde(rename = "Sustainable Development Goals")]
    pub sdgs: Option<String>,
    #[serde(rename = "sdg_score")]
    pub sdg_score: Option<String>,
    #[serde(rename = "Concepts")]
    pub concepts: Option<String>,
    #[serde(rename = "Wikidata")]
    pub wikidata: Option<String>,
    #[serde(rename = "Concept_level")]
    pub concept_level: Option<String>,
    #[serde(rename = "Concept_score")]
    pub concept_score: Option<String>,
    #[serde(rename = "Domains")]
    pub domains: Option<String>,
    #[serde(rename = "Is_major_topic")]
    pub is_major_topic: Option<String>,
}

/// One row column, used to pick the per-kind subset for columnar output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Field {
    Id,
    Label,
    Name,
    Orcid,
    AffiliatedInstitutions,
    Ror,
    Doi,
    CitedProjects,
    Authors,
    Homepage,
    RepositoryUrl,
    Sdgs,
    SdgScore,
    Concepts,
    Wikidata,
    ConceptLevel,
    ConceptScore,
    Domains,
    IsMajorTopic,
}

impl Field {
    /// Column name in columnar files.
    pub fn column_name(self) -> &'static str {
        match self {
            Field::Id => "id",
            Field::Label => "label",
            Field::Name => "name",
            Field::Orcid => "orcid",
            Field::AffiliatedInstitutions => "affiliated_institutions",
            Field::Ror => "ror",
            Field::Doi => "doi",
            Field::CitedProjects => "cited_projects",
            Field::Authors => "authors",
            Field::Homepage => "homepage",
            Field::RepositoryUrl => "repository_url",
            Field::Sdgs => "sdgs",
            Field::SdgScore => "sdg_score",
            Field::Concepts => "concepts",
            Field::Wikidata => "wikidata",
            Field::ConceptLevel => "concept_level",
            Field::ConceptScore => "concept_score",
            Field::Domains => "domains",
            Field::IsMajorTopic => "is_major_topic",
        }
    }
}

/// Columns that carry data for `kind`.
pub fn kind_fields(kind: EntityKind) -> &'static [Field] {
    use Field::*;
    match kind {
        EntityKind::Paper => &[
            Id,
            Name,
            Doi,
            Authors,
            CitedProjects,
            Sdgs,
            Concepts,
            Domains,
        ],
        EntityKind::Person => &[Id, Name, Orcid, AffiliatedInstitutions],
        EntityKind::Institution => &[Id, Name, Ror],
        EntityKind::Project => &[Id, Name, Homepage, RepositoryUrl],
        EntityKind::Concept => &[Id, Name, Wikidata, ConceptLevel, ConceptScore],
        EntityKind::Domain => &[Id, Name, IsMajorTopic],
        EntityKind::Sdg => &[Id, Name, SdgScore],
    }
}

fn join_names(refs: &[EntityRef]) -> Option<String> {
    if refs.is_empty() {
        return None;
    }
    Some(
        refs.iter()
            .map(|r| r.name.as_str())
            .collect::<Vec<_>>()
            .join(LIST_SEPARATOR),
    )
}

// Empty strings are written as absent so a re-read yields the same row.
fn non_empty(value: Option<&str>) -> Option<String> {
    value.filter(|v| !v.is_empty()).map(str::to_string)
}

impl EntityRow {
    pub fn get(&self, field: Field) -> Option<&str> {
        match field {
            Field::Id => Some(&self.id),
            Field::Label => Some(&self.label),
            Field::Name => self.name.as_deref(),
            Field::Orcid => self.orcid.as_deref(),
            Field::AffiliatedInstitutions => self.affiliated_institutions.as_deref(),
            Field::Ror => self.ror.as_deref(),
            Field::Doi => self.doi.as_deref(),
            Field::CitedProjects => self.cited_projects.as_deref(),
            Field::Authors => self.authors.as_deref(),
            Field::Homepage => self.homepage.as_deref(),
            Field::RepositoryUrl => self.repository_url.as_deref(),
            Field::Sdgs => self.sdgs.as_deref(),
            Field::SdgScore => self.sdg_score.as_deref(),
            Field::Concepts => self.concepts.as_deref(),
            Field::Wikidata => self.wikidata.as_deref(),
            Field::ConceptLevel => self.concept_level.as_deref(),
            Field::ConceptScore => self.concept_score.as_deref(),
            Field::Domains => self.domains.as_deref(),
            Field::IsMajorTopic => self.is_major_topic.as_deref(),
        }
    }
}

impl From<&Entity> for EntityRow {
    fn from(entity: &Entity) -> Self {
        let mut row = EntityRow {
            id: entity.id().to_string(),
            label: entity.kind().label().to_string(),
            name: non_empty(Some(&entity.display_name())),
            ..EntityRow::default()
        };
        match entity {
            Entity::Paper(p) => {
                row.doi = non_empty(p.doi.as_deref());
                row.authors = join_names(&p.authors);
                row.cited_projects = join_names(&p.cited_projects);
                row.sdgs = join_names(&p.sdgs);
                row.concepts = join_names(&p.concepts);
                row.domains = join_names(&p.domains);
            }
            Entity::Person(p) => {
                row.orcid = non_empty(p.orcid.as_deref());
                row.affiliated_institutions = join_names(&p.affiliated_institutions);
            }
            Entity::Institution(i) => {
                row.ror = non_empty(i.ror.as_deref());
            }
            Entity::Project(p) => {
                row.homepage = non_empty(p.homepage.as_deref());
                row.repository_url = non_empty(p.repository_url.as_deref());
            }
            Entity::Concept(c) => {
                row.wikidata = non_empty(c.wikidata.as_deref());
                row.concept_level = c.level.map(|l| l.to_string());
                row.concept_score = c.score.map(|s| s.to_string());
            }
            Entity::Domain(d) => {
                row.is_major_topic = d.is_major_topic.map(|m| m.to_string());
            }
            Entity::Sdg(s) => {
                row.sdg_score = s.score.map(|s| s.to_string());
            }
        }
        row
    }
}
