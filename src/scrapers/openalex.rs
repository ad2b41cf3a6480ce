//! OpenAlex work records.
//!
//! ecosyste.ms embeds a work under `openalex_data`; the GitHub harvester
//! fetches one directly from `/works/doi:<doi>`. Both are turned into a
//! [`PaperRecord`] here.

use crate::crawl::model::{Concept, Domain, EntityRef, Institution, Paper, Person, Sdg};
use crate::scrapers::scraper::PaperRecord;
use serde::{Deserialize, Deserializer};

pub(crate) fn null_as_empty<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// The parts of a work the crawler keeps.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct OpenAlexData {
    #[serde(default, deserialize_with = "null_as_empty")]
    authorships: Vec<Authorship>,
    #[serde(default, deserialize_with = "null_as_empty")]
    concepts: Vec<ConceptResponse>,
    #[serde(default, deserialize_with = "null_as_empty")]
    mesh: Vec<MeshResponse>,
    #[serde(default, deserialize_with = "null_as_empty")]
    sustainable_development_goals: Vec<SdgResponse>,
}

/// A work as served by the OpenAlex API itself.
#[derive(Debug, Deserialize)]
pub(crate) struct OpenAlexWork {
    pub id: String,
    pub title: Option<String>,
    pub doi: Option<String>,
    #[serde(flatten)]
    pub data: OpenAlexData,
}

#[derive(Debug, Deserialize)]
struct Authorship {
    author: AuthorResponse,
    #[serde(default, deserialize_with = "null_as_empty")]
    institutions: Vec<InstitutionResponse>,
}

#[derive(Debug, Deserialize)]
struct AuthorResponse {
    id: Option<String>,
    display_name: Option<String>,
    orcid: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InstitutionResponse {
    id: Option<String>,
    display_name: Option<String>,
    ror: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ConceptResponse {
    id: String,
    display_name: String,
    wikidata: Option<String>,
    level: Option<u32>,
    score: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct MeshResponse {
    descriptor_ui: String,
    descriptor_name: String,
    is_major_topic: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct SdgResponse {
    id: String,
    display_name: String,
    score: Option<f64>,
}

impl OpenAlexData {
    /// Build the record for `paper`, filling its reference lists.
    ///
    /// Authors and institutions without an OpenAlex id are dropped.
    pub(crate) fn into_record(self, mut paper: Paper, mentions_url: Option<String>) -> PaperRecord {
        let mut record = PaperRecord {
            mentions_url,
            ..PaperRecord::default()
        };

        for authorship in self.authorships {
            let Some(author_id) = authorship.author.id else {
                continue;
            };
            let mut affiliations = Vec::new();
            for inst in authorship.institutions {
                let Some(inst_id) = inst.id else {
                    continue;
                };
                let name = inst.display_name.unwrap_or_default();
                affiliations.push(EntityRef::new(inst_id.clone(), name.clone()));
                record.institutions.push(Institution {
                    id: inst_id,
                    display_name: name,
                    ror: inst.ror,
                });
            }
            let name = authorship.author.display_name.unwrap_or_default();
            paper.authors.push(EntityRef::new(author_id.clone(), name.clone()));
            record.persons.push(Person {
                id: author_id,
                display_name: name,
                orcid: authorship.author.orcid,
                affiliated_institutions: affiliations,
            });
        }

        for c in self.concepts {
            paper.concepts.push(EntityRef::new(c.id.clone(), c.display_name.clone()));
            record.concepts.push(Concept {
                id: c.id,
                display_name: c.display_name,
                wikidata: c.wikidata,
                level: c.level,
                score: c.score,
            });
        }

        for m in self.mesh {
            paper
                .domains
                .push(EntityRef::new(m.descriptor_ui.clone(), m.descriptor_name.clone()));
            record.domains.push(Domain {
                id: m.descriptor_ui,
                display_name: m.descriptor_name,
                is_major_topic: m.is_major_topic,
            });
        }

        for s in self.sustainable_development_goals {
            paper.sdgs.push(EntityRef::new(s.id.clone(), s.display_name.clone()));
            record.sdgs.push(Sdg {
                id: s.id,
                display_name: s.display_name,
                score: s.score,
            });
        }

        record.paper = paper;
        record
    }
}

impl OpenAlexWork {
    pub(crate) fn into_record(self) -> PaperRecord {
        let paper = Paper {
            id: self.id,
            title: self.title,
            doi: self.doi,
            ..Paper::default()
        };
        self.data.into_record(paper, None)
    }
}
