/*
 *  Copyright 2025-2026 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Job result rows.
//!
//! Every result is tagged with the engine and the job revision that produced
//! it. Results older than the engine's current revision are purged when a job
//! completes; results newer than it are purged when a job is canceled,
//! faults or restarts.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

use crate::store::{Entity, Filter};

/// A result row produced by a job.
pub trait JobResult: Entity + Serialize + DeserializeOwned {
    /// Name used in logs, e.g. "pretranslation".
    const KIND: &'static str;

    fn engine_ref(&self) -> &str;
    fn job_revision(&self) -> i64;
    fn text_id(&self) -> &str;
    /// Scripture-style references ("1:3") locating the row within its text.
    fn refs(&self) -> &[String];

    /// Job that produced the row, for kinds that are scoped to a single job.
    fn job_ref(&self) -> Option<&str> {
        None
    }

    /// Corpus the row was produced from, for kinds that are scoped to a corpus.
    fn corpus_ref(&self) -> Option<&str> {
        None
    }

    /// Whether `other` is the same row of the same generation.
    ///
    /// Inserting a row again replaces the stored one, so a redelivered result
    /// stream leaves a single copy of each row.
    fn is_same_row(&self, other: &Self) -> bool {
        self.engine_ref() == other.engine_ref()
            && self.job_revision() == other.job_revision()
            && self.corpus_ref() == other.corpus_ref()
            && self.job_ref() == other.job_ref()
            && self.text_id() == other.text_id()
            && self.refs() == other.refs()
    }

    fn assign(&mut self, engine_id: &str, job_revision: i64);

    /// Builds a result from one streamed content row.
    fn from_content(
        engine_id: &str,
        job_revision: i64,
        content: &str,
    ) -> Result<Self, serde_json::Error> {
        let mut result: Self = serde_json::from_str(content)?;
        result.set_id(String::new());
        result.assign(engine_id, job_revision);
        Ok(result)
    }
}

/// Selects a subset of an engine's results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResultFilter {
    TextIds { text_ids: Vec<String> },
    ChapterRange {
        text_id: String,
        chapters: RangeInclusive<u32>,
    },
}

impl ResultFilter {
    pub fn matches<R: JobResult>(&self, result: &R) -> bool {
        match self {
            ResultFilter::TextIds { text_ids } => text_ids.iter().any(|id| id == result.text_id()),
            ResultFilter::ChapterRange { text_id, chapters } => {
                text_id == result.text_id()
                    && result
                        .refs()
                        .iter()
                        .filter_map(|r| chapter_of(r))
                        .any(|chapter| chapters.contains(&chapter))
            }
        }
    }

    /// Current-generation results of an engine, optionally narrowed by this filter.
    pub fn for_engine<R: JobResult>(
        engine_id: impl Into<String>,
        job_revision: i64,
        filter: Option<ResultFilter>,
    ) -> Filter<R> {
        let engine_id = engine_id.into();
        Filter::new(move |r: &R| {
            r.engine_ref() == engine_id
                && r.job_revision() == job_revision
                && filter.as_ref().map_or(true, |f| f.matches(r))
        })
    }
}

/// Chapter number of a reference such as "3:16".
fn chapter_of(reference: &str) -> Option<u32> {
    reference.split(':').next()?.trim().parse().ok()
}

macro_rules! impl_entity {
    ($ty:ty) => {
        impl Entity for $ty {
            fn id(&self) -> &str {
                &self.id
            }

            fn set_id(&mut self, id: String) {
                self.id = id;
            }

            fn revision(&self) -> i64 {
                self.revision
            }

            fn set_revision(&mut self, revision: i64) {
                self.revision = revision;
            }
        }
    };
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Pretranslation {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub revision: i64,
    #[serde(default)]
    pub engine_ref: String,
    #[serde(default)]
    pub job_revision: i64,
    pub corpus_ref: String,
    pub text_id: String,
    pub refs: Vec<String>,
    pub translation: String,
}

impl_entity!(Pretranslation);

impl JobResult for Pretranslation {
    const KIND: &'static str = "pretranslation";

    fn engine_ref(&self) -> &str {
        &self.engine_ref
    }

    fn job_revision(&self) -> i64 {
        self.job_revision
    }

    fn text_id(&self) -> &str {
        &self.text_id
    }

    fn refs(&self) -> &[String] {
        &self.refs
    }

    fn corpus_ref(&self) -> Option<&str> {
        Some(&self.corpus_ref)
    }

    fn assign(&mut self, engine_id: &str, job_revision: i64) {
        self.engine_ref = engine_id.to_string();
        self.job_revision = job_revision;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlignedWordPair {
    pub source_index: u32,
    pub target_index: u32,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WordAlignment {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub revision: i64,
    #[serde(default)]
    pub engine_ref: String,
    #[serde(default)]
    pub job_revision: i64,
    pub corpus_ref: String,
    pub text_id: String,
    pub source_refs: Vec<String>,
    pub target_refs: Vec<String>,
    pub source_tokens: Vec<String>,
    pub target_tokens: Vec<String>,
    pub alignment: Vec<AlignedWordPair>,
}

impl_entity!(WordAlignment);

impl JobResult for WordAlignment {
    const KIND: &'static str = "word_alignment";

    fn engine_ref(&self) -> &str {
        &self.engine_ref
    }

    fn job_revision(&self) -> i64 {
        self.job_revision
    }

    fn text_id(&self) -> &str {
        &self.text_id
    }

    fn refs(&self) -> &[String] {
        &self.target_refs
    }

    fn corpus_ref(&self) -> Option<&str> {
        Some(&self.corpus_ref)
    }

    fn assign(&mut self, engine_id: &str, job_revision: i64) {
        self.engine_ref = engine_id.to_string();
        self.job_revision = job_revision;
    }
}

/// Assessment output. Scoped to the job that produced it as well as the engine.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AssessmentResult {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub revision: i64,
    #[serde(default)]
    pub engine_ref: String,
    #[serde(default)]
    pub job_revision: i64,
    pub job_ref: String,
    pub text_id: String,
    #[serde(default)]
    pub refs: Vec<String>,
    pub score: Option<f64>,
    pub description: Option<String>,
}

impl_entity!(AssessmentResult);

impl JobResult for AssessmentResult {
    const KIND: &'static str = "assessment_result";

    fn engine_ref(&self) -> &str {
        &self.engine_ref
    }

    fn job_revision(&self) -> i64 {
        self.job_revision
    }

    fn text_id(&self) -> &str {
        &self.text_id
    }

    fn refs(&self) -> &[String] {
        &self.refs
    }

    fn job_ref(&self) -> Option<&str> {
        Some(&self.job_ref)
    }

    fn assign(&mut self, engine_id: &str, job_revision: i64) {
        self.engine_ref = engine_id.to_string();
        self.job_revision = job_revision;
    }
}
