//! Representation negotiation.
//!
//! Clients express their preferences as a comma separated list of weighted
//! codes, for example `model/knart+xml;q=0.8, lang=HTML;fmt=TXT;q=0.5`.
//! [`decode_preferences`] turns such a list into [`WeightedRepresentation`]s
//! ordered by descending weight (ties keep their written order), and the
//! negotiation functions pick the first candidate that satisfies the
//! strongest preference that can be satisfied at all.
//!
//! Everything here is stateless.

use pest::Parser;
use pest::iterators::Pair;
use pest_derive::Parser;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::construct::{KnowledgeArtifact, KnowledgeCarrier, Representation};

pub const DEFAULT_WEIGHT: f32 = 1.0;
pub const HTML: &str = "HTML";
const WILDCARD: &str = "*";

#[derive(Parser)]
#[grammar = "preferences.pest"]
struct PreferenceParser;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedRepresentation {
    pub rep: Representation,
    pub weight: f32,
}
impl WeightedRepresentation {
    pub fn new(rep: Representation, weight: f32) -> Self {
        Self { rep, weight }
    }
}
impl From<Representation> for WeightedRepresentation {
    fn from(rep: Representation) -> Self {
        Self::new(rep, DEFAULT_WEIGHT)
    }
}

/// Anything that declares the representation of its content.
pub trait Negotiable {
    fn representation(&self) -> &Representation;
}
impl Negotiable for KnowledgeArtifact {
    fn representation(&self) -> &Representation {
        &self.representation
    }
}
impl Negotiable for KnowledgeCarrier {
    fn representation(&self) -> &Representation {
        &self.representation
    }
}
impl Negotiable for Representation {
    fn representation(&self) -> &Representation {
        self
    }
}

fn non_wildcard(value: &str) -> Option<String> {
    if value == WILDCARD {
        None
    } else {
        Some(value.to_string())
    }
}

fn apply_media(rep: &mut Representation, media: Pair<Rule>) {
    let mut media_type = "";
    let mut subtype = "";
    let mut suffix = None;
    for part in media.into_inner() {
        match part.as_rule() {
            Rule::media_type => media_type = part.as_str(),
            Rule::media_subtype => subtype = part.as_str(),
            Rule::media_suffix => suffix = Some(part.as_str()),
            _ => {}
        }
    }
    if media_type == WILDCARD {
        return;
    }
    // model/<lang>+<fmt>, and plain media types name the language through their subtype
    rep.language = non_wildcard(subtype);
    rep.format = suffix.and_then(non_wildcard);
}

/// Decodes a single code into at most one weighted representation.
pub fn decode_code(code: &str) -> Option<WeightedRepresentation> {
    let code = code.trim();
    if code.is_empty() {
        return None;
    }
    let parsed = match PreferenceParser::parse(Rule::code, code) {
        Ok(mut pairs) => pairs.next()?,
        Err(e) => {
            debug!(code, error = %e, "ignoring undecodable preference");
            return None;
        }
    };
    let mut rep = Representation::default();
    let mut weight = DEFAULT_WEIGHT;
    let mut has_content = false;
    for part in parsed.into_inner() {
        match part.as_rule() {
            Rule::media => {
                has_content = true;
                apply_media(&mut rep, part);
            }
            Rule::param => {
                let mut inner = part.into_inner();
                let name = inner.next()?.as_str().to_ascii_lowercase();
                let value = inner.next()?.as_str();
                match name.as_str() {
                    "lang" | "language" => {
                        rep.language = non_wildcard(value);
                        has_content = true;
                    }
                    "fmt" | "format" => {
                        rep.format = non_wildcard(value);
                        has_content = true;
                    }
                    "charset" => {
                        rep.charset = non_wildcard(value);
                        has_content = true;
                    }
                    "enc" | "encoding" => {
                        rep.encoding = non_wildcard(value);
                        has_content = true;
                    }
                    "q" => match value.parse::<f32>() {
                        Ok(w) if (0.0..=1.0).contains(&w) => weight = w,
                        _ => {
                            debug!(code, weight = value, "ignoring preference with invalid weight");
                            return None;
                        }
                    },
                    _ => {}
                }
            }
            _ => {}
        }
    }
    has_content.then_some(WeightedRepresentation::new(rep, weight))
}

/// Decodes a list of weighted codes, strongest first. When nothing can be
/// decoded and a fallback is given, the fallback is the only preference.
pub fn decode_preferences(
    code: &str,
    fallback: Option<&Representation>,
) -> Vec<WeightedRepresentation> {
    let mut preferences: Vec<WeightedRepresentation> =
        code.split(',').filter_map(decode_code).collect();
    // sort_by is stable, so equal weights keep their written order
    preferences.sort_by(|a, b| b.weight.total_cmp(&a.weight));
    if preferences.is_empty() {
        if let Some(fallback) = fallback {
            preferences.push(WeightedRepresentation::from(fallback.clone()));
        }
    }
    preferences
}

pub fn is_broader_or_equal(requested: &Representation, candidate: &Representation) -> bool {
    requested.is_broader_or_equal(candidate)
}

/// The first candidate, in candidate order, matching the preference.
pub fn best_candidate_for<'a, T: Negotiable>(
    candidates: &'a [T],
    preference: &WeightedRepresentation,
) -> Option<&'a T> {
    candidates
        .iter()
        .find(|c| preference.rep.is_broader_or_equal(c.representation()))
}

/// The first preference with any match wins.
pub fn negotiate<'a, T: Negotiable>(
    candidates: &'a [T],
    preferences: &[WeightedRepresentation],
) -> Option<&'a T> {
    preferences
        .iter()
        .find_map(|p| best_candidate_for(candidates, p))
}

/// Whatever comes first in the collection's own order.
pub fn any_carrier<T: Negotiable>(candidates: &[T]) -> Option<&T> {
    candidates.first()
}

pub fn negotiate_or_default<'a, T: Negotiable>(
    candidates: &'a [T],
    preferences: &[WeightedRepresentation],
) -> Option<&'a T> {
    negotiate(candidates, preferences).or_else(|| any_carrier(candidates))
}

/// Like [`negotiate`], but settles for any candidate when no preference can
/// be honoured and the strongest one is not above `threshold`.
pub fn negotiate_within<'a, T: Negotiable>(
    candidates: &'a [T],
    preferences: &[WeightedRepresentation],
    threshold: f32,
) -> Option<&'a T> {
    if preferences.iter().all(|p| p.rep.language.is_none()) {
        return any_carrier(candidates);
    }
    match negotiate(candidates, preferences) {
        Some(chosen) => Some(chosen),
        None if strongest_preference(preferences) <= threshold => any_carrier(candidates),
        None => None,
    }
}

pub fn strongest_preference(preferences: &[WeightedRepresentation]) -> f32 {
    preferences.first().map_or(DEFAULT_WEIGHT, |p| p.weight)
}

pub fn is_acceptable<T: Negotiable>(candidate: &T, code: &str) -> bool {
    if code.trim().is_empty() {
        return true;
    }
    let preferences = decode_preferences(code, None);
    negotiate(std::slice::from_ref(candidate), &preferences).is_some()
}
