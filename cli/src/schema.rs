//! Typed ballot schema: ordered positions, each with ordered candidates

use std::collections::HashSet;
use std::fmt;

use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::hash::BallotData;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("ballot schema declares no positions")]
    NoPositions,
    #[error("position name must not be empty")]
    EmptyPositionName,
    #[error("position '{0}' is declared more than once")]
    DuplicatePosition(String),
    #[error("position '{0}' has no candidates")]
    NoCandidates(String),
    #[error("candidate '{candidate}' is listed twice under '{position}'")]
    DuplicateCandidate { position: String, candidate: String },
    #[error("ballot is empty")]
    EmptyBallot,
    #[error("unknown position '{0}'")]
    UnknownPosition(String),
    #[error("'{candidate}' is not a candidate for '{position}'")]
    UnknownCandidate { position: String, candidate: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Position {
    pub name: String,
    pub candidates: Vec<String>,
}

impl Position {
    pub fn has_candidate(&self, candidate: &str) -> bool {
        self.candidates.iter().any(|c| c == candidate)
    }
}

/// Positions in declaration order. Serialized as a JSON object whose key
/// order is the declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BallotSchema {
    positions: Vec<Position>,
}

impl BallotSchema {
    pub fn new(positions: Vec<Position>) -> Result<Self, SchemaError> {
        if positions.is_empty() {
            return Err(SchemaError::NoPositions);
        }

        let mut seen = HashSet::new();
        for position in &positions {
            if position.name.is_empty() {
                return Err(SchemaError::EmptyPositionName);
            }
            if !seen.insert(position.name.as_str()) {
                return Err(SchemaError::DuplicatePosition(position.name.clone()));
            }
            if position.candidates.is_empty() {
                return Err(SchemaError::NoCandidates(position.name.clone()));
            }
            let mut candidates = HashSet::new();
            for candidate in &position.candidates {
                if !candidates.insert(candidate.as_str()) {
                    return Err(SchemaError::DuplicateCandidate {
                        position: position.name.clone(),
                        candidate: candidate.clone(),
                    });
                }
            }
        }

        Ok(Self { positions })
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Compact JSON in declaration order.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    pub fn position(&self, name: &str) -> Option<&Position> {
        self.positions.iter().find(|p| p.name == name)
    }

    /// True if both the position and the candidate are declared.
    pub fn recognizes(&self, position: &str, candidate: &str) -> bool {
        self.position(position)
            .is_some_and(|p| p.has_candidate(candidate))
    }

    /// Cast-time check: non-empty, every selection declared. Positions may be
    /// left out (abstention).
    pub fn validate_ballot(&self, ballot: &BallotData) -> Result<(), SchemaError> {
        if ballot.is_empty() {
            return Err(SchemaError::EmptyBallot);
        }
        for (position, candidate) in ballot {
            let declared = self
                .position(position)
                .ok_or_else(|| SchemaError::UnknownPosition(position.clone()))?;
            if !declared.has_candidate(candidate) {
                return Err(SchemaError::UnknownCandidate {
                    position: position.clone(),
                    candidate: candidate.clone(),
                });
            }
        }
        Ok(())
    }
}

impl Serialize for BallotSchema {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.positions.len()))?;
        for position in &self.positions {
            map.serialize_entry(&position.name, &position.candidates)?;
        }
        map.end()
    }
}

struct SchemaVisitor;

impl<'de> Visitor<'de> for SchemaVisitor {
    type Value = BallotSchema;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("an object mapping position names to candidate lists")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut positions = Vec::with_capacity(access.size_hint().unwrap_or(0));
        while let Some((name, candidates)) = access.next_entry::<String, Vec<String>>()? {
            positions.push(Position { name, candidates });
        }
        BallotSchema::new(positions).map_err(de::Error::custom)
    }
}

impl<'de> Deserialize<'de> for BallotSchema {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(SchemaVisitor)
    }
}
