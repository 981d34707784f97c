//! Wire messages exchanged between the pool match server and its clients.
//!
//! Every message travels as one frame: a little-endian `u32` length, a tag
//! byte naming the variant, and a JSON object carrying the fields. Framing and
//! the tag table live in [`codec`]; this module holds the typed values.

pub mod codec;
pub mod logging;

use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

pub use codec::{CodecError, Decoded};

/// How a connection takes part in the match.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionKind {
    Player,
    Viewer,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Login {
    pub name: String,
    pub secret: Option<Uuid>,
    #[serde(rename = "conn_type")]
    pub kind: ConnectionKind,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LoginSuccess {
    pub secret: Uuid,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LoginFailed {
    pub reason: String,
}

/// Metadata about the turn that just finished.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ShotInfo {
    /// Player whose turn is next.
    pub player: String,
    pub game_over: bool,
    #[serde(default)]
    pub winner: Option<String>,
}

/// Authoritative state pushed to viewers after every shot.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Broadcast {
    #[serde(rename = "system")]
    pub snapshot: Snapshot,
    pub shot_info: ShotInfo,
    pub scores: Scores,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Synthesised locally when the stream ends; may also arrive on the wire.
    ConnectionClosed,
    Login(Login),
    LoginSuccess(LoginSuccess),
    LoginFailed(LoginFailed),
    Broadcast(Broadcast),
}

impl Message {
    pub fn code(&self) -> codec::MessageCode {
        match self {
            Message::ConnectionClosed => codec::MessageCode::ConnectionClosed,
            Message::Login(_) => codec::MessageCode::Login,
            Message::LoginSuccess(_) => codec::MessageCode::LoginSuccess,
            Message::LoginFailed(_) => codec::MessageCode::LoginFailed,
            Message::Broadcast(_) => codec::MessageCode::Broadcast,
        }
    }

    pub fn viewer_login(name: impl Into<String>, secret: Option<Uuid>) -> Self {
        Message::Login(Login {
            name: name.into(),
            secret,
            kind: ConnectionKind::Viewer,
        })
    }
}

/// Full simulation state at one broadcast instant.
///
/// The layout belongs to the physics library and is kept as raw JSON. The
/// only field read here is the simulation clock `t`, which must be a finite,
/// non-negative number.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    t: f64,
    raw: Value,
}

impl Snapshot {
    pub fn from_value(raw: Value) -> Option<Self> {
        let t = raw.as_object()?.get("t")?.as_f64()?;
        if !t.is_finite() || t < 0.0 {
            return None;
        }
        Some(Self { t, raw })
    }

    /// A snapshot holding nothing but its clock.
    pub fn at(t: f64) -> Self {
        Self {
            t,
            raw: serde_json::json!({ "t": t }),
        }
    }

    pub fn time(&self) -> f64 {
        self.t
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }
}

impl Serialize for Snapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.raw.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Snapshot {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        Snapshot::from_value(raw).ok_or_else(|| {
            de::Error::custom("snapshot must be an object with a non-negative numeric `t`")
        })
    }
}

/// Player scores in presentation order.
///
/// Serialised as a JSON object; the order of its keys is preserved both ways.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scores(Vec<(String, i64)>);

impl Scores {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Sets a player's score, keeping the player's original position.
    pub fn insert(&mut self, name: impl Into<String>, score: i64) {
        let name = name.into();
        match self.0.iter_mut().find(|(existing, _)| *existing == name) {
            Some(entry) => entry.1 = score,
            None => self.0.push((name, score)),
        }
    }

    pub fn get(&self, name: &str) -> Option<i64> {
        self.0
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, score)| *score)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> {
        self.0.iter().map(|(name, score)| (name.as_str(), *score))
    }

    pub fn entries(&self) -> &[(String, i64)] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<N: Into<String>> FromIterator<(N, i64)> for Scores {
    fn from_iter<I: IntoIterator<Item = (N, i64)>>(iter: I) -> Self {
        let mut scores = Scores::new();
        for (name, score) in iter {
            scores.insert(name, score);
        }
        scores
    }
}

impl Serialize for Scores {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, score) in &self.0 {
            map.serialize_entry(name, score)?;
        }
        map.end()
    }
}

struct ScoresVisitor;

impl<'de> Visitor<'de> for ScoresVisitor {
    type Value = Scores;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a map from player name to integer score")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Scores, A::Error> {
        let mut scores = Scores::new();
        while let Some((name, score)) = access.next_entry::<String, i64>()? {
            scores.insert(name, score);
        }
        Ok(scores)
    }
}

impl<'de> Deserialize<'de> for Scores {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(ScoresVisitor)
    }
}
