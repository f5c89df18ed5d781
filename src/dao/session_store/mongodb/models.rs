use indexmap::IndexMap;
use mongodb::bson::{DateTime, Document, doc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    dao::{
        models::{SessionCondition, SessionEntity, SessionPatch},
        storage::StorageError,
    },
    state::state_machine::SessionPhase,
};

pub const ROSTER_FIELD: &str = "roster";
pub const TRAILS_FIELD: &str = "trails";

/// Session document stored in the `sessions` collection.
///
/// Trail keys are player names hex-encoded, since raw names may contain `.` or
/// a leading `$`, which MongoDB rejects in field paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoSessionDocument {
    #[serde(rename = "_id")]
    id: String,
    join_code: Option<String>,
    max_players: Option<u32>,
    roster: Vec<String>,
    phase: SessionPhase,
    start_topic: Option<String>,
    target_topic: Option<String>,
    #[serde(default)]
    trails: IndexMap<String, Vec<String>>,
    winner: Option<String>,
    created_at: DateTime,
    updated_at: DateTime,
}

impl From<SessionEntity> for MongoSessionDocument {
    fn from(value: SessionEntity) -> Self {
        Self {
            id: value.id.to_string(),
            join_code: value.join_code,
            max_players: value.max_players,
            roster: value.roster,
            phase: value.phase,
            start_topic: value.start_topic,
            target_topic: value.target_topic,
            trails: value
                .trails
                .into_iter()
                .map(|(player, topics)| (encode_trail_key(&player), topics))
                .collect(),
            winner: value.winner,
            created_at: DateTime::from_system_time(value.created_at),
            updated_at: DateTime::from_system_time(value.updated_at),
        }
    }
}

impl TryFrom<MongoSessionDocument> for SessionEntity {
    type Error = StorageError;

    fn try_from(value: MongoSessionDocument) -> Result<Self, Self::Error> {
        let id = Uuid::parse_str(&value.id)
            .map_err(|_| StorageError::corrupted(value.id.clone(), "invalid UUID"))?;
        let trails = value
            .trails
            .into_iter()
            .map(|(key, topics)| {
                decode_trail_key(&key)
                    .map(|player| (player, topics))
                    .ok_or_else(|| {
                        StorageError::corrupted(value.id.clone(), format!("bad trail key `{key}`"))
                    })
            })
            .collect::<Result<IndexMap<_, _>, _>>()?;

        Ok(Self {
            id,
            join_code: value.join_code,
            max_players: value.max_players,
            roster: value.roster,
            phase: value.phase,
            start_topic: value.start_topic,
            target_topic: value.target_topic,
            trails,
            winner: value.winner,
            created_at: value.created_at.to_system_time(),
            updated_at: value.updated_at.to_system_time(),
        })
    }
}

pub fn doc_id(id: Uuid) -> Document {
    doc! {"_id": id.to_string()}
}

/// Filter matching `id` only while `condition` holds.
pub fn conditional_filter(id: Uuid, condition: SessionCondition) -> Document {
    let mut filter = doc_id(id);
    match condition {
        SessionCondition::PhaseIs(phase) => {
            filter.insert("phase", phase.as_str());
        }
        SessionCondition::WinnerUnset => {
            filter.insert("winner", mongodb::bson::Bson::Null);
        }
    }
    filter
}

/// `$set` update document for the populated fields of `patch`.
pub fn set_document(patch: &SessionPatch) -> Document {
    let mut set = doc! {"updated_at": DateTime::now()};
    if let Some(code) = &patch.join_code {
        set.insert("join_code", code.as_str());
    }
    if let Some(phase) = patch.phase {
        set.insert("phase", phase.as_str());
    }
    if let Some(start) = &patch.start_topic {
        set.insert("start_topic", start.as_str());
    }
    if let Some(target) = &patch.target_topic {
        set.insert("target_topic", target.as_str());
    }
    if let Some(winner) = &patch.winner {
        set.insert("winner", winner.as_str());
    }
    doc! {"$set": set}
}

pub fn trail_path(player: &str) -> String {
    format!("{TRAILS_FIELD}.{}", encode_trail_key(player))
}

fn encode_trail_key(player: &str) -> String {
    player.bytes().map(|byte| format!("{byte:02x}")).collect()
}

fn decode_trail_key(key: &str) -> Option<String> {
    if key.len() % 2 != 0 {
        return None;
    }
    let bytes = (0..key.len())
        .step_by(2)
        .map(|index| u8::from_str_radix(key.get(index..index + 2)?, 16).ok())
        .collect::<Option<Vec<u8>>>()?;
    String::from_utf8(bytes).ok()
}
