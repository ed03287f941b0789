// ── Wire message codecs ──
//
// Every frame on the operator socket is a JSON object keyed by a message
// tag: `{ "LocationDetail": { ... } }`. A codec recognises one tag,
// decodes and validates its payload, and encodes values back into the
// same envelope. Decoding never panics and never throws past the caller;
// sources simply skip frames their codecs reject.

use std::fmt;
use std::marker::PhantomData;

use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::model::{Collection, Entity, Identity};

/// Why a frame was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// The frame does not carry this codec's tag. Expected for most frames.
    #[error("not a `{tag}` message")]
    Unrecognized { tag: String },

    /// The tag matched but the payload has the wrong shape.
    #[error("malformed `{tag}` message: {message}")]
    Malformed { tag: String, message: String },

    /// The payload decoded but failed validation.
    #[error("invalid `{tag}` message: {message}")]
    Invalid { tag: String, message: String },

    #[error("cannot encode `{tag}` message: {message}")]
    Encode { tag: String, message: String },
}

impl CodecError {
    /// `true` when the frame simply belongs to someone else.
    pub fn is_unrecognized(&self) -> bool {
        matches!(self, Self::Unrecognized { .. })
    }
}

/// Bidirectional mapping between one tagged wire message and a domain value.
pub trait Codec: Send + Sync {
    type Output;

    fn tag(&self) -> &str;

    /// Decode and validate. Never panics.
    fn safe_parse(&self, raw: &Value) -> Result<Self::Output, CodecError>;

    fn encode(&self, value: &Self::Output) -> Result<Value, CodecError>;
}

// ── Envelope helpers ─────────────────────────────────────────────────

fn payload<'a>(tag: &str, raw: &'a Value) -> Result<&'a Value, CodecError> {
    raw.as_object()
        .and_then(|object| object.get(tag))
        .ok_or_else(|| CodecError::Unrecognized { tag: tag.to_owned() })
}

/// Wrap `value` in a `{ tag: value }` envelope.
pub fn tagged(tag: &str, value: Value) -> Value {
    let mut envelope = Map::with_capacity(1);
    envelope.insert(tag.to_owned(), value);
    Value::Object(envelope)
}

fn decode<'a, T: Deserialize<'a>>(tag: &str, payload: &'a Value) -> Result<T, CodecError> {
    T::deserialize(payload).map_err(|e| CodecError::Malformed {
        tag: tag.to_owned(),
        message: e.to_string(),
    })
}

fn to_value<T: serde::Serialize>(tag: &str, value: &T) -> Result<Value, CodecError> {
    serde_json::to_value(value).map_err(|e| CodecError::Encode {
        tag: tag.to_owned(),
        message: e.to_string(),
    })
}

fn validated<T: Identity>(tag: &str, value: T) -> Result<T, CodecError> {
    value.validate().map_err(|message| CodecError::Invalid {
        tag: tag.to_owned(),
        message,
    })?;
    Ok(value)
}

// ── ListCodec ────────────────────────────────────────────────────────

/// `{ "<Tag>List": [entity, ...] }` ⇄ keyed collection.
pub struct ListCodec<E> {
    tag: String,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> ListCodec<E> {
    pub fn new() -> Self {
        Self {
            tag: format!("{}List", E::TAG),
            _entity: PhantomData,
        }
    }
}

impl<E: Entity> Default for ListCodec<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity> Codec for ListCodec<E> {
    type Output = Collection<E>;

    fn tag(&self) -> &str {
        &self.tag
    }

    fn safe_parse(&self, raw: &Value) -> Result<Collection<E>, CodecError> {
        let items: Vec<E> = decode(&self.tag, payload(&self.tag, raw)?)?;
        items
            .into_iter()
            .map(|item| validated(&self.tag, item).map(|item| (item.key(), item)))
            .collect()
    }

    fn encode(&self, value: &Collection<E>) -> Result<Value, CodecError> {
        let items = value
            .values()
            .map(|item| to_value(&self.tag, item))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tagged(&self.tag, Value::Array(items)))
    }
}

// ── ItemCodec ────────────────────────────────────────────────────────

/// `{ "<Tag>": value }` ⇄ a single validated value.
pub struct ItemCodec<T> {
    tag: String,
    _value: PhantomData<fn() -> T>,
}

impl<T: Identity> ItemCodec<T> {
    pub fn with_tag(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            _value: PhantomData,
        }
    }
}

impl<E: Entity> ItemCodec<E> {
    /// Outbound create/update: `<Tag>Set`.
    pub fn set() -> Self {
        Self::with_tag(format!("{}Set", E::TAG))
    }

    /// Inbound upsert: `<Tag>Detail`.
    pub fn detail() -> Self {
        Self::with_tag(format!("{}Detail", E::TAG))
    }
}

impl<T: Identity> Codec for ItemCodec<T> {
    type Output = T;

    fn tag(&self) -> &str {
        &self.tag
    }

    fn safe_parse(&self, raw: &Value) -> Result<T, CodecError> {
        let value = decode(&self.tag, payload(&self.tag, raw)?)?;
        validated(&self.tag, value)
    }

    fn encode(&self, value: &T) -> Result<Value, CodecError> {
        Ok(tagged(&self.tag, to_value(&self.tag, value)?))
    }
}

// ── KeyCodec ─────────────────────────────────────────────────────────

/// `{ "<Tag>Remove": "<uuid>" }` ⇄ the entity key.
#[derive(Clone)]
pub struct KeyCodec {
    tag: String,
}

impl KeyCodec {
    pub fn with_tag(tag: impl Into<String>) -> Self {
        Self { tag: tag.into() }
    }

    /// Outbound delete request: `<Tag>Remove`.
    pub fn remove<E: Entity>() -> Self {
        Self::with_tag(format!("{}Remove", E::TAG))
    }

    /// Inbound delete notification: `<Tag>Removed`.
    pub fn removed<E: Entity>() -> Self {
        Self::with_tag(format!("{}Removed", E::TAG))
    }
}

impl Codec for KeyCodec {
    type Output = Uuid;

    fn tag(&self) -> &str {
        &self.tag
    }

    fn safe_parse(&self, raw: &Value) -> Result<Uuid, CodecError> {
        decode(&self.tag, payload(&self.tag, raw)?)
    }

    fn encode(&self, value: &Uuid) -> Result<Value, CodecError> {
        Ok(tagged(&self.tag, Value::String(value.to_string())))
    }
}

// ── NameCodec ────────────────────────────────────────────────────────

/// `{ "<Tag>": "<name>" }` ⇄ a non-empty name.
#[derive(Clone)]
pub struct NameCodec {
    tag: String,
}

impl NameCodec {
    pub fn with_tag(tag: impl Into<String>) -> Self {
        Self { tag: tag.into() }
    }
}

impl Codec for NameCodec {
    type Output = String;

    fn tag(&self) -> &str {
        &self.tag
    }

    fn safe_parse(&self, raw: &Value) -> Result<String, CodecError> {
        let name: String = decode(&self.tag, payload(&self.tag, raw)?)?;
        if name.is_empty() {
            return Err(CodecError::Invalid {
                tag: self.tag.clone(),
                message: "name is required".into(),
            });
        }
        Ok(name)
    }

    fn encode(&self, value: &String) -> Result<Value, CodecError> {
        Ok(tagged(&self.tag, Value::String(value.clone())))
    }
}

impl<T> fmt::Debug for ItemCodec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ItemCodec").field("tag", &self.tag).finish()
    }
}

impl<E> fmt::Debug for ListCodec<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListCodec").field("tag", &self.tag).finish()
    }
}

impl fmt::Debug for KeyCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyCodec").field("tag", &self.tag).finish()
    }
}

impl fmt::Debug for NameCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NameCodec").field("tag", &self.tag).finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::model::Location;

    const LOBBY: &str = "6f1c0d2e-8a4b-4c57-9f1a-2b3c4d5e6f70";
    const ATRIUM: &str = "0b7e2a51-3c44-4d0e-8f6a-9e1d2c3b4a50";

    #[test]
    fn list_decodes_into_keyed_collection_and_back() {
        let raw = json!({ "LocationList": [
            { "uuid": LOBBY, "name": "Lobby" },
            { "uuid": ATRIUM, "name": "Atrium" },
        ]});

        let codec = ListCodec::<Location>::new();
        let decoded = codec.safe_parse(&raw).unwrap();
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[&Uuid::parse_str(LOBBY).unwrap()].name, "Lobby");
        // Wire order is preserved.
        assert_eq!(decoded.keys().next().unwrap().to_string(), LOBBY);

        assert_eq!(codec.encode(&decoded).unwrap(), raw);
    }

    #[test]
    fn other_tags_are_unrecognized() {
        let raw = json!({ "RoomList": [] });
        let err = ListCodec::<Location>::new().safe_parse(&raw).unwrap_err();
        assert!(err.is_unrecognized());

        let err = ItemCodec::<Location>::detail().safe_parse(&json!("plain")).unwrap_err();
        assert!(err.is_unrecognized());
    }

    #[test]
    fn wrong_shape_is_malformed() {
        let raw = json!({ "LocationDetail": { "uuid": "not-a-uuid", "name": "Lobby" } });
        let err = ItemCodec::<Location>::detail().safe_parse(&raw).unwrap_err();
        assert!(matches!(err, CodecError::Malformed { ref tag, .. } if tag == "LocationDetail"));
    }

    #[test]
    fn failed_validation_is_invalid() {
        let raw = json!({ "LocationDetail": { "uuid": LOBBY, "name": "" } });
        let err = ItemCodec::<Location>::detail().safe_parse(&raw).unwrap_err();
        assert!(matches!(err, CodecError::Invalid { .. }));
    }

    #[test]
    fn set_envelope_wraps_entity() {
        let location = Location {
            uuid: Uuid::parse_str(LOBBY).unwrap(),
            name: "Lobby".into(),
        };
        let encoded = ItemCodec::<Location>::set().encode(&location).unwrap();
        assert_eq!(encoded, json!({ "LocationSet": { "uuid": LOBBY, "name": "Lobby" } }));
    }

    #[test]
    fn key_codecs_round_trip() {
        let removed = KeyCodec::removed::<Location>();
        let raw = json!({ "LocationRemoved": LOBBY });
        let key = removed.safe_parse(&raw).unwrap();
        assert_eq!(key.to_string(), LOBBY);
        assert_eq!(removed.encode(&key).unwrap(), raw);

        assert_eq!(KeyCodec::remove::<Location>().tag(), "LocationRemove");
        assert!(removed.safe_parse(&json!({ "LocationRemoved": 7 })).is_err());
    }

    #[test]
    fn name_codec_requires_a_name() {
        let codec = NameCodec::with_tag("Restore");
        assert_eq!(codec.encode(&"nightly".to_owned()).unwrap(), json!({ "Restore": "nightly" }));
        assert_eq!(codec.safe_parse(&json!({ "Restore": "nightly" })).unwrap(), "nightly");
        assert!(matches!(
            codec.safe_parse(&json!({ "Restore": "" })),
            Err(CodecError::Invalid { .. })
        ));
        assert!(codec.safe_parse(&json!({ "Backup": "nightly" })).unwrap_err().is_unrecognized());
    }
}
