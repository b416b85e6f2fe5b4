//! WhatsApp Business Cloud API channel.
//!
//! Inbound: webhook payloads from Meta are normalized into a single
//! [`InboundMessage`] per delivery (the first message of the first change of
//! the first entry; everything else in the envelope is status noise).
//! Outbound: replies are POSTed to the Graph API message-send endpoint, with
//! one payload shape per media kind.

use crate::config::Config;
use crate::util::truncate_with_ellipsis;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

/// Discriminant for every message variant the Cloud API can deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Text,
    Image,
    Audio,
    Document,
    Sticker,
    Location,
    Contacts,
    Unknown,
}

/// Media bytes resolved for an attachment.
///
/// The three states are deliberately distinct: "nobody asked yet" is not the
/// same thing as "we asked and the fetch failed", and neither is an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaContent {
    /// Fetch was not attempted for this attachment.
    NotFetched,
    /// Fetch was attempted and failed; the pipeline continues without bytes.
    Unavailable,
    /// Fetched bytes, base64-encoded for transport.
    Base64(String),
}

/// Reference to a media object hosted by the Cloud API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRef {
    /// Provider-assigned media id; empty when the webhook omitted it.
    pub id: String,
    pub mime_type: Option<String>,
    pub filename: Option<String>,
    pub caption: Option<String>,
    pub content: MediaContent,
}

impl MediaRef {
    fn new(media: Option<&Value>) -> Self {
        Self {
            id: media
                .and_then(|m| m.get("id"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            mime_type: media
                .and_then(|m| m.get("mime_type"))
                .and_then(Value::as_str)
                .map(ToString::to_string),
            filename: None,
            caption: None,
            content: MediaContent::NotFetched,
        }
    }
}

/// A shared location.
#[derive(Debug, Clone, PartialEq)]
pub struct Place {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub name: Option<String>,
    pub address: Option<String>,
}

/// Shared contact cards, reduced to what the reply pipeline needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactCards {
    /// Number of cards shared, including ones without a usable name.
    pub count: usize,
    /// Comma-joined display names, or the fixed "Sin nombres" sentinel.
    pub names: String,
}

/// Attachment payload, tagged by the owning message's kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Attachment {
    Sticker(MediaRef),
    Image(MediaRef),
    Audio(MediaRef),
    Document(MediaRef),
    Location(Place),
    Contacts(ContactCards),
}

impl Attachment {
    pub fn kind(&self) -> MessageKind {
        match self {
            Attachment::Sticker(_) => MessageKind::Sticker,
            Attachment::Image(_) => MessageKind::Image,
            Attachment::Audio(_) => MessageKind::Audio,
            Attachment::Document(_) => MessageKind::Document,
            Attachment::Location(_) => MessageKind::Location,
            Attachment::Contacts(_) => MessageKind::Contacts,
        }
    }

    pub fn media_ref(&self) -> Option<&MediaRef> {
        match self {
            Attachment::Sticker(m)
            | Attachment::Image(m)
            | Attachment::Audio(m)
            | Attachment::Document(m) => Some(m),
            Attachment::Location(_) | Attachment::Contacts(_) => None,
        }
    }

    pub fn media_ref_mut(&mut self) -> Option<&mut MediaRef> {
        match self {
            Attachment::Sticker(m)
            | Attachment::Image(m)
            | Attachment::Audio(m)
            | Attachment::Document(m) => Some(m),
            Attachment::Location(_) | Attachment::Contacts(_) => None,
        }
    }

    /// Whether the media fetcher should resolve bytes for this attachment
    /// before composing the reply. Audio is relayed by reference only.
    pub fn wants_media_fetch(&self) -> bool {
        match self {
            Attachment::Image(m) | Attachment::Document(m) | Attachment::Sticker(m) => {
                !m.id.is_empty()
            }
            Attachment::Audio(_) | Attachment::Location(_) | Attachment::Contacts(_) => false,
        }
    }
}

/// One normalized webhook message. Built once per delivery, never mutated
/// after media resolution, dropped when the request completes.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub sender: String,
    pub message_id: String,
    pub kind: MessageKind,
    pub display_text: String,
    pub attachment: Option<Attachment>,
}

/// Per-leg outcome of an outbound dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub text_sent: bool,
    pub media_sent: bool,
}

impl DispatchOutcome {
    pub fn all_sent(self) -> bool {
        self.text_sent && self.media_sent
    }
}

/// Media fetch failure reasons, kept distinct so callers can log precisely.
#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("media metadata response is missing the download URL")]
    MissingUrl,
    #[error("media endpoint returned HTTP {0}")]
    Status(reqwest::StatusCode),
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

/// Normalize a raw webhook delivery into at most one actionable message.
///
/// Descends `entry[0].changes[0].value.messages[0]`; any absent level means
/// the delivery carried no message (status callbacks, read receipts) and
/// yields `None`. Normalization is a pure function of the payload.
pub fn normalize(payload: &Value) -> Option<InboundMessage> {
    let message = payload
        .get("entry")?
        .get(0)?
        .get("changes")?
        .get(0)?
        .get("value")?
        .get("messages")?
        .get(0)?;

    let sender = message.get("from")?.as_str()?.to_string();
    let message_id = message.get("id")?.as_str()?.to_string();
    let declared_kind = message
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or("unknown");

    let (kind, display_text, attachment) = match declared_kind {
        "text" => {
            let body = message
                .get("text")
                .and_then(|t| t.get("body"))
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string();
            (MessageKind::Text, body, None)
        }
        "sticker" => {
            let media = MediaRef::new(message.get("sticker"));
            (
                MessageKind::Sticker,
                "📍 Usuario envió un sticker".to_string(),
                Some(Attachment::Sticker(media)),
            )
        }
        "image" => {
            let image = message.get("image");
            let mut media = MediaRef::new(image);
            media.caption = image
                .and_then(|i| i.get("caption"))
                .and_then(Value::as_str)
                .map(ToString::to_string);
            (
                MessageKind::Image,
                "📷 Usuario envió una imagen".to_string(),
                Some(Attachment::Image(media)),
            )
        }
        "audio" => {
            let media = MediaRef::new(message.get("audio"));
            (
                MessageKind::Audio,
                "🎵 Usuario envió un audio".to_string(),
                Some(Attachment::Audio(media)),
            )
        }
        "document" => {
            let document = message.get("document");
            let mut media = MediaRef::new(document);
            media.filename = Some(
                document
                    .and_then(|d| d.get("filename"))
                    .and_then(Value::as_str)
                    .unwrap_or("Archivo sin nombre")
                    .to_string(),
            );
            media.caption = document
                .and_then(|d| d.get("caption"))
                .and_then(Value::as_str)
                .map(ToString::to_string);
            (
                MessageKind::Document,
                "📄 Usuario envió un documento".to_string(),
                Some(Attachment::Document(media)),
            )
        }
        "location" => {
            let location = message.get("location");
            let field = |key: &str| location.and_then(|l| l.get(key));
            let place = Place {
                latitude: field("latitude").and_then(Value::as_f64),
                longitude: field("longitude").and_then(Value::as_f64),
                name: field("name")
                    .and_then(Value::as_str)
                    .filter(|s| !s.is_empty())
                    .map(ToString::to_string),
                address: field("address")
                    .and_then(Value::as_str)
                    .filter(|s| !s.is_empty())
                    .map(ToString::to_string),
            };
            (
                MessageKind::Location,
                "📍 Usuario compartió ubicación".to_string(),
                Some(Attachment::Location(place)),
            )
        }
        "contacts" => {
            let cards = message
                .get("contacts")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            let count = cards.len();
            let joined: Vec<String> = cards
                .iter()
                .filter_map(|card| {
                    let name = card.get("name")?;
                    let first = name
                        .get("first_name")
                        .and_then(Value::as_str)
                        .unwrap_or("");
                    let last = name.get("last_name").and_then(Value::as_str).unwrap_or("");
                    let full = format!("{first} {last}").trim().to_string();
                    (!full.is_empty()).then_some(full)
                })
                .collect();
            let names = if joined.is_empty() {
                "Sin nombres".to_string()
            } else {
                joined.join(", ")
            };
            (
                MessageKind::Contacts,
                format!("👤 Usuario compartió {count} contacto(s)"),
                Some(Attachment::Contacts(ContactCards { count, names })),
            )
        }
        other => (
            MessageKind::Unknown,
            format!("❓ Usuario envió un mensaje de tipo: {other}"),
            None,
        ),
    };

    Some(InboundMessage {
        sender,
        message_id,
        kind,
        display_text,
        attachment,
    })
}

/// Build the text-message envelope for the send endpoint.
fn text_payload(to: &str, body: &str) -> Value {
    json!({
        "messaging_product": "whatsapp",
        "to": to,
        "type": "text",
        "text": { "body": body }
    })
}

/// Build the echo envelope that re-sends the original attachment, or `None`
/// when the kind has no media leg (contacts) or the media id is missing.
fn echo_payload(to: &str, attachment: &Attachment, reply_text: &str) -> Option<Value> {
    match attachment {
        Attachment::Sticker(media) => {
            if media.id.is_empty() {
                return None;
            }
            Some(json!({
                "messaging_product": "whatsapp",
                "to": to,
                "type": "sticker",
                "sticker": { "id": media.id }
            }))
        }
        Attachment::Image(media) => {
            if media.id.is_empty() {
                return None;
            }
            let caption = truncate_with_ellipsis(reply_text, 100);
            Some(json!({
                "messaging_product": "whatsapp",
                "to": to,
                "type": "image",
                "image": { "id": media.id, "caption": caption }
            }))
        }
        Attachment::Audio(media) => {
            if media.id.is_empty() {
                return None;
            }
            Some(json!({
                "messaging_product": "whatsapp",
                "to": to,
                "type": "audio",
                "audio": { "id": media.id }
            }))
        }
        Attachment::Document(media) => {
            if media.id.is_empty() {
                return None;
            }
            let filename = media.filename.as_deref().unwrap_or("documento");
            Some(json!({
                "messaging_product": "whatsapp",
                "to": to,
                "type": "document",
                "document": {
                    "id": media.id,
                    "caption": format!("Recibí este documento: {filename}")
                }
            }))
        }
        Attachment::Location(place) => {
            let mut location = json!({
                "latitude": place.latitude.unwrap_or(0.0),
                "longitude": place.longitude.unwrap_or(0.0),
            });
            if let Some(name) = &place.name {
                location["name"] = json!(name);
            }
            if let Some(address) = &place.address {
                location["address"] = json!(address);
            }
            Some(json!({
                "messaging_product": "whatsapp",
                "to": to,
                "type": "location",
                "location": location
            }))
        }
        Attachment::Contacts(_) => None,
    }
}

#[derive(Debug, Deserialize)]
struct MediaMetadata {
    url: Option<String>,
}

/// WhatsApp Cloud API client: media fetcher plus outbound dispatcher.
pub struct WhatsAppChannel {
    config: Arc<Config>,
    client: reqwest::Client,
}

impl WhatsAppChannel {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    /// Resolve a media id to base64-encoded bytes.
    ///
    /// Two sequential bearer-authenticated calls: the metadata endpoint hands
    /// back a short-lived download URL, the URL hands back raw bytes. Errors
    /// are returned, never retried; the caller decides how to degrade.
    pub async fn download_media(&self, media_id: &str) -> Result<String, MediaError> {
        let metadata_response = self
            .client
            .get(self.config.media_url(media_id))
            .bearer_auth(&self.config.whatsapp_token)
            .send()
            .await?;
        if !metadata_response.status().is_success() {
            return Err(MediaError::Status(metadata_response.status()));
        }

        let metadata: MediaMetadata = metadata_response.json().await?;
        let url = metadata.url.ok_or(MediaError::MissingUrl)?;

        let file_response = self
            .client
            .get(&url)
            .bearer_auth(&self.config.whatsapp_token)
            .send()
            .await?;
        if !file_response.status().is_success() {
            return Err(MediaError::Status(file_response.status()));
        }

        let bytes = file_response.bytes().await?;
        let encoded = STANDARD.encode(&bytes);
        tracing::info!(media_id, chars = encoded.len(), "media downloaded");
        Ok(encoded)
    }

    /// Send a plain text message.
    pub async fn send_text(&self, to: &str, body: &str) -> anyhow::Result<()> {
        self.post_message(&text_payload(to, body)).await
    }

    /// Send the reply text and, when the attachment has a media leg, echo the
    /// original attachment back. Legs are independent: a failed leg is logged
    /// and flagged, never blocks the other.
    pub async fn dispatch(
        &self,
        to: &str,
        reply_text: &str,
        attachment: Option<&Attachment>,
    ) -> DispatchOutcome {
        let text_sent = match self.send_text(to, reply_text).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("failed to send text reply to {to}: {e:#}");
                false
            }
        };

        let media_sent = match attachment.and_then(|a| echo_payload(to, a, reply_text)) {
            None => true,
            Some(payload) => match self.post_message(&payload).await {
                Ok(()) => true,
                Err(e) => {
                    tracing::error!("failed to echo attachment back to {to}: {e:#}");
                    false
                }
            },
        };

        DispatchOutcome {
            text_sent,
            media_sent,
        }
    }

    /// Check that the Graph API accepts our credentials for the configured
    /// phone number.
    pub async fn health_check(&self) -> bool {
        self.client
            .get(format!(
                "{}/{}",
                self.config.graph_base_url, self.config.phone_number_id
            ))
            .bearer_auth(&self.config.whatsapp_token)
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    async fn post_message(&self, payload: &Value) -> anyhow::Result<()> {
        let response = self
            .client
            .post(self.config.messages_url())
            .bearer_auth(&self.config.whatsapp_token)
            .json(payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(crate::providers::api_error("WhatsApp", response).await);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wrap(message: Value) -> Value {
        json!({
            "object": "whatsapp_business_account",
            "entry": [{
                "id": "entry-1",
                "changes": [{
                    "value": {
                        "messaging_product": "whatsapp",
                        "metadata": { "phone_number_id": "123456789" },
                        "messages": [message]
                    },
                    "field": "messages"
                }]
            }]
        })
    }

    fn text_message(body: &str) -> Value {
        json!({
            "from": "5215550001111",
            "id": "wamid.text",
            "timestamp": "1699999999",
            "type": "text",
            "text": { "body": body }
        })
    }

    // ── normalization ─────────────────────────────────────────

    #[test]
    fn normalize_text_body_verbatim() {
        let msg = normalize(&wrap(text_message("Hola"))).unwrap();
        assert_eq!(msg.kind, MessageKind::Text);
        assert_eq!(msg.display_text, "Hola");
        assert_eq!(msg.sender, "5215550001111");
        assert_eq!(msg.message_id, "wamid.text");
        assert!(msg.attachment.is_none());
    }

    #[test]
    fn normalize_text_missing_body_is_empty() {
        let msg = normalize(&wrap(json!({
            "from": "111", "id": "wamid.x", "type": "text", "text": {}
        })))
        .unwrap();
        assert_eq!(msg.display_text, "");
    }

    #[test]
    fn normalize_preserves_whitespace_and_unicode() {
        let msg = normalize(&wrap(text_message("  Hola 👋 mundo  "))).unwrap();
        assert_eq!(msg.display_text, "  Hola 👋 mundo  ");
    }

    #[test]
    fn normalize_is_idempotent() {
        let payload = wrap(json!({
            "from": "111", "id": "wamid.img", "type": "image",
            "image": { "id": "img-1", "mime_type": "image/jpeg", "caption": "mira" }
        }));
        let first = normalize(&payload).unwrap();
        let second = normalize(&payload).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn normalize_missing_levels_yield_none() {
        for payload in [
            json!({}),
            json!({ "entry": [] }),
            json!({ "entry": "nope" }),
            json!({ "entry": [{ "id": "1" }] }),
            json!({ "entry": [{ "changes": [] }] }),
            json!({ "entry": [{ "changes": [{ "field": "messages" }] }] }),
            json!({ "entry": [{ "changes": [{ "value": {} }] }] }),
            json!({ "entry": [{ "changes": [{ "value": { "messages": [] } }] }] }),
            json!({ "entry": [{ "changes": [{ "value": { "messages": "x" } }] }] }),
        ] {
            assert!(normalize(&payload).is_none(), "payload: {payload}");
        }
    }

    #[test]
    fn normalize_status_update_yields_none() {
        let payload = json!({
            "entry": [{
                "changes": [{
                    "value": {
                        "statuses": [{ "id": "wamid.x", "status": "delivered" }]
                    }
                }]
            }]
        });
        assert!(normalize(&payload).is_none());
    }

    #[test]
    fn normalize_missing_sender_or_id_yields_none() {
        assert!(normalize(&wrap(json!({
            "id": "wamid.x", "type": "text", "text": { "body": "hola" }
        })))
        .is_none());
        assert!(normalize(&wrap(json!({
            "from": "111", "type": "text", "text": { "body": "hola" }
        })))
        .is_none());
    }

    #[test]
    fn normalize_sticker() {
        let msg = normalize(&wrap(json!({
            "from": "111", "id": "wamid.stk", "type": "sticker",
            "sticker": { "id": "stk-1", "mime_type": "image/webp", "animated": false }
        })))
        .unwrap();
        assert_eq!(msg.kind, MessageKind::Sticker);
        assert_eq!(msg.display_text, "📍 Usuario envió un sticker");
        let Some(Attachment::Sticker(media)) = &msg.attachment else {
            panic!("expected sticker attachment");
        };
        assert_eq!(media.id, "stk-1");
        assert_eq!(media.mime_type.as_deref(), Some("image/webp"));
        assert_eq!(media.content, MediaContent::NotFetched);
    }

    #[test]
    fn normalize_image_with_caption() {
        let msg = normalize(&wrap(json!({
            "from": "111", "id": "wamid.img", "type": "image",
            "image": { "id": "img-1", "mime_type": "image/jpeg", "caption": "una foto" }
        })))
        .unwrap();
        assert_eq!(msg.display_text, "📷 Usuario envió una imagen");
        let Some(Attachment::Image(media)) = &msg.attachment else {
            panic!("expected image attachment");
        };
        assert_eq!(media.caption.as_deref(), Some("una foto"));
    }

    #[test]
    fn normalize_audio() {
        let msg = normalize(&wrap(json!({
            "from": "111", "id": "wamid.aud", "type": "audio",
            "audio": { "id": "aud-1", "mime_type": "audio/ogg" }
        })))
        .unwrap();
        assert_eq!(msg.display_text, "🎵 Usuario envió un audio");
        assert_eq!(msg.attachment.as_ref().unwrap().kind(), MessageKind::Audio);
    }

    #[test]
    fn normalize_document_defaults_filename() {
        let msg = normalize(&wrap(json!({
            "from": "111", "id": "wamid.doc", "type": "document",
            "document": { "id": "doc-1", "mime_type": "application/pdf" }
        })))
        .unwrap();
        assert_eq!(msg.display_text, "📄 Usuario envió un documento");
        let Some(Attachment::Document(media)) = &msg.attachment else {
            panic!("expected document attachment");
        };
        assert_eq!(media.filename.as_deref(), Some("Archivo sin nombre"));
    }

    #[test]
    fn normalize_location_passthrough_and_missing_coords() {
        let msg = normalize(&wrap(json!({
            "from": "111", "id": "wamid.loc", "type": "location",
            "location": {
                "latitude": 40.7128, "longitude": -74.0060,
                "name": "NYC", "address": "Manhattan"
            }
        })))
        .unwrap();
        assert_eq!(msg.display_text, "📍 Usuario compartió ubicación");
        let Some(Attachment::Location(place)) = &msg.attachment else {
            panic!("expected location attachment");
        };
        assert_eq!(place.latitude, Some(40.7128));
        assert_eq!(place.longitude, Some(-74.0060));
        assert_eq!(place.name.as_deref(), Some("NYC"));

        let bare = normalize(&wrap(json!({
            "from": "111", "id": "wamid.loc2", "type": "location", "location": {}
        })))
        .unwrap();
        let Some(Attachment::Location(place)) = &bare.attachment else {
            panic!("expected location attachment");
        };
        assert_eq!(place.latitude, None);
        assert_eq!(place.longitude, None);
        assert_eq!(place.name, None);
    }

    #[test]
    fn normalize_contacts_joins_names() {
        let msg = normalize(&wrap(json!({
            "from": "111", "id": "wamid.con", "type": "contacts",
            "contacts": [
                { "name": { "first_name": "Ana", "last_name": "Lopez" } },
                { "name": { "first_name": "", "last_name": "" } }
            ]
        })))
        .unwrap();
        assert_eq!(msg.display_text, "👤 Usuario compartió 2 contacto(s)");
        let Some(Attachment::Contacts(cards)) = &msg.attachment else {
            panic!("expected contacts attachment");
        };
        assert_eq!(cards.count, 2);
        assert_eq!(cards.names, "Ana Lopez");
    }

    #[test]
    fn normalize_contacts_all_empty_uses_sentinel() {
        let msg = normalize(&wrap(json!({
            "from": "111", "id": "wamid.con", "type": "contacts",
            "contacts": [
                { "name": { "first_name": "", "last_name": "" } },
                {}
            ]
        })))
        .unwrap();
        let Some(Attachment::Contacts(cards)) = &msg.attachment else {
            panic!("expected contacts attachment");
        };
        assert_eq!(cards.names, "Sin nombres");
        assert_eq!(cards.count, 2);
    }

    #[test]
    fn normalize_contacts_first_name_only() {
        let msg = normalize(&wrap(json!({
            "from": "111", "id": "wamid.con", "type": "contacts",
            "contacts": [{ "name": { "first_name": "Ana" } }]
        })))
        .unwrap();
        let Some(Attachment::Contacts(cards)) = &msg.attachment else {
            panic!("expected contacts attachment");
        };
        assert_eq!(cards.names, "Ana");
    }

    #[test]
    fn normalize_unknown_kind_embeds_literal_type() {
        let msg = normalize(&wrap(json!({
            "from": "111", "id": "wamid.rx", "type": "reaction",
            "reaction": { "message_id": "wamid.x", "emoji": "👍" }
        })))
        .unwrap();
        assert_eq!(msg.kind, MessageKind::Unknown);
        assert_eq!(
            msg.display_text,
            "❓ Usuario envió un mensaje de tipo: reaction"
        );
        assert!(msg.attachment.is_none());
    }

    // ── fetch gating ──────────────────────────────────────────

    #[test]
    fn fetch_wanted_for_image_document_sticker_only() {
        let media = MediaRef {
            id: "m-1".into(),
            mime_type: None,
            filename: None,
            caption: None,
            content: MediaContent::NotFetched,
        };
        assert!(Attachment::Image(media.clone()).wants_media_fetch());
        assert!(Attachment::Document(media.clone()).wants_media_fetch());
        assert!(Attachment::Sticker(media.clone()).wants_media_fetch());
        assert!(!Attachment::Audio(media).wants_media_fetch());
        assert!(!Attachment::Contacts(ContactCards {
            count: 0,
            names: "Sin nombres".into()
        })
        .wants_media_fetch());
    }

    #[test]
    fn fetch_not_wanted_without_media_id() {
        let media = MediaRef {
            id: String::new(),
            mime_type: None,
            filename: None,
            caption: None,
            content: MediaContent::NotFetched,
        };
        assert!(!Attachment::Image(media).wants_media_fetch());
    }

    // ── outbound payload shaping ──────────────────────────────

    fn media_ref(id: &str) -> MediaRef {
        MediaRef {
            id: id.into(),
            mime_type: None,
            filename: None,
            caption: None,
            content: MediaContent::NotFetched,
        }
    }

    #[test]
    fn text_payload_shape() {
        let payload = text_payload("5215550001111", "Hola de vuelta");
        assert_eq!(
            payload,
            json!({
                "messaging_product": "whatsapp",
                "to": "5215550001111",
                "type": "text",
                "text": { "body": "Hola de vuelta" }
            })
        );
    }

    #[test]
    fn sticker_echo_has_no_caption() {
        let payload =
            echo_payload("111", &Attachment::Sticker(media_ref("stk-1")), "reply").unwrap();
        assert_eq!(payload["type"], "sticker");
        assert_eq!(payload["sticker"]["id"], "stk-1");
        assert!(payload["sticker"].get("caption").is_none());
    }

    #[test]
    fn image_echo_caption_truncated_at_100_chars() {
        let reply = "r".repeat(150);
        let payload = echo_payload("111", &Attachment::Image(media_ref("img-1")), &reply).unwrap();
        let caption = payload["image"]["caption"].as_str().unwrap();
        assert_eq!(caption.len(), 103);
        assert_eq!(&caption[..100], &reply[..100]);
        assert!(caption.ends_with("..."));
    }

    #[test]
    fn image_echo_short_reply_kept_whole() {
        let payload =
            echo_payload("111", &Attachment::Image(media_ref("img-1")), "corto").unwrap();
        assert_eq!(payload["image"]["caption"], "corto");
    }

    #[test]
    fn audio_echo_by_reference_only() {
        let payload = echo_payload("111", &Attachment::Audio(media_ref("aud-1")), "reply").unwrap();
        assert_eq!(payload["type"], "audio");
        assert_eq!(payload["audio"], json!({ "id": "aud-1" }));
    }

    #[test]
    fn document_echo_caption_includes_filename() {
        let mut media = media_ref("doc-1");
        media.filename = Some("informe.pdf".into());
        let payload = echo_payload("111", &Attachment::Document(media), "reply").unwrap();
        assert_eq!(
            payload["document"]["caption"],
            "Recibí este documento: informe.pdf"
        );
    }

    #[test]
    fn document_echo_caption_falls_back_on_placeholder() {
        let payload =
            echo_payload("111", &Attachment::Document(media_ref("doc-1")), "reply").unwrap();
        assert_eq!(
            payload["document"]["caption"],
            "Recibí este documento: documento"
        );
    }

    #[test]
    fn location_echo_defaults_missing_coords_to_zero() {
        let place = Place {
            latitude: None,
            longitude: None,
            name: None,
            address: None,
        };
        let payload = echo_payload("111", &Attachment::Location(place), "reply").unwrap();
        assert_eq!(payload["location"]["latitude"], 0.0);
        assert_eq!(payload["location"]["longitude"], 0.0);
        assert!(payload["location"].get("name").is_none());
        assert!(payload["location"].get("address").is_none());
    }

    #[test]
    fn location_echo_carries_name_and_address() {
        let place = Place {
            latitude: Some(40.7128),
            longitude: Some(-74.0060),
            name: Some("NYC".into()),
            address: Some("Manhattan".into()),
        };
        let payload = echo_payload("111", &Attachment::Location(place), "reply").unwrap();
        assert_eq!(payload["location"]["latitude"], 40.7128);
        assert_eq!(payload["location"]["name"], "NYC");
        assert_eq!(payload["location"]["address"], "Manhattan");
    }

    #[test]
    fn contacts_have_no_media_leg() {
        let attachment = Attachment::Contacts(ContactCards {
            count: 1,
            names: "Ana".into(),
        });
        assert!(echo_payload("111", &attachment, "reply").is_none());
    }

    #[test]
    fn empty_media_id_has_no_media_leg() {
        assert!(echo_payload("111", &Attachment::Image(media_ref("")), "reply").is_none());
        assert!(echo_payload("111", &Attachment::Sticker(media_ref("")), "reply").is_none());
    }
}
