//! OpenAI Responses API provider.
//!
//! The composer has exactly two shapes: a structured multi-part input when an
//! image attachment came with fetched bytes (vision path), and a single
//! enriched text prompt for everything else. Whatever goes wrong downstream,
//! `respond` always hands back user-safe Spanish text.

use crate::channels::whatsapp::{Attachment, MediaContent};
use crate::config::Config;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const VISION_SYSTEM_PROMPT: &str = "Eres un asistente útil de WhatsApp llamado WaChat Bot. \
    Mantén las respuestas concisas y amigables. Puedes analizar imágenes, documentos, \
    ubicaciones y contactos que te envíen. Siempre responde en español y de manera conversacional.";

const TEXT_SYSTEM_PREAMBLE: &str = "Instrucciones del sistema: Eres un asistente útil de \
    WhatsApp llamado WaChat Bot. Mantén las respuestas concisas y amigables. \
    Siempre responde en español.";

const FALLBACK_REPLY: &str = "Lo siento, tengo problemas para procesar tu solicitud ahora. \
    Por favor intenta de nuevo más tarde.";

#[derive(Debug, Serialize)]
struct ResponsesRequest {
    model: String,
    input: ResponseInput,
}

/// Input for the Responses API: either a bare prompt string or a list of
/// role-tagged items.
#[derive(Debug, Serialize, PartialEq)]
#[serde(untagged)]
pub enum ResponseInput {
    Text(String),
    Items(Vec<InputItem>),
}

#[derive(Debug, Serialize, PartialEq)]
pub struct InputItem {
    role: String,
    content: InputContent,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(untagged)]
enum InputContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(tag = "type")]
enum ContentPart {
    #[serde(rename = "input_image")]
    Image { image_url: String },
}

#[derive(Debug, Deserialize)]
struct ResponsesReply {
    #[serde(default)]
    output: Vec<OutputItem>,
}

#[derive(Debug, Deserialize)]
struct OutputItem {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    content: Vec<OutputPart>,
}

#[derive(Debug, Deserialize)]
struct OutputPart {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    text: String,
}

impl ResponsesReply {
    /// Concatenated `output_text` parts across message output items.
    fn output_text(&self) -> Option<String> {
        let mut text = String::new();
        for item in &self.output {
            if item.kind != "message" {
                continue;
            }
            for part in &item.content {
                if part.kind == "output_text" {
                    text.push_str(&part.text);
                }
            }
        }
        (!text.is_empty()).then_some(text)
    }
}

fn format_coordinate(value: Option<f64>) -> String {
    value.map_or_else(|| "N/A".to_string(), |v| v.to_string())
}

/// Build the provider input for a normalized message.
///
/// Branch A (image with fetched bytes) produces the structured vision input;
/// Branch B produces one enriched prompt string. An image whose fetch failed
/// or was skipped falls through to Branch B with no enrichment.
pub fn build_input(display_text: &str, attachment: Option<&Attachment>) -> ResponseInput {
    if let Some(Attachment::Image(media)) = attachment {
        if let MediaContent::Base64(encoded) = &media.content {
            return ResponseInput::Items(vec![
                InputItem {
                    role: "system".to_string(),
                    content: InputContent::Text(VISION_SYSTEM_PROMPT.to_string()),
                },
                InputItem {
                    role: "user".to_string(),
                    content: InputContent::Text(display_text.to_string()),
                },
                InputItem {
                    role: "user".to_string(),
                    content: InputContent::Parts(vec![ContentPart::Image {
                        image_url: format!("data:image/jpeg;base64,{encoded}"),
                    }]),
                },
            ]);
        }
    }

    let mut prompt = format!("{TEXT_SYSTEM_PREAMBLE}\n\nMensaje del usuario: {display_text}");
    match attachment {
        Some(Attachment::Location(place)) => {
            prompt.push_str(&format!(
                "\n\nDetalles de ubicación: Latitud {}, Longitud {}",
                format_coordinate(place.latitude),
                format_coordinate(place.longitude)
            ));
            if let Some(name) = &place.name {
                prompt.push_str(&format!(", Lugar: {name}"));
            }
            if let Some(address) = &place.address {
                prompt.push_str(&format!(", Dirección: {address}"));
            }
        }
        Some(Attachment::Contacts(cards)) => {
            prompt.push_str(&format!(
                "\n\nEl usuario compartió {} contacto(s): {}",
                cards.count, cards.names
            ));
        }
        Some(Attachment::Document(media)) => {
            prompt.push_str(&format!(
                "\n\nDocumento enviado: {}, Tipo: {}",
                media.filename.as_deref().unwrap_or("Nombre no disponible"),
                media.mime_type.as_deref().unwrap_or("N/A")
            ));
            if let Some(caption) = &media.caption {
                prompt.push_str(&format!(", Descripción: {caption}"));
            }
        }
        Some(Attachment::Sticker(_)) => {
            prompt.push_str("\n\nEl usuario envió un sticker (emoji/imagen expresiva)");
        }
        Some(Attachment::Audio(_)) => {
            prompt.push_str("\n\nEl usuario envió un mensaje de audio/voz");
        }
        Some(Attachment::Image(_)) | None => {}
    }

    ResponseInput::Text(prompt)
}

/// Thin Responses API client bound to the injected config.
pub struct OpenAiProvider {
    config: Arc<Config>,
    client: Client,
}

impl OpenAiProvider {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }

    /// Generate a reply for the user. Never fails: any provider error is
    /// logged and mapped to the fixed apology text.
    pub async fn respond(&self, display_text: &str, attachment: Option<&Attachment>) -> String {
        match self.complete(build_input(display_text, attachment)).await {
            Ok(text) => text,
            Err(e) => {
                tracing::error!("OpenAI request failed: {e:#}");
                FALLBACK_REPLY.to_string()
            }
        }
    }

    async fn complete(&self, input: ResponseInput) -> anyhow::Result<String> {
        let request = ResponsesRequest {
            model: self.config.model.clone(),
            input,
        };

        let response = self
            .client
            .post(format!("{}/responses", self.config.openai_base_url))
            .bearer_auth(&self.config.openai_api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(super::api_error("OpenAI", response).await);
        }

        let reply: ResponsesReply = response.json().await?;
        let text = reply
            .output_text()
            .ok_or_else(|| anyhow::anyhow!("No response from OpenAI"))?;
        tracing::info!("OpenAI reply: {}", crate::util::truncate_with_ellipsis(&text, 80));
        Ok(text.trim().to_string())
    }
}
