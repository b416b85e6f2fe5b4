pub mod whatsapp;

pub use whatsapp::{
    Attachment, DispatchOutcome, InboundMessage, MediaContent, MediaError, MessageKind,
    WhatsAppChannel,
};
