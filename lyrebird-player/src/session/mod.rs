//! Remote generation session boundary
//!
//! The session itself (connection, protocol) is an external collaborator.
//! This module defines the two channels the engine sees:
//! - outbound [`SessionCommand`]s over tokio::mpsc (command-channel
//!   pattern: request → single handler)
//! - inbound [`WireMessage`]s, demultiplexed by [`router::MessageRouter`]

pub mod router;
pub mod stub;

use serde::{Deserialize, Serialize};

/// A prompt with its mixing weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightedPrompt {
    pub text: String,
    pub weight: f64,
}

/// Generation parameters forwarded to the session.
///
/// All fields optional: only set values are submitted, the session keeps
/// its own defaults for the rest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guidance: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bpm: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub density: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brightness: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mute_bass: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mute_drums: Option<bool>,
}

/// Outbound calls to the remote session.
///
/// The engine issues `Play`/`Pause`/`Stop` in lockstep with its own
/// state transitions and never accepts audio unless the corresponding
/// command has been sent.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    Connect,
    SetWeightedPrompts { prompts: Vec<WeightedPrompt> },
    SetMusicGenerationConfig { config: GenerationConfig },
    Play,
    Pause,
    Stop,
    ResetContext,
}

/// One inbound message from the session transport.
///
/// Exactly one of the optional fields is expected to be set per message;
/// the router treats anything else as an unrecognized shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WireMessage {
    pub setup_complete: Option<bool>,
    pub filtered_prompt: Option<FilteredPrompt>,
    pub server_content: Option<ServerContent>,
    pub error: Option<serde_json::Value>,
    pub close: Option<serde_json::Value>,
}

/// Notice that the session rejected a prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilteredPrompt {
    pub text: String,
    pub filtered_reason: String,
}

/// Generated audio payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    pub audio_chunks: Vec<AudioChunk>,
}

/// One base64-encoded PCM chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioChunk {
    pub data: String,
}

impl WireMessage {
    /// Convenience constructor for an audio message with a single chunk.
    pub fn audio(data: impl Into<String>) -> Self {
        Self {
            server_content: Some(ServerContent {
                audio_chunks: vec![AudioChunk { data: data.into() }],
            }),
            ..Default::default()
        }
    }

    /// Convenience constructor for the setup acknowledgement.
    pub fn setup_complete() -> Self {
        Self {
            setup_complete: Some(true),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_message_parses_setup_complete() {
        let msg: WireMessage = serde_json::from_str(r#"{"setupComplete": true}"#).unwrap();
        assert_eq!(msg.setup_complete, Some(true));
        assert!(msg.server_content.is_none());
    }

    #[test]
    fn test_wire_message_parses_filtered_prompt() {
        let msg: WireMessage = serde_json::from_str(
            r#"{"filteredPrompt": {"text": "loud noise", "filteredReason": "policy"}}"#,
        )
        .unwrap();

        let filtered = msg.filtered_prompt.unwrap();
        assert_eq!(filtered.text, "loud noise");
        assert_eq!(filtered.filtered_reason, "policy");
    }

    #[test]
    fn test_wire_message_parses_audio_chunks() {
        let msg: WireMessage = serde_json::from_str(
            r#"{"serverContent": {"audioChunks": [{"data": "AAAA"}, {"data": "BBBB"}]}}"#,
        )
        .unwrap();

        let content = msg.server_content.unwrap();
        assert_eq!(content.audio_chunks.len(), 2);
        assert_eq!(content.audio_chunks[0].data, "AAAA");
    }

    #[test]
    fn test_wire_message_unknown_shape_is_empty() {
        let msg: WireMessage = serde_json::from_str(r#"{"somethingElse": 42}"#).unwrap();
        assert!(msg.setup_complete.is_none());
        assert!(msg.filtered_prompt.is_none());
        assert!(msg.server_content.is_none());
        assert!(msg.error.is_none());
        assert!(msg.close.is_none());
    }

    #[test]
    fn test_generation_config_skips_unset_fields() {
        let config = GenerationConfig {
            bpm: Some(120),
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(json, r#"{"bpm":120}"#);
    }
}
