//! Wire messages of the live conversation endpoint.
//!
//! Outgoing messages are externally tagged JSON objects:
//!
//! ```text
//! {"setup": {"model": ..., "generationConfig": ..., "systemInstruction": ...}}
//! {"realtimeInput": {"audio": {"data": "<base64>", "mimeType": "audio/pcm;rate=16000"}}}
//! ```
//!
//! Inbound messages carry any of `setupComplete`, `serverContent` and
//! `goAway`. Unknown fields are ignored.

use serde::{Deserialize, Serialize};

use crate::chunk::EncodedAudioChunk;
use crate::config::{Language, SessionConfig};
use crate::VoiceSessionError;

/// Messages sent to the endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientMessage {
    /// Session handshake, always the first message.
    Setup(SetupMessage),
    /// A chunk of streamed microphone audio.
    RealtimeInput(RealtimeInput),
}

impl ClientMessage {
    /// Wraps an encoded chunk as realtime input.
    pub fn audio(chunk: EncodedAudioChunk) -> Self {
        Self::RealtimeInput(RealtimeInput {
            audio: Blob {
                data: chunk.data,
                mime_type: chunk.mime_type,
            },
        })
    }

    /// Serializes the message to JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`VoiceSessionError::Protocol`] if serialization fails.
    pub fn to_json(&self) -> Result<String, VoiceSessionError> {
        serde_json::to_string(self).map_err(|e| VoiceSessionError::Protocol(e.to_string()))
    }
}

/// The setup handshake.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupMessage {
    /// Conversational model to use.
    pub model: String,
    /// Output modality and voice.
    pub generation_config: GenerationConfig,
    /// Persona and reply language.
    pub system_instruction: Content,
}

impl SetupMessage {
    /// Builds the handshake for a session speaking `language`.
    pub fn new(config: &SessionConfig, language: Language) -> Self {
        Self {
            model: config.model.clone(),
            generation_config: GenerationConfig {
                response_modalities: vec!["AUDIO".to_string()],
                speech_config: SpeechConfig {
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig {
                            voice_name: config.voice_name.clone(),
                        },
                    },
                },
            },
            system_instruction: Content {
                parts: vec![TextPart {
                    text: config.system_instruction(language),
                }],
            },
        }
    }
}

/// Requested response format.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    /// Always `["AUDIO"]` for voice sessions.
    pub response_modalities: Vec<String>,
    /// Voice selection.
    pub speech_config: SpeechConfig,
}

/// Voice selection.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    /// Voice configuration.
    pub voice_config: VoiceConfig,
}

/// Voice configuration.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    /// A prebuilt voice.
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

/// A prebuilt voice by name.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    /// Voice name, e.g. `Kore`.
    pub voice_name: String,
}

/// Text content made of parts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Content {
    /// Text parts.
    pub parts: Vec<TextPart>,
}

/// A text part.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextPart {
    /// The text.
    pub text: String,
}

/// Realtime input payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RealtimeInput {
    /// Audio blob.
    pub audio: Blob,
}

/// Base64 data with its mime tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    /// Base64 text.
    pub data: String,
    /// Format tag, e.g. `audio/pcm;rate=24000`.
    #[serde(default)]
    pub mime_type: String,
}

/// A message received from the endpoint.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    /// Present when the endpoint acknowledged the handshake.
    #[serde(default)]
    pub setup_complete: Option<serde_json::Value>,
    /// Model output and turn signals.
    #[serde(default)]
    pub server_content: Option<ServerContent>,
    /// Notice that the connection will close soon.
    #[serde(default)]
    pub go_away: Option<GoAway>,
}

/// Model output and turn signals.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    /// Output of the current model turn.
    #[serde(default)]
    pub model_turn: Option<ModelTurn>,
    /// The user spoke over the model; playback must stop.
    #[serde(default)]
    pub interrupted: bool,
    /// The model finished its turn.
    #[serde(default)]
    pub turn_complete: bool,
}

/// Parts of a model turn.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ModelTurn {
    /// Output parts, in order.
    #[serde(default)]
    pub parts: Vec<Part>,
}

/// One output part. Only inline data is of interest here.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    /// Inline binary payload.
    #[serde(default)]
    pub inline_data: Option<Blob>,
}

/// Notice that the endpoint will close the connection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoAway {
    /// Remaining time, as reported by the endpoint.
    #[serde(default)]
    pub time_left: Option<String>,
}

impl ServerMessage {
    /// Parses a message from JSON text or bytes.
    ///
    /// # Errors
    ///
    /// Returns [`VoiceSessionError::Protocol`] if the payload is not a valid message.
    pub fn parse(payload: &[u8]) -> Result<Self, VoiceSessionError> {
        serde_json::from_slice(payload).map_err(|e| VoiceSessionError::Protocol(e.to_string()))
    }

    /// Returns `true` for the handshake acknowledgement.
    pub fn is_setup_complete(&self) -> bool {
        self.setup_complete.is_some()
    }

    /// Audio parts of the model turn, in order.
    pub fn audio_parts(&self) -> impl Iterator<Item = &Blob> {
        self.server_content
            .iter()
            .filter_map(|content| content.model_turn.as_ref())
            .flat_map(|turn| turn.parts.iter())
            .filter_map(|part| part.inline_data.as_ref())
            .filter(|blob| blob.mime_type.is_empty() || blob.mime_type.starts_with("audio/"))
    }

    /// Returns `true` if the endpoint signalled barge-in.
    pub fn is_interrupted(&self) -> bool {
        self.server_content
            .as_ref()
            .is_some_and(|content| content.interrupted)
    }

    /// Returns `true` if the model finished its turn.
    pub fn is_turn_complete(&self) -> bool {
        self.server_content
            .as_ref()
            .is_some_and(|content| content.turn_complete)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_setup_message_shape() {
        let config = SessionConfig::default().with_persona("Be brief.");
        let message = ClientMessage::Setup(SetupMessage::new(&config, Language::Burmese));
        let value: serde_json::Value = serde_json::from_str(&message.to_json().unwrap()).unwrap();

        assert_eq!(
            value,
            json!({
                "setup": {
                    "model": config.model,
                    "generationConfig": {
                        "responseModalities": ["AUDIO"],
                        "speechConfig": {
                            "voiceConfig": {"prebuiltVoiceConfig": {"voiceName": "Kore"}}
                        }
                    },
                    "systemInstruction": {
                        "parts": [{"text": "Be brief.\nThe user speaks Burmese. Please reply in Burmese."}]
                    }
                }
            })
        );
    }

    #[test]
    fn test_realtime_input_shape() {
        let chunk = EncodedAudioChunk {
            data: "AEA=".into(),
            mime_type: "audio/pcm;rate=16000".into(),
            sequence: 9,
        };
        let value: serde_json::Value =
            serde_json::from_str(&ClientMessage::audio(chunk).to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"realtimeInput": {"audio": {"data": "AEA=", "mimeType": "audio/pcm;rate=16000"}}})
        );
    }

    #[test]
    fn test_parse_setup_complete() {
        let message = ServerMessage::parse(br#"{"setupComplete": {}}"#).unwrap();
        assert!(message.is_setup_complete());
        assert_eq!(message.audio_parts().count(), 0);
    }

    #[test]
    fn test_parse_audio_parts_in_order() {
        let payload = json!({
            "serverContent": {
                "modelTurn": {"parts": [
                    {"inlineData": {"mimeType": "audio/pcm;rate=24000", "data": "AAA="}},
                    {"text": "ignored"},
                    {"inlineData": {"mimeType": "audio/pcm;rate=24000", "data": "AQA="}}
                ]}
            }
        });
        let message = ServerMessage::parse(payload.to_string().as_bytes()).unwrap();
        let data: Vec<&str> = message.audio_parts().map(|b| b.data.as_str()).collect();
        assert_eq!(data, vec!["AAA=", "AQA="]);
        assert!(!message.is_interrupted());
    }

    #[test]
    fn test_parse_interrupted_and_turn_complete() {
        let message =
            ServerMessage::parse(br#"{"serverContent": {"interrupted": true}}"#).unwrap();
        assert!(message.is_interrupted());
        assert!(!message.is_turn_complete());

        let message =
            ServerMessage::parse(br#"{"serverContent": {"turnComplete": true}}"#).unwrap();
        assert!(message.is_turn_complete());
    }

    #[test]
    fn test_parse_go_away() {
        let message = ServerMessage::parse(br#"{"goAway": {"timeLeft": "10s"}}"#).unwrap();
        assert_eq!(message.go_away.unwrap().time_left.as_deref(), Some("10s"));
    }

    #[test]
    fn test_parse_ignores_unknown_fields() {
        let message = ServerMessage::parse(br#"{"usageMetadata": {"totalTokenCount": 5}}"#).unwrap();
        assert_eq!(message, ServerMessage::default());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            ServerMessage::parse(b"not json"),
            Err(VoiceSessionError::Protocol(_))
        ));
    }
}
