//! Radio picks from a `generateContent` style text model.

use async_trait::async_trait;
use radio_core::{ContentGenerator, GeneratedPick, GeneratorError, PickRequest};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::GeneratorSettings;
use crate::prompt::{build_prompt, parse_reply};
use crate::tts::Synthesizer;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
}

fn reply_text(response: GenerateResponse) -> Option<String> {
    let text: String = response
        .candidates
        .into_iter()
        .next()?
        .content?
        .parts
        .into_iter()
        .map(|part| part.text)
        .collect();
    (!text.trim().is_empty()).then_some(text)
}

pub struct GeminiGenerator {
    client: reqwest::Client,
    settings: GeneratorSettings,
    synthesizer: Option<Synthesizer>,
}

impl GeminiGenerator {
    pub fn new(
        settings: GeneratorSettings,
        synthesizer: Option<Synthesizer>,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()?;
        Ok(Self {
            client,
            settings,
            synthesizer,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.settings.base_url, self.settings.model
        )
    }

    async fn complete(&self, prompt: String) -> Result<String, GeneratorError> {
        let body = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
            generation_config: self
                .settings
                .temperature
                .map(|temperature| GenerationConfig { temperature }),
        };
        let response = self
            .client
            .post(self.endpoint())
            .query(&[("key", self.settings.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|err| GeneratorError::Request(err.without_url().to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(GeneratorError::Request(format!("http status {status}")));
        }
        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|err| GeneratorError::Malformed(err.without_url().to_string()))?;
        reply_text(parsed).ok_or_else(|| GeneratorError::Malformed("empty reply".to_string()))
    }
}

#[async_trait]
impl ContentGenerator for GeminiGenerator {
    async fn next_pick(&self, request: PickRequest) -> Result<GeneratedPick, GeneratorError> {
        let prompt = build_prompt(&request, &self.settings.persona, &self.settings.language);
        let reply = self.complete(prompt).await?;
        let (song_query, intro_text) = parse_reply(&reply)?;
        debug!(song = %song_query, "generator picked song");

        let intro_audio = match (&self.synthesizer, request.speak_intro) {
            (Some(synthesizer), true) if !intro_text.is_empty() => {
                match synthesizer.synthesize(&intro_text).await {
                    Ok(path) => Some(path),
                    Err(err) => {
                        // Intro falls back to text.
                        warn!(error = %err, "intro synthesis failed");
                        None
                    }
                }
            }
            _ => None,
        };
        Ok(GeneratedPick {
            song_query,
            intro_text,
            intro_audio,
        })
    }
}
