//! Request and response types for the Fish Audio API.

use serde::{Deserialize, Serialize};

use crate::http::MultipartForm;

// ============================================================================
// TTS
// ============================================================================

/// Output audio container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Wav,
    Pcm,
    #[default]
    Mp3,
}

/// Latency/quality trade-off requested from the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Latency {
    Normal,
    #[default]
    Balanced,
}

/// Reference audio sample used for zero-shot voice cloning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceAudio {
    /// Raw audio bytes.
    #[serde(with = "serde_bytes")]
    pub audio: Vec<u8>,
    /// Transcript of the sample.
    pub text: String,
}

/// Speaking rate and loudness adjustments.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Prosody {
    /// Speed multiplier.
    pub speed: f32,
    /// Volume offset in dB.
    pub volume: f32,
}

impl Default for Prosody {
    fn default() -> Self {
        Self {
            speed: 1.0,
            volume: 0.0,
        }
    }
}

/// Synthesis request, used by both the HTTP and the live endpoints.
///
/// Values are sent as given; range checking is left to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsRequest {
    /// Text to synthesize. The live endpoint usually leaves this empty.
    pub text: String,
    /// Server-side chunk length in characters (100..=300).
    pub chunk_length: u32,
    /// Output format.
    pub format: AudioFormat,
    /// MP3 bitrate in kbps (64, 128 or 192).
    pub mp3_bitrate: u32,
    /// Inline reference samples.
    pub references: Vec<ReferenceAudio>,
    /// Id of a stored voice model.
    pub reference_id: Option<String>,
    /// Whether the server normalizes numbers and punctuation.
    pub normalize: bool,
    /// Latency mode.
    pub latency: Latency,
    /// Optional prosody adjustments.
    pub prosody: Option<Prosody>,
}

impl Default for TtsRequest {
    fn default() -> Self {
        Self {
            text: String::new(),
            chunk_length: 200,
            format: AudioFormat::default(),
            mp3_bitrate: 128,
            references: Vec::new(),
            reference_id: None,
            normalize: true,
            latency: Latency::default(),
            prosody: None,
        }
    }
}

impl TtsRequest {
    /// Creates a request with default options.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// Sets the output audio format.
    pub fn with_format(mut self, format: AudioFormat) -> Self {
        self.format = format;
        self
    }

    /// Sets the latency mode.
    pub fn with_latency(mut self, latency: Latency) -> Self {
        self.latency = latency;
        self
    }

    /// Uses a stored voice model as reference.
    pub fn with_reference_id(mut self, reference_id: impl Into<String>) -> Self {
        self.reference_id = Some(reference_id.into());
        self
    }

    /// Adds an inline reference clip with its transcript.
    pub fn with_reference(mut self, audio: Vec<u8>, text: impl Into<String>) -> Self {
        self.references.push(ReferenceAudio {
            audio,
            text: text.into(),
        });
        self
    }

    /// Sets speed and volume.
    pub fn with_prosody(mut self, prosody: Prosody) -> Self {
        self.prosody = Some(prosody);
        self
    }
}

// ============================================================================
// ASR
// ============================================================================

/// Speech recognition request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AsrRequest {
    /// Audio to transcribe.
    #[serde(with = "serde_bytes")]
    pub audio: Vec<u8>,
    /// Language hint, e.g. "en".
    pub language: Option<String>,
    /// Skip segment timestamps.
    pub ignore_timestamps: Option<bool>,
}

impl AsrRequest {
    /// Creates a request with language detection and timestamps at their defaults.
    pub fn new(audio: Vec<u8>) -> Self {
        Self {
            audio,
            language: None,
            ignore_timestamps: None,
        }
    }
}

/// One timed segment of a transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AsrSegment {
    pub text: String,
    pub start: f64,
    pub end: f64,
}

/// Speech recognition result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AsrResponse {
    /// Full transcript.
    pub text: String,
    /// Audio duration in milliseconds.
    pub duration: f64,
    #[serde(default)]
    pub segments: Vec<AsrSegment>,
}

// ============================================================================
// Models and wallet
// ============================================================================

/// A page of results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaginatedResponse<T> {
    pub total: u64,
    pub items: Vec<T>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelType {
    Svc,
    #[default]
    Tts,
}

impl ModelType {
    /// Form field value.
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelType::Svc => "svc",
            ModelType::Tts => "tts",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrainMode {
    #[default]
    Fast,
    Full,
}

impl TrainMode {
    /// Form field value.
    pub fn as_str(&self) -> &'static str {
        match self {
            TrainMode::Fast => "fast",
            TrainMode::Full => "full",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelState {
    Created,
    Training,
    Trained,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Unlist,
    #[default]
    Private,
}

impl Visibility {
    /// Form field value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Unlist => "unlist",
            Visibility::Private => "private",
        }
    }
}

/// Sample attached to a voice model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleEntity {
    pub title: String,
    pub text: String,
    pub task_id: String,
    pub audio: String,
}

/// Model author.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorEntity {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    #[serde(alias = "username")]
    pub nickname: String,
    pub avatar: String,
}

/// A voice model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelEntity {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    #[serde(rename = "type")]
    pub model_type: ModelType,
    pub title: String,
    pub description: String,
    pub cover_image: String,
    pub train_mode: TrainMode,
    pub state: ModelState,
    pub tags: Vec<String>,
    pub samples: Vec<SampleEntity>,
    pub created_at: String,
    pub updated_at: String,
    pub languages: Vec<String>,
    pub visibility: Visibility,
    pub lock_visibility: bool,
    pub like_count: u64,
    pub mark_count: u64,
    pub shared_count: u64,
    pub task_count: u64,
    #[serde(default)]
    pub liked: bool,
    #[serde(default)]
    pub marked: bool,
    pub author: AuthorEntity,
}

/// Remaining API credit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiCreditEntity {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    /// Decimal credit amount as a string, e.g. "12.50".
    #[serde(deserialize_with = "number_or_string")]
    pub credit: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Prepaid package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageEntity {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub package_type: String,
    pub total: u64,
    pub balance: u64,
    pub created_at: String,
    pub updated_at: String,
    pub finished_at: Option<String>,
}

/// Sort key for model listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortBy {
    TaskCount,
    CreatedAt,
}

impl SortBy {
    /// Query-string value.
    pub fn as_str(&self) -> &'static str {
        match self {
            SortBy::TaskCount => "task_count",
            SortBy::CreatedAt => "created_at",
        }
    }
}

/// Filters for listing models.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListModelsParams {
    pub page_size: u32,
    pub page_number: u32,
    pub title: Option<String>,
    pub tags: Vec<String>,
    /// Only the caller's own models.
    pub self_only: bool,
    pub author_id: Option<String>,
    pub languages: Vec<String>,
    pub title_language: Option<String>,
    pub sort_by: SortBy,
}

impl Default for ListModelsParams {
    fn default() -> Self {
        Self {
            page_size: 10,
            page_number: 1,
            title: None,
            tags: Vec::new(),
            self_only: false,
            author_id: None,
            languages: Vec::new(),
            title_language: None,
            sort_by: SortBy::TaskCount,
        }
    }
}

impl ListModelsParams {
    /// Encodes the filters as a query string (without the leading `?`).
    pub fn to_query(&self) -> String {
        let mut query = url::form_urlencoded::Serializer::new(String::new());
        query.append_pair("page_size", &self.page_size.to_string());
        query.append_pair("page_number", &self.page_number.to_string());
        if let Some(title) = &self.title {
            query.append_pair("title", title);
        }
        for tag in &self.tags {
            query.append_pair("tag", tag);
        }
        if self.self_only {
            query.append_pair("self", "true");
        }
        if let Some(author_id) = &self.author_id {
            query.append_pair("author_id", author_id);
        }
        for language in &self.languages {
            query.append_pair("language", language);
        }
        if let Some(title_language) = &self.title_language {
            query.append_pair("title_language", title_language);
        }
        query.append_pair("sort_by", self.sort_by.as_str());
        query.finish()
    }
}

/// Fields for creating a voice model from uploaded samples.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateModelParams {
    pub title: String,
    pub description: Option<String>,
    pub visibility: Visibility,
    pub model_type: ModelType,
    pub train_mode: TrainMode,
    /// Voice samples, uploaded as files.
    pub voices: Vec<Vec<u8>>,
    /// Transcripts of `voices`, in the same order.
    pub texts: Vec<String>,
    pub tags: Vec<String>,
    pub cover_image: Option<Vec<u8>>,
    pub enhance_audio_quality: bool,
}

impl CreateModelParams {
    /// Private fast-trained TTS model with audio enhancement on.
    pub fn new(title: impl Into<String>, voices: Vec<Vec<u8>>) -> Self {
        Self {
            title: title.into(),
            description: None,
            visibility: Visibility::default(),
            model_type: ModelType::default(),
            train_mode: TrainMode::default(),
            voices,
            texts: Vec::new(),
            tags: Vec::new(),
            cover_image: None,
            enhance_audio_quality: true,
        }
    }

    /// Encodes the fields as a multipart form.
    pub fn to_form(&self) -> MultipartForm {
        let mut form = MultipartForm::new();
        for (i, voice) in self.voices.iter().enumerate() {
            form = form.file("voices", format!("voice-{i}"), voice.clone());
        }
        if let Some(cover) = &self.cover_image {
            form = form.file("cover_image", "cover", cover.clone());
        }
        form = form
            .text("visibility", self.visibility.as_str())
            .text("type", self.model_type.as_str())
            .text("title", self.title.as_str());
        if let Some(description) = &self.description {
            form = form.text("description", description.as_str());
        }
        form = form.text("train_mode", self.train_mode.as_str());
        for text in &self.texts {
            form = form.text("texts", text.as_str());
        }
        for tag in &self.tags {
            form = form.text("tags", tag.as_str());
        }
        form.text(
            "enhance_audio_quality",
            if self.enhance_audio_quality { "true" } else { "false" },
        )
    }
}

/// Fields to change on an existing model. Unset fields are left alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateModelParams {
    pub title: Option<String>,
    pub description: Option<String>,
    pub visibility: Option<Visibility>,
    pub tags: Vec<String>,
    pub cover_image: Option<Vec<u8>>,
}

impl UpdateModelParams {
    /// Encodes the set fields as a multipart form.
    pub fn to_form(&self) -> MultipartForm {
        let mut form = MultipartForm::new();
        if let Some(cover) = &self.cover_image {
            form = form.file("cover_image", "cover", cover.clone());
        }
        if let Some(title) = &self.title {
            form = form.text("title", title.as_str());
        }
        if let Some(description) = &self.description {
            form = form.text("description", description.as_str());
        }
        if let Some(visibility) = self.visibility {
            form = form.text("visibility", visibility.as_str());
        }
        for tag in &self.tags {
            form = form.text("tags", tag.as_str());
        }
        form
    }
}

fn number_or_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected number or string, got {other}"
        ))),
    }
}
